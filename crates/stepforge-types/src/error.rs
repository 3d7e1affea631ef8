use crate::step::StepKind;
use num_bigint::BigInt;
use thiserror::Error;

/// Errors that can occur while parsing or converting primitive types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypesError {
    #[error("Invalid address format: {0}")]
    InvalidAddressFormat(String),

    #[error("Invalid address length: expected 20 or 21, got {0}")]
    InvalidAddressLength(usize),

    #[error("Invalid address prefix: {0}")]
    InvalidAddressPrefix(u8),

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid integer: {0}")]
    InvalidInteger(String),

    #[error("Invalid bool bytes: {0}")]
    InvalidBool(String),

    #[error("Integer does not fit into {0} bytes")]
    IntegerTooLarge(usize),
}

impl From<hex::FromHexError> for TypesError {
    fn from(e: hex::FromHexError) -> Self {
        TypesError::InvalidHex(e.to_string())
    }
}

/// Faults raised while executing a contract.
///
/// Every fault maps onto exactly one wire status code (see [`crate::error::Status`]).
/// `Protocol` and `Io` are the only fatal kinds: they terminate the connection
/// instead of being reported in a RESULT.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoreError {
    #[error("Out of step: {kind}")]
    OutOfStep {
        limit: BigInt,
        attempted: BigInt,
        requested: BigInt,
        kind: StepKind,
    },

    #[error("Out of balance: {0}")]
    OutOfBalance(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Index {index} out of range (size {size})")]
    OutOfRange { index: BigInt, size: BigInt },

    #[error("Invalid instance: {0}")]
    InvalidInstance(String),

    #[error("Invalid container access: {0}")]
    ContainerAccess(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Illegal format: {0}")]
    IllegalFormat(String),

    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Method not payable: {0}")]
    NotPayable(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Stack overflow: {0}")]
    StackOverflow(String),

    #[error("Reverted({code}): {message}")]
    Reverted { code: u32, message: String },

    /// A nested call reported a status with no dedicated variant.
    #[error("Call failed with status {status}: {message}")]
    Failed { status: u32, message: String },

    #[error("System error: {0}")]
    System(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type ScoreResult<T> = Result<T, ScoreError>;

/// Wire status codes returned to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Status {
    Success = 0,
    UnknownFailure = 1,
    ContractNotFound = 2,
    MethodNotFound = 3,
    MethodNotPayable = 4,
    IllegalFormat = 5,
    InvalidParameter = 6,
    InvalidInstance = 7,
    InvalidContainerAccess = 8,
    AccessDenied = 9,
    OutOfStep = 10,
    OutOfBalance = 11,
    Timeout = 12,
    StackOverflow = 13,
}

impl Status {
    /// First status of the contract revert range.
    pub const REVERT_BASE: u32 = 32;
    /// Last status of the contract revert range.
    pub const REVERT_END: u32 = 999;
    /// Status used by the proxy for a failed invoke.
    pub const SYSTEM_FAILURE: u32 = Status::UnknownFailure as u32;

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Status of a contract revert with the given sub-code.
    pub fn revert(code: u32) -> u32 {
        Self::REVERT_BASE + code.min(Self::REVERT_END - Self::REVERT_BASE)
    }
}

impl ScoreError {
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        ScoreError::InvalidParameter(msg.into())
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        ScoreError::AccessDenied(msg.into())
    }

    pub fn system(msg: impl Into<String>) -> Self {
        ScoreError::System(msg.into())
    }

    pub fn revert(code: u32, message: impl Into<String>) -> Self {
        ScoreError::Reverted {
            code,
            message: message.into(),
        }
    }

    /// Whether this fault must terminate the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScoreError::Protocol(_) | ScoreError::Io(_))
    }

    /// Wire status for this fault.
    pub fn status(&self) -> u32 {
        match self {
            ScoreError::OutOfStep { .. } => Status::OutOfStep.code(),
            ScoreError::OutOfBalance(_) => Status::OutOfBalance.code(),
            ScoreError::InvalidParameter(_) | ScoreError::OutOfRange { .. } => {
                Status::InvalidParameter.code()
            }
            ScoreError::InvalidInstance(_) => Status::InvalidInstance.code(),
            ScoreError::ContainerAccess(_) => Status::InvalidContainerAccess.code(),
            ScoreError::AccessDenied(_) => Status::AccessDenied.code(),
            ScoreError::IllegalFormat(_) => Status::IllegalFormat.code(),
            ScoreError::ContractNotFound(_) => Status::ContractNotFound.code(),
            ScoreError::MethodNotFound(_) => Status::MethodNotFound.code(),
            ScoreError::NotPayable(_) => Status::MethodNotPayable.code(),
            ScoreError::Timeout(_) => Status::Timeout.code(),
            ScoreError::StackOverflow(_) => Status::StackOverflow.code(),
            ScoreError::Reverted { code, .. } => Status::revert(*code),
            ScoreError::Failed { status, .. } => *status,
            ScoreError::System(_) | ScoreError::Protocol(_) | ScoreError::Io(_) => {
                Status::UnknownFailure.code()
            }
        }
    }

    /// Message reported to the host alongside the status.
    pub fn message(&self) -> String {
        match self {
            ScoreError::Reverted { message, .. } => message.clone(),
            ScoreError::Failed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Rebuild a fault from a status and message reported by the host,
    /// the inverse of [`ScoreError::status`] where the status is specific enough.
    pub fn from_status(status: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            1 => ScoreError::System(message),
            2 => ScoreError::ContractNotFound(message),
            3 => ScoreError::MethodNotFound(message),
            4 => ScoreError::NotPayable(message),
            5 => ScoreError::IllegalFormat(message),
            6 => ScoreError::InvalidParameter(message),
            7 => ScoreError::InvalidInstance(message),
            8 => ScoreError::ContainerAccess(message),
            9 => ScoreError::AccessDenied(message),
            11 => ScoreError::OutOfBalance(message),
            12 => ScoreError::Timeout(message),
            13 => ScoreError::StackOverflow(message),
            s if (Status::REVERT_BASE..=Status::REVERT_END).contains(&s) => ScoreError::Reverted {
                code: s - Status::REVERT_BASE,
                message,
            },
            s => ScoreError::Failed { status: s, message },
        }
    }
}

impl From<TypesError> for ScoreError {
    fn from(e: TypesError) -> Self {
        ScoreError::InvalidParameter(e.to_string())
    }
}
