use crate::error::IpcError;

/// Message discriminants. Changing any number breaks the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MsgType {
    Version = 0,
    Invoke = 1,
    Result = 2,
    GetValue = 3,
    SetValue = 4,
    Call = 5,
    Event = 6,
    GetInfo = 7,
    GetBalance = 8,
    GetApi = 9,
    Log = 10,
    Close = 11,
    SetFeePct = 15,
    Contains = 16,
}

impl TryFrom<u64> for MsgType {
    type Error = IpcError;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => MsgType::Version,
            1 => MsgType::Invoke,
            2 => MsgType::Result,
            3 => MsgType::GetValue,
            4 => MsgType::SetValue,
            5 => MsgType::Call,
            6 => MsgType::Event,
            7 => MsgType::GetInfo,
            8 => MsgType::GetBalance,
            9 => MsgType::GetApi,
            10 => MsgType::Log,
            11 => MsgType::Close,
            15 => MsgType::SetFeePct,
            16 => MsgType::Contains,
            other => return Err(IpcError::UnknownMessage(other)),
        })
    }
}

/// INVOKE option bits.
pub mod invoke_flag {
    pub const READ_ONLY: u32 = 1;
    pub const TRACE: u32 = 2;
}

/// SETVALUE flag bits.
pub mod set_value_flag {
    pub const DELETE: u32 = 1;
    pub const OLD_VALUE: u32 = 2;
}

/// LOG flag bits.
pub mod log_flag {
    pub const TRACE: u32 = 1;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum LogLevel {
    Panic = 0,
    Fatal = 1,
    Error = 2,
    Warn = 3,
    Info = 4,
    Debug = 5,
    Trace = 6,
}

impl LogLevel {
    pub fn flag(self) -> u32 {
        match self {
            LogLevel::Debug | LogLevel::Trace => log_flag::TRACE,
            _ => 0,
        }
    }
}

/// Keys of the info bundle attached to every INVOKE.
pub struct InfoKey;

impl InfoKey {
    pub const BLOCK_TIMESTAMP: &'static str = "B.timestamp";
    pub const BLOCK_HEIGHT: &'static str = "B.height";
    pub const TX_HASH: &'static str = "T.hash";
    pub const TX_INDEX: &'static str = "T.index";
    pub const TX_FROM: &'static str = "T.from";
    pub const TX_TIMESTAMP: &'static str = "T.timestamp";
    pub const TX_NONCE: &'static str = "T.nonce";
    pub const REVISION: &'static str = "Revision";
    pub const STEP_COSTS: &'static str = "StepCosts";
    pub const CONTRACT_OWNER: &'static str = "C.owner";
}
