use stepforge_types::ScoreError;
use thiserror::Error;

/// Errors raised by the transport and the codec.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by peer")]
    Closed,

    #[error("Frame too large: {size} > {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Unknown message type: {0}")]
    UnknownMessage(u64),

    #[error("Unexpected message {got:?}, expected {expected}")]
    UnexpectedMessage {
        got: crate::message::MsgType,
        expected: &'static str,
    },

    #[error("No decoder for type tag {0}")]
    UnknownTypeTag(u64),

    #[error("Cannot encode value of type {0}")]
    Unencodable(&'static str),
}

impl IpcError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        IpcError::Malformed(msg.into())
    }
}

impl From<IpcError> for ScoreError {
    fn from(e: IpcError) -> Self {
        match e {
            IpcError::Io(_) | IpcError::Closed => ScoreError::Io(e.to_string()),
            IpcError::Unencodable(_) => ScoreError::InvalidParameter(e.to_string()),
            _ => ScoreError::Protocol(e.to_string()),
        }
    }
}

impl From<rmp_serde::encode::Error> for IpcError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        IpcError::Malformed(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for IpcError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        IpcError::Malformed(e.to_string())
    }
}
