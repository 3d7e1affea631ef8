//! Stepforge IPC - the engine side of the host/engine wire protocol.
//!
//! This crate provides:
//! - Length-prefixed MessagePack framing over a byte stream
//! - The "any" value codec with its per-revision variants
//! - API descriptors reported on GETAPI
//! - The [`Proxy`] state machine that services re-entrant INVOKE messages

pub mod api;
pub mod codec;
pub mod error;
pub mod message;
pub mod payload;
pub mod proxy;
pub mod transport;

pub use api::{api_flag, ApiInfo, ApiKind, DataType, Field, MethodDescriptor, Param};
pub use codec::{Codec, TypeTag};
pub use error::IpcError;
pub use message::{InfoKey, LogLevel, MsgType};
pub use proxy::{CallResult, InvokeHandler, InvokeRequest, InvokeResponse, Proxy, SetAck};
pub use transport::FramedTransport;

/// Protocol version announced in the VERSION handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Runtime name announced in the VERSION handshake.
pub const RUNTIME_NAME: &str = "python";

/// Default upper bound on a single frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 32 * 1024 * 1024;

/// Default number of unacknowledged SETVALUE messages before a forced drain.
pub const MAX_PENDING_SET_VALUES: usize = 5;
