//! Length-prefixed MessagePack framing.
//!
//! Each frame is a 4-byte big-endian body length followed by the MessagePack
//! encoding of `[msgType, payload]`.

use crate::error::IpcError;
use crate::message::MsgType;
use rmpv::Value as Wire;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use tracing::trace;

pub struct FramedTransport<S> {
    stream: S,
    max_frame_size: usize,
}

impl FramedTransport<UnixStream> {
    /// Connect to the host's Unix domain socket.
    pub fn connect(path: impl AsRef<Path>, max_frame_size: usize) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(path)?;
        Ok(Self::new(stream, max_frame_size))
    }
}

impl<S: Read + Write> FramedTransport<S> {
    pub fn new(stream: S, max_frame_size: usize) -> Self {
        Self {
            stream,
            max_frame_size,
        }
    }

    /// Write one message.
    pub fn send(&mut self, msg: MsgType, payload: &Wire) -> Result<(), IpcError> {
        let body = rmp_serde::to_vec(&(msg as u32, payload))?;
        if body.len() > self.max_frame_size {
            return Err(IpcError::FrameTooLarge {
                size: body.len(),
                max: self.max_frame_size,
            });
        }
        let len = u32::try_from(body.len()).map_err(|_| IpcError::FrameTooLarge {
            size: body.len(),
            max: u32::MAX as usize,
        })?;
        trace!(?msg, size = body.len(), "send frame");
        self.stream.write_all(&len.to_be_bytes())?;
        self.stream.write_all(&body)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Block until one complete message is available.
    pub fn receive(&mut self) -> Result<(MsgType, Wire), IpcError> {
        let mut header = [0u8; 4];
        if let Err(e) = self.stream.read_exact(&mut header) {
            return Err(match e.kind() {
                ErrorKind::UnexpectedEof => IpcError::Closed,
                _ => IpcError::Io(e),
            });
        }
        let size = u32::from_be_bytes(header) as usize;
        if size > self.max_frame_size {
            return Err(IpcError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        let mut body = vec![0u8; size];
        self.stream.read_exact(&mut body).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => IpcError::malformed("truncated frame"),
            _ => IpcError::Io(e),
        })?;
        let (msg, payload): (u64, Wire) = rmp_serde::from_slice(&body)?;
        let msg = MsgType::try_from(msg)?;
        trace!(?msg, size, "receive frame");
        Ok((msg, payload))
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}
