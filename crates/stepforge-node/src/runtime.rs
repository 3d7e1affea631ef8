//! Wiring of one engine session: connect, announce, serve until CLOSE.

use crate::config::EngineConfig;
use std::io::{Read, Write};
use stepforge_ipc::{FramedTransport, Proxy, PROTOCOL_VERSION, RUNTIME_NAME};
use stepforge_vm::{ScoreRegistry, ServiceEngine};
use tracing::{error, info};

/// One connection to a host.
pub struct EngineRuntime {
    config: EngineConfig,
    uuid: String,
}

impl EngineRuntime {
    pub fn new(config: EngineConfig, uuid: String) -> Self {
        Self { config, uuid }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Connect to the configured socket and serve until the host closes.
    pub fn run(&self) -> anyhow::Result<()> {
        let socket = &self.config.ipc.socket;
        info!(socket = %socket.display(), uuid = %self.uuid, "connecting to host");
        let transport = FramedTransport::connect(socket, self.config.ipc.max_frame_size)
            .map_err(|e| anyhow::anyhow!("Failed to connect to '{}': {}", socket.display(), e))?;
        self.serve(transport, stepforge_sample_scores::registry())
    }

    /// Serve a session over an established transport.
    pub fn serve<S: Read + Write>(&self, transport: FramedTransport<S>, registry: ScoreRegistry) -> anyhow::Result<()> {
        let mut proxy = Proxy::new(transport).with_max_pending(self.config.ipc.max_pending_set_values);
        proxy.send_version(PROTOCOL_VERSION, &self.uuid, RUNTIME_NAME)?;

        let mut engine = ServiceEngine::new(registry)
            .with_max_depth(self.config.engine.max_call_depth)
            .with_verify_package(self.config.engine.verify_package);
        if let Err(e) = proxy.run(&mut engine) {
            error!(error = %e, "session aborted");
            return Err(e.into());
        }
        info!(contracts = engine.cached(), "session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmpv::Value as Wire;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use stepforge_ipc::{payload, MsgType};

    #[test]
    fn test_handshake_and_get_api() {
        let (engine, host) = UnixStream::pair().unwrap();
        let runtime = EngineRuntime::new(EngineConfig::default(), "test-uuid".into());
        let session = thread::spawn(move || {
            let transport = FramedTransport::new(engine, 1 << 20);
            runtime.serve(transport, stepforge_sample_scores::registry())
        });

        let mut host = FramedTransport::new(host, 1 << 20);
        let (msg, version) = host.receive().unwrap();
        assert_eq!(msg, MsgType::Version);
        let f = payload::array(&version, 3, "VERSION").unwrap();
        assert_eq!(payload::uint(&f[0], "version").unwrap(), u64::from(PROTOCOL_VERSION));
        assert_eq!(payload::string(&f[1], "uuid").unwrap(), "test-uuid");

        host.send(MsgType::GetApi, &Wire::from("/scores/cx01/token")).unwrap();
        let (msg, reply) = host.receive().unwrap();
        assert_eq!(msg, MsgType::GetApi);
        let f = payload::array(&reply, 2, "GETAPI").unwrap();
        assert_eq!(payload::uint(&f[0], "status").unwrap(), 0);

        host.send(MsgType::Close, &Wire::Nil).unwrap();
        session.join().unwrap().unwrap();
    }

    #[test]
    fn test_protocol_violation_ends_session() {
        let (engine, host) = UnixStream::pair().unwrap();
        let runtime = EngineRuntime::new(EngineConfig::default(), "u".into());
        let session = thread::spawn(move || {
            runtime.serve(FramedTransport::new(engine, 1 << 20), ScoreRegistry::new())
        });
        let mut host = FramedTransport::new(host, 1 << 20);
        host.receive().unwrap();
        host.send(MsgType::GetValue, &Wire::Nil).unwrap();
        assert!(session.join().unwrap().is_err());
    }
}
