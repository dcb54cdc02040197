//! Process orchestration.
//!
//! ```rust,ignore
//! use molar_runtime::MolarRuntime;
//!
//! // Loads molar.toml from the working directory, MOLAR_* and legacy variables
//! let runtime = MolarRuntime::new();
//! runtime.run().await?;
//!
//! // Explicit file and profile
//! let runtime = MolarRuntime::builder()
//!     .config_file("/etc/molar/molar.toml")
//!     .profile("production")
//!     .build()?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use molar_core::{BackendPort, SessionStore, TransportPort};

use crate::bridge::Bridge;
use crate::config::{ConfigLoader, ConfigResult, MolarConfig};
use crate::dispatcher::{DispatchSettings, OutboundDispatcher};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::manager::{ConnectionManager, ManagerPorts, ManagerSettings};
use crate::relay::InboundRelay;
use crate::view::SessionView;

/// Ports the runtime wires together.
#[derive(Clone)]
pub struct RuntimePorts {
    pub transport: Arc<dyn TransportPort>,
    pub store: Arc<dyn SessionStore>,
    pub backend: Arc<dyn BackendPort>,
}

impl RuntimePorts {
    /// The production ports: WebSocket gateway, file store, HTTP backend.
    #[cfg(feature = "full-transport")]
    pub fn from_config(config: &MolarConfig) -> RuntimeResult<Self> {
        use molar_transport::{FileSessionStore, HttpBackend, WsGateway};

        Ok(Self {
            transport: Arc::new(WsGateway::new(config.gateway.to_transport())),
            store: Arc::new(FileSessionStore::new(&config.session.dir)),
            backend: Arc::new(HttpBackend::new(config.backend.to_transport())?),
        })
    }
}

/// The wired components of one bridge instance.
pub struct Services {
    pub view: SessionView,
    pub manager: Arc<ConnectionManager>,
    pub dispatcher: Arc<OutboundDispatcher>,
    pub bridge: Arc<Bridge>,
}

impl Services {
    /// Wires dispatcher, relay, manager and bridge. The manager's event
    /// loop starts immediately; the session is not initialized yet.
    pub fn assemble(config: &MolarConfig, ports: RuntimePorts) -> Self {
        let view = SessionView::new();
        let dispatcher = Arc::new(OutboundDispatcher::new(
            Arc::clone(&ports.transport),
            view.clone(),
            DispatchSettings::from(&config.dispatch),
        ));
        let relay = InboundRelay::new(
            Arc::clone(&ports.backend),
            Arc::clone(&ports.transport),
            Arc::clone(&dispatcher),
        )
        .with_fallback(config.relay.fallback_message.clone());

        let manager = Arc::new(ConnectionManager::start(
            ManagerSettings::from(&config.session),
            view.clone(),
            ManagerPorts {
                transport: ports.transport,
                store: ports.store,
                backend: ports.backend,
                sink: Arc::new(relay),
            },
        ));
        let bridge = Arc::new(Bridge::new(Arc::clone(&manager), Arc::clone(&dispatcher)));

        Self {
            view,
            manager,
            dispatcher,
            bridge,
        }
    }
}

/// The bridge process: configuration, logging, services and the HTTP facade.
pub struct MolarRuntime {
    config: MolarConfig,
}

impl MolarRuntime {
    /// Loads configuration from the default locations, falling back to
    /// defaults if it cannot be loaded, and initializes logging.
    pub fn new() -> Self {
        let config = ConfigLoader::new().load().unwrap_or_else(|e| {
            eprintln!("Warning: failed to load config ({e}), using defaults");
            MolarConfig::default()
        });
        Self::from_config(&config)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from loaded configuration and initializes logging.
    pub fn from_config(config: &MolarConfig) -> Self {
        logging::init_from_config(&config.logging);
        info!(
            port = config.server.port,
            backend = %config.backend.base_url,
            gateway = %config.gateway.url,
            session_dir = %config.session.dir.display(),
            "Molar runtime configured"
        );
        Self {
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &MolarConfig {
        &self.config
    }

    /// Runs until Ctrl+C or SIGTERM.
    #[cfg(feature = "full-transport")]
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs with the production ports until `shutdown` completes.
    #[cfg(feature = "full-transport")]
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let ports = RuntimePorts::from_config(&self.config)?;
        self.run_with(ports, shutdown).await
    }

    /// Runs with the given ports until `shutdown` completes.
    ///
    /// On shutdown the session is logged out (if configured and connected)
    /// before the HTTP facade stops accepting requests.
    pub async fn run_with<F>(&self, ports: RuntimePorts, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let services = Services::assemble(&self.config, ports);
        let addr = self.config.server.addr();
        let facade = match molar_transport::serve(&addr, services.bridge.clone()).await {
            Ok(facade) => facade,
            Err(e) => {
                error!(error = %e, "Failed to start HTTP facade");
                services.manager.shutdown(false).await;
                return Err(e.into());
            }
        };

        if !services.manager.initialize().await {
            facade.shutdown().await;
            return Err(RuntimeError::ManagerStopped);
        }

        shutdown.await;
        info!("Shutting down");

        services
            .manager
            .shutdown(self.config.session.logout_on_shutdown)
            .await;
        facade.shutdown().await;

        info!("Molar runtime stopped");
        Ok(())
    }
}

impl Default for MolarRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => error!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}

/// Builder for a [`MolarRuntime`] with explicit configuration sources.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: MolarConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build(self) -> ConfigResult<MolarRuntime> {
        let config = self.config_loader.load()?;
        Ok(MolarRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTransport, RecordingBackend};
    use molar_core::{ConnectionState, MemorySessionStore};
    use molar_transport::BridgeApi;
    use std::time::Duration;

    fn local_config() -> MolarConfig {
        let mut config = MolarConfig::default();
        config.server.host = "127.0.0.1".into();
        config.server.port = 0;
        config
    }

    #[tokio::test]
    async fn test_run_initializes_and_stops() {
        let transport = Arc::new(FakeTransport::new());
        let runtime = MolarRuntime {
            config: local_config(),
        };
        let ports = RuntimePorts {
            transport: transport.clone(),
            store: Arc::new(MemorySessionStore::new()),
            backend: Arc::new(RecordingBackend::new()),
        };

        runtime
            .run_with(ports, tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap();

        assert_eq!(transport.connects().len(), 1);
        assert_eq!(transport.logouts(), 0);
        assert_eq!(transport.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = local_config();
        config.server.port = taken.local_addr().unwrap().port();
        let runtime = MolarRuntime { config };
        let transport = Arc::new(FakeTransport::new());
        let ports = RuntimePorts {
            transport: transport.clone(),
            store: Arc::new(MemorySessionStore::new()),
            backend: Arc::new(RecordingBackend::new()),
        };

        let result = runtime.run_with(ports, std::future::pending()).await;

        assert!(matches!(result, Err(RuntimeError::Transport(_))));
        assert!(transport.connects().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_services_reinit_through_bridge() {
        let transport = Arc::new(FakeTransport::new());
        let services = Services::assemble(
            &MolarConfig::default(),
            RuntimePorts {
                transport: transport.clone(),
                store: Arc::new(MemorySessionStore::new()),
                backend: Arc::new(RecordingBackend::new()),
            },
        );

        assert_eq!(services.bridge.snapshot().state, ConnectionState::Disconnected);
        assert!(services.bridge.reinit().await);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(services.view.snapshot().state, ConnectionState::Connecting);
        assert_eq!(transport.connects().len(), 1);

        services.manager.shutdown(true).await;
        assert!(!services.bridge.reinit().await);
    }
}
