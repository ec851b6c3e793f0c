//! The assembled world server.

use crate::auth::{AuthConfig, TokenSigner};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::gateway;
use crate::issuer::CredentialIssuer;
use crate::manager::SessionManager;
use crate::scheduler::TickScheduler;
use crate::session::SessionStore;
use crate::validator::SessionValidator;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use worldsync_core::World;

/// The world server.
///
/// Owns the world, the session manager and the credential issuer.
///
/// # Example
///
/// ```rust,ignore
/// use worldsync_server::{ServerConfig, WorldServer};
///
/// let config = ServerConfig::default().with_auth_secret(secret);
/// let server = WorldServer::new(config)?;
/// server.run().await?;
/// ```
#[derive(Debug)]
pub struct WorldServer {
    config: ServerConfig,
    world: Arc<World>,
    manager: Arc<SessionManager>,
    issuer: CredentialIssuer,
}

impl WorldServer {
    /// Builds a server from a validated configuration.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let world = Arc::new(
            World::builder()
                .sync_groups(config.sync_groups.clone())
                .capture_lock_timeout(config.capture_lock_timeout())
                .build()
                .map_err(|e| ServerError::Config(e.to_string()))?,
        );
        Self::with_world(config, world)
    }

    /// Builds a server around an existing world.
    pub fn with_world(config: ServerConfig, world: Arc<World>) -> ServerResult<Self> {
        config.validate()?;
        let secret = config
            .auth_secret
            .clone()
            .ok_or_else(|| ServerError::Config("auth secret is required".into()))?;
        let signer = TokenSigner::new(AuthConfig::new(secret.into_bytes()));
        let sessions = Arc::new(SessionStore::new());
        let issuer = CredentialIssuer::new(
            signer.clone(),
            Arc::clone(&sessions),
            config.auth_provider.clone(),
            config.session_max_age(),
        );
        let validator = SessionValidator::new(signer, sessions);
        let manager = Arc::new(SessionManager::new(Arc::clone(&world), validator, &config));
        Ok(Self {
            config,
            world,
            manager,
            issuer,
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The world served.
    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// The session manager.
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// The credential issuer.
    pub fn issuer(&self) -> &CredentialIssuer {
        &self.issuer
    }

    /// The HTTP router.
    pub fn router(&self) -> Router {
        gateway::router(Arc::clone(&self.manager))
    }

    /// Serves on `listener` until `signal` resolves, running tick capture
    /// and session sweeps in the background.
    pub async fn serve<F>(&self, listener: TcpListener, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (stop, shutdown) = watch::channel(false);
        let stop = Arc::new(stop);
        let mut tasks = TickScheduler::new(Arc::clone(&self.world), self.config.expiry_sweep_interval())
            .spawn(shutdown.clone());
        tasks.push(self.manager.spawn_sweeper(shutdown));

        info!(addr = %listener.local_addr()?, "world server listening");
        // Background tasks stop when the signal fires, not after the drain.
        let on_signal = Arc::clone(&stop);
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                signal.await;
                on_signal.send_replace(true);
            })
            .await;

        stop.send_replace(true);
        for task in tasks {
            let _ = task.await;
        }
        info!("world server stopped");
        result.map_err(ServerError::from)
    }

    /// Binds the configured address and serves until Ctrl-C.
    pub async fn run(&self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }
}
