//! Web server wiring

use crate::{create_app, AppConfig, AppError, AppResult, AppState};
use axum::serve;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Main server
pub struct Server {
    config: AppConfig,
    state: AppState,
}

impl Server {
    /// Create a new server
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let state = AppState::new(config.clone()).await?;

        Ok(Self { config, state })
    }

    /// Start the server; blocks until shutdown
    pub async fn start(self) -> AppResult<()> {
        let address = self.config.address();

        info!("Starting palisade");
        info!("Server address: http://{}", address);

        let app = create_app(self.state.clone());

        let listener = TcpListener::bind(&address).await.map_err(AppError::Server)?;

        info!("Server listening on http://{}", address);

        if let Err(e) = serve(listener, app).await {
            error!("Server error: {}", e);
            return Err(AppError::Server(e));
        }

        Ok(())
    }

    /// Get server configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Get application state
    pub fn state(&self) -> &AppState {
        &self.state
    }
}
