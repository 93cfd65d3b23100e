//! API server setup (`spec.md` §6: open CORS, three HTTP status codes).

use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::{error::Result, routes, state::AppState};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3232,
            enable_cors: true,
        }
    }
}

pub struct Server {
    config: ServerConfig,
    app: Router,
}

impl Server {
    pub fn new(config: ServerConfig, state: Arc<AppState>) -> Self {
        let app = Self::build_app(state, &config);
        Self { config, app }
    }

    fn build_app(state: Arc<AppState>, config: &ServerConfig) -> Router {
        let mut app = routes::create_router(state);

        if config.enable_cors {
            let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
            app = app.layer(cors);
        }

        app
    }

    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .expect("invalid socket address");

        info!(%addr, "wallet-coordination API starting");

        let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind address");
        axum::serve(listener, self.app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .expect("server error");

        Ok(())
    }

    #[cfg(test)]
    pub fn router(self) -> Router {
        self.app
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3232);
        assert!(config.enable_cors);
    }
}
