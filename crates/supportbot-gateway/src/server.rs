use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use supportbot_core::ChatService;
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::router::build_router;

#[derive(Clone)]
pub(crate) struct AppState {
    pub service: Arc<ChatService>,
    pub home_page: Arc<PathBuf>,
}

pub struct GatewayServer {
    addr: SocketAddr,
    service: Arc<ChatService>,
    home_page: PathBuf,
    static_dir: PathBuf,
    max_body_size: usize,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(
        bind: &str,
        port: u16,
        service: Arc<ChatService>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        if bind == "0.0.0.0" {
            tracing::warn!("gateway binding to 0.0.0.0, reachable from other hosts");
        }

        Self {
            addr,
            service,
            home_page: PathBuf::from("index.html"),
            static_dir: PathBuf::from("static"),
            max_body_size: 64 * 1024,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn with_home_page(mut self, path: impl Into<PathBuf>) -> Self {
        self.home_page = path.into();
        self
    }

    #[must_use]
    pub fn with_static_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.static_dir = path.into();
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The application router, without binding a socket.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = AppState {
            service: Arc::clone(&self.service),
            home_page: Arc::new(self.home_page.clone()),
        };
        build_router(state, &self.static_dir, self.max_body_size)
    }

    /// Bind and serve until the shutdown signal flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or encounters a fatal I/O error.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: self.addr.to_string(),
                source,
            })?;
        tracing::info!("gateway listening on http://{}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                tracing::info!("gateway shutting down");
            })
            .await
            .map_err(|e| GatewayError::Server(format!("{e}")))?;

        Ok(())
    }
}
