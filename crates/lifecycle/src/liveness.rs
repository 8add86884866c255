//! HTTP liveness endpoint.
//!
//! `GET /liveness` answers 200 while the process is started and 503 in every
//! other state.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::state::LifecycleState;
use crate::subsystem::Subsystem;

/// Build the liveness router.
pub fn liveness_router(state: watch::Receiver<LifecycleState>) -> Router {
    Router::new()
        .route("/liveness", get(liveness))
        .with_state(state)
}

async fn liveness(State(state): State<watch::Receiver<LifecycleState>>) -> (StatusCode, &'static str) {
    if state.borrow().is_live() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT LIVE")
    }
}

/// A running liveness server.
pub struct LivenessServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl LivenessServer {
    /// Bind `0.0.0.0:port` and start serving.
    ///
    /// Port 0 picks a free port; see [`LivenessServer::local_addr`].
    pub async fn bind(port: u16, state: watch::Receiver<LifecycleState>) -> std::io::Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let server = axum::serve(listener, liveness_router(state))
            .with_graceful_shutdown(shutdown.clone().cancelled_owned());

        let handle = tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("Liveness server error: {}", e);
            }
        });

        info!("Liveness endpoint listening on {}", addr);
        Ok(Self {
            addr,
            shutdown,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl Subsystem for LivenessServer {
    fn name(&self) -> &str {
        "liveness"
    }

    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<u64> {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            handle.await?;
        }
        Ok(0)
    }
}
