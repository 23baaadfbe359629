pub mod http;

use crate::auth::{AuthSession, CallbackOutcome, OAuthCallback};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Short-lived HTTP listener serving the OAuth redirect target
pub struct CallbackListener {
    listener: TcpListener,
    session: AuthSession,
    callback: Arc<OAuthCallback>,
}

impl CallbackListener {
    pub async fn bind(addr: &str, session: AuthSession, callback: OAuthCallback) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind OAuth callback listener on {}", addr))?;

        Ok(Self {
            listener,
            session,
            callback: Arc::new(callback),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until one callback resolves, then shut down
    ///
    /// Suppressed duplicates keep the listener running; every other outcome
    /// is returned.
    pub async fn wait(self, timeout: Duration) -> Result<CallbackOutcome> {
        let addr = self.local_addr()?;
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = http::build_router(http::AppState {
            session: self.session,
            callback: self.callback,
            outcomes: outcome_tx,
        });

        let server = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
        });
        info!("✓ OAuth callback listener on http://{}/oauth", addr);

        let waited = tokio::time::timeout(timeout, async {
            while let Some(outcome) = outcome_rx.recv().await {
                if outcome == CallbackOutcome::Suppressed {
                    debug!("Ignoring duplicate callback");
                    continue;
                }
                return Some(outcome);
            }
            None
        })
        .await;

        shutdown_tx.send(()).ok();
        server.await??;

        match waited {
            Ok(Some(outcome)) => Ok(outcome),
            Ok(None) => anyhow::bail!("OAuth callback listener stopped unexpectedly"),
            Err(_) => anyhow::bail!("Timeout waiting for OAuth callback"),
        }
    }
}
