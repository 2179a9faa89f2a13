//! Loopback HTTP listener that receives the OAuth redirect
//!
//! Binds an ephemeral port on 127.0.0.1, serves a single route and hands the
//! first redirect's query parameters to whoever is waiting on it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AuthError;

/// Query parameters Google appends to the redirect URI
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

type ResultSlot = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

pub struct CallbackServer {
    addr: SocketAddr,
    result: oneshot::Receiver<CallbackParams>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CallbackServer {
    /// Start listening on an ephemeral loopback port
    pub async fn bind() -> Result<Self, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.map_err(|e| {
            AuthError::AuthorizationFailed(format!("cannot bind loopback listener: {e}"))
        })?;
        let addr = listener.local_addr().map_err(|e| {
            AuthError::AuthorizationFailed(format!("cannot read loopback address: {e}"))
        })?;

        let (result_tx, result_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let slot: ResultSlot = Arc::new(Mutex::new(Some(result_tx)));

        let app = Router::new()
            .route("/", get(handle_redirect))
            .with_state(slot);

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "OAuth callback listener stopped with error");
            }
        });

        debug!(%addr, "OAuth callback listener started");
        Ok(Self {
            addr,
            result: result_rx,
            shutdown: shutdown_tx,
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port())
    }

    /// Wait for the redirect, then stop the listener either way
    pub async fn wait(self, timeout: Duration) -> Result<CallbackParams, AuthError> {
        let outcome = tokio::time::timeout(timeout, self.result).await;

        let _ = self.shutdown.send(());
        let _ = self.task.await;

        match outcome {
            Ok(Ok(params)) => Ok(params),
            Ok(Err(_)) => Err(AuthError::AuthorizationFailed(
                "callback listener closed before a redirect arrived".to_string(),
            )),
            Err(_) => Err(AuthError::AuthorizationFailed(format!(
                "timed out after {}s waiting for the browser redirect",
                timeout.as_secs()
            ))),
        }
    }
}

async fn handle_redirect(
    State(slot): State<ResultSlot>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let page = if params.error.is_some() || params.code.is_none() {
        "<h1>Authentication failed</h1><p>Return to the terminal for details.</p>"
    } else {
        "<h1>Authentication complete</h1><p>You may close this window.</p>"
    };

    match slot.lock().await.take() {
        Some(tx) => {
            info!("Received OAuth redirect");
            let _ = tx.send(params);
        }
        None => debug!("Ignoring repeated OAuth redirect"),
    }

    Html(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivers_code_and_state() {
        let server = CallbackServer::bind().await.unwrap();
        assert_eq!(
            server.redirect_uri(),
            format!("http://127.0.0.1:{}/", server.port())
        );
        let url = format!("{}?code=4%2F0abc&state=xyz", server.redirect_uri());

        let request = tokio::spawn(async move { reqwest::get(url).await.unwrap().text().await });

        let params = server.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(params.code.as_deref(), Some("4/0abc"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(params.error.is_none());

        let body = request.await.unwrap().unwrap();
        assert!(body.contains("Authentication complete"));
    }

    #[tokio::test]
    async fn test_delivers_provider_error() {
        let server = CallbackServer::bind().await.unwrap();
        let url = format!("http://127.0.0.1:{}/?error=access_denied", server.port());
        tokio::spawn(async move {
            let _ = reqwest::get(url).await;
        });

        let params = server.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert!(params.code.is_none());
    }

    #[tokio::test]
    async fn test_times_out_without_redirect() {
        let server = CallbackServer::bind().await.unwrap();
        let err = server.wait(Duration::from_millis(50)).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
