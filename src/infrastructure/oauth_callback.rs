//! One-shot HTTP server for the Questrade authorization-code redirect
//!
//! The user opens the authorize URL in a browser, Questrade redirects to
//! `GET /callback?code=...`, the code is exchanged for tokens and the server
//! shuts down after the first successful exchange.

use crate::domain::repositories::broker_client::BrokerResult;
use crate::infrastructure::questrade_client::{exchange_code, QuestradeTokens};
use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use reqwest::Client;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const SUCCESS_MESSAGE: &str = "Authorization successful! You can close this window.";
pub const MISSING_CODE_MESSAGE: &str = "Authorization code not provided.";

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
}

/// Exchanges an authorization code for tokens
#[async_trait::async_trait]
pub trait CodeExchanger: Send + Sync {
    async fn exchange(&self, code: &str) -> BrokerResult<QuestradeTokens>;
}

/// Exchanger backed by the Questrade login server
pub struct QuestradeCodeExchanger {
    pub http: Client,
    pub login_url: String,
    pub client_id: String,
    pub redirect_uri: String,
}

#[async_trait::async_trait]
impl CodeExchanger for QuestradeCodeExchanger {
    async fn exchange(&self, code: &str) -> BrokerResult<QuestradeTokens> {
        exchange_code(
            &self.http,
            &self.login_url,
            &self.client_id,
            code,
            &self.redirect_uri,
        )
        .await
    }
}

#[derive(Clone)]
struct CallbackState {
    exchanger: Arc<dyn CodeExchanger>,
    done: Arc<Mutex<Option<oneshot::Sender<QuestradeTokens>>>>,
}

async fn callback(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> String {
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return MISSING_CODE_MESSAGE.to_string();
    };

    match state.exchanger.exchange(&code).await {
        Ok(tokens) => {
            info!("Token obtained successfully");
            if let Some(sender) = state.done.lock().await.take() {
                let _ = sender.send(tokens);
            }
            SUCCESS_MESSAGE.to_string()
        }
        Err(e) => {
            error!("Callback error: {}", e);
            format!("Authorization failed: {}", e)
        }
    }
}

fn router(state: CallbackState) -> Router {
    Router::new()
        .route("/callback", get(callback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bound callback server waiting for its first successful exchange
pub struct CallbackServer {
    listener: TcpListener,
    state: CallbackState,
    receiver: oneshot::Receiver<QuestradeTokens>,
}

impl CallbackServer {
    pub async fn bind(addr: SocketAddr, exchanger: Arc<dyn CodeExchanger>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (sender, receiver) = oneshot::channel();
        Ok(Self {
            listener,
            state: CallbackState {
                exchanger,
                done: Arc::new(Mutex::new(Some(sender))),
            },
            receiver,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until one code exchange succeeds and return its tokens
    pub async fn wait_for_tokens(self) -> std::io::Result<QuestradeTokens> {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let app = router(self.state);
        let server = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let tokens = self.receiver.await.map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "callback server stopped before receiving tokens",
            )
        })?;

        let _ = stop_tx.send(());
        match server.await {
            Ok(result) => result?,
            Err(e) => {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, e));
            }
        }
        info!("Callback server shut down");
        Ok(tokens)
    }
}
