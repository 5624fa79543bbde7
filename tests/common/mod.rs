//! In-process Alpaca stand-in for the integration tests

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, options, post},
    Json, Router,
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use stockbot::infrastructure::alpaca_client::AlpacaClient;
use stockbot::secrets::ApiCredentials;

#[derive(Clone, Default)]
pub struct Recorded {
    pub orders: Arc<Mutex<Vec<Value>>>,
    pub withdrawals: Arc<Mutex<Vec<Value>>>,
}

impl Recorded {
    pub fn orders(&self) -> Vec<Value> {
        self.orders.lock().unwrap().clone()
    }

    pub fn withdrawals(&self) -> Vec<Value> {
        self.withdrawals.lock().unwrap().clone()
    }
}

/// Sixty one-minute bars closing at 10, 11, ... 69
fn rising_bars() -> Vec<Value> {
    let start = Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap();
    (0..60)
        .map(|i| {
            let close = 10.0 + i as f64;
            json!({
                "t": (start + Duration::minutes(i)).to_rfc3339(),
                "o": close, "h": close, "l": close, "c": close, "v": 100.0
            })
        })
        .collect()
}

async fn account() -> Json<Value> {
    Json(json!({
        "id": "acc-e2e",
        "status": "ACTIVE",
        "cash": "100.00",
        "equity": "100.00",
        "buying_power": "100.00"
    }))
}

async fn crypto_bars() -> Json<Value> {
    Json(json!({ "bars": { "DOGE/USD": rising_bars() }, "next_page_token": null }))
}

async fn submit_order(State(recorded): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    let mut orders = recorded.orders.lock().unwrap();
    orders.push(body);
    Json(json!({ "id": format!("order-{}", orders.len()), "status": "accepted" }))
}

async fn position(Path(symbol): Path<String>) -> Result<Json<Value>, StatusCode> {
    if symbol != "USDTUSD" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({
        "symbol": "USDTUSD",
        "qty": "9.7852",
        "avg_entry_price": "1.0001",
        "current_price": "0.9998",
        "market_value": "9.78",
        "unrealized_pl": "-0.003"
    })))
}

async fn withdraw(State(recorded): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    recorded.withdrawals.lock().unwrap().push(body);
    Json(json!({ "id": "withdrawal-1", "status": "PENDING" }))
}

pub async fn spawn_alpaca() -> (String, Recorded) {
    let recorded = Recorded::default();
    let router = Router::new()
        .route("/v2/account", get(account))
        .route("/v2/orders", post(submit_order))
        .route("/v2/positions/:symbol", get(position))
        .route("/v2/crypto/conversion", options(|| async { StatusCode::OK }))
        .route("/v2/crypto/withdrawals", post(withdraw))
        .route("/v1beta3/crypto/us/bars", get(crypto_bars))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{}", addr), recorded)
}

pub fn alpaca_client(url: &str) -> AlpacaClient {
    let credentials = ApiCredentials::new("PKE2E", "secret").unwrap();
    AlpacaClient::with_urls(credentials, url, url, 1000)
}
