use crate::config::AlpacaSettings;
use crate::domain::entities::{
    account::Account,
    asset::{strip_pair_separator, to_pair_symbol, Asset, AssetClass},
    bar::Bar,
    broker::Broker,
    order::Order,
    position::Position,
};
use crate::domain::repositories::broker_client::{BrokerClient, BrokerError, BrokerResult};
use crate::infrastructure::{ensure_success, number_or_string, optional_number_or_string};
use crate::rate_limit::{create_rate_limiter, throttle, RateLimiterConfig, RequestLimiter};
use crate::secrets::ApiCredentials;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const BAR_PAGE_LIMIT: u32 = 10_000;

#[derive(Debug, Deserialize)]
struct AlpacaAccount {
    id: String,
    status: String,
    #[serde(deserialize_with = "number_or_string")]
    cash: f64,
    #[serde(deserialize_with = "number_or_string")]
    equity: f64,
    #[serde(deserialize_with = "number_or_string")]
    buying_power: f64,
}

#[derive(Debug, Deserialize)]
struct AlpacaPosition {
    symbol: String,
    #[serde(deserialize_with = "number_or_string")]
    qty: f64,
    #[serde(deserialize_with = "number_or_string")]
    avg_entry_price: f64,
    #[serde(default, deserialize_with = "optional_number_or_string")]
    current_price: Option<f64>,
    #[serde(default, deserialize_with = "optional_number_or_string")]
    market_value: Option<f64>,
    #[serde(default, deserialize_with = "optional_number_or_string")]
    unrealized_pl: Option<f64>,
}

impl From<AlpacaPosition> for Position {
    fn from(p: AlpacaPosition) -> Self {
        Position {
            symbol: p.symbol,
            qty: p.qty,
            avg_entry_price: p.avg_entry_price,
            current_price: p.current_price,
            market_value: p.market_value,
            unrealized_pnl: p.unrealized_pl,
        }
    }
}

#[derive(Debug, Serialize)]
struct AlpacaOrderRequest {
    symbol: String,
    qty: String,
    side: &'static str,
    #[serde(rename = "type")]
    order_type: &'static str,
    time_in_force: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<String>,
    client_order_id: String,
}

impl From<&Order> for AlpacaOrderRequest {
    fn from(order: &Order) -> Self {
        AlpacaOrderRequest {
            symbol: order.symbol.clone(),
            qty: order.quantity.value().to_string(),
            side: order.side.as_str(),
            order_type: order.order_type.as_str(),
            time_in_force: order.time_in_force.as_str(),
            limit_price: order.limit_price.map(|p| p.value().to_string()),
            client_order_id: order.client_order_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AlpacaOrderResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlpacaAsset {
    symbol: String,
    #[serde(default)]
    tradable: bool,
    #[serde(default, rename = "class")]
    asset_class: String,
}

#[derive(Debug, Deserialize)]
struct AlpacaTrade {
    #[serde(rename = "p")]
    price: f64,
}

#[derive(Debug, Deserialize)]
struct CryptoLatestTrades {
    #[serde(default)]
    trades: HashMap<String, AlpacaTrade>,
}

#[derive(Debug, Deserialize)]
struct StockLatestTrade {
    trade: AlpacaTrade,
}

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v", default)]
    volume: f64,
}

impl From<AlpacaBar> for Bar {
    fn from(b: AlpacaBar) -> Self {
        Bar {
            timestamp: b.timestamp,
            open: b.open,
            high: b.high,
            low: b.low,
            close: b.close,
            volume: b.volume,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CryptoBarsPage {
    #[serde(default)]
    bars: HashMap<String, Vec<AlpacaBar>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StockBarsPage {
    #[serde(default)]
    bars: Option<Vec<AlpacaBar>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct WithdrawalRequest<'a> {
    currency: &'a str,
    qty: String,
    crypto_address: &'a str,
}

/// Alpaca trading (v2) and market-data REST client
pub struct AlpacaClient {
    client: Client,
    credentials: ApiCredentials,
    base_url: String,
    data_url: String,
    limiter: RequestLimiter,
    label: String,
}

impl AlpacaClient {
    pub fn new(settings: &AlpacaSettings) -> Self {
        let mut client = Self::with_urls(
            settings.credentials.clone(),
            &settings.base_url,
            &settings.data_url,
            settings.requests_per_minute,
        );
        client.label = format!("Alpaca ({})", settings.mode.label());
        client
    }

    pub fn with_urls(
        credentials: ApiCredentials,
        base_url: &str,
        data_url: &str,
        requests_per_minute: u32,
    ) -> Self {
        Self {
            client: Client::new(),
            credentials,
            base_url: base_url.trim_end_matches('/').to_string(),
            data_url: data_url.trim_end_matches('/').to_string(),
            limiter: create_rate_limiter(RateLimiterConfig {
                requests_per_minute,
            }),
            label: "Alpaca".to_string(),
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("APCA-API-KEY-ID", self.credentials.key_id())
            .header("APCA-API-SECRET-KEY", self.credentials.secret())
            .header("User-Agent", "stockbot/0.1.0")
    }

    async fn send(&self, builder: RequestBuilder) -> BrokerResult<Response> {
        throttle(&self.limiter).await;
        let response = builder.send().await?;
        ensure_success(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> BrokerResult<T> {
        let response = self.send(self.request(Method::GET, url)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BrokerError::Decode(format!("{}: {}", url, e)))
    }

    fn trading_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Whether the account may use crypto-to-crypto conversion
    pub async fn check_crypto_conversion(&self) -> BrokerResult<bool> {
        let url = self.trading_url("/v2/crypto/conversion");
        throttle(&self.limiter).await;
        let response = self.request(Method::OPTIONS, &url).send().await?;
        let status = response.status();
        if status == StatusCode::OK {
            info!("Crypto conversion is supported");
            Ok(true)
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Crypto conversion not supported. Status Code: {} - {}",
                status, body
            );
            Ok(false)
        }
    }

    /// Withdraw crypto to an external wallet
    pub async fn withdraw_crypto(
        &self,
        currency: &str,
        qty: f64,
        address: &str,
    ) -> BrokerResult<serde_json::Value> {
        if qty <= 0.0 || !qty.is_finite() {
            return Err(BrokerError::InvalidOrder(format!(
                "withdrawal quantity must be positive, got {}",
                qty
            )));
        }
        let url = self.trading_url("/v2/crypto/withdrawals");
        let payload = WithdrawalRequest {
            currency,
            qty: qty.to_string(),
            crypto_address: address,
        };
        let response = self
            .send(self.request(Method::POST, &url).json(&payload))
            .await?;
        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| BrokerError::Decode(e.to_string()))?;
        info!("Successfully withdrew {} {} to {}", qty, currency, address);
        Ok(body)
    }

    async fn crypto_bars(
        &self,
        pair: &str,
        start: &str,
        end: &str,
    ) -> BrokerResult<Vec<Bar>> {
        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = url::Url::parse(&format!("{}/v1beta3/crypto/us/bars", self.data_url))
                .map_err(|e| BrokerError::Http(e.to_string()))?;
            url.query_pairs_mut()
                .append_pair("symbols", pair)
                .append_pair("timeframe", "1Min")
                .append_pair("start", start)
                .append_pair("end", end)
                .append_pair("limit", &BAR_PAGE_LIMIT.to_string());
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("page_token", token);
            }

            let mut page: CryptoBarsPage = self.get_json(url.as_str()).await?;
            if let Some(page_bars) = page.bars.remove(pair) {
                bars.extend(page_bars.into_iter().map(Bar::from));
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(bars)
    }

    async fn stock_bars(&self, symbol: &str, start: &str, end: &str) -> BrokerResult<Vec<Bar>> {
        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url =
                url::Url::parse(&format!("{}/v2/stocks/{}/bars", self.data_url, symbol))
                    .map_err(|e| BrokerError::Http(e.to_string()))?;
            url.query_pairs_mut()
                .append_pair("timeframe", "1Min")
                .append_pair("start", start)
                .append_pair("end", end)
                .append_pair("limit", &BAR_PAGE_LIMIT.to_string())
                .append_pair("feed", "iex");
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("page_token", token);
            }

            let page: StockBarsPage = self.get_json(url.as_str()).await?;
            bars.extend(page.bars.unwrap_or_default().into_iter().map(Bar::from));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(bars)
    }
}

#[async_trait]
impl BrokerClient for AlpacaClient {
    fn name(&self) -> &str {
        &self.label
    }

    fn broker(&self) -> Broker {
        Broker::Alpaca
    }

    async fn get_account(&self) -> BrokerResult<Account> {
        let account: AlpacaAccount = self.get_json(&self.trading_url("/v2/account")).await?;
        Ok(Account {
            id: account.id,
            status: account.status,
            cash: account.cash,
            equity: account.equity,
            buying_power: account.buying_power,
        })
    }

    async fn list_positions(&self) -> BrokerResult<Vec<Position>> {
        let positions: Vec<AlpacaPosition> =
            self.get_json(&self.trading_url("/v2/positions")).await?;
        Ok(positions.into_iter().map(Position::from).collect())
    }

    async fn get_position(&self, symbol: &str) -> BrokerResult<Option<Position>> {
        let url = self.trading_url(&format!("/v2/positions/{}", strip_pair_separator(symbol)));
        match self.get_json::<AlpacaPosition>(&url).await {
            Ok(position) => Ok(Some(position.into())),
            Err(BrokerError::NotFound(_)) => {
                debug!("No open position for {}", symbol);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn submit_order(&self, order: &Order) -> BrokerResult<String> {
        let payload = AlpacaOrderRequest::from(order);
        let response = self
            .send(
                self.request(Method::POST, &self.trading_url("/v2/orders"))
                    .json(&payload),
            )
            .await?;
        let placed: AlpacaOrderResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::Decode(format!("order response: {}", e)))?;

        debug!(
            "Order placed: {} {} {} ({}), id {} status {}",
            order.side,
            order.quantity,
            order.symbol,
            order.time_in_force.as_str(),
            placed.id,
            placed.status.as_deref().unwrap_or("unknown")
        );
        Ok(placed.id)
    }

    async fn close_position(&self, symbol: &str) -> BrokerResult<()> {
        let url = self.trading_url(&format!("/v2/positions/{}", strip_pair_separator(symbol)));
        self.send(self.request(Method::DELETE, &url)).await?;
        info!("Position {} closed", symbol);
        Ok(())
    }

    async fn latest_price(&self, symbol: &str) -> BrokerResult<f64> {
        match AssetClass::of(symbol) {
            AssetClass::Crypto => {
                let pair = to_pair_symbol(symbol);
                let mut url =
                    url::Url::parse(&format!("{}/v1beta3/crypto/us/latest/trades", self.data_url))
                        .map_err(|e| BrokerError::Http(e.to_string()))?;
                url.query_pairs_mut().append_pair("symbols", &pair);
                let latest: CryptoLatestTrades = self.get_json(url.as_str()).await?;
                latest
                    .trades
                    .get(&pair)
                    .map(|t| t.price)
                    .ok_or(BrokerError::NoPrice(pair))
            }
            AssetClass::Equity => {
                let url = format!(
                    "{}/v2/stocks/{}/trades/latest?feed=iex",
                    self.data_url, symbol
                );
                let latest: StockLatestTrade = self.get_json(&url).await?;
                Ok(latest.trade.price)
            }
        }
    }

    async fn bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BrokerResult<Vec<Bar>> {
        let start = start.format(TIMESTAMP_FORMAT).to_string();
        let end = end.format(TIMESTAMP_FORMAT).to_string();
        let bars = match AssetClass::of(symbol) {
            AssetClass::Crypto => self.crypto_bars(&to_pair_symbol(symbol), &start, &end).await?,
            AssetClass::Equity => self.stock_bars(symbol, &start, &end).await?,
        };
        debug!("Fetched {} bars for {}", bars.len(), symbol);
        Ok(bars)
    }

    async fn list_tradable_assets(&self) -> BrokerResult<Vec<Asset>> {
        let assets: Vec<AlpacaAsset> = self
            .get_json(&self.trading_url("/v2/assets?status=active"))
            .await?;
        Ok(assets
            .into_iter()
            .filter(|a| a.tradable)
            .map(|a| Asset {
                class: if a.asset_class == "crypto" {
                    AssetClass::Crypto
                } else {
                    AssetClass::of(&a.symbol)
                },
                symbol: a.symbol,
                tradable: true,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::order::{OrderSide, TimeInForce};
    use crate::domain::value_objects::quantity::Quantity;
    use axum::{
        extract::{Path, Query},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    async fn spawn_mock(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(url: &str) -> AlpacaClient {
        let creds = ApiCredentials::new("PKTEST", "secret").unwrap();
        AlpacaClient::with_urls(creds, url, url, 1000)
    }

    #[tokio::test]
    async fn test_get_account_sends_key_headers() {
        let router = Router::new().route(
            "/v2/account",
            get(|headers: HeaderMap| async move {
                if headers.get("APCA-API-KEY-ID").and_then(|v| v.to_str().ok()) != Some("PKTEST") {
                    return (StatusCode::UNAUTHORIZED, Json(json!({"message": "unauthorized"})));
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "id": "acc-1",
                        "status": "ACTIVE",
                        "cash": "1500.25",
                        "equity": "2000",
                        "buying_power": "3000.5"
                    })),
                )
            }),
        );
        let url = spawn_mock(router).await;

        let account = client_for(&url).get_account().await.unwrap();
        assert_eq!(account.id, "acc-1");
        assert_eq!(account.cash, 1500.25);
        assert_eq!(account.buying_power, 3000.5);

        let wrong = AlpacaClient::with_urls(
            ApiCredentials::new("OTHER", "secret").unwrap(),
            &url,
            &url,
            1000,
        );
        assert!(matches!(
            wrong.get_account().await,
            Err(BrokerError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_get_position_not_found_is_none() {
        let router = Router::new().route(
            "/v2/positions/:symbol",
            get(|Path(symbol): Path<String>| async move {
                if symbol == "DOGEUSD" {
                    (
                        StatusCode::OK,
                        Json(json!({
                            "symbol": "DOGEUSD",
                            "qty": "40",
                            "avg_entry_price": "0.25",
                            "current_price": "0.3",
                            "market_value": "12",
                            "unrealized_pl": "2"
                        })),
                    )
                } else {
                    (
                        StatusCode::NOT_FOUND,
                        Json(json!({"code": 40410000, "message": "position does not exist"})),
                    )
                }
            }),
        );
        let url = spawn_mock(router).await;
        let client = client_for(&url);

        let position = client.get_position("DOGE/USD").await.unwrap().unwrap();
        assert_eq!(position.qty, 40.0);
        assert_eq!(position.unrealized_pnl, Some(2.0));
        assert!(client.get_position("AAPL").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_submit_order_payload() {
        let captured: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        let router = Router::new().route(
            "/v2/orders",
            post(move |Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some(body);
                    Json(json!({"id": "order-123", "status": "accepted"}))
                }
            }),
        );
        let url = spawn_mock(router).await;

        let order = Order::market(
            "DOGE/USD",
            OrderSide::Buy,
            Quantity::new(80.5).unwrap(),
            TimeInForce::Gtc,
        )
        .unwrap();
        let id = client_for(&url).submit_order(&order).await.unwrap();
        assert_eq!(id, "order-123");

        let body = captured.lock().unwrap().clone().unwrap();
        assert_eq!(body["symbol"], "DOGE/USD");
        assert_eq!(body["qty"], "80.5");
        assert_eq!(body["side"], "buy");
        assert_eq!(body["type"], "market");
        assert_eq!(body["time_in_force"], "gtc");
        assert!(body.get("limit_price").is_none());
        assert!(body["client_order_id"].as_str().unwrap().starts_with("stockbot-"));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_order_confirmation_logged_at_debug() {
        let router = Router::new().route(
            "/v2/orders",
            post(|| async { Json(json!({"id": "order-7", "status": "accepted"})) }),
        );
        let url = spawn_mock(router).await;

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let order = Order::market(
            "DOGE/USD",
            OrderSide::Buy,
            Quantity::new(3.0).unwrap(),
            TimeInForce::Gtc,
        )
        .unwrap();
        assert_eq!(client_for(&url).submit_order(&order).await.unwrap(), "order-7");

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(!output.contains("Order placed"));
    }

    #[tokio::test]
    async fn test_forbidden_region_surfaces_body() {
        let router = Router::new().route(
            "/v2/orders",
            post(|| async {
                (
                    StatusCode::FORBIDDEN,
                    r#"{"message":"crypto pair not available for EU tax resident"}"#,
                )
            }),
        );
        let url = spawn_mock(router).await;
        let order = Order::market(
            "USDT/USD",
            OrderSide::Buy,
            Quantity::new(1.0).unwrap(),
            TimeInForce::Gtc,
        )
        .unwrap();

        let err = client_for(&url).submit_order(&order).await.unwrap_err();
        assert!(err.is_regional_restriction());
    }

    #[tokio::test]
    async fn test_latest_price_crypto_and_equity() {
        let router = Router::new()
            .route(
                "/v1beta3/crypto/us/latest/trades",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    let symbol = q.get("symbols").cloned().unwrap_or_default();
                    Json(json!({"trades": {symbol: {"p": 0.31, "s": 100.0}}}))
                }),
            )
            .route(
                "/v2/stocks/:symbol/trades/latest",
                get(|| async { Json(json!({"symbol": "AAPL", "trade": {"p": 189.5}})) }),
            );
        let url = spawn_mock(router).await;
        let client = client_for(&url);

        assert_eq!(client.latest_price("DOGEUSD").await.unwrap(), 0.31);
        assert_eq!(client.latest_price("AAPL").await.unwrap(), 189.5);
    }

    #[tokio::test]
    async fn test_crypto_bars_follow_page_token() {
        let router = Router::new().route(
            "/v1beta3/crypto/us/bars",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                let bar = |t: &str, c: f64| {
                    json!({"t": t, "o": c, "h": c, "l": c, "c": c, "v": 1.0})
                };
                if q.get("page_token").map(String::as_str) == Some("page-2") {
                    Json(json!({
                        "bars": {"BTC/USD": [bar("2024-01-08T15:02:00Z", 3.0)]},
                        "next_page_token": null
                    }))
                } else {
                    Json(json!({
                        "bars": {"BTC/USD": [
                            bar("2024-01-08T15:00:00Z", 1.0),
                            bar("2024-01-08T15:01:00Z", 2.0)
                        ]},
                        "next_page_token": "page-2"
                    }))
                }
            }),
        );
        let url = spawn_mock(router).await;

        let end = Utc::now();
        let bars = client_for(&url)
            .bars("BTC/USD", end - chrono::Duration::hours(1), end)
            .await
            .unwrap();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_stock_bars_follow_page_token() {
        let router = Router::new().route(
            "/v2/stocks/:symbol/bars",
            get(|Path(symbol): Path<String>, Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(symbol, "AAPL");
                assert_eq!(q.get("feed").map(String::as_str), Some("iex"));
                assert_eq!(q.get("timeframe").map(String::as_str), Some("1Min"));
                let bar = |t: &str, c: f64| {
                    json!({"t": t, "o": c, "h": c, "l": c, "c": c, "v": 10.0})
                };
                match q.get("page_token").map(String::as_str) {
                    Some("page-2") => Json(json!({
                        "bars": [bar("2024-01-10T15:02:00Z", 187.0)],
                        "symbol": "AAPL",
                        "next_page_token": null
                    })),
                    Some(_) => Json(json!({"bars": null, "next_page_token": null})),
                    None => Json(json!({
                        "bars": [
                            bar("2024-01-10T15:00:00Z", 185.0),
                            bar("2024-01-10T15:01:00Z", 186.0)
                        ],
                        "symbol": "AAPL",
                        "next_page_token": "page-2"
                    })),
                }
            }),
        );
        let url = spawn_mock(router).await;

        let end = Utc::now();
        let bars = client_for(&url)
            .bars("AAPL", end - chrono::Duration::hours(1), end)
            .await
            .unwrap();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![185.0, 186.0, 187.0]);
    }

    #[tokio::test]
    async fn test_list_tradable_assets_filters() {
        let router = Router::new().route(
            "/v2/assets",
            get(|| async {
                Json(json!([
                    {"symbol": "AAPL", "tradable": true, "class": "us_equity"},
                    {"symbol": "USDT/USD", "tradable": true, "class": "crypto"},
                    {"symbol": "OLD", "tradable": false, "class": "us_equity"}
                ]))
            }),
        );
        let url = spawn_mock(router).await;

        let assets = client_for(&url).list_tradable_assets().await.unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[1].class, AssetClass::Crypto);
        assert_eq!(assets[0].class, AssetClass::Equity);
    }

    #[tokio::test]
    async fn test_crypto_conversion_check() {
        let router = Router::new().route(
            "/v2/crypto/conversion",
            axum::routing::options(|| async { StatusCode::OK }),
        );
        let url = spawn_mock(router).await;
        assert!(client_for(&url).check_crypto_conversion().await.unwrap());

        let missing = spawn_mock(Router::new()).await;
        assert!(!client_for(&missing).check_crypto_conversion().await.unwrap());
    }

    #[tokio::test]
    async fn test_withdraw_rejects_non_positive_qty() {
        let client = client_for("http://127.0.0.1:9");
        assert!(matches!(
            client.withdraw_crypto("USDT", 0.0, "addr").await,
            Err(BrokerError::InvalidOrder(_))
        ));
    }
}
