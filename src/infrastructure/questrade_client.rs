//! Questrade REST client
//!
//! Questrade authenticates with short-lived OAuth bearer tokens. A refresh
//! returns a new access token, the API server the account lives on, and a
//! rotated refresh token; the old refresh token stops working immediately, so
//! the session keeps the latest one. Requests answered with 401 are retried
//! exactly once after a refresh.
//!
//! Orders are placed per symbol id, so symbols are resolved through the search
//! endpoint and cached.

use crate::config::QuestradeSettings;
use crate::domain::entities::{
    account::Account,
    asset::{same_symbol, Asset},
    bar::Bar,
    broker::Broker,
    order::{Order, OrderSide, OrderType, TimeInForce},
    position::Position,
};
use crate::domain::repositories::broker_client::{BrokerClient, BrokerError, BrokerResult};
use crate::domain::value_objects::quantity::Quantity;
use crate::infrastructure::ensure_success;
use crate::rate_limit::{create_rate_limiter, throttle, RateLimiterConfig, RequestLimiter};
use crate::secrets::mask_key;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Questrade allows roughly 20 requests per second for account calls
const QUESTRADE_REQUESTS_PER_MINUTE: u32 = 600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    api_server: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

/// Tokens issued by the Questrade login server
#[derive(Clone)]
pub struct QuestradeTokens {
    pub access_token: Zeroizing<String>,
    pub refresh_token: Option<Zeroizing<String>>,
    pub api_server: String,
    pub expires_in: Option<u64>,
}

impl QuestradeTokens {
    fn from_response(response: TokenResponse, fallback_server: &str) -> BrokerResult<Self> {
        let access_token = response.access_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            BrokerError::TokenRefresh("response did not contain an access_token".to_string())
        })?;
        Ok(QuestradeTokens {
            access_token: Zeroizing::new(access_token),
            refresh_token: response
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(Zeroizing::new),
            api_server: response
                .api_server
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| fallback_server.to_string()),
            expires_in: response.expires_in,
        })
    }

    /// Entries stored in the token file
    pub fn to_json_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            "access_token".to_string(),
            Value::String(self.access_token.to_string()),
        );
        if let Some(refresh) = &self.refresh_token {
            map.insert(
                "refresh_token".to_string(),
                Value::String(refresh.to_string()),
            );
        }
        map.insert(
            "api_server".to_string(),
            Value::String(self.api_server.clone()),
        );
        map.insert("obtained_at".to_string(), Value::String(Utc::now().to_rfc3339()));
        map
    }
}

impl fmt::Debug for QuestradeTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestradeTokens")
            .field("access_token", &mask_key(&self.access_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|t| mask_key(t)),
            )
            .field("api_server", &self.api_server)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Browser URL that starts the authorization-code flow
pub fn authorize_url(
    login_url: &str,
    client_id: &str,
    redirect_uri: &str,
) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(&format!(
        "{}/oauth2/authorize",
        login_url.trim_end_matches('/')
    ))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", redirect_uri);
    Ok(url.to_string())
}

/// Trade an authorization code for a token set
pub async fn exchange_code(
    http: &Client,
    login_url: &str,
    client_id: &str,
    code: &str,
    redirect_uri: &str,
) -> BrokerResult<QuestradeTokens> {
    let url = format!("{}/oauth2/token", login_url.trim_end_matches('/'));
    let response = http
        .post(&url)
        .query(&[
            ("client_id", client_id),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await?;
    let response = ensure_success(response).await.map_err(|e| match e {
        BrokerError::Api { status, body } => {
            BrokerError::TokenRefresh(format!("code exchange rejected ({}): {}", status, body))
        }
        other => other,
    })?;
    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| BrokerError::Decode(e.to_string()))?;
    let tokens = QuestradeTokens::from_response(body, "")?;
    info!("Token obtained successfully for {}", tokens.api_server);
    Ok(tokens)
}

struct Session {
    access_token: Option<Zeroizing<String>>,
    refresh_token: Option<Zeroizing<String>>,
    api_server: String,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    #[serde(default)]
    accounts: Vec<QuestradeAccount>,
}

#[derive(Debug, Clone, Deserialize)]
struct QuestradeAccount {
    number: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalancesResponse {
    #[serde(default)]
    per_currency_balances: Vec<CurrencyBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrencyBalance {
    currency: String,
    #[serde(default)]
    cash: f64,
    #[serde(default)]
    total_equity: f64,
    #[serde(default)]
    buying_power: f64,
}

#[derive(Debug, Deserialize)]
struct PositionsResponse {
    #[serde(default)]
    positions: Vec<QuestradePosition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestradePosition {
    symbol: String,
    #[serde(alias = "quantity")]
    open_quantity: f64,
    #[serde(default)]
    average_entry_price: Option<f64>,
    #[serde(default)]
    current_price: Option<f64>,
    #[serde(default)]
    current_market_value: Option<f64>,
    #[serde(default)]
    open_pnl: Option<f64>,
}

impl From<QuestradePosition> for Position {
    fn from(p: QuestradePosition) -> Self {
        Position {
            symbol: p.symbol,
            qty: p.open_quantity,
            avg_entry_price: p.average_entry_price.unwrap_or_default(),
            current_price: p.current_price,
            market_value: p.current_market_value,
            unrealized_pnl: p.open_pnl,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SymbolSearchResponse {
    #[serde(default)]
    symbols: Vec<SymbolMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolMatch {
    symbol: String,
    symbol_id: u64,
}

#[derive(Debug, Deserialize)]
struct QuotesResponse {
    #[serde(default)]
    quotes: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Quote {
    #[serde(default)]
    last_trade_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    #[serde(default)]
    candles: Vec<Candle>,
}

#[derive(Debug, Deserialize)]
struct Candle {
    start: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuestradeOrderRequest {
    account_id: String,
    symbol_id: u64,
    quantity: u64,
    action: &'static str,
    order_type: &'static str,
    time_in_force: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<f64>,
    primary_route: &'static str,
    secondary_route: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    #[serde(default)]
    order_id: Option<u64>,
    #[serde(default)]
    orders: Vec<PlacedOrder>,
}

#[derive(Debug, Deserialize)]
struct PlacedOrder {
    id: u64,
}

fn action(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "Buy",
        OrderSide::Sell => "Sell",
    }
}

fn time_in_force(tif: TimeInForce) -> &'static str {
    match tif {
        TimeInForce::Day => "Day",
        TimeInForce::Gtc => "GoodTillCanceled",
        TimeInForce::Ioc => "ImmediateOrCancel",
    }
}

/// Questrade trades whole shares
pub fn whole_shares(qty: f64) -> u64 {
    if qty.is_finite() && qty > 0.0 {
        qty.floor() as u64
    } else {
        0
    }
}

pub struct QuestradeClient {
    client: Client,
    login_url: String,
    session: RwLock<Session>,
    account: OnceCell<QuestradeAccount>,
    symbol_ids: Mutex<HashMap<String, u64>>,
    limiter: RequestLimiter,
}

impl QuestradeClient {
    pub fn new(settings: &QuestradeSettings) -> Self {
        Self {
            client: Client::new(),
            login_url: settings.login_url.trim_end_matches('/').to_string(),
            session: RwLock::new(Session {
                access_token: settings.access_token.clone(),
                refresh_token: settings.refresh_token.clone(),
                api_server: settings.api_base_url.trim_end_matches('/').to_string(),
            }),
            account: OnceCell::new(),
            symbol_ids: Mutex::new(HashMap::new()),
            limiter: create_rate_limiter(RateLimiterConfig {
                requests_per_minute: QUESTRADE_REQUESTS_PER_MINUTE,
            }),
        }
    }

    /// Current refresh token, which changes after every refresh
    pub async fn refresh_token(&self) -> Option<Zeroizing<String>> {
        self.session.read().await.refresh_token.clone()
    }

    pub async fn api_server(&self) -> String {
        self.session.read().await.api_server.clone()
    }

    pub async fn refresh_access_token(&self) -> BrokerResult<QuestradeTokens> {
        let mut session = self.session.write().await;
        self.refresh_session(&mut session).await
    }

    /// Refresh unless another request already replaced the `rejected` token
    async fn refresh_if_current(&self, rejected: Option<&str>) -> BrokerResult<()> {
        let mut session = self.session.write().await;
        if let Some(current) = session.access_token.as_deref() {
            if rejected != Some(current.as_str()) {
                debug!("Access token already refreshed, skipping refresh");
                return Ok(());
            }
        }
        self.refresh_session(&mut session).await.map(|_| ())
    }

    async fn refresh_session(&self, session: &mut Session) -> BrokerResult<QuestradeTokens> {
        let refresh_token = session.refresh_token.clone().ok_or_else(|| {
            BrokerError::TokenRefresh("QUESTRADE_REFRESH_TOKEN is not configured".to_string())
        })?;

        let url = format!("{}/oauth2/token", self.login_url);
        throttle(&self.limiter).await;
        let response = self
            .client
            .post(&url)
            .query(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::TokenRefresh(format!("{} - {}", status, body)));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::TokenRefresh(format!("invalid token response: {}", e)))?;
        let tokens = QuestradeTokens::from_response(body, &session.api_server)?;

        session.access_token = Some(tokens.access_token.clone());
        session.api_server = tokens.api_server.clone();
        if let Some(rotated) = &tokens.refresh_token {
            session.refresh_token = Some(rotated.clone());
        }
        info!(
            "Access token refreshed successfully ({}), API server {}",
            mask_key(&tokens.access_token),
            tokens.api_server
        );
        Ok(tokens)
    }

    async fn session_snapshot(&self) -> (Option<Zeroizing<String>>, String) {
        let session = self.session.read().await;
        (session.access_token.clone(), session.api_server.clone())
    }

    async fn send_with(
        &self,
        token: &str,
        server: &str,
        method: &Method,
        path: &str,
        body: Option<&Value>,
    ) -> BrokerResult<Response> {
        let url = format!("{}{}", server, path);
        let mut request = self.client.request(method.clone(), &url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        throttle(&self.limiter).await;
        Ok(request.send().await?)
    }

    /// Send an API request, refreshing the token and retrying once on 401
    ///
    /// A 401 on the retry is returned as `Unauthorized`.
    async fn api_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> BrokerResult<Response> {
        let (token, server) = self.session_snapshot().await;
        let rejected = match token {
            Some(token) => {
                let response = self
                    .send_with(&token, &server, &method, path, body)
                    .await?;
                if response.status() != StatusCode::UNAUTHORIZED {
                    return ensure_success(response).await;
                }
                warn!("Questrade {} (access token rejected), refreshing", path);
                Some(token)
            }
            None => {
                warn!("Questrade {} (no access token), refreshing", path);
                None
            }
        };
        self.refresh_if_current(rejected.as_deref().map(String::as_str))
            .await?;

        let (token, server) = self.session_snapshot().await;
        let token =
            token.ok_or_else(|| BrokerError::Unauthorized("no access token".to_string()))?;
        let response = self
            .send_with(&token, &server, &method, path, body)
            .await?;
        ensure_success(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> BrokerResult<T> {
        let response = self.api_request(Method::GET, path, None).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BrokerError::Decode(format!("{}: {}", path, e)))
    }

    /// First account on the login, cached after the first lookup
    async fn account(&self) -> BrokerResult<&QuestradeAccount> {
        self.account
            .get_or_try_init(|| async {
                let response: AccountsResponse = self.get_json("/v1/accounts").await?;
                let account = response
                    .accounts
                    .into_iter()
                    .next()
                    .ok_or_else(|| BrokerError::NotFound("no Questrade accounts".to_string()))?;
                info!(
                    "Using Questrade account {} ({})",
                    account.number,
                    account.status.as_deref().unwrap_or("unknown status")
                );
                Ok::<_, BrokerError>(account)
            })
            .await
    }

    pub async fn account_id(&self) -> BrokerResult<String> {
        Ok(self.account().await?.number.clone())
    }

    pub async fn symbol_id(&self, symbol: &str) -> BrokerResult<u64> {
        let key = symbol.to_uppercase();
        if let Some(id) = self.symbol_ids.lock().await.get(&key) {
            return Ok(*id);
        }

        let mut url = url::Url::parse("http://placeholder/v1/symbols/search")
            .map_err(|e| BrokerError::Http(e.to_string()))?;
        url.query_pairs_mut().append_pair("prefix", &key);
        let path = format!("{}?{}", url.path(), url.query().unwrap_or_default());

        let response: SymbolSearchResponse = self.get_json(&path).await?;
        let found = response
            .symbols
            .iter()
            .find(|m| same_symbol(&m.symbol, &key))
            .or_else(|| response.symbols.first())
            .map(|m| m.symbol_id)
            .ok_or_else(|| BrokerError::NotFound(format!("symbol {}", key)))?;

        debug!("Resolved {} to symbol id {}", key, found);
        self.symbol_ids.lock().await.insert(key, found);
        Ok(found)
    }
}

#[async_trait]
impl BrokerClient for QuestradeClient {
    fn name(&self) -> &str {
        "Questrade"
    }

    fn broker(&self) -> Broker {
        Broker::Questrade
    }

    async fn get_account(&self) -> BrokerResult<Account> {
        let account = self.account().await?;
        let id = account.number.clone();
        let balances: BalancesResponse = self
            .get_json(&format!("/v1/accounts/{}/balances", id))
            .await?;
        let balance = balances
            .per_currency_balances
            .iter()
            .find(|b| b.currency == "USD")
            .or_else(|| balances.per_currency_balances.first())
            .ok_or_else(|| BrokerError::Decode("no balances returned".to_string()))?;

        Ok(Account {
            id,
            status: account
                .status
                .clone()
                .unwrap_or_else(|| "Active".to_string()),
            cash: balance.cash,
            equity: balance.total_equity,
            buying_power: balance.buying_power,
        })
    }

    async fn list_positions(&self) -> BrokerResult<Vec<Position>> {
        let id = self.account_id().await?;
        let response: PositionsResponse = self
            .get_json(&format!("/v1/accounts/{}/positions", id))
            .await?;
        Ok(response
            .positions
            .into_iter()
            .filter(|p| p.open_quantity != 0.0)
            .map(Position::from)
            .collect())
    }

    async fn get_position(&self, symbol: &str) -> BrokerResult<Option<Position>> {
        let positions = self.list_positions().await?;
        Ok(positions.into_iter().find(|p| same_symbol(&p.symbol, symbol)))
    }

    async fn submit_order(&self, order: &Order) -> BrokerResult<String> {
        let quantity = whole_shares(order.quantity.value());
        if quantity == 0 {
            return Err(BrokerError::InvalidOrder(format!(
                "{} {} rounds to zero whole shares",
                order.quantity, order.symbol
            )));
        }

        let account_id = self.account_id().await?;
        let symbol_id = self.symbol_id(&order.symbol).await?;
        let (order_type, limit_price) = match order.order_type {
            OrderType::Market => ("Market", None),
            OrderType::Limit => ("Limit", order.limit_price.map(|p| p.value())),
        };
        let payload = QuestradeOrderRequest {
            account_id: account_id.clone(),
            symbol_id,
            quantity,
            action: action(order.side),
            order_type,
            time_in_force: time_in_force(order.time_in_force),
            limit_price,
            primary_route: "AUTO",
            secondary_route: "AUTO",
        };
        let body = serde_json::to_value(&payload)
            .map_err(|e| BrokerError::InvalidOrder(e.to_string()))?;

        let response = self
            .api_request(
                Method::POST,
                &format!("/v1/accounts/{}/orders", account_id),
                Some(&body),
            )
            .await?;
        let placed: OrderResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::Decode(format!("order response: {}", e)))?;
        let order_id = placed
            .order_id
            .or_else(|| placed.orders.first().map(|o| o.id))
            .map(|id| id.to_string())
            .unwrap_or_default();

        debug!(
            "Order placed: {} {} units of {} (order {})",
            order.side, quantity, order.symbol, order_id
        );
        Ok(order_id)
    }

    async fn close_position(&self, symbol: &str) -> BrokerResult<()> {
        let position = self
            .get_position(symbol)
            .await?
            .ok_or_else(|| BrokerError::NotFound(format!("no open position in {}", symbol)))?;
        let order = Order::market(
            &position.symbol,
            OrderSide::Sell,
            Quantity::new(position.qty.abs())
                .map_err(|e| BrokerError::InvalidOrder(e.to_string()))?,
            TimeInForce::Gtc,
        )
        .map_err(|e| BrokerError::InvalidOrder(e.to_string()))?;
        self.submit_order(&order).await?;
        info!("Position closed for {}: {} units sold", symbol, position.qty);
        Ok(())
    }

    async fn latest_price(&self, symbol: &str) -> BrokerResult<f64> {
        let id = self.symbol_id(symbol).await?;
        let response: QuotesResponse = self.get_json(&format!("/v1/markets/quotes/{}", id)).await?;
        response
            .quotes
            .first()
            .and_then(|q| q.last_trade_price)
            .filter(|p| *p > 0.0)
            .ok_or_else(|| BrokerError::NoPrice(symbol.to_string()))
    }

    async fn bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BrokerResult<Vec<Bar>> {
        let id = self.symbol_id(symbol).await?;
        let mut url = url::Url::parse(&format!("http://placeholder/v1/markets/candles/{}", id))
            .map_err(|e| BrokerError::Http(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("startTime", &start.to_rfc3339_opts(SecondsFormat::Secs, false))
            .append_pair("endTime", &end.to_rfc3339_opts(SecondsFormat::Secs, false))
            .append_pair("interval", "OneMinute");
        let path = format!("{}?{}", url.path(), url.query().unwrap_or_default());

        let response: CandlesResponse = self.get_json(&path).await?;
        Ok(response
            .candles
            .into_iter()
            .map(|c| Bar {
                timestamp: c.start,
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
            })
            .collect())
    }

    async fn list_tradable_assets(&self) -> BrokerResult<Vec<Asset>> {
        Err(BrokerError::Unsupported("Questrade".to_string()))
    }
}
