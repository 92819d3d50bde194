//! CLOB venue REST client.
//!
//! Requests ride a bearer session token obtained by signing the venue's
//! challenge. Orders are EIP-712 typed data posted to `/orders`; the
//! client holds the order nonce and increments it only on success.

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Method, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sha3::{Digest, Keccak256};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use arbot_core::adapter::{
    OpenOrder, OrderRequest, OrderStatusReport, PlaceOrderResult, QuoteFeed, VenueAdapter,
};
use arbot_core::signer::parse_address;
use arbot_core::types::{MarketQuote, Venue};
use arbot_core::{OrderStatus, Side, Signer, VenueError};
use async_trait::async_trait;

use crate::auth::SessionAuth;
use crate::types::{
    RawClobBalance, RawClobBooks, RawClobOpenOrders, RawClobOrderStatus, RawClobPlaceResponse,
};

// =============================================================================
// Constants
// =============================================================================

/// Maximum transport-level retries per request.
const MAX_TRANSPORT_RETRIES: u32 = 2;

/// Base backoff between transport retries; doubles per attempt.
const RETRY_BACKOFF_MS: u64 = 250;

/// EIP-712 domain name for the venue's settlement contract.
const DOMAIN_NAME: &str = "Binary CLOB";

/// EIP-712 domain version.
const DOMAIN_VERSION: &str = "1";

/// Stable token decimals.
const STABLE_DECIMALS: u32 = 6;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the CLOB venue client.
#[derive(Debug, Clone)]
pub struct ClobVenueConfig {
    /// REST base URL.
    pub base_url: String,
    /// Chain id for order signing.
    pub chain_id: u64,
    /// Settlement contract the typed data is verified against.
    pub exchange_address: String,
    /// Per-request deadline in seconds.
    pub timeout_secs: u64,
    /// Rate limit.
    pub requests_per_minute: NonZeroU32,
    /// Short-circuit network mutations.
    pub dry_run: bool,
}

impl Default for ClobVenueConfig {
    fn default() -> Self {
        Self {
            base_url: "https://clob.example.exchange".to_string(),
            chain_id: 137,
            exchange_address: "0xC5d563A36AE78145C45a50134d48A1215220f80a".to_string(),
            timeout_secs: 10,
            requests_per_minute: nonzero!(120u32),
            dry_run: false,
        }
    }
}

impl ClobVenueConfig {
    /// Sets the base URL (useful for tests).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Enables dry-run mode.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

// =============================================================================
// Typed Order Digest
// =============================================================================

fn keccak(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

fn word_u64(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&value.to_be_bytes());
    out
}

/// Computes the EIP-712 digest the venue expects on `/orders`.
///
/// Struct: `Order(address maker,bytes32 tokenId,uint256 makerAmount,
/// uint256 takerAmount,uint256 nonce,uint8 side)`.
fn clob_order_digest(
    maker: &str,
    token_id: &str,
    maker_amount: u64,
    taker_amount: u64,
    nonce: u64,
    side: Side,
    chain_id: u64,
    exchange: &str,
) -> Result<[u8; 32], VenueError> {
    let maker_bytes =
        parse_address(maker).map_err(|e| VenueError::Configuration(e.to_string()))?;
    let exchange_bytes =
        parse_address(exchange).map_err(|e| VenueError::Configuration(e.to_string()))?;

    let mut domain = Vec::with_capacity(5 * 32);
    domain.extend_from_slice(&keccak(
        b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
    ));
    domain.extend_from_slice(&keccak(DOMAIN_NAME.as_bytes()));
    domain.extend_from_slice(&keccak(DOMAIN_VERSION.as_bytes()));
    domain.extend_from_slice(&word_u64(chain_id));
    let mut contract_word = [0u8; 32];
    contract_word[12..].copy_from_slice(&exchange_bytes);
    domain.extend_from_slice(&contract_word);
    let domain_separator = keccak(&domain);

    let mut encoded = Vec::with_capacity(7 * 32);
    encoded.extend_from_slice(&keccak(
        b"Order(address maker,bytes32 tokenId,uint256 makerAmount,uint256 takerAmount,\
uint256 nonce,uint8 side)",
    ));
    let mut maker_word = [0u8; 32];
    maker_word[12..].copy_from_slice(&maker_bytes);
    encoded.extend_from_slice(&maker_word);
    encoded.extend_from_slice(&keccak(token_id.as_bytes()));
    encoded.extend_from_slice(&word_u64(maker_amount));
    encoded.extend_from_slice(&word_u64(taker_amount));
    encoded.extend_from_slice(&word_u64(nonce));
    encoded.extend_from_slice(&word_u64(match side {
        Side::Buy => 0,
        Side::Sell => 1,
    }));
    let struct_hash = keccak(&encoded);

    let mut data = Vec::with_capacity(66);
    data.push(0x19);
    data.push(0x01);
    data.extend_from_slice(&domain_separator);
    data.extend_from_slice(&struct_hash);
    Ok(keccak(&data))
}

// =============================================================================
// Client
// =============================================================================

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// CLOB venue adapter bound to one user's signer.
pub struct ClobVenue {
    config: ClobVenueConfig,
    http: Client,
    limiter: Arc<DirectLimiter>,
    signer: Arc<dyn Signer>,
    auth: SessionAuth,
    nonce: AtomicU64,
}

impl std::fmt::Debug for ClobVenue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClobVenue")
            .field("base_url", &self.config.base_url)
            .field("address", &self.signer.address())
            .field("dry_run", &self.config.dry_run)
            .finish_non_exhaustive()
    }
}

impl ClobVenue {
    /// Creates a new client.
    ///
    /// # Errors
    /// Returns a configuration error if the HTTP client cannot be built
    /// or the exchange address is malformed.
    pub fn new(config: ClobVenueConfig, signer: Arc<dyn Signer>) -> Result<Self, VenueError> {
        parse_address(&config.exchange_address)
            .map_err(|e| VenueError::Configuration(e.to_string()))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VenueError::Configuration(format!("failed to build HTTP client: {e}")))?;
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(
            config.requests_per_minute,
        )));
        let auth = SessionAuth::new(http.clone(), config.base_url.clone(), signer.clone());

        Ok(Self {
            config,
            http,
            limiter,
            signer,
            auth,
            nonce: AtomicU64::new(0),
        })
    }

    /// Returns the current venue nonce.
    #[must_use]
    pub fn nonce(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }

    /// Returns the session manager (visible for tests).
    #[must_use]
    pub fn session(&self) -> &SessionAuth {
        &self.auth
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, VenueError> {
        let bearer = self.auth.bearer().await?;
        let url = format!("{}{}", self.config.base_url, path);
        debug!(method = %method, url = %url, "clob request");

        let mut request = self
            .http
            .request(method, &url)
            .header("Accept", "application/json")
            .bearer_auth(bearer);
        if let Some(value) = body {
            request = request.json(value);
        }

        let response = request.send().await.map_err(VenueError::from)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let text = response.text().await.unwrap_or_default();
            return Err(VenueError::Auth(text));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(VenueError::api(status.as_u16(), text));
        }
        response
            .json::<serde_json::Value>()
            .await
            .map_err(VenueError::from)
    }

    /// Sends a request under the retry policy: at most two transport
    /// retries, one session refresh on a 401-class failure.
    async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, VenueError> {
        let mut transport_attempts = 0u32;
        let mut reauthed = false;
        loop {
            self.limiter.until_ready().await;
            match self.send_once(method.clone(), path, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_auth() && !reauthed => {
                    reauthed = true;
                    warn!(error = %e, "session rejected, re-authenticating once");
                    self.auth.invalidate();
                    self.auth.authenticate().await?;
                }
                Err(e) if e.is_transient() && transport_attempts < MAX_TRANSPORT_RETRIES => {
                    transport_attempts += 1;
                    let backoff =
                        Duration::from_millis(RETRY_BACKOFF_MS << (transport_attempts - 1));
                    debug!(error = %e, attempt = transport_attempts, "transient failure, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl VenueAdapter for ClobVenue {
    fn venue(&self) -> Venue {
        Venue::Clob
    }

    async fn authenticate(&self) -> Result<(), VenueError> {
        self.auth.authenticate().await.map(|_| ())
    }

    async fn place_order(&self, request: &OrderRequest) -> PlaceOrderResult {
        if request.size <= Decimal::ZERO {
            return PlaceOrderResult::failed("validation: size must be positive");
        }
        if request.price <= Decimal::ZERO || request.price >= Decimal::ONE {
            return PlaceOrderResult::failed("validation: price must be in (0, 1)");
        }
        if self.config.dry_run {
            self.nonce.fetch_add(1, Ordering::SeqCst);
            return PlaceOrderResult::dry_run();
        }

        let scale = Decimal::from(10u64.pow(STABLE_DECIMALS));
        let stable = (request.price * request.size * scale).floor().to_u64();
        let tokens = (request.size * scale).floor().to_u64();
        let (Some(stable), Some(tokens)) = (stable, tokens) else {
            return PlaceOrderResult::failed("validation: amounts out of range");
        };
        let (maker_amount, taker_amount) = match request.side {
            Side::Buy => (stable, tokens),
            Side::Sell => (tokens, stable),
        };

        let nonce = self.nonce.load(Ordering::SeqCst) + 1;
        let digest = match clob_order_digest(
            self.signer.address(),
            &request.token_id,
            maker_amount,
            taker_amount,
            nonce,
            request.side,
            self.config.chain_id,
            &self.config.exchange_address,
        ) {
            Ok(digest) => digest,
            Err(e) => return PlaceOrderResult::failed(format!("validation: {e}")),
        };
        let signature = match self.signer.sign_digest(digest).await {
            Ok(signature) => signature,
            Err(e) => return PlaceOrderResult::failed(format!("signing: {e}")),
        };

        let body = serde_json::json!({
            "market": request.market_id,
            "asset_id": request.token_id,
            "side": request.side,
            "price": request.price.to_string(),
            "size": request.size.to_string(),
            "nonce": nonce,
            "signature": signature,
        });

        match self.send_json(Method::POST, "/orders", Some(&body)).await {
            Ok(value) => {
                let raw: RawClobPlaceResponse = match serde_json::from_value(value) {
                    Ok(raw) => raw,
                    Err(e) => return PlaceOrderResult::failed(format!("malformed response: {e}")),
                };
                if raw.success == Some(false) || raw.error_msg.is_some() {
                    return PlaceOrderResult::failed(
                        raw.error_msg.unwrap_or_else(|| "order rejected".to_string()),
                    );
                }
                match raw.order_id {
                    Some(order_id) => {
                        self.nonce.store(nonce, Ordering::SeqCst);
                        let status = raw.status.as_deref().map(OrderStatus::normalize);
                        PlaceOrderResult::accepted(order_id, status)
                    }
                    None => PlaceOrderResult::failed("response missing orderID"),
                }
            }
            Err(e) => PlaceOrderResult::failed(e.to_string()),
        }
    }

    async fn cancel_order(&self, order_id: &str, _token_id: &str) -> bool {
        if self.config.dry_run {
            return true;
        }
        let path = format!("/orders/{order_id}");
        match self.send_json(Method::DELETE, &path, None).await {
            Ok(_) => true,
            Err(e) => {
                warn!(order_id, error = %e, "cancel failed");
                false
            }
        }
    }

    async fn get_order_status(&self, order_id: &str) -> OrderStatusReport {
        let path = format!("/orders/{order_id}");
        match self.send_json(Method::GET, &path, None).await {
            Ok(value) => match serde_json::from_value::<RawClobOrderStatus>(value) {
                Ok(raw) => raw.into(),
                Err(e) => {
                    warn!(order_id, error = %e, "malformed status response");
                    OrderStatusReport::unknown(order_id)
                }
            },
            Err(e) => {
                debug!(order_id, error = %e, "status fetch failed");
                OrderStatusReport::unknown(order_id)
            }
        }
    }

    async fn get_open_orders(&self) -> Vec<OpenOrder> {
        match self.send_json(Method::GET, "/orders?state=live", None).await {
            Ok(value) => serde_json::from_value::<RawClobOpenOrders>(value)
                .map(|raw| {
                    raw.data
                        .unwrap_or_default()
                        .into_iter()
                        .map(OpenOrder::from)
                        .collect()
                })
                .unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "open orders fetch failed");
                Vec::new()
            }
        }
    }

    async fn ensure_approvals(&self) -> bool {
        // Custody sits with the venue once the session is established;
        // there is no spender contract to approve.
        debug!("clob venue requires no on-chain approvals");
        false
    }

    async fn get_balance(&self) -> Result<Decimal, VenueError> {
        let value = self.send_json(Method::GET, "/balance", None).await?;
        let raw: RawClobBalance = serde_json::from_value(value)
            .map_err(|e| VenueError::Serialization(e.to_string()))?;
        Ok(raw.balance.unwrap_or(Decimal::ZERO))
    }
}

#[async_trait]
impl QuoteFeed for ClobVenue {
    fn venue(&self) -> Venue {
        Venue::Clob
    }

    async fn fetch_quotes(&self, market_ids: &[String]) -> Result<Vec<MarketQuote>, VenueError> {
        if market_ids.is_empty() {
            return Ok(Vec::new());
        }
        let path = format!("/books?markets={}", market_ids.join(","));
        let value = self.send_json(Method::GET, &path, None).await?;
        let raw: RawClobBooks = serde_json::from_value(value)
            .map_err(|e| VenueError::Serialization(e.to_string()))?;
        Ok(raw
            .books
            .unwrap_or_default()
            .into_iter()
            .map(crate::types::RawClobBook::into_quote)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbot_core::KeySigner;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn test_signer() -> Arc<dyn Signer> {
        Arc::new(KeySigner::from_private_key(TEST_KEY, 137).unwrap())
    }

    fn test_client(base_url: &str) -> ClobVenue {
        ClobVenue::new(
            ClobVenueConfig::default().with_base_url(base_url),
            test_signer(),
        )
        .unwrap()
    }

    async fn mount_auth(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/auth/challenge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "challenge": "prove it",
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "jwt-test",
            })))
            .mount(server)
            .await;
    }

    fn buy_request() -> OrderRequest {
        OrderRequest {
            market_id: "0xabc".to_string(),
            token_id: "no-token".to_string(),
            side: Side::Buy,
            price: dec!(0.48),
            size: dec!(10),
        }
    }

    // ==================== Placement Tests ====================

    #[tokio::test]
    async fn test_place_order_success() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "orderID": "b-1",
                "status": "LIVE",
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.place_order(&buy_request()).await;

        assert!(result.success);
        assert_eq!(result.order_id.as_deref(), Some("b-1"));
        assert_eq!(result.status, Some(OrderStatus::Open));
        assert_eq!(client.nonce(), 1);
        assert!(client.session().has_token());
    }

    #[tokio::test]
    async fn test_place_order_matched_at_submission() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "orderID": "b-2",
                "status": "MATCHED",
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.place_order(&buy_request()).await;
        assert!(result.filled_at_submission());
    }

    #[tokio::test]
    async fn test_place_order_reject_keeps_nonce() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "errorMsg": "insufficient balance",
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.place_order(&buy_request()).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("insufficient balance"));
        assert_eq!(client.nonce(), 0);
    }

    #[tokio::test]
    async fn test_expired_session_reauths_once() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        // First placement attempt hits a stale session, second succeeds.
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "orderID": "b-3",
                "status": "LIVE",
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.place_order(&buy_request()).await;
        assert!(result.success);
        assert_eq!(client.nonce(), 1);
    }

    #[tokio::test]
    async fn test_persistent_401_is_bounded() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2) // original attempt + exactly one post-reauth retry
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.place_order(&buy_request()).await;
        assert!(!result.success);
        assert_eq!(client.nonce(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_short_circuits() {
        let client = ClobVenue::new(
            ClobVenueConfig::default()
                .with_base_url("http://127.0.0.1:9")
                .with_dry_run(true),
            test_signer(),
        )
        .unwrap();

        let result = client.place_order(&buy_request()).await;
        assert!(result.success);
        assert_eq!(result.order_id.as_deref(), Some("dry-run"));
        assert!(client.cancel_order("x", "y").await);
    }

    // ==================== Status / Listing Tests ====================

    #[tokio::test]
    async fn test_get_order_status_normalizes() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("GET"))
            .and(path("/orders/b-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "b-1",
                "status": "MATCHED",
                "size_matched": "10",
                "original_size": "10",
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let report = client.get_order_status("b-1").await;
        assert_eq!(report.status, OrderStatus::Filled);
        assert_eq!(report.filled_size, dec!(10));
        assert_eq!(report.remaining_size, dec!(0));
    }

    #[tokio::test]
    async fn test_get_order_status_unknown_on_failure() {
        let client = test_client("http://127.0.0.1:9");
        let report = client.get_order_status("b-1").await;
        assert_eq!(report.status, OrderStatus::Unknown);
    }

    #[tokio::test]
    async fn test_get_open_orders() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{
                    "id": "b-1",
                    "asset_id": "no-token",
                    "side": "BUY",
                    "price": "0.48",
                    "size": "10",
                }],
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let orders = client.get_open_orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].token_id, "no-token");
    }

    #[tokio::test]
    async fn test_ensure_approvals_is_noop() {
        let client = test_client("http://127.0.0.1:9");
        assert!(!client.ensure_approvals().await);
        assert!(!client.ensure_approvals().await);
    }

    // ==================== Quote Tests ====================

    #[tokio::test]
    async fn test_fetch_quotes() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("GET"))
            .and(path("/books"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "books": [{
                    "market": "0xabc",
                    "yes_price": 480_000_000_000_000_000u64,
                    "no_price": 500_000_000_000_000_000u64,
                    "yes_depth": 55_000_000u64,
                    "no_depth": 60_000_000u64,
                }],
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let quotes = client.fetch_quotes(&["0xabc".to_string()]).await.unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].venue, Venue::Clob);
        assert_eq!(quotes[0].no_price, dec!(0.50));
    }

    // ==================== Digest Tests ====================

    #[test]
    fn test_order_digest_deterministic() {
        let maker = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";
        let exchange = "0xC5d563A36AE78145C45a50134d48A1215220f80a";
        let a = clob_order_digest(maker, "t", 1, 2, 3, Side::Buy, 137, exchange).unwrap();
        let b = clob_order_digest(maker, "t", 1, 2, 3, Side::Buy, 137, exchange).unwrap();
        assert_eq!(a, b);

        let c = clob_order_digest(maker, "t", 1, 2, 4, Side::Buy, 137, exchange).unwrap();
        assert_ne!(a, c);
    }
}
