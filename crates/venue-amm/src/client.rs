//! AMM venue REST client.
//!
//! Orders are EIP-712 typed data signed by the user's signer and posted
//! with per-request signed headers. The client owns the venue nonce,
//! which increments only on successful placement, making placement
//! idempotent across retries of a failed attempt.

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use arbot_core::adapter::{
    OpenOrder, OrderRequest, OrderStatusReport, PlaceOrderResult, QuoteFeed, VenueAdapter,
};
use arbot_core::signer::parse_address;
use arbot_core::types::{MarketQuote, Venue};
use arbot_core::{Signer, TxRequest, VenueError};
use async_trait::async_trait;
use chrono::Utc;

use crate::sign::{build_order, order_digest, request_message, BuildOrderParams};
use crate::types::{
    RawBalanceResponse, RawMarketsResponse, RawOpenOrdersResponse, RawOrderStatus,
    RawPlaceResponse,
};

// =============================================================================
// Constants
// =============================================================================

/// Maximum transport-level retries per request.
const MAX_TRANSPORT_RETRIES: u32 = 2;

/// Base backoff between transport retries; doubles per attempt.
const RETRY_BACKOFF_MS: u64 = 250;

/// Gas limit for approval transactions.
const APPROVAL_GAS_LIMIT: u64 = 100_000;

/// ERC-20 `approve(address,uint256)` selector.
const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

/// ERC-1155 `setApprovalForAll(address,bool)` selector.
const SET_APPROVAL_FOR_ALL_SELECTOR: [u8; 4] = [0xa2, 0x2c, 0xb4, 0x65];

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the AMM venue client.
#[derive(Debug, Clone)]
pub struct AmmVenueConfig {
    /// REST base URL.
    pub base_url: String,
    /// Chain id for order signing and approvals.
    pub chain_id: u64,
    /// Exchange contract: EIP-712 verifying contract and approval spender.
    pub exchange_address: String,
    /// Stable token (ERC-20) contract.
    pub stable_token: String,
    /// Outcome token (ERC-1155) contract.
    pub outcome_token: String,
    /// Per-request deadline in seconds.
    pub timeout_secs: u64,
    /// Rate limit.
    pub requests_per_minute: NonZeroU32,
    /// Short-circuit network mutations.
    pub dry_run: bool,
}

impl Default for AmmVenueConfig {
    fn default() -> Self {
        Self {
            base_url: "https://amm.example.exchange/api/v1".to_string(),
            chain_id: 137,
            exchange_address: "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E".to_string(),
            stable_token: "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174".to_string(),
            outcome_token: "0x4D97DCd97eC945f40cF65F87097ACe5EA0476045".to_string(),
            timeout_secs: 10,
            requests_per_minute: nonzero!(120u32),
            dry_run: false,
        }
    }
}

impl AmmVenueConfig {
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
// Client
// =============================================================================

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// AMM venue adapter bound to one user's signer.
pub struct AmmVenue {
    config: AmmVenueConfig,
    http: Client,
    limiter: Arc<DirectLimiter>,
    signer: Arc<dyn Signer>,
    nonce: AtomicU64,
    approvals_done: AtomicBool,
    approvals_guard: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for AmmVenue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmmVenue")
            .field("base_url", &self.config.base_url)
            .field("address", &self.signer.address())
            .field("dry_run", &self.config.dry_run)
            .finish_non_exhaustive()
    }
}

impl AmmVenue {
    /// Creates a new client.
    ///
    /// # Errors
    /// Returns a configuration error if the HTTP client cannot be built
    /// or the configured contract addresses are malformed.
    pub fn new(config: AmmVenueConfig, signer: Arc<dyn Signer>) -> Result<Self, VenueError> {
        parse_address(&config.exchange_address)
            .map_err(|e| VenueError::Configuration(e.to_string()))?;
        parse_address(&config.stable_token)
            .map_err(|e| VenueError::Configuration(e.to_string()))?;
        parse_address(&config.outcome_token)
            .map_err(|e| VenueError::Configuration(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VenueError::Configuration(format!("failed to build HTTP client: {e}")))?;
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(
            config.requests_per_minute,
        )));

        Ok(Self {
            config,
            http,
            limiter,
            signer,
            nonce: AtomicU64::new(0),
            approvals_done: AtomicBool::new(false),
            approvals_guard: tokio::sync::Mutex::new(()),
        })
    }

    /// Returns the current venue nonce.
    #[must_use]
    pub fn nonce(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }

    /// Sends one signed request, classifying the response.
    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, VenueError> {
        let url = format!("{}{}", self.config.base_url, path);
        let body_bytes = match body {
            Some(value) => serde_json::to_vec(value)
                .map_err(|e| VenueError::Serialization(e.to_string()))?,
            None => Vec::new(),
        };

        let timestamp = Utc::now().timestamp();
        let message = request_message(timestamp, method.as_str(), path, &body_bytes);
        let signature = self
            .signer
            .sign_message(&message)
            .await
            .map_err(|e| VenueError::Configuration(e.to_string()))?;

        debug!(method = %method, url = %url, "amm request");

        let mut request = self
            .http
            .request(method, &url)
            .header("Accept", "application/json")
            .header("X-Account-Address", self.signer.address())
            .header("X-Timestamp", timestamp.to_string())
            .header("X-Signature", signature);
        if body.is_some() {
            request = request
                .header("Content-Type", "application/json")
                .body(body_bytes);
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
    /// retries with exponential backoff and one re-authentication on a
    /// 401-class failure.
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
                    warn!(error = %e, "auth failure, re-authenticating once");
                    self.authenticate().await?;
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
impl VenueAdapter for AmmVenue {
    fn venue(&self) -> Venue {
        Venue::Amm
    }

    async fn authenticate(&self) -> Result<(), VenueError> {
        // Every request carries fresh signed headers; there is no session
        // to establish.
        Ok(())
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

        // The nonce is claimed only after the venue accepts; a failed
        // attempt re-signs the same nonce and stays idempotent.
        let nonce = self.nonce.load(Ordering::SeqCst) + 1;
        let order = match build_order(&BuildOrderParams {
            maker: self.signer.address(),
            token_id: &request.token_id,
            side: request.side,
            price: request.price,
            size: request.size,
            nonce,
            expiration: 0,
        }) {
            Ok(order) => order,
            Err(e) => return PlaceOrderResult::failed(format!("validation: {e}")),
        };
        let digest = match order_digest(&order, self.config.chain_id, &self.config.exchange_address)
        {
            Ok(digest) => digest,
            Err(e) => return PlaceOrderResult::failed(format!("validation: {e}")),
        };
        let signature = match self.signer.sign_digest(digest).await {
            Ok(signature) => signature,
            Err(e) => return PlaceOrderResult::failed(format!("signing: {e}")),
        };

        let body = serde_json::json!({
            "market_id": request.market_id,
            "token_id": request.token_id,
            "side": request.side,
            "price": request.price.to_string(),
            "size": request.size.to_string(),
            "nonce": nonce,
            "expiration": 0,
            "signature": signature,
        });

        match self.send_json(Method::POST, "/orders", Some(&body)).await {
            Ok(value) => {
                let raw: RawPlaceResponse = match serde_json::from_value(value) {
                    Ok(raw) => raw,
                    Err(e) => return PlaceOrderResult::failed(format!("malformed response: {e}")),
                };
                if let Some(error) = raw.error {
                    // Business rejection: the nonce stays unclaimed.
                    return PlaceOrderResult::failed(error);
                }
                match raw.order_id {
                    Some(order_id) => {
                        self.nonce.store(nonce, Ordering::SeqCst);
                        let status = raw
                            .status
                            .as_deref()
                            .map(arbot_core::OrderStatus::normalize);
                        PlaceOrderResult::accepted(order_id, status)
                    }
                    None => PlaceOrderResult::failed("response missing order_id"),
                }
            }
            Err(e) => PlaceOrderResult::failed(e.to_string()),
        }
    }

    async fn cancel_order(&self, order_id: &str, token_id: &str) -> bool {
        if self.config.dry_run {
            return true;
        }
        let path = format!("/orders/{order_id}?token_id={token_id}");
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
            Ok(value) => match serde_json::from_value::<RawOrderStatus>(value) {
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
        match self.send_json(Method::GET, "/orders?status=open", None).await {
            Ok(value) => serde_json::from_value::<RawOpenOrdersResponse>(value)
                .map(|raw| {
                    raw.orders
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
        if self.config.dry_run || self.approvals_done.load(Ordering::SeqCst) {
            return false;
        }
        let _guard = self.approvals_guard.lock().await;
        if self.approvals_done.load(Ordering::SeqCst) {
            return false;
        }

        let exchange = match parse_address(&self.config.exchange_address) {
            Ok(address) => address,
            Err(e) => {
                warn!(error = %e, "bad exchange address, skipping approvals");
                return false;
            }
        };

        let stable_approve = TxRequest {
            to: self.config.stable_token.clone(),
            value_wei: 0,
            data: erc20_approve_calldata(&exchange),
            gas_limit: APPROVAL_GAS_LIMIT,
        };
        let outcome_approve = TxRequest {
            to: self.config.outcome_token.clone(),
            value_wei: 0,
            data: erc1155_set_approval_calldata(&exchange),
            gas_limit: APPROVAL_GAS_LIMIT,
        };

        for (label, tx) in [("stable", stable_approve), ("outcome", outcome_approve)] {
            match self.signer.send_transaction(&tx).await {
                Ok(tx_hash) => {
                    debug!(label, tx_hash = %tx_hash, "approval submitted");
                }
                Err(e) => {
                    // The agent keeps running; placement will surface the
                    // missing allowance if it matters.
                    warn!(label, error = %e, "approval failed, continuing");
                    return false;
                }
            }
        }
        self.approvals_done.store(true, Ordering::SeqCst);
        true
    }

    async fn get_balance(&self) -> Result<Decimal, VenueError> {
        let path = format!("/balance/{}", self.signer.address());
        let value = self.send_json(Method::GET, &path, None).await?;
        let raw: RawBalanceResponse = serde_json::from_value(value)
            .map_err(|e| VenueError::Serialization(e.to_string()))?;
        Ok(raw.balance.unwrap_or(Decimal::ZERO))
    }
}

#[async_trait]
impl QuoteFeed for AmmVenue {
    fn venue(&self) -> Venue {
        Venue::Amm
    }

    async fn fetch_quotes(&self, market_ids: &[String]) -> Result<Vec<MarketQuote>, VenueError> {
        if market_ids.is_empty() {
            return Ok(Vec::new());
        }
        let path = format!("/markets?ids={}", market_ids.join(","));
        let value = self.send_json(Method::GET, &path, None).await?;
        let raw: RawMarketsResponse = serde_json::from_value(value)
            .map_err(|e| VenueError::Serialization(e.to_string()))?;
        Ok(raw
            .markets
            .unwrap_or_default()
            .into_iter()
            .map(crate::types::RawMarketBook::into_quote)
            .collect())
    }
}

// =============================================================================
// Approval Calldata
// =============================================================================

/// Builds ERC-20 `approve(spender, MAX_UINT256)` calldata.
fn erc20_approve_calldata(spender: &[u8; 20]) -> Vec<u8> {
    let mut data = Vec::with_capacity(68);
    data.extend_from_slice(&APPROVE_SELECTOR);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(spender);
    data.extend_from_slice(&[0xff; 32]);
    data
}

/// Builds ERC-1155 `setApprovalForAll(operator, true)` calldata.
fn erc1155_set_approval_calldata(operator: &[u8; 20]) -> Vec<u8> {
    let mut data = Vec::with_capacity(68);
    data.extend_from_slice(&SET_APPROVAL_FOR_ALL_SELECTOR);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(operator);
    let mut approved = [0u8; 32];
    approved[31] = 1;
    data.extend_from_slice(&approved);
    data
}
