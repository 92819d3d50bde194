//! EIP-712 order digests and per-request header signatures for the AMM
//! venue.
//!
//! The venue accepts typed-data-signed orders over REST. The digest is
//! computed locally (domain separator + struct hash) and handed to the
//! user's signer; key material never enters this module.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sha3::{Digest, Keccak256};
use thiserror::Error;

use arbot_core::signer::parse_address;
use arbot_core::{Side, SignerError};

// =============================================================================
// Constants
// =============================================================================

/// EIP-712 domain name the venue's exchange contract verifies against.
const DOMAIN_NAME: &str = "Outcome Exchange";

/// EIP-712 domain version.
const DOMAIN_VERSION: &str = "1";

/// Stable token uses 6 decimal places.
const STABLE_DECIMALS: u32 = 6;

/// Side encoding in the order struct: BUY = 0, SELL = 1.
const SIDE_BUY: u8 = 0;
const SIDE_SELL: u8 = 1;

// =============================================================================
// Errors
// =============================================================================

/// Errors from order construction.
#[derive(Debug, Error)]
pub enum OrderSignError {
    /// Invalid address format.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Price or size outside accepted bounds.
    #[error("amount error: {0}")]
    Amount(String),
}

impl From<SignerError> for OrderSignError {
    fn from(e: SignerError) -> Self {
        Self::InvalidAddress(e.to_string())
    }
}

// =============================================================================
// Typed Order
// =============================================================================

/// The order struct the exchange contract hashes.
#[derive(Debug, Clone)]
pub struct TypedOrder {
    /// Maker (and signer) address.
    pub maker: [u8; 20],
    /// Outcome token id as a uint256 word.
    pub token_id: [u8; 32],
    /// Stable units the maker spends (6 decimals).
    pub maker_amount: u64,
    /// Units the maker receives (6 decimals).
    pub taker_amount: u64,
    /// Unix expiration timestamp; 0 means none.
    pub expiration: u64,
    /// Client-held nonce.
    pub nonce: u64,
    /// 0 = BUY, 1 = SELL.
    pub side: u8,
}

/// Parameters for building a typed order.
#[derive(Debug, Clone)]
pub struct BuildOrderParams<'a> {
    /// Maker address (0x-hex).
    pub maker: &'a str,
    /// Outcome token id (decimal string or 0x-hex).
    pub token_id: &'a str,
    /// Order direction.
    pub side: Side,
    /// Limit price in (0, 1).
    pub price: Decimal,
    /// Size in whole quote units.
    pub size: Decimal,
    /// Client nonce for this placement.
    pub nonce: u64,
    /// Unix expiration; 0 for none.
    pub expiration: u64,
}

/// Builds a typed order from price and size.
///
/// Amounts land in 6-decimal stable units. BUY spends `price * size`
/// stable for `size` outcome tokens; SELL is the reverse.
pub fn build_order(params: &BuildOrderParams<'_>) -> Result<TypedOrder, OrderSignError> {
    if params.price <= Decimal::ZERO || params.price >= Decimal::ONE {
        return Err(OrderSignError::Amount(format!(
            "price must be in (0, 1), got {}",
            params.price
        )));
    }
    if params.size <= Decimal::ZERO {
        return Err(OrderSignError::Amount("size must be positive".to_string()));
    }

    let scale = Decimal::from(10u64.pow(STABLE_DECIMALS));
    let tokens = (params.size * scale).floor();
    let stable = (params.size * params.price * scale).floor();

    let to_u64 = |d: Decimal, what: &str| {
        d.to_u64()
            .ok_or_else(|| OrderSignError::Amount(format!("{what} does not fit u64: {d}")))
    };

    let (maker_amount, taker_amount, side) = match params.side {
        Side::Buy => (to_u64(stable, "stable amount")?, to_u64(tokens, "token amount")?, SIDE_BUY),
        Side::Sell => (to_u64(tokens, "token amount")?, to_u64(stable, "stable amount")?, SIDE_SELL),
    };

    Ok(TypedOrder {
        maker: parse_address(params.maker)?,
        token_id: token_id_word(params.token_id),
        maker_amount,
        taker_amount,
        expiration: params.expiration,
        nonce: params.nonce,
        side,
    })
}

// =============================================================================
// Hashing
// =============================================================================

fn keccak(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

fn domain_type_hash() -> [u8; 32] {
    keccak(
        b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
    )
}

fn order_type_hash() -> [u8; 32] {
    keccak(
        b"Order(address maker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,\
uint256 expiration,uint256 nonce,uint8 side)",
    )
}

fn word_u64(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&value.to_be_bytes());
    out
}

fn word_address(address: &[u8; 20]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(address);
    out
}

/// Encodes a token id string into a uint256 word.
///
/// Decimal and 0x-hex ids are parsed numerically; anything else is
/// keccak-hashed so distinct ids still map to distinct words.
fn token_id_word(token_id: &str) -> [u8; 32] {
    if let Some(stripped) = token_id.strip_prefix("0x") {
        if let Ok(bytes) = hex::decode(stripped) {
            if bytes.len() <= 32 {
                let mut out = [0u8; 32];
                out[32 - bytes.len()..].copy_from_slice(&bytes);
                return out;
            }
        }
    }
    if let Ok(value) = token_id.parse::<u128>() {
        let mut out = [0u8; 32];
        out[16..].copy_from_slice(&value.to_be_bytes());
        return out;
    }
    keccak(token_id.as_bytes())
}

/// Computes the EIP-712 domain separator for the exchange contract.
pub fn domain_separator(chain_id: u64, exchange: &str) -> Result<[u8; 32], OrderSignError> {
    let contract = parse_address(exchange)?;

    let mut encoded = Vec::with_capacity(5 * 32);
    encoded.extend_from_slice(&domain_type_hash());
    encoded.extend_from_slice(&keccak(DOMAIN_NAME.as_bytes()));
    encoded.extend_from_slice(&keccak(DOMAIN_VERSION.as_bytes()));
    encoded.extend_from_slice(&word_u64(chain_id));
    encoded.extend_from_slice(&word_address(&contract));
    Ok(keccak(&encoded))
}

/// Computes the struct hash for a typed order.
#[must_use]
pub fn order_struct_hash(order: &TypedOrder) -> [u8; 32] {
    let mut encoded = Vec::with_capacity(8 * 32);
    encoded.extend_from_slice(&order_type_hash());
    encoded.extend_from_slice(&word_address(&order.maker));
    encoded.extend_from_slice(&order.token_id);
    encoded.extend_from_slice(&word_u64(order.maker_amount));
    encoded.extend_from_slice(&word_u64(order.taker_amount));
    encoded.extend_from_slice(&word_u64(order.expiration));
    encoded.extend_from_slice(&word_u64(order.nonce));
    encoded.extend_from_slice(&word_u64(u64::from(order.side)));
    keccak(&encoded)
}

/// Computes the final signing digest: `keccak("\x19\x01" || domain || struct)`.
pub fn order_digest(
    order: &TypedOrder,
    chain_id: u64,
    exchange: &str,
) -> Result<[u8; 32], OrderSignError> {
    let domain = domain_separator(chain_id, exchange)?;
    let struct_hash = order_struct_hash(order);

    let mut data = Vec::with_capacity(2 + 64);
    data.push(0x19);
    data.push(0x01);
    data.extend_from_slice(&domain);
    data.extend_from_slice(&struct_hash);
    Ok(keccak(&data))
}

/// Computes the message signed into per-request headers.
///
/// `{timestamp}:{METHOD}:{path}:keccak(body)` keeps headers stable for a
/// given request while binding them to its content.
#[must_use]
pub fn request_message(timestamp: i64, method: &str, path: &str, body: &[u8]) -> Vec<u8> {
    let body_hash = keccak(body);
    format!(
        "{timestamp}:{}:{path}:0x{}",
        method.to_ascii_uppercase(),
        hex::encode(body_hash)
    )
    .into_bytes()
}
