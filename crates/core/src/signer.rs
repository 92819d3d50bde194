//! Signer interface and local key-backed implementation.
//!
//! The trading core receives a pre-built signer; key custody (vault,
//! decryption) happens elsewhere. [`Signer`] exposes the operations the
//! venue adapters need (message signing for session auth, digest signing
//! for typed orders, raw transaction submission for approvals) and never
//! exposes private key material.

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use reqwest::Client;
use sha3::{Digest, Keccak256};

use crate::error::SignerError;

// =============================================================================
// Transaction Request
// =============================================================================

/// A transaction to be signed and broadcast by the signer.
#[derive(Debug, Clone)]
pub struct TxRequest {
    /// Recipient contract address (0x-hex).
    pub to: String,
    /// Value in wei; zero for approvals.
    pub value_wei: u128,
    /// Calldata.
    pub data: Vec<u8>,
    /// Gas limit.
    pub gas_limit: u64,
}

// =============================================================================
// Signer Trait
// =============================================================================

/// Signing capability bound to one user. Private-key material never
/// leaves the implementation.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Returns the signer's Ethereum address (0x-hex, lowercase).
    fn address(&self) -> &str;

    /// Signs an EIP-191 personal message; returns the 65-byte r||s||v
    /// signature as 0x-hex.
    async fn sign_message(&self, message: &[u8]) -> Result<String, SignerError>;

    /// Signs a prehashed 32-byte typed-data digest (EIP-712 signing hash).
    async fn sign_digest(&self, digest: [u8; 32]) -> Result<String, SignerError>;

    /// Signs and broadcasts a transaction; returns the transaction hash.
    async fn send_transaction(&self, tx: &TxRequest) -> Result<String, SignerError>;
}

// =============================================================================
// Local Key Signer
// =============================================================================

/// A local secp256k1 signer with optional JSON-RPC broadcasting.
pub struct KeySigner {
    key: SigningKey,
    address: String,
    chain_id: u64,
    rpc: Option<(Client, String)>,
}

impl std::fmt::Debug for KeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySigner")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl KeySigner {
    /// Creates a signer from a 32-byte hex private key.
    ///
    /// # Errors
    /// Returns an error if the key is malformed.
    pub fn from_private_key(private_key_hex: &str, chain_id: u64) -> Result<Self, SignerError> {
        let stripped = private_key_hex
            .strip_prefix("0x")
            .unwrap_or(private_key_hex);
        let bytes = hex::decode(stripped).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let key =
            SigningKey::from_slice(&bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let address = derive_address(&key);

        Ok(Self {
            key,
            address,
            chain_id,
            rpc: None,
        })
    }

    /// Enables transaction broadcasting through the given JSON-RPC endpoint.
    #[must_use]
    pub fn with_rpc(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc = Some((Client::new(), rpc_url.into()));
        self
    }

    /// Returns the configured chain id.
    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn sign_prehash(&self, digest: &[u8; 32]) -> Result<String, SignerError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| SignerError::SigningFailed(e.to_string()))?;

        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&signature.r().to_bytes());
        out[32..64].copy_from_slice(&signature.s().to_bytes());
        out[64] = 27 + recovery_id.to_byte();
        Ok(format!("0x{}", hex::encode(out)))
    }

    async fn rpc_call(
        http: &Client,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, SignerError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });
        let response: serde_json::Value = http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SignerError::TransactionFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| SignerError::TransactionFailed(e.to_string()))?;

        if let Some(error) = response.get("error") {
            return Err(SignerError::TransactionFailed(error.to_string()));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| SignerError::TransactionFailed("missing result".to_string()))
    }

    async fn rpc_u64(http: &Client, url: &str, method: &str, params: serde_json::Value) -> Result<u64, SignerError> {
        let result = Self::rpc_call(http, url, method, params).await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| SignerError::TransactionFailed("non-string result".to_string()))?;
        u64::from_str_radix(hex_str.trim_start_matches("0x"), 16)
            .map_err(|e| SignerError::TransactionFailed(e.to_string()))
    }
}

#[async_trait]
impl Signer for KeySigner {
    fn address(&self) -> &str {
        &self.address
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String, SignerError> {
        // EIP-191 personal message envelope.
        let mut prefixed =
            format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
        prefixed.extend_from_slice(message);
        let digest: [u8; 32] = Keccak256::digest(&prefixed).into();
        self.sign_prehash(&digest)
    }

    async fn sign_digest(&self, digest: [u8; 32]) -> Result<String, SignerError> {
        self.sign_prehash(&digest)
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<String, SignerError> {
        let (http, url) = self.rpc.as_ref().ok_or_else(|| {
            SignerError::TransactionFailed("no RPC endpoint configured".to_string())
        })?;

        let nonce = Self::rpc_u64(
            http,
            url,
            "eth_getTransactionCount",
            serde_json::json!([self.address, "latest"]),
        )
        .await?;
        let gas_price =
            Self::rpc_u64(http, url, "eth_gasPrice", serde_json::json!([])).await?;

        let to = parse_address(&tx.to)?;
        let raw = sign_legacy_tx(
            &self.key,
            self.chain_id,
            nonce,
            gas_price,
            tx.gas_limit,
            &to,
            tx.value_wei,
            &tx.data,
        )?;

        let result = Self::rpc_call(
            http,
            url,
            "eth_sendRawTransaction",
            serde_json::json!([format!("0x{}", hex::encode(raw))]),
        )
        .await?;
        result
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| SignerError::TransactionFailed("missing tx hash".to_string()))
    }
}

// =============================================================================
// Address Helpers
// =============================================================================

/// Derives the 0x-hex Ethereum address from a signing key.
fn derive_address(key: &SigningKey) -> String {
    let public = key.verifying_key().to_encoded_point(false);
    // Skip the 0x04 uncompressed prefix, keccak the 64-byte point, keep
    // the last 20 bytes.
    let hash = Keccak256::digest(&public.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Parses a 0x-hex address into 20 bytes.
pub fn parse_address(address: &str) -> Result<[u8; 20], SignerError> {
    let stripped = address.strip_prefix("0x").unwrap_or(address);
    let bytes =
        hex::decode(stripped).map_err(|e| SignerError::InvalidKey(format!("{address}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| SignerError::InvalidKey(format!("address must be 20 bytes: {address}")))
}

// =============================================================================
// Legacy Transaction Encoding (EIP-155)
// =============================================================================

fn rlp_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        vec![data[0]]
    } else if data.len() <= 55 {
        let mut out = Vec::with_capacity(1 + data.len());
        out.push(0x80 + data.len() as u8);
        out.extend_from_slice(data);
        out
    } else {
        let len_bytes = minimal_be(data.len() as u128);
        let mut out = Vec::with_capacity(1 + len_bytes.len() + data.len());
        out.push(0xb7 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
        out.extend_from_slice(data);
        out
    }
}

fn rlp_uint(value: u128) -> Vec<u8> {
    if value == 0 {
        rlp_bytes(&[])
    } else {
        rlp_bytes(&minimal_be(value))
    }
}

fn rlp_uint_bytes(value: &[u8]) -> Vec<u8> {
    let start = value.iter().position(|&b| b != 0).unwrap_or(value.len());
    rlp_bytes(&value[start..])
}

fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload: Vec<u8> = items.iter().flatten().copied().collect();
    if payload.len() <= 55 {
        let mut out = Vec::with_capacity(1 + payload.len());
        out.push(0xc0 + payload.len() as u8);
        out.extend_from_slice(&payload);
        out
    } else {
        let len_bytes = minimal_be(payload.len() as u128);
        let mut out = Vec::with_capacity(1 + len_bytes.len() + payload.len());
        out.push(0xf7 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
        out.extend_from_slice(&payload);
        out
    }
}

fn minimal_be(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

#[allow(clippy::too_many_arguments)]
fn sign_legacy_tx(
    key: &SigningKey,
    chain_id: u64,
    nonce: u64,
    gas_price: u64,
    gas_limit: u64,
    to: &[u8; 20],
    value_wei: u128,
    data: &[u8],
) -> Result<Vec<u8>, SignerError> {
    // Unsigned payload per EIP-155: (..., chain_id, 0, 0).
    let unsigned = rlp_list(&[
        rlp_uint(nonce.into()),
        rlp_uint(gas_price.into()),
        rlp_uint(gas_limit.into()),
        rlp_bytes(to),
        rlp_uint(value_wei),
        rlp_bytes(data),
        rlp_uint(chain_id.into()),
        rlp_bytes(&[]),
        rlp_bytes(&[]),
    ]);

    let digest: [u8; 32] = Keccak256::digest(&unsigned).into();
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&digest)
        .map_err(|e| SignerError::SigningFailed(e.to_string()))?;

    let v = chain_id * 2 + 35 + u64::from(recovery_id.to_byte());

    Ok(rlp_list(&[
        rlp_uint(nonce.into()),
        rlp_uint(gas_price.into()),
        rlp_uint(gas_limit.into()),
        rlp_bytes(to),
        rlp_uint(value_wei),
        rlp_bytes(data),
        rlp_uint(v.into()),
        rlp_uint_bytes(&signature.r().to_bytes()),
        rlp_uint_bytes(&signature.s().to_bytes()),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known test vector key (never funded).
    const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn test_key_signer_derives_address() {
        let signer = KeySigner::from_private_key(TEST_KEY, 137).unwrap();
        assert!(signer.address().starts_with("0x"));
        assert_eq!(signer.address().len(), 42);
    }

    #[test]
    fn test_key_signer_rejects_bad_key() {
        assert!(KeySigner::from_private_key("0xzz", 137).is_err());
        assert!(KeySigner::from_private_key("0x1234", 137).is_err());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let signer = KeySigner::from_private_key(TEST_KEY, 137).unwrap();
        let debug = format!("{signer:?}");
        assert!(debug.contains("address"));
        assert!(!debug.contains("4c0883a6"));
    }

    #[tokio::test]
    async fn test_sign_message_shape() {
        let signer = KeySigner::from_private_key(TEST_KEY, 137).unwrap();
        let sig = signer.sign_message(b"challenge").await.unwrap();
        // 0x + 65 bytes hex
        assert_eq!(sig.len(), 2 + 130);
        assert!(sig.starts_with("0x"));
    }

    #[tokio::test]
    async fn test_sign_message_is_deterministic() {
        let signer = KeySigner::from_private_key(TEST_KEY, 137).unwrap();
        let first = signer.sign_message(b"challenge").await.unwrap();
        let second = signer.sign_message(b"challenge").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_send_transaction_requires_rpc() {
        let signer = KeySigner::from_private_key(TEST_KEY, 137).unwrap();
        let tx = TxRequest {
            to: "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E".to_string(),
            value_wei: 0,
            data: vec![],
            gas_limit: 100_000,
        };
        assert!(signer.send_transaction(&tx).await.is_err());
    }

    #[test]
    fn test_parse_address() {
        let bytes = parse_address("0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E").unwrap();
        assert_eq!(bytes.len(), 20);
        assert!(parse_address("0x1234").is_err());
    }

    #[test]
    fn test_rlp_single_byte() {
        assert_eq!(rlp_bytes(&[0x42]), vec![0x42]);
        assert_eq!(rlp_uint(0), vec![0x80]);
    }

    #[test]
    fn test_rlp_short_string() {
        let encoded = rlp_bytes(b"dog");
        assert_eq!(encoded, vec![0x83, b'd', b'o', b'g']);
    }

    #[test]
    fn test_sign_legacy_tx_produces_rlp_list() {
        let signer = KeySigner::from_private_key(TEST_KEY, 137).unwrap();
        let to = parse_address("0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E").unwrap();
        let raw =
            sign_legacy_tx(&signer.key, 137, 0, 30_000_000_000, 100_000, &to, 0, &[0x01]).unwrap();
        // RLP list header for a payload of this size.
        assert!(raw[0] >= 0xc0);
    }
}
