//! Unified error types for the keysign pipeline
//!
//! Every pipeline stage returns `KeysignResult`; a failure at any stage is
//! terminal for the current invocation. Kinds are preserved end-to-end so
//! callers can distinguish a bad address from a signature mismatch.

use serde::{Deserialize, Serialize};

/// Error kinds for the build → hash → verify → finalize pipeline.
///
/// None of these are retried internally; rebuilding with fresh chain
/// parameters is the caller's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum KeysignError {
    /// Coin, chain parameters, and builder do not agree on a chain family.
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),

    /// Destination does not parse as a valid address for the target chain.
    #[error("invalid destination address: {0}")]
    InvalidDestinationAddress(String),

    /// Serializing the unsigned transaction failed.
    #[error("encoding failure: {0}")]
    EncodingFailure(String),

    /// Decoding an intermediate compiled form failed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A signing-ceremony response field failed base64/hex decoding or has
    /// the wrong length.
    #[error("malformed signature encoding: {0}")]
    MalformedSignatureEncoding(String),

    /// A signature did not verify against its pre-image and the vault
    /// public key. Fatal for the whole transaction.
    #[error("signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    /// Re-encoding failed after verification already succeeded. Indicates
    /// an invariant violation upstream.
    #[error("finalization failure: {0}")]
    FinalizationFailure(String),

    /// The provided spendable outputs cannot cover amount plus fee.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// The vault public key bytes do not parse for the chain's curve.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
}

impl KeysignError {
    /// Stable snake_case name of the kind, for logs and FFI surfaces.
    pub fn kind(&self) -> &'static str {
        match self {
            KeysignError::UnsupportedChain(_) => "unsupported_chain",
            KeysignError::InvalidDestinationAddress(_) => "invalid_destination_address",
            KeysignError::EncodingFailure(_) => "encoding_failure",
            KeysignError::MalformedPayload(_) => "malformed_payload",
            KeysignError::MalformedSignatureEncoding(_) => "malformed_signature_encoding",
            KeysignError::SignatureVerificationFailed(_) => "signature_verification_failed",
            KeysignError::FinalizationFailure(_) => "finalization_failure",
            KeysignError::InsufficientFunds(_) => "insufficient_funds",
            KeysignError::InvalidPublicKey(_) => "invalid_public_key",
        }
    }
}

/// Result type alias for all pipeline operations
pub type KeysignResult<T> = Result<T, KeysignError>;

impl From<hex::FromHexError> for KeysignError {
    fn from(e: hex::FromHexError) -> Self {
        KeysignError::MalformedSignatureEncoding(e.to_string())
    }
}

impl From<serde_json::Error> for KeysignError {
    fn from(e: serde_json::Error) -> Self {
        KeysignError::MalformedPayload(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_stable() {
        let err = KeysignError::SignatureVerificationFailed("r/s mismatch".into());
        assert_eq!(err.kind(), "signature_verification_failed");
        assert!(err.to_string().contains("r/s mismatch"));
    }

    #[test]
    fn test_error_serialization() {
        let err = KeysignError::InsufficientFunds("have 1000 sats, need 2000 sats".into());
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("insufficient_funds"));
        assert!(json.contains("1000 sats"));
    }
}
