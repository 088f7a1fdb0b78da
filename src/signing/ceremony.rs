//! Signing-ceremony responses
//!
//! The distributed signing ceremony returns one response per pre-image,
//! with the signature's R and S components (and a recovery indicator for
//! recoverable schemes) as base64 strings. Some ceremony implementations
//! emit the URL-safe base64 alphabet without padding; everything is
//! normalized to standard padded base64 before decoding.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{KeysignError, KeysignResult};
use crate::signing::preimage::PreImage;

/// Raw response for one signed pre-image, as produced by the ceremony.
///
/// `r` and `s` are base64-encoded 32-byte scalars; `recovery_id` is a hex
/// byte ("00"/"01") for recoverable schemes; `der_signature` is carried
/// through untouched for callers that want the DER form; `msg` echoes the
/// hex of the signed pre-image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysignResponse {
    pub r: String,
    pub s: String,
    #[serde(default)]
    pub der_signature: Option<String>,
    #[serde(default)]
    pub recovery_id: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl KeysignResponse {
    pub fn new(r: impl Into<String>, s: impl Into<String>) -> Self {
        Self {
            r: r.into(),
            s: s.into(),
            ..Default::default()
        }
    }

    pub fn with_recovery_id(mut self, recovery_id: impl Into<String>) -> Self {
        self.recovery_id = Some(recovery_id.into());
        self
    }

    /// Canonical 64-byte signature: R ‖ S
    pub fn signature(&self) -> KeysignResult<[u8; 64]> {
        let r = decode_scalar("r", &self.r)?;
        let s = decode_scalar("s", &self.s)?;
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&r);
        out[32..].copy_from_slice(&s);
        Ok(out)
    }

    /// 65-byte recoverable signature: R ‖ S ‖ recovery byte
    pub fn signature_with_recovery(&self) -> KeysignResult<[u8; 65]> {
        let sig = self.signature()?;
        let rec = self.recovery_byte()?.ok_or_else(|| {
            KeysignError::MalformedSignatureEncoding("missing recovery id".into())
        })?;
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig);
        out[64] = rec;
        Ok(out)
    }

    /// Parse the recovery indicator, if the ceremony supplied one
    pub fn recovery_byte(&self) -> KeysignResult<Option<u8>> {
        let Some(raw) = self.recovery_id.as_deref() else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let padded = if raw.len() % 2 == 1 {
            format!("0{}", raw)
        } else {
            raw.to_string()
        };
        let bytes = hex::decode(&padded).map_err(|e| {
            KeysignError::MalformedSignatureEncoding(format!("recovery id {}: {}", raw, e))
        })?;
        let byte = *bytes.last().ok_or_else(|| {
            KeysignError::MalformedSignatureEncoding("empty recovery id".into())
        })?;
        if byte > 3 {
            return Err(KeysignError::MalformedSignatureEncoding(format!(
                "recovery id out of range: {}",
                byte
            )));
        }
        Ok(Some(byte))
    }
}

/// Rewrite URL-safe unpadded base64 into the standard padded alphabet
pub fn fixup_standard_base64(input: &str) -> String {
    let mut out = input.replace('-', "+").replace('_', "/");
    let remainder = out.len() % 4;
    if remainder > 0 {
        out.extend(std::iter::repeat('=').take(4 - remainder));
    }
    out
}

fn decode_scalar(field: &str, value: &str) -> KeysignResult<[u8; 32]> {
    let bytes = BASE64_STANDARD
        .decode(fixup_standard_base64(value.trim()))
        .map_err(|e| {
            KeysignError::MalformedSignatureEncoding(format!("invalid {} component: {}", field, e))
        })?;
    if bytes.len() > 32 {
        return Err(KeysignError::MalformedSignatureEncoding(format!(
            "{} component is {} bytes, expected at most 32",
            field,
            bytes.len()
        )));
    }
    // Left-pad short scalars
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

/// The ceremony's responses for one transaction, keyed by the hex of the
/// pre-image each one signed. Consumed once per transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSet(BTreeMap<String, KeysignResponse>);

impl SignatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pre_image_hex: impl Into<String>, response: KeysignResponse) {
        self.0.insert(normalize_key(&pre_image_hex.into()), response);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Find the response for a pre-image. Falls back to the sole entry
    /// when the transaction needs exactly one signature.
    pub fn lookup(&self, pre_image: &PreImage, expected_total: usize) -> Option<&KeysignResponse> {
        if let Some(resp) = self.0.get(&pre_image.hash_hex()) {
            return Some(resp);
        }
        if expected_total == 1 && self.0.len() == 1 {
            return self.0.values().next();
        }
        None
    }
}

impl<K: Into<String>> FromIterator<(K, KeysignResponse)> for SignatureSet {
    fn from_iter<T: IntoIterator<Item = (K, KeysignResponse)>>(iter: T) -> Self {
        let mut set = Self::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().trim_start_matches("0x").to_string()
}
