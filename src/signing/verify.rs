//! Signature assembly and verification
//!
//! Binds each pre-image to the ceremony response produced for it and
//! verifies the signature against the vault public key before any
//! encoding proceeds. A [`VerifiedSignature`] can only be obtained through
//! [`assemble`], so a transaction can never be finalized with a signature
//! that was not checked.

use ed25519_dalek::{Signature as Ed25519Signature, VerifyingKey};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature as EcdsaSignature};
use secp256k1::{Message, PublicKey, Secp256k1};

use crate::error::{KeysignError, KeysignResult};
use crate::signing::ceremony::SignatureSet;
use crate::signing::preimage::{PreImage, SigningAlgorithm};

/// A signature that passed verification against its pre-image.
///
/// Fields are private: the only way to get one is through [`assemble`].
#[derive(Debug, Clone)]
pub struct VerifiedSignature {
    input_index: usize,
    signature: [u8; 64],
    recovery_id: Option<u8>,
}

impl VerifiedSignature {
    pub fn input_index(&self) -> usize {
        self.input_index
    }

    /// R ‖ S
    pub fn rs(&self) -> &[u8; 64] {
        &self.signature
    }

    pub fn r(&self) -> &[u8] {
        &self.signature[..32]
    }

    pub fn s(&self) -> &[u8] {
        &self.signature[32..]
    }

    pub fn recovery_id(&self) -> Option<u8> {
        self.recovery_id
    }
}

/// Match every pre-image with its ceremony response and verify each
/// signature with the vault public key.
///
/// Verification failure is fatal to the whole operation; nothing is
/// retried and no partial result is returned.
pub fn assemble(
    pre_images: &[PreImage],
    signatures: &SignatureSet,
    public_key: &[u8],
) -> KeysignResult<Vec<VerifiedSignature>> {
    let mut verified = Vec::with_capacity(pre_images.len());

    for pre_image in pre_images {
        let response = signatures.lookup(pre_image, pre_images.len()).ok_or_else(|| {
            KeysignError::SignatureVerificationFailed(format!(
                "no ceremony signature for pre-image {}",
                pre_image.hash_hex()
            ))
        })?;

        let signature = response.signature()?;
        let recovery_id = response.recovery_byte()?;

        match pre_image.algorithm {
            SigningAlgorithm::Secp256k1Ecdsa => {
                verify_secp256k1(&pre_image.hash, &signature, public_key)?;
                if let Some(rec) = recovery_id {
                    verify_recovery_id(&pre_image.hash, &signature, rec, public_key)?;
                }
            }
            SigningAlgorithm::Ed25519 => {
                verify_ed25519(&pre_image.hash, &signature, public_key)?;
            }
        }

        verified.push(VerifiedSignature {
            input_index: pre_image.input_index,
            signature,
            recovery_id,
        });
    }

    Ok(verified)
}

/// ECDSA verification over a 32-byte digest
pub fn verify_secp256k1(pre_image: &[u8], signature: &[u8; 64], public_key: &[u8]) -> KeysignResult<()> {
    let secp = Secp256k1::verification_only();

    let pk = PublicKey::from_slice(public_key)
        .map_err(|e| KeysignError::InvalidPublicKey(format!("secp256k1: {}", e)))?;

    let msg = Message::from_digest_slice(pre_image).map_err(|e| {
        KeysignError::MalformedPayload(format!("pre-image is not a 32-byte digest: {}", e))
    })?;

    let mut sig = EcdsaSignature::from_compact(signature)
        .map_err(|e| KeysignError::MalformedSignatureEncoding(e.to_string()))?;
    sig.normalize_s();

    secp.verify_ecdsa(&msg, &sig, &pk).map_err(|_| {
        KeysignError::SignatureVerificationFailed(format!(
            "secp256k1 signature does not match pre-image {}",
            hex::encode(pre_image)
        ))
    })
}

/// Check that the ceremony's recovery indicator actually recovers the
/// vault public key. A wrong indicator would produce a transaction the
/// network attributes to a different sender.
pub fn verify_recovery_id(
    pre_image: &[u8],
    signature: &[u8; 64],
    recovery_id: u8,
    public_key: &[u8],
) -> KeysignResult<()> {
    let secp = Secp256k1::new();

    let pk = PublicKey::from_slice(public_key)
        .map_err(|e| KeysignError::InvalidPublicKey(format!("secp256k1: {}", e)))?;

    let msg = Message::from_digest_slice(pre_image).map_err(|e| {
        KeysignError::MalformedPayload(format!("pre-image is not a 32-byte digest: {}", e))
    })?;

    let rec = RecoveryId::from_i32(recovery_id as i32)
        .map_err(|e| KeysignError::MalformedSignatureEncoding(format!("recovery id: {}", e)))?;

    let rsig = RecoverableSignature::from_compact(signature, rec)
        .map_err(|e| KeysignError::MalformedSignatureEncoding(e.to_string()))?;

    let recovered = secp.recover_ecdsa(&msg, &rsig).map_err(|e| {
        KeysignError::SignatureVerificationFailed(format!("public key recovery failed: {}", e))
    })?;

    if recovered != pk {
        return Err(KeysignError::SignatureVerificationFailed(
            "recovery id does not recover the vault public key".into(),
        ));
    }
    Ok(())
}

/// Ed25519 verification over the raw message bytes
pub fn verify_ed25519(message: &[u8], signature: &[u8; 64], public_key: &[u8]) -> KeysignResult<()> {
    let key_bytes: [u8; 32] = public_key.try_into().map_err(|_| {
        KeysignError::InvalidPublicKey(format!(
            "ed25519 public key must be 32 bytes, got {}",
            public_key.len()
        ))
    })?;

    let vk = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| KeysignError::InvalidPublicKey(format!("ed25519: {}", e)))?;

    let sig = Ed25519Signature::from_bytes(signature);

    vk.verify_strict(message, &sig).map_err(|_| {
        KeysignError::SignatureVerificationFailed(
            "ed25519 signature does not match message".into(),
        )
    })
}
