//! keysign-core
//!
//! Chain-abstraction transaction building and co-signing coordination for
//! threshold-signature wallets.
//!
//! # Architecture
//!
//! This crate provides:
//! - **types**: coins, transaction intents, per-chain parameters
//! - **tx**: per-chain unsigned-transaction builders and finalizers
//!   (Bitcoin-family, EVM, Solana)
//! - **signing**: pre-image hashes, ceremony-response normalization, and
//!   mandatory signature verification
//! - **address**: address derivation, validation, and locking scripts
//! - **amount**: decimal ↔ raw-unit conversion at the boundary
//!
//! # Pipeline
//!
//! A transaction moves through `Built → HashExtracted → Verified →
//! Finalized`, strictly in order. The distributed signing ceremony sits
//! between hash extraction and verification, entirely outside this crate:
//! the pre-image hashes go out, a [`signing::SignatureSet`] comes back.
//! Every signature is verified against the vault public key before any
//! encoding proceeds — there is no way to finalize with an unverified
//! signature.
//!
//! The core is synchronous and stateless: every stage is a pure function
//! of its inputs, safe to run concurrently for independent transactions.
//! All external I/O (UTXO sets, gas prices, the ceremony itself,
//! broadcast) happens outside and is passed in as resolved data.
//!
//! # Example
//!
//! ```rust,ignore
//! use keysign_core::{tx, types::*};
//!
//! let payload = tx::build(&intent, &params)?;
//! let pre_images = tx::pre_image_hashes(&payload)?;
//! // ... hand pre_images to the signing ceremony, collect responses ...
//! let result = tx::sign_transaction(&intent, &params, &signatures)?;
//! println!("raw: {}", result.raw_transaction);
//! ```

pub mod address;
pub mod amount;
pub mod error;
pub mod logging;
pub mod signing;
pub mod tx;
pub mod types;

// Re-export key types for convenience
pub use error::{KeysignError, KeysignResult};
pub use signing::{KeysignResponse, PreImage, SignatureSet, SigningAlgorithm, VerifiedSignature};
pub use tx::{build, finalize, pre_image_hashes, sign_transaction, UnsignedPayload};
pub use types::{
    Chain, ChainFamily, ChainParameters, Coin, IntentPayload, SignedTransactionResult,
    TransactionIntent, UtxoInfo,
};
