//! Co-signing coordination
//!
//! Everything between the unsigned payload and the finalized transaction:
//! pre-image hashes handed to the signing ceremony, normalization of the
//! ceremony's responses, and mandatory verification of every signature
//! before encoding proceeds.

pub mod ceremony;
pub mod preimage;
pub mod verify;

pub use ceremony::{KeysignResponse, SignatureSet};
pub use preimage::{PreImage, SigningAlgorithm};
pub use verify::{assemble, VerifiedSignature};
