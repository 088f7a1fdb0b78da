//! Solana transaction building
//!
//! Native transfers are a system-program transfer with optional memo and
//! compute-unit price instructions. Token transfers run through the SPL
//! token program with both associated token accounts derived from the
//! owner and mint — never supplied by the caller. The pre-image is the
//! serialized message itself: that is what ed25519 signs on this chain.

use serde::{Deserialize, Serialize};
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    signature::Signature as SolanaSignature,
    transaction::Transaction,
};
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;

use crate::error::{KeysignError, KeysignResult};
use crate::signing::{PreImage, SigningAlgorithm, VerifiedSignature};
use crate::types::{Chain, SignedTransactionResult, TransactionIntent};

/// SPL Memo program
const MEMO_PROGRAM_ID: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr";

/// Unsigned Solana transaction: the compiled message bytes plus the key
/// that must sign them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolanaPayload {
    pub chain: Chain,
    /// Fee payer's ed25519 public key (32 bytes)
    #[serde(with = "crate::types::hex_bytes")]
    pub public_key: Vec<u8>,
    /// Serialized message — exactly the bytes the ceremony signs
    #[serde(with = "crate::types::hex_bytes")]
    pub message: Vec<u8>,
}

pub(crate) fn build(
    intent: &TransactionIntent,
    recent_blockhash: &str,
    priority_fee_price: u64,
) -> KeysignResult<SolanaPayload> {
    let public_key = intent.coin.public_key_bytes()?;
    let sender_bytes: [u8; 32] = public_key.as_slice().try_into().map_err(|_| {
        KeysignError::InvalidPublicKey(format!(
            "ed25519 public key must be 32 bytes, got {}",
            public_key.len()
        ))
    })?;
    let sender = Pubkey::new_from_array(sender_bytes);

    let to = Pubkey::from_str(&intent.to_address).map_err(|e| {
        KeysignError::InvalidDestinationAddress(format!("{}: {}", intent.to_address, e))
    })?;

    let blockhash = Hash::from_str(recent_blockhash).map_err(|e| {
        KeysignError::EncodingFailure(format!("invalid recent blockhash {}: {}", recent_blockhash, e))
    })?;

    let amount: u64 = intent.amount.try_into().map_err(|_| {
        KeysignError::EncodingFailure(format!("amount {} exceeds u64 range", intent.amount))
    })?;

    let mut instructions = Vec::new();

    if priority_fee_price > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
            priority_fee_price,
        ));
    }

    if intent.coin.is_native_token {
        #[allow(deprecated)]
        instructions.push(solana_sdk::system_instruction::transfer(
            &sender, &to, amount,
        ));
    } else {
        let mint_address = intent
            .coin
            .contract_address
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                KeysignError::EncodingFailure(format!(
                    "token transfer of {} without a mint address",
                    intent.coin.ticker
                ))
            })?;
        let mint = Pubkey::from_str(mint_address).map_err(|e| {
            KeysignError::EncodingFailure(format!("invalid mint {}: {}", mint_address, e))
        })?;

        // Both token accounts are derived, not caller-supplied
        let sender_token_account =
            spl_associated_token_account::get_associated_token_address(&sender, &mint);
        let recipient_token_account =
            spl_associated_token_account::get_associated_token_address(&to, &mint);

        let transfer = spl_token::instruction::transfer_checked(
            &spl_token::id(),
            &sender_token_account,
            &mint,
            &recipient_token_account,
            &sender,
            &[],
            amount,
            intent.coin.decimals,
        )
        .map_err(|e| KeysignError::EncodingFailure(e.to_string()))?;
        instructions.push(transfer);
    }

    if let Some(memo) = intent.memo.as_deref().filter(|m| !m.is_empty()) {
        instructions.push(memo_instruction(&sender, memo)?);
    }

    let message = Message::new_with_blockhash(&instructions, Some(&sender), &blockhash);
    let tx = Transaction::new_unsigned(message);

    Ok(SolanaPayload {
        chain: intent.coin.chain,
        public_key,
        message: tx.message_data(),
    })
}

fn memo_instruction(signer: &Pubkey, memo: &str) -> KeysignResult<Instruction> {
    let program_id = Pubkey::from_str(MEMO_PROGRAM_ID)
        .map_err(|e| KeysignError::EncodingFailure(e.to_string()))?;
    Ok(Instruction {
        program_id,
        accounts: vec![AccountMeta::new_readonly(*signer, true)],
        data: memo.as_bytes().to_vec(),
    })
}

/// The message bytes are the pre-image: ed25519 signs them directly
pub(crate) fn pre_image_hashes(payload: &SolanaPayload) -> KeysignResult<Vec<PreImage>> {
    if payload.message.is_empty() {
        return Err(KeysignError::MalformedPayload("empty message".into()));
    }

    Ok(vec![PreImage::new(
        payload.message.clone(),
        hex::encode(&payload.public_key),
        SigningAlgorithm::Ed25519,
    )])
}

pub(crate) fn finalize(
    payload: &SolanaPayload,
    signatures: &[VerifiedSignature],
) -> KeysignResult<SignedTransactionResult> {
    let [signature] = signatures else {
        return Err(KeysignError::FinalizationFailure(format!(
            "expected exactly one signature, got {}",
            signatures.len()
        )));
    };

    let message: Message = bincode::deserialize(&payload.message)
        .map_err(|e| KeysignError::FinalizationFailure(format!("message decode: {}", e)))?;

    let solana_signature = SolanaSignature::from(*signature.rs());
    let tx = Transaction {
        signatures: vec![solana_signature],
        message,
    };

    let raw = bincode::serialize(&tx)
        .map_err(|e| KeysignError::FinalizationFailure(e.to_string()))?;

    // The canonical transaction id is the fee payer's signature, base58
    Ok(SignedTransactionResult {
        raw_transaction: BASE64_STANDARD.encode(&raw),
        transaction_hash: bs58::encode(signature.rs()).into_string(),
    })
}
