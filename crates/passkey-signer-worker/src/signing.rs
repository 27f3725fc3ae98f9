//! Key unlocking and transaction assembly.

use ed25519_dalek::SigningKey;
use zeroize::Zeroizing;

use passkey_core::actions::build_actions;
use passkey_core::crypto::{decrypt_private_key, derive_kek, ed25519_keypair_from_seed};
use passkey_core::encoders::{decode_near_secret_key, encode_near_public_key};
use passkey_core::errors::{ErrorCode, WalletError, WalletResult};
use passkey_core::near::{
    build_transaction, check_nonce, sign_transaction, CryptoHash, PublicKey,
    SignedTransactionEnvelope,
};
use passkey_core::store::{self, EncryptedKeyRecord, KeyValueStore};
use passkey_core::AccountId;

use crate::types::TransactionSigningRequest;

/// Look up the encrypted key record for an account.
pub async fn load_key_record(
    store: &dyn KeyValueStore,
    account_id: &AccountId,
) -> WalletResult<EncryptedKeyRecord> {
    store::get_typed::<EncryptedKeyRecord>(store, store::namespaces::NEAR_KEYS, account_id.as_str())
        .await?
        .ok_or_else(|| {
            WalletError::new(
                ErrorCode::KeyNotFound,
                format!("no encrypted key stored for {}", account_id),
            )
        })
}

/// Unlock the stored signing key with the KEK derived from a PRF output.
pub async fn unlock_signing_key(
    store: &dyn KeyValueStore,
    account_id: &AccountId,
    prf_key_salt_b64u: &str,
) -> WalletResult<SigningKey> {
    let record = load_key_record(store, account_id).await?;
    let kek = derive_kek(prf_key_salt_b64u, account_id)?;
    let seed = decrypt_private_key(&record.encrypted, kek.as_ref(), account_id)?;
    let (signing_key, _public) = ed25519_keypair_from_seed(&seed);
    Ok(signing_key)
}

/// Parse an `ed25519:<base58 64B>` private key into a signing key.
pub fn signing_key_from_near_private_key(private_key: &str) -> WalletResult<SigningKey> {
    let (seed, _embedded_public) = decode_near_secret_key(private_key)?;
    let seed = Zeroizing::new(seed);
    Ok(SigningKey::from_bytes(&seed))
}

/// Sign a batch: transaction `i` gets `base_nonce + i`, all share the block
/// hash. Returns envelopes in input order.
pub fn sign_batch(
    signing_key: &SigningKey,
    account_id: &AccountId,
    transactions: &[TransactionSigningRequest],
    base_nonce: u64,
    block_hash: &str,
) -> WalletResult<Vec<SignedTransactionEnvelope>> {
    if transactions.is_empty() {
        return Err(WalletError::input_invalid("no transactions to sign"));
    }
    check_nonce(base_nonce)?;
    let block_hash = CryptoHash::from_base58(block_hash)?;
    let public_key = PublicKey::from_ed25519_bytes(&signing_key.verifying_key().to_bytes());

    let mut signed = Vec::with_capacity(transactions.len());
    for (index, request) in transactions.iter().enumerate() {
        let actions = build_actions(&request.actions)
            .map_err(|e| WalletError::action_invalid(format!("transaction {}: {}", index, e.message)))?;
        let transaction = build_transaction(
            account_id.clone(),
            request.receiver_id.clone(),
            public_key.clone(),
            base_nonce + index as u64,
            block_hash,
            actions,
        );
        let envelope =
            SignedTransactionEnvelope::from_signed(sign_transaction(transaction, signing_key)?)?;
        signed.push(envelope);
    }
    Ok(signed)
}

/// NEAR-format public key of a signing key.
pub fn near_public_key_of(signing_key: &SigningKey) -> String {
    encode_near_public_key(&signing_key.verifying_key().to_bytes())
}
