//! First-device user registration.
//!
//! Bootstraps a random VRF keypair (no PRF exists before the first ceremony),
//! runs the create-credential ceremony against its challenge, then derives
//! the real key material from the PRF outputs: the signing key (encrypted at
//! rest by the signer worker) and the deterministic VRF keypair. The caller
//! forwards the returned payload to the relay for atomic on-chain account
//! creation and registration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use passkey_chain_client::Finality;
use passkey_core::cose::extract_credential_public_key;
use passkey_core::encoders::{base64_url_decode, base64_url_encode};
use passkey_core::errors::{WalletError, WalletResult};
use passkey_core::store::{
    self, authenticator_key, AuthenticatorRecord, EncryptedVrfKeyRecord, UserRecord,
};
use passkey_core::vrf::{VrfChallenge, VrfData, VrfInputData};
use passkey_core::webauthn::WebAuthnRegistrationCredential;
use passkey_core::AccountId;
use passkey_signer_worker::DeriveKeypairRequest;

use crate::credentials::CreateCredentialRequest;
use crate::orchestrator::TransactionOrchestrator;

/// What the relay's `create_account_and_register_user` call needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayRegistrationPayload {
    pub new_account_id: AccountId,
    pub new_public_key: String,
    pub vrf_data: VrfData,
    pub webauthn_registration: WebAuthnRegistrationCredential,
    pub deterministic_vrf_public_key: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_options: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct RegistrationResult {
    pub near_public_key: String,
    pub vrf_public_key_b64u: String,
    pub credential_id: String,
    pub relay_payload: RelayRegistrationPayload,
}

impl TransactionOrchestrator {
    /// Register a new user on this device. `device_number` 1 is the first
    /// device; linking assigns higher ordinals.
    pub async fn register_user(
        &self,
        account_id: AccountId,
        authenticator_options: Option<Value>,
    ) -> WalletResult<RegistrationResult> {
        // A bootstrap VRF challenge binds the ceremony to a recent block even
        // though the durable VRF key does not exist yet.
        let block = self.rpc.view_block(Finality::Final).await?;
        let input = VrfInputData {
            user_id: account_id.as_str().to_string(),
            rp_id: self.host.rp_id.clone(),
            block_height: block.height,
            block_hash: block.hash_bytes()?,
        };
        let bootstrap = self
            .vrf
            .generate_bootstrap(account_id.clone(), Some(input.clone()))
            .await?;
        let challenge: VrfChallenge = bootstrap.challenge.ok_or_else(|| {
            WalletError::internal("bootstrap did not produce a challenge")
        })?;

        let ceremony = self
            .credentials
            .create_credential(CreateCredentialRequest {
                account_id: account_id.clone(),
                rp_id: self.host.rp_id.clone(),
                challenge_b64u: challenge.webauthn_challenge_b64u().to_string(),
                device_number: None,
            })
            .await?;
        ceremony.prf_outputs.ensure_present()?;

        // Derive and persist the signing key.
        let derived = self
            .signer
            .derive_keypair_and_encrypt(DeriveKeypairRequest {
                account_id: account_id.clone(),
                prf_key_salt_b64u: ceremony.prf_outputs.key_salt_b64u.clone(),
                registration_tx: None,
            })
            .await?;

        // Derive the deterministic VRF keypair and regenerate the challenge
        // under it; the proof posted on-chain must come from the key that
        // will be registered.
        let vrf = self
            .vrf
            .derive_deterministic(
                account_id.clone(),
                ceremony.prf_outputs.vrf_salt_b64u.clone(),
                Some(input),
            )
            .await?;
        let vrf_challenge = vrf
            .challenge
            .as_ref()
            .ok_or_else(|| WalletError::internal("deterministic derivation lost the challenge"))?;

        self.persist_registration(&account_id, &derived.public_key, &vrf, &ceremony.credential)
            .await?;

        let deterministic_vrf_public_key = base64_url_decode(&vrf.vrf_public_key_b64u)?;
        Ok(RegistrationResult {
            near_public_key: derived.public_key.clone(),
            vrf_public_key_b64u: vrf.vrf_public_key_b64u.clone(),
            credential_id: ceremony.credential.id.clone(),
            relay_payload: RelayRegistrationPayload {
                new_account_id: account_id,
                new_public_key: derived.public_key,
                vrf_data: VrfData::try_from(vrf_challenge)?,
                webauthn_registration: ceremony.credential,
                deterministic_vrf_public_key,
                authenticator_options,
            },
        })
    }

    /// Log an existing user in: run an assertion ceremony to recover the PRF
    /// outputs, then unlock the stored VRF keypair with them. Returns the VRF
    /// public key of the opened session.
    pub async fn login(&self, account_id: AccountId) -> WalletResult<String> {
        let record: EncryptedVrfKeyRecord = store::get_typed(
            self.store.as_ref(),
            store::namespaces::NEAR_KEYS,
            &format!("{}:vrf", account_id),
        )
        .await?
        .ok_or_else(|| {
            WalletError::new(
                passkey_core::ErrorCode::KeyNotFound,
                format!("no VRF key material stored for {}", account_id),
            )
        })?;

        let mut challenge = [0u8; 32];
        getrandom::getrandom(&mut challenge)
            .map_err(|e| WalletError::internal(format!("challenge generation failed: {}", e)))?;
        let ceremony = self
            .credentials
            .get_assertion(crate::credentials::GetAssertionRequest {
                account_id: account_id.clone(),
                rp_id: self.host.rp_id.clone(),
                challenge_b64u: base64_url_encode(&challenge),
                allowed_credential_ids: Vec::new(),
            })
            .await?;
        ceremony.prf_outputs.ensure_present()?;

        let vrf_public_key = self
            .vrf
            .unlock(
                account_id.clone(),
                passkey_vrf_worker::EncryptedVrfKeypair {
                    ciphertext_b64u: record.ciphertext_b64u,
                    nonce_b64u: record.nonce_b64u,
                },
                ceremony.prf_outputs.vrf_salt_b64u.clone(),
            )
            .await?;

        self.store
            .put(
                store::namespaces::LAST_USER,
                "current",
                serde_json::json!(account_id),
            )
            .await?;
        Ok(vrf_public_key)
    }

    /// Close the VRF session and wipe per-user caches.
    pub async fn logout(&self) -> WalletResult<()> {
        self.vrf.clear_on_logout().await?;
        self.nonce.clear_transaction_context();
        Ok(())
    }

    async fn persist_registration(
        &self,
        account_id: &AccountId,
        near_public_key: &str,
        vrf: &passkey_vrf_worker::DeterministicVrfResult,
        credential: &WebAuthnRegistrationCredential,
    ) -> WalletResult<()> {
        let now = self.clock.now_ms();

        let user = UserRecord {
            account_id: account_id.clone(),
            near_public_key: near_public_key.to_string(),
            device_number: 1,
            vrf_public_key_b64u: vrf.vrf_public_key_b64u.clone(),
            registered_at_ms: now,
        };
        store::put_typed(
            self.store.as_ref(),
            store::namespaces::USERS,
            account_id.as_str(),
            &user,
        )
        .await?;
        self.store
            .put(
                store::namespaces::LAST_USER,
                "current",
                serde_json::json!(account_id),
            )
            .await?;

        let credential_public_key =
            extract_credential_public_key(&credential.response.attestation_object)?;
        let authenticator = AuthenticatorRecord {
            credential_id: credential.id.clone(),
            credential_public_key_b64u: base64_url_encode(&credential_public_key),
            transports: credential.response.transports.clone().unwrap_or_default(),
            device_number: 1,
            vrf_public_keys: vec![vrf.vrf_public_key_b64u.clone()],
            registered_at_ms: now,
        };
        store::put_typed(
            self.store.as_ref(),
            store::namespaces::AUTHENTICATORS,
            &authenticator_key(account_id, &credential.id),
            &authenticator,
        )
        .await?;

        let vrf_record = EncryptedVrfKeyRecord {
            account_id: account_id.clone(),
            vrf_public_key_b64u: vrf.vrf_public_key_b64u.clone(),
            ciphertext_b64u: vrf.encrypted.ciphertext_b64u.clone(),
            nonce_b64u: vrf.encrypted.nonce_b64u.clone(),
            server_wrapped: None,
        };
        store::put_typed(
            self.store.as_ref(),
            store::namespaces::NEAR_KEYS,
            &format!("{}:vrf", account_id),
            &vrf_record,
        )
        .await?;
        Ok(())
    }
}
