//! Injected host capabilities.
//!
//! The core never touches an authenticator API, a camera, or a QR renderer
//! directly; the embedding application supplies implementations of these
//! traits.

use async_trait::async_trait;

use passkey_core::errors::WalletResult;
use passkey_core::webauthn::{AssertionCeremony, RegistrationCeremony};
use passkey_core::AccountId;

/// Facts about the host the wallet frame runs in.
#[derive(Clone, Debug)]
pub struct HostInfo {
    /// Relying-party id the authenticator scopes credentials to.
    pub rp_id: String,
}

#[derive(Clone, Debug)]
pub struct CreateCredentialRequest {
    pub account_id: AccountId,
    pub rp_id: String,
    /// base64url challenge (the VRF output).
    pub challenge_b64u: String,
    /// Contract-assigned ordinal, when registering an additional device.
    pub device_number: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct GetAssertionRequest {
    pub account_id: AccountId,
    pub rp_id: String,
    pub challenge_b64u: String,
    /// Credential ids registered for this account, empty for discoverable.
    pub allowed_credential_ids: Vec<String>,
}

/// Abstraction over the authenticator's create/get ceremonies. Implementers
/// must surface both PRF outputs; the wallet fails `PRF_UNAVAILABLE` when a
/// ceremony returns fewer.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn create_credential(
        &self,
        request: CreateCredentialRequest,
    ) -> WalletResult<RegistrationCeremony>;

    async fn get_assertion(&self, request: GetAssertionRequest)
        -> WalletResult<AssertionCeremony>;
}

/// QR rendering, injected (the core never draws).
pub trait QrCodec: Send + Sync {
    fn encode(&self, payload: &str) -> WalletResult<Vec<u8>>;
}

/// Camera scanning, injected.
#[async_trait]
pub trait CameraSource: Send + Sync {
    async fn scan_once(&self) -> WalletResult<String>;
}
