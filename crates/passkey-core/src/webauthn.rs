//! Credential ceremony DTOs.
//!
//! These are the shapes a Credential Provider returns and the registry
//! contract consumes. All binary fields are base64url strings. No browser
//! concept appears here; providers adapt whatever authenticator API they sit
//! on top of.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{ErrorCode, WalletError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAuthnRegistrationResponse {
    pub client_data_json: String,
    pub attestation_object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAuthnRegistrationCredential {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
    pub response: WebAuthnRegistrationResponse,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAuthnAuthenticationResponse {
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAuthnAuthenticationCredential {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
    pub response: WebAuthnAuthenticationResponse,
}

/// The two PRF outputs of a ceremony: one drives the KEK and signing seed,
/// the other the VRF keypair. Zeroized on drop, redacted in Debug.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct PrfOutputs {
    pub key_salt_b64u: String,
    pub vrf_salt_b64u: String,
}

impl PrfOutputs {
    /// Both outputs must be present; a provider that cannot produce two is
    /// unusable for this wallet.
    pub fn ensure_present(&self) -> Result<(), WalletError> {
        if self.key_salt_b64u.is_empty() || self.vrf_salt_b64u.is_empty() {
            return Err(WalletError::new(
                ErrorCode::PrfUnavailable,
                "authenticator did not return both PRF outputs",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for PrfOutputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrfOutputs")
            .field("key_salt_b64u", &"[REDACTED]")
            .field("vrf_salt_b64u", &"[REDACTED]")
            .finish()
    }
}

/// Result of a create-credential ceremony.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistrationCeremony {
    pub credential: WebAuthnRegistrationCredential,
    pub prf_outputs: PrfOutputs,
}

/// Result of a get-assertion ceremony.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssertionCeremony {
    pub credential: WebAuthnAuthenticationCredential,
    pub prf_outputs: PrfOutputs,
}
