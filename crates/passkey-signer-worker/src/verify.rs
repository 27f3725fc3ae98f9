//! Pre-signing verification: the VRF proof locally, the assertion's challenge
//! binding locally, and the full VRF + WebAuthn pair on-chain.

use log::debug;
use serde_json::json;

use passkey_chain_client::ChainRpc;
use passkey_core::config::contract_methods;
use passkey_core::encoders::base64_url_decode;
use passkey_core::errors::{ErrorCode, WalletError, WalletResult};
use passkey_core::vrf::{vrf_verify, VrfChallenge, VrfData};
use passkey_core::webauthn::WebAuthnAuthenticationCredential;
use passkey_core::AccountId;

/// Check the VRF proof without touching the network. A challenge that does
/// not verify locally never reaches the contract.
pub fn check_vrf_challenge(challenge: &VrfChallenge) -> WalletResult<VrfData> {
    let data = VrfData::try_from(challenge)?;
    if !vrf_verify(
        &data.public_key,
        &data.vrf_input_data,
        &data.vrf_output,
        &data.vrf_proof,
    ) {
        return Err(WalletError::new(
            ErrorCode::VrfVerifyFail,
            "VRF proof does not verify",
        ));
    }
    Ok(data)
}

/// The assertion must be a `webauthn.get` ceremony whose challenge is exactly
/// the VRF output.
pub fn check_assertion_binding(
    credential: &WebAuthnAuthenticationCredential,
    challenge: &VrfChallenge,
) -> WalletResult<()> {
    let client_data_bytes = base64_url_decode(&credential.response.client_data_json)
        .map_err(|_| assertion_invalid("clientDataJSON is not base64url"))?;
    let client_data: serde_json::Value = serde_json::from_slice(&client_data_bytes)
        .map_err(|_| assertion_invalid("clientDataJSON is not JSON"))?;

    match client_data.get("type").and_then(|t| t.as_str()) {
        Some("webauthn.get") => {}
        other => {
            return Err(assertion_invalid(&format!(
                "unexpected ceremony type {:?}",
                other
            )))
        }
    }

    let presented = client_data
        .get("challenge")
        .and_then(|c| c.as_str())
        .ok_or_else(|| assertion_invalid("clientDataJSON has no challenge"))?;
    if presented != challenge.webauthn_challenge_b64u() {
        return Err(assertion_invalid("assertion challenge is not the VRF output"));
    }
    Ok(())
}

fn assertion_invalid(message: &str) -> WalletError {
    WalletError::new(ErrorCode::AssertionInvalid, message)
}

/// Ask the registry contract to verify the VRF challenge and WebAuthn
/// assertion together. Read-only view call.
pub async fn verify_authentication_on_chain(
    rpc: &dyn ChainRpc,
    contract_id: &AccountId,
    vrf_data: &VrfData,
    credential: &WebAuthnAuthenticationCredential,
) -> WalletResult<Vec<String>> {
    let args = json!({
        "vrf_data": vrf_data,
        "webauthn_authentication": credential,
    });
    let result = rpc
        .call_function(
            contract_id,
            contract_methods::VERIFY_AUTHENTICATION_RESPONSE,
            &args,
        )
        .await?;

    let verified = result
        .value
        .get("verified")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    debug!(
        "contract verification: verified={} ({} log lines)",
        verified,
        result.logs.len()
    );
    if !verified {
        return Err(WalletError::new(
            ErrorCode::VrfVerifyFail,
            "contract rejected the VRF + WebAuthn authentication",
        )
        .with_details(result.value.clone()));
    }
    Ok(result.logs)
}
