//! COSE credential public key extraction.
//!
//! Registration stores the authenticator's credential public key alongside the
//! credential id. The key sits at the tail of the attested credential data
//! inside the attestation object's `authData`.

use ciborium::Value as CborValue;

use crate::encoders::base64_url_decode;
use crate::errors::WalletError;

/// rpIdHash(32) + flags(1) + signCount(4).
const AUTH_DATA_HEADER_LEN: usize = 37;
const AAGUID_LEN: usize = 16;
/// AT flag: attested credential data present.
const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 0x40;

/// Extract the COSE-encoded credential public key from a base64url
/// attestation object.
pub fn extract_credential_public_key(
    attestation_object_b64u: &str,
) -> Result<Vec<u8>, WalletError> {
    let attestation_object = base64_url_decode(attestation_object_b64u)?;
    let auth_data = auth_data_from_attestation(&attestation_object)?;
    credential_public_key_from_auth_data(&auth_data)
}

fn auth_data_from_attestation(attestation_object: &[u8]) -> Result<Vec<u8>, WalletError> {
    let value: CborValue = ciborium::from_reader(attestation_object)
        .map_err(|e| WalletError::input_invalid(format!("attestation CBOR error: {}", e)))?;
    let CborValue::Map(entries) = value else {
        return Err(WalletError::input_invalid(
            "attestation object is not a CBOR map",
        ));
    };
    for (key, value) in entries {
        if matches!(&key, CborValue::Text(k) if k == "authData") {
            if let CborValue::Bytes(bytes) = value {
                return Ok(bytes);
            }
        }
    }
    Err(WalletError::input_invalid(
        "authData missing from attestation object",
    ))
}

fn credential_public_key_from_auth_data(auth_data: &[u8]) -> Result<Vec<u8>, WalletError> {
    if auth_data.len() < AUTH_DATA_HEADER_LEN {
        return Err(WalletError::input_invalid("authenticator data too short"));
    }
    let flags = auth_data[32];
    if flags & FLAG_ATTESTED_CREDENTIAL_DATA == 0 {
        return Err(WalletError::input_invalid(
            "no attested credential data present",
        ));
    }

    let mut offset = AUTH_DATA_HEADER_LEN + AAGUID_LEN;
    let cred_id_len_end = offset + 2;
    if auth_data.len() < cred_id_len_end {
        return Err(WalletError::input_invalid(
            "authenticator data truncated before credential id length",
        ));
    }
    let cred_id_len =
        u16::from_be_bytes([auth_data[offset], auth_data[offset + 1]]) as usize;
    offset = cred_id_len_end + cred_id_len;
    if auth_data.len() <= offset {
        return Err(WalletError::input_invalid(
            "authenticator data truncated before credential public key",
        ));
    }
    Ok(auth_data[offset..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoders::base64_url_encode;

    fn synthetic_attestation(cred_id: &[u8], cose_key: &[u8]) -> String {
        let mut auth_data = vec![0u8; 32]; // rpIdHash
        auth_data.push(FLAG_ATTESTED_CREDENTIAL_DATA);
        auth_data.extend_from_slice(&[0, 0, 0, 1]); // signCount
        auth_data.extend_from_slice(&[0u8; AAGUID_LEN]);
        auth_data.extend_from_slice(&(cred_id.len() as u16).to_be_bytes());
        auth_data.extend_from_slice(cred_id);
        auth_data.extend_from_slice(cose_key);

        let map = CborValue::Map(vec![
            (
                CborValue::Text("fmt".to_string()),
                CborValue::Text("none".to_string()),
            ),
            (
                CborValue::Text("authData".to_string()),
                CborValue::Bytes(auth_data),
            ),
        ]);
        let mut encoded = Vec::new();
        ciborium::into_writer(&map, &mut encoded).unwrap();
        base64_url_encode(&encoded)
    }

    #[test]
    fn extracts_cose_key_from_synthetic_attestation() {
        let cose_key = [0xa5u8, 1, 2, 3, 4, 5];
        let attestation = synthetic_attestation(b"credential-id-1234", &cose_key);
        let extracted = extract_credential_public_key(&attestation).unwrap();
        assert_eq!(extracted, cose_key);
    }

    #[test]
    fn rejects_auth_data_without_attested_flag() {
        let mut auth_data = vec![0u8; 32];
        auth_data.push(0); // no AT flag
        auth_data.extend_from_slice(&[0, 0, 0, 1]);
        let map = CborValue::Map(vec![(
            CborValue::Text("authData".to_string()),
            CborValue::Bytes(auth_data),
        )]);
        let mut encoded = Vec::new();
        ciborium::into_writer(&map, &mut encoded).unwrap();
        let err = extract_credential_public_key(&base64_url_encode(&encoded)).unwrap_err();
        assert!(err.message.contains("attested credential data"));
    }
}
