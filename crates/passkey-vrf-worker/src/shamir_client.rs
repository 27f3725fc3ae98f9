//! Client side of the Shamir 3-pass server lock.
//!
//! The relay never sees the KEK unlocked: the client always applies its own
//! temporary lock before a value goes over the wire, and strips it afterwards.

use async_trait::async_trait;
use log::debug;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use url::Url;

use passkey_core::errors::{ErrorCode, WalletError, WalletResult};
use passkey_core::shamir3pass::{decode_biguint_b64u, encode_biguint_b64u, Shamir3Pass};
use passkey_core::store::ServerWrappedKek;
use passkey_core::vrf::{vrf_keypair_bytes, vrf_keypair_from_bytes};
use passkey_core::encoders::{base64_url_decode, base64_url_encode};
use vrf_wasm::ecvrf::ECVRFKeyPair;

/// Wire shapes shared with the relay's Shamir endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApplyServerLockRequest {
    pub kek_c_b64u: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApplyServerLockResponse {
    pub kek_cs_b64u: String,
    pub key_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveServerLockRequest {
    pub kek_cs_b64u: String,
    pub key_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveServerLockResponse {
    pub kek_c_b64u: String,
}

/// Transport to the relay's lock service. Injected so the protocol logic can
/// be exercised against a local server implementation in tests.
#[async_trait]
pub trait ServerLockTransport: Send + Sync {
    async fn apply_lock(&self, kek_c: &BigUint) -> WalletResult<(BigUint, String)>;
    async fn remove_lock(&self, kek_cs: &BigUint, key_id: &str) -> WalletResult<BigUint>;
}

/// HTTP transport against the relay routes.
pub struct RelayLockClient {
    http: reqwest::Client,
    apply_url: Url,
    remove_url: Url,
}

impl RelayLockClient {
    pub fn new(apply_url: Url, remove_url: Url) -> WalletResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .map_err(|e| WalletError::internal(format!("http client build failed: {}", e)))?;
        Ok(RelayLockClient {
            http,
            apply_url,
            remove_url,
        })
    }

    async fn post<Req: Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        url: &Url,
        body: &Req,
    ) -> WalletResult<Resp> {
        debug!("shamir lock POST {}", url);
        let response = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| WalletError::new(ErrorCode::RpcHttp, format!("lock request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(WalletError::new(
                ErrorCode::RpcHttp,
                format!("lock service status {}", status),
            ));
        }
        response.json::<Resp>().await.map_err(|e| {
            WalletError::new(ErrorCode::RpcError, format!("lock response decode failed: {}", e))
        })
    }
}

#[async_trait]
impl ServerLockTransport for RelayLockClient {
    async fn apply_lock(&self, kek_c: &BigUint) -> WalletResult<(BigUint, String)> {
        let response: ApplyServerLockResponse = self
            .post(
                &self.apply_url,
                &ApplyServerLockRequest {
                    kek_c_b64u: encode_biguint_b64u(kek_c),
                },
            )
            .await?;
        Ok((decode_biguint_b64u(&response.kek_cs_b64u)?, response.key_id))
    }

    async fn remove_lock(&self, kek_cs: &BigUint, key_id: &str) -> WalletResult<BigUint> {
        let response: RemoveServerLockResponse = self
            .post(
                &self.remove_url,
                &RemoveServerLockRequest {
                    kek_cs_b64u: encode_biguint_b64u(kek_cs),
                    key_id: key_id.to_string(),
                },
            )
            .await?;
        decode_biguint_b64u(&response.kek_c_b64u)
    }
}

/// Registration: wrap the current VRF keypair under a fresh KEK and leave the
/// server's lock on it. The stored [`ServerWrappedKek`] can only be opened
/// with the relay's help.
pub async fn wrap_keypair_with_server_lock(
    shamir: &Shamir3Pass,
    transport: &dyn ServerLockTransport,
    keypair: &ECVRFKeyPair,
) -> WalletResult<ServerWrappedKek> {
    let keypair_bytes = vrf_keypair_bytes(keypair)?;
    let kek = shamir
        .random_kek()
        .map_err(|e| WalletError::internal(e.to_string()))?;
    let ciphertext = shamir
        .encrypt_with_kek(&kek, &keypair_bytes)
        .map_err(|e| WalletError::aead_fail(e.to_string()))?;

    let client = shamir
        .generate_lock_keys()
        .map_err(|e| WalletError::internal(e.to_string()))?;
    let kek_c = shamir
        .add_lock(&kek, &client.e)
        .map_err(|e| WalletError::internal(e.to_string()))?;

    let (kek_cs, key_id) = transport.apply_lock(&kek_c).await?;

    let kek_s = shamir
        .remove_lock(&kek_cs, &client.d)
        .map_err(|e| WalletError::internal(e.to_string()))?;

    Ok(ServerWrappedKek {
        kek_s_b64u: encode_biguint_b64u(&kek_s),
        ciphertext_b64u: base64_url_encode(&ciphertext),
        key_id,
    })
}

/// Login: recover the VRF keypair from a server-wrapped KEK. The client's
/// temporary lock hides the KEK from the relay during the exchange.
pub async fn unwrap_keypair_with_server_lock(
    shamir: &Shamir3Pass,
    transport: &dyn ServerLockTransport,
    wrapped: &ServerWrappedKek,
) -> WalletResult<ECVRFKeyPair> {
    let kek_s = decode_biguint_b64u(&wrapped.kek_s_b64u)?;

    let client = shamir
        .generate_lock_keys()
        .map_err(|e| WalletError::internal(e.to_string()))?;
    let kek_sc = shamir
        .add_lock(&kek_s, &client.e)
        .map_err(|e| WalletError::internal(e.to_string()))?;

    let kek_c = transport.remove_lock(&kek_sc, &wrapped.key_id).await?;

    let kek = shamir
        .remove_lock(&kek_c, &client.d)
        .map_err(|e| WalletError::internal(e.to_string()))?;

    let ciphertext = base64_url_decode(&wrapped.ciphertext_b64u)?;
    let keypair_bytes = shamir
        .decrypt_with_kek(&kek, &ciphertext)
        .map_err(|_| WalletError::aead_fail("server-wrapped KEK did not open the keypair"))?;
    vrf_keypair_from_bytes(&keypair_bytes)
}
