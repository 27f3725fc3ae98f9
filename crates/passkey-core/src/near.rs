//! NEAR transaction model with its canonical Borsh wire encoding.
//!
//! Field order on every struct and variant order on every enum are part of
//! the wire format; do not reorder.

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signer as _, SigningKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::account::AccountId;
use crate::errors::{ErrorCode, WalletError};

pub type Nonce = u64;
pub type Gas = u64;
pub type Balance = u128;

pub const ED25519_KEY_TYPE: u8 = 0;

// === SERDE HELPERS FOR FIXED-SIZE BYTE ARRAYS ===
// JSON has no fixed-length byte type; serialize as tuples of numbers so the
// Borsh-shaped structs round-trip through serde unchanged.

macro_rules! serde_byte_array {
    ($name:ident, $len:expr) => {
        pub mod $name {
            use serde::de::{Error, SeqAccess, Visitor};
            use serde::ser::SerializeTuple;
            use serde::{Deserializer, Serializer};

            pub fn serialize<S: Serializer>(
                value: &[u8; $len],
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                let mut tuple = serializer.serialize_tuple($len)?;
                for byte in value {
                    tuple.serialize_element(byte)?;
                }
                tuple.end()
            }

            pub fn deserialize<'de, D: Deserializer<'de>>(
                deserializer: D,
            ) -> Result<[u8; $len], D::Error> {
                struct ArrVisitor;

                impl<'de> Visitor<'de> for ArrVisitor {
                    type Value = [u8; $len];

                    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                        write!(f, "an array of {} bytes", $len)
                    }

                    fn visit_seq<A: SeqAccess<'de>>(
                        self,
                        mut seq: A,
                    ) -> Result<Self::Value, A::Error> {
                        let mut arr = [0u8; $len];
                        for (i, slot) in arr.iter_mut().enumerate() {
                            *slot = seq
                                .next_element()?
                                .ok_or_else(|| Error::invalid_length(i, &self))?;
                        }
                        Ok(arr)
                    }

                    fn visit_bytes<E: Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                        v.try_into()
                            .map_err(|_| Error::invalid_length(v.len(), &self))
                    }
                }

                deserializer.deserialize_tuple($len, ArrVisitor)
            }
        }
    };
}

serde_byte_array!(serde_array_32, 32);
serde_byte_array!(serde_array_64, 64);

// === BALANCE AS DECIMAL STRING ===
// u128 does not survive JSON; encode as a decimal string and accept either a
// string or a non-negative number on the way in.

pub mod serde_balance {
    use super::Balance;
    use serde::de::{Error, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Balance, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Balance, D::Error> {
        struct BalanceVisitor;

        impl<'de> Visitor<'de> for BalanceVisitor {
            type Value = Balance;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a non-negative u128 as string or number")
            }

            fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse::<Balance>().map_err(E::custom)
            }

            fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(v as Balance)
            }

            fn visit_u128<E: Error>(self, v: u128) -> Result<Self::Value, E> {
                Ok(v)
            }

            fn visit_i64<E: Error>(self, v: i64) -> Result<Self::Value, E> {
                u128::try_from(v).map_err(|_| E::custom("balance cannot be negative"))
            }
        }

        deserializer.deserialize_any(BalanceVisitor)
    }
}

pub mod serde_opt_balance {
    use super::Balance;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Balance>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => super::serde_balance::serialize(v, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Balance>, D::Error> {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(with = "super::serde_balance")] Balance);

        Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
    }
}

// === KEYS, SIGNATURES, HASHES ===

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub key_type: u8,
    #[serde(with = "serde_array_32")]
    pub key_data: [u8; 32],
}

impl PublicKey {
    pub fn from_ed25519_bytes(bytes: &[u8; 32]) -> Self {
        PublicKey {
            key_type: ED25519_KEY_TYPE,
            key_data: *bytes,
        }
    }

    /// Parse an `ed25519:<base58>` string.
    pub fn parse(value: &str) -> Result<Self, WalletError> {
        let bytes = crate::encoders::decode_near_public_key(value)?;
        Ok(Self::from_ed25519_bytes(&bytes))
    }

    pub fn to_near_string(&self) -> String {
        crate::encoders::encode_near_public_key(&self.key_data)
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub key_type: u8,
    #[serde(with = "serde_array_64")]
    pub signature_data: [u8; 64],
}

impl Signature {
    pub fn from_ed25519_bytes(bytes: &[u8; 64]) -> Self {
        Signature {
            key_type: ED25519_KEY_TYPE,
            signature_data: *bytes,
        }
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoHash(#[serde(with = "serde_array_32")] pub [u8; 32]);

impl CryptoHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        CryptoHash(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, WalletError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| WalletError::input_invalid("block hash must be 32 bytes"))?;
        Ok(CryptoHash(arr))
    }

    pub fn from_base58(value: &str) -> Result<Self, WalletError> {
        let bytes = bs58::decode(value)
            .into_vec()
            .map_err(|e| WalletError::input_invalid(format!("hash base58 error: {}", e)))?;
        Self::from_slice(&bytes)
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }
}

// === ACCESS KEYS ===

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    pub nonce: Nonce,
    #[serde(deserialize_with = "deserialize_permission_compat")]
    pub permission: AccessKeyPermission,
}

impl AccessKey {
    pub fn full_access() -> Self {
        AccessKey {
            nonce: 0,
            permission: AccessKeyPermission::FullAccess,
        }
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessKeyPermission {
    FunctionCall(FunctionCallPermission),
    FullAccess,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallPermission {
    #[serde(with = "serde_opt_balance", default)]
    pub allowance: Option<Balance>,
    pub receiver_id: String,
    pub method_names: Vec<String>,
}

/// Accept the RPC-side shapes for a permission: the bare string
/// `"FullAccess"`, `{"FullAccess": {}}`, or `{"FunctionCall": {...}}`.
pub fn deserialize_permission_compat<'de, D>(
    deserializer: D,
) -> Result<AccessKeyPermission, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Compat {
        Tag(String),
        FunctionCallMap {
            #[serde(rename = "FunctionCall")]
            function_call: FunctionCallPermission,
        },
        FullAccessMap {
            #[serde(rename = "FullAccess")]
            _full_access: serde::de::IgnoredAny,
        },
    }

    match Compat::deserialize(deserializer)? {
        Compat::Tag(tag) if tag == "FullAccess" => Ok(AccessKeyPermission::FullAccess),
        Compat::Tag(other) => Err(serde::de::Error::custom(format!(
            "unknown access key permission '{}'",
            other
        ))),
        Compat::FunctionCallMap { function_call } => {
            Ok(AccessKeyPermission::FunctionCall(function_call))
        }
        Compat::FullAccessMap { .. } => Ok(AccessKeyPermission::FullAccess),
    }
}

// === ACTIONS ===

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallAction {
    pub method_name: String,
    pub args: Vec<u8>,
    pub gas: Gas,
    #[serde(with = "serde_balance")]
    pub deposit: Balance,
}

/// One on-chain effect within a transaction. Variant order is wire format.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    CreateAccount,
    DeployContract {
        code: Vec<u8>,
    },
    FunctionCall(Box<FunctionCallAction>),
    Transfer {
        #[serde(with = "serde_balance")]
        deposit: Balance,
    },
    Stake {
        #[serde(with = "serde_balance")]
        stake: Balance,
        public_key: PublicKey,
    },
    AddKey {
        public_key: PublicKey,
        access_key: AccessKey,
    },
    DeleteKey {
        public_key: PublicKey,
    },
    DeleteAccount {
        beneficiary_id: AccountId,
    },
}

// === TRANSACTIONS ===

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub signer_id: AccountId,
    pub public_key: PublicKey,
    pub nonce: Nonce,
    pub receiver_id: AccountId,
    pub block_hash: CryptoHash,
    pub actions: Vec<Action>,
}

impl Transaction {
    /// SHA-256 over the Borsh encoding; this is the digest the signature
    /// binds. Mirrors near-primitives `Transaction::get_hash_and_size`.
    pub fn get_hash_and_size(&self) -> Result<(CryptoHash, u64), WalletError> {
        let bytes = borsh::to_vec(self)
            .map_err(|e| WalletError::internal(format!("transaction encode failed: {}", e)))?;
        let digest = Sha256::digest(&bytes);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&digest);
        Ok((CryptoHash(hash), bytes.len() as u64))
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signature: Signature,
}

impl SignedTransaction {
    pub fn new(signature: Signature, transaction: Transaction) -> Self {
        SignedTransaction {
            transaction,
            signature,
        }
    }

    /// Authoritative wire form submitted to the chain (base64-encoded).
    pub fn to_borsh_bytes(&self) -> Result<Vec<u8>, WalletError> {
        borsh::to_vec(self)
            .map_err(|e| WalletError::internal(format!("signed tx encode failed: {}", e)))
    }

    pub fn from_borsh_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        borsh::from_slice(bytes)
            .map_err(|e| WalletError::input_invalid(format!("signed tx decode failed: {}", e)))
    }
}

/// Build a transaction from already-validated parts.
pub fn build_transaction(
    signer_id: AccountId,
    receiver_id: AccountId,
    public_key: PublicKey,
    nonce: Nonce,
    block_hash: CryptoHash,
    actions: Vec<Action>,
) -> Transaction {
    Transaction {
        signer_id,
        public_key,
        nonce,
        receiver_id,
        block_hash,
        actions,
    }
}

/// Sign a transaction: the Ed25519 signature is over the SHA-256 of the
/// Borsh-encoded transaction.
pub fn sign_transaction(
    transaction: Transaction,
    signing_key: &SigningKey,
) -> Result<SignedTransaction, WalletError> {
    let (hash, _size) = transaction.get_hash_and_size()?;
    let signature = signing_key.sign(&hash.0);
    Ok(SignedTransaction::new(
        Signature::from_ed25519_bytes(&signature.to_bytes()),
        transaction,
    ))
}

/// Hex SHA-256 of the signed transaction bytes, used as a transaction id.
pub fn signed_transaction_hash(signed_tx_bytes: &[u8]) -> String {
    let digest = Sha256::digest(signed_tx_bytes);
    format!("{:x}", digest)
}

/// Signed transaction plus its wire form and id, the shape signing calls
/// return to callers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedTransactionEnvelope {
    pub signed_transaction: SignedTransaction,
    /// base64url of the Borsh bytes; `base64(borsh_bytes)` is what gets
    /// submitted via `send_tx`.
    pub borsh_bytes_b64u: String,
    pub transaction_hash: String,
}

impl SignedTransactionEnvelope {
    pub fn from_signed(signed: SignedTransaction) -> Result<Self, WalletError> {
        let bytes = signed.to_borsh_bytes()?;
        Ok(SignedTransactionEnvelope {
            transaction_hash: signed_transaction_hash(&bytes),
            borsh_bytes_b64u: crate::encoders::base64_url_encode(&bytes),
            signed_transaction: signed,
        })
    }

    pub fn borsh_bytes(&self) -> Result<Vec<u8>, WalletError> {
        crate::encoders::base64_url_decode(&self.borsh_bytes_b64u)
    }

    /// Standard-base64 wire form for `send_tx`.
    pub fn to_send_tx_base64(&self) -> Result<String, WalletError> {
        Ok(crate::encoders::base64_standard_encode(&self.borsh_bytes()?))
    }
}

impl TryFrom<SignedTransaction> for SignedTransactionEnvelope {
    type Error = WalletError;

    fn try_from(signed: SignedTransaction) -> Result<Self, Self::Error> {
        Self::from_signed(signed)
    }
}

/// Reject misuse of zero nonces early; the chain would reject them anyway
/// but with a far less useful error.
pub fn check_nonce(nonce: Nonce) -> Result<(), WalletError> {
    if nonce == 0 {
        return Err(WalletError::new(
            ErrorCode::NonceGap,
            "transaction nonce must be non-zero",
        ));
    }
    Ok(())
}
