//! Relay configuration: CLI flags with environment-variable defaults,
//! loaded after `.env` in the binary.

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use url::Url;

use passkey_core::errors::{WalletError, WalletResult};
use passkey_core::near::Balance;
use passkey_core::AccountId;

#[derive(Parser, Debug, Clone)]
#[command(name = "passkey-relay")]
#[command(about = "Relay authentication service for the passkey wallet")]
pub struct RelayConfig {
    #[arg(long, env = "RELAYER_ACCOUNT_ID")]
    pub relayer_account_id: String,

    /// `ed25519:<base58 64B>` signing key for the relay account.
    #[arg(long, env = "RELAYER_PRIVATE_KEY", hide_env_values = true)]
    pub relayer_private_key: String,

    #[arg(long, env = "WEBAUTHN_CONTRACT_ID")]
    pub webauthn_contract_id: String,

    #[arg(long, env = "RPC_URL")]
    pub rpc_url: Url,

    #[arg(long, env = "NETWORK_ID", default_value = "testnet")]
    pub network_id: String,

    /// Balance attached to created accounts, in yocto units.
    #[arg(long, env = "ACCOUNT_INITIAL_BALANCE", default_value = "50000000000000000000000")]
    pub account_initial_balance: String,

    #[arg(long, env = "CREATE_AND_REGISTER_GAS", default_value_t = 120_000_000_000_000)]
    pub create_and_register_gas: u64,

    // === Shamir 3-pass ===
    #[arg(long, env = "SHAMIR_P_B64U")]
    pub shamir_p_b64u: Option<String>,

    #[arg(long, env = "SHAMIR_E_S_B64U", hide_env_values = true)]
    pub shamir_e_s_b64u: Option<String>,

    #[arg(long, env = "SHAMIR_D_S_B64U", hide_env_values = true)]
    pub shamir_d_s_b64u: Option<String>,

    #[arg(long, env = "SHAMIR_GRACE_KEYS_FILE")]
    pub shamir_grace_keys_file: Option<PathBuf>,

    #[arg(long, env = "SHAMIR_MAX_GRACE_KEYS", default_value_t = 5)]
    pub shamir_max_grace_keys: usize,

    /// Rotate the server key every N minutes; unset disables the cron.
    #[arg(long, env = "SHAMIR_ROTATION_INTERVAL_MINUTES")]
    pub shamir_rotation_interval_minutes: Option<u64>,

    // === Sessions ===
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,

    #[arg(long, env = "SESSION_TTL_MINUTES", default_value_t = 60)]
    pub session_ttl_minutes: u64,

    #[arg(long, env = "SESSION_REFRESH_WINDOW_MINUTES", default_value_t = 15)]
    pub session_refresh_window_minutes: u64,

    /// Fail the account-existence probe loudly instead of treating
    /// persistent transient errors as "not found".
    #[arg(long, env = "STRICT_EXISTS_CHECK", default_value_t = false)]
    pub strict_exists_check: bool,

    // === Listener ===
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,
}

impl RelayConfig {
    pub fn relayer_account(&self) -> WalletResult<AccountId> {
        self.relayer_account_id.parse()
    }

    pub fn contract_account(&self) -> WalletResult<AccountId> {
        self.webauthn_contract_id.parse()
    }

    pub fn initial_balance(&self) -> WalletResult<Balance> {
        self.account_initial_balance
            .parse::<Balance>()
            .map_err(|_| WalletError::input_invalid("ACCOUNT_INITIAL_BALANCE is not a yocto amount"))
    }
}
