//! Caller-facing action parameters.
//!
//! [`ActionParams`] is the loosely-typed shape that arrives over the isolation
//! transport (amounts as decimal strings, keys in `ed25519:<base58>` form).
//! Validation is a total match on the tag; [`ActionParams::to_action`] is the
//! only way to obtain a wire [`Action`].

use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::errors::WalletError;
use crate::near::{AccessKey, Action, Balance, FunctionCallAction, Gas, PublicKey};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "action_type")]
pub enum ActionParams {
    CreateAccount,
    DeployContract {
        code: Vec<u8>,
    },
    FunctionCall {
        method_name: String,
        /// JSON-encoded arguments, passed to the contract verbatim.
        args: String,
        gas: String,
        deposit: String,
    },
    Transfer {
        deposit: String,
    },
    Stake {
        stake: String,
        public_key: String,
    },
    AddKey {
        public_key: String,
        access_key: AccessKey,
    },
    DeleteKey {
        public_key: String,
    },
    DeleteAccount {
        beneficiary_id: String,
    },
}

impl ActionParams {
    /// Validate and convert into the canonical wire action.
    pub fn to_action(&self) -> Result<Action, WalletError> {
        match self {
            ActionParams::CreateAccount => Ok(Action::CreateAccount),

            ActionParams::DeployContract { code } => {
                if code.is_empty() {
                    return Err(WalletError::action_invalid("contract code cannot be empty"));
                }
                Ok(Action::DeployContract { code: code.clone() })
            }

            ActionParams::FunctionCall {
                method_name,
                args,
                gas,
                deposit,
            } => {
                if method_name.is_empty() {
                    return Err(WalletError::action_invalid("method name cannot be empty"));
                }
                if args.is_empty() {
                    return Err(WalletError::action_invalid(
                        "function call args cannot be empty; pass \"{}\" for no arguments",
                    ));
                }
                let gas = parse_gas(gas)?;
                let deposit = parse_balance(deposit, "deposit")?;
                Ok(Action::FunctionCall(Box::new(FunctionCallAction {
                    method_name: method_name.clone(),
                    args: args.as_bytes().to_vec(),
                    gas,
                    deposit,
                })))
            }

            ActionParams::Transfer { deposit } => {
                if deposit.is_empty() {
                    return Err(WalletError::action_invalid("transfer amount cannot be empty"));
                }
                Ok(Action::Transfer {
                    deposit: parse_balance(deposit, "deposit")?,
                })
            }

            ActionParams::Stake { stake, public_key } => Ok(Action::Stake {
                stake: parse_balance(stake, "stake")?,
                public_key: parse_public_key(public_key)?,
            }),

            ActionParams::AddKey {
                public_key,
                access_key,
            } => Ok(Action::AddKey {
                public_key: parse_public_key(public_key)?,
                access_key: access_key.clone(),
            }),

            ActionParams::DeleteKey { public_key } => Ok(Action::DeleteKey {
                public_key: parse_public_key(public_key)?,
            }),

            ActionParams::DeleteAccount { beneficiary_id } => {
                let beneficiary_id: AccountId = beneficiary_id
                    .parse()
                    .map_err(|e: WalletError| WalletError::action_invalid(e.message))?;
                Ok(Action::DeleteAccount { beneficiary_id })
            }
        }
    }

    /// Parameter validity without the constructed action.
    pub fn validate(&self) -> Result<(), WalletError> {
        self.to_action().map(|_| ())
    }
}

/// Build all actions for one transaction, reporting the failing index.
pub fn build_actions(params: &[ActionParams]) -> Result<Vec<Action>, WalletError> {
    params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            p.to_action().map_err(|e| {
                WalletError::action_invalid(format!("action {}: {}", i, e.message))
            })
        })
        .collect()
}

fn parse_public_key(value: &str) -> Result<PublicKey, WalletError> {
    if value.is_empty() {
        return Err(WalletError::action_invalid("public key cannot be empty"));
    }
    PublicKey::parse(value).map_err(|e| WalletError::action_invalid(e.message))
}

fn parse_gas(value: &str) -> Result<Gas, WalletError> {
    value
        .parse::<Gas>()
        .map_err(|_| WalletError::action_invalid(format!("invalid gas amount '{}'", value)))
}

fn parse_balance(value: &str, what: &str) -> Result<Balance, WalletError> {
    value
        .parse::<Balance>()
        .map_err(|_| WalletError::action_invalid(format!("invalid {} amount '{}'", what, value)))
}
