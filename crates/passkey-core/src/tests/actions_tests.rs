use crate::actions::{build_actions, ActionParams};
use crate::errors::ErrorCode;
use crate::near::{AccessKey, AccessKeyPermission, Action, FunctionCallPermission};

fn sample_public_key() -> String {
    crate::encoders::encode_near_public_key(&[6u8; 32])
}

#[test]
fn function_call_params_build_action() {
    let params = ActionParams::FunctionCall {
        method_name: "set_value".to_string(),
        args: "{\"value\":1}".to_string(),
        gas: "30000000000000".to_string(),
        deposit: "0".to_string(),
    };
    match params.to_action().unwrap() {
        Action::FunctionCall(call) => {
            assert_eq!(call.method_name, "set_value");
            assert_eq!(call.args, b"{\"value\":1}".to_vec());
            assert_eq!(call.gas, 30_000_000_000_000);
            assert_eq!(call.deposit, 0);
        }
        other => panic!("unexpected action {:?}", other),
    }
}

#[test]
fn function_call_requires_method_and_args() {
    let missing_method = ActionParams::FunctionCall {
        method_name: String::new(),
        args: "{}".to_string(),
        gas: "1".to_string(),
        deposit: "0".to_string(),
    };
    assert_eq!(
        missing_method.to_action().unwrap_err().code,
        ErrorCode::ActionInvalid
    );

    let missing_args = ActionParams::FunctionCall {
        method_name: "foo".to_string(),
        args: String::new(),
        gas: "1".to_string(),
        deposit: "0".to_string(),
    };
    assert!(missing_args.to_action().is_err());
}

#[test]
fn transfer_validates_amount() {
    assert!(ActionParams::Transfer {
        deposit: "1000000000000000000000000".to_string()
    }
    .to_action()
    .is_ok());
    assert!(ActionParams::Transfer {
        deposit: String::new()
    }
    .to_action()
    .is_err());
    assert!(ActionParams::Transfer {
        deposit: "12near".to_string()
    }
    .to_action()
    .is_err());
}

#[test]
fn add_key_builds_typed_access_key() {
    let params = ActionParams::AddKey {
        public_key: sample_public_key(),
        access_key: AccessKey {
            nonce: 0,
            permission: AccessKeyPermission::FunctionCall(FunctionCallPermission {
                allowance: Some(250_000_000_000_000_000_000_000),
                receiver_id: "contract.test".to_string(),
                method_names: vec!["claim".to_string()],
            }),
        },
    };
    match params.to_action().unwrap() {
        Action::AddKey {
            public_key,
            access_key,
        } => {
            assert_eq!(public_key.key_data, [6u8; 32]);
            match access_key.permission {
                AccessKeyPermission::FunctionCall(fc) => {
                    assert_eq!(fc.receiver_id, "contract.test");
                    assert_eq!(fc.method_names, vec!["claim".to_string()]);
                }
                other => panic!("unexpected permission {:?}", other),
            }
        }
        other => panic!("unexpected action {:?}", other),
    }
}

#[test]
fn key_actions_reject_malformed_keys() {
    let bad = ActionParams::DeleteKey {
        public_key: "ed25519:shortkey".to_string(),
    };
    assert_eq!(bad.to_action().unwrap_err().code, ErrorCode::ActionInvalid);

    let wrong_curve = ActionParams::Stake {
        stake: "1".to_string(),
        public_key: "secp256k1:abcdef".to_string(),
    };
    assert!(wrong_curve.to_action().is_err());
}

#[test]
fn delete_account_validates_beneficiary() {
    assert!(ActionParams::DeleteAccount {
        beneficiary_id: "heir.test".to_string()
    }
    .to_action()
    .is_ok());
    assert!(ActionParams::DeleteAccount {
        beneficiary_id: "Bad!Account".to_string()
    }
    .to_action()
    .is_err());
}

#[test]
fn build_actions_reports_failing_index() {
    let err = build_actions(&[
        ActionParams::CreateAccount,
        ActionParams::Transfer {
            deposit: "nope".to_string(),
        },
    ])
    .unwrap_err();
    assert!(err.message.contains("action 1"));
}

#[test]
fn action_params_serde_uses_action_type_tag() {
    let json = r#"{"action_type":"Transfer","deposit":"1"}"#;
    let parsed: ActionParams = serde_json::from_str(json).unwrap();
    assert_eq!(
        parsed,
        ActionParams::Transfer {
            deposit: "1".to_string()
        }
    );
}
