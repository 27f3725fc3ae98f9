use serde_json::json;

use passkey_core::near::AccessKeyPermission;

use crate::views::{decode_view_result, AccessKeyView, CallFunctionResult};

#[test]
fn view_result_decodes_json_payloads() {
    let value = decode_view_result(br#"{"verified":true,"device_number":2}"#);
    assert_eq!(value["verified"], json!(true));
    assert_eq!(value["device_number"], json!(2));
}

#[test]
fn view_result_trims_quoted_strings() {
    let value = decode_view_result(br#""alice.test"#);
    assert_eq!(value, json!("alice.test"));
}

#[test]
fn view_result_returns_plain_text_verbatim() {
    let value = decode_view_result(b"not json at all");
    assert_eq!(value, json!("not json at all"));
}

#[test]
fn call_result_carries_logs_and_value() {
    let result = CallFunctionResult::from_raw(b"null".to_vec(), vec!["log line".to_string()]);
    assert_eq!(result.value, json!(null));
    assert_eq!(result.logs, vec!["log line".to_string()]);
}

#[test]
fn access_key_view_accepts_string_permission() {
    let view: AccessKeyView = serde_json::from_value(json!({
        "nonce": 17,
        "permission": "FullAccess",
        "block_height": 100,
        "block_hash": "abc"
    }))
    .unwrap();
    assert_eq!(view.nonce, 17);
    assert_eq!(view.permission, AccessKeyPermission::FullAccess);
}

#[test]
fn access_key_view_accepts_function_call_permission() {
    let view: AccessKeyView = serde_json::from_value(json!({
        "nonce": 3,
        "permission": {
            "FunctionCall": {
                "allowance": "250000000000000000000000",
                "receiver_id": "contract.test",
                "method_names": ["claim"]
            }
        }
    }))
    .unwrap();
    match view.permission {
        AccessKeyPermission::FunctionCall(fc) => {
            assert_eq!(fc.receiver_id, "contract.test");
            assert_eq!(fc.allowance, Some(250_000_000_000_000_000_000_000));
        }
        other => panic!("unexpected permission {:?}", other),
    }
}
