//! Field-level shape validation of untrusted relay envelopes.
//!
//! Runs on the raw JSON value before typed deserialization so that a caller
//! receives every offending field at once instead of the first serde error.

use std::sync::LazyLock;

use alloy_primitives::U256;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::FieldIssue;

static ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid regex"));
static UINT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("valid regex"));
static HEX_BYTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x(?:[0-9a-fA-F]{2})*$").expect("valid regex"));
static SIGNATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{130}$").expect("valid regex"));

/// Validates the shape of a relay envelope.
///
/// # Errors
///
/// Returns every offending field found.
pub fn validate(value: &Value) -> Result<(), Vec<FieldIssue>> {
    let mut issues = Vec::new();
    let Some(envelope) = value.as_object() else {
        return Err(vec![FieldIssue::new("body", "Expected a JSON object")]);
    };

    match envelope.get("request") {
        Some(Value::Object(request)) => validate_request(request, &mut issues),
        Some(_) => issues.push(FieldIssue::new("request", "Expected an object")),
        None => issues.push(FieldIssue::new("request", "Required")),
    }

    match envelope.get("chainId") {
        Some(Value::Number(n)) if n.as_u64().is_some_and(|id| id > 0) => {}
        Some(_) => issues.push(FieldIssue::new("chainId", "Expected a positive integer")),
        None => issues.push(FieldIssue::new("chainId", "Required")),
    }

    check_pattern(
        envelope,
        "forwarder",
        "forwarder",
        &ADDRESS,
        "Invalid forwarder address",
        &mut issues,
    );
    check_pattern(
        envelope,
        "signature",
        "signature",
        &SIGNATURE,
        "Invalid signature",
        &mut issues,
    );

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn validate_request(request: &Map<String, Value>, issues: &mut Vec<FieldIssue>) {
    check_pattern(
        request,
        "from",
        "request.from",
        &ADDRESS,
        "Invalid from address",
        issues,
    );
    check_pattern(
        request,
        "to",
        "request.to",
        &ADDRESS,
        "Invalid to address",
        issues,
    );
    for key in ["value", "gas", "nonce"] {
        check_uint(request, key, issues);
    }
    if check_uint(request, "deadline", issues) {
        let fits = request
            .get("deadline")
            .and_then(Value::as_str)
            .is_some_and(|s| s.parse::<u64>().is_ok());
        if !fits {
            issues.push(FieldIssue::new("request.deadline", "Deadline out of range"));
        }
    }
    check_pattern(
        request,
        "data",
        "request.data",
        &HEX_BYTES,
        "Invalid data",
        issues,
    );
}

/// Checks a decimal `uint256` string field; returns `true` if it passed.
fn check_uint(object: &Map<String, Value>, key: &str, issues: &mut Vec<FieldIssue>) -> bool {
    let path = format!("request.{key}");
    let passed = check_pattern(object, key, &path, &UINT, &format!("Invalid {key}"), issues);
    if passed {
        let overflows = object
            .get(key)
            .and_then(Value::as_str)
            .is_some_and(|s| U256::from_str_radix(s, 10).is_err());
        if overflows {
            issues.push(FieldIssue::new(path, format!("{key} exceeds uint256")));
            return false;
        }
    }
    passed
}

/// Checks that `object[key]` is a string matching `pattern`; returns `true` if it passed.
fn check_pattern(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
    pattern: &Regex,
    message: &str,
    issues: &mut Vec<FieldIssue>,
) -> bool {
    match object.get(key) {
        Some(Value::String(s)) if pattern.is_match(s) => true,
        Some(_) => {
            issues.push(FieldIssue::new(path, message));
            false
        }
        None => {
            issues.push(FieldIssue::new(path, "Required"));
            false
        }
    }
}
