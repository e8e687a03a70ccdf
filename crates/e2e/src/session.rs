//! Client-side session storage contract
//!
//! After login the application stores `{ state: { user: { authToken } } }`
//! under the session key. The logout check reads a differently named entry
//! shaped `{ user: { authToken } }`. The two checks stay independent until
//! the application's storage contract is confirmed.

use serde_json::Value;

use crate::error::{E2eError, E2eResult};

/// JavaScript truthiness of a JSON value
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Present and not `null`
fn defined<'v>(value: &'v Value, field: &str) -> Option<&'v Value> {
    value.get(field).filter(|v| !v.is_null())
}

/// Parse the raw session entry and require a truthy `state.user.authToken`
pub fn require_auth_token(key: &str, raw: Option<&str>) -> E2eResult<()> {
    let raw = raw.ok_or_else(|| {
        E2eError::AssertionFailed(format!("expected localStorage[{:?}] to be set, found null", key))
    })?;

    let parsed: Value = serde_json::from_str(raw)?;

    let state = defined(&parsed, "state").ok_or_else(|| {
        E2eError::AssertionFailed(format!("localStorage[{:?}] has no `state`", key))
    })?;
    let user = defined(state, "user").ok_or_else(|| {
        E2eError::AssertionFailed(format!("localStorage[{:?}] has no `state.user`", key))
    })?;

    match user.get("authToken") {
        Some(token) if is_truthy(token) => Ok(()),
        Some(token) => Err(E2eError::AssertionFailed(format!(
            "expected localStorage[{:?}].state.user.authToken to be truthy, found {}",
            key, token
        ))),
        None => Err(E2eError::AssertionFailed(format!(
            "localStorage[{:?}] has no `state.user.authToken`",
            key
        ))),
    }
}

/// Accept a missing entry, otherwise require `user.authToken` to be absent.
///
/// An empty entry or a stored `null` is neither missing nor a session and fails.
pub fn require_no_auth_token(key: &str, raw: Option<&str>) -> E2eResult<()> {
    let Some(raw) = raw else {
        return Ok(());
    };
    if raw.is_empty() {
        return Err(E2eError::AssertionFailed(format!(
            "expected localStorage[{:?}] to be null, found \"\"",
            key
        )));
    }

    let parsed: Value = serde_json::from_str(raw)?;
    if parsed.is_null() {
        return Err(E2eError::AssertionFailed(format!(
            "localStorage[{:?}] holds `null`, cannot read `user`",
            key
        )));
    }

    match parsed.get("user").and_then(|user| user.get("authToken")) {
        Some(token) => Err(E2eError::AssertionFailed(format!(
            "expected localStorage[{:?}].user.authToken to be undefined, found {}",
            key, token
        ))),
        None => Ok(()),
    }
}
