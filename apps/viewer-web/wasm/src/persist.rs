//! Session markers in sessionStorage.
//!
//! Two string keys restore the UI across a reload without re-prompting the
//! user: the auth method and the matching identity. The bearer credential
//! is never written here, so an incident-triggered wipe cannot leak it.

use docgate_core::AuthMethod;
use wasm_bindgen::JsValue;
use web_sys::Storage;

const KEY_AUTH_METHOD: &str = "auth-method";
const KEY_IDENTITY: &str = "auth-identity";

fn session_storage() -> Result<Storage, JsValue> {
    web_sys::window()
        .ok_or_else(|| JsValue::from_str("No window"))?
        .session_storage()?
        .ok_or_else(|| JsValue::from_str("sessionStorage not available"))
}

/// Record the current method and identity.
pub fn remember(method: AuthMethod, identity: &str) -> Result<(), JsValue> {
    let storage = session_storage()?;
    storage.set_item(KEY_AUTH_METHOD, method.as_str())?;
    storage.set_item(KEY_IDENTITY, identity)?;
    Ok(())
}

/// Read back a previously persisted marker, if both keys are present and
/// the method marker parses.
pub fn recall() -> Option<(AuthMethod, String)> {
    let storage = session_storage().ok()?;
    let method = storage.get_item(KEY_AUTH_METHOD).ok()??;
    let identity = storage.get_item(KEY_IDENTITY).ok()??;
    let method = AuthMethod::parse(&method)?;
    if identity.is_empty() {
        return None;
    }
    Some((method, identity))
}

/// Drop the markers (logout, failed restore).
pub fn forget() -> Result<(), JsValue> {
    let storage = session_storage()?;
    storage.remove_item(KEY_AUTH_METHOD)?;
    storage.remove_item(KEY_IDENTITY)?;
    Ok(())
}

/// Wipe everything session-scoped. Used by the incident teardown.
pub fn clear_all() -> Result<(), JsValue> {
    session_storage()?.clear()
}

// sessionStorage requires a browser; exercised via wasm-bindgen-test.
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_remember_recall_forget() {
        remember(AuthMethod::Email, "user@allowed.com").unwrap();
        assert_eq!(
            recall(),
            Some((AuthMethod::Email, "user@allowed.com".to_string()))
        );

        forget().unwrap();
        assert_eq!(recall(), None);
    }

    #[wasm_bindgen_test]
    fn test_clear_all_wipes_markers() {
        remember(AuthMethod::Wallet, "0xabc").unwrap();
        clear_all().unwrap();
        assert_eq!(recall(), None);
    }
}
