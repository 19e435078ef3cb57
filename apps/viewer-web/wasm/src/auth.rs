//! Session/auth controller: mediates the passwordless email flow and the
//! wallet connect flow, gates protected actions, and restores sessions on
//! page load with a bounded probe.
//!
//! All `Session` mutation goes through the `SessionController` owned here;
//! the render surface only reads it. Provider SDKs are reached through thin
//! JS bridges so the rest of the system sees one abstract interface per
//! provider instead of duck-typed globals.

use std::cell::RefCell;
use std::rc::Rc;

use docgate_core::{AuthError, AuthMethod, SessionConfig, SessionController};
use js_sys::{Array, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::console;

use crate::allowlist::Allowlist;
use crate::persist;
use crate::viewer::DocumentSurface;

// Identity-provider bridge (Magic-style passwordless email link).
#[wasm_bindgen(module = "/www/js/magic-bridge.js")]
extern "C" {
    #[wasm_bindgen(js_name = initMagic)]
    fn init_magic(public_key: &str) -> js_sys::Promise;

    /// Resolves to a DID bearer token once the user completes the
    /// out-of-band email-link step. May take arbitrarily long.
    #[wasm_bindgen(js_name = magicLoginWithEmail)]
    fn magic_login_with_email(email: &str) -> js_sys::Promise;

    #[wasm_bindgen(js_name = magicIsLoggedIn)]
    fn magic_is_logged_in() -> js_sys::Promise;

    #[wasm_bindgen(js_name = magicUserEmail)]
    fn magic_user_email() -> js_sys::Promise;

    #[wasm_bindgen(js_name = magicIdToken)]
    fn magic_id_token() -> js_sys::Promise;

    #[wasm_bindgen(js_name = magicLogout)]
    fn magic_logout() -> js_sys::Promise;
}

// Wallet-provider bridge (EIP-1193 style).
#[wasm_bindgen(module = "/www/js/wallet-bridge.js")]
extern "C" {
    /// Resolves to `{ address, chainId }` after the user approves the
    /// connection in the wallet extension.
    #[wasm_bindgen(js_name = walletConnect)]
    fn wallet_connect() -> js_sys::Promise;

    /// Resolves to the already-approved account list without prompting.
    #[wasm_bindgen(js_name = walletAccounts)]
    fn wallet_accounts() -> js_sys::Promise;

    #[wasm_bindgen(js_name = walletDisconnect)]
    fn wallet_disconnect() -> js_sys::Promise;

    #[wasm_bindgen(js_name = onWalletAccountsChanged)]
    fn on_wallet_accounts_changed(callback: &js_sys::Function);

    #[wasm_bindgen(js_name = onWalletDisconnect)]
    fn on_wallet_disconnect(callback: &js_sys::Function);

    #[wasm_bindgen(js_name = onWalletChainChanged)]
    fn on_wallet_chain_changed(callback: &js_sys::Function);
}

pub(crate) fn to_js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Milliseconds left before `deadline_ms`, if at least one remains.
fn remaining_budget_ms(deadline_ms: f64, now_ms: f64) -> Option<i32> {
    let left = deadline_ms - now_ms;
    if left >= 1.0 {
        Some(left.min(f64::from(i32::MAX)) as i32)
    } else {
        None
    }
}

/// Reject after `ms`, for racing against provider probes that may hang.
fn timeout_promise(ms: i32) -> js_sys::Promise {
    js_sys::Promise::new(&mut |_resolve, reject| {
        let on_expiry = Closure::once_into_js(move || {
            let _ = reject.call1(&JsValue::NULL, &JsValue::from_str("Provider check timed out"));
        });
        if let Some(window) = web_sys::window() {
            let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(
                on_expiry.unchecked_ref(),
                ms,
            );
        }
    })
}

async fn bounded(probe: js_sys::Promise, ms: i32) -> Result<JsValue, JsValue> {
    let race = js_sys::Promise::race(&Array::of2(&probe, &timeout_promise(ms)));
    JsFuture::from(race).await
}

/// Race a probe against whatever is left of a shared deadline, so a chain
/// of probes cannot stack individual timeouts.
async fn bounded_until(probe: js_sys::Promise, deadline_ms: f64) -> Result<JsValue, JsValue> {
    match remaining_budget_ms(deadline_ms, js_sys::Date::now()) {
        Some(ms) => bounded(probe, ms).await,
        None => Err(JsValue::from_str("Restore budget exhausted")),
    }
}

/// Owns the page's `Session` and the two login flows.
#[wasm_bindgen]
pub struct AuthController {
    controller: Rc<RefCell<SessionController>>,
    allowlist: Rc<Allowlist>,
    config: SessionConfig,
    api_base: String,
}

#[wasm_bindgen]
impl AuthController {
    #[wasm_bindgen(constructor)]
    pub fn new(api_base: &str) -> Self {
        console_error_panic_hook::set_once();
        Self {
            controller: Rc::new(RefCell::new(SessionController::new())),
            allowlist: Rc::new(Allowlist::new(api_base)),
            config: SessionConfig::default(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Initialize the identity-provider SDK. Must run before the email flow.
    pub async fn init_provider(&self, magic_public_key: &str) -> Result<(), JsValue> {
        JsFuture::from(init_magic(magic_public_key)).await?;
        Ok(())
    }

    /// Passwordless email-link login. Suspends until the user completes the
    /// out-of-band step; never globally timed out.
    pub async fn login_with_email(&self, email: &str) -> Result<(), JsValue> {
        let attempt = self
            .controller
            .borrow_mut()
            .begin_email_login(email)
            .map_err(to_js_error)?;

        if !self.allowlist.is_authorized_email(email).await {
            self.controller.borrow_mut().fail_attempt(attempt);
            return Err(to_js_error(AuthError::AuthorizationDenied));
        }

        let bearer = match JsFuture::from(magic_login_with_email(email)).await {
            Ok(token) => match token.as_string().filter(|t| !t.is_empty()) {
                Some(t) => t,
                None => {
                    self.controller.borrow_mut().fail_attempt(attempt);
                    return Err(to_js_error(AuthError::Provider(
                        "login did not yield a token".to_string(),
                    )));
                }
            },
            Err(e) => {
                self.controller.borrow_mut().fail_attempt(attempt);
                console::error_1(&e);
                return Err(to_js_error(AuthError::Provider(
                    "email login failed".to_string(),
                )));
            }
        };

        match self
            .controller
            .borrow_mut()
            .complete_email_login(attempt, email, bearer)
        {
            Ok(()) => {
                if let Err(e) = persist::remember(AuthMethod::Email, email) {
                    console::warn_1(&e);
                }
                Ok(())
            }
            // A newer attempt or a logout superseded this flow while the
            // user was in their inbox; drop the result.
            Err(AuthError::StaleAttempt) => {
                console::warn_1(&"Ignoring stale email login result".into());
                Ok(())
            }
            Err(e) => Err(to_js_error(e)),
        }
    }

    /// Wallet connect flow. Suspends while the user approves in the
    /// extension; the address is checked against the allow-list before the
    /// session is established.
    pub async fn connect_wallet(&self) -> Result<(), JsValue> {
        let attempt = self.controller.borrow_mut().begin_wallet_connect();

        let address = match JsFuture::from(wallet_connect()).await {
            Ok(account) => match Reflect::get(&account, &"address".into())
                .ok()
                .and_then(|a| a.as_string())
                .filter(|a| !a.is_empty())
            {
                Some(addr) => addr,
                None => {
                    self.controller.borrow_mut().fail_attempt(attempt);
                    return Err(to_js_error(AuthError::Provider(
                        "wallet connect did not yield an address".to_string(),
                    )));
                }
            },
            Err(e) => {
                self.controller.borrow_mut().fail_attempt(attempt);
                console::error_1(&e);
                return Err(to_js_error(AuthError::Provider(
                    "wallet connect failed".to_string(),
                )));
            }
        };

        if !self.allowlist.is_authorized_wallet(&address).await {
            // Undo the provider-side connection before reporting the denial.
            if let Err(e) = JsFuture::from(wallet_disconnect()).await {
                console::warn_1(&e);
            }
            self.controller.borrow_mut().fail_attempt(attempt);
            return Err(to_js_error(AuthError::AuthorizationDenied));
        }

        match self
            .controller
            .borrow_mut()
            .complete_wallet_connect(attempt, &address)
        {
            Ok(()) => {
                if let Err(e) = persist::remember(AuthMethod::Wallet, &address) {
                    console::warn_1(&e);
                }
                Ok(())
            }
            Err(AuthError::StaleAttempt) => {
                console::warn_1(&"Ignoring stale wallet connect result".into());
                Ok(())
            }
            Err(e) => Err(to_js_error(e)),
        }
    }

    /// Best-effort provider teardown, then an unconditional reset to the
    /// empty session. Teardown failures are logged, never propagated.
    pub async fn logout(&self) {
        let method = self.controller.borrow().session().auth_method();
        let teardown = match method {
            AuthMethod::Email => Some(magic_logout()),
            AuthMethod::Wallet => Some(wallet_disconnect()),
            AuthMethod::None => None,
        };
        if let Some(promise) = teardown {
            if let Err(e) = JsFuture::from(promise).await {
                console::warn_1(&e);
            }
        }

        self.controller.borrow_mut().logout();
        if let Err(e) = persist::forget() {
            console::warn_1(&e);
        }
    }

    /// Silent session restore on page load. The whole restore shares one
    /// configured budget, however many provider probes it takes; a hung
    /// check falls back to the unauthenticated state and leaves the login
    /// UI usable.
    pub async fn restore_session(&self) -> bool {
        let deadline = js_sys::Date::now() + f64::from(self.config.restore_timeout_ms);

        // The persisted marker says which provider the previous page used;
        // probe that one first.
        let wallet_first = matches!(persist::recall(), Some((AuthMethod::Wallet, _)));
        let restored = if wallet_first {
            self.restore_wallet_session(deadline).await
                || self.restore_email_session(deadline).await
        } else {
            self.restore_email_session(deadline).await
                || self.restore_wallet_session(deadline).await
        };
        if restored {
            return true;
        }

        // Nothing restorable: drop any stale markers from a previous page.
        if let Err(e) = persist::forget() {
            console::warn_1(&e);
        }
        false
    }

    async fn restore_wallet_session(&self, deadline: f64) -> bool {
        match bounded_until(wallet_accounts(), deadline).await {
            Ok(accounts) => {
                let accounts = Array::from(&accounts);
                let Some(address) = accounts.get(0).as_string().filter(|a| !a.is_empty()) else {
                    return false;
                };
                if self
                    .controller
                    .borrow_mut()
                    .restore_wallet(&address)
                    .is_ok()
                {
                    if let Err(e) = persist::remember(AuthMethod::Wallet, &address) {
                        console::warn_1(&e);
                    }
                    return true;
                }
                false
            }
            Err(e) => {
                console::warn_1(&e);
                false
            }
        }
    }

    async fn restore_email_session(&self, deadline: f64) -> bool {
        match bounded_until(magic_is_logged_in(), deadline).await {
            Ok(logged_in) if logged_in.as_bool() == Some(true) => {}
            Ok(_) => return false,
            Err(e) => {
                console::warn_1(&e);
                return false;
            }
        }
        let email = match bounded_until(magic_user_email(), deadline).await {
            Ok(v) => match v.as_string().filter(|e| !e.is_empty()) {
                Some(e) => e,
                None => return false,
            },
            Err(e) => {
                console::warn_1(&e);
                return false;
            }
        };
        let bearer = match bounded_until(magic_id_token(), deadline).await {
            Ok(v) => match v.as_string().filter(|t| !t.is_empty()) {
                Some(t) => t,
                None => return false,
            },
            Err(e) => {
                console::warn_1(&e);
                return false;
            }
        };

        if self
            .controller
            .borrow_mut()
            .restore_email(&email, bearer)
            .is_ok()
        {
            if let Err(e) = persist::remember(AuthMethod::Email, &email) {
                console::warn_1(&e);
            }
            true
        } else {
            false
        }
    }

    /// React to wallet-side account switches, disconnects, and network
    /// changes for the rest of the page's lifetime. Wallet events only
    /// govern wallet sessions; an email session is untouched by them.
    pub fn watch_wallet_events(&self) {
        let controller = Rc::clone(&self.controller);
        let allowlist = Rc::clone(&self.allowlist);
        let on_change = Closure::<dyn FnMut(JsValue)>::new(move |accounts: JsValue| {
            apply_wallet_accounts_change(&controller, &allowlist, &Array::from(&accounts));
        });
        on_wallet_accounts_changed(on_change.as_ref().unchecked_ref());
        on_change.forget();

        let controller = Rc::clone(&self.controller);
        let on_disconnect = Closure::<dyn FnMut()>::new(move || {
            clear_wallet_session(&controller);
        });
        on_wallet_disconnect(on_disconnect.as_ref().unchecked_ref());
        on_disconnect.forget();

        // The session is chain-agnostic; a network switch is only logged.
        let on_chain = Closure::<dyn FnMut(JsValue)>::new(move |chain_id: JsValue| {
            console::log_2(&"Wallet network changed:".into(), &chain_id);
        });
        on_wallet_chain_changed(on_chain.as_ref().unchecked_ref());
        on_chain.forget();
    }

    /// Build the render surface sharing this controller's session,
    /// read-only.
    pub fn create_surface(&self, container_id: &str) -> Result<DocumentSurface, JsValue> {
        DocumentSurface::attach(Rc::clone(&self.controller), container_id, &self.api_base)
    }

    #[wasm_bindgen(getter)]
    pub fn is_authenticated(&self) -> bool {
        self.controller.borrow().session().is_authenticated()
    }

    #[wasm_bindgen(getter)]
    pub fn identity(&self) -> Option<String> {
        self.controller
            .borrow()
            .session()
            .identity()
            .map(str::to_string)
    }

    #[wasm_bindgen(getter)]
    pub fn auth_method(&self) -> String {
        self.controller
            .borrow()
            .session()
            .auth_method()
            .as_str()
            .to_string()
    }
}

/// Apply an `accountsChanged` notification. No-op unless the current
/// session was established through the wallet; an email session never
/// follows wallet-side state.
fn apply_wallet_accounts_change(
    controller: &Rc<RefCell<SessionController>>,
    allowlist: &Rc<Allowlist>,
    accounts: &Array,
) {
    if controller.borrow().session().auth_method() != AuthMethod::Wallet {
        return;
    }

    match accounts.get(0).as_string().filter(|a| !a.is_empty()) {
        None => {
            // User disconnected every account in the wallet UI.
            clear_wallet_session(controller);
        }
        Some(address) => {
            let current = controller
                .borrow()
                .session()
                .identity()
                .map(str::to_string);
            if current.as_deref() == Some(address.as_str()) {
                return;
            }
            // A different account must pass the allow-list again.
            let controller = Rc::clone(controller);
            let allowlist = Rc::clone(allowlist);
            spawn_local(async move {
                controller.borrow_mut().logout();
                if allowlist.is_authorized_wallet(&address).await {
                    if controller.borrow_mut().restore_wallet(&address).is_ok() {
                        if let Err(e) = persist::remember(AuthMethod::Wallet, &address) {
                            console::warn_1(&e);
                        }
                        return;
                    }
                }
                if let Err(e) = persist::forget() {
                    console::warn_1(&e);
                }
            });
        }
    }
}

/// Drop a wallet-backed session after a provider-side disconnect. Other
/// session kinds are left alone.
fn clear_wallet_session(controller: &Rc<RefCell<SessionController>>) {
    if controller.borrow().session().auth_method() != AuthMethod::Wallet {
        return;
    }
    controller.borrow_mut().logout();
    if let Err(e) = persist::forget() {
        console::warn_1(&e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_budget_counts_down() {
        assert_eq!(remaining_budget_ms(5000.0, 0.0), Some(5000));
        assert_eq!(remaining_budget_ms(5000.0, 4200.0), Some(800));
    }

    #[test]
    fn test_exhausted_budget_yields_none() {
        assert_eq!(remaining_budget_ms(5000.0, 5000.0), None);
        assert_eq!(remaining_budget_ms(5000.0, 6000.0), None);
        // Sub-millisecond remainders are not worth a timer.
        assert_eq!(remaining_budget_ms(5000.0, 4999.5), None);
    }
}
