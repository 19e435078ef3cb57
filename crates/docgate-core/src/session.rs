//! Session state machine for the gated viewer.
//!
//! `Session` is the single authoritative identity state for the page's
//! lifetime. It is mutated only through `SessionController`; every other
//! component reads it.
//!
//! Valid transitions:
//! `Unauthenticated -> (AwaitingEmailLink | AwaitingWalletApproval)
//!  -> Authenticated -> Unauthenticated` (logout or incident teardown).
//! A login attempt while already authenticated implicitly logs out first,
//! so the two methods are mutually exclusive by construction.

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// How the current identity was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    None,
    Email,
    Wallet,
}

impl AuthMethod {
    /// Marker string used for the persisted session hint and the document
    /// request body (`authType` field).
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Email => "email",
            AuthMethod::Wallet => "wallet",
        }
    }

    pub fn parse(s: &str) -> Option<AuthMethod> {
        match s {
            "email" => Some(AuthMethod::Email),
            "wallet" => Some(AuthMethod::Wallet),
            _ => None,
        }
    }
}

/// Proof of identity presented to the document fetch collaborator.
/// Opaque to this crate: either a bearer token from the identity provider
/// or the connected wallet address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer(String),
    Wallet(String),
}

/// The page-wide authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    auth_method: AuthMethod,
    identity: Option<String>,
    credential: Option<Credential>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            auth_method: AuthMethod::None,
            identity: None,
            credential: None,
        }
    }
}

impl Session {
    pub fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    /// Email address or wallet address; never both.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_method != AuthMethod::None && self.identity.is_some()
    }
}

/// Where the controller is within a login flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unauthenticated,
    AwaitingEmailLink,
    AwaitingWalletApproval,
    Authenticated,
}

/// Handle for one in-flight login attempt. Completions carrying a token
/// from a superseded attempt are rejected as stale, so a logout or a new
/// login racing an old provider call never applies the old result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptToken {
    epoch: u64,
}

/// Owns the `Session` and enforces the transition rules.
#[derive(Debug, Default)]
pub struct SessionController {
    session: Session,
    phase: AuthPhase,
    epoch: u64,
}

impl Default for AuthPhase {
    fn default() -> Self {
        AuthPhase::Unauthenticated
    }
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    /// Guard for protected actions.
    pub fn require_authenticated(&self) -> Result<&Session, AuthError> {
        if self.session.is_authenticated() {
            Ok(&self.session)
        } else {
            Err(AuthError::NotAuthenticated)
        }
    }

    /// Start an email-link login. Any previous identity (either method) is
    /// cleared before the attempt begins.
    pub fn begin_email_login(&mut self, email: &str) -> Result<AttemptToken, AuthError> {
        validate_email(email)?;
        let token = self.supersede();
        self.phase = AuthPhase::AwaitingEmailLink;
        Ok(token)
    }

    /// Start a wallet connection flow.
    pub fn begin_wallet_connect(&mut self) -> AttemptToken {
        let token = self.supersede();
        self.phase = AuthPhase::AwaitingWalletApproval;
        token
    }

    /// Apply a successful email login. The bearer credential proves the
    /// identity to the document fetch collaborator.
    pub fn complete_email_login(
        &mut self,
        token: AttemptToken,
        email: &str,
        bearer: String,
    ) -> Result<(), AuthError> {
        self.check_current(token)?;
        self.session = Session {
            auth_method: AuthMethod::Email,
            identity: Some(email.to_string()),
            credential: Some(Credential::Bearer(bearer)),
        };
        self.phase = AuthPhase::Authenticated;
        Ok(())
    }

    /// Apply a successful wallet connection. The address doubles as the
    /// credential for document fetches.
    pub fn complete_wallet_connect(
        &mut self,
        token: AttemptToken,
        address: &str,
    ) -> Result<(), AuthError> {
        self.check_current(token)?;
        self.session = Session {
            auth_method: AuthMethod::Wallet,
            identity: Some(address.to_string()),
            credential: Some(Credential::Wallet(address.to_string())),
        };
        self.phase = AuthPhase::Authenticated;
        Ok(())
    }

    /// Abandon an in-flight attempt (denied authorization or provider
    /// failure). The session is left exactly as it was: empty.
    pub fn fail_attempt(&mut self, token: AttemptToken) {
        if token.epoch == self.epoch {
            self.phase = AuthPhase::Unauthenticated;
        }
    }

    /// Unconditionally return to the empty state. External teardown
    /// (provider logout, wallet disconnect) is the caller's business.
    pub fn logout(&mut self) {
        self.epoch += 1;
        self.session = Session::default();
        self.phase = AuthPhase::Unauthenticated;
    }

    /// Repopulate from a still-valid provider session on page load.
    /// Only meaningful while unauthenticated; a restore racing a user-driven
    /// login is dropped.
    pub fn restore_email(&mut self, email: &str, bearer: String) -> Result<(), AuthError> {
        if self.phase != AuthPhase::Unauthenticated {
            return Err(AuthError::StaleAttempt);
        }
        let token = self.begin_email_login(email)?;
        self.complete_email_login(token, email, bearer)
    }

    pub fn restore_wallet(&mut self, address: &str) -> Result<(), AuthError> {
        if self.phase != AuthPhase::Unauthenticated {
            return Err(AuthError::StaleAttempt);
        }
        let token = self.begin_wallet_connect();
        self.complete_wallet_connect(token, address)
    }

    /// Clear current state and invalidate all outstanding attempt tokens.
    fn supersede(&mut self) -> AttemptToken {
        self.epoch += 1;
        self.session = Session::default();
        AttemptToken { epoch: self.epoch }
    }

    fn check_current(&self, token: AttemptToken) -> Result<(), AuthError> {
        if token.epoch == self.epoch {
            Ok(())
        } else {
            Err(AuthError::StaleAttempt)
        }
    }
}

/// Minimal well-formedness check before the allow-list lookup: non-empty,
/// exactly one `@`, non-empty local part, dotted domain.
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::InvalidEmail("empty address".to_string()));
    }
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None)
            if !local.is_empty() && domain.contains('.') && !domain.starts_with('.') =>
        {
            Ok(())
        }
        _ => Err(AuthError::InvalidEmail(email.to_string())),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Driver events for exercising arbitrary interleavings.
    #[derive(Debug, Clone)]
    enum Step {
        EmailLogin(String),
        WalletConnect(String),
        FailCurrent,
        Logout,
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            "[a-z]{1,8}@[a-z]{1,8}\\.com".prop_map(Step::EmailLogin),
            "0x[0-9a-f]{6,40}".prop_map(Step::WalletConnect),
            Just(Step::FailCurrent),
            Just(Step::Logout),
        ]
    }

    proptest! {
        /// Mutual exclusivity holds under any interleaving: the identity
        /// always matches the method that set it, and only one is ever set.
        #[test]
        fn session_identity_always_matches_method(steps in prop::collection::vec(step_strategy(), 1..24)) {
            let mut c = SessionController::new();
            let mut pending = None;

            for step in steps {
                match step {
                    Step::EmailLogin(email) => {
                        let token = c.begin_email_login(&email).unwrap();
                        c.complete_email_login(token, &email, "tok".to_string()).unwrap();
                        pending = None;
                    }
                    Step::WalletConnect(addr) => {
                        let token = c.begin_wallet_connect();
                        pending = Some((token, addr));
                    }
                    Step::FailCurrent => {
                        if let Some((token, _)) = pending.take() {
                            c.fail_attempt(token);
                        }
                    }
                    Step::Logout => {
                        c.logout();
                        pending = None;
                    }
                }

                let s = c.session();
                match s.auth_method() {
                    AuthMethod::None => {
                        prop_assert!(s.identity().is_none());
                        prop_assert!(s.credential().is_none());
                        prop_assert!(!s.is_authenticated());
                    }
                    AuthMethod::Email => {
                        prop_assert!(s.identity().is_some());
                        prop_assert!(matches!(s.credential(), Some(Credential::Bearer(_))));
                    }
                    AuthMethod::Wallet => {
                        let addr = s.identity().unwrap();
                        prop_assert_eq!(s.credential(), Some(&Credential::Wallet(addr.to_string())));
                    }
                }
            }
        }

        /// Logout is a total reset regardless of what came before.
        #[test]
        fn logout_always_restores_empty_session(email in "[a-z]{1,8}@[a-z]{1,8}\\.com") {
            let mut c = SessionController::new();
            let token = c.begin_email_login(&email).unwrap();
            c.complete_email_login(token, &email, "tok".to_string()).unwrap();
            c.logout();
            prop_assert_eq!(c.session(), &Session::default());
        }
    }
}
