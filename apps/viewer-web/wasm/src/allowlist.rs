//! Allow-list client.
//!
//! Authorization lives in an external spreadsheet-backed service exposed as
//! two JSON endpoints. Identities are compared case-insensitively. Any
//! transport or decode failure is treated as "not authorized"; the gate
//! never fails open.

use serde::Deserialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{console, Request, RequestInit, RequestMode, Response};

#[derive(Debug, Deserialize)]
struct EmailList {
    emails: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WalletList {
    wallets: Vec<String>,
}

/// Client for the authorization lookup, `is_authorized(identity) -> bool`.
pub struct Allowlist {
    api_base: String,
}

impl Allowlist {
    pub fn new(api_base: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Check an email against the allow-list.
    pub async fn is_authorized_email(&self, email: &str) -> bool {
        let url = format!("{}/get-authorized-emails", self.api_base);
        match self.fetch_text(&url).await {
            Ok(body) => match serde_json::from_str::<EmailList>(&body) {
                Ok(list) => contains_ignore_case(&list.emails, email),
                Err(e) => {
                    console::error_1(&format!("Unexpected allow-list payload: {}", e).into());
                    false
                }
            },
            Err(e) => {
                console::error_1(&e);
                false
            }
        }
    }

    /// Check a wallet address against the allow-list.
    pub async fn is_authorized_wallet(&self, address: &str) -> bool {
        let url = format!("{}/get-authorized-wallets", self.api_base);
        match self.fetch_text(&url).await {
            Ok(body) => match serde_json::from_str::<WalletList>(&body) {
                Ok(list) => contains_ignore_case(&list.wallets, address),
                Err(e) => {
                    console::error_1(&format!("Unexpected allow-list payload: {}", e).into());
                    false
                }
            },
            Err(e) => {
                console::error_1(&e);
                false
            }
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String, JsValue> {
        let window = web_sys::window().ok_or("No window")?;

        let opts = RequestInit::new();
        opts.set_method("GET");
        opts.set_mode(RequestMode::Cors);

        let request = Request::new_with_str_and_init(url, &opts)?;
        let response = JsFuture::from(window.fetch_with_request(&request)).await?;
        let response: Response = response.dyn_into()?;

        if !response.ok() {
            return Err(JsValue::from_str(&format!(
                "Allow-list lookup failed: HTTP {}",
                response.status()
            )));
        }

        let text = JsFuture::from(response.text()?).await?;
        text.as_string()
            .ok_or_else(|| JsValue::from_str("Allow-list response was not text"))
    }
}

fn contains_ignore_case(list: &[String], identity: &str) -> bool {
    let needle = identity.to_lowercase();
    list.iter().any(|entry| entry.to_lowercase() == needle)
}
