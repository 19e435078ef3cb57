//! Browser-side gated document viewer.
//!
//! Compiled to wasm and driven from a thin JS shell. The crate owns session
//! state, allow-list authorization, document fetch and render, and the
//! capture-deterrence monitor; provider SDKs (Magic, the injected wallet,
//! pdf.js) are reached through small JS bridge modules under `www/js/`.

pub mod allowlist;
pub mod auth;
pub mod inventory;
pub mod monitor;
pub mod persist;
pub mod viewer;

pub use allowlist::Allowlist;
pub use auth::AuthController;
pub use inventory::PageInventory;
pub use monitor::DeterrenceMonitor;
pub use viewer::{init_pdf_js, DocumentSurface};
