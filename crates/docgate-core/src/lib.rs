//! Core logic for the gated single-document viewer.
//!
//! Everything here is DOM-free and native-testable: the session/auth state
//! machine, the capture-incident policy with its detector heuristics, the
//! watermark geometry, the error taxonomy, and tunable configuration. The
//! browser glue lives in the `docgate-wasm` app crate.

pub mod config;
pub mod error;
pub mod incident;
pub mod session;
pub mod watermark;

pub use config::{DeterrenceConfig, SessionConfig, ViewerConfig};
pub use error::{AuthError, FetchError};
pub use incident::{
    chrome_delta_exceeded, classify_chord, paste_types_contain_image, CaptureIncident,
    IncidentKind, IncidentLedger, KeyChord, VisibilityTracker,
};
pub use session::{
    validate_email, AttemptToken, AuthMethod, AuthPhase, Credential, Session, SessionController,
};
pub use watermark::{attribution_text, dated_text, tile_positions};
