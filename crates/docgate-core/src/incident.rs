//! Capture-incident policy and detector heuristics, kept DOM-free so the
//! zero-tolerance semantics are testable off the browser.
//!
//! Detectors in the wasm layer feed observations into these types; the
//! ledger decides whether a raise is the terminal one. Only the first
//! incident of the process lifetime has effect.

use serde::{Deserialize, Serialize};

/// What kind of violation a detector observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentKind {
    PrintAttempt,
    ScreenshotKey,
    ClipboardCopy,
    ClipboardImagePaste,
    VisibilityHeuristic,
    InspectionHeuristic,
}

impl IncidentKind {
    /// One-line description for the security notice.
    pub fn notice(&self) -> &'static str {
        match self {
            IncidentKind::PrintAttempt => "A print attempt was detected.",
            IncidentKind::ScreenshotKey => "A screen-capture shortcut was detected.",
            IncidentKind::ClipboardCopy => "A copy attempt was detected.",
            IncidentKind::ClipboardImagePaste => "A captured image was detected on the clipboard.",
            IncidentKind::VisibilityHeuristic => "A switch to an external capture tool was detected.",
            IncidentKind::InspectionHeuristic => "An inspection panel was detected.",
        }
    }
}

/// One detected violation, consumed immediately by the response procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureIncident {
    pub kind: IncidentKind,
    pub timestamp_ms: f64,
    pub attempt: u32,
}

/// Process-lifetime incident counter with the single-strike policy.
///
/// `record` returns `Some` exactly when the response procedure must run;
/// once tripped, every further raise is a no-op. Nothing short of a full
/// page reload forgives an incident.
#[derive(Debug)]
pub struct IncidentLedger {
    attempts: u32,
    tripped: bool,
    max_attempts: u32,
}

impl IncidentLedger {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            tripped: false,
            // A zero budget would make the ledger untrippable.
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn record(&mut self, kind: IncidentKind, now_ms: f64) -> Option<CaptureIncident> {
        self.attempts += 1;
        if self.tripped {
            return None;
        }
        if self.attempts >= self.max_attempts {
            self.tripped = true;
            return Some(CaptureIncident {
                kind,
                timestamp_ms: now_ms,
                attempt: self.attempts,
            });
        }
        None
    }

    pub fn tripped(&self) -> bool {
        self.tripped
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Tab-visibility heuristic: a hidden-to-visible round trip faster than the
/// threshold suggests alt-tabbing out to a capture tool.
#[derive(Debug)]
pub struct VisibilityTracker {
    hidden_at_ms: Option<f64>,
    threshold_ms: f64,
}

impl VisibilityTracker {
    pub fn new(threshold_ms: f64) -> Self {
        Self {
            hidden_at_ms: None,
            threshold_ms,
        }
    }

    pub fn page_hidden(&mut self, now_ms: f64) {
        self.hidden_at_ms = Some(now_ms);
    }

    /// Returns true when the page came back suspiciously fast. A hidden
    /// duration at or above the threshold raises nothing.
    pub fn page_visible(&mut self, now_ms: f64) -> bool {
        match self.hidden_at_ms.take() {
            Some(hidden_at) => now_ms - hidden_at < self.threshold_ms,
            None => false,
        }
    }
}

/// A normalized key press, as read off a keyboard event.
#[derive(Debug, Clone)]
pub struct KeyChord {
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

impl KeyChord {
    pub fn new(key: &str, ctrl: bool, meta: bool, shift: bool) -> Self {
        Self {
            key: key.to_string(),
            ctrl,
            meta,
            shift,
        }
    }
}

/// Match a chord against the known screenshot / dev-tool combinations:
/// the dedicated PrintScreen key, modifier+P, modifier+shift+I/C, and the
/// macOS capture chords meta+shift+3/4.
pub fn classify_chord(chord: &KeyChord) -> Option<IncidentKind> {
    let key = chord.key.to_ascii_lowercase();
    let modifier = chord.ctrl || chord.meta;

    if key == "printscreen" {
        return Some(IncidentKind::ScreenshotKey);
    }
    if modifier && !chord.shift && key == "p" {
        return Some(IncidentKind::ScreenshotKey);
    }
    if modifier && chord.shift && (key == "i" || key == "c") {
        return Some(IncidentKind::ScreenshotKey);
    }
    if chord.meta && chord.shift && (key == "3" || key == "4") {
        return Some(IncidentKind::ScreenshotKey);
    }
    None
}

/// Window-chrome heuristic: a large outer-vs-inner delta on either axis
/// suggests a docked inspection panel.
pub fn chrome_delta_exceeded(
    outer_width: i32,
    inner_width: i32,
    outer_height: i32,
    inner_height: i32,
    threshold_px: i32,
) -> bool {
    outer_width - inner_width > threshold_px || outer_height - inner_height > threshold_px
}

/// Clipboard paste heuristic: any file or image MIME among the payload
/// types indicates a screenshot-then-paste workflow.
pub fn paste_types_contain_image<S: AsRef<str>>(types: &[S]) -> bool {
    types.iter().any(|t| {
        let t = t.as_ref();
        t == "Files" || t.starts_with("image/")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_incident_is_terminal() {
        let mut ledger = IncidentLedger::new(1);
        assert!(!ledger.tripped());

        let incident = ledger.record(IncidentKind::ScreenshotKey, 10.0);
        let incident = incident.expect("first incident must trip the ledger");
        assert_eq!(incident.kind, IncidentKind::ScreenshotKey);
        assert_eq!(incident.attempt, 1);
        assert!(ledger.tripped());
    }

    #[test]
    fn test_response_runs_exactly_once_under_burst() {
        // Overlapping detectors firing in the same tick: only the first
        // raise yields an incident.
        let mut ledger = IncidentLedger::new(1);
        let mut responses = 0;
        for kind in [
            IncidentKind::ScreenshotKey,
            IncidentKind::VisibilityHeuristic,
            IncidentKind::PrintAttempt,
            IncidentKind::ClipboardCopy,
            IncidentKind::ClipboardCopy,
        ] {
            if ledger.record(kind, 0.0).is_some() {
                responses += 1;
            }
        }
        assert_eq!(responses, 1);
        assert_eq!(ledger.attempts(), 5);
    }

    #[test]
    fn test_zero_budget_is_clamped() {
        let mut ledger = IncidentLedger::new(0);
        assert!(ledger.record(IncidentKind::PrintAttempt, 0.0).is_some());
    }

    #[test]
    fn test_visibility_round_trip_below_threshold_fires() {
        let mut tracker = VisibilityTracker::new(1000.0);
        tracker.page_hidden(0.0);
        assert!(tracker.page_visible(500.0));
    }

    #[test]
    fn test_visibility_round_trip_at_or_above_threshold_is_quiet() {
        let mut tracker = VisibilityTracker::new(1000.0);
        tracker.page_hidden(0.0);
        assert!(!tracker.page_visible(1500.0));

        tracker.page_hidden(0.0);
        assert!(!tracker.page_visible(1000.0));
    }

    #[test]
    fn test_visible_without_hidden_is_quiet() {
        let mut tracker = VisibilityTracker::new(1000.0);
        assert!(!tracker.page_visible(100.0));
        // The hidden timestamp is consumed by the first visible event.
        tracker.page_hidden(0.0);
        assert!(tracker.page_visible(10.0));
        assert!(!tracker.page_visible(20.0));
    }

    #[test]
    fn test_chord_classification() {
        let hit = |key: &str, ctrl: bool, meta: bool, shift: bool| {
            classify_chord(&KeyChord::new(key, ctrl, meta, shift))
        };

        assert_eq!(hit("PrintScreen", false, false, false), Some(IncidentKind::ScreenshotKey));
        assert_eq!(hit("p", true, false, false), Some(IncidentKind::ScreenshotKey));
        assert_eq!(hit("P", false, true, false), Some(IncidentKind::ScreenshotKey));
        assert_eq!(hit("i", true, false, true), Some(IncidentKind::ScreenshotKey));
        assert_eq!(hit("C", false, true, true), Some(IncidentKind::ScreenshotKey));
        assert_eq!(hit("3", false, true, true), Some(IncidentKind::ScreenshotKey));
        assert_eq!(hit("4", false, true, true), Some(IncidentKind::ScreenshotKey));

        // Plain typing and near-misses stay quiet.
        assert_eq!(hit("p", false, false, false), None);
        assert_eq!(hit("i", true, false, false), None);
        assert_eq!(hit("3", true, false, true), None);
        assert_eq!(hit("a", true, true, true), None);
    }

    #[test]
    fn test_chrome_delta() {
        assert!(chrome_delta_exceeded(1400, 1100, 900, 880, 200));
        assert!(chrome_delta_exceeded(1400, 1390, 1200, 900, 200));
        assert!(!chrome_delta_exceeded(1400, 1390, 900, 880, 200));
        // Boundary: the delta must strictly exceed the threshold.
        assert!(!chrome_delta_exceeded(1400, 1200, 900, 700, 200));
    }

    #[test]
    fn test_paste_type_inspection() {
        assert!(paste_types_contain_image(&["Files"]));
        assert!(paste_types_contain_image(&["text/plain", "image/png"]));
        assert!(paste_types_contain_image(&["image/jpeg"]));
        assert!(paste_types_contain_image(&["image/gif"]));
        assert!(!paste_types_contain_image(&["text/plain", "text/html"]));
        assert!(!paste_types_contain_image::<&str>(&[]));
    }

    #[test]
    fn test_every_kind_has_a_notice() {
        for kind in [
            IncidentKind::PrintAttempt,
            IncidentKind::ScreenshotKey,
            IncidentKind::ClipboardCopy,
            IncidentKind::ClipboardImagePaste,
            IncidentKind::VisibilityHeuristic,
            IncidentKind::InspectionHeuristic,
        ] {
            assert!(!kind.notice().is_empty());
        }
    }
}
