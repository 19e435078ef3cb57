//! Tunable configuration for the deterrence monitor, session controller,
//! and render surface. Threshold values are recommendations, not contracts.

use serde::{Deserialize, Serialize};

/// Capture-deterrence thresholds and response timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeterrenceConfig {
    /// Incidents tolerated before lockdown. Zero-tolerance policy: 1.
    pub max_attempts: u32,
    /// A hidden-to-visible round trip shorter than this raises an incident.
    pub hidden_threshold_ms: f64,
    /// Outer-vs-inner window delta suggesting an inspection panel.
    pub chrome_delta_px: i32,
    /// Delay between showing the security notice and terminating the session.
    pub lockdown_delay_ms: i32,
}

impl Default for DeterrenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            hidden_threshold_ms: 1000.0,
            chrome_delta_px: 200,
            lockdown_delay_ms: 1500,
        }
    }
}

/// Session restore budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on the automatic restore probe. A hung provider check
    /// falls back to the unauthenticated state once this expires.
    pub restore_timeout_ms: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            restore_timeout_ms: 5000,
        }
    }
}

/// Render surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Fixed render scale for page canvases.
    pub scale: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self { scale: 1.5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_recommended_policy() {
        let d = DeterrenceConfig::default();
        assert_eq!(d.max_attempts, 1);
        assert_eq!(d.hidden_threshold_ms, 1000.0);
        assert_eq!(d.chrome_delta_px, 200);
        assert_eq!(d.lockdown_delay_ms, 1500);

        assert_eq!(SessionConfig::default().restore_timeout_ms, 5000);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let d = DeterrenceConfig::default();
        let json = serde_json::to_string(&d).unwrap();
        let back: DeterrenceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_attempts, d.max_attempts);
        assert_eq!(back.lockdown_delay_ms, d.lockdown_delay_ms);
    }
}
