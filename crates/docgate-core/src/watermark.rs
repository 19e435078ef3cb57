//! Watermark text and tiling geometry.
//!
//! The render surface recomputes the text on every page render; nothing
//! here caches an identity.

/// Horizontal distance between stamps, in canvas pixels.
pub const TILE_STEP_X: f64 = 400.0;
/// Vertical distance between stamps.
pub const TILE_STEP_Y: f64 = 100.0;

/// Font and fill used for the stamp: legible attribution at low opacity.
pub const STAMP_FONT: &str = "20px Arial";
pub const STAMP_FILL: &str = "rgba(150, 150, 150, 0.2)";

/// Attribution line for an authenticated viewer.
pub fn attribution_text(identity: Option<&str>) -> String {
    match identity {
        Some(id) if !id.is_empty() => format!("CONFIDENTIAL - {}", id),
        _ => "CONFIDENTIAL - Restricted Access".to_string(),
    }
}

/// Dated label variant, `"<label> - <ISO date>"`.
pub fn dated_text(label: &str, iso_date: &str) -> String {
    format!("{} - {}", label, iso_date)
}

/// Stamp centers covering a `width` x `height` surface, offset half a step
/// so every region of the page carries attribution.
pub fn tile_positions(width: f64, height: f64) -> Vec<(f64, f64)> {
    let mut positions = Vec::new();
    let mut y = 0.0;
    while y < height {
        let mut x = 0.0;
        while x < width {
            positions.push((x + TILE_STEP_X / 2.0, y + TILE_STEP_Y / 2.0));
            x += TILE_STEP_X;
        }
        y += TILE_STEP_Y;
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribution_contains_identity_exactly() {
        let text = attribution_text(Some("user@allowed.com"));
        assert!(text.contains("user@allowed.com"));
        assert_eq!(text, "CONFIDENTIAL - user@allowed.com");

        let wallet = attribution_text(Some("0xdef456"));
        assert!(wallet.contains("0xdef456"));
    }

    #[test]
    fn test_attribution_differs_per_identity() {
        assert_ne!(
            attribution_text(Some("a@x.com")),
            attribution_text(Some("b@x.com"))
        );
    }

    #[test]
    fn test_attribution_fallback_without_identity() {
        assert_eq!(attribution_text(None), "CONFIDENTIAL - Restricted Access");
        assert_eq!(attribution_text(Some("")), "CONFIDENTIAL - Restricted Access");
    }

    #[test]
    fn test_dated_text_format() {
        assert_eq!(dated_text("Restricted Access", "2025-06-01"), "Restricted Access - 2025-06-01");
    }

    #[test]
    fn test_tile_positions_cover_letter_page() {
        // US Letter at 1.5x scale.
        let positions = tile_positions(918.0, 1188.0);
        assert!(!positions.is_empty());

        // 3 columns x 12 rows.
        assert_eq!(positions.len(), 36);
        assert_eq!(positions[0], (200.0, 50.0));

        // Every stamp lands within a step of the surface.
        for (x, y) in &positions {
            assert!(*x < 918.0 + TILE_STEP_X);
            assert!(*y < 1188.0 + TILE_STEP_Y);
        }
    }

    #[test]
    fn test_tile_positions_empty_surface() {
        assert!(tile_positions(0.0, 0.0).is_empty());
    }
}
