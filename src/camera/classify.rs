//! Camera classification and optic validation
//!
//! Camera names differ between builds, so classification is a trait the caller
//! can replace. The default implementation matches the main camera by exact name
//! and optic candidates by two name fragments that must both appear.

use crate::math::Vec3;
use crate::projection::ViewTransform;
use serde::{Deserialize, Serialize};

/// Decides which cameras matter
pub trait CameraClassifier: Send + Sync {
    /// The main (non-optic) camera; exactly one is expected
    fn is_default(&self, name: &str) -> bool;

    /// A camera that may render an optic sight picture
    fn is_optic_candidate(&self, name: &str) -> bool;
}

/// Name-based classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamePatternClassifier {
    /// Exact name of the main camera
    pub default_name: String,
    /// Both fragments must appear in an optic camera's name
    pub optic_fragments: [String; 2],
}

impl Default for NamePatternClassifier {
    fn default() -> Self {
        Self {
            default_name: "FPS Camera".to_string(),
            optic_fragments: ["BaseOpticCamera".to_string(), "(Clone)".to_string()],
        }
    }
}

impl CameraClassifier for NamePatternClassifier {
    fn is_default(&self, name: &str) -> bool {
        name == self.default_name
    }

    fn is_optic_candidate(&self, name: &str) -> bool {
        self.optic_fragments
            .iter()
            .all(|fragment| name.contains(fragment.as_str()))
    }
}

/// Sanity band for optic camera matrices
///
/// The limits are empirical: an uninitialized or unrelated camera tends to show
/// basis vectors near zero or wildly large. They may need retuning per build.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationBand {
    /// Smallest accepted basis vector magnitude
    pub min_magnitude: f32,
    /// Largest accepted basis vector magnitude
    pub max_magnitude: f32,
    /// Minimum magnitude of the homogeneous row
    pub min_w_magnitude: f32,
}

impl Default for ValidationBand {
    fn default() -> Self {
        Self {
            min_magnitude: 1e-3,
            max_magnitude: 1e4,
            min_w_magnitude: 1e-6,
        }
    }
}

impl ValidationBand {
    fn in_band(&self, v: Vec3) -> bool {
        let magnitude = v.length();
        magnitude.is_finite() && magnitude >= self.min_magnitude && magnitude <= self.max_magnitude
    }

    /// Whether `transform` looks like a live camera
    pub fn accepts(&self, transform: &ViewTransform) -> bool {
        if transform.rows.iter().flatten().any(|v| !v.is_finite()) {
            return false;
        }

        let w_row = transform.translation();
        let w_magnitude = (w_row.dot(w_row) + transform.w_term() * transform.w_term()).sqrt();
        if w_magnitude < self.min_w_magnitude {
            return false;
        }

        [transform.right(), transform.up(), transform.forward()]
            .into_iter()
            .any(|basis| self.in_band(basis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::tests::forward_camera;

    #[test]
    fn test_name_patterns() {
        let classifier = NamePatternClassifier::default();

        assert!(classifier.is_default("FPS Camera"));
        assert!(!classifier.is_default("FPS Camera (Clone)"));
        assert!(classifier.is_optic_candidate("BaseOpticCamera(Clone)"));
        assert!(!classifier.is_optic_candidate("BaseOpticCamera"));
        assert!(!classifier.is_optic_candidate("Minimap(Clone)"));
    }

    #[test]
    fn test_band_accepts_live_camera() {
        assert!(ValidationBand::default().accepts(&forward_camera()));
    }

    #[test]
    fn test_band_rejects_degenerate() {
        let band = ValidationBand::default();

        assert!(!band.accepts(&ViewTransform::ZERO));

        let mut tiny = forward_camera();
        for row in tiny.rows.iter_mut().take(3) {
            for value in row.iter_mut().take(3) {
                *value *= 1e-5;
            }
        }
        assert!(!band.accepts(&tiny));

        let mut huge = forward_camera();
        for row in huge.rows.iter_mut().take(3) {
            for value in row.iter_mut().take(3) {
                *value *= 1e6;
            }
        }
        assert!(!band.accepts(&huge));

        let mut no_w = forward_camera();
        no_w.rows[3] = [0.0; 4];
        assert!(!band.accepts(&no_w));

        let mut nan = forward_camera();
        nan.rows[2][1] = f32::NAN;
        assert!(!band.accepts(&nan));
    }
}
