//! Detection data model.
//!
//! `Detection` and `DetectionResult` are immutable once produced and are the
//! only shapes that cross the pipeline boundary. Results serialize to flat
//! records for downstream sinks (persistence, dashboards).

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::geometry::BoundingBox;
use crate::spatial::SpatialSummary;

/// One detected person (or object, when people-only mode is off).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Detection {
    /// Normalized `[y1, x1, y2, x2]` box.
    pub bbox: BoundingBox,
    /// Combined objectness * class score, in `0..=1`.
    pub confidence: f32,
    pub class_id: usize,
    pub label: String,
}

/// Scene density label derived from the people count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DensityLevel {
    Empty,
    Low,
    Moderate,
    High,
    Critical,
}

impl DensityLevel {
    /// Label for a people count. Thresholds are presentational only.
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => DensityLevel::Empty,
            1..=9 => DensityLevel::Low,
            10..=29 => DensityLevel::Moderate,
            30..=59 => DensityLevel::High,
            _ => DensityLevel::Critical,
        }
    }
}

/// Result of one pipeline invocation.
///
/// Created once per `process` call and never mutated afterwards. `count`
/// always equals `detections.len()`; use the constructors to keep it that
/// way.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectionResult {
    pub count: usize,
    pub detections: Vec<Detection>,
    pub mean_confidence: f32,
    /// Wall time spent producing this result, in milliseconds.
    pub processing_ms: u64,
    /// Milliseconds since the Unix epoch at assembly time.
    pub timestamp_ms: u64,
    pub density: DensityLevel,
    pub spatial: Option<SpatialSummary>,
    /// True when this result came from the fallback estimator.
    pub degraded: bool,
    pub degraded_reason: Option<String>,
    /// Identifier of the model/session (or "fallback") that produced this.
    pub model: String,
}

impl DetectionResult {
    /// Assemble a result from suppressed detections.
    pub fn from_detections(detections: Vec<Detection>, processing_ms: u64, model: &str) -> Self {
        let count = detections.len();
        let mean_confidence = if count == 0 {
            0.0
        } else {
            detections.iter().map(|d| d.confidence).sum::<f32>() / count as f32
        };
        let spatial = if count == 0 {
            None
        } else {
            Some(crate::spatial::summarize(&detections))
        };
        Self {
            count,
            detections,
            mean_confidence,
            processing_ms,
            timestamp_ms: epoch_ms(),
            density: DensityLevel::from_count(count),
            spatial,
            degraded: false,
            degraded_reason: None,
            model: model.to_string(),
        }
    }

    /// Assemble a degraded result from an estimated count with no boxes.
    pub fn degraded_estimate(
        count: usize,
        confidence: f32,
        processing_ms: u64,
        reason: &str,
    ) -> Self {
        Self {
            count,
            detections: Vec::new(),
            mean_confidence: confidence,
            processing_ms,
            timestamp_ms: epoch_ms(),
            density: DensityLevel::from_count(count),
            spatial: None,
            degraded: true,
            degraded_reason: Some(reason.to_string()),
            model: "fallback".to_string(),
        }
    }
}

pub(crate) fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(0.1, 0.1, 0.3, 0.3),
            confidence,
            class_id: 0,
            label: "person".to_string(),
        }
    }

    #[test]
    fn count_matches_detections() {
        let r = DetectionResult::from_detections(vec![detection(0.9), detection(0.7)], 12, "stub");
        assert_eq!(r.count, r.detections.len());
        assert_eq!(r.count, 2);
        assert!((r.mean_confidence - 0.8).abs() < 1e-6);
        assert!(!r.degraded);
    }

    #[test]
    fn empty_result_has_empty_density_and_no_spatial() {
        let r = DetectionResult::from_detections(vec![], 5, "stub");
        assert_eq!(r.count, 0);
        assert_eq!(r.density, DensityLevel::Empty);
        assert!(r.spatial.is_none());
        assert_eq!(r.mean_confidence, 0.0);
    }

    #[test]
    fn density_thresholds() {
        assert_eq!(DensityLevel::from_count(0), DensityLevel::Empty);
        assert_eq!(DensityLevel::from_count(1), DensityLevel::Low);
        assert_eq!(DensityLevel::from_count(10), DensityLevel::Moderate);
        assert_eq!(DensityLevel::from_count(30), DensityLevel::High);
        assert_eq!(DensityLevel::from_count(60), DensityLevel::Critical);
    }

    #[test]
    fn degraded_estimate_is_flagged() {
        let r = DetectionResult::degraded_estimate(42, 0.6, 3, "backend unavailable");
        assert!(r.degraded);
        assert_eq!(r.count, 42);
        assert_eq!(r.model, "fallback");
        assert_eq!(r.degraded_reason.as_deref(), Some("backend unavailable"));
    }

    #[test]
    fn result_serializes_to_flat_record() {
        let r = DetectionResult::from_detections(vec![detection(0.9)], 8, "stub");
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"count\":1"));
        assert!(json.contains("\"degraded\":false"));
    }
}
