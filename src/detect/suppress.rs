//! Greedy non-maximum suppression.
//!
//! Classic greedy NMS, not soft-NMS: deterministic, O(n²) worst case, which
//! is acceptable for the candidate counts the decoder produces after
//! confidence pruning (a few thousand at most). Pure function over its
//! input; no randomness, no wall clock.

use crate::detect::Detection;

/// Suppress overlapping candidates, keeping at most `max_detections`.
///
/// Candidates are ordered confidence-descending with the original index as a
/// stable tie-break, then selected greedily: the best remaining candidate is
/// kept and every unselected candidate whose IoU against it exceeds
/// `nms_threshold` is dropped. The returned detections are
/// confidence-descending.
pub fn suppress(
    candidates: Vec<Detection>,
    nms_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    if candidates.is_empty() || max_detections == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .confidence
            .partial_cmp(&candidates[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut selected: Vec<usize> = Vec::new();
    let mut suppressed = vec![false; candidates.len()];

    for &idx in &order {
        if suppressed[idx] {
            continue;
        }
        selected.push(idx);
        if selected.len() == max_detections {
            break;
        }
        for &other in &order {
            if !suppressed[other]
                && other != idx
                && candidates[idx].bbox.iou(&candidates[other].bbox) > nms_threshold
            {
                suppressed[other] = true;
            }
        }
    }

    let mut keep: Vec<Option<Detection>> = candidates.into_iter().map(Some).collect();
    selected
        .into_iter()
        .filter_map(|idx| keep[idx].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    fn candidate(y1: f32, x1: f32, y2: f32, x2: f32, confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(y1, x1, y2, x2),
            confidence,
            class_id: 0,
            label: "person".to_string(),
        }
    }

    #[test]
    fn keeps_highest_of_overlapping_pair() {
        let out = suppress(
            vec![
                candidate(0.1, 0.1, 0.5, 0.5, 0.7),
                candidate(0.12, 0.12, 0.52, 0.52, 0.9),
            ],
            0.45,
            100,
        );
        assert_eq!(out.len(), 1);
        assert!((out[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn disjoint_boxes_all_survive_sorted() {
        let out = suppress(
            vec![
                candidate(0.0, 0.0, 0.2, 0.2, 0.5),
                candidate(0.4, 0.4, 0.6, 0.6, 0.9),
                candidate(0.7, 0.7, 0.9, 0.9, 0.7),
            ],
            0.45,
            100,
        );
        assert_eq!(out.len(), 3);
        assert!(out.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn respects_max_detections() {
        let candidates: Vec<Detection> = (0..20)
            .map(|i| {
                let offset = i as f32 * 0.04;
                candidate(offset, offset, offset + 0.03, offset + 0.03, 0.9)
            })
            .collect();
        let out = suppress(candidates, 0.45, 5);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn no_surviving_pair_overlaps_beyond_threshold() {
        let candidates: Vec<Detection> = (0..30)
            .map(|i| {
                let offset = (i as f32) * 0.01;
                candidate(offset, offset, offset + 0.3, offset + 0.3, 1.0 - offset)
            })
            .collect();
        let threshold = 0.45;
        let out = suppress(candidates, threshold, 100);
        for i in 0..out.len() {
            for j in (i + 1)..out.len() {
                assert!(out[i].bbox.iou(&out[j].bbox) <= threshold);
            }
        }
    }

    #[test]
    fn ties_break_by_original_index() {
        let out = suppress(
            vec![
                candidate(0.0, 0.0, 0.2, 0.2, 0.8),
                candidate(0.5, 0.5, 0.7, 0.7, 0.8),
            ],
            0.45,
            1,
        );
        assert_eq!(out.len(), 1);
        // Equal confidence: the earlier candidate wins the single slot.
        assert_eq!(out[0].bbox.y1, 0.0);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(suppress(Vec::new(), 0.45, 100).is_empty());
    }
}
