//! Raw output decoding.
//!
//! Turns a backend's raw tensor into detection candidates. The expected
//! layout is `[batch, candidates, 4 + 1 + classes]` with per-candidate
//! fields `[cx, cy, w, h, objectness, class scores...]` in units of the
//! model input size. Decoding failure is never fatal: a malformed shape
//! yields an empty candidate set and a warning, and the pipeline moves on.

use crate::detect::backend::RawOutput;
use crate::detect::Detection;
use crate::geometry::BoundingBox;

/// COCO class index for "person".
pub const PERSON_CLASS: usize = 0;

/// Fields preceding the class scores: cx, cy, w, h, objectness.
const BOX_FIELDS: usize = 5;

#[rustfmt::skip]
const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train",
    "truck", "boat", "traffic light", "fire hydrant", "stop sign",
    "parking meter", "bench", "bird", "cat", "dog", "horse", "sheep", "cow",
    "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella", "handbag",
    "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard",
    "tennis racket", "bottle", "wine glass", "cup", "fork", "knife", "spoon",
    "bowl", "banana", "apple", "sandwich", "orange", "broccoli", "carrot",
    "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear",
    "hair drier", "toothbrush",
];

/// Label for a class id, falling back to `class_<id>` beyond the table.
pub fn label_for(class_id: usize) -> String {
    COCO_LABELS
        .get(class_id)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("class_{class_id}"))
}

/// Decode a raw output tensor into unordered detection candidates.
///
/// `people_only` discards candidates whose arg-max class is not "person"
/// BEFORE the confidence gate, so class-irrelevant noise never competes for
/// the detection cap downstream. Coordinates are converted from center form
/// in input-size pixels to normalized corner form.
pub fn decode(
    raw: &RawOutput,
    confidence_threshold: f32,
    input_size: u32,
    people_only: bool,
) -> Vec<Detection> {
    let Some((candidates, fields)) = validate_shape(raw) else {
        return Vec::new();
    };

    let size = input_size as f32;
    let mut detections = Vec::new();

    // Only the first batch entry is decoded; the pipeline runs one frame per
    // inference call.
    for candidate in 0..candidates {
        let base = candidate * fields;
        let row = &raw.data[base..base + fields];

        let objectness = row[4];
        let class_scores = &row[BOX_FIELDS..];

        let (class_id, &class_score) = match class_scores
            .iter()
            .enumerate()
            .reduce(|best, x| if x.1 > best.1 { x } else { best })
        {
            Some(best) => best,
            None => continue,
        };

        if people_only && class_id != PERSON_CLASS {
            continue;
        }

        let confidence = objectness * class_score;
        if confidence < confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let x1 = ((cx - w / 2.0) / size).clamp(0.0, 1.0);
        let y1 = ((cy - h / 2.0) / size).clamp(0.0, 1.0);
        let x2 = ((cx + w / 2.0) / size).clamp(0.0, 1.0);
        let y2 = ((cy + h / 2.0) / size).clamp(0.0, 1.0);

        detections.push(Detection {
            bbox: BoundingBox::new(y1, x1, y2, x2),
            confidence,
            class_id,
            label: label_for(class_id),
        });
    }

    detections
}

/// Check the declared shape against the buffer. Returns
/// `(candidates, fields)` or `None` for anything the decoder cannot walk.
fn validate_shape(raw: &RawOutput) -> Option<(usize, usize)> {
    if raw.shape.len() != 3 {
        log::warn!(
            "decoder: expected [batch, candidates, fields] shape, got {:?}",
            raw.shape
        );
        return None;
    }
    let (batch, candidates, fields) = (raw.shape[0], raw.shape[1], raw.shape[2]);
    if batch == 0 || candidates == 0 || fields <= BOX_FIELDS {
        log::warn!("decoder: degenerate output shape {:?}", raw.shape);
        return None;
    }
    if raw.data.len() < batch * candidates * fields {
        log::warn!(
            "decoder: buffer length {} shorter than shape {:?}",
            raw.data.len(),
            raw.shape
        );
        return None;
    }
    Some((candidates, fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a raw output of `candidates` rows with 80 class scores each.
    fn raw_with_rows(rows: Vec<Vec<f32>>) -> RawOutput {
        let fields = rows[0].len();
        let candidates = rows.len();
        let data: Vec<f32> = rows.into_iter().flatten().collect();
        RawOutput::new(data, vec![1, candidates, fields])
    }

    fn person_row(cx: f32, cy: f32, w: f32, h: f32, objectness: f32, score: f32) -> Vec<f32> {
        let mut row = vec![cx, cy, w, h, objectness];
        let mut scores = vec![0.0f32; 80];
        scores[PERSON_CLASS] = score;
        row.extend(scores);
        row
    }

    #[test]
    fn zero_buffer_decodes_to_nothing() {
        let raw = RawOutput::zeros(vec![1, 8400, 85]);
        assert!(decode(&raw, 0.5, 640, true).is_empty());
    }

    #[test]
    fn malformed_shape_is_not_fatal() {
        let flat = RawOutput::new(vec![0.0; 10], vec![10]);
        assert!(decode(&flat, 0.5, 640, true).is_empty());

        let empty = RawOutput::new(vec![], vec![1, 0, 85]);
        assert!(decode(&empty, 0.5, 640, true).is_empty());

        let truncated = RawOutput::new(vec![0.0; 10], vec![1, 3, 85]);
        assert!(decode(&truncated, 0.5, 640, true).is_empty());
    }

    #[test]
    fn single_strong_person_candidate_survives() {
        // Three candidates; only #2 clears the threshold.
        let rows = vec![
            person_row(100.0, 100.0, 50.0, 80.0, 0.2, 0.5),
            person_row(320.0, 320.0, 60.0, 120.0, 1.0, 0.9),
            person_row(500.0, 200.0, 40.0, 90.0, 0.3, 0.4),
        ];
        let out = decode(&raw_with_rows(rows), 0.5, 640, true);
        assert_eq!(out.len(), 1);
        assert!((out[0].confidence - 0.9).abs() < 1e-5);
        assert_eq!(out[0].class_id, PERSON_CLASS);
        assert_eq!(out[0].label, "person");
        // Center 320/640 = 0.5, width 60/640.
        let b = out[0].bbox;
        assert!((b.x1 - (320.0 - 30.0) / 640.0).abs() < 1e-5);
        assert!((b.x2 - (320.0 + 30.0) / 640.0).abs() < 1e-5);
    }

    #[test]
    fn people_only_drops_other_classes_before_confidence() {
        let mut car_row = vec![320.0, 320.0, 60.0, 120.0, 1.0];
        let mut scores = vec![0.0f32; 80];
        scores[2] = 0.99; // car
        car_row.extend(scores);

        let out = decode(&raw_with_rows(vec![car_row.clone()]), 0.5, 640, true);
        assert!(out.is_empty());

        // With people-only off the same candidate decodes.
        let out = decode(&raw_with_rows(vec![car_row]), 0.5, 640, false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "car");
    }

    #[test]
    fn boxes_clamp_to_unit_square() {
        let rows = vec![person_row(10.0, 10.0, 100.0, 100.0, 1.0, 0.9)];
        let out = decode(&raw_with_rows(rows), 0.5, 640, true);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox.x1, 0.0);
        assert_eq!(out[0].bbox.y1, 0.0);
    }

    #[test]
    fn unknown_class_ids_get_fallback_labels() {
        assert_eq!(label_for(0), "person");
        assert_eq!(label_for(79), "toothbrush");
        assert_eq!(label_for(123), "class_123");
    }
}
