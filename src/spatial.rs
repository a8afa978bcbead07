//! Spatial profile of a set of detections.
//!
//! Summarizes where people are in the scene: centroid of detection centers,
//! mean pairwise spread, and a simple proximity clustering that hints at
//! crowd formations. All coordinates are normalized `0..=1`.

use serde::{Deserialize, Serialize};

use crate::detect::Detection;

/// Center distance below which two detections belong to the same cluster.
const CLUSTER_RADIUS: f32 = 0.12;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SpatialSummary {
    /// Mean of detection centers as `(y, x)`.
    pub centroid: (f32, f32),
    /// Mean pairwise distance between detection centers.
    pub mean_spread: f32,
    pub cluster_count: usize,
    /// Size of the largest proximity cluster.
    pub largest_cluster: usize,
}

/// Summarize detection centers. Callers guarantee `detections` is non-empty.
pub fn summarize(detections: &[Detection]) -> SpatialSummary {
    let centers: Vec<(f32, f32)> = detections.iter().map(|d| d.bbox.center()).collect();

    let n = centers.len() as f32;
    let centroid = (
        centers.iter().map(|c| c.0).sum::<f32>() / n,
        centers.iter().map(|c| c.1).sum::<f32>() / n,
    );

    let mut pair_total = 0.0f32;
    let mut pair_count = 0usize;
    for i in 0..centers.len() {
        for j in (i + 1)..centers.len() {
            pair_total += distance(centers[i], centers[j]);
            pair_count += 1;
        }
    }
    let mean_spread = if pair_count == 0 {
        0.0
    } else {
        pair_total / pair_count as f32
    };

    let clusters = cluster_sizes(&centers);
    let largest_cluster = clusters.iter().copied().max().unwrap_or(0);

    SpatialSummary {
        centroid,
        mean_spread,
        cluster_count: clusters.len(),
        largest_cluster,
    }
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dy = a.0 - b.0;
    let dx = a.1 - b.1;
    (dy * dy + dx * dx).sqrt()
}

/// Single-link clustering over centers: two centers within CLUSTER_RADIUS
/// join the same cluster, transitively. Returns the size of each cluster.
fn cluster_sizes(centers: &[(f32, f32)]) -> Vec<usize> {
    let mut cluster_of: Vec<Option<usize>> = vec![None; centers.len()];
    let mut sizes: Vec<usize> = Vec::new();

    for i in 0..centers.len() {
        if cluster_of[i].is_some() {
            continue;
        }
        let id = sizes.len();
        sizes.push(0);

        // Flood-fill walk of the proximity graph from center i.
        let mut queue = vec![i];
        cluster_of[i] = Some(id);
        while let Some(current) = queue.pop() {
            sizes[id] += 1;
            for j in 0..centers.len() {
                if cluster_of[j].is_none()
                    && distance(centers[current], centers[j]) <= CLUSTER_RADIUS
                {
                    cluster_of[j] = Some(id);
                    queue.push(j);
                }
            }
        }
    }

    sizes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    fn detection_at(cy: f32, cx: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(cy - 0.02, cx - 0.02, cy + 0.02, cx + 0.02),
            confidence: 0.9,
            class_id: 0,
            label: "person".to_string(),
        }
    }

    #[test]
    fn single_detection_summary() {
        let s = summarize(&[detection_at(0.5, 0.5)]);
        assert!((s.centroid.0 - 0.5).abs() < 1e-5);
        assert!((s.centroid.1 - 0.5).abs() < 1e-5);
        assert_eq!(s.mean_spread, 0.0);
        assert_eq!(s.cluster_count, 1);
        assert_eq!(s.largest_cluster, 1);
    }

    #[test]
    fn two_groups_form_two_clusters() {
        let detections = vec![
            detection_at(0.1, 0.1),
            detection_at(0.15, 0.12),
            detection_at(0.8, 0.8),
            detection_at(0.82, 0.85),
            detection_at(0.85, 0.8),
        ];
        let s = summarize(&detections);
        assert_eq!(s.cluster_count, 2);
        assert_eq!(s.largest_cluster, 3);
    }

    #[test]
    fn chained_centers_link_transitively() {
        // Each neighbor is within the radius of the next, the ends are not
        // within radius of each other.
        let detections = vec![
            detection_at(0.1, 0.1),
            detection_at(0.1, 0.2),
            detection_at(0.1, 0.3),
        ];
        let s = summarize(&detections);
        assert_eq!(s.cluster_count, 1);
        assert_eq!(s.largest_cluster, 3);
    }

    #[test]
    fn centroid_is_mean_of_centers() {
        let detections = vec![detection_at(0.2, 0.4), detection_at(0.6, 0.8)];
        let s = summarize(&detections);
        assert!((s.centroid.0 - 0.4).abs() < 1e-5);
        assert!((s.centroid.1 - 0.6).abs() < 1e-5);
        assert!(s.mean_spread > 0.0);
    }
}
