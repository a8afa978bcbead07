//! Time-bucketed result cache.
//!
//! Keys combine a perceptual frame fingerprint with a coarse wall-clock
//! bucket, so visually-similar frames captured close together collapse to
//! one entry. Near-duplicate consecutive frames (static camera, little
//! motion) then skip inference entirely. Eviction is strict FIFO by
//! insertion order, not LRU: the workload is bounded and mostly
//! sequential-write, so usage-awareness buys nothing here.

use std::collections::{HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::detect::DetectionResult;
use crate::frame::Frame;

/// How many bytes the fingerprint samples out of the frame buffer.
const FINGERPRINT_SAMPLES: usize = 256;

/// A fixed-width wall-clock window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeBucket {
    pub index: u64,
    pub width_ms: u64,
}

impl TimeBucket {
    /// Bucket containing the current wall-clock instant.
    pub fn now(width_ms: u64) -> Self {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            index: now_ms / width_ms.max(1),
            width_ms,
        }
    }
}

/// Deterministic low-cost content fingerprint.
///
/// Samples a fixed number of bytes spread evenly across the buffer and
/// digests them together with the frame dimensions. Cheap enough to run per
/// frame, stable for identical content, and collisions merely cost one
/// redundant cache hit within a bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameFingerprint(u64);

impl FrameFingerprint {
    pub fn of(frame: &Frame) -> Self {
        let pixels = frame.pixels();
        let mut hasher = Sha256::new();
        hasher.update(frame.width().to_le_bytes());
        hasher.update(frame.height().to_le_bytes());

        if !pixels.is_empty() {
            let step = (pixels.len() / FINGERPRINT_SAMPLES).max(1);
            for &byte in pixels.iter().step_by(step) {
                hasher.update([byte]);
            }
        }

        let digest = hasher.finalize();
        let mut first = [0u8; 8];
        first.copy_from_slice(&digest[..8]);
        Self(u64::from_le_bytes(first))
    }
}

/// Full cache key: what the frame looks like plus when it was seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fingerprint: FrameFingerprint,
    pub bucket_index: u64,
}

impl CacheKey {
    pub fn of(frame: &Frame, bucket_width_ms: u64) -> Self {
        Self {
            fingerprint: FrameFingerprint::of(frame),
            bucket_index: TimeBucket::now(bucket_width_ms).index,
        }
    }
}

/// FIFO-bounded result cache.
pub struct ResultCache {
    map: HashMap<CacheKey, DetectionResult>,
    order: VecDeque<CacheKey>,
    capacity: usize,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            map: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// O(1) lookup with no side effects.
    pub fn get(&self, key: &CacheKey) -> Option<&DetectionResult> {
        self.map.get(key)
    }

    /// Insert, evicting the oldest entry first when at capacity.
    ///
    /// Re-inserting a live key is last-write-wins and keeps the key's
    /// original insertion-order slot.
    pub fn put(&mut self, key: CacheKey, value: DetectionResult) {
        if self.map.insert(key, value).is_some() {
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
        self.order.push_back(key);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(count: usize) -> DetectionResult {
        DetectionResult::degraded_estimate(count, 0.6, 1, "test")
    }

    fn key(n: u64) -> CacheKey {
        CacheKey {
            fingerprint: FrameFingerprint(n),
            bucket_index: 0,
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let mut cache = ResultCache::new(3);
        for n in 0..4 {
            cache.put(key(n), result(n as usize));
        }

        assert!(cache.get(&key(0)).is_none());
        for n in 1..4 {
            assert_eq!(cache.get(&key(n)).unwrap().count, n as usize);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn get_is_side_effect_free() {
        let mut cache = ResultCache::new(2);
        cache.put(key(1), result(1));
        cache.put(key(2), result(2));

        // Touch key 1 repeatedly; FIFO still evicts it first.
        for _ in 0..5 {
            assert!(cache.get(&key(1)).is_some());
        }
        cache.put(key(3), result(3));
        assert!(cache.get(&key(1)).is_none());
        assert!(cache.get(&key(2)).is_some());
    }

    #[test]
    fn reinserting_live_key_overwrites_without_eviction() {
        let mut cache = ResultCache::new(2);
        cache.put(key(1), result(1));
        cache.put(key(2), result(2));
        cache.put(key(1), result(99));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(1)).unwrap().count, 99);
        assert!(cache.get(&key(2)).is_some());
    }

    #[test]
    fn identical_frames_share_a_fingerprint() {
        let a = Frame::filled(64, 64, [100, 100, 100, 255]);
        let b = Frame::filled(64, 64, [100, 100, 100, 255]);
        let c = Frame::filled(64, 64, [101, 100, 100, 255]);

        assert_eq!(FrameFingerprint::of(&a), FrameFingerprint::of(&b));
        assert_ne!(FrameFingerprint::of(&a), FrameFingerprint::of(&c));
    }

    #[test]
    fn fingerprint_distinguishes_dimensions() {
        let wide = Frame::filled(128, 32, [50, 50, 50, 255]);
        let tall = Frame::filled(32, 128, [50, 50, 50, 255]);
        assert_ne!(FrameFingerprint::of(&wide), FrameFingerprint::of(&tall));
    }

    #[test]
    fn bucket_index_advances_with_width() {
        let bucket = TimeBucket::now(5_000);
        assert!(bucket.index > 0);
        assert_eq!(bucket.width_ms, 5_000);

        // A much wider bucket has a smaller index for the same instant.
        let wider = TimeBucket::now(60_000);
        assert!(wider.index <= bucket.index);
    }
}
