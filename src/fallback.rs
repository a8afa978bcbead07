//! Heuristic people-count estimator.
//!
//! Last-resort path for when no model output is available: one pass over
//! the raw pixels, three independent per-pixel classifiers, a time-of-day
//! multiplier and a small jitter, clamped to a sane range. This is not a
//! detector. Results built from it are always flagged degraded and carry a
//! fixed moderate confidence, never a real model confidence. The constants
//! are structural, not tuned for accuracy.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::frame::Frame;

/// Confidence attached to every fallback estimate.
pub const FALLBACK_CONFIDENCE: f32 = 0.6;

/// Upper clamp for estimates.
pub const MAX_ESTIMATE: usize = 500;

// Per-pixel classifier thresholds.
const VARIANCE_THRESHOLD: f32 = 260.0;
const GRADIENT_THRESHOLD: i32 = 96;

// Ratio floors and weights for the partial estimates.
const SKIN_RATIO_FLOOR: f32 = 0.004;
const TEXTURE_RATIO_FLOOR: f32 = 0.02;
const GRADIENT_RATIO_FLOOR: f32 = 0.02;
const SKIN_WEIGHT: f32 = 850.0;
const TEXTURE_WEIGHT: f32 = 320.0;
const GRADIENT_WEIGHT: f32 = 260.0;

/// Estimate the people count for a frame.
pub fn estimate_count(frame: &Frame) -> usize {
    let jitter = rand::thread_rng().gen_range(-3i32..=3);
    estimate_at_hour(frame, current_hour(), jitter)
}

/// Deterministic core, split out so tests can pin the hour and jitter.
pub(crate) fn estimate_at_hour(frame: &Frame, hour: u32, jitter: i32) -> usize {
    let ratios = scan(frame);

    let mut raw = 0.0f32;
    if ratios.skin > SKIN_RATIO_FLOOR {
        raw += ratios.skin * SKIN_WEIGHT;
    }
    if ratios.texture > TEXTURE_RATIO_FLOOR {
        raw += ratios.texture * TEXTURE_WEIGHT;
    }
    if ratios.gradient > GRADIENT_RATIO_FLOOR {
        raw += ratios.gradient * GRADIENT_WEIGHT;
    }

    let adjusted = raw * hour_multiplier(hour);
    let estimate = adjusted.round() as i64 + jitter as i64;
    estimate.clamp(0, MAX_ESTIMATE as i64) as usize
}

struct HitRatios {
    skin: f32,
    texture: f32,
    gradient: f32,
}

/// Single scan accumulating all three classifiers.
fn scan(frame: &Frame) -> HitRatios {
    let width = frame.width();
    let height = frame.height();
    let total = (width as u64 * height as u64).max(1) as f32;

    let mut skin_hits = 0u64;
    let mut texture_hits = 0u64;
    let mut gradient_hits = 0u64;

    for y in 0..height {
        for x in 0..width {
            let [r, g, b, _] = frame.rgba_at(x, y);

            if is_skin_tone(r, g, b) {
                skin_hits += 1;
            }

            let rf = r as f32;
            let gf = g as f32;
            let bf = b as f32;
            let mean = (rf + gf + bf) / 3.0;
            let variance =
                ((rf - mean).powi(2) + (gf - mean).powi(2) + (bf - mean).powi(2)) / 3.0;
            if variance > VARIANCE_THRESHOLD {
                texture_hits += 1;
            }

            // Right/below gradient, skipped at the borders.
            if x + 1 < width && y + 1 < height {
                let here = r as i32 + g as i32 + b as i32;
                let [rr, rg, rb, _] = frame.rgba_at(x + 1, y);
                let [br, bg, bb, _] = frame.rgba_at(x, y + 1);
                let right = rr as i32 + rg as i32 + rb as i32;
                let below = br as i32 + bg as i32 + bb as i32;
                if (here - right).abs() + (here - below).abs() > GRADIENT_THRESHOLD {
                    gradient_hits += 1;
                }
            }
        }
    }

    HitRatios {
        skin: skin_hits as f32 / total,
        texture: texture_hits as f32 / total,
        gradient: gradient_hits as f32 / total,
    }
}

/// Four disjoint RGB range rules covering a spectrum of skin tones,
/// partitioned by the red channel.
fn is_skin_tone(r: u8, g: u8, b: u8) -> bool {
    match r {
        180..=255 => (130..=200).contains(&g) && (100..=170).contains(&b) && r > g && g > b,
        140..=179 => (90..=139).contains(&g) && (60..=109).contains(&b) && r > g && g >= b,
        100..=139 => (65..=99).contains(&g) && (40..=79).contains(&b) && r > g,
        50..=99 => (30..=69).contains(&g) && (20..=54).contains(&b) && r >= g && g >= b,
        _ => false,
    }
}

/// Deterministic time-of-day table: pre-dawn bathing hours, evening
/// gathering hours, night hours, daytime default.
fn hour_multiplier(hour: u32) -> f32 {
    match hour {
        4..=6 => 1.3,
        17..=20 => 1.5,
        21..=23 | 0..=3 => 0.4,
        _ => 1.0,
    }
}

fn current_hour() -> u32 {
    let epoch_s = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    ((epoch_s / 3600) % 24) as u32
}
