//! Frame container and sources.
//!
//! A `Frame` is an owned RGBA pixel buffer with dimensions. Capture itself
//! is an external collaborator; the pipeline only requires region reads via
//! `pixel_data`. `FrameSource` is the seam the continuous monitor pulls
//! from, and `SyntheticSource` (url scheme `stub://`) generates crowd-like
//! scenes for tests and the demo binary.

use anyhow::{anyhow, Result};

/// Bytes per RGBA pixel.
const PIXEL_STRIDE: usize = 4;

/// An owned RGBA frame.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Wrap an RGBA buffer. The buffer length must be `width * height * 4`.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(PIXEL_STRIDE))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGBA bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Solid-fill frame, mostly useful in tests.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * PIXEL_STRIDE);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgba);
        }
        Self {
            data,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Full RGBA buffer, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// RGBA pixel at `(x, y)`. Callers stay in bounds.
    pub(crate) fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * PIXEL_STRIDE;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    /// Copy out an RGBA region, row-major. Errors when the region leaves the
    /// frame instead of clamping silently.
    pub fn pixel_data(&self, x0: u32, y0: u32, w: u32, h: u32) -> Result<Vec<u8>> {
        let x_end = x0
            .checked_add(w)
            .ok_or_else(|| anyhow!("region width overflow"))?;
        let y_end = y0
            .checked_add(h)
            .ok_or_else(|| anyhow!("region height overflow"))?;
        if x_end > self.width || y_end > self.height {
            return Err(anyhow!(
                "region {}x{}+{}+{} exceeds frame {}x{}",
                w,
                h,
                x0,
                y0,
                self.width,
                self.height
            ));
        }

        let mut out = Vec::with_capacity(w as usize * h as usize * PIXEL_STRIDE);
        for row in y0..y_end {
            let start = (row as usize * self.width as usize + x0 as usize) * PIXEL_STRIDE;
            let end = start + w as usize * PIXEL_STRIDE;
            out.extend_from_slice(&self.data[start..end]);
        }
        Ok(out)
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub descriptor: String,
}

/// A pull-based frame supplier.
pub trait FrameSource: Send {
    /// Capture or synthesize the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Whether the source is currently delivering frames.
    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and the demo
// ----------------------------------------------------------------------------

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Descriptor url, `stub://<scene-name>`.
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// How many person-sized blobs to render into each frame.
    pub people: usize,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://promenade".to_string(),
            width: 640,
            height: 640,
            people: 12,
        }
    }
}

/// Synthetic scene generator.
///
/// Renders a flat background with drifting darker blobs so consecutive
/// frames look like a mostly-static camera with slow motion. Good enough to
/// exercise preprocessing, caching, and the fallback estimator.
pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "synthetic source requires a stub:// url, got {}",
                config.url
            ));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source requires non-zero dimensions"));
        }
        Ok(Self {
            config,
            frame_count: 0,
        })
    }

    fn render(&self) -> Frame {
        let w = self.config.width;
        let h = self.config.height;
        let mut frame = Frame::filled(w, h, [168, 172, 176, 255]);

        // Drift blobs a little every 16 frames so near-consecutive frames
        // collapse to one cache fingerprint.
        let phase = (self.frame_count / 16) as u32;
        for person in 0..self.config.people as u32 {
            let cx = (person * 97 + phase * 5 + 31) % w;
            let cy = (person * 53 + phase * 3 + 17) % h;
            let half = (w.min(h) / 40).max(2);
            for y in cy.saturating_sub(half * 2)..(cy + half * 2).min(h) {
                for x in cx.saturating_sub(half)..(cx + half).min(w) {
                    let idx = (y as usize * w as usize + x as usize) * PIXEL_STRIDE;
                    // Warm skin-adjacent tone so the fallback classifiers
                    // have something to find.
                    frame.data[idx] = 190;
                    frame.data[idx + 1] = 140;
                    frame.data[idx + 2] = 110;
                }
            }
        }
        frame
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        Ok(self.render())
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            descriptor: self.config.url.clone(),
        }
    }
}
