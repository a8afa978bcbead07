//! Frame preprocessing.
//!
//! Converts an RGBA frame into the canonical model input: a `[1, 3, S, S]`
//! NCHW f32 tensor with channels normalized to `0..=1`. Resampling is
//! nearest-neighbor; the models this feeds are tolerant of the cheaper
//! filter and the pipeline avoids pulling in an image stack for raw
//! buffers.

use anyhow::{anyhow, Result};

use crate::frame::Frame;

/// Canonical NCHW input tensor.
#[derive(Clone, Debug)]
pub struct InputTensor {
    pub data: Vec<f32>,
    /// Always `[1, 3, size, size]`.
    pub shape: Vec<usize>,
}

impl InputTensor {
    /// All-zero tensor of the canonical shape, used for session warm-up.
    pub fn zeros(size: u32) -> Self {
        let s = size as usize;
        Self {
            data: vec![0.0; 3 * s * s],
            shape: vec![1, 3, s, s],
        }
    }

    pub fn size(&self) -> usize {
        self.shape[2]
    }
}

/// Resample and normalize a frame into the canonical tensor layout.
pub fn preprocess(frame: &Frame, input_size: u32) -> Result<InputTensor> {
    if input_size == 0 {
        return Err(anyhow!("input size must be non-zero"));
    }
    if frame.width() == 0 || frame.height() == 0 {
        return Err(anyhow!("cannot preprocess an empty frame"));
    }

    let s = input_size as usize;
    let mut data = vec![0.0f32; 3 * s * s];
    let plane = s * s;

    for y in 0..s {
        // Nearest source row for this output row.
        let src_y = (y as u64 * frame.height() as u64 / s as u64) as u32;
        for x in 0..s {
            let src_x = (x as u64 * frame.width() as u64 / s as u64) as u32;
            let [r, g, b, _] = frame.rgba_at(src_x, src_y);
            let idx = y * s + x;
            data[idx] = r as f32 / 255.0;
            data[plane + idx] = g as f32 / 255.0;
            data[2 * plane + idx] = b as f32 / 255.0;
        }
    }

    Ok(InputTensor {
        data,
        shape: vec![1, 3, s, s],
    })
}
