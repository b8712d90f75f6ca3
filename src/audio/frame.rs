//! PCM sample conversion and framing helpers
//!
//! The capture callback receives whatever format and rate the device
//! offers; everything downstream (the streaming socket, the fallback WAV
//! clip) wants mono 16 kHz signed 16-bit. These helpers do the conversion.

/// Convert any cpal sample type to i16 with clamping.
pub fn sample_to_i16<T: cpal::Sample<Float = f32>>(sample: T) -> i16 {
    let f32_sample: f32 = sample.to_float_sample();
    let clamped = f32_sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

/// Downmix interleaved multi-channel samples to mono by averaging.
pub fn downmix_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}

/// Downsample mono audio from source rate to target rate.
///
/// Integer ratios (48 kHz → 16 kHz) average each group of samples. Other
/// ratios (44.1 kHz → 16 kHz) fall back to nearest-neighbor decimation,
/// which is adequate for speech transcription.
pub fn downsample(samples: &[i16], source_rate: u32, target_rate: u32) -> Vec<i16> {
    if target_rate == 0 || source_rate == 0 {
        log::warn!(
            "Invalid sample rate (source: {}, target: {}), returning original",
            source_rate,
            target_rate
        );
        return samples.to_vec();
    }

    if source_rate == target_rate {
        return samples.to_vec();
    }

    if source_rate < target_rate {
        log::warn!(
            "Upsampling {} -> {} not supported, returning original",
            source_rate,
            target_rate
        );
        return samples.to_vec();
    }

    if source_rate % target_rate == 0 {
        let ratio = (source_rate / target_rate) as usize;
        return samples
            .chunks(ratio)
            .map(|chunk| {
                // i64 so long chunks can't overflow the sum
                let sum: i64 = chunk.iter().map(|&s| s as i64).sum();
                (sum / chunk.len() as i64) as i16
            })
            .collect();
    }

    // Non-integer ratio: nearest-neighbor decimation
    let out_len = (samples.len() as u64 * target_rate as u64 / source_rate as u64) as usize;
    (0..out_len)
        .map(|i| {
            let src = (i as u64 * source_rate as u64 / target_rate as u64) as usize;
            samples[src.min(samples.len() - 1)]
        })
        .collect()
}

/// Accumulates converted samples and emits fixed-size frames.
///
/// The capture callback pushes whatever the device hands it; complete
/// frames come out at exactly `frame_size` samples each, in capture order.
#[derive(Debug)]
pub struct FrameChunker {
    buffer: Vec<i16>,
    frame_size: usize,
}

impl FrameChunker {
    pub fn new(frame_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(frame_size * 2),
            frame_size,
        }
    }

    /// Push samples; returns every complete frame now available.
    pub fn push(&mut self, samples: &[i16]) -> Vec<Vec<i16>> {
        self.buffer.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.buffer.len() >= self.frame_size {
            frames.push(self.buffer.drain(..self.frame_size).collect());
        }
        frames
    }

    /// Drain any remaining partial frame (used at stop time).
    pub fn flush(&mut self) -> Option<Vec<i16>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.drain(..).collect())
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
