//! Local speech gating for recorded answer clips
//!
//! Before a clip is uploaded for batch transcription we run WebRTC VAD
//! plus a couple of amplitude heuristics over the WAV. Silent clips (the
//! user pressed record, said nothing, pressed stop) produce an empty
//! answer and should never hit the network.

use std::path::Path;

use webrtc_vad::{SampleRate, Vad, VadMode};

/// Minimum VAD speech frames for a clip to count as containing speech
const MIN_SPEECH_FRAMES: usize = 2;
/// Crest factors above this indicate transient noise (clicks, bumps)
const MAX_CREST_FACTOR: f32 = 15.0;

#[derive(Debug, Clone)]
pub struct VadStats {
    pub total_frames: usize,
    pub speech_frames: usize,
    pub total_samples: u64,
    pub peak_abs: i32,
    pub rms: f32,
}

impl VadStats {
    pub fn speech_ratio(&self) -> f32 {
        if self.total_frames == 0 {
            return 0.0;
        }
        self.speech_frames as f32 / self.total_frames as f32
    }

    pub fn crest_factor(&self) -> f32 {
        if self.rms <= 0.0 {
            return f32::INFINITY;
        }
        self.peak_abs as f32 / self.rms
    }
}

/// Outcome of the local speech gate for a clip.
#[derive(Debug, Clone)]
pub struct SpeechGate {
    /// Should this clip be sent for batch transcription?
    pub contains_speech: bool,
    pub speech_frames: usize,
    pub total_frames: usize,
    pub crest_factor: f32,
}

/// Decide whether a clip contains speech worth transcribing.
///
/// A clip passes when VAD found at least [`MIN_SPEECH_FRAMES`] speech
/// frames and the crest factor is low enough to rule out transient noise.
pub fn evaluate_speech_gate(stats: &VadStats) -> SpeechGate {
    let speech_detected = stats.speech_frames >= MIN_SPEECH_FRAMES;
    let crest_factor = stats.crest_factor();
    let not_transient = crest_factor <= MAX_CREST_FACTOR;

    SpeechGate {
        contains_speech: speech_detected && not_transient,
        speech_frames: stats.speech_frames,
        total_frames: stats.total_frames,
        crest_factor,
    }
}

/// Run WebRTC VAD over a mono 16-bit WAV clip and collect amplitude stats.
pub fn analyze_wav_for_speech(path: &Path) -> Result<VadStats, String> {
    let mut reader =
        hound::WavReader::open(path).map_err(|e| format!("Open WAV {:?}: {}", path, e))?;
    let spec = reader.spec();

    if spec.channels != 1 {
        return Err(format!(
            "Unsupported channel count {} (expected 1)",
            spec.channels
        ));
    }

    if spec.bits_per_sample != 16 {
        return Err(format!(
            "Unsupported bits per sample {} (expected 16)",
            spec.bits_per_sample
        ));
    }

    let sample_rate = SampleRate::try_from(spec.sample_rate as i32)
        .map_err(|_| format!("Unsupported sample rate {}Hz", spec.sample_rate))?;

    // Aggressive mode keeps room tone and breathing out of the count
    let mut vad = Vad::new_with_rate_and_mode(sample_rate, VadMode::VeryAggressive);

    // WebRTC VAD accepts 10/20/30ms frames only; 30ms keeps overhead low
    let frame_len = (spec.sample_rate as usize * 30) / 1000;
    if frame_len == 0 {
        return Err("Invalid WAV sample rate".to_string());
    }

    let mut frame: Vec<i16> = Vec::with_capacity(frame_len);
    let mut total_frames: usize = 0;
    let mut speech_frames: usize = 0;
    let mut total_samples: u64 = 0;
    let mut sum_squares: u128 = 0;
    let mut peak_abs: i32 = 0;

    for sample in reader.samples::<i16>() {
        let sample = sample.map_err(|e| format!("Read WAV sample: {}", e))?;

        let sample_i32 = i32::from(sample);
        peak_abs = peak_abs.max(sample_i32.abs());
        sum_squares += sample_i32.pow(2) as u128;
        total_samples += 1;

        frame.push(sample);
        if frame.len() == frame_len {
            total_frames += 1;
            if vad.is_voice_segment(&frame).unwrap_or(false) {
                speech_frames += 1;
            }
            frame.clear();
        }
    }

    let rms = if total_samples > 0 {
        ((sum_squares as f64 / total_samples as f64).sqrt()) as f32
    } else {
        0.0
    };

    let stats = VadStats {
        total_frames,
        speech_frames,
        total_samples,
        peak_abs,
        rms,
    };

    log::debug!(
        "VAD: {:?} speech_frames={}/{}, ratio={:.2}, rms={:.0}, peak_abs={}, crest_factor={:.1}",
        path,
        stats.speech_frames,
        stats.total_frames,
        stats.speech_ratio(),
        stats.rms,
        stats.peak_abs,
        stats.crest_factor()
    );

    Ok(stats)
}
