//! Microphone capture bridging cpal to the transcription pipeline
//!
//! The capture manager opens the default input device and produces two
//! outputs from one stream: fixed-size 16 kHz PCM frames over a channel
//! (consumed by the streaming transcription task) and a mono 16 kHz WAV
//! clip on disk (consumed by batch transcription when streaming is
//! unavailable). The WAV is always written, so a mid-stream socket failure
//! never loses the answer.
//!
//! The cpal stream lives on a dedicated thread because stream handles are
//! not Send; the controller only ever touches [`CaptureHandle`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use hound::{WavSpec, WavWriter};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::frame::{downmix_mono, downsample, sample_to_i16, FrameChunker};
use super::paths::generate_wav_path;
use super::AudioError;

/// Channel carrying fixed-size PCM frames to the streaming task
pub type FrameSender = mpsc::Sender<Vec<i16>>;

/// Capture pipeline knobs. Defaults follow the streaming provider's
/// requirements: 16 kHz mono, 1024-sample frames, 180 s ceiling.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Rate delivered downstream (the device may capture higher)
    pub target_sample_rate: u32,
    /// Samples per frame pushed to the frame channel
    pub frame_size: usize,
    /// Hard ceiling on a single recording
    pub max_duration: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            frame_size: 1024,
            max_duration: Duration::from_secs(180),
        }
    }
}

type SharedWriter = Arc<Mutex<Option<WavWriter<std::io::BufWriter<std::fs::File>>>>>;

/// Handle to an active capture.
///
/// Stopping tears down deterministically: the callback is silenced, the
/// audio thread drops the cpal stream (releasing the device only after
/// the processing graph stops), then the WAV is finalized. Dropping the
/// handle releases the frame sender, which is the end-of-stream signal
/// downstream.
pub struct CaptureHandle {
    stop_tx: std_mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
    writer: SharedWriter,
    is_capturing: Arc<AtomicBool>,
    wav_path: PathBuf,
    started_at: Instant,
}

impl CaptureHandle {
    /// Stop capturing and finalize the WAV clip.
    ///
    /// Returns with the clip path; transcript events still in flight on
    /// the network are the caller's concern, not the device's.
    pub fn stop(mut self) -> Result<PathBuf, AudioError> {
        self.is_capturing.store(false, Ordering::SeqCst);

        // Release order matters: the audio thread drops the stream before
        // we finalize the WAV, so no callback races the finalize.
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }

        let mut writer_guard = self
            .writer
            .lock()
            .map_err(|_| AudioError::WriteFailed("writer lock poisoned".to_string()))?;
        if let Some(writer) = writer_guard.take() {
            writer
                .finalize()
                .map_err(|e| AudioError::WriteFailed(e.to_string()))?;
        }

        log::info!(
            "Capture stopped after {:?}, clip finalized: {:?}",
            self.started_at.elapsed(),
            self.wav_path
        );
        Ok(self.wav_path)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn wav_path(&self) -> &PathBuf {
        &self.wav_path
    }
}

/// Microphone capture manager over the default input device.
///
/// Device discovery happens at start time, on the audio thread, so a
/// machine without a microphone fails the recording attempt rather than
/// controller construction.
pub struct AudioCaptureManager {
    config: CaptureConfig,
}

impl AudioCaptureManager {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Start capturing.
    ///
    /// Frames go to `frames` in capture order (dropped, never blocked on,
    /// if the consumer lags, since the audio callback must not stall). The full
    /// clip goes to a WAV file regardless of what happens to the frames.
    ///
    /// Blocks briefly while the device opens; call from a blocking task.
    pub fn start(
        &self,
        attempt_id: Uuid,
        frames: FrameSender,
    ) -> Result<(CaptureHandle, PathBuf), AudioError> {
        let wav_path = generate_wav_path(attempt_id)
            .map_err(|e| AudioError::FileCreationFailed(e.to_string()))?;

        let spec = WavSpec {
            channels: 1,
            sample_rate: self.config.target_sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = WavWriter::create(&wav_path, spec)
            .map_err(|e| AudioError::FileCreationFailed(e.to_string()))?;

        let writer: SharedWriter = Arc::new(Mutex::new(Some(writer)));
        let is_capturing = Arc::new(AtomicBool::new(true));
        let started_at = Instant::now();

        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), AudioError>>();

        let config = self.config.clone();
        let thread_writer = writer.clone();
        let thread_flag = is_capturing.clone();
        let thread = std::thread::spawn(move || {
            audio_thread(
                config,
                thread_writer,
                thread_flag,
                frames,
                started_at,
                ready_tx,
                stop_rx,
            );
        });

        // Wait for the stream to come up (or the thread to report why not)
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                return Err(AudioError::StreamCreationFailed(
                    "audio thread exited before reporting readiness".to_string(),
                ));
            }
        }

        log::info!("Capture started: {:?}", wav_path);

        let handle = CaptureHandle {
            stop_tx,
            thread: Some(thread),
            writer,
            is_capturing,
            wav_path: wav_path.clone(),
            started_at,
        };

        Ok((handle, wav_path))
    }
}

/// Owns the cpal stream for the lifetime of one capture.
fn audio_thread(
    config: CaptureConfig,
    writer: SharedWriter,
    is_capturing: Arc<AtomicBool>,
    frames: FrameSender,
    started_at: Instant,
    ready_tx: std_mpsc::Sender<Result<(), AudioError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let host = cpal::default_host();

    let device = match host.default_input_device() {
        Some(d) => d,
        None => {
            let _ = ready_tx.send(Err(AudioError::MicrophoneUnavailable));
            return;
        }
    };

    log::info!("Using audio input device: {:?}", device.name());

    let supported_config = match device.default_input_config() {
        Ok(c) => c,
        Err(_) => {
            let _ = ready_tx.send(Err(AudioError::NoSupportedConfig));
            return;
        }
    };

    log::info!(
        "Device config: {} Hz, {} channels, {:?}",
        supported_config.sample_rate().0,
        supported_config.channels(),
        supported_config.sample_format()
    );

    let sample_format = supported_config.sample_format();
    let device_config: cpal::StreamConfig = supported_config.into();

    let err_fn = |err| log::error!("Audio stream error: {}", err);

    let stream_result = match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(
            &device, &device_config, &config, writer, is_capturing, frames, started_at, err_fn,
        ),
        SampleFormat::U16 => build_stream_typed::<u16>(
            &device, &device_config, &config, writer, is_capturing, frames, started_at, err_fn,
        ),
        SampleFormat::F32 => build_stream_typed::<f32>(
            &device, &device_config, &config, writer, is_capturing, frames, started_at, err_fn,
        ),
        _ => Err(AudioError::NoSupportedConfig),
    };

    let stream = match stream_result {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AudioError::StreamCreationFailed(format!(
            "failed to start stream: {}",
            e
        ))));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Park until stop; the stream drops (and the device releases) when
    // this thread returns
    let _ = stop_rx.recv();
    log::debug!("Audio thread stopping");
}

#[allow(clippy::too_many_arguments)]
fn build_stream_typed<T>(
    device: &cpal::Device,
    device_config: &cpal::StreamConfig,
    config: &CaptureConfig,
    writer: SharedWriter,
    is_capturing: Arc<AtomicBool>,
    frames: FrameSender,
    started_at: Instant,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample<Float = f32> + cpal::SizedSample + Send + 'static,
{
    let channels = device_config.channels;
    let source_rate = device_config.sample_rate.0;
    let target_rate = config.target_sample_rate;
    let max_duration = config.max_duration;
    let mut chunker = FrameChunker::new(config.frame_size);

    let stream = device
        .build_input_stream(
            device_config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !is_capturing.load(Ordering::SeqCst) {
                    return;
                }

                // Hard ceiling inside the callback: past the limit the
                // clip stops growing even before the controller reacts.
                if started_at.elapsed() >= max_duration {
                    is_capturing.store(false, Ordering::SeqCst);
                    return;
                }

                let converted: Vec<i16> = data.iter().map(|&s| sample_to_i16(s)).collect();
                let mono = downmix_mono(&converted, channels);
                let resampled = downsample(&mono, source_rate, target_rate);

                if let Ok(mut guard) = writer.lock() {
                    if let Some(ref mut w) = *guard {
                        for &sample in &resampled {
                            if w.write_sample(sample).is_err() {
                                log::error!("Failed to write WAV sample");
                                break;
                            }
                        }
                    }
                }

                for frame in chunker.push(&resampled) {
                    // try_send: never block the audio thread; a full
                    // channel means the consumer is gone or stalled
                    if frames.try_send(frame).is_err() {
                        log::debug!("Frame channel full or closed, dropping frame");
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_config_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.target_sample_rate, 16_000);
        assert_eq!(config.frame_size, 1024);
        assert_eq!(config.max_duration, Duration::from_secs(180));
    }

    // Requires a working microphone; run manually with: cargo test -- --ignored
    #[test]
    #[ignore]
    fn test_live_capture_round_trip() {
        let manager = AudioCaptureManager::new(CaptureConfig::default());
        let (tx, mut rx) = mpsc::channel(100);

        let (handle, wav_path) = manager.start(Uuid::new_v4(), tx).expect("start failed");
        std::thread::sleep(Duration::from_millis(300));
        let finished = handle.stop().expect("stop failed");
        assert_eq!(finished, wav_path);

        // Some frames should have arrived and the WAV should parse
        assert!(rx.try_recv().is_ok());
        let reader = hound::WavReader::open(&finished).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
    }
}
