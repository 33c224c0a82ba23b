//! Microphone capture.
//!
//! Opens the default input device at its native configuration and delivers
//! mono 16kHz f32 chunks over an unbounded channel. Format conversion,
//! channel downmix, and resampling all happen on the capture side so the
//! pipeline only ever sees its own rate.
//!
//! The cpal stream is not `Send` on every platform, so it lives on a
//! dedicated thread for its whole lifetime; the handle signals that thread
//! to shut down.

use std::fmt;
use std::sync::mpsc as std_mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::FromSample;
use tokio::sync::mpsc;

use crate::pipeline::PIPELINE_SAMPLE_RATE;

/// Samples per emitted chunk at the pipeline rate (100ms).
const CHUNK_SAMPLES: usize = PIPELINE_SAMPLE_RATE as usize / 10;

#[derive(Debug)]
pub enum CaptureError {
    /// No default input device is available
    NoDevice,
    /// Device configuration could not be read
    Device(String),
    /// The input stream could not be built or started
    Stream(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::NoDevice => write!(f, "no default input device available"),
            CaptureError::Device(msg) => write!(f, "input device error: {}", msg),
            CaptureError::Stream(msg) => write!(f, "input stream error: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Keeps the capture thread alive; dropping without `stop()` also shuts
/// the stream down.
pub struct CaptureHandle {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CaptureHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender unblocks the capture thread's recv.
        self.stop_tx.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start capturing from the default input device.
///
/// Fixed-size mono chunks at the pipeline rate arrive on `chunk_tx` until
/// the handle is stopped or the device fails.
pub fn start_capture(
    chunk_tx: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<CaptureHandle, CaptureError> {
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
    let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), CaptureError>>();

    let thread = thread::Builder::new()
        .name("auricle-capture".into())
        .spawn(move || {
            let stream = match open_default_stream(chunk_tx) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            // Block until the handle drops its sender; the stream stays
            // alive (and capturing) for exactly that long.
            let _ = stop_rx.recv();
            drop(stream);
        })
        .map_err(|e| CaptureError::Stream(e.to_string()))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(CaptureHandle {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(CaptureError::Stream("capture thread died during startup".into()))
        }
    }
}

fn open_default_stream(
    chunk_tx: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<cpal::Stream, CaptureError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or(CaptureError::NoDevice)?;
    let name = device.name().unwrap_or_else(|_| "unknown".into());

    let default_config = device
        .default_input_config()
        .map_err(|e| CaptureError::Device(e.to_string()))?;
    let sample_format = default_config.sample_format();
    let config: cpal::StreamConfig = default_config.into();

    tracing::info!(
        device = %name,
        rate = config.sample_rate.0,
        channels = config.channels,
        format = ?sample_format,
        "opening input stream"
    );

    let feed = ChunkFeed::new(config.channels as usize, config.sample_rate.0, chunk_tx);
    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, feed),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, feed),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, feed),
        other => {
            return Err(CaptureError::Device(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    }?;

    stream
        .play()
        .map_err(|e| CaptureError::Stream(e.to_string()))?;
    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut feed: ChunkFeed,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                feed.push_interleaved(data);
            },
            |err| tracing::warn!(error = %err, "input stream error"),
            None,
        )
        .map_err(|e| CaptureError::Stream(e.to_string()))
}

/// Downmixes interleaved device frames to mono, resamples to the pipeline
/// rate, and emits fixed-size chunks. Runs entirely on the audio thread.
struct ChunkFeed {
    channels: usize,
    resampler: RateConverter,
    pending: Vec<f32>,
    tx: mpsc::UnboundedSender<Vec<f32>>,
    closed: bool,
}

impl ChunkFeed {
    fn new(channels: usize, device_rate: u32, tx: mpsc::UnboundedSender<Vec<f32>>) -> Self {
        Self {
            channels: channels.max(1),
            resampler: RateConverter::new(device_rate, PIPELINE_SAMPLE_RATE),
            pending: Vec::with_capacity(CHUNK_SAMPLES * 2),
            tx,
            closed: false,
        }
    }

    fn push_interleaved<T>(&mut self, data: &[T])
    where
        T: cpal::SizedSample,
        f32: cpal::FromSample<T>,
    {
        if self.closed {
            return;
        }
        for frame in data.chunks_exact(self.channels) {
            let mut sum = 0.0f32;
            for sample in frame {
                sum += f32::from_sample_(*sample);
            }
            let mono = sum / self.channels as f32;
            self.resampler.push(mono, &mut self.pending);
        }

        while self.pending.len() >= CHUNK_SAMPLES {
            let chunk: Vec<f32> = self.pending.drain(..CHUNK_SAMPLES).collect();
            if self.tx.send(chunk).is_err() {
                // Receiver is gone; the service is shutting down.
                self.closed = true;
                return;
            }
        }
    }
}

/// Linear-interpolating sample-rate converter.
///
/// Quality is sufficient for speech models; a polyphase resampler would be
/// overkill for a mono 16kHz target.
pub struct RateConverter {
    /// Input samples per output sample
    step: f64,
    /// Time of the next output sample, in input-sample units
    next_out: f64,
    /// Time of the most recent input sample
    in_time: u64,
    prev: f32,
    primed: bool,
}

impl RateConverter {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            step: input_rate as f64 / output_rate as f64,
            next_out: 0.0,
            in_time: 0,
            prev: 0.0,
            primed: false,
        }
    }

    /// Feed one input sample; append any output samples produced to `out`.
    pub fn push(&mut self, sample: f32, out: &mut Vec<f32>) {
        if !self.primed {
            self.primed = true;
            self.prev = sample;
            while self.next_out <= 0.0 {
                out.push(sample);
                self.next_out += self.step;
            }
            return;
        }

        self.in_time += 1;
        let now = self.in_time as f64;
        while self.next_out <= now {
            let t = (self.next_out - (now - 1.0)) as f32;
            out.push(self.prev + (sample - self.prev) * t);
            self.next_out += self.step;
        }
        self.prev = sample;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(input_rate: u32, output_rate: u32, samples: &[f32]) -> Vec<f32> {
        let mut converter = RateConverter::new(input_rate, output_rate);
        let mut out = Vec::new();
        for &s in samples {
            converter.push(s, &mut out);
        }
        out
    }

    #[test]
    fn test_identity_rate_passthrough() {
        let input: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let out = convert(16_000, 16_000, &input);
        assert_eq!(out, input);
    }

    #[test]
    fn test_downsample_ratio() {
        let input = vec![0.5; 48_000];
        let out = convert(48_000, 16_000, &input);
        // One second of input yields one second of output, within a sample.
        assert!((out.len() as i64 - 16_000).abs() <= 1, "len = {}", out.len());
        assert!(out.iter().all(|s| (*s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_upsample_interpolates() {
        let out = convert(8_000, 16_000, &[0.0, 1.0]);
        // Doubling the rate inserts the midpoint between the two samples.
        assert_eq!(out.len(), 3);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_downsample_ramp_stays_monotonic() {
        let input: Vec<f32> = (0..441).map(|i| i as f32 / 441.0).collect();
        let out = convert(44_100, 16_000, &input);
        assert!(out.windows(2).all(|w| w[1] >= w[0]));
        assert!((out.len() as i64 - 160).abs() <= 1);
    }
}
