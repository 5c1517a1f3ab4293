//! Where decoded samples go
//!
//! The playback thread hands every decoded packet to an [`AudioSink`]. A sink
//! must block for roughly as long as the audio it accepted takes to play,
//! because that is what paces the playback thread in real time.

use crate::error::EngineResult;
use std::time::{Duration, Instant};

pub trait AudioSink: Send {
    /// Queues interleaved samples for playback
    fn write(&mut self, samples: Vec<f32>, sample_rate: u32, channels: u16) -> EngineResult<()>;

    /// Drops anything queued but not yet audible
    fn flush(&mut self) {}
}

/// Discards samples but keeps real-time pace, for headless use
#[derive(Debug)]
pub struct ClockSink {
    /// Wall-clock instant at which everything written so far will have played
    horizon: Option<Instant>,
}

impl ClockSink {
    pub fn new() -> Self {
        Self { horizon: None }
    }
}

impl Default for ClockSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for ClockSink {
    fn write(&mut self, samples: Vec<f32>, sample_rate: u32, channels: u16) -> EngineResult<()> {
        let frames = samples.len() / channels.max(1) as usize;
        let length = Duration::from_secs_f64(frames as f64 / sample_rate.max(1) as f64);

        let now = Instant::now();
        let horizon = self.horizon.filter(|h| *h > now).unwrap_or(now) + length;
        self.horizon = Some(horizon);

        // Stay at most one packet ahead of the clock
        if let Some(wait) = horizon.checked_duration_since(now + length) {
            std::thread::sleep(wait);
        }
        Ok(())
    }

    fn flush(&mut self) {
        self.horizon = None;
    }
}

#[cfg(feature = "device-output")]
pub use device::DeviceSink;

#[cfg(feature = "device-output")]
mod device {
    use super::AudioSink;
    use crate::error::{EngineError, EngineResult};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleRate, Stream, StreamConfig};
    use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Plays samples on the default output device through cpal
    ///
    /// The stream is built lazily for the format of the first packet and
    /// rebuilt if a later packet changes format.
    pub struct DeviceSink {
        stream: Option<(Stream, Sender<Vec<f32>>, u32, u16)>,
        flushed: Arc<AtomicBool>,
    }

    // cpal streams are not Send on every platform; the sink only ever lives
    // on the playback thread that created it.
    unsafe impl Send for DeviceSink {}

    impl DeviceSink {
        pub fn new() -> Self {
            Self {
                stream: None,
                flushed: Arc::new(AtomicBool::new(false)),
            }
        }

        fn open(&self, sample_rate: u32, channels: u16) -> EngineResult<(Stream, Sender<Vec<f32>>)> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| EngineError::Output("No output device available".to_string()))?;
            let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

            let config = StreamConfig {
                channels,
                sample_rate: SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let (tx, rx): (Sender<Vec<f32>>, Receiver<Vec<f32>>) = bounded(4);
            let flushed = Arc::clone(&self.flushed);
            let mut buffer: Vec<f32> = Vec::new();
            let mut position = 0;

            let error_device = device_name.clone();
            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if flushed.swap(false, Ordering::Relaxed) {
                            buffer.clear();
                            position = 0;
                            while rx.try_recv().is_ok() {}
                        }
                        for sample in data.iter_mut() {
                            while position >= buffer.len() {
                                match rx.try_recv() {
                                    Ok(next) => {
                                        buffer = next;
                                        position = 0;
                                    }
                                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                                        *sample = 0.0;
                                        break;
                                    }
                                }
                            }
                            if position < buffer.len() {
                                *sample = buffer[position];
                                position += 1;
                            }
                        }
                    },
                    move |err| {
                        log::error!("Audio output error on device '{}': {}", error_device, err);
                    },
                    None,
                )
                .map_err(|e| EngineError::Output(format!("Failed to build stream: {}", e)))?;

            stream
                .play()
                .map_err(|e| EngineError::Output(format!("Failed to start stream: {}", e)))?;

            log::info!(
                "Audio output opened on '{}' at {} Hz, {} channels",
                device_name,
                sample_rate,
                channels
            );
            Ok((stream, tx))
        }
    }

    impl Default for DeviceSink {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AudioSink for DeviceSink {
        fn write(&mut self, samples: Vec<f32>, sample_rate: u32, channels: u16) -> EngineResult<()> {
            let matches = matches!(&self.stream, Some((_, _, r, c)) if *r == sample_rate && *c == channels);
            if !matches {
                let (stream, tx) = self.open(sample_rate, channels)?;
                self.stream = Some((stream, tx, sample_rate, channels));
            }

            match &self.stream {
                // Blocks while the device queue is full, which paces the caller
                Some((_, tx, _, _)) => tx
                    .send(samples)
                    .map_err(|_| EngineError::Output("Audio stream closed".to_string())),
                None => Err(EngineError::Output("Audio stream not open".to_string())),
            }
        }

        fn flush(&mut self) {
            self.flushed.store(true, Ordering::Relaxed);
        }
    }
}
