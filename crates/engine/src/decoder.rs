use crate::error::{EngineError, EngineResult};
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

/// Packet-by-packet decoder for one media file
pub struct AudioDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    spec: SignalSpec,
    time_base: Option<TimeBase>,
    duration_secs: f64,
}

/// Interleaved samples from one packet
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub spec: SignalSpec,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.spec.channels.count().max(1)
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.spec.rate.max(1) as f64
    }
}

impl AudioDecoder {
    pub fn new(path: &Path) -> EngineResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                EngineError::Decode(format!("Failed to open {}: {}", path.display(), e))
            }
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions {
                    enable_gapless: true,
                    ..Default::default()
                },
                &MetadataOptions::default(),
            )
            .map_err(|e| EngineError::Decode(format!("Failed to probe format: {}", e)))?;

        let reader = probed.format;

        let track = reader
            .default_track()
            .ok_or_else(|| EngineError::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| EngineError::Decode(format!("Failed to create decoder: {}", e)))?;

        let spec = SignalSpec::new(
            codec_params.sample_rate.unwrap_or(44100),
            codec_params.channels.unwrap_or_default(),
        );

        let time_base = codec_params.time_base;
        let duration_secs = codec_params
            .n_frames
            .map(|frames| ts_to_secs(frames, time_base, spec.rate))
            .unwrap_or(0.0);

        Ok(Self {
            reader,
            decoder,
            track_id,
            spec,
            time_base,
            duration_secs,
        })
    }

    /// Returns the next packet's samples, or `None` at end of stream
    pub fn decode_next(&mut self) -> EngineResult<Option<DecodedAudio>> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(e) => {
                    return Err(EngineError::Decode(format!("Failed to read packet: {}", e)));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Decode error, skipping packet: {}", e);
                    continue;
                }
                Err(e) => {
                    return Err(EngineError::Decode(format!("Failed to decode packet: {}", e)));
                }
            };

            let spec = *decoded.spec();
            let samples = interleave(decoded);

            return Ok(Some(DecodedAudio { samples, spec }));
        }
    }

    pub fn spec(&self) -> &SignalSpec {
        &self.spec
    }

    /// Total length from the container header; zero when unknown
    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    /// Seeks to `time_secs` and returns the position actually reached
    pub fn seek(&mut self, time_secs: f64) -> EngineResult<f64> {
        let seeked = self
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(time_secs.max(0.0)),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| EngineError::Seek(format!("Failed to seek to {:.1}s: {}", time_secs, e)))?;

        self.decoder.reset();

        Ok(ts_to_secs(seeked.required_ts, self.time_base, self.spec.rate))
    }
}

/// Reads a file's duration without decoding it
pub fn probe_duration(path: &Path) -> EngineResult<f64> {
    Ok(AudioDecoder::new(path)?.duration_secs())
}

fn ts_to_secs(ts: u64, time_base: Option<TimeBase>, rate: u32) -> f64 {
    match time_base {
        Some(tb) => {
            let time = tb.calc_time(ts);
            time.seconds as f64 + time.frac
        }
        None => ts as f64 / rate.max(1) as f64,
    }
}

fn interleave(decoded: AudioBufferRef<'_>) -> Vec<f32> {
    let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
    sample_buf.copy_interleaved_ref(decoded);
    sample_buf.samples().to_vec()
}
