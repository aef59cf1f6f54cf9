use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use rubato::{FftFixedIn, Resampler};
use tracing::{error, info, warn};

const RESAMPLER_CHUNK: usize = 1024;

/// Raw samples produced by decoding a batch archive.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }
}

/// Turns a composed batch archive back into playable samples.
#[allow(async_fn_in_trait)]
pub trait AudioDecoder {
    async fn decode(&self, archive: &[u8]) -> Result<DecodedAudio, String>;
}

/// WAV decoder for the archives the segmenter composes.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl AudioDecoder for WavDecoder {
    async fn decode(&self, archive: &[u8]) -> Result<DecodedAudio, String> {
        let reader = hound::WavReader::new(Cursor::new(archive)).map_err(|e| e.to_string())?;
        let spec = reader.spec();
        let samples: Result<Vec<f32>, _> = reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect();
        let samples = samples.map_err(|e| e.to_string())?;
        Ok(DecodedAudio {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }
}

/// Conforms decoded audio to the output stream's rate and channel
/// count: downmix to mono, resample, then fan out across the output
/// channels. Without this a rate mismatch pitch-shifts playback and the
/// ring drains out of step with the scheduler's timeline.
pub fn conform(audio: &DecodedAudio, out_rate: u32, out_channels: u16) -> Vec<f32> {
    let in_channels = audio.channels.max(1) as usize;
    let mono: Vec<f32> = audio
        .samples
        .chunks(in_channels)
        .map(|frame| frame.iter().sum::<f32>() / in_channels as f32)
        .collect();

    let mono = if audio.sample_rate == out_rate || audio.sample_rate == 0 {
        mono
    } else {
        resample(&mono, audio.sample_rate, out_rate)
    };

    if out_channels <= 1 {
        return mono;
    }
    let mut out = Vec::with_capacity(mono.len() * out_channels as usize);
    for sample in mono {
        for _ in 0..out_channels {
            out.push(sample);
        }
    }
    out
}

fn resample(mono: &[f32], in_rate: u32, out_rate: u32) -> Vec<f32> {
    let mut resampler = match FftFixedIn::<f32>::new(
        in_rate as usize,
        out_rate as usize,
        RESAMPLER_CHUNK,
        1,
        1,
    ) {
        Ok(r) => r,
        Err(e) => {
            error!("resampler construction failed: {e}");
            return mono.to_vec();
        }
    };

    let expected = (mono.len() as u64 * out_rate as u64 / in_rate as u64) as usize;
    let mut out = Vec::with_capacity(expected);
    let mut chunk = vec![0.0f32; RESAMPLER_CHUNK];
    for input in mono.chunks(RESAMPLER_CHUNK) {
        // The final chunk is zero-padded up to the fixed input size.
        chunk[..input.len()].copy_from_slice(input);
        chunk[input.len()..].fill(0.0);
        match resampler.process(&[&chunk[..]], None) {
            Ok(resampled) => out.extend_from_slice(&resampled[0]),
            Err(e) => warn!("resample chunk failed: {e}"),
        }
    }
    out.truncate(expected);
    out
}

/// Silence samples to push ahead of a batch so it starts sounding at
/// `start_ms` rather than as soon as the ring's current contents drain.
/// Zero whenever the batch chains gaplessly onto buffered audio.
pub fn lead_in_samples(
    start_ms: u64,
    now_ms: u64,
    buffered: usize,
    sample_rate: u32,
    channels: u16,
) -> usize {
    let per_sec = sample_rate as u64 * channels as u64;
    if per_sec == 0 {
        return 0;
    }
    let buffered_ms = buffered as u64 * 1000 / per_sec;
    let ring_end_ms = now_ms + buffered_ms;
    let gap_ms = start_ms.saturating_sub(ring_end_ms);
    (gap_ms * per_sec / 1000) as usize
}

/// The single output resource. One shared gain control (for the
/// activation ramp) and one level analyser (for metering) sit on this
/// path; both are reused across sessions and torn down only on abort.
pub trait PlaybackSink {
    /// Queues a batch so its first sample sounds at `start_ms`.
    fn play(&mut self, audio: &DecodedAudio, start_ms: u64, now_ms: u64);
    fn set_gain(&mut self, gain: f32);
    fn gain(&self) -> f32;
    fn output_level(&self) -> f32;
}

/// cpal-backed sink. Scheduled batches are pushed into a ring buffer the
/// output callback drains in real time; the callback writes silence when
/// the buffer is empty, so sequential pushes stay gapless.
pub struct CpalSink {
    _stream: cpal::Stream,
    producer: HeapProd<f32>,
    sample_rate: u32,
    channels: u16,
    gain_bits: Arc<AtomicU32>,
    level_bits: Arc<AtomicU32>,
}

impl CpalSink {
    pub fn new() -> Result<Self, anyhow::Error> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("No output device available"))?;
        let config = device.default_output_config()?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        info!(
            "Audio Output Device: {} ({}Hz, {} ch)",
            device.name().unwrap_or_default(),
            sample_rate,
            channels
        );

        // Ten seconds of headroom at the device rate.
        let capacity = sample_rate as usize * channels as usize * 10;
        let rb = HeapRb::<f32>::new(capacity);
        let (producer, mut consumer) = rb.split();

        let gain_bits = Arc::new(AtomicU32::new(1.0f32.to_bits()));
        let level_bits = Arc::new(AtomicU32::new(0u32));
        let gain_cb = gain_bits.clone();
        let level_cb = level_bits.clone();

        let err_fn = |err| error!("an error occurred on output stream: {}", err);
        let stream = device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &_| {
                let gain = f32::from_bits(gain_cb.load(Ordering::Relaxed));
                let mut sq_sum = 0.0f32;
                for slot in data.iter_mut() {
                    let sample = consumer.try_pop().unwrap_or(0.0) * gain;
                    sq_sum += sample * sample;
                    *slot = sample;
                }
                if !data.is_empty() {
                    let rms = (sq_sum / data.len() as f32).sqrt();
                    level_cb.store(rms.to_bits(), Ordering::Relaxed);
                }
            },
            err_fn,
            None,
        )?;
        stream.play()?;

        Ok(Self {
            _stream: stream,
            producer,
            sample_rate,
            channels,
            gain_bits,
            level_bits,
        })
    }
}

impl PlaybackSink for CpalSink {
    fn play(&mut self, audio: &DecodedAudio, start_ms: u64, now_ms: u64) {
        let samples = conform(audio, self.sample_rate, self.channels);

        // Realize the scheduled start: pad the ring with silence for any
        // gap between what is already buffered and `start_ms`.
        let lead = lead_in_samples(
            start_ms,
            now_ms,
            self.producer.occupied_len(),
            self.sample_rate,
            self.channels,
        );
        if lead > 0 {
            self.producer.push_iter(std::iter::repeat(0.0).take(lead));
        }

        // If the ring is full we drop the tail; the scheduler's duration
        // bookkeeping still advances so the timeline stays monotonic.
        self.producer.push_slice(&samples);
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain_bits
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    fn output_level(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }
}
