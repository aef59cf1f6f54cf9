use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::level::rms_level;
use crate::kernel::event::{CapturedChunk, Event};

/// Window each captured chunk covers.
const CHUNK_MS: u64 = 100;

/// The single capture resource. Owns the cpal input stream and the bridge
/// thread that slices the raw sample feed into chunk + level events for
/// the kernel channel. Dropped only on full teardown.
pub struct CaptureStream {
    _stream: cpal::Stream,
    pub sample_rate: u32,
    pub channels: u16,
}

impl CaptureStream {
    pub fn new(tx: mpsc::Sender<Event>) -> Result<Self, anyhow::Error> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No input device available"))?;

        info!("Audio Input Device: {}", device.name().unwrap_or_default());

        // Prefer common rates; fall back to whatever the device defaults to.
        let target_rates = [48_000, 44_100, 16_000];
        let mut selected_config = None;
        for &rate in &target_rates {
            let configs = device.supported_input_configs()?;
            for config_range in configs {
                if config_range.min_sample_rate().0 <= rate
                    && config_range.max_sample_rate().0 >= rate
                {
                    selected_config = Some(config_range.with_sample_rate(cpal::SampleRate(rate)));
                    break;
                }
            }
            if selected_config.is_some() {
                break;
            }
        }
        let config = match selected_config {
            Some(c) => c,
            None => device.default_input_config()?,
        };

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        info!("Audio Config Selected: Rate={}Hz, Channels={}", sample_rate, channels);

        // One second of headroom between the audio callback and the bridge.
        let rb = HeapRb::<f32>::new(sample_rate as usize * channels as usize);
        let (mut producer, consumer) = rb.split();

        let err_tx = tx.clone();
        let err_fn = move |err: cpal::StreamError| {
            error!("an error occurred on input stream: {}", err);
            let _ = err_tx.try_send(Event::CaptureError(err.to_string()));
        };

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &_| {
                    // If the ring is full we drop input (lossy at the
                    // device boundary, never inside the segmenter).
                    producer.push_slice(data);
                },
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &_| {
                    for &sample in data {
                        let _ = producer.try_push(sample as f32 / i16::MAX as f32);
                    }
                },
                err_fn,
                None,
            )?,
            _ => return Err(anyhow::anyhow!("Unsupported sample format")),
        };

        stream.play()?;
        Self::spawn_bridge(consumer, tx, sample_rate, channels);

        Ok(Self {
            _stream: stream,
            sample_rate,
            channels,
        })
    }

    /// Bridge thread: pops fixed windows off the ring, emits one chunk and
    /// one level sample per window. Exits when the kernel channel closes.
    fn spawn_bridge<C>(mut consumer: C, tx: mpsc::Sender<Event>, sample_rate: u32, channels: u16)
    where
        C: Consumer<Item = f32> + Send + 'static,
    {
        let frame_len = (sample_rate as usize * channels as usize * CHUNK_MS as usize) / 1000;
        std::thread::spawn(move || {
            let mut window = vec![0.0f32; frame_len];
            loop {
                if consumer.occupied_len() < frame_len {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    continue;
                }
                let _ = consumer.pop_slice(&mut window);

                let level = rms_level(&window);
                let mut bytes = Vec::with_capacity(frame_len * 2);
                for &sample in &window {
                    let v = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    bytes.extend_from_slice(&v.to_le_bytes());
                }

                if tx
                    .blocking_send(Event::Chunk(CapturedChunk {
                        bytes,
                        duration_ms: CHUNK_MS,
                    }))
                    .is_err()
                {
                    break;
                }
                if tx.blocking_send(Event::Level(level)).is_err() {
                    break;
                }
            }
        });
    }
}
