//! cpal output fed from the session's audio ring buffer
//!
//! The device callback pulls exactly one quantum from the
//! [`AudioConsumer`] per call. The consumer never blocks, so the callback
//! never waits on the frame pump; shortfalls come back as silence.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use retrobridge_core::{AudioConsumer, SamplePair};
use tracing::{debug, error, info};

/// Pairs to pre-allocate for the callback scratch buffer
const SCRATCH_PAIRS: usize = 4096;

/// Live output stream. Dropping it stops playback.
pub struct AudioOutput {
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}

impl AudioOutput {
    /// Open the default output device.
    ///
    /// A stereo config at `preferred_rate` (the core's rate) is used when the
    /// device supports one; otherwise the device default is taken as is.
    pub fn new(consumer: AudioConsumer, preferred_rate: u32, volume: f32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .context("No audio output device available")?;

        let config = match preferred_config(&device, preferred_rate) {
            Some(config) => config,
            None => device
                .default_output_config()
                .context("Failed to get default output config")?,
        };

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        if sample_rate != preferred_rate {
            info!(
                "Audio device runs at {} Hz, core produces {} Hz; playback pitch will differ",
                sample_rate, preferred_rate
            );
        }

        let format = config.sample_format();
        let stream_config: cpal::StreamConfig = config.into();
        let stream = match format {
            cpal::SampleFormat::F32 => {
                build_stream(&device, &stream_config, consumer, volume, |s: f32| s)?
            }
            cpal::SampleFormat::I16 => {
                build_stream(&device, &stream_config, consumer, volume, to_i16)?
            }
            cpal::SampleFormat::U16 => {
                // Unsigned devices center on 0x8000
                build_stream(&device, &stream_config, consumer, volume, to_u16)?
            }
            other => anyhow::bail!("Unsupported sample format: {:?}", other),
        };

        stream.play().context("Failed to play audio stream")?;

        debug!(
            "Audio stream started at {}Hz, {} channel(s), {:?}",
            sample_rate, channels, format
        );

        Ok(Self {
            _stream: stream,
            sample_rate,
            channels,
        })
    }

    /// Output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

fn preferred_config(device: &cpal::Device, rate: u32) -> Option<cpal::SupportedStreamConfig> {
    let ranges = device.supported_output_configs().ok()?;
    let mut candidates: Vec<_> = ranges
        .filter(|range| {
            range.channels() == 2
                && range.min_sample_rate().0 <= rate
                && rate <= range.max_sample_rate().0
        })
        .collect();

    // F32 first, then whatever the device lists
    candidates.sort_by_key(|range| range.sample_format() != cpal::SampleFormat::F32);
    candidates
        .into_iter()
        .next()
        .map(|range| range.with_sample_rate(cpal::SampleRate(rate)))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: AudioConsumer,
    volume: f32,
    convert: fn(f32) -> T,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + Send + 'static,
{
    let channels = usize::from(config.channels.max(1));
    let mut scratch = vec![SamplePair::SILENCE; SCRATCH_PAIRS];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                // Only grows if the device asks for an unusually large quantum
                if scratch.len() < frames {
                    scratch.resize(frames, SamplePair::SILENCE);
                }
                let pairs = &mut scratch[..frames];
                consumer.read_into(pairs);
                write_frames(data, channels, pairs, volume, convert);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .context("Failed to build audio stream")
}

/// Scale by `volume` and clamp to the nominal range
pub fn apply_volume(sample: f32, volume: f32) -> f32 {
    let scaled = sample * volume;
    if scaled.is_nan() {
        0.0
    } else {
        scaled.clamp(-1.0, 1.0)
    }
}

pub fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// 0x8000 is silence
pub fn to_u16(sample: f32) -> u16 {
    (sample * 32767.0 + 32768.0).clamp(0.0, 65535.0) as u16
}

/// Interleave `pairs` into a device buffer with `channels` channels.
///
/// Mono devices get the average of both channels; channels beyond the
/// second are silent.
pub fn write_frames<T: Copy>(
    data: &mut [T],
    channels: usize,
    pairs: &[SamplePair],
    volume: f32,
    convert: fn(f32) -> T,
) {
    let silence = convert(0.0);
    for (frame, pair) in data.chunks_mut(channels).zip(pairs) {
        let left = apply_volume(pair.left, volume);
        let right = apply_volume(pair.right, volume);
        match frame {
            [mono] => *mono = convert((left + right) * 0.5),
            [l, r, rest @ ..] => {
                *l = convert(left);
                *r = convert(right);
                rest.fill(silence);
            }
            [] => {}
        }
    }

    // Any trailing partial frame
    let written = pairs.len() * channels;
    if written < data.len() {
        data[written..].fill(silence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_scales_and_clamps() {
        assert_eq!(apply_volume(0.5, 0.5), 0.25);
        assert_eq!(apply_volume(2.0, 1.0), 1.0);
        assert_eq!(apply_volume(-3.0, 0.8), -1.0);
        assert_eq!(apply_volume(f32::NAN, 1.0), 0.0);
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(to_i16(0.0), 0);
        assert_eq!(to_i16(1.0), 32767);
        assert_eq!(to_i16(-1.0), -32767);
        assert_eq!(to_u16(0.0), 32768);
        assert_eq!(to_u16(1.0), 65535);
        assert_eq!(to_u16(-1.0), 1);
    }

    #[test]
    fn test_stereo_frames_interleave() {
        let pairs = [SamplePair::new(0.5, -0.5), SamplePair::new(0.25, 0.0)];
        let mut data = [9.0f32; 4];

        write_frames(&mut data, 2, &pairs, 1.0, |s| s);

        assert_eq!(data, [0.5, -0.5, 0.25, 0.0]);
    }

    #[test]
    fn test_mono_device_averages() {
        let pairs = [SamplePair::new(1.0, 0.0), SamplePair::new(0.5, 0.5)];
        let mut data = [9.0f32; 2];

        write_frames(&mut data, 1, &pairs, 1.0, |s| s);

        assert_eq!(data, [0.5, 0.5]);
    }

    #[test]
    fn test_extra_channels_are_silent() {
        let pairs = [SamplePair::new(0.5, 0.5)];
        let mut data = [1u16; 6];

        write_frames(&mut data, 6, &pairs, 1.0, to_u16);

        assert_eq!(data[2..], [32768; 4]);
        assert_eq!(data[0], to_u16(0.5));
    }

    #[test]
    fn test_volume_applied_per_sample() {
        let pairs = [SamplePair::new(1.0, 1.0)];
        let mut data = [0i16; 2];

        write_frames(&mut data, 2, &pairs, 0.5, to_i16);

        assert_eq!(data, [16383, 16383]);
    }

    #[test]
    fn test_consumer_underrun_plays_silence() {
        let (_producer, mut consumer) = retrobridge_core::AudioRingBuffer::new(8);
        let mut pairs = [SamplePair::new(1.0, 1.0); 3];
        let mut data = [7.0f32; 6];

        consumer.read_into(&mut pairs);
        write_frames(&mut data, 2, &pairs, 1.0, |s| s);

        assert_eq!(data, [0.0; 6]);
        assert_eq!(consumer.metrics().snapshot().silent_samples, 3);
    }
}
