//! Audio output - playback of sink buffers using cpal

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use log::warn;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Audio output configuration
#[derive(Clone)]
pub struct AudioConfig {
    /// Sample rate in Hz; must match what the APU was set up with
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Ring buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u32,
}

impl AudioConfig {
    pub fn new() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            buffer_duration_ms: 100,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio output handle
///
/// Owns the cpal stream and a ring buffer bridging the emulation thread and
/// the audio callback.
pub struct AudioOutput {
    _device: Device,
    stream: Stream,
    buffer: Arc<Mutex<VecDeque<i16>>>,
    capacity: usize,
}

impl AudioOutput {
    /// Open the default output device
    pub fn new(config: AudioConfig) -> Result<Self, String> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or("no output device available")?;

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = (config.buffer_duration_ms as usize * config.sample_rate as usize / 1000)
            * config.channels as usize;
        let buffer = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let callback_buffer = Arc::clone(&buffer);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let mut queue = callback_buffer.lock().unwrap();
                    for sample in data.iter_mut() {
                        *sample = queue.pop_front().unwrap_or(0);
                    }
                },
                move |err| {
                    warn!("audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| format!("failed to build output stream: {}", e))?;

        stream
            .play()
            .map_err(|e| format!("failed to start output stream: {}", e))?;

        Ok(Self {
            _device: device,
            stream,
            buffer,
            capacity,
        })
    }

    /// A sink closure for `Apu::set_sink` feeding this output
    ///
    /// Overflowing samples are dropped; the emulation should pace itself
    /// against wall-clock time rather than the audio buffer.
    pub fn sink(&self) -> impl FnMut(&[i16]) + 'static {
        let buffer = Arc::clone(&self.buffer);
        let capacity = self.capacity;
        move |pcm: &[i16]| {
            let mut queue = buffer.lock().unwrap();
            for &sample in pcm {
                if queue.len() >= capacity {
                    break;
                }
                queue.push_back(sample);
            }
        }
    }

    /// Number of queued samples
    pub fn buffered(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    pub fn pause(&self) -> Result<(), String> {
        self.stream.pause().map_err(|e| e.to_string())
    }

    pub fn resume(&self) -> Result<(), String> {
        self.stream.play().map_err(|e| e.to_string())
    }
}
