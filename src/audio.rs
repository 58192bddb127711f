// Audio output description for the host's streaming PCM track.

use crate::config::{AUDIO_MAX_SAMPLE_RATE, AUDIO_MIN_BUFFER_MILLIS, AUDIO_MIN_SAMPLE_RATE};
use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmEncoding {
    Pcm16,
}

impl PcmEncoding {
    pub fn bytes_per_sample(self) -> u32 {
        match self {
            PcmEncoding::Pcm16 => 2,
        }
    }
}

/// Parameters for a streaming audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTrackSpec {
    pub sample_rate: u32,
    pub channels: u32,
    pub encoding: PcmEncoding,
    /// Smallest buffer the track should be created with, in bytes.
    pub buffer_bytes: u32,
    pub streaming: bool,
}

impl AudioTrackSpec {
    /// Stereo 16-bit PCM in streaming mode.
    pub fn stereo_pcm16(sample_rate: u32) -> BridgeResult<Self> {
        if !(AUDIO_MIN_SAMPLE_RATE..=AUDIO_MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(BridgeError::InvalidArgument(format!(
                "sample rate {} outside {}..={}",
                sample_rate, AUDIO_MIN_SAMPLE_RATE, AUDIO_MAX_SAMPLE_RATE
            )));
        }

        let channels = 2;
        let encoding = PcmEncoding::Pcm16;
        Ok(Self {
            sample_rate,
            channels,
            encoding,
            buffer_bytes: min_buffer_bytes(sample_rate, channels, encoding),
            streaming: true,
        })
    }

    pub fn frame_bytes(&self) -> u32 {
        self.channels * self.encoding.bytes_per_sample()
    }
}

/// Bytes for `AUDIO_MIN_BUFFER_MILLIS` of audio, rounded up to whole frames.
fn min_buffer_bytes(sample_rate: u32, channels: u32, encoding: PcmEncoding) -> u32 {
    let frames = (sample_rate as u64 * AUDIO_MIN_BUFFER_MILLIS as u64).div_ceil(1000);
    (frames * (channels * encoding.bytes_per_sample()) as u64) as u32
}
