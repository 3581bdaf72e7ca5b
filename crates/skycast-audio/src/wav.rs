//! Minimal RIFF/WAVE reader and writer for 16-bit PCM.

use skycast_core::error::SkycastError;

/// MIME type of blobs produced by [`encode_wav`].
pub const WAV_MIME: &str = "audio/wav";

const HEADER_LEN: usize = 44;

/// Decoded 16-bit PCM audio as interleaved f32 samples.
#[derive(Debug, Clone, PartialEq)]
pub struct WavClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl WavClip {
    /// Length of the clip in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }
}

fn header(data_len: u32, sample_rate: u32, channels: u16) -> Vec<u8> {
    let block_align = channels * 2;
    let byte_rate = sample_rate * block_align as u32;

    let mut out = Vec::with_capacity(HEADER_LEN + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out
}

/// Encode interleaved f32 samples in [-1.0, 1.0] as 16-bit PCM WAV.
///
/// Out-of-range samples are clamped.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
    let mut out = header((samples.len() * 2) as u32, sample_rate, channels);
    for s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Wrap raw little-endian 16-bit PCM in a WAV header. A trailing odd byte is dropped.
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Vec<u8> {
    let pcm = &pcm[..pcm.len() - pcm.len() % 2];
    let mut out = header(pcm.len() as u32, sample_rate, channels);
    out.extend_from_slice(pcm);
    out
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Decode a 16-bit PCM WAV file.
///
/// Unknown chunks are skipped. A `data` chunk whose declared length runs past
/// the end of the file is read up to the end.
pub fn decode_wav(bytes: &[u8]) -> Result<WavClip, SkycastError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(SkycastError::Audio("not a WAV file".into()));
    }

    let mut format: Option<(u32, u16)> = None;
    let mut data: Option<&[u8]> = None;
    let mut at = 12;
    while at + 8 <= bytes.len() {
        let id = &bytes[at..at + 4];
        let len = u32_at(bytes, at + 4) as usize;
        let start = at + 8;
        let end = start.saturating_add(len).min(bytes.len());
        let body = &bytes[start..end];

        match id {
            b"fmt " => {
                if body.len() < 16 {
                    return Err(SkycastError::Audio("truncated WAV format chunk".into()));
                }
                let audio_format = u16_at(body, 0);
                let channels = u16_at(body, 2);
                let sample_rate = u32_at(body, 4);
                let bits = u16_at(body, 14);
                if audio_format != 1 || bits != 16 {
                    return Err(SkycastError::Audio(format!(
                        "unsupported WAV encoding (format {audio_format}, {bits} bits)"
                    )));
                }
                if channels == 0 || sample_rate == 0 {
                    return Err(SkycastError::Audio("WAV declares no channels".into()));
                }
                format = Some((sample_rate, channels));
            }
            b"data" => data = Some(body),
            _ => {}
        }
        at = end + (len & 1);
    }

    let (sample_rate, channels) =
        format.ok_or_else(|| SkycastError::Audio("WAV has no format chunk".into()))?;
    let data = data.ok_or_else(|| SkycastError::Audio("WAV has no data chunk".into()))?;
    let samples = data
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
        .collect();

    Ok(WavClip {
        samples,
        sample_rate,
        channels,
    })
}
