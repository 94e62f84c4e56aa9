//! RIFF/WAVE PCM decoding.
//!
//! Parses a WAV byte payload into mono f32 samples normalized to
//! [-1.0, 1.0], reporting the container's native sample rate. Supported
//! sample encodings:
//!
//! - unsigned 8-bit (offset binary)
//! - signed little-endian 16/24/32-bit integer
//! - 32-bit little-endian IEEE-754 float
//!
//! Multi-channel audio is downmixed to mono by arithmetic mean across
//! channels. Compressed containers (MP3/OGG/WebM/M4A) are not handled
//! here; callers are expected to transcode those externally.

use super::error::AsrError;

/// WAVE format code for integer PCM.
const FORMAT_PCM: u16 = 1;
/// WAVE format code for IEEE-754 float PCM.
const FORMAT_IEEE_FLOAT: u16 = 3;

/// Decoded audio: mono samples at the container's native rate.
#[derive(Debug, Clone, PartialEq)]
pub struct WavAudio {
    /// Mono samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Native sample rate reported by the `fmt ` chunk.
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Copy)]
struct FmtChunk {
    audio_format: u16,
    num_channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Decode a WAV payload into normalized mono f32 samples.
///
/// Walks the RIFF chunk list, reads `fmt ` and `data`, and converts the
/// interleaved PCM body. A zero-length data chunk yields an empty sample
/// buffer, which is not an error.
///
/// # Arguments
/// * `data` - Complete WAV file contents
///
/// # Returns
/// * `Result<WavAudio, AsrError>` - Samples plus native rate, or
///   `MalformedContainer` / `UnsupportedEncoding`
pub fn decode_wav(data: &[u8]) -> Result<WavAudio, AsrError> {
    if data.len() < 44 {
        return Err(AsrError::MalformedContainer(format!(
            "WAV file too small: {} bytes",
            data.len()
        )));
    }
    if &data[0..4] != b"RIFF" {
        return Err(AsrError::MalformedContainer("not a RIFF file".to_string()));
    }
    if &data[8..12] != b"WAVE" {
        return Err(AsrError::MalformedContainer("not a WAVE file".to_string()));
    }

    let mut fmt: Option<FmtChunk> = None;
    let mut offset = 12usize;

    while offset + 8 <= data.len() {
        let chunk_id = &data[offset..offset + 4];
        let chunk_size =
            u32::from_le_bytes([data[offset + 4], data[offset + 5], data[offset + 6], data[offset + 7]])
                as usize;
        let body_start = offset + 8;

        if chunk_id == b"fmt " {
            if chunk_size < 16 || body_start + 16 > data.len() {
                return Err(AsrError::MalformedContainer(
                    "fmt chunk too small".to_string(),
                ));
            }
            let b = &data[body_start..];
            fmt = Some(FmtChunk {
                audio_format: u16::from_le_bytes([b[0], b[1]]),
                num_channels: u16::from_le_bytes([b[2], b[3]]),
                sample_rate: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
                bits_per_sample: u16::from_le_bytes([b[14], b[15]]),
            });
        } else if chunk_id == b"data" {
            let fmt = fmt.ok_or_else(|| {
                AsrError::MalformedContainer("data chunk precedes fmt chunk".to_string())
            })?;
            // Truncated files report a larger data size than is present.
            let body_end = body_start.saturating_add(chunk_size).min(data.len());
            let samples = convert_to_f32(&data[body_start..body_end], fmt)?;
            return Ok(WavAudio {
                samples,
                sample_rate: fmt.sample_rate,
            });
        }

        // Chunk bodies are padded to even length.
        offset = body_start.saturating_add(chunk_size);
        if chunk_size % 2 != 0 {
            offset += 1;
        }
    }

    Err(AsrError::MalformedContainer(
        "no data chunk found".to_string(),
    ))
}

/// Convert interleaved PCM bytes to mono f32, averaging channels.
fn convert_to_f32(data: &[u8], fmt: FmtChunk) -> Result<Vec<f32>, AsrError> {
    if fmt.audio_format != FORMAT_PCM && fmt.audio_format != FORMAT_IEEE_FLOAT {
        return Err(AsrError::UnsupportedEncoding(format!(
            "unsupported audio format code: {} (only PCM supported)",
            fmt.audio_format
        )));
    }
    if fmt.num_channels == 0 {
        return Err(AsrError::MalformedContainer(
            "fmt chunk declares zero channels".to_string(),
        ));
    }
    match fmt.bits_per_sample {
        8 | 16 | 24 | 32 => {}
        other => {
            return Err(AsrError::UnsupportedEncoding(format!(
                "unsupported bits per sample: {}",
                other
            )));
        }
    }

    let bytes_per_sample = fmt.bits_per_sample as usize / 8;
    let channels = fmt.num_channels as usize;
    let frame_size = bytes_per_sample * channels;
    let num_frames = data.len() / frame_size;

    let mut samples = Vec::with_capacity(num_frames);
    for frame in 0..num_frames {
        let mut sum = 0.0f64;
        for ch in 0..channels {
            let offset = (frame * channels + ch) * bytes_per_sample;
            let value = match fmt.bits_per_sample {
                8 => {
                    // Unsigned 8-bit, offset binary
                    data[offset] as f64 / 128.0 - 1.0
                }
                16 => {
                    let sample = i16::from_le_bytes([data[offset], data[offset + 1]]);
                    sample as f64 / 32768.0
                }
                24 => {
                    let b = &data[offset..offset + 3];
                    let mut sample = (b[0] as i32) | ((b[1] as i32) << 8) | ((b[2] as i32) << 16);
                    if sample & 0x80_0000 != 0 {
                        sample |= !0xFF_FFFF; // Sign extend from bit 23
                    }
                    sample as f64 / 8_388_608.0
                }
                32 => {
                    let bytes = [
                        data[offset],
                        data[offset + 1],
                        data[offset + 2],
                        data[offset + 3],
                    ];
                    if fmt.audio_format == FORMAT_IEEE_FLOAT {
                        f32::from_le_bytes(bytes) as f64
                    } else {
                        i32::from_le_bytes(bytes) as f64 / 2_147_483_648.0
                    }
                }
                _ => unreachable!("bit depth validated above"),
            };
            sum += value;
        }
        samples.push((sum / channels as f64) as f32);
    }

    Ok(samples)
}
