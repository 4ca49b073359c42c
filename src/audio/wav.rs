//! PCM and WAV conversion helpers

use std::io::{Cursor, Read};
use std::path::Path;

use rubato::{FftFixedIn, Resampler};

use crate::{Error, Result};

/// Resampler input block size in frames
const RESAMPLE_CHUNK: usize = 1024;
const RESAMPLE_SUB_CHUNKS: usize = 2;

/// Decoded audio ready for a sink
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Interleaved samples normalized to [-1, 1)
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioClip {
    /// Decode 16-bit signed little-endian interleaved PCM
    ///
    /// # Errors
    ///
    /// Returns `Error::Format` for an odd byte count, a zero sample rate or
    /// channel count, or a sample count that does not divide into whole frames
    pub fn from_pcm16(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::Format("sample rate must be positive".to_string()));
        }
        if channels == 0 {
            return Err(Error::Format("channel count must be positive".to_string()));
        }
        let samples = decode_pcm16(pcm)?;
        if samples.len() % usize::from(channels) != 0 {
            return Err(Error::Format(format!(
                "{} samples do not divide into {channels} channels",
                samples.len()
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Number of sample frames (one sample per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    /// Playback length in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Re-encode as 16-bit signed little-endian PCM
    #[must_use]
    pub fn to_pcm16(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|&s| f32_to_i16(s).to_le_bytes())
            .collect()
    }

    /// Encode as a 16-bit WAV file
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for &sample in &self.samples {
                writer.write_sample(f32_to_i16(sample))?;
            }
            writer.finalize()?;
        }

        Ok(cursor.into_inner())
    }

    /// Convert to another rate and channel layout
    ///
    /// # Errors
    ///
    /// Returns `Error::Format` if the resampler rejects the rates
    pub fn convert(&self, sample_rate: u32, channels: u16) -> Result<Self> {
        let channels = channels.max(1);
        let mixed = remix(&self.samples, self.channels, channels);
        if sample_rate == self.sample_rate {
            return Ok(Self {
                samples: mixed,
                sample_rate,
                channels,
            });
        }

        let width = usize::from(channels);
        let planes: Vec<Vec<f32>> = (0..width)
            .map(|c| mixed.iter().skip(c).step_by(width).copied().collect())
            .collect();
        let resampled = planes
            .iter()
            .map(|plane| resample(plane, self.sample_rate, sample_rate))
            .collect::<Result<Vec<_>>>()?;

        let frames = resampled.iter().map(Vec::len).min().unwrap_or(0);
        let mut samples = Vec::with_capacity(frames * width);
        for i in 0..frames {
            samples.extend(resampled.iter().map(|plane| plane[i]));
        }

        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }
}

#[allow(clippy::cast_possible_truncation)]
fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Decode 16-bit signed little-endian PCM into normalized floats
///
/// # Errors
///
/// Returns `Error::Format` if the byte count is odd
pub fn decode_pcm16(pcm: &[u8]) -> Result<Vec<f32>> {
    if pcm.len() % 2 != 0 {
        return Err(Error::Format(format!(
            "PCM16 data has odd length {}",
            pcm.len()
        )));
    }
    Ok(pcm
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect())
}

/// Wrap 16-bit PCM in a WAV container
///
/// # Errors
///
/// Returns `Error::Format` for malformed PCM
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    AudioClip::from_pcm16(pcm, sample_rate, channels)?.to_wav()
}

/// Encode mono float samples as a 16-bit WAV file
///
/// # Errors
///
/// Returns an error if encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    AudioClip {
        samples: samples.to_vec(),
        sample_rate,
        channels: 1,
    }
    .to_wav()
}

/// Decode WAV bytes held in memory
///
/// # Errors
///
/// Returns `Error::Wav` if the data is not a WAV file and `Error::Format` for
/// unsupported sample widths
pub fn decode_wav(bytes: &[u8]) -> Result<AudioClip> {
    read_clip(hound::WavReader::new(Cursor::new(bytes))?)
}

/// Read a WAV file from disk
///
/// Accepts 16-bit and 32-bit integer samples and 32-bit float samples.
///
/// # Errors
///
/// Returns `Error::NotFound` if the file is missing, `Error::Wav` if it is not
/// a WAV file and `Error::Format` for unsupported sample widths
pub fn read_wav_file(path: &Path) -> Result<AudioClip> {
    if !path.exists() {
        return Err(Error::NotFound(format!(
            "audio file not found: {}",
            path.display()
        )));
    }
    read_clip(hound::WavReader::open(path)?)
}

fn read_clip<R: Read>(reader: hound::WavReader<R>) -> Result<AudioClip> {
    let spec = reader.spec();
    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / 32768.0))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        #[allow(clippy::cast_precision_loss)]
        (hound::SampleFormat::Int, 32) => reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (hound::SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (format, bits) => {
            return Err(Error::Format(format!(
                "unsupported sample width: {bits}-bit {format:?}"
            )));
        }
    };

    Ok(AudioClip {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Mix interleaved samples to a different channel count
///
/// Down-mixing to mono averages channels; other layouts copy the nearest
/// source channel.
#[must_use]
pub fn remix(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    let (from, to) = (usize::from(from.max(1)), usize::from(to.max(1)));
    if from == to {
        return samples.to_vec();
    }

    samples
        .chunks_exact(from)
        .flat_map(|frame| {
            if to == 1 {
                #[allow(clippy::cast_precision_loss)]
                let mean = frame.iter().sum::<f32>() / from as f32;
                vec![mean]
            } else {
                (0..to).map(|c| frame[c.min(from - 1)]).collect()
            }
        })
        .collect()
}

/// Resample one channel of audio
///
/// The resampler's filter delay is trimmed from the front and flushed with
/// silence at the back, so the output lines up with the input.
///
/// # Errors
///
/// Returns `Error::Format` if the resampler rejects the rates
pub fn resample(input: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || input.is_empty() {
        return Ok(input.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from as usize,
        to as usize,
        RESAMPLE_CHUNK,
        RESAMPLE_SUB_CHUNKS,
        1,
    )
    .map_err(|e| Error::Format(format!("cannot resample {from} Hz to {to} Hz: {e}")))?;

    let expected = (input.len() as u64 * u64::from(to)).div_ceil(u64::from(from));
    let expected = usize::try_from(expected).unwrap_or(usize::MAX);
    let delay = resampler.output_delay();
    let mut out = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    let mut chunks = input.chunks(RESAMPLE_CHUNK);
    while out.len() < expected + delay {
        let mut block = vec![0.0; RESAMPLE_CHUNK];
        if let Some(chunk) = chunks.next() {
            block[..chunk.len()].copy_from_slice(chunk);
        }
        let frames = resampler
            .process(&[block], None)
            .map_err(|e| Error::Format(format!("resampling failed: {e}")))?;
        if frames[0].is_empty() {
            break;
        }
        out.extend_from_slice(&frames[0]);
    }

    out.drain(..delay.min(out.len()));
    out.truncate(expected);
    Ok(out)
}
