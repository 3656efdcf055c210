//! WAV file helpers.
//!
//! Reads metadata from backend output via the hound crate. Tests also
//! write fixture files here.

use std::path::Path;

use hound::WavReader;

/// Metadata read from a WAV header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_sec: f32,
}

/// Reads the header of a WAV file.
pub fn probe_wav(path: &Path) -> hound::Result<WavInfo> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    // duration() counts frames, not interleaved samples
    let frames = reader.duration();
    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        duration_sec: samples_to_duration(frames as usize, spec.sample_rate),
    })
}

/// Calculates the duration of audio in seconds from a frame count.
pub fn samples_to_duration(sample_count: usize, sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    sample_count as f32 / sample_rate as f32
}

/// Number of audio channels written by [`write_wav`] (stereo).
#[cfg(test)]
pub(crate) const CHANNELS: u16 = 2;

/// Writes mono samples to a stereo float WAV fixture.
#[cfg(test)]
pub(crate) fn write_wav(samples: &[f32], path: &Path, sample_rate: u32) -> hound::Result<()> {
    let spec = hound::WavSpec {
        channels: CHANNELS,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in samples {
        // Same sample on left and right
        writer.write_sample(*sample)?;
        writer.write_sample(*sample)?;
    }
    writer.finalize()
}
