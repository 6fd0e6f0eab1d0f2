//! Preset audio assets.

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use parley_core::AudioFrame;
use std::io::Cursor;
use std::path::Path;

/// Size of the frames an asset is split into when streamed to the client.
pub const ASSET_FRAME_BYTES: usize = 960;

/// Reads an audio asset from disk and splits it into outbound frames.
///
/// A WAV file is unwrapped to its 16-bit PCM samples (little endian). Any
/// other file is forwarded as-is and must already be in the client's
/// playback encoding.
pub async fn load_audio_asset(path: &Path) -> Result<Vec<AudioFrame>> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read audio asset {}", path.display()))?;
    let data = if is_wav(&data) {
        wav_to_pcm16(&data).with_context(|| format!("invalid WAV asset {}", path.display()))?
    } else {
        data
    };
    if data.is_empty() {
        bail!("audio asset {} is empty", path.display());
    }
    let data = Bytes::from(data);
    Ok((0..data.len())
        .step_by(ASSET_FRAME_BYTES)
        .map(|start| data.slice(start..(start + ASSET_FRAME_BYTES).min(data.len())))
        .collect())
}

fn is_wav(data: &[u8]) -> bool {
    data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WAVE"
}

fn wav_to_pcm16(data: &[u8]) -> Result<Vec<u8>> {
    let mut reader = hound::WavReader::new(Cursor::new(data))?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!(
            "unsupported WAV encoding: {:?} {} bit",
            spec.sample_format,
            spec.bits_per_sample
        );
    }
    let mut pcm = Vec::with_capacity(reader.len() as usize * 2);
    for sample in reader.samples::<i16>() {
        pcm.extend_from_slice(&sample?.to_le_bytes());
    }
    Ok(pcm)
}
