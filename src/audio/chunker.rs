//! WAV framing for batch archives.
//!
//! The capture session produces one header template (a short run of
//! silence recorded immediately on start) and a stream of raw PCM chunks.
//! Prefixing any chunk run with the template and patching the RIFF sizes
//! yields a standalone decodable file, so every batch - including the
//! first - can be decoded without the rest of the capture.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

const RIFF_SIZE_OFFSET: usize = 4;
const DATA_SIZE_OFFSET: usize = 40;
pub const WAV_HEADER_LEN: usize = 44;

/// Builds the reusable header template from the silence captured at the
/// start of the session. The template is a complete little WAV file; its
/// size fields are patched per-archive by `compose_archive`.
pub fn header_template(
    silence: impl Iterator<Item = u8>,
    sample_rate: u32,
    channels: u16,
) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        let bytes: Vec<u8> = silence.collect();
        for pair in bytes.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Concatenates the header template with a run of PCM chunks and patches
/// the RIFF/data chunk sizes to cover the appended payload.
pub fn compose_archive<'a>(
    template: &[u8],
    chunks: impl Iterator<Item = &'a [u8]>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(template.len());
    out.extend_from_slice(template);
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    patch_sizes(&mut out);
    out
}

fn patch_sizes(archive: &mut [u8]) {
    if archive.len() < WAV_HEADER_LEN {
        return;
    }
    let riff_size = (archive.len() - 8) as u32;
    let data_size = (archive.len() - WAV_HEADER_LEN) as u32;
    archive[RIFF_SIZE_OFFSET..RIFF_SIZE_OFFSET + 4].copy_from_slice(&riff_size.to_le_bytes());
    archive[DATA_SIZE_OFFSET..DATA_SIZE_OFFSET + 4].copy_from_slice(&data_size.to_le_bytes());
}
