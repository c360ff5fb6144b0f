//! # RIFF/WAVE Container Encoding
//!
//! Pure, deterministic encoding of a raw sample buffer into a WAV file
//! image. Layout per <http://soundfile.sapp.org/doc/WaveFormat/>: a RIFF
//! chunk wrapping a 16-byte `fmt ` sub-chunk and a `data` sub-chunk holding
//! the payload unmodified. All multi-byte header fields are little-endian.
//!
//! Persistence is the caller's problem; encoding itself cannot fail.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};

/// WAVE format code for mu-law companded audio.
pub const MULAW_FORMAT_CODE: u16 = 7;

/// Bits per sample of PCMU payloads.
pub const PCMU_BITS_PER_SAMPLE: u16 = 8;

/// Size of the `fmt ` sub-chunk body.
const FMT_CHUNK_SIZE: u32 = 16;

/// Total header bytes preceding the sample data.
const HEADER_LEN: usize = 44;

/// Build a mu-law WAV file image from raw samples.
///
/// The `data` sub-chunk holds `samples` byte-for-byte; the declared sizes
/// and rates are derived from the arguments:
/// - byte rate = `sample_rate * channels * bits_per_sample / 8`
/// - block align = `channels * bits_per_sample / 8`
/// - RIFF chunk size = `36 + samples.len()`
pub fn encode(samples: &[u8], bits_per_sample: u16, channels: u16, sample_rate: u32) -> Vec<u8> {
    let data_len = samples.len() as u32;
    let bytes_per_sample = u32::from(bits_per_sample) / 8;
    let byte_rate = sample_rate * u32::from(channels) * bytes_per_sample;
    let block_align = channels * bits_per_sample / 8;

    let mut out = Vec::with_capacity(HEADER_LEN + samples.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&FMT_CHUNK_SIZE.to_le_bytes());
    out.extend_from_slice(&MULAW_FORMAT_CODE.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(samples);
    out
}

/// Decoded WAV header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavHeader {
    pub riff_size: u32,
    pub format_code: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_len: u32,
}

impl WavHeader {
    /// Parse the 44-byte header of a single-`fmt `, single-`data` WAV image.
    pub fn parse(bytes: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(bytes);

        expect_magic(&mut cursor, b"RIFF")?;
        let riff_size = cursor.read_u32::<LittleEndian>()?;
        expect_magic(&mut cursor, b"WAVE")?;

        expect_magic(&mut cursor, b"fmt ")?;
        let fmt_size = cursor.read_u32::<LittleEndian>()?;
        if fmt_size != FMT_CHUNK_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected fmt chunk size {}", fmt_size),
            ));
        }
        let format_code = cursor.read_u16::<LittleEndian>()?;
        let channels = cursor.read_u16::<LittleEndian>()?;
        let sample_rate = cursor.read_u32::<LittleEndian>()?;
        let byte_rate = cursor.read_u32::<LittleEndian>()?;
        let block_align = cursor.read_u16::<LittleEndian>()?;
        let bits_per_sample = cursor.read_u16::<LittleEndian>()?;

        expect_magic(&mut cursor, b"data")?;
        let data_len = cursor.read_u32::<LittleEndian>()?;

        Ok(Self {
            riff_size,
            format_code,
            channels,
            sample_rate,
            byte_rate,
            block_align,
            bits_per_sample,
            data_len,
        })
    }
}

fn expect_magic(cursor: &mut Cursor<&[u8]>, magic: &[u8; 4]) -> io::Result<()> {
    let mut found = [0u8; 4];
    cursor.read_exact(&mut found)?;
    if &found != magic {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "expected chunk id {:?}, found {:?}",
                String::from_utf8_lossy(magic),
                String::from_utf8_lossy(&found)
            ),
        ));
    }
    Ok(())
}
