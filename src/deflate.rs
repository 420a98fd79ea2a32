//! Thin adapters over the external DEFLATE codecs: flate2 for inflation and
//! zopfli for the slow high-ratio re-encode. Raw streams only, no zlib or
//! gzip framing.

use std::io::Read;
use std::num::NonZeroU64;

use anyhow::Context;
use flate2::read::DeflateDecoder;

/// Encoder knobs, passed through from the command line.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeflateOptions {
    pub num_iterations: u32,
    pub block_splitting: bool,
    /// Maximum number of blocks to split into; 0 means unlimited.
    pub block_splitting_max: u32,
    pub verbose: bool,
    pub verbose_more: bool,
}

impl Default for DeflateOptions {
    fn default() -> Self {
        Self {
            num_iterations: 15,
            block_splitting: true,
            block_splitting_max: 15,
            verbose: false,
            verbose_more: false,
        }
    }
}

/// Decodes a raw DEFLATE stream. `expected_len` only sizes the output buffer;
/// the caller compares the decoded length against the header.
pub fn inflate(bytes: &[u8], expected_len: usize) -> anyhow::Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(bytes);
    let mut out = Vec::with_capacity(expected_len);
    decoder
        .read_to_end(&mut out)
        .context("inflating entry payload")?;
    Ok(out)
}

/// Re-encodes a buffer as a raw DEFLATE stream with the Zopfli encoder.
pub fn deflate(bytes: &[u8], options: &DeflateOptions) -> anyhow::Result<Vec<u8>> {
    let mut encoder_options = zopfli::Options::default();
    encoder_options.iteration_count =
        NonZeroU64::new(u64::from(options.num_iterations)).unwrap_or(NonZeroU64::MIN);
    // A single block is the closest the encoder gets to splitting disabled;
    // 0 requests unlimited splits.
    encoder_options.maximum_block_splits = if options.block_splitting {
        options.block_splitting_max.min(u32::from(u16::MAX)) as u16
    } else {
        1
    };

    let mut out = Vec::with_capacity(bytes.len() / 2 + 16);
    zopfli::compress(encoder_options, zopfli::Format::Deflate, bytes, &mut out)
        .context("running the DEFLATE re-encoder")?;
    if options.verbose_more {
        eprintln!(
            "deflate: {} -> {} bytes ({} iterations)",
            bytes.len(),
            out.len(),
            options.num_iterations
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::read::DeflateEncoder;

    #[test]
    fn inflate_decodes_flate2_output() {
        let plain = b"hello hello hello hello hello".repeat(20);
        let mut encoder = DeflateEncoder::new(&plain[..], Compression::default());
        let mut compressed = Vec::new();
        encoder.read_to_end(&mut compressed).unwrap();

        let decoded = inflate(&compressed, plain.len()).unwrap();
        assert_eq!(decoded, plain);
    }

    #[test]
    fn reencoded_stream_inflates_back() {
        let plain = b"zopfli zopfli zopfli ".repeat(100);
        let compressed = deflate(&plain, &DeflateOptions::default()).unwrap();
        assert_eq!(inflate(&compressed, plain.len()).unwrap(), plain);
    }

    #[test]
    fn reencode_beats_fast_flate2_on_redundant_input() {
        let plain = b"abcdefgh".repeat(4096);
        let mut encoder = DeflateEncoder::new(&plain[..], Compression::fast());
        let mut fast = Vec::new();
        encoder.read_to_end(&mut fast).unwrap();

        let slow = deflate(&plain, &DeflateOptions::default()).unwrap();
        assert!(slow.len() < fast.len());
    }

    #[test]
    fn empty_input_roundtrips() {
        let compressed = deflate(&[], &DeflateOptions::default()).unwrap();
        assert_eq!(inflate(&compressed, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn inflate_rejects_garbage() {
        assert!(inflate(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 16).is_err());
    }
}
