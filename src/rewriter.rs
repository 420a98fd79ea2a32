//! Archive rewriter: drives the record state machine over the input stream,
//! fans entries out to the worker pool, and stitches the output back
//! together with recomputed sizes and offsets.
//!
//! The input is consumed strictly forward (`LFH* -> CDFH* -> EOCD`); the
//! output never seeks, offsets are tracked by counting written bytes.

use std::io::{self, Read, Write};

use anyhow::{Context, bail, ensure};

use crate::pipeline::{self, PipelineOptions};
use crate::pool::WorkerPool;
use crate::progress::RewriteProgress;
use crate::records::{
    CentralDirectoryFileHeader, DATA_DESCRIPTOR_SIGNATURE, EndOfCentralDirectory,
    FLAG_DATA_DESCRIPTOR, LocalFileHeader, ZipSignature, read_signature, read_u32,
};
use crate::types::EntryReport;

struct CountingWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    fn position(&self) -> u64 {
        self.position
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// What the rewriter recorded when it wrote entry `i` to the output.
#[derive(Debug, Clone, Copy)]
struct EntryResult {
    compressed_size: u32,
    uncompressed_size: u32,
    offset: u32,
}

#[derive(Debug)]
pub struct RewriteOutcome {
    pub entries: Vec<EntryReport>,
    pub bytes_written: u64,
}

/// Rewrites one archive from `input` into `output`. Entry payloads are
/// recompressed on the pool; results are collected in submission order so the
/// output preserves the input's entry order regardless of completion order.
pub fn rewrite_archive<R: Read, W: Write>(
    input: &mut R,
    output: W,
    options: &PipelineOptions,
    pool: &WorkerPool,
    progress: Option<&RewriteProgress>,
) -> anyhow::Result<RewriteOutcome> {
    let mut out = CountingWriter::new(output);
    let mut handles = Vec::new();

    let mut signature = read_signature(input).context("reading first record signature")?;
    while signature == ZipSignature::LocalFileHeader {
        let mut header = LocalFileHeader::read(input).context("reading local file header")?;
        let mut payload = vec![0u8; header.compressed_size as usize];
        input
            .read_exact(&mut payload)
            .with_context(|| format!("reading payload of {}", header.display_name()))?;
        if header.flags & FLAG_DATA_DESCRIPTOR != 0 {
            consume_data_descriptor(input, &mut header)?;
        }
        let task_options = options.clone();
        handles.push(pool.submit(move || pipeline::recompress_entry(header, payload, &task_options)));
        signature = read_signature(input).context("reading record signature")?;
    }

    if let Some(progress) = progress {
        progress.begin_entries(handles.len() as u64);
    }

    let mut results: Vec<EntryResult> = Vec::with_capacity(handles.len());
    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = handle.join()?;
        let offset = out.position();
        ensure!(
            offset <= u64::from(u32::MAX),
            "output offset exceeds the 32-bit ZIP limit"
        );
        outcome.header.write(&mut out)?;
        out.write_all(&outcome.payload)
            .context("writing entry payload")?;
        results.push(EntryResult {
            compressed_size: outcome.header.compressed_size,
            uncompressed_size: outcome.header.uncompressed_size,
            offset: offset as u32,
        });
        reports.push(EntryReport {
            name: outcome.header.display_name(),
            disposition: outcome.disposition,
        });
        if let Some(progress) = progress {
            progress.entry_finished();
        }
    }

    let central_directory_offset = out.position();
    ensure!(
        central_directory_offset <= u64::from(u32::MAX),
        "central directory offset exceeds the 32-bit ZIP limit"
    );

    let mut index = 0usize;
    while signature == ZipSignature::CentralDirectoryFileHeader {
        let mut record = CentralDirectoryFileHeader::read(input)
            .context("reading central directory record")?;
        let Some(result) = results.get(index) else {
            bail!(
                "central directory holds more records than the {} local entries seen",
                results.len()
            );
        };
        record.compressed_size = result.compressed_size;
        record.uncompressed_size = result.uncompressed_size;
        record.local_header_offset = result.offset;
        // Sizes and CRC now live in the headers; see the matching clear on
        // the local header in `consume_data_descriptor`.
        record.flags &= !FLAG_DATA_DESCRIPTOR;
        record.write(&mut out)?;
        index += 1;
        signature = read_signature(input).context("reading record signature")?;
    }
    ensure!(
        index == results.len(),
        "central directory holds {index} records for {} local entries",
        results.len()
    );
    ensure!(
        signature == ZipSignature::EndOfCentralDirectory,
        "local file header found after the central directory"
    );

    let mut eocd =
        EndOfCentralDirectory::read(input).context("reading end of central directory")?;
    eocd.central_directory_offset = central_directory_offset as u32;
    eocd.write(&mut out)?;
    out.flush().context("flushing output")?;

    Ok(RewriteOutcome {
        entries: reports,
        bytes_written: out.position(),
    })
}

/// Consumes the trailing data descriptor of an entry whose sizes are already
/// in the local header, backfilling CRC and uncompressed size when the
/// header carried zeros. Entries that defer their compressed size entirely
/// to the descriptor cannot be sliced out of the stream and are rejected.
fn consume_data_descriptor<R: Read>(
    input: &mut R,
    header: &mut LocalFileHeader,
) -> anyhow::Result<()> {
    let first = read_u32(input).context("reading data descriptor")?;
    let (crc32, compressed_size, uncompressed_size) = if first == DATA_DESCRIPTOR_SIGNATURE {
        (
            read_u32(input).context("reading data descriptor")?,
            read_u32(input).context("reading data descriptor")?,
            read_u32(input).context("reading data descriptor")?,
        )
    } else {
        (
            first,
            read_u32(input).context("reading data descriptor")?,
            read_u32(input).context("reading data descriptor")?,
        )
    };
    ensure!(
        compressed_size == header.compressed_size,
        "{}: data descriptor disagrees with the local header ({} vs {} compressed bytes); \
         descriptor-only sizing is not supported",
        header.display_name(),
        compressed_size,
        header.compressed_size
    );
    if header.crc32 == 0 {
        header.crc32 = crc32;
    }
    if header.uncompressed_size == 0 {
        header.uncompressed_size = uncompressed_size;
    }
    header.flags &= !FLAG_DATA_DESCRIPTOR;
    Ok(())
}
