//! Per-archive driver: opens the streams, runs the rewriter, applies the
//! overwrite/suffix/dry-run output policy, and aggregates reports.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tempfile::NamedTempFile;

use crate::config::Config;
use crate::pipeline::PipelineOptions;
use crate::pool::WorkerPool;
use crate::progress::RewriteProgress;
use crate::rewriter::{self, RewriteOutcome};
use crate::types::{ArchiveReport, EntryDisposition, RunSummary};

/// Processes every configured archive. A fatal error in one archive is
/// reported and counted; the remaining archives are still processed.
pub fn run(config: &Config) -> anyhow::Result<RunSummary> {
    let pool = WorkerPool::new(config.threads);
    let options = PipelineOptions {
        deflate: config.deflate.clone(),
        password: config.password.clone(),
        force_replace: config.replace_force,
    };

    let mut archives = Vec::with_capacity(config.inputs.len());
    let mut failed = 0usize;
    for input in &config.inputs {
        match process_archive(config, &pool, &options, input) {
            Ok(report) => {
                log_report(config, &report);
                archives.push(report);
            }
            Err(err) => {
                failed += 1;
                eprintln!("error: {}: {err:#}", input.display());
            }
        }
    }

    Ok(RunSummary { archives, failed })
}

fn process_archive(
    config: &Config,
    pool: &WorkerPool,
    options: &PipelineOptions,
    path: &Path,
) -> anyhow::Result<ArchiveReport> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let input_bytes = file.metadata().map(|meta| meta.len()).unwrap_or(0);
    let mut input = BufReader::new(file);

    let label = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("archive");
    let progress = RewriteProgress::new(label);
    let result = rewrite_to_destination(config, pool, options, path, &mut input, &progress);
    progress.finish();

    let (outcome, output) = result?;
    Ok(build_report(path, output, input_bytes, outcome))
}

fn rewrite_to_destination<R: Read>(
    config: &Config,
    pool: &WorkerPool,
    options: &PipelineOptions,
    path: &Path,
    input: &mut R,
    progress: &RewriteProgress,
) -> anyhow::Result<(RewriteOutcome, Option<PathBuf>)> {
    if config.dry_run {
        let outcome = rewriter::rewrite_archive(input, io::sink(), options, pool, Some(progress))?;
        return Ok((outcome, None));
    }

    if !config.overwrite {
        let out_path = Config::suffixed_output(path);
        let file = File::create(&out_path)
            .with_context(|| format!("creating {}", out_path.display()))?;
        let mut writer = BufWriter::new(file);
        // On failure the partial output stays on disk for inspection.
        let outcome = rewriter::rewrite_archive(input, &mut writer, options, pool, Some(progress))?;
        writer.flush().context("flushing output")?;
        return Ok((outcome, Some(out_path)));
    }

    // Rewriting in place: build the output next to the input and only move it
    // over the original once the whole archive went through.
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut temp = NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))
        .context("creating temporary output file")?;
    let result = {
        let mut writer = BufWriter::new(temp.as_file_mut());
        rewriter::rewrite_archive(input, &mut writer, options, pool, Some(progress))
            .and_then(|outcome| {
                writer.flush().context("flushing output")?;
                Ok(outcome)
            })
    };
    match result {
        Ok(outcome) => {
            temp.persist(path)
                .with_context(|| format!("replacing {}", path.display()))?;
            Ok((outcome, Some(path.to_path_buf())))
        }
        Err(err) => {
            if let Ok((_, partial)) = temp.keep() {
                eprintln!("note: partial output left at {}", partial.display());
            }
            Err(err)
        }
    }
}

fn build_report(
    input: &Path,
    output: Option<PathBuf>,
    input_bytes: u64,
    outcome: RewriteOutcome,
) -> ArchiveReport {
    let mut replaced = 0usize;
    let mut kept = 0usize;
    let mut passed_through = 0usize;
    for entry in &outcome.entries {
        match entry.disposition {
            EntryDisposition::Replaced { .. } => replaced += 1,
            EntryDisposition::Kept { .. } => kept += 1,
            _ => passed_through += 1,
        }
    }
    ArchiveReport {
        input: input.to_path_buf(),
        output,
        entries: outcome.entries.len(),
        replaced,
        kept,
        passed_through,
        input_bytes,
        output_bytes: outcome.bytes_written,
        entry_reports: outcome.entries,
    }
}

fn log_report(config: &Config, report: &ArchiveReport) {
    for entry in &report.entry_reports {
        match entry.disposition.warning() {
            Some(warning) => {
                eprintln!(
                    "warning: {}: {}: {}",
                    report.input.display(),
                    entry.name,
                    warning
                );
            }
            None => {
                vprintln!(
                    config.verbose,
                    2,
                    "{}: {}: {:?}",
                    report.input.display(),
                    entry.name,
                    entry.disposition
                );
            }
        }
    }
    vprintln!(
        config.verbose,
        1,
        "{}: {} entries ({} recompressed, {} kept, {} passed through), {} -> {} bytes",
        report.input.display(),
        report.entries,
        report.replaced,
        report.kept,
        report.passed_through,
        report.input_bytes,
        report.output_bytes
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deflate::DeflateOptions;
    use crate::records::{
        CentralDirectoryFileHeader, EndOfCentralDirectory, LocalFileHeader, METHOD_STORED,
    };

    fn stored_archive(name: &[u8], data: &[u8]) -> Vec<u8> {
        let crc = crate::crc32::hash(data);
        let header = LocalFileHeader {
            version_needed: 10,
            flags: 0,
            method: METHOD_STORED,
            mod_time: 0,
            mod_date: 0,
            crc32: crc,
            compressed_size: data.len() as u32,
            uncompressed_size: data.len() as u32,
            file_name: name.to_vec(),
            extra_field: Vec::new(),
        };
        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        bytes.extend_from_slice(data);
        let cd_offset = bytes.len() as u32;
        let record = CentralDirectoryFileHeader {
            version_made_by: 20,
            version_needed: 10,
            flags: 0,
            method: METHOD_STORED,
            mod_time: 0,
            mod_date: 0,
            crc32: crc,
            compressed_size: data.len() as u32,
            uncompressed_size: data.len() as u32,
            disk_number_start: 0,
            internal_attributes: 0,
            external_attributes: 0,
            local_header_offset: 0,
            file_name: name.to_vec(),
            extra_field: Vec::new(),
            comment: Vec::new(),
        };
        record.write(&mut bytes).unwrap();
        let cd_size = bytes.len() as u32 - cd_offset;
        EndOfCentralDirectory {
            disk_number: 0,
            central_directory_disk: 0,
            records_on_disk: 1,
            total_records: 1,
            central_directory_size: cd_size,
            central_directory_offset: cd_offset,
            comment: Vec::new(),
        }
        .write(&mut bytes)
        .unwrap();
        bytes
    }

    fn test_config(inputs: Vec<PathBuf>) -> Config {
        Config {
            inputs,
            deflate: DeflateOptions::default(),
            threads: Some(2),
            replace_force: false,
            dry_run: false,
            overwrite: true,
            password: None,
            verbose: 0,
        }
    }

    #[test]
    fn overwrite_replaces_the_input_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stored.zip");
        let bytes = stored_archive(b"a.txt", b"hello\n");
        std::fs::write(&path, &bytes).unwrap();

        let config = test_config(vec![path.clone()]);
        let summary = run(&config).unwrap();
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.archives.len(), 1);
        // A stored entry leaves the archive byte-identical.
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn no_overwrite_writes_the_suffixed_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stored.zip");
        let bytes = stored_archive(b"a.txt", b"hello\n");
        std::fs::write(&path, &bytes).unwrap();

        let mut config = test_config(vec![path.clone()]);
        config.overwrite = false;
        let summary = run(&config).unwrap();
        assert_eq!(summary.failed, 0);
        let sibling = dir.path().join("stored.zopfli.zip");
        assert_eq!(summary.archives[0].output.as_deref(), Some(sibling.as_path()));
        assert_eq!(std::fs::read(&sibling).unwrap(), bytes);
        // Input untouched.
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stored.zip");
        let bytes = stored_archive(b"a.txt", b"hello\n");
        std::fs::write(&path, &bytes).unwrap();

        let mut config = test_config(vec![path.clone()]);
        config.dry_run = true;
        let summary = run(&config).unwrap();
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.archives[0].output, None);
        assert_eq!(summary.archives[0].output_bytes, bytes.len() as u64);
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
        assert!(!dir.path().join("stored.zopfli.zip").exists());
    }

    #[test]
    fn bad_archive_is_counted_and_others_continue() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.zip");
        let mut file = File::create(&bad).unwrap();
        file.write_all(b"this is not a zip archive").unwrap();
        let good = dir.path().join("good.zip");
        std::fs::write(&good, stored_archive(b"a.txt", b"hello\n")).unwrap();

        let config = test_config(vec![bad, good]);
        let summary = run(&config).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.archives.len(), 1);
    }
}
