use std::path::PathBuf;

use serde::Serialize;

/// How an entry left the pipeline. `Replaced`/`Kept` are the normal DEFLATE
/// outcomes; everything else is a verbatim pass-through.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryDisposition {
    /// Recompressed payload adopted.
    Replaced { original: usize, recompressed: usize },
    /// Recompression produced no strict win; original bytes kept.
    Kept { original: usize, recompressed: usize },
    /// Stored or legacy method, copied through verbatim.
    NotDeflate,
    /// Encrypted entry with no password supplied.
    EncryptedNoPassword,
    /// Payload shorter than the 12-byte crypt header.
    TruncatedCryptHeader,
    /// Crypt-header check byte rejected the password.
    WrongPassword,
    /// Raw DEFLATE decode failed.
    InflateFailed { reason: String },
    /// Inflated length disagreed with the header.
    LengthMismatch { expected: u32, actual: usize },
    /// CRC-32 of the inflated bytes disagreed with the header.
    CrcMismatch { expected: u32, actual: u32 },
    /// The re-encoder or the crypt-header randomness failed.
    EncoderFailed { reason: String },
}

impl EntryDisposition {
    /// Warning line for outcomes the user should hear about even without
    /// verbose logging.
    pub fn warning(&self) -> Option<String> {
        match self {
            EntryDisposition::Replaced { .. }
            | EntryDisposition::Kept { .. }
            | EntryDisposition::NotDeflate => None,
            EntryDisposition::EncryptedNoPassword => {
                Some("encrypted entry left untouched (no password supplied)".to_string())
            }
            EntryDisposition::TruncatedCryptHeader => {
                Some("payload shorter than the 12-byte crypt header".to_string())
            }
            EntryDisposition::WrongPassword => {
                Some("crypt header check failed, wrong password?".to_string())
            }
            EntryDisposition::InflateFailed { reason } => Some(format!("inflate failed: {reason}")),
            EntryDisposition::LengthMismatch { expected, actual } => Some(format!(
                "inflated to {actual} bytes but the header says {expected}"
            )),
            EntryDisposition::CrcMismatch { expected, actual } => Some(format!(
                "CRC-32 mismatch (header {expected:08X}, data {actual:08X})"
            )),
            EntryDisposition::EncoderFailed { reason } => {
                Some(format!("re-encoder failed: {reason}"))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub name: String,
    pub disposition: EntryDisposition,
}

#[derive(Debug, Serialize)]
pub struct ArchiveReport {
    pub input: PathBuf,
    /// `None` for dry runs.
    pub output: Option<PathBuf>,
    pub entries: usize,
    pub replaced: usize,
    pub kept: usize,
    pub passed_through: usize,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub entry_reports: Vec<EntryReport>,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub archives: Vec<ArchiveReport>,
    pub failed: usize,
}
