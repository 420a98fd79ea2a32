//! Per-entry recompression: decrypt, inflate, re-encode, re-encrypt.
//!
//! Tasks are pure over their inputs so they can run on any worker. Every
//! recoverable failure keeps the original header and payload and records the
//! reason as a disposition; only the rewriter turns problems into hard
//! errors.

use crate::crc32;
use crate::deflate::{self, DeflateOptions};
use crate::records::{FLAG_ENCRYPTED, LocalFileHeader, METHOD_DEFLATED};
use crate::types::EntryDisposition;
use crate::zipcrypto::{self, Decryptor, Encryptor};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub deflate: DeflateOptions,
    pub password: Option<Vec<u8>>,
    pub force_replace: bool,
}

#[derive(Debug)]
pub struct EntryOutcome {
    pub header: LocalFileHeader,
    pub payload: Vec<u8>,
    pub disposition: EntryDisposition,
}

/// Runs one entry through the pipeline and returns the header and payload to
/// write in its place. The header's `compressed_size` is the only field that
/// changes; pass-through outcomes return both inputs untouched.
pub fn recompress_entry(
    mut header: LocalFileHeader,
    payload: Vec<u8>,
    options: &PipelineOptions,
) -> EntryOutcome {
    if header.method != METHOD_DEFLATED {
        return EntryOutcome {
            header,
            payload,
            disposition: EntryDisposition::NotDeflate,
        };
    }

    let encrypted = header.flags & FLAG_ENCRYPTED != 0;
    let password = match (encrypted, options.password.as_deref()) {
        (false, _) => None,
        (true, Some(password)) => Some(password),
        (true, None) => {
            return EntryOutcome {
                header,
                payload,
                disposition: EntryDisposition::EncryptedNoPassword,
            };
        }
    };

    let mut check_ok = true;
    let decrypted = if let Some(password) = password {
        if payload.len() < zipcrypto::CRYPT_HEADER_LEN {
            return EntryOutcome {
                header,
                payload,
                disposition: EntryDisposition::TruncatedCryptHeader,
            };
        }
        let (crypt_header, ciphertext) = payload.split_at(zipcrypto::CRYPT_HEADER_LEN);
        let (mut decryptor, matches) = Decryptor::new(password, crypt_header, header.crc32);
        check_ok = matches;
        let mut plain = ciphertext.to_vec();
        decryptor.decrypt(&mut plain);
        Some(plain)
    } else {
        None
    };
    let compressed_plain: &[u8] = decrypted.as_deref().unwrap_or(&payload);

    let plain = match deflate::inflate(compressed_plain, header.uncompressed_size as usize) {
        Ok(plain) => plain,
        Err(err) => {
            let disposition = if check_ok {
                EntryDisposition::InflateFailed {
                    reason: format!("{err:#}"),
                }
            } else {
                EntryDisposition::WrongPassword
            };
            return EntryOutcome {
                header,
                payload,
                disposition,
            };
        }
    };
    if plain.len() as u64 != u64::from(header.uncompressed_size) {
        let disposition = if check_ok {
            EntryDisposition::LengthMismatch {
                expected: header.uncompressed_size,
                actual: plain.len(),
            }
        } else {
            EntryDisposition::WrongPassword
        };
        return EntryOutcome {
            header,
            payload,
            disposition,
        };
    }
    let crc = crc32::hash(&plain);
    if crc != header.crc32 {
        let disposition = if check_ok {
            EntryDisposition::CrcMismatch {
                expected: header.crc32,
                actual: crc,
            }
        } else {
            EntryDisposition::WrongPassword
        };
        return EntryOutcome {
            header,
            payload,
            disposition,
        };
    }

    let recompressed = match deflate::deflate(&plain, &options.deflate) {
        Ok(bytes) => bytes,
        Err(err) => {
            return EntryOutcome {
                header,
                payload,
                disposition: EntryDisposition::EncoderFailed {
                    reason: format!("{err:#}"),
                },
            };
        }
    };

    let original_len = compressed_plain.len();
    let recompressed_len = recompressed.len();
    // Strict less-than: ties keep the original bytes.
    let adopt = options.force_replace || recompressed_len < original_len;
    let disposition = if adopt {
        EntryDisposition::Replaced {
            original: original_len,
            recompressed: recompressed_len,
        }
    } else {
        EntryDisposition::Kept {
            original: original_len,
            recompressed: recompressed_len,
        }
    };

    let new_payload = if let Some(password) = password {
        let chosen: &[u8] = if adopt { &recompressed } else { compressed_plain };
        match encrypt_payload(password, header.crc32, chosen) {
            Ok(bytes) => bytes,
            Err(err) => {
                return EntryOutcome {
                    header,
                    payload,
                    disposition: EntryDisposition::EncoderFailed {
                        reason: format!("{err:#}"),
                    },
                };
            }
        }
    } else if adopt {
        recompressed
    } else {
        payload
    };

    header.compressed_size = new_payload.len() as u32;
    EntryOutcome {
        header,
        payload: new_payload,
        disposition,
    }
}

/// Wraps a compressed payload in a fresh crypt header and ciphertext.
fn encrypt_payload(password: &[u8], crc32: u32, compressed: &[u8]) -> anyhow::Result<Vec<u8>> {
    let (mut encryptor, crypt_header) = Encryptor::new(password, crc32)?;
    let mut out = Vec::with_capacity(zipcrypto::CRYPT_HEADER_LEN + compressed.len());
    out.extend_from_slice(&crypt_header);
    let mut body = compressed.to_vec();
    encryptor.encrypt(&mut body);
    out.append(&mut body);
    Ok(out)
}
