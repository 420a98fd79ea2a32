use std::io::{Cursor, Read};

use flate2::Compression;
use flate2::read::DeflateEncoder;

use rezip::deflate::{self, DeflateOptions};
use rezip::pipeline::PipelineOptions;
use rezip::pool::WorkerPool;
use rezip::records::{
    CentralDirectoryFileHeader, EndOfCentralDirectory, FLAG_ENCRYPTED, LocalFileHeader,
    METHOD_DEFLATED,
};
use rezip::rewriter::rewrite_archive;
use rezip::types::EntryDisposition;
use rezip::zipcrypto::{CRYPT_HEADER_LEN, Decryptor, Encryptor};

fn deflate_raw(data: &[u8], level: u32) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(data, Compression::new(level));
    let mut out = Vec::new();
    encoder.read_to_end(&mut out).unwrap();
    out
}

/// Single-entry archive whose payload is ZipCrypto-encrypted DEFLATE data.
fn encrypted_archive(password: &[u8], plain: &[u8], level: u32) -> Vec<u8> {
    let crc = crc32fast::hash(plain);
    let compressed = deflate_raw(plain, level);
    let (mut encryptor, crypt_header) = Encryptor::new(password, crc).unwrap();
    let mut payload = crypt_header.to_vec();
    let mut body = compressed;
    encryptor.encrypt(&mut body);
    payload.extend_from_slice(&body);

    let header = LocalFileHeader {
        version_needed: 20,
        flags: FLAG_ENCRYPTED,
        method: METHOD_DEFLATED,
        mod_time: 0x6C32,
        mod_date: 0x5962,
        crc32: crc,
        compressed_size: payload.len() as u32,
        uncompressed_size: plain.len() as u32,
        file_name: b"secret.bin".to_vec(),
        extra_field: Vec::new(),
    };
    let mut bytes = Vec::new();
    header.write(&mut bytes).unwrap();
    bytes.extend_from_slice(&payload);

    let cd_offset = bytes.len() as u32;
    CentralDirectoryFileHeader {
        version_made_by: 0x031E,
        version_needed: 20,
        flags: FLAG_ENCRYPTED,
        method: METHOD_DEFLATED,
        mod_time: 0x6C32,
        mod_date: 0x5962,
        crc32: crc,
        compressed_size: payload.len() as u32,
        uncompressed_size: plain.len() as u32,
        disk_number_start: 0,
        internal_attributes: 0,
        external_attributes: 0,
        local_header_offset: 0,
        file_name: b"secret.bin".to_vec(),
        extra_field: Vec::new(),
        comment: Vec::new(),
    }
    .write(&mut bytes)
    .unwrap();
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

fn rewrite_with_password(bytes: &[u8], password: Option<&[u8]>) -> (Vec<u8>, Vec<EntryDisposition>) {
    let options = PipelineOptions {
        deflate: DeflateOptions::default(),
        password: password.map(|p| p.to_vec()),
        force_replace: false,
    };
    let pool = WorkerPool::new(Some(2));
    let mut input = Cursor::new(bytes);
    let mut output = Vec::new();
    let outcome = rewrite_archive(&mut input, &mut output, &options, &pool, None).unwrap();
    let dispositions = outcome
        .entries
        .into_iter()
        .map(|entry| entry.disposition)
        .collect();
    (output, dispositions)
}

/// Decrypt-then-inflate with a fresh conforming reader; encrypted outputs are
/// never compared byte-wise.
fn extract_encrypted(bytes: &[u8], password: &[u8]) -> Vec<u8> {
    let mut cursor = Cursor::new(bytes);
    rezip::records::read_signature(&mut cursor).unwrap();
    let header = LocalFileHeader::read(&mut cursor).unwrap();
    assert_ne!(header.flags & FLAG_ENCRYPTED, 0);
    let mut payload = vec![0u8; header.compressed_size as usize];
    cursor.read_exact(&mut payload).unwrap();

    let (crypt_header, body) = payload.split_at(CRYPT_HEADER_LEN);
    let (mut decryptor, check) = Decryptor::new(password, crypt_header, header.crc32);
    assert!(check, "crypt header check byte must match after rewrite");
    let mut compressed = body.to_vec();
    decryptor.decrypt(&mut compressed);
    deflate::inflate(&compressed, header.uncompressed_size as usize).unwrap()
}

#[test]
fn rewrite_with_password_recovers_plaintext() {
    let plain = b"abcabcabcabc";
    let input = encrypted_archive(b"pw", plain, 9);
    let (output, dispositions) = rewrite_with_password(&input, Some(b"pw"));

    assert_eq!(dispositions.len(), 1);
    assert!(matches!(
        dispositions[0],
        EntryDisposition::Replaced { .. } | EntryDisposition::Kept { .. }
    ));
    assert_eq!(extract_encrypted(&output, b"pw"), plain);
}

#[test]
fn poorly_compressed_encrypted_entry_shrinks() {
    let plain = b"encrypt me, encrypt me, encrypt me ".repeat(300);
    let input = encrypted_archive(b"hunter2", &plain, 1);
    let (output, dispositions) = rewrite_with_password(&input, Some(b"hunter2"));

    assert!(matches!(
        dispositions[0],
        EntryDisposition::Replaced { .. }
    ));
    assert_eq!(extract_encrypted(&output, b"hunter2"), plain);

    let mut in_cursor = Cursor::new(&input[..]);
    rezip::records::read_signature(&mut in_cursor).unwrap();
    let in_header = LocalFileHeader::read(&mut in_cursor).unwrap();
    let mut out_cursor = Cursor::new(&output[..]);
    rezip::records::read_signature(&mut out_cursor).unwrap();
    let out_header = LocalFileHeader::read(&mut out_cursor).unwrap();
    assert!(out_header.compressed_size < in_header.compressed_size);
    // The crypt header is still accounted for in the new size.
    assert!(out_header.compressed_size as usize > CRYPT_HEADER_LEN);
}

#[test]
fn without_password_the_archive_is_untouched() {
    let input = encrypted_archive(b"pw", b"abcabcabcabc", 9);
    let (output, dispositions) = rewrite_with_password(&input, None);
    assert_eq!(dispositions[0], EntryDisposition::EncryptedNoPassword);
    assert_eq!(output, input);
}

#[test]
fn wrong_password_passes_the_entry_through() {
    let input = encrypted_archive(b"right", b"abcabcabcabc", 9);
    let (output, dispositions) = rewrite_with_password(&input, Some(b"wrong"));
    match &dispositions[0] {
        EntryDisposition::WrongPassword
        | EntryDisposition::InflateFailed { .. }
        | EntryDisposition::LengthMismatch { .. }
        | EntryDisposition::CrcMismatch { .. } => {}
        other => panic!("expected a pass-through, got {other:?}"),
    }
    assert_eq!(output, input);
}

#[test]
fn reencrypted_output_differs_across_runs_but_decrypts_identically() {
    let plain = b"nondeterministic crypt headers ".repeat(100);
    let input = encrypted_archive(b"pw", &plain, 1);
    let (first, _) = rewrite_with_password(&input, Some(b"pw"));
    let (second, _) = rewrite_with_password(&input, Some(b"pw"));

    // Fresh 11-byte random prefixes make the ciphertexts differ.
    assert_ne!(first, second);
    assert_eq!(extract_encrypted(&first, b"pw"), plain);
    assert_eq!(extract_encrypted(&second, b"pw"), plain);
}
