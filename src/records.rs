//! Binary layout of the ZIP records this tool consumes and produces.
//!
//! All integers are little-endian. Reading assumes the four-byte signature
//! has already been consumed by `read_signature`; writing emits it. No
//! semantic validation happens here; the rewriter owns that.

use std::io::{Read, Write};

use anyhow::Context;

pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x0403_4B50;
pub const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0201_4B50;
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4B50;
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4B50;

pub const FLAG_ENCRYPTED: u16 = 0x0001;
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
pub const FLAG_UTF8: u16 = 0x0800;

pub const METHOD_STORED: u16 = 0;
pub const METHOD_DEFLATED: u16 = 8;

/// Fixed portion of a local file header, including the signature.
pub const LOCAL_FILE_HEADER_LEN: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZipSignature {
    LocalFileHeader,
    CentralDirectoryFileHeader,
    EndOfCentralDirectory,
}

/// Reads the next record magic. Anything other than the three record
/// signatures is a hard parse error.
pub fn read_signature<R: Read>(reader: &mut R) -> anyhow::Result<ZipSignature> {
    match read_u32(reader)? {
        LOCAL_FILE_HEADER_SIGNATURE => Ok(ZipSignature::LocalFileHeader),
        CENTRAL_DIRECTORY_SIGNATURE => Ok(ZipSignature::CentralDirectoryFileHeader),
        END_OF_CENTRAL_DIRECTORY_SIGNATURE => Ok(ZipSignature::EndOfCentralDirectory),
        other => anyhow::bail!("unknown record signature 0x{other:08X}"),
    }
}

pub(crate) fn read_u16<R: Read>(reader: &mut R) -> anyhow::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf).context("truncated record")?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32<R: Read>(reader: &mut R) -> anyhow::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).context("truncated record")?;
    Ok(u32::from_le_bytes(buf))
}

fn read_vec<R: Read>(reader: &mut R, len: usize) -> anyhow::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).context("truncated record")?;
    Ok(buf)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
}

impl LocalFileHeader {
    pub fn read<R: Read>(reader: &mut R) -> anyhow::Result<Self> {
        let version_needed = read_u16(reader)?;
        let flags = read_u16(reader)?;
        let method = read_u16(reader)?;
        let mod_time = read_u16(reader)?;
        let mod_date = read_u16(reader)?;
        let crc32 = read_u32(reader)?;
        let compressed_size = read_u32(reader)?;
        let uncompressed_size = read_u32(reader)?;
        let name_len = read_u16(reader)? as usize;
        let extra_len = read_u16(reader)? as usize;
        let file_name = read_vec(reader, name_len)?;
        let extra_field = read_vec(reader, extra_len)?;
        Ok(Self {
            version_needed,
            flags,
            method,
            mod_time,
            mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name,
            extra_field,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        let mut buf =
            Vec::with_capacity(LOCAL_FILE_HEADER_LEN + self.file_name.len() + self.extra_field.len());
        buf.extend_from_slice(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&self.version_needed.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.method.to_le_bytes());
        buf.extend_from_slice(&self.mod_time.to_le_bytes());
        buf.extend_from_slice(&self.mod_date.to_le_bytes());
        buf.extend_from_slice(&self.crc32.to_le_bytes());
        buf.extend_from_slice(&self.compressed_size.to_le_bytes());
        buf.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        buf.extend_from_slice(&(self.file_name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(self.extra_field.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.file_name);
        buf.extend_from_slice(&self.extra_field);
        writer.write_all(&buf).context("writing local file header")?;
        Ok(())
    }

    /// Entry name for logs; raw bytes are kept verbatim on the wire.
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(&self.file_name).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryFileHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number_start: u16,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_header_offset: u32,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
    pub comment: Vec<u8>,
}

impl CentralDirectoryFileHeader {
    pub fn read<R: Read>(reader: &mut R) -> anyhow::Result<Self> {
        let version_made_by = read_u16(reader)?;
        let version_needed = read_u16(reader)?;
        let flags = read_u16(reader)?;
        let method = read_u16(reader)?;
        let mod_time = read_u16(reader)?;
        let mod_date = read_u16(reader)?;
        let crc32 = read_u32(reader)?;
        let compressed_size = read_u32(reader)?;
        let uncompressed_size = read_u32(reader)?;
        let name_len = read_u16(reader)? as usize;
        let extra_len = read_u16(reader)? as usize;
        let comment_len = read_u16(reader)? as usize;
        let disk_number_start = read_u16(reader)?;
        let internal_attributes = read_u16(reader)?;
        let external_attributes = read_u32(reader)?;
        let local_header_offset = read_u32(reader)?;
        let file_name = read_vec(reader, name_len)?;
        let extra_field = read_vec(reader, extra_len)?;
        let comment = read_vec(reader, comment_len)?;
        Ok(Self {
            version_made_by,
            version_needed,
            flags,
            method,
            mod_time,
            mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number_start,
            internal_attributes,
            external_attributes,
            local_header_offset,
            file_name,
            extra_field,
            comment,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        let mut buf = Vec::with_capacity(
            46 + self.file_name.len() + self.extra_field.len() + self.comment.len(),
        );
        buf.extend_from_slice(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&self.version_made_by.to_le_bytes());
        buf.extend_from_slice(&self.version_needed.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.method.to_le_bytes());
        buf.extend_from_slice(&self.mod_time.to_le_bytes());
        buf.extend_from_slice(&self.mod_date.to_le_bytes());
        buf.extend_from_slice(&self.crc32.to_le_bytes());
        buf.extend_from_slice(&self.compressed_size.to_le_bytes());
        buf.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        buf.extend_from_slice(&(self.file_name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(self.extra_field.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.disk_number_start.to_le_bytes());
        buf.extend_from_slice(&self.internal_attributes.to_le_bytes());
        buf.extend_from_slice(&self.external_attributes.to_le_bytes());
        buf.extend_from_slice(&self.local_header_offset.to_le_bytes());
        buf.extend_from_slice(&self.file_name);
        buf.extend_from_slice(&self.extra_field);
        buf.extend_from_slice(&self.comment);
        writer
            .write_all(&buf)
            .context("writing central directory record")?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub central_directory_disk: u16,
    pub records_on_disk: u16,
    pub total_records: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    pub fn read<R: Read>(reader: &mut R) -> anyhow::Result<Self> {
        let disk_number = read_u16(reader)?;
        let central_directory_disk = read_u16(reader)?;
        let records_on_disk = read_u16(reader)?;
        let total_records = read_u16(reader)?;
        let central_directory_size = read_u32(reader)?;
        let central_directory_offset = read_u32(reader)?;
        let comment_len = read_u16(reader)? as usize;
        let comment = read_vec(reader, comment_len)?;
        Ok(Self {
            disk_number,
            central_directory_disk,
            records_on_disk,
            total_records,
            central_directory_size,
            central_directory_offset,
            comment,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        let mut buf = Vec::with_capacity(22 + self.comment.len());
        buf.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&self.disk_number.to_le_bytes());
        buf.extend_from_slice(&self.central_directory_disk.to_le_bytes());
        buf.extend_from_slice(&self.records_on_disk.to_le_bytes());
        buf.extend_from_slice(&self.total_records.to_le_bytes());
        buf.extend_from_slice(&self.central_directory_size.to_le_bytes());
        buf.extend_from_slice(&self.central_directory_offset.to_le_bytes());
        buf.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.comment);
        writer
            .write_all(&buf)
            .context("writing end of central directory")?;
        Ok(())
    }
}
