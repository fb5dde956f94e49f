//! Binary container for detector archives.
//!
//! The modern trainer writes checkpoints as a fixed header (magic,
//! version) followed by a bincode-encoded [`DetectorArchive`]. The magic
//! bytes let the resolution chain reject foreign files without attempting
//! a full decode.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use model_ir::DetectorArchive;

use crate::error::FormatError;

/// Magic bytes identifying a binary detector archive.
pub const ARCHIVE_MAGIC: [u8; 4] = *b"CFA1";

/// Current archive container version.
pub const ARCHIVE_VERSION: u32 = 1;

/// Saves an archive to a file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or encoding fails.
pub fn save_archive_file(
    archive: &DetectorArchive,
    path: impl AsRef<Path>,
) -> Result<(), FormatError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_archive(archive, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Saves an archive to an in-memory byte vector.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn save_archive_bytes(archive: &DetectorArchive) -> Result<Vec<u8>, FormatError> {
    let mut buffer = Vec::new();
    write_archive(archive, &mut buffer)?;
    Ok(buffer)
}

fn write_archive<W: Write>(archive: &DetectorArchive, writer: &mut W) -> Result<(), FormatError> {
    writer.write_all(&ARCHIVE_MAGIC)?;
    writer.write_all(&ARCHIVE_VERSION.to_le_bytes())?;
    bincode::serialize_into(writer, archive).map_err(|e| FormatError::Encode(e.to_string()))?;
    Ok(())
}

/// Loads an archive from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, carries foreign magic
/// bytes, declares an unsupported version, or fails to decode.
pub fn load_archive_file(path: impl AsRef<Path>) -> Result<DetectorArchive, FormatError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_archive(&mut reader)
}

/// Loads an archive from a byte slice.
///
/// # Errors
///
/// Same failure modes as [`load_archive_file`], minus file access.
pub fn load_archive_bytes(bytes: &[u8]) -> Result<DetectorArchive, FormatError> {
    let mut reader = std::io::Cursor::new(bytes);
    read_archive(&mut reader)
}

fn read_archive<R: Read>(reader: &mut R) -> Result<DetectorArchive, FormatError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != ARCHIVE_MAGIC {
        return Err(FormatError::InvalidMagic(magic));
    }

    let mut word = [0u8; 4];
    reader.read_exact(&mut word)?;
    let version = u32::from_le_bytes(word);
    if version != ARCHIVE_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }

    bincode::deserialize_from(reader).map_err(|e| FormatError::Decode(e.to_string()))
}

/// Checks whether a file starts with the archive magic bytes.
#[must_use]
pub fn is_archive_file(path: impl AsRef<Path>) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut reader = BufReader::new(file);
    let mut magic = [0u8; 4];
    if reader.read_exact(&mut magic).is_err() {
        return false;
    }
    magic == ARCHIVE_MAGIC
}
