//! Central-directory ZIP reader.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::CrcWriter;
use flate2::read::DeflateDecoder;

use super::{
    ArchiveError, CENTRAL_HEADER_SIGNATURE, END_OF_CENTRAL_DIRECTORY_SIGNATURE, ExtractionStrategy, LOCAL_HEADER_LEN,
    LOCAL_HEADER_SIGNATURE, METHOD_DEFLATE, METHOD_STORED, PartialOutput, safe_entry_path,
};

const EOCD_LEN: usize = 22;
const MAX_COMMENT_LEN: usize = u16::MAX as usize;
const CENTRAL_HEADER_LEN: usize = 46;
const FLAG_ENCRYPTED: u16 = 0x0001;

/// One file entry from the central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralEntry {
    pub name: String,
    pub method: u16,
    pub flags: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub local_header_offset: u64,
}

impl CentralEntry {
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/') || self.name.ends_with('\\')
    }
}

/// Locate the end-of-central-directory record and return
/// `(entry_count, directory_size, directory_offset)`.
fn read_end_record(file: &mut File, len: u64) -> Result<(u16, u32, u32), ArchiveError> {
    if len < EOCD_LEN as u64 {
        return Err(ArchiveError::Truncated(format!("{len} bytes is too short for a ZIP archive")));
    }

    let tail_len = len.min((EOCD_LEN + MAX_COMMENT_LEN) as u64);
    file.seek(SeekFrom::Start(len - tail_len))?;
    let mut tail = vec![0u8; tail_len as usize];
    file.read_exact(&mut tail)?;

    let signature = END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes();
    let pos = (0..=tail.len() - EOCD_LEN)
        .rev()
        .find(|&i| tail[i..i + 4] == signature)
        .ok_or_else(|| ArchiveError::BadSignature("end of central directory not found".into()))?;

    let mut record = &tail[pos + 4..];
    let disk = record.read_u16::<LittleEndian>()?;
    let directory_disk = record.read_u16::<LittleEndian>()?;
    let _entries_on_disk = record.read_u16::<LittleEndian>()?;
    let entries = record.read_u16::<LittleEndian>()?;
    let size = record.read_u32::<LittleEndian>()?;
    let offset = record.read_u32::<LittleEndian>()?;

    if disk != 0 || directory_disk != 0 {
        return Err(ArchiveError::Unsupported("multi-disk archive".into()));
    }
    if entries == u16::MAX || size == u32::MAX || offset == u32::MAX {
        return Err(ArchiveError::Unsupported("zip64 archive".into()));
    }
    if u64::from(offset) + u64::from(size) > len {
        return Err(ArchiveError::Truncated("central directory extends past end of file".into()));
    }

    Ok((entries, size, offset))
}

/// Parse every entry of the central directory.
pub fn read_central_directory(file: &mut File) -> Result<Vec<CentralEntry>, ArchiveError> {
    let len = file.metadata()?.len();
    let (count, size, offset) = read_end_record(file, len)?;

    file.seek(SeekFrom::Start(u64::from(offset)))?;
    let mut directory = vec![0u8; size as usize];
    file.read_exact(&mut directory)?;

    let mut cursor = directory.as_slice();
    let mut entries = Vec::with_capacity(usize::from(count));
    for index in 0..count {
        if cursor.len() < CENTRAL_HEADER_LEN {
            return Err(ArchiveError::Truncated(format!("central directory ends at entry {index} of {count}")));
        }
        if cursor.read_u32::<LittleEndian>()? != CENTRAL_HEADER_SIGNATURE {
            return Err(ArchiveError::BadSignature(format!("central directory entry {index}")));
        }

        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let method = cursor.read_u16::<LittleEndian>()?;
        let _mod_time = cursor.read_u16::<LittleEndian>()?;
        let _mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
        let name_len = usize::from(cursor.read_u16::<LittleEndian>()?);
        let extra_len = usize::from(cursor.read_u16::<LittleEndian>()?);
        let comment_len = usize::from(cursor.read_u16::<LittleEndian>()?);
        let _disk_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>()?;
        let local_header_offset = cursor.read_u32::<LittleEndian>()?;

        let variable_len = name_len + extra_len + comment_len;
        if cursor.len() < variable_len {
            return Err(ArchiveError::Truncated(format!("central directory entry {index} name")));
        }
        let name = String::from_utf8_lossy(&cursor[..name_len]).into_owned();
        cursor = &cursor[variable_len..];

        if compressed_size == u32::MAX || uncompressed_size == u32::MAX || local_header_offset == u32::MAX {
            return Err(ArchiveError::Unsupported(format!("zip64 entry {name}")));
        }

        entries.push(CentralEntry {
            name,
            method,
            flags,
            crc32,
            compressed_size: u64::from(compressed_size),
            uncompressed_size: u64::from(uncompressed_size),
            local_header_offset: u64::from(local_header_offset),
        });
    }

    Ok(entries)
}

/// Offset of an entry's payload, read from its local header.
fn payload_offset(file: &mut File, entry: &CentralEntry) -> Result<u64, ArchiveError> {
    file.seek(SeekFrom::Start(entry.local_header_offset))?;
    let mut header = [0u8; LOCAL_HEADER_LEN];
    file.read_exact(&mut header).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ArchiveError::Truncated(format!("local header of {}", entry.name)),
        _ => ArchiveError::Io(e),
    })?;

    let mut fields = &header[..];
    if fields.read_u32::<LittleEndian>()? != LOCAL_HEADER_SIGNATURE {
        return Err(ArchiveError::BadSignature(format!("local header of {}", entry.name)));
    }

    let mut lengths = &header[26..];
    let name_len = u64::from(lengths.read_u16::<LittleEndian>()?);
    let extra_len = u64::from(lengths.read_u16::<LittleEndian>()?);
    Ok(entry.local_header_offset + LOCAL_HEADER_LEN as u64 + name_len + extra_len)
}

fn extract_entry(file: &mut File, entry: &CentralEntry, path: &Path) -> Result<(), ArchiveError> {
    if entry.flags & FLAG_ENCRYPTED != 0 {
        return Err(ArchiveError::Unsupported(format!("encrypted entry {}", entry.name)));
    }
    if entry.method != METHOD_STORED && entry.method != METHOD_DEFLATE {
        return Err(ArchiveError::Unsupported(format!("compression method {} for {}", entry.method, entry.name)));
    }

    let offset = payload_offset(file, entry)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut payload = BufReader::new(&mut *file).take(entry.compressed_size);

    let output = PartialOutput::create(path)?;
    let mut sink = CrcWriter::new(output);
    let copied = match entry.method {
        METHOD_DEFLATE => io::copy(&mut DeflateDecoder::new(payload), &mut sink),
        _ => io::copy(&mut payload, &mut sink),
    }
    .map_err(|e| match e.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
            ArchiveError::Corrupt(format!("{}: {}", entry.name, e))
        }
        _ => ArchiveError::Io(e),
    })?;

    if copied != entry.uncompressed_size {
        return Err(ArchiveError::SizeMismatch {
            name: entry.name.clone(),
            expected: entry.uncompressed_size,
            actual: copied,
        });
    }
    let actual = sink.crc().sum();
    if actual != entry.crc32 {
        return Err(ArchiveError::ChecksumMismatch { name: entry.name.clone(), expected: entry.crc32, actual });
    }

    sink.into_inner().keep()?;
    Ok(())
}

fn extract_all(
    file: &mut File, entries: &[CentralEntry], destination: &Path, target: &str, extracted: &mut Vec<PathBuf>,
) -> Result<PathBuf, ArchiveError> {
    for entry in entries.iter().filter(|e| !e.is_dir()) {
        let path = destination.join(safe_entry_path(&entry.name)?);
        tracing::debug!(entry = %entry.name, bytes = entry.uncompressed_size, "extracting entry");
        extract_entry(file, entry, &path)?;
        extracted.push(path);
    }

    let target_path = destination.join(target);
    if extracted.contains(&target_path) { Ok(target_path) } else { Err(ArchiveError::MissingEntry(target.to_string())) }
}

/// Extracts every file entry listed in the central directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct CentralDirectoryStrategy;

impl ExtractionStrategy for CentralDirectoryStrategy {
    fn name(&self) -> &str {
        "central-directory"
    }

    fn extract(&self, archive: &Path, destination: &Path, target: &str) -> Result<PathBuf, ArchiveError> {
        let mut file = File::open(archive)?;
        let entries = read_central_directory(&mut file)?;

        let mut extracted = Vec::new();
        let result = extract_all(&mut file, &entries, destination, target, &mut extracted);
        if result.is_err() {
            for path in &extracted {
                let _ = std::fs::remove_file(path);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::{Entry, build_zip, sample_rows};
    use tempfile::TempDir;

    fn archive(dir: &TempDir, zip: &[u8]) -> PathBuf {
        let path = dir.path().join("a.zip");
        std::fs::write(&path, zip).unwrap();
        path
    }

    #[test]
    fn test_reads_central_directory() {
        let dir = TempDir::new().unwrap();
        let zip = build_zip(&[
            Entry { name: "readme.txt", data: b"hello", deflate: false },
            Entry { name: "tgg_export_caepi.txt", data: b"000123|x", deflate: true },
        ]);
        let mut file = File::open(archive(&dir, &zip)).unwrap();

        let entries = read_central_directory(&mut file).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "readme.txt");
        assert_eq!(entries[0].method, METHOD_STORED);
        assert_eq!(entries[1].method, METHOD_DEFLATE);
        assert_eq!(entries[1].uncompressed_size, 8);
    }

    #[test]
    fn test_extracts_stored_and_deflated_entries() {
        let dir = TempDir::new().unwrap();
        let rows = sample_rows();
        let zip = build_zip(&[
            Entry { name: "leia-me.txt", data: b"stored entry", deflate: false },
            Entry { name: "tgg_export_caepi.txt", data: &rows, deflate: true },
        ]);
        let path = archive(&dir, &zip);
        let out_dir = dir.path().join("out");

        let out = CentralDirectoryStrategy.extract(&path, &out_dir, "tgg_export_caepi.txt").unwrap();
        assert_eq!(std::fs::read(out).unwrap(), rows);
        assert_eq!(std::fs::read(out_dir.join("leia-me.txt")).unwrap(), b"stored entry");
    }

    #[test]
    fn test_missing_target_cleans_up() {
        let dir = TempDir::new().unwrap();
        let zip = build_zip(&[Entry { name: "other.txt", data: b"x", deflate: false }]);
        let path = archive(&dir, &zip);

        let err = CentralDirectoryStrategy.extract(&path, dir.path(), "tgg_export_caepi.txt").unwrap_err();
        assert!(matches!(err, ArchiveError::MissingEntry(_)));
        assert!(!dir.path().join("other.txt").exists());
    }

    #[test]
    fn test_crc_mismatch_is_detected() {
        let dir = TempDir::new().unwrap();
        let mut zip = build_zip(&[Entry { name: "t.txt", data: b"abcdef", deflate: false }]);
        // Payload starts after the 30-byte header and the 5-byte name.
        zip[35] = b'X';
        let path = archive(&dir, &zip);

        let err = CentralDirectoryStrategy.extract(&path, dir.path(), "t.txt").unwrap_err();
        assert!(matches!(err, ArchiveError::ChecksumMismatch { .. }), "{err}");
        assert!(!dir.path().join("t.txt").exists());
    }

    #[test]
    fn test_unsafe_entry_is_rejected() {
        let dir = TempDir::new().unwrap();
        let zip = build_zip(&[Entry { name: "../escape.txt", data: b"x", deflate: false }]);
        let path = archive(&dir, &zip);
        let out_dir = dir.path().join("out");

        let err = CentralDirectoryStrategy.extract(&path, &out_dir, "escape.txt").unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafeName(_)));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_missing_end_record() {
        let dir = TempDir::new().unwrap();
        let mut zip = build_zip(&[Entry { name: "t.txt", data: b"x", deflate: false }]);
        crate::archive::tests::break_central_directory(&mut zip);
        let path = archive(&dir, &zip);

        let err = CentralDirectoryStrategy.extract(&path, dir.path(), "t.txt").unwrap_err();
        assert!(matches!(err, ArchiveError::BadSignature(_)));
    }

    #[test]
    fn test_too_short_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = archive(&dir, b"PK\x05\x06");
        assert!(matches!(CentralDirectoryStrategy.extract(&path, dir.path(), "t.txt"), Err(ArchiveError::Truncated(_))));
    }
}
