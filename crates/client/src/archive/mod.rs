//! ZIP archive extraction with a manual fallback decoder.
//!
//! ### Strategies
//! - [`CentralDirectoryStrategy`]: the regular path. Walks the central
//!   directory and extracts every file entry, checking CRC-32 and sizes.
//! - [`LocalHeaderStrategy`]: used when the central directory is damaged.
//!   Decodes the first local entry by raw-inflating its payload in chunks.
//!
//! Either way the raw dataset ends up at `destination/<target>`. Partial
//! output is removed when a strategy fails.

pub mod central;
pub mod local;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use caepi_core::Error;

pub use central::CentralDirectoryStrategy;
pub use local::{LocalHeaderStrategy, StreamingInflater};

pub(crate) const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
pub(crate) const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
pub(crate) const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4b50;
pub(crate) const LOCAL_HEADER_LEN: usize = 30;

pub(crate) const METHOD_STORED: u16 = 0;
pub(crate) const METHOD_DEFLATE: u16 = 8;

/// Errors from a single extraction strategy.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("bad signature: {0}")]
    BadSignature(String),

    #[error("truncated archive: {0}")]
    Truncated(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unsafe entry name: {0}")]
    UnsafeName(String),

    #[error("CRC-32 mismatch for {name}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch { name: String, expected: u32, actual: u32 },

    #[error("size mismatch for {name}: expected {expected} bytes, got {actual}")]
    SizeMismatch { name: String, expected: u64, actual: u64 },

    #[error("archive has no entry named {0}")]
    MissingEntry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ArchiveError> for Error {
    fn from(err: ArchiveError) -> Self {
        Error::Extraction(err.to_string())
    }
}

/// One way of turning the archive into the raw dataset file.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Extract `archive` into `destination`, returning the path of `target`.
    fn extract(&self, archive: &Path, destination: &Path, target: &str) -> Result<PathBuf, ArchiveError>;
}

/// Runs extraction strategies in order until one produces the raw file.
pub struct ArchiveExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self::new().with_strategy(CentralDirectoryStrategy).with_strategy(LocalHeaderStrategy::default())
    }
}

impl ArchiveExtractor {
    /// An extractor with no strategies; see [`ArchiveExtractor::default`].
    pub fn new() -> Self {
        Self { strategies: Vec::new() }
    }

    pub fn with_strategy(mut self, strategy: impl ExtractionStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Extract the raw dataset file named `target` from `archive`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Extraction` carrying every strategy's failure when none
    /// succeeded.
    pub fn extract(&self, archive: &Path, destination: &Path, target: &str) -> Result<PathBuf, Error> {
        std::fs::create_dir_all(destination)?;

        let mut reasons = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            match strategy.extract(archive, destination, target) {
                Ok(path) => {
                    tracing::info!(strategy = strategy.name(), path = %path.display(), "archive extracted");
                    return Ok(path);
                }
                Err(e) => {
                    tracing::warn!(strategy = strategy.name(), error = %e, "extraction strategy failed");
                    reasons.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }

        if reasons.is_empty() {
            reasons.push("no extraction strategies configured".to_string());
        }
        Err(Error::Extraction(reasons.join("; ")))
    }
}

/// Resolve a ZIP entry name to a relative path, rejecting anything that could
/// escape the destination directory.
pub fn safe_entry_path(name: &str) -> Result<PathBuf, ArchiveError> {
    let unsafe_name = || ArchiveError::UnsafeName(name.to_string());

    if name.starts_with(['/', '\\']) || name.as_bytes().get(1) == Some(&b':') {
        return Err(unsafe_name());
    }

    let normalized = name.replace('\\', "/");
    let mut path = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return Err(unsafe_name()),
        }
    }

    if path.as_os_str().is_empty() { Err(unsafe_name()) } else { Ok(path) }
}

/// An output file that is deleted unless [`PartialOutput::keep`] is called.
pub(crate) struct PartialOutput {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl PartialOutput {
    pub(crate) fn create(path: &Path) -> Result<Self, ArchiveError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self { path: path.to_path_buf(), writer: Some(BufWriter::with_capacity(1 << 20, file)) })
    }

    pub(crate) fn writer(&mut self) -> Result<&mut BufWriter<File>, ArchiveError> {
        self.writer.as_mut().ok_or_else(|| ArchiveError::Io(std::io::Error::other("output already closed")))
    }

    /// Flush and close the file, keeping it on disk.
    pub(crate) fn keep(mut self) -> Result<PathBuf, ArchiveError> {
        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(|e| ArchiveError::Io(e.into_error()))?;
            file.sync_all()?;
        }
        Ok(std::mem::take(&mut self.path))
    }
}

impl Write for PartialOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(std::io::Error::other("output already closed")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        drop(self.writer.take());
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove partial output");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use tempfile::TempDir;

    pub(crate) struct Entry<'a> {
        pub name: &'a str,
        pub data: &'a [u8],
        pub deflate: bool,
    }

    /// Minimal ZIP writer: local headers, central directory, EOCD.
    pub(crate) fn build_zip(entries: &[Entry<'_>]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();

        for entry in entries {
            let mut crc = flate2::Crc::new();
            crc.update(entry.data);
            let (method, payload) = if entry.deflate {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(entry.data).unwrap();
                (METHOD_DEFLATE, encoder.finish().unwrap())
            } else {
                (METHOD_STORED, entry.data.to_vec())
            };

            let offset = out.len() as u32;
            let name = entry.name.as_bytes();

            out.extend_from_slice(&LOCAL_HEADER_SIGNATURE.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&method.to_le_bytes());
            out.extend_from_slice(&[0; 4]);
            out.extend_from_slice(&crc.sum().to_le_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(name);
            out.extend_from_slice(&payload);

            central.extend_from_slice(&CENTRAL_HEADER_SIGNATURE.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&method.to_le_bytes());
            central.extend_from_slice(&[0; 4]);
            central.extend_from_slice(&crc.sum().to_le_bytes());
            central.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            central.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            central.extend_from_slice(&(name.len() as u16).to_le_bytes());
            central.extend_from_slice(&[0; 12]);
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(name);
        }

        let cd_offset = out.len() as u32;
        out.extend_from_slice(&central);
        out.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(central.len() as u32).to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    /// Overwrite the end-of-central-directory signature.
    pub(crate) fn break_central_directory(zip: &mut [u8]) {
        let pos = zip.len() - 22;
        zip[pos..pos + 4].copy_from_slice(b"XXXX");
    }

    pub(crate) fn sample_rows() -> Vec<u8> {
        let mut rows = Vec::new();
        for i in 0..2_000 {
            rows.extend_from_slice(format!("{i:06}|2030-01-01|VÁLIDO|LUVA DE SEGURANÇA \"TIPO {i}\"\r\n").as_bytes());
        }
        rows
    }

    fn write_archive(dir: &TempDir, zip: &[u8]) -> PathBuf {
        let path = dir.path().join("tgg_export_caepi.zip");
        std::fs::write(&path, zip).unwrap();
        path
    }

    #[test]
    fn test_safe_entry_path() {
        assert_eq!(safe_entry_path("tgg_export_caepi.txt").unwrap(), PathBuf::from("tgg_export_caepi.txt"));
        assert_eq!(safe_entry_path("./dir/file.txt").unwrap(), PathBuf::from("dir/file.txt"));
        assert_eq!(safe_entry_path("dir\\file.txt").unwrap(), PathBuf::from("dir/file.txt"));
        assert!(safe_entry_path("../evil.txt").is_err());
        assert!(safe_entry_path("dir/../../evil.txt").is_err());
        assert!(safe_entry_path("/etc/passwd").is_err());
        assert!(safe_entry_path("\\windows\\system32").is_err());
        assert!(safe_entry_path("C:evil.txt").is_err());
        assert!(safe_entry_path("").is_err());
    }

    #[test]
    fn test_default_extractor_order() {
        assert_eq!(ArchiveExtractor::default().strategy_names(), vec!["central-directory", "local-header"]);
    }

    #[test]
    fn test_primary_path_extracts_target() {
        let dir = TempDir::new().unwrap();
        let rows = sample_rows();
        let zip = build_zip(&[Entry { name: "tgg_export_caepi.txt", data: &rows, deflate: true }]);
        let archive = write_archive(&dir, &zip);

        let out = ArchiveExtractor::default().extract(&archive, dir.path(), "tgg_export_caepi.txt").unwrap();
        assert_eq!(out, dir.path().join("tgg_export_caepi.txt"));
        assert_eq!(std::fs::read(out).unwrap(), rows);
    }

    #[test]
    fn test_fallback_after_broken_central_directory_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let rows = sample_rows();
        let mut zip = build_zip(&[Entry { name: "tgg_export_caepi.txt", data: &rows, deflate: true }]);
        break_central_directory(&mut zip);
        let archive = write_archive(&dir, &zip);

        let out = ArchiveExtractor::default().extract(&archive, dir.path(), "tgg_export_caepi.txt").unwrap();
        assert_eq!(std::fs::read(out).unwrap(), rows);
    }

    #[test]
    fn test_all_strategies_failing_reports_each() {
        let dir = TempDir::new().unwrap();
        let archive = write_archive(&dir, b"this is not a zip archive at all, just text");

        let err = ArchiveExtractor::default().extract(&archive, dir.path(), "tgg_export_caepi.txt").unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("EXTRACTION_FAILED"), "{msg}");
        assert!(msg.contains("central-directory: "), "{msg}");
        assert!(msg.contains("local-header: "), "{msg}");
        assert!(!dir.path().join("tgg_export_caepi.txt").exists());
    }

    #[test]
    fn test_empty_extractor_fails() {
        let dir = TempDir::new().unwrap();
        let archive = write_archive(&dir, b"PK");
        assert!(ArchiveExtractor::new().extract(&archive, dir.path(), "x.txt").is_err());
    }

    #[test]
    fn test_partial_output_removed_unless_kept() {
        let dir = TempDir::new().unwrap();
        let dropped = dir.path().join("dropped.txt");
        let kept = dir.path().join("kept.txt");

        {
            let mut out = PartialOutput::create(&dropped).unwrap();
            out.write_all(b"partial").unwrap();
        }
        assert!(!dropped.exists());

        let mut out = PartialOutput::create(&kept).unwrap();
        out.write_all(b"complete").unwrap();
        assert_eq!(out.keep().unwrap(), kept);
        assert_eq!(std::fs::read(&kept).unwrap(), b"complete");
    }
}
