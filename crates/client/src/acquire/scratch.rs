//! Partial-download guard.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// A download in progress at `<target>.part`.
///
/// [`ScratchFile::commit`] flushes and renames it onto the target; dropping
/// it uncommitted removes the partial file.
pub struct ScratchFile {
    part_path: PathBuf,
    target: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl ScratchFile {
    pub async fn create(target: &Path) -> std::io::Result<Self> {
        let mut part_name = target.as_os_str().to_owned();
        part_name.push(".part");
        let part_path = PathBuf::from(part_name);

        let file = File::create(&part_path).await?;
        Ok(Self {
            part_path,
            target: target.to_path_buf(),
            writer: Some(BufWriter::with_capacity(1 << 20, file)),
            written: 0,
        })
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("scratch file already committed"))?;
        writer.write_all(bytes).await?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush, close and move the file onto its target path.
    pub async fn commit(mut self) -> std::io::Result<u64> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.into_inner().sync_all().await?;
        }
        tokio::fs::rename(&self.part_path, &self.target).await?;
        self.part_path.clear();
        Ok(self.written)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.part_path.as_os_str().is_empty() {
            drop(self.writer.take());
            if let Err(e) = std::fs::remove_file(&self.part_path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %self.part_path.display(), error = %e, "failed to remove partial download");
            }
        }
    }
}
