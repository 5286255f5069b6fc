//! Side file of raw lines that could not be parsed.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Raw lines dropped during one parse pass, flushed to disk once.
#[derive(Debug)]
pub struct ErrorLedger {
    path: PathBuf,
    lines: Vec<String>,
}

impl ErrorLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lines: Vec::new() }
    }

    pub fn record(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write every recorded line to the ledger file, one per line.
    ///
    /// The file is replaced, so it always reflects the latest rebuild.
    pub fn flush(&self) -> std::io::Result<()> {
        let mut out = std::io::BufWriter::new(std::fs::File::create(&self.path)?);
        for line in &self.lines {
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;
        }
        out.flush()
    }
}
