//! Fallback decoder for archives whose central directory is unusable.
//!
//! Only the first local file header is read. Its payload is treated as a raw
//! deflate stream and inflated in fixed-size chunks straight to disk.

use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use flate2::{CrcWriter, Decompress, FlushDecompress, Status};

use super::{ArchiveError, ExtractionStrategy, LOCAL_HEADER_LEN, LOCAL_HEADER_SIGNATURE, METHOD_DEFLATE, PartialOutput};

/// Input chunk size fed to the inflater.
pub const CHUNK_SIZE: usize = 1 << 20;

const OUTPUT_BUFFER_SIZE: usize = 256 * 1024;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Incremental raw-deflate decoder writing into `sink`.
///
/// Feed it consecutive chunks with [`StreamingInflater::feed`], flagging the
/// last one. Input past the end of the deflate stream is ignored.
pub struct StreamingInflater<W: Write> {
    state: Decompress,
    cursor: u64,
    sink: W,
    finished: bool,
    buffer: Vec<u8>,
}

impl<W: Write> StreamingInflater<W> {
    pub fn new(sink: W) -> Self {
        Self { state: Decompress::new(false), cursor: 0, sink, finished: false, buffer: vec![0; OUTPUT_BUFFER_SIZE] }
    }

    /// Compressed bytes consumed so far.
    #[cfg(test)]
    pub(crate) fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Inflate `chunk`. With `last` set, the stream must end inside it.
    pub fn feed(&mut self, chunk: &[u8], last: bool) -> Result<(), ArchiveError> {
        let mut input = chunk;
        while !self.finished {
            let in_before = self.state.total_in();
            let out_before = self.state.total_out();

            let status = self
                .state
                .decompress(input, &mut self.buffer, FlushDecompress::None)
                .map_err(|e| ArchiveError::Corrupt(format!("inflate failed at byte {}: {e}", self.cursor)))?;

            let consumed = (self.state.total_in() - in_before) as usize;
            let produced = (self.state.total_out() - out_before) as usize;
            self.cursor += consumed as u64;
            input = &input[consumed..];
            self.sink.write_all(&self.buffer[..produced])?;

            if status == Status::StreamEnd {
                self.finished = true;
            } else if consumed == 0 && produced == 0 {
                break;
            }
        }

        if last && !self.finished {
            return Err(ArchiveError::Truncated(format!("deflate stream ended early after {} bytes", self.cursor)));
        }
        Ok(())
    }

    /// Flush and return the sink; fails if the stream never ended.
    pub fn finish(mut self) -> Result<W, ArchiveError> {
        if !self.finished {
            return Err(ArchiveError::Truncated(format!("deflate stream incomplete after {} bytes", self.cursor)));
        }
        self.sink.flush()?;
        Ok(self.sink)
    }
}

/// Header fields of the first local entry that the fallback needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalHeader {
    pub flags: u16,
    pub method: u16,
    pub crc32: u32,
    pub payload_offset: usize,
}

/// Parse the local file header at the start of `data`.
pub fn read_local_header(data: &[u8]) -> Result<LocalHeader, ArchiveError> {
    if data.len() < LOCAL_HEADER_LEN {
        return Err(ArchiveError::Truncated(format!("{} bytes is shorter than a local header", data.len())));
    }
    if LittleEndian::read_u32(&data[0..4]) != LOCAL_HEADER_SIGNATURE {
        return Err(ArchiveError::BadSignature("archive does not start with a local file header".into()));
    }

    let name_len = usize::from(LittleEndian::read_u16(&data[26..28]));
    let extra_len = usize::from(LittleEndian::read_u16(&data[28..30]));
    let payload_offset = LOCAL_HEADER_LEN + name_len + extra_len;
    if payload_offset >= data.len() {
        return Err(ArchiveError::Truncated(format!("payload offset {payload_offset} is past the end of the archive")));
    }

    Ok(LocalHeader {
        flags: LittleEndian::read_u16(&data[6..8]),
        method: LittleEndian::read_u16(&data[8..10]),
        crc32: LittleEndian::read_u32(&data[14..18]),
        payload_offset,
    })
}

/// Inflates the first local entry into `destination/<target>`.
#[derive(Debug, Clone, Copy)]
pub struct LocalHeaderStrategy {
    chunk_size: usize,
}

impl Default for LocalHeaderStrategy {
    fn default() -> Self {
        Self { chunk_size: CHUNK_SIZE }
    }
}

impl LocalHeaderStrategy {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self { chunk_size: chunk_size.max(1) }
    }
}

impl ExtractionStrategy for LocalHeaderStrategy {
    fn name(&self) -> &str {
        "local-header"
    }

    fn extract(&self, archive: &Path, destination: &Path, target: &str) -> Result<PathBuf, ArchiveError> {
        let data = std::fs::read(archive)?;
        let header = read_local_header(&data)?;
        if header.method != METHOD_DEFLATE {
            return Err(ArchiveError::Unsupported(format!("compression method {}", header.method)));
        }

        let output = PartialOutput::create(&destination.join(target))?;
        let mut inflater = StreamingInflater::new(CrcWriter::new(output));

        let payload = &data[header.payload_offset..];
        let mut chunks = payload.chunks(self.chunk_size).peekable();
        while let Some(chunk) = chunks.next() {
            inflater.feed(chunk, chunks.peek().is_none())?;
            if inflater.is_finished() {
                break;
            }
        }

        let sink = inflater.finish()?;
        if header.flags & FLAG_DATA_DESCRIPTOR == 0 && sink.crc().sum() != header.crc32 {
            return Err(ArchiveError::ChecksumMismatch {
                name: target.to_string(),
                expected: header.crc32,
                actual: sink.crc().sum(),
            });
        }

        tracing::debug!(bytes = sink.crc().amount(), consumed = payload.len(), "inflated local entry");
        sink.into_inner().keep()
    }
}
