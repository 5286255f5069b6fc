//! Anonymous FTP download over a plain control/data connection pair.
//!
//! ### Session
//! - `USER anonymous` (+ `PASS` on 331), `TYPE I`, `CWD <dir>`
//! - Data channel via `PASV` or `EPSV`, then `RETR <file>`
//! - Completion is confirmed by the 226/250 reply after the data stream
//!   closes; a stream that ends without it is a failure.
//!
//! The PASV address advertised by the server is ignored; the data connection
//! goes to the control connection's peer. Servers behind NAT routinely
//! advertise private addresses.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use caepi_core::AppConfig;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use super::{ScratchFile, TransportError, TransportStrategy, deadline};

const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// FTP protocol failures.
#[derive(Debug, thiserror::Error)]
pub enum FtpError {
    #[error("connect to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("{command} rejected: {code} {text}")]
    Rejected { command: String, code: u16, text: String },

    #[error("malformed reply: {0}")]
    MalformedReply(String),

    #[error("control connection closed by server")]
    Closed,
}

/// How the data connection is negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelMode {
    /// `PASV` (RFC 959)
    Passive,
    /// `EPSV` (RFC 2428)
    ExtendedPassive,
}

impl DataChannelMode {
    pub fn strategy_name(self) -> &'static str {
        match self {
            DataChannelMode::Passive => "ftp-pasv",
            DataChannelMode::ExtendedPassive => "ftp-epsv",
        }
    }
}

/// Where the archive lives on the FTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpTarget {
    pub host: String,
    pub port: u16,
    pub directory: String,
    pub file_name: String,
}

impl FtpTarget {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            host: config.ftp_host.clone(),
            port: config.ftp_port,
            directory: config.ftp_path.clone(),
            file_name: config.archive_name.clone(),
        }
    }
}

/// Downloads the archive with anonymous FTP in one data channel mode.
pub struct FtpStrategy {
    target: FtpTarget,
    mode: DataChannelMode,
    timeout: Duration,
}

impl FtpStrategy {
    pub fn new(target: FtpTarget, mode: DataChannelMode, timeout: Duration) -> Self {
        Self { target, mode, timeout }
    }

    async fn open_data_channel(&self, control: &mut ControlChannel) -> Result<TcpStream, TransportError> {
        let port = match self.mode {
            DataChannelMode::Passive => {
                let reply = control.exchange("PASV", &[227]).await?;
                parse_pasv_port(&reply.text)?
            }
            DataChannelMode::ExtendedPassive => {
                let reply = control.exchange("EPSV", &[229]).await?;
                parse_epsv_port(&reply.text)?
            }
        };

        let addr = SocketAddr::new(control.peer, port);
        tracing::debug!(%addr, mode = ?self.mode, "opening data connection");
        connect(addr, self.timeout).await
    }
}

#[async_trait]
impl TransportStrategy for FtpStrategy {
    fn name(&self) -> &str {
        self.mode.strategy_name()
    }

    async fn fetch(&self, destination: &Path) -> Result<u64, TransportError> {
        let mut control = ControlChannel::connect(&self.target.host, self.target.port, self.timeout).await?;
        control.read_expected("greeting", &[220]).await?;

        let reply = control.exchange("USER anonymous", &[230, 331]).await?;
        if reply.code == 331 {
            control.exchange("PASS anonymous@", &[230, 202]).await?;
        }
        control.exchange("TYPE I", &[200]).await?;

        let directory = self.target.directory.trim_end_matches('/');
        if !directory.is_empty() {
            control.exchange(&format!("CWD {directory}"), &[250]).await?;
        }

        let mut data = self.open_data_channel(&mut control).await?;
        control.exchange(&format!("RETR {}", self.target.file_name), &[125, 150]).await?;

        let mut scratch = ScratchFile::create(destination).await?;
        let mut buf = vec![0u8; COPY_BUFFER_BYTES];
        loop {
            let n = deadline(self.timeout, data.read(&mut buf)).await?;
            if n == 0 {
                break;
            }
            scratch.write_all(&buf[..n]).await?;
        }
        drop(data);

        control.read_expected("RETR completion", &[226, 250]).await?;
        let bytes = scratch.commit().await?;

        if let Err(e) = control.send("QUIT").await {
            tracing::debug!(error = %e, "QUIT failed after successful transfer");
        }

        Ok(bytes)
    }
}

/// A single (possibly multi-line) server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

struct ControlChannel {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: IpAddr,
    timeout: Duration,
}

async fn connect<A>(addr: A, timeout: Duration) -> Result<TcpStream, TransportError>
where
    A: tokio::net::ToSocketAddrs + std::fmt::Display,
{
    let label = addr.to_string();
    deadline(timeout, TcpStream::connect(addr)).await.map_err(|e| match e {
        TransportError::Io(io) => FtpError::Connect { addr: label, reason: io.to_string() }.into(),
        other => other,
    })
}

impl ControlChannel {
    async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let stream = connect(format!("{host}:{port}"), timeout).await?;
        let peer = stream.peer_addr()?.ip();
        let (read_half, writer) = stream.into_split();
        Ok(Self { reader: BufReader::new(read_half), writer, peer, timeout })
    }

    async fn send(&mut self, command: &str) -> Result<(), TransportError> {
        let line = format!("{command}\r\n");
        deadline(self.timeout, self.writer.write_all(line.as_bytes())).await
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        let mut raw = Vec::new();
        let n = deadline(self.timeout, self.reader.read_until(b'\n', &mut raw)).await?;
        if n == 0 {
            return Err(FtpError::Closed.into());
        }
        Ok(String::from_utf8_lossy(&raw).trim_end_matches(['\r', '\n']).to_string())
    }

    async fn read_reply(&mut self) -> Result<Reply, TransportError> {
        let first = self.read_line().await?;
        let (code, multiline) = parse_status_line(&first).ok_or_else(|| FtpError::MalformedReply(first.clone()))?;
        let mut text = first.get(4..).unwrap_or_default().to_string();

        if multiline {
            let terminator = format!("{code} ");
            loop {
                let line = self.read_line().await?;
                if line.starts_with(&terminator) {
                    text.push('\n');
                    text.push_str(line.get(4..).unwrap_or_default());
                    break;
                }
                text.push('\n');
                text.push_str(&line);
            }
        }

        tracing::trace!(code, text = %text, "ftp reply");
        Ok(Reply { code, text })
    }

    /// Read a reply and require one of `accepted` codes.
    async fn read_expected(&mut self, what: &str, accepted: &[u16]) -> Result<Reply, TransportError> {
        let reply = self.read_reply().await?;
        if accepted.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(FtpError::Rejected { command: what.to_string(), code: reply.code, text: reply.text }.into())
        }
    }

    /// Send `command` and require one of `accepted` codes in the reply.
    async fn exchange(&mut self, command: &str, accepted: &[u16]) -> Result<Reply, TransportError> {
        self.send(command).await?;
        let verb = command.split_whitespace().next().unwrap_or(command);
        self.read_expected(verb, accepted).await
    }
}

/// Split `"227 text"` / `"220-text"` into the code and whether more lines follow.
pub fn parse_status_line(line: &str) -> Option<(u16, bool)> {
    let digits = line.get(..3)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code = digits.parse().ok()?;
    match line.as_bytes().get(3) {
        None | Some(b' ') => Some((code, false)),
        Some(b'-') => Some((code, true)),
        Some(_) => None,
    }
}

/// Port from a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply text.
pub fn parse_pasv_port(text: &str) -> Result<u16, FtpError> {
    let malformed = || FtpError::MalformedReply(format!("PASV: {text}"));
    let start = text.find(|c: char| c.is_ascii_digit()).ok_or_else(malformed)?;
    let numbers: Vec<u16> = text[start..]
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .take(6)
        .map(|s| s.parse::<u16>())
        .collect::<Result<_, _>>()
        .map_err(|_| malformed())?;

    match numbers.as_slice() {
        [_, _, _, _, hi, lo] if *hi <= 255 && *lo <= 255 => Ok(hi * 256 + lo),
        _ => Err(malformed()),
    }
}

/// Port from a `229 Entering Extended Passive Mode (|||port|)` reply text.
pub fn parse_epsv_port(text: &str) -> Result<u16, FtpError> {
    let malformed = || FtpError::MalformedReply(format!("EPSV: {text}"));
    let open = text.find('(').ok_or_else(malformed)?;
    let close = text[open..].find(')').map(|i| open + i).ok_or_else(malformed)?;
    let inner = &text[open + 1..close];

    let delim = inner.chars().next().ok_or_else(malformed)?;
    let fields: Vec<&str> = inner.split(delim).collect();
    match fields.as_slice() {
        ["", "", "", port, ""] => port.parse().map_err(|_| malformed()),
        _ => Err(malformed()),
    }
}
