//! HTTP(S) mirror download.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use super::{ScratchFile, TransportError, TransportStrategy, deadline};

/// Downloads the archive from an HTTP(S) mirror, streaming to disk.
pub struct HttpMirrorStrategy {
    http: Client,
    url: Url,
    timeout: Duration,
}

impl HttpMirrorStrategy {
    /// Build a mirror strategy; `url` must be an absolute http(s) URL.
    pub fn new(url: &str, user_agent: &str, timeout: Duration) -> Result<Self, TransportError> {
        let url = Url::parse(url.trim()).map_err(|e| TransportError::Http(format!("invalid mirror URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::Http(format!("unsupported mirror scheme: {}", url.scheme())));
        }

        let http = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .use_rustls_tls()
            .build()?;

        Ok(Self { http, url, timeout })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl TransportStrategy for HttpMirrorStrategy {
    fn name(&self) -> &str {
        "http-mirror"
    }

    async fn fetch(&self, destination: &Path) -> Result<u64, TransportError> {
        let mut response = deadline(self.timeout, self.http.get(self.url.clone()).send()).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http(format!("status {}", status.as_u16())));
        }

        let expected = response.content_length();
        let mut scratch = ScratchFile::create(destination).await?;
        while let Some(chunk) = deadline(self.timeout, response.chunk()).await? {
            scratch.write_all(&chunk).await?;
        }

        if let Some(expected) = expected
            && expected != scratch.written()
        {
            return Err(TransportError::Http(format!(
                "body truncated: {} of {} bytes",
                scratch.written(),
                expected
            )));
        }

        tracing::debug!(url = %self.url, bytes = scratch.written(), "mirror download complete");
        Ok(scratch.commit().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers one request with `head` followed by `body`, then closes.
    async fn fake_mirror(head: String, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.write_all(&body).await;
            let _ = stream.shutdown().await;
        });

        format!("http://{addr}/caepi/tgg_export_caepi.zip")
    }

    fn mirror(url: &str) -> HttpMirrorStrategy {
        HttpMirrorStrategy::new(url, "caepi/0.1", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_download_streams_body_to_destination() {
        let dir = TempDir::new().unwrap();
        let body: Vec<u8> = (0..150_000u32).map(|i| (i % 253) as u8).collect();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let url = fake_mirror(head, body.clone()).await;
        let dest = dir.path().join("tgg_export_caepi.zip");

        let bytes = mirror(&url).fetch(&dest).await.unwrap();
        assert_eq!(bytes, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert!(!dir.path().join("tgg_export_caepi.zip.part").exists());
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let dir = TempDir::new().unwrap();
        let head = "HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\n".to_string();
        let url = fake_mirror(head, b"not found".to_vec()).await;
        let dest = dir.path().join("tgg_export_caepi.zip");

        let err = mirror(&url).fetch(&dest).await.unwrap_err();
        assert!(matches!(&err, TransportError::Http(msg) if msg == "status 404"), "{err}");
        assert!(!dest.exists());
        assert!(!dir.path().join("tgg_export_caepi.zip.part").exists());
    }

    #[tokio::test]
    async fn test_short_body_is_rejected_and_discarded() {
        let dir = TempDir::new().unwrap();
        let head = "HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\n".to_string();
        let url = fake_mirror(head, vec![0x50; 100]).await;
        let dest = dir.path().join("tgg_export_caepi.zip");

        let err = mirror(&url).fetch(&dest).await.unwrap_err();
        assert!(matches!(err, TransportError::Http(_)), "{err}");
        assert!(!dest.exists());
        assert!(!dir.path().join("tgg_export_caepi.zip.part").exists());
    }

    #[test]
    fn test_rejects_non_http_mirror() {
        let err = HttpMirrorStrategy::new("ftp://example.com/a.zip", "caepi/0.1", Duration::from_secs(1));
        assert!(matches!(err, Err(TransportError::Http(msg)) if msg.contains("scheme")));
    }

    #[test]
    fn test_rejects_relative_mirror() {
        assert!(HttpMirrorStrategy::new("/a.zip", "caepi/0.1", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_accepts_https_mirror() {
        let strategy =
            HttpMirrorStrategy::new(" https://mirror.example.com/caepi.zip ", "caepi/0.1", Duration::from_secs(1)).unwrap();
        assert_eq!(strategy.name(), "http-mirror");
        assert_eq!(strategy.url().host_str(), Some("mirror.example.com"));
    }
}
