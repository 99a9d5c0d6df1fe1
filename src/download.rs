//! HTTP(S) downloads for plugin resources (EPG documents, logo archives)

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use flate2::read::GzDecoder;
use log::{debug, info, warn};

use crate::error::{Error, Result};

/// Download configuration
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Maximum retry attempts
    pub max_retries: u32,
    /// Delay between retries in milliseconds
    pub retry_delay_ms: u64,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds
    pub read_timeout_secs: u64,
    /// Chunk size for reading (bytes)
    pub chunk_size: usize,
    /// User agent string
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2000,
            connect_timeout_secs: 30,
            read_timeout_secs: 120,
            chunk_size: 64 * 1024, // 64KB chunks
            user_agent: concat!("m3u-manager/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl DownloadConfig {
    /// Short fixed cap for small metadata fetches
    pub fn metadata() -> Self {
        Self {
            max_retries: 1,
            connect_timeout_secs: 10,
            read_timeout_secs: 10,
            ..Self::default()
        }
    }
}

/// Download progress callback: (downloaded_bytes, total_bytes)
pub type ProgressCallback = Box<dyn Fn(u64, Option<u64>) + Send>;

pub fn is_remote(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Create a configured ureq agent
fn create_agent(config: &DownloadConfig) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(config.read_timeout_secs)))
        .timeout_connect(Some(Duration::from_secs(config.connect_timeout_secs)))
        .max_idle_connections(4)
        .max_idle_connections_per_host(2)
        .build()
        .new_agent()
}

/// Download to a file with retry support (supports HTTP and HTTPS)
pub fn download_to_file(
    url: &str,
    output_path: &Path,
    config: &DownloadConfig,
    progress: Option<ProgressCallback>,
) -> Result<u64> {
    let agent = create_agent(config);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match try_download(&agent, url, output_path, config, &progress) {
            Ok(total) => {
                if let Some(ref cb) = progress {
                    cb(total, Some(total));
                }
                info!("Downloaded {} ({} bytes)", url, total);
                return Ok(total);
            }
            Err(e) => {
                if attempts >= config.max_retries.max(1) {
                    return Err(Error::Network(format!(
                        "Download failed after {} attempts: {}",
                        attempts, e
                    )));
                }
                warn!("Download attempt {} of {} failed: {}", attempts, url, e);
                // Wait before retry
                std::thread::sleep(Duration::from_millis(config.retry_delay_ms));
            }
        }
    }
}

fn try_download(
    agent: &ureq::Agent,
    url: &str,
    output_path: &Path,
    config: &DownloadConfig,
    progress: &Option<ProgressCallback>,
) -> std::result::Result<u64, String> {
    let response = agent
        .get(url)
        .header("User-Agent", &config.user_agent)
        .call()
        .map_err(|e| format!("Request failed: {}", e))?;

    let status = response.status();
    if status != 200 && status != 206 {
        return Err(format!("HTTP error: {}", status));
    }

    // Get content length if available
    let total_size: Option<u64> = response
        .headers()
        .get("Content-Length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok());

    let mut file =
        fs::File::create(output_path).map_err(|e| format!("Create file failed: {}", e))?;

    // Stream the response body
    let mut reader = response.into_body().into_reader();
    let mut buffer = vec![0u8; config.chunk_size];
    let mut downloaded: u64 = 0;

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break, // EOF
            Ok(n) => {
                file.write_all(&buffer[..n])
                    .map_err(|e| format!("Write failed: {}", e))?;
                downloaded += n as u64;

                if let Some(ref cb) = progress {
                    cb(downloaded, total_size);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(format!("Read failed: {}", e)),
        }
    }

    file.flush().map_err(|e| format!("Flush failed: {}", e))?;
    Ok(downloaded)
}

/// Fetch a small resource fully into memory
pub fn fetch_bytes(url: &str, config: &DownloadConfig) -> Result<Vec<u8>> {
    let agent = create_agent(config);
    let response = agent
        .get(url)
        .header("User-Agent", &config.user_agent)
        .call()
        .map_err(|e| Error::Network(format!("Request failed: {}", e)))?;

    if response.status() != 200 {
        return Err(Error::Network(format!("HTTP error: {}", response.status())));
    }

    let mut bytes = Vec::new();
    response
        .into_body()
        .into_reader()
        .read_to_end(&mut bytes)
        .map_err(|e| Error::Network(format!("Read failed: {}", e)))?;
    debug!("Fetched {} ({} bytes)", url, bytes.len());
    Ok(bytes)
}

/// Bytes of a URL or a local path
pub fn read_source(source: &str, config: &DownloadConfig) -> Result<Vec<u8>> {
    if is_remote(source) {
        fetch_bytes(source, config)
    } else {
        fs::read(source).map_err(|e| Error::io(source, e))
    }
}

/// Decompress when the data starts with the gzip magic bytes (1f 8b)
pub fn maybe_gunzip(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if bytes.len() < 2 || bytes[0] != 0x1f || bytes[1] != 0x8b {
        return Ok(bytes);
    }
    let mut out = Vec::with_capacity(bytes.len() * 4);
    GzDecoder::new(bytes.as_slice())
        .read_to_end(&mut out)
        .map_err(|e| Error::Archive(format!("gzip: {}", e)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("HTTPS://example.com/epg.xml"));
        assert!(!is_remote("/home/user/epg.xml"));
    }

    #[test]
    fn test_maybe_gunzip_detects_magic() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"<tv></tv>").unwrap();
        let gz = enc.finish().unwrap();
        assert_eq!(maybe_gunzip(gz).unwrap(), b"<tv></tv>");
        assert_eq!(maybe_gunzip(b"<tv/>".to_vec()).unwrap(), b"<tv/>");
    }

    #[test]
    fn test_read_source_local_missing() {
        let err = read_source("/definitely/missing.xml", &DownloadConfig::metadata()).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
