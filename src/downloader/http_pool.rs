use std::path::Path;
use std::time::Duration;
use futures_util::StreamExt;
use reqwest::{Client, ClientBuilder, Response};
use tokio::io::AsyncWriteExt;
use crate::errors::{AppError, Result};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Shared HTTP client for API calls and audio streams.
pub struct HttpPool {
    client: Client,
}

impl HttpPool {
    /// `timeout` bounds a whole request including the body; the per-track
    /// timeout of the attempt strategy sits on top of it.
    pub fn new(max_connections: usize, timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(max_connections)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .gzip(true)
            .brotli(true)
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self { client })
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }

    /// Streams the response body of `url` into `path` and returns the number
    /// of bytes written. A non-2xx status is an error and leaves no file.
    pub async fn download_to_file(&self, url: &str, path: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?;
        check_status(&response)?;

        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(path).await;
                    return Err(e.into());
                }
            };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        Ok(written)
    }
}

fn check_status(response: &Response) -> Result<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(AppError::AttemptFailed(format!("HTTP error: {}", response.status())))
    }
}
