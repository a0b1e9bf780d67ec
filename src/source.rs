//! Where the slideshow controller gets its image list from.

use std::future::Future;
use std::path::PathBuf;

use reqwest::{Client, Url};
use tracing::debug;

use crate::error::{Error, Result};
use crate::lister::{self, ImageList, SlideshowResponse};

pub const SLIDESHOW_ENDPOINT: &str = "/api/slideshow";

pub trait ImageSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<ImageList>> + Send;
}

/// Asks a running server for `GET /api/slideshow`.
#[derive(Debug, Clone)]
pub struct HttpImageSource {
    client: Client,
    endpoint: Url,
}

impl HttpImageSource {
    pub fn new(client: Client, base: &Url) -> Result<Self> {
        let endpoint = base
            .join(SLIDESHOW_ENDPOINT)
            .map_err(|err| Error::Url(format!("{base}{SLIDESHOW_ENDPOINT}: {err}")))?;
        Ok(Self { client, endpoint })
    }
}

impl ImageSource for HttpImageSource {
    async fn fetch(&self) -> Result<ImageList> {
        let resp = self.client.get(self.endpoint.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                status,
                url: self.endpoint.to_string(),
            });
        }
        let body: SlideshowResponse = resp.json().await?;
        debug!(count = body.images.len(), url = %self.endpoint, "fetched image list");
        Ok(body.images)
    }
}

/// Reads the image folder directly, bypassing HTTP.
#[derive(Debug, Clone)]
pub struct DirectoryImageSource {
    dir: PathBuf,
    url_prefix: String,
}

impl DirectoryImageSource {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into(),
        }
    }
}

impl ImageSource for DirectoryImageSource {
    async fn fetch(&self) -> Result<ImageList> {
        let dir = self.dir.clone();
        let prefix = self.url_prefix.clone();
        Ok(tokio::task::spawn_blocking(move || lister::list_images(&dir, &prefix)).await?)
    }
}
