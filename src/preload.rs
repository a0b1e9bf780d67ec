use std::future::Future;
use std::path::PathBuf;

use reqwest::{Client, Url};

use crate::error::{Error, Result};
use crate::lister;

/// Fetches an image ahead of display. Only completion matters, the bytes are dropped.
pub trait Preloader: Send + Sync {
    fn preload(&self, url: &str) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpPreloader {
    client: Client,
    base: Url,
}

impl HttpPreloader {
    pub fn new(client: Client, base: Url) -> Self {
        Self { client, base }
    }

    /// Listed URLs carry raw file names; absolute paths are rebuilt segment by
    /// segment so `#`, `?` and `%` stay part of the name.
    fn resolve(&self, url: &str) -> Result<Url> {
        let Some(path) = url.strip_prefix('/') else {
            return self
                .base
                .join(url)
                .map_err(|err| Error::Url(format!("{url}: {err}")));
        };
        let mut target = self.base.clone();
        target.set_query(None);
        target.set_fragment(None);
        target
            .path_segments_mut()
            .map_err(|()| Error::Url(format!("{url}: base cannot hold a path")))?
            .clear()
            .extend(path.split('/'));
        Ok(target)
    }
}

impl Preloader for HttpPreloader {
    async fn preload(&self, url: &str) -> Result<()> {
        let target = self.resolve(url)?;
        let resp = self.client.get(target.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                status,
                url: target.to_string(),
            });
        }
        resp.bytes().await?;
        Ok(())
    }
}

/// Reads image files straight from the slideshow folder.
#[derive(Debug, Clone)]
pub struct DirectoryPreloader {
    dir: PathBuf,
    url_prefix: String,
}

impl DirectoryPreloader {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into(),
        }
    }

    fn file_for(&self, url: &str) -> Option<PathBuf> {
        let prefix = self.url_prefix.trim_end_matches('/');
        let name = url.strip_prefix(prefix)?.strip_prefix('/')?;
        if name.is_empty() || name.contains(['/', '\\']) || lister::is_hidden(name) {
            return None;
        }
        let path = self.dir.join(name);
        lister::is_image(&path).then_some(path)
    }
}

impl Preloader for DirectoryPreloader {
    async fn preload(&self, url: &str) -> Result<()> {
        let path = self
            .file_for(url)
            .ok_or_else(|| Error::Url(url.to_string()))?;
        tokio::task::spawn_blocking(move || std::fs::read(path)).await??;
        Ok(())
    }
}
