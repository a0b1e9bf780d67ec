use std::ffi::OsStr;
use std::fs;
use std::io;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};
use walkdir::WalkDir;

/// Recognised image suffixes, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg"];

/// Ordered, immutable list of image URLs.
///
/// Clones share the same allocation, so [`ImageList::same_identity`] can tell
/// a re-fetched list apart from the one it replaced even when the contents match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageList(Arc<[String]>);

impl ImageList {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn same_identity(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for ImageList {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for ImageList {
    fn from(urls: Vec<String>) -> Self {
        Self(urls.into())
    }
}

impl<'a> FromIterator<&'a str> for ImageList {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(str::to_string).collect::<Vec<_>>().into()
    }
}

/// Body of `GET /api/slideshow`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideshowResponse {
    pub images: ImageList,
}

#[inline]
pub fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(OsStr::to_str)
            .map(|s| s.to_ascii_lowercase()),
        Some(ref e) if SUPPORTED_EXTENSIONS.contains(&e.as_str())
    )
}

/// Dot-files are never listed nor served.
#[inline]
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Lists the images in `dir` as URLs under `url_prefix`, sorted by raw file name.
///
/// Never fails: a missing directory is created and yields an empty list, any
/// other I/O problem is logged and also yields an empty list.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn list_images(dir: &Path, url_prefix: &str) -> ImageList {
    if !dir.exists() {
        match fs::create_dir_all(dir) {
            Ok(()) => info!("slideshow directory missing; created it"),
            Err(err) => error!(error = %err, "failed to create slideshow directory"),
        }
        return ImageList::empty();
    }

    match read_image_names(dir) {
        Ok(names) => {
            let prefix = url_prefix.trim_end_matches('/');
            let images: ImageList = names
                .into_iter()
                .map(|name| format!("{prefix}/{name}"))
                .collect::<Vec<_>>()
                .into();
            debug!(count = images.len(), "listed slideshow images");
            images
        }
        Err(err) => {
            error!(error = %err, "error reading slideshow directory");
            ImageList::empty()
        }
    }
}

fn read_image_names(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        match entry.file_name().to_str() {
            Some(name) if is_hidden(name) => debug!(name, "skipping hidden file"),
            Some(name) => names.push(name.to_string()),
            None => debug!(path = %entry.path().display(), "skipping non UTF-8 file name"),
        }
    }
    // Byte order: uppercase names sort ahead of lowercase ones.
    names.sort_unstable();
    Ok(names)
}
