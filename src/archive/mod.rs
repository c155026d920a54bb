//! Archive builder seam.
//!
//! The crawl engine and the media workers all write into one archive; every
//! call goes through [`SharedArchive`], which holds a single lock for the
//! duration of each add.

mod memory;
mod zip;

pub use memory::{MemoryArchive, MemoryItem};
pub use self::zip::ZipArchiveBuilder;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while building an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive not started")]
    NotStarted,

    #[error("Archive already finished")]
    AlreadyFinished,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] ::zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Body of an archive entry.
#[derive(Debug, Clone)]
pub enum ItemContent {
    Bytes(Vec<u8>),
    /// Read from disk at add time, optionally deleting the file afterwards.
    File { path: PathBuf, delete: bool },
}

/// One entry added to the archive.
#[derive(Debug, Clone)]
pub struct ArchiveItem {
    pub path: String,
    pub title: String,
    pub mime_type: String,
    pub content: ItemContent,
    /// Whether the entry is a user-facing page (as opposed to a resource).
    pub is_front: bool,
}

impl ArchiveItem {
    pub fn page(path: &str, title: &str, html: String) -> Self {
        Self {
            path: path.to_string(),
            title: title.to_string(),
            mime_type: "text/html".to_string(),
            content: ItemContent::Bytes(html.into_bytes()),
            is_front: true,
        }
    }

    pub fn resource(path: &str, mime_type: &str, data: Vec<u8>) -> Self {
        Self {
            path: path.to_string(),
            title: String::new(),
            mime_type: mime_type.to_string(),
            content: ItemContent::Bytes(data),
            is_front: false,
        }
    }

    pub fn file(path: &str, mime_type: &str, file: PathBuf, delete: bool) -> Self {
        Self {
            path: path.to_string(),
            title: String::new(),
            mime_type: mime_type.to_string(),
            content: ItemContent::File { path: file, delete },
            is_front: false,
        }
    }
}

/// Descriptive metadata written alongside the archive content.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveMetadata {
    pub name: String,
    pub title: String,
    pub description: String,
    pub language: String,
    pub creator: String,
    pub publisher: String,
    pub tags: Vec<String>,
    pub date: NaiveDate,
    pub main_path: String,
}

impl ArchiveMetadata {
    /// Metadata known before the source site was contacted.
    pub fn new(name: &str, language: &str, date: NaiveDate) -> Self {
        Self {
            name: name.to_string(),
            title: name.to_string(),
            description: String::new(),
            language: language.to_string(),
            creator: String::new(),
            publisher: String::new(),
            tags: Vec::new(),
            date,
            main_path: String::new(),
        }
    }
}

/// Writer for the single-file offline archive.
pub trait ArchiveBuilder: Send {
    fn start(&mut self) -> Result<(), ArchiveError>;

    /// Add an entry. Adding a path twice keeps the first entry.
    fn add_item(&mut self, item: ArchiveItem) -> Result<(), ArchiveError>;

    fn add_redirect(&mut self, path: &str, target: &str, title: &str) -> Result<(), ArchiveError>;

    /// Add a square PNG illustration of `size` pixels.
    fn add_illustration(&mut self, size: u32, png: &[u8]) -> Result<(), ArchiveError>;

    /// Replace the metadata once the source site has been inspected.
    fn set_metadata(&mut self, metadata: ArchiveMetadata);

    /// Update the metadata before `finish` (e.g. the main path once known).
    fn set_main_path(&mut self, path: &str);

    fn set_can_finish(&mut self, can_finish: bool);

    fn can_finish(&self) -> bool;

    /// Finalize the archive, or discard it when it was marked non-finalizable.
    fn finish(&mut self) -> Result<(), ArchiveError>;
}

/// Cloneable, lock-protected handle to the run's archive builder.
#[derive(Clone)]
pub struct SharedArchive {
    inner: Arc<Mutex<Box<dyn ArchiveBuilder>>>,
}

impl SharedArchive {
    pub fn new(builder: impl ArchiveBuilder + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(builder))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn ArchiveBuilder>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn start(&self) -> Result<(), ArchiveError> {
        self.lock().start()
    }

    pub fn add_item(&self, item: ArchiveItem) -> Result<(), ArchiveError> {
        self.lock().add_item(item)
    }

    pub fn add_redirect(&self, path: &str, target: &str, title: &str) -> Result<(), ArchiveError> {
        self.lock().add_redirect(path, target, title)
    }

    pub fn add_illustration(&self, size: u32, png: &[u8]) -> Result<(), ArchiveError> {
        self.lock().add_illustration(size, png)
    }

    pub fn set_metadata(&self, metadata: ArchiveMetadata) {
        self.lock().set_metadata(metadata)
    }

    pub fn set_main_path(&self, path: &str) {
        self.lock().set_main_path(path)
    }

    pub fn set_can_finish(&self, can_finish: bool) {
        self.lock().set_can_finish(can_finish)
    }

    pub fn can_finish(&self) -> bool {
        self.lock().can_finish()
    }

    pub fn finish(&self) -> Result<(), ArchiveError> {
        self.lock().finish()
    }
}

/// Body of a redirect entry: a page that immediately forwards to `target`.
pub(crate) fn redirect_html(path: &str, target: &str, title: &str) -> String {
    let href = format!("{}{}", crate::utils::to_root_for(path), target);
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
         <meta http-equiv=\"refresh\" content=\"0;url={href}\">\
         <title>{title}</title></head>\
         <body><a href=\"{href}\">{title}</a></body></html>\n",
        href = href,
        title = title
    )
}
