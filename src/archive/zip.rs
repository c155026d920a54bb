//! ZIP-backed archive builder.
//!
//! The archive is written to a temporary file next to the output and only
//! moved into place by `finish()`; a builder dropped or marked
//! non-finalizable leaves nothing behind.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{redirect_html, ArchiveBuilder, ArchiveError, ArchiveItem, ArchiveMetadata, ItemContent};

#[derive(Serialize)]
struct MetadataFile<'a> {
    #[serde(flatten)]
    metadata: &'a ArchiveMetadata,
    redirects: &'a [(String, String)],
    entries: usize,
}

pub struct ZipArchiveBuilder {
    output: PathBuf,
    metadata: ArchiveMetadata,
    writer: Option<ZipWriter<NamedTempFile>>,
    entries: HashSet<String>,
    redirects: Vec<(String, String)>,
    can_finish: bool,
    finished: bool,
}

impl ZipArchiveBuilder {
    pub fn new(output: impl Into<PathBuf>, metadata: ArchiveMetadata) -> Self {
        Self {
            output: output.into(),
            metadata,
            writer: None,
            entries: HashSet::new(),
            redirects: Vec::new(),
            can_finish: true,
            finished: false,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Media that is already compressed gains nothing from deflate.
    fn options_for(mime_type: &str) -> SimpleFileOptions {
        let method = if (mime_type.starts_with("image/") && mime_type != "image/svg+xml")
            || mime_type.starts_with("video/")
            || mime_type.starts_with("font/woff")
        {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        SimpleFileOptions::default().compression_method(method)
    }

    fn write_entry(&mut self, path: &str, mime_type: &str, data: &[u8]) -> Result<bool, ArchiveError> {
        if self.finished {
            return Err(ArchiveError::AlreadyFinished);
        }
        if !self.entries.insert(path.to_string()) {
            debug!("Ignoring duplicate entry {}", path);
            return Ok(false);
        }
        let options = Self::options_for(mime_type);
        let writer = self.writer.as_mut().ok_or(ArchiveError::NotStarted)?;
        writer.start_file(path, options)?;
        writer.write_all(data)?;
        Ok(true)
    }
}

impl ArchiveBuilder for ZipArchiveBuilder {
    fn start(&mut self) -> Result<(), ArchiveError> {
        if self.writer.is_some() {
            return Ok(());
        }
        let dir = match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let tmp = NamedTempFile::new_in(&dir)?;
        debug!("Writing archive to {}", tmp.path().display());
        self.writer = Some(ZipWriter::new(tmp));
        Ok(())
    }

    fn add_item(&mut self, item: ArchiveItem) -> Result<(), ArchiveError> {
        match item.content {
            ItemContent::Bytes(data) => {
                self.write_entry(&item.path, &item.mime_type, &data)?;
            }
            ItemContent::File { path, delete } => {
                let data = std::fs::read(&path)?;
                self.write_entry(&item.path, &item.mime_type, &data)?;
                if delete {
                    if let Err(e) = std::fs::remove_file(&path) {
                        warn!("Unable to remove {}: {}", path.display(), e);
                    }
                }
            }
        }
        Ok(())
    }

    fn add_redirect(&mut self, path: &str, target: &str, title: &str) -> Result<(), ArchiveError> {
        let html = redirect_html(path, target, title);
        if self.write_entry(path, "text/html", html.as_bytes())? {
            self.redirects.push((path.to_string(), target.to_string()));
        }
        Ok(())
    }

    fn add_illustration(&mut self, size: u32, png: &[u8]) -> Result<(), ArchiveError> {
        let path = format!("illustration_{size}x{size}.png");
        self.write_entry(&path, "image/png", png)?;
        Ok(())
    }

    fn set_metadata(&mut self, metadata: ArchiveMetadata) {
        let main_path = std::mem::take(&mut self.metadata.main_path);
        self.metadata = metadata;
        if self.metadata.main_path.is_empty() {
            self.metadata.main_path = main_path;
        }
    }

    fn set_main_path(&mut self, path: &str) {
        self.metadata.main_path = path.to_string();
    }

    fn set_can_finish(&mut self, can_finish: bool) {
        self.can_finish = can_finish;
    }

    fn can_finish(&self) -> bool {
        self.can_finish
    }

    fn finish(&mut self) -> Result<(), ArchiveError> {
        if self.finished {
            return Err(ArchiveError::AlreadyFinished);
        }
        self.finished = true;
        let Some(mut writer) = self.writer.take() else {
            return Err(ArchiveError::NotStarted);
        };

        if !self.can_finish {
            warn!("Archive marked as not finalizable, discarding it");
            // the temporary file is removed on drop
            drop(writer);
            return Ok(());
        }

        let metadata = MetadataFile {
            metadata: &self.metadata,
            redirects: &self.redirects,
            entries: self.entries.len(),
        };
        let json = serde_json::to_vec_pretty(&metadata)?;
        writer.start_file("metadata.json", Self::options_for("application/json"))?;
        writer.write_all(&json)?;

        let tmp = writer.finish()?;
        tmp.persist(&self.output).map_err(|e| ArchiveError::Io(e.error))?;
        info!(
            "Archive {} finished with {} entries",
            self.output.display(),
            self.entries.len()
        );
        Ok(())
    }
}
