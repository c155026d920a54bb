//! In-memory archive builder for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ArchiveBuilder, ArchiveError, ArchiveItem, ArchiveMetadata, ItemContent};

/// A stored entry.
#[derive(Debug, Clone)]
pub struct MemoryItem {
    pub title: String,
    pub mime_type: String,
    pub content: Vec<u8>,
    pub is_front: bool,
}

impl MemoryItem {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

#[derive(Debug, Default)]
struct State {
    started: bool,
    finished: bool,
    can_finish: bool,
    main_path: String,
    metadata: Option<ArchiveMetadata>,
    items: BTreeMap<String, MemoryItem>,
    redirects: BTreeMap<String, String>,
    illustrations: BTreeMap<u32, Vec<u8>>,
    duplicates: usize,
}

/// Cloneable handle; every clone sees the same entries.
#[derive(Debug, Clone)]
pub struct MemoryArchive {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                can_finish: true,
                ..State::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn item(&self, path: &str) -> Option<MemoryItem> {
        self.state().items.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.state().items.keys().cloned().collect()
    }

    pub fn item_count(&self) -> usize {
        self.state().items.len()
    }

    pub fn redirect(&self, path: &str) -> Option<String> {
        self.state().redirects.get(path).cloned()
    }

    pub fn has_illustration(&self, size: u32) -> bool {
        self.state().illustrations.contains_key(&size)
    }

    /// How many adds were ignored because the path already existed.
    pub fn duplicates(&self) -> usize {
        self.state().duplicates
    }

    pub fn main_path(&self) -> String {
        self.state().main_path.clone()
    }

    pub fn metadata(&self) -> Option<ArchiveMetadata> {
        self.state().metadata.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.state().finished
    }

    fn insert(&self, path: &str, item: MemoryItem) -> Result<bool, ArchiveError> {
        let mut state = self.state();
        if !state.started {
            return Err(ArchiveError::NotStarted);
        }
        if state.finished {
            return Err(ArchiveError::AlreadyFinished);
        }
        if state.items.contains_key(path) || state.redirects.contains_key(path) {
            state.duplicates += 1;
            return Ok(false);
        }
        state.items.insert(path.to_string(), item);
        Ok(true)
    }
}

impl ArchiveBuilder for MemoryArchive {
    fn start(&mut self) -> Result<(), ArchiveError> {
        self.state().started = true;
        Ok(())
    }

    fn add_item(&mut self, item: ArchiveItem) -> Result<(), ArchiveError> {
        let content = match item.content {
            ItemContent::Bytes(data) => data,
            ItemContent::File { path, delete } => {
                let data = std::fs::read(&path)?;
                if delete {
                    std::fs::remove_file(&path)?;
                }
                data
            }
        };
        self.insert(
            &item.path,
            MemoryItem {
                title: item.title,
                mime_type: item.mime_type,
                content,
                is_front: item.is_front,
            },
        )?;
        Ok(())
    }

    fn add_redirect(&mut self, path: &str, target: &str, _title: &str) -> Result<(), ArchiveError> {
        let mut state = self.state();
        if !state.started {
            return Err(ArchiveError::NotStarted);
        }
        if state.items.contains_key(path) || state.redirects.contains_key(path) {
            state.duplicates += 1;
            return Ok(());
        }
        state.redirects.insert(path.to_string(), target.to_string());
        Ok(())
    }

    fn add_illustration(&mut self, size: u32, png: &[u8]) -> Result<(), ArchiveError> {
        self.state().illustrations.insert(size, png.to_vec());
        Ok(())
    }

    fn set_metadata(&mut self, metadata: ArchiveMetadata) {
        self.state().metadata = Some(metadata);
    }

    fn set_main_path(&mut self, path: &str) {
        self.state().main_path = path.to_string();
    }

    fn set_can_finish(&mut self, can_finish: bool) {
        self.state().can_finish = can_finish;
    }

    fn can_finish(&self) -> bool {
        self.state().can_finish
    }

    fn finish(&mut self) -> Result<(), ArchiveError> {
        let mut state = self.state();
        if state.finished {
            return Err(ArchiveError::AlreadyFinished);
        }
        state.finished = state.can_finish;
        Ok(())
    }
}
