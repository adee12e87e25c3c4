use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// A single durable key-value slot holding the serialized application state.
pub trait StateSlot {
    fn key(&self) -> &str;
    fn read(&self) -> anyhow::Result<Option<String>>;
    fn write(&self, payload: &str) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// Slot stored as `<data_dir>/<key>.json`, replaced atomically on write.
#[derive(Debug)]
pub struct FileSlot {
    pub data_dir: PathBuf,
    pub path: PathBuf,
    key: String,
}

impl FileSlot {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path, key: &str) -> anyhow::Result<Self> {
        if key.trim().is_empty() || key.contains(['/', '\\']) {
            return Err(anyhow!("invalid state key: {key:?}"));
        }
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let path = data_dir.join(format!("{key}.json"));
        info!(
            data_dir = %data_dir.display(),
            slot = %path.display(),
            "opened state slot"
        );

        Ok(Self {
            data_dir,
            path,
            key: key.to_string(),
        })
    }
}

impl StateSlot for FileSlot {
    fn key(&self) -> &str {
        &self.key
    }

    #[tracing::instrument(skip(self))]
    fn read(&self) -> anyhow::Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed reading {}", self.path.display()))?;
        if raw.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(raw))
        }
    }

    #[tracing::instrument(skip(self, payload), fields(bytes = payload.len()))]
    fn write(&self, payload: &str) -> anyhow::Result<()> {
        debug!(file = %self.path.display(), "saving state atomically");
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(payload.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.path.display(), err))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn clear(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("failed removing {}", self.path.display()))?;
        }
        Ok(())
    }
}

/// In-process slot for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct MemorySlot {
    key: String,
    value: RefCell<Option<String>>,
}

impl MemorySlot {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: RefCell::new(None),
        }
    }

    pub fn with_payload(key: &str, payload: &str) -> Self {
        Self {
            key: key.to_string(),
            value: RefCell::new(Some(payload.to_string())),
        }
    }

    pub fn peek(&self) -> Option<String> {
        self.value.borrow().clone()
    }
}

impl StateSlot for MemorySlot {
    fn key(&self) -> &str {
        &self.key
    }

    fn read(&self) -> anyhow::Result<Option<String>> {
        Ok(self.value.borrow().clone())
    }

    fn write(&self, payload: &str) -> anyhow::Result<()> {
        *self.value.borrow_mut() = Some(payload.to_string());
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        *self.value.borrow_mut() = None;
        Ok(())
    }
}

impl<S: StateSlot + ?Sized> StateSlot for &S {
    fn key(&self) -> &str {
        (**self).key()
    }

    fn read(&self) -> anyhow::Result<Option<String>> {
        (**self).read()
    }

    fn write(&self, payload: &str) -> anyhow::Result<()> {
        (**self).write(payload)
    }

    fn clear(&self) -> anyhow::Result<()> {
        (**self).clear()
    }
}
