//! Key-value persistence for credentials.
//!
//! - Web: `localStorage`
//! - Desktop: one file per key in the platform config directory:
//!   - Linux: `~/.config/<namespace>/`
//!   - macOS: `~/Library/Application Support/<namespace>/`
//!   - Windows: `%APPDATA%\<namespace>\`
//!
//! [`MemoryStorage`] backs tests and headless sessions.

use std::cell::RefCell;
use std::collections::HashMap;

use anyhow::Result;

/// Raw string storage. Implementations are not expected to be transactional.
pub trait Storage {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// In-process storage that forgets everything when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

/// Storage provided by the host platform.
#[derive(Debug, Clone)]
pub struct PlatformStorage {
    #[cfg_attr(target_arch = "wasm32", allow(dead_code))]
    namespace: String,
}

impl PlatformStorage {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

// =========================================
// Web (WASM) implementation
// =========================================

#[cfg(target_arch = "wasm32")]
fn local_storage() -> Result<web_sys::Storage> {
    let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
    window
        .local_storage()
        .map_err(|_| anyhow::anyhow!("localStorage is not accessible"))?
        .ok_or_else(|| anyhow::anyhow!("localStorage is unavailable"))
}

#[cfg(target_arch = "wasm32")]
impl Storage for PlatformStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        local_storage().ok()?.get_item(key).ok()?
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        local_storage()?
            .set_item(key, value)
            .map_err(|_| anyhow::anyhow!("failed to write {key} to localStorage"))
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        local_storage()?
            .remove_item(key)
            .map_err(|_| anyhow::anyhow!("failed to remove {key} from localStorage"))
    }
}

// =========================================
// Desktop (native) implementation
// =========================================

#[cfg(not(target_arch = "wasm32"))]
impl PlatformStorage {
    fn dir(&self) -> Result<std::path::PathBuf> {
        use anyhow::Context;

        let config_dir = dirs::config_dir().context("no config directory on this platform")?;
        let app_dir = config_dir.join(&self.namespace);
        if !app_dir.exists() {
            std::fs::create_dir_all(&app_dir)
                .with_context(|| format!("failed to create {}", app_dir.display()))?;
        }
        Ok(app_dir)
    }

    fn file_path(&self, key: &str) -> Result<std::path::PathBuf> {
        // Keys become file names
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        Ok(self.dir()?.join(safe_key))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Storage for PlatformStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let path = self.file_path(key).ok()?;
        std::fs::read_to_string(path).ok()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.file_path(key)?;
        std::fs::write(&path, value)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.file_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
