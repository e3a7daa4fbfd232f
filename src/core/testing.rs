//! In-memory collaborators for unit tests

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

use crate::core::content::{ContentError, ContentStore};
use crate::core::identity::AssetId;
use crate::core::resolver::{ContainerRef, IdentityResolver};

pub fn id(n: u128) -> AssetId {
    AssetId::from_u128(n)
}

/// A YAML-style reference line to `target`
pub fn ref_line(target: AssetId) -> String {
    format!("  m_Sprite: {{fileID: 21300000, guid: {}, type: 3}}\n", target)
}

/// A reference line into a container at `sub_id`
pub fn container_line(container: AssetId, sub_id: &str) -> String {
    format!("  m_Sprite: {{fileID: {}, guid: {}, type: 3}}\n", sub_id, container)
}

/// Asset tree held in memory, acting as both resolver and content store
#[derive(Default)]
pub struct MemoryWorld {
    files: RefCell<BTreeMap<String, Vec<u8>>>,
    ids: RefCell<BTreeMap<String, AssetId>>,
    containers: RefCell<HashMap<String, ContainerRef>>,
    pub fail_writes: Cell<bool>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, path: &str, asset: AssetId, content: &str) {
        self.files
            .borrow_mut()
            .insert(path.to_string(), content.as_bytes().to_vec());
        self.ids.borrow_mut().insert(path.to_string(), asset);
    }

    pub fn set_content(&self, path: &str, content: &str) {
        self.files
            .borrow_mut()
            .insert(path.to_string(), content.as_bytes().to_vec());
    }

    pub fn content(&self, path: &str) -> String {
        self.files
            .borrow()
            .get(path)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }

    pub fn remove(&self, path: &str) {
        self.files.borrow_mut().remove(path);
        self.ids.borrow_mut().remove(path);
    }

    /// Move a file, keeping its id
    pub fn rename(&self, from: &str, to: &str) {
        let mut files = self.files.borrow_mut();
        if let Some(bytes) = files.remove(from) {
            files.insert(to.to_string(), bytes);
        }
        let mut ids = self.ids.borrow_mut();
        if let Some(asset) = ids.remove(from) {
            ids.insert(to.to_string(), asset);
        }
    }

    pub fn set_container(&self, member: &str, container: ContainerRef) {
        self.containers
            .borrow_mut()
            .insert(member.to_string(), container);
    }
}

impl IdentityResolver for MemoryWorld {
    fn id_for_path(&self, path: &str) -> Option<AssetId> {
        self.ids.borrow().get(path).copied()
    }

    fn path_for_id(&self, asset: AssetId) -> Option<String> {
        self.ids
            .borrow()
            .iter()
            .find(|(_, v)| **v == asset)
            .map(|(k, _)| k.clone())
    }

    fn asset_paths(&self) -> Vec<String> {
        self.ids.borrow().keys().cloned().collect()
    }

    fn container_of(&self, path: &str) -> Option<ContainerRef> {
        self.containers.borrow().get(path).cloned()
    }
}

impl ContentStore for MemoryWorld {
    fn read(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(path.to_string()))
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), ContentError> {
        if self.fail_writes.get() {
            return Err(ContentError::Io {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.files
            .borrow_mut()
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn delete(&self, path: &str) -> Result<(), ContentError> {
        if self.files.borrow_mut().remove(path).is_none() {
            return Err(ContentError::NotFound(path.to_string()));
        }
        self.ids.borrow_mut().remove(path);
        Ok(())
    }
}
