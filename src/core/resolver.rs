//! Path <-> id resolution from `.meta` sidecars
//!
//! Each asset `foo.png` carries a sidecar `foo.png.meta` with a
//! `guid: <32 hex>` line. Container assets (atlases) additionally list
//! their packed members under a `nameFileIdTable:` section:
//!
//! ```text
//! guid: 5f0c...
//! nameFileIdTable:
//!   icon_close: 21300002
//!   icon_open: 21300004
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::core::content::{meta_path, META_EXTENSION};
use crate::core::identity::AssetId;
use crate::core::project::to_asset_path;

/// Where a member asset lives inside a container, and under which sub-id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    pub id: AssetId,
    pub path: String,
    pub sub_id: String,
}

/// Bidirectional path <-> id lookup, maintained outside the graph
pub trait IdentityResolver {
    fn id_for_path(&self, path: &str) -> Option<AssetId>;

    fn path_for_id(&self, id: AssetId) -> Option<String>;

    /// All known asset paths, sorted
    fn asset_paths(&self) -> Vec<String>;

    /// The container a member asset is packed into, if any
    fn container_of(&self, _path: &str) -> Option<ContainerRef> {
        None
    }
}

/// Resolver built by scanning sidecar files below the project root
#[derive(Debug, Default)]
pub struct MetaResolver {
    by_path: BTreeMap<String, AssetId>,
    by_id: HashMap<AssetId, String>,
    /// member name -> (container path, sub id)
    members: HashMap<String, (String, String)>,
}

impl MetaResolver {
    /// Scan every sidecar below `root`, skipping dot-directories
    pub fn scan(root: &Path) -> Self {
        let mut resolver = Self::default();

        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let meta = entry.path();
            if meta.extension().and_then(|e| e.to_str()) != Some(META_EXTENSION) {
                continue;
            }
            let asset = meta.with_extension("");
            if !asset.is_file() {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(meta) else {
                tracing::warn!("unreadable sidecar {}", meta.display());
                continue;
            };
            let Ok(rel) = asset.strip_prefix(root) else {
                continue;
            };
            let path = to_asset_path(rel);

            match parse_meta_id(&text) {
                Some(id) => {
                    if let Some(existing) = resolver.by_id.get(&id) {
                        tracing::warn!("duplicate id {} in {} and {}", id, existing, path);
                        continue;
                    }
                    for (name, sub_id) in parse_member_table(&text) {
                        resolver.members.insert(name, (path.clone(), sub_id));
                    }
                    resolver.insert(path, id);
                }
                None => tracing::debug!("sidecar without id: {}", meta.display()),
            }
        }

        tracing::debug!("resolved {} assets", resolver.by_path.len());
        resolver
    }

    /// Register a path/id pair
    pub fn insert(&mut self, path: String, id: AssetId) {
        if let Some(old_path) = self.by_id.insert(id, path.clone()) {
            if old_path != path {
                self.by_path.remove(&old_path);
            }
        }
        self.by_path.insert(path, id);
    }

    /// Forget an asset
    pub fn remove_path(&mut self, path: &str) {
        if let Some(id) = self.by_path.remove(path) {
            self.by_id.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

impl IdentityResolver for MetaResolver {
    fn id_for_path(&self, path: &str) -> Option<AssetId> {
        self.by_path.get(path).copied()
    }

    fn path_for_id(&self, id: AssetId) -> Option<String> {
        self.by_id.get(&id).cloned()
    }

    fn asset_paths(&self) -> Vec<String> {
        self.by_path.keys().cloned().collect()
    }

    fn container_of(&self, path: &str) -> Option<ContainerRef> {
        let name = file_stem(path)?;
        let (container_path, sub_id) = self.members.get(name)?;
        if container_path == path {
            return None;
        }
        let id = self.id_for_path(container_path)?;
        Some(ContainerRef {
            id,
            path: container_path.clone(),
            sub_id: sub_id.clone(),
        })
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

/// File name without directories or the final extension
pub fn file_stem(path: &str) -> Option<&str> {
    let name = file_name(path);
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    (!stem.is_empty()).then_some(stem)
}

/// Last component of an asset path
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Extract the `guid:` value from sidecar text
pub fn parse_meta_id(text: &str) -> Option<AssetId> {
    text.lines()
        .filter(|line| !line.starts_with(' ') && !line.starts_with('\t'))
        .find_map(|line| line.strip_prefix("guid:"))
        .and_then(|value| AssetId::parse(value.trim()).ok())
}

/// Entries of the `nameFileIdTable:` section as (member name, sub id)
pub fn parse_member_table(text: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut in_table = false;

    for line in text.lines() {
        if !in_table {
            in_table = line.trim() == "nameFileIdTable:";
            continue;
        }
        let indented = line.starts_with(' ') || line.starts_with('\t');
        if !indented {
            break;
        }
        if let Some((name, sub_id)) = line.trim().split_once(": ") {
            entries.push((name.to_string(), sub_id.trim().to_string()));
        }
    }

    entries
}

/// Write a sidecar carrying a fresh id unless one exists; returns the asset's id
pub fn ensure_meta(asset: &Path) -> std::io::Result<(AssetId, bool)> {
    let meta = meta_path(asset);
    if let Ok(text) = std::fs::read_to_string(&meta) {
        if let Some(id) = parse_meta_id(&text) {
            return Ok((id, false));
        }
    }
    let id = AssetId::generate();
    let text = format!("fileFormatVersion: 2\nguid: {}\n", id);
    crate::core::codec::write_atomic(&meta, text.as_bytes())?;
    Ok((id, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ID_A: &str = "0000000000000000000000000000000a";
    const ID_ATLAS: &str = "000000000000000000000000000000ff";

    fn write(root: &Path, rel: &str, content: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, content).unwrap();
    }

    #[test]
    fn test_parse_meta_id() {
        let text = format!("fileFormatVersion: 2\nguid: {ID_A}\nTextureImporter:\n  guid: nope\n");
        assert_eq!(parse_meta_id(&text), Some(AssetId::parse(ID_A).unwrap()));
        assert_eq!(parse_meta_id("fileFormatVersion: 2\n"), None);
    }

    #[test]
    fn test_parse_member_table() {
        let text = "guid: x\nnameFileIdTable:\n  icon_close: 21300002\n  icon_open: 21300004\nuserData:\n  other: 1\n";
        assert_eq!(
            parse_member_table(text),
            vec![
                ("icon_close".to_string(), "21300002".to_string()),
                ("icon_open".to_string(), "21300004".to_string())
            ]
        );
    }

    #[test]
    fn test_scan_resolves_paths_and_containers() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        write(root, "Assets/ui/icon_close.png", "png");
        write(root, "Assets/ui/icon_close.png.meta", &format!("guid: {ID_A}\n"));
        write(root, "Assets/atlas/ui.png", "png");
        write(
            root,
            "Assets/atlas/ui.png.meta",
            &format!("guid: {ID_ATLAS}\nnameFileIdTable:\n  icon_close: 21300002\n"),
        );
        write(root, "Assets/orphan.png.meta", &format!("guid: {ID_A}\n"));
        write(root, ".refmerge/ignored.png", "png");
        write(root, ".refmerge/ignored.png.meta", "guid: 00000000000000000000000000000001\n");

        let resolver = MetaResolver::scan(root);

        assert_eq!(
            resolver.asset_paths(),
            vec!["Assets/atlas/ui.png".to_string(), "Assets/ui/icon_close.png".to_string()]
        );
        let id_a = AssetId::parse(ID_A).unwrap();
        assert_eq!(resolver.id_for_path("Assets/ui/icon_close.png"), Some(id_a));
        assert_eq!(resolver.path_for_id(id_a).as_deref(), Some("Assets/ui/icon_close.png"));

        let container = resolver.container_of("Assets/ui/icon_close.png").unwrap();
        assert_eq!(container.path, "Assets/atlas/ui.png");
        assert_eq!(container.sub_id, "21300002");
        assert!(resolver.container_of("Assets/atlas/ui.png").is_none());
    }

    #[test]
    fn test_insert_moves_path() {
        let mut resolver = MetaResolver::default();
        let id = AssetId::from_u128(7);
        resolver.insert("a/old.png".to_string(), id);
        resolver.insert("b/new.png".to_string(), id);
        assert_eq!(resolver.id_for_path("a/old.png"), None);
        assert_eq!(resolver.path_for_id(id).as_deref(), Some("b/new.png"));
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn test_ensure_meta_is_idempotent() {
        let tmp = tempdir().unwrap();
        let asset = tmp.path().join("tex.png");
        std::fs::write(&asset, "png").unwrap();

        let (id, created) = ensure_meta(&asset).unwrap();
        assert!(created);
        let (again, created) = ensure_meta(&asset).unwrap();
        assert!(!created);
        assert_eq!(id, again);
    }

    #[test]
    fn test_file_stem_and_name() {
        assert_eq!(file_name("Assets/ui/icon.png"), "icon.png");
        assert_eq!(file_stem("Assets/ui/icon.png"), Some("icon"));
        assert_eq!(file_stem("README"), Some("README"));
    }
}
