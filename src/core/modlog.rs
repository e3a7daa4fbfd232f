//! Pending path changes awaiting an incremental graph update
//!
//! Hosts record add/delete/move notifications here between commands;
//! `graph sync` consumes them. Entries are keyed by path and the most
//! recent kind recorded for a path wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

use crate::core::codec::{write_atomic, ByteReader, ByteWriter, DecodeError};
use crate::core::graph::PathChanges;

pub const MODLOG_MAGIC: &[u8; 4] = b"RMML";
pub const MODLOG_VERSION: u32 = 1;

/// What happened to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Imported,
    Deleted,
    MovedTo,
    MovedFrom,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ModLogError {
    #[error("modification log {path} is unreadable: {source}")]
    #[diagnostic(
        code(refmerge::modlog::corrupt),
        help("run 'refmerge graph rebuild' to resynchronize the graph")
    )]
    Corrupt {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("failed to access modification log {path}: {source}")]
    #[diagnostic(code(refmerge::modlog::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Path change log persisted under .refmerge/
#[derive(Debug)]
pub struct ModificationLog {
    path: PathBuf,
    entries: BTreeMap<String, ChangeKind>,
}

impl ModificationLog {
    /// Open the log at `path`; an absent file is an empty log
    pub fn open(path: &Path) -> Result<Self, ModLogError> {
        let entries = match std::fs::read(path) {
            Ok(bytes) => decode(&bytes).map_err(|source| ModLogError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(ModLogError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record_path(&mut self, path: &str, kind: ChangeKind) {
        self.entries.insert(path.to_string(), kind);
    }

    /// Merge a batch, in imported, deleted, moved-to, moved-from order
    pub fn record(&mut self, changes: &PathChanges) {
        let batches = [
            (&changes.imported, ChangeKind::Imported),
            (&changes.deleted, ChangeKind::Deleted),
            (&changes.moved_to, ChangeKind::MovedTo),
            (&changes.moved_from, ChangeKind::MovedFrom),
        ];
        for (paths, kind) in batches {
            for path in paths {
                self.record_path(path, kind);
            }
        }
    }

    /// The pending changes as one batch
    pub fn to_changes(&self) -> PathChanges {
        let mut changes = PathChanges::default();
        for (path, kind) in &self.entries {
            let list = match kind {
                ChangeKind::Imported => &mut changes.imported,
                ChangeKind::Deleted => &mut changes.deleted,
                ChangeKind::MovedTo => &mut changes.moved_to,
                ChangeKind::MovedFrom => &mut changes.moved_from,
            };
            list.push(path.clone());
        }
        changes
    }

    pub fn save(&self) -> Result<(), ModLogError> {
        write_atomic(&self.path, &encode(&self.entries)).map_err(|source| ModLogError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Remove the log file after its changes were applied
    pub fn discard(path: &Path) -> Result<bool, ModLogError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ModLogError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

fn encode(entries: &BTreeMap<String, ChangeKind>) -> Vec<u8> {
    let mut w = ByteWriter::new(MODLOG_MAGIC, MODLOG_VERSION);
    for kind in [
        ChangeKind::Imported,
        ChangeKind::Deleted,
        ChangeKind::MovedTo,
        ChangeKind::MovedFrom,
    ] {
        let paths: Vec<&String> = entries
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(p, _)| p)
            .collect();
        w.len(paths.len());
        for path in paths {
            w.str(path);
        }
    }
    w.finish()
}

fn decode(bytes: &[u8]) -> Result<BTreeMap<String, ChangeKind>, DecodeError> {
    let mut r = ByteReader::open(bytes, MODLOG_MAGIC, MODLOG_VERSION)?;
    let mut entries = BTreeMap::new();
    for kind in [
        ChangeKind::Imported,
        ChangeKind::Deleted,
        ChangeKind::MovedTo,
        ChangeKind::MovedFrom,
    ] {
        let n = r.len(4)?;
        for _ in 0..n {
            entries.insert(r.str()?, kind);
        }
    }
    r.finish()?;
    Ok(entries)
}
