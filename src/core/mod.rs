//! Core module - graph store, matching and replacement

pub mod codec;
pub mod config;
pub mod content;
pub mod fingerprint;
pub mod graph;
pub mod identity;
pub mod matching;
pub mod modlog;
pub mod project;
pub mod replace;
pub mod resolver;
pub mod task;
pub mod tree;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use graph::{AssetState, DependencyGraph, GraphError, GraphStore};
pub use identity::{AssetId, IdParseError};
pub use project::{Project, ProjectError};
pub use replace::{ReplaceError, ReplacementEngine};
pub use workspace::{Workspace, WorkspaceError};
