//! refmerge: find visually duplicate images and merge their references
//!
//! Keeps a dependency graph of a project's assets, finds near-identical
//! images by fingerprint, and rewrites the assets that reference them so
//! they point at one chosen source, with per-reference rollback.

pub mod cli;
pub mod core;
