//! Binary graph snapshot
//!
//! Layout (little-endian, framed by `core::codec`):
//!
//! ```text
//! magic "RMGS" | version u32 | built_at i64 | count u32
//! ids:    count * u128
//! paths:  count * str          ("" marks a phantom entry)
//! hashes: count * str
//! edges:  count * (u32 n, n * u32 index into ids)
//! sha256 of all of the above
//! ```
//!
//! Phantom entries hold ids that are referenced but have no node, so
//! dangling dependencies survive a round trip. Edges are stored as indices
//! so each id is written once.

use std::collections::{BTreeSet, HashMap};

use crate::core::codec::{ByteReader, ByteWriter};
use crate::core::identity::AssetId;

use super::{AssetNode, DependencyGraph, GraphError};

pub const SNAPSHOT_MAGIC: &[u8; 4] = b"RMGS";

/// Bump whenever the layout changes; older files are rebuilt
pub const SNAPSHOT_VERSION: u32 = 1;

/// Encode a graph (states and back-references are not stored)
pub fn encode_snapshot(graph: &DependencyGraph, built_at: i64) -> Vec<u8> {
    let nodes = graph.nodes();
    let phantoms: BTreeSet<AssetId> = nodes
        .iter()
        .flat_map(|n| n.dependencies.iter().copied())
        .filter(|d| !graph.contains(*d))
        .collect();

    let ids: Vec<AssetId> = nodes
        .iter()
        .map(|n| n.id)
        .chain(phantoms.iter().copied())
        .collect();
    let index: HashMap<AssetId, u32> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i as u32))
        .collect();

    let mut w = ByteWriter::new(SNAPSHOT_MAGIC, SNAPSHOT_VERSION);
    w.i64(built_at);
    w.len(ids.len());
    for id in &ids {
        w.u128(id.as_u128());
    }
    for node in &nodes {
        w.str(&node.path);
    }
    for _ in &phantoms {
        w.str("");
    }
    for node in &nodes {
        w.str(&node.content_hash);
    }
    for _ in &phantoms {
        w.str("");
    }
    for node in &nodes {
        w.len(node.dependencies.len());
        for dep in &node.dependencies {
            w.u32(index[dep]);
        }
    }
    for _ in &phantoms {
        w.len(0);
    }
    w.finish()
}

/// Decode a snapshot into a graph with derived back-references
pub fn decode_snapshot(bytes: &[u8]) -> Result<(DependencyGraph, i64), GraphError> {
    let mut r = ByteReader::open(bytes, SNAPSHOT_MAGIC, SNAPSHOT_VERSION)?;
    let built_at = r.i64()?;
    let count = r.len(16)?;

    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(AssetId::from_u128(r.u128()?));
    }
    if ids.iter().collect::<BTreeSet<_>>().len() != ids.len() {
        return Err(GraphError::CorruptSnapshot("duplicate id".to_string()));
    }

    let mut paths = Vec::with_capacity(count);
    for _ in 0..count {
        paths.push(r.str()?);
    }
    let mut hashes = Vec::with_capacity(count);
    for _ in 0..count {
        hashes.push(r.str()?);
    }

    let mut graph = DependencyGraph::new();
    for i in 0..count {
        let n = r.len(4)?;
        let mut deps = Vec::with_capacity(n);
        for _ in 0..n {
            let idx = r.u32()? as usize;
            let target = ids.get(idx).ok_or_else(|| {
                GraphError::CorruptSnapshot(format!("edge index {} out of range", idx))
            })?;
            deps.push(*target);
        }

        if paths[i].is_empty() {
            if !deps.is_empty() {
                return Err(GraphError::CorruptSnapshot(
                    "phantom entry with edges".to_string(),
                ));
            }
            continue;
        }
        if graph.id_at(&paths[i]).is_some() {
            return Err(GraphError::CorruptSnapshot(format!(
                "duplicate path {}",
                paths[i]
            )));
        }
        graph.insert(AssetNode::new(
            ids[i],
            std::mem::take(&mut paths[i]),
            std::mem::take(&mut hashes[i]),
            deps,
        ));
    }
    r.finish()?;

    graph.derive_back_references();
    Ok((graph, built_at))
}
