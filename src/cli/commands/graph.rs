//! `refmerge graph` command - Maintain and inspect the dependency graph
//!
//! The graph is persisted as `.refmerge/graph.snapshot` and kept current
//! through `.refmerge/modlog.bin`, where hosts (or `graph record`) append
//! add/delete/move notifications between commands.

use clap::Subcommand;
use console::style;
use miette::Result;
use serde::Serialize;

use crate::cli::helpers::{
    format_short_id, open_project, open_workspace, print_structured, progress_printer,
    resolve_format, state_tag,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::graph::{PathChanges, RebuildOptions, RebuildOutcome, SyncStats};
use crate::core::identity::AssetId;
use crate::core::task::CancelToken;
use crate::core::workspace::{SyncMode, Workspace};

#[derive(Subcommand, Debug)]
pub enum GraphCommands {
    /// Rebuild the graph from every tracked asset
    Rebuild {
        /// Re-read every asset instead of reusing unchanged ones
        #[arg(long)]
        force: bool,
    },

    /// Apply pending notifications (incremental)
    Sync {
        /// Detect changes by comparing the graph against the files on disk
        #[arg(long)]
        scan: bool,
    },

    /// Record add/delete/move notifications for the next sync
    Record {
        /// Path of an added or modified asset
        #[arg(long, value_name = "PATH")]
        imported: Vec<String>,

        /// Path of a deleted asset
        #[arg(long, value_name = "PATH")]
        deleted: Vec<String>,

        /// A move, written as FROM=TO
        #[arg(long, value_name = "FROM=TO", value_parser = parse_move)]
        moved: Vec<(String, String)>,
    },

    /// Show graph statistics
    Status,

    /// Show an asset's dependencies and back-references
    Show {
        /// Asset path or id
        asset: String,
    },

    /// Delete the snapshot and pending notifications
    Clear,
}

fn parse_move(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((from, to)) if !from.is_empty() && !to.is_empty() => {
            Ok((from.to_string(), to.to_string()))
        }
        _ => Err(format!("expected FROM=TO, got '{}'", s)),
    }
}

pub fn run(cmd: GraphCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        GraphCommands::Rebuild { force } => run_rebuild(force, global),
        GraphCommands::Sync { scan } => run_sync(scan, global),
        GraphCommands::Record {
            imported,
            deleted,
            moved,
        } => run_record(imported, deleted, moved, global),
        GraphCommands::Status => run_status(global),
        GraphCommands::Show { asset } => run_show(&asset, global),
        GraphCommands::Clear => run_clear(global),
    }
}

fn run_rebuild(force: bool, global: &GlobalOpts) -> Result<()> {
    let mut ws = Workspace::open(open_project(global)?);
    let options = RebuildOptions { reuse_cache: !force };
    let format = resolve_format(global, ws.config());

    if !global.quiet && format == OutputFormat::Auto {
        println!("{} Rebuilding dependency graph...", style("→").blue());
    }
    let outcome = ws.rebuild(
        options,
        &CancelToken::new(),
        progress_printer("Scanning assets", global.quiet),
    )?;

    match outcome {
        RebuildOutcome::Completed(stats) => {
            if print_structured(&stats, format)? {
                return Ok(());
            }
            if !global.quiet {
                println!(
                    "{} Graph rebuilt in {}ms",
                    style("✓").green(),
                    stats.duration_ms
                );
                print_stats(&stats);
            }
            if !stats.persisted {
                println!(
                    "{} Snapshot could not be written; the next command rebuilds again",
                    style("!").yellow()
                );
            }
            Ok(())
        }
        RebuildOutcome::Cancelled { stats, .. } => Err(miette::miette!(
            "rebuild cancelled after {} assets",
            stats.assets_scanned
        )),
    }
}

fn run_sync(scan: bool, global: &GlobalOpts) -> Result<()> {
    let mut ws = Workspace::open(open_project(global)?);
    let summary = ws.sync(scan, progress_printer("Scanning assets", global.quiet))?;

    let format = resolve_format(global, ws.config());
    if print_structured(&summary, format)? {
        return Ok(());
    }
    if global.quiet {
        return Ok(());
    }

    match summary.mode {
        SyncMode::UpToDate => println!("{} Graph is up to date", style("✓").green()),
        SyncMode::Incremental => {
            println!(
                "{} Applied {} change(s) in {}ms",
                style("✓").green(),
                summary.changes,
                summary.stats.duration_ms
            );
            print_stats(&summary.stats);
        }
        SyncMode::FullRebuild => {
            println!(
                "{} Graph rebuilt in {}ms",
                style("✓").green(),
                summary.stats.duration_ms
            );
            print_stats(&summary.stats);
        }
    }
    Ok(())
}

fn print_stats(stats: &SyncStats) {
    println!("  Assets scanned: {}", stats.assets_scanned);
    if stats.added > 0 {
        println!("  Added:          {}", style(stats.added).green());
    }
    if stats.updated > 0 {
        println!("  Updated:        {}", style(stats.updated).yellow());
    }
    if stats.reused > 0 {
        println!("  Reused:         {}", style(stats.reused).dim());
    }
    if stats.renamed > 0 {
        println!("  Renamed:        {}", style(stats.renamed).cyan());
    }
    if stats.removed > 0 {
        println!("  Removed:        {}", style(stats.removed).red());
    }
    if stats.failed > 0 {
        println!("  Failed:         {}", style(stats.failed).red());
    }
}

fn run_record(
    imported: Vec<String>,
    deleted: Vec<String>,
    moved: Vec<(String, String)>,
    global: &GlobalOpts,
) -> Result<()> {
    let (moved_from, moved_to) = moved.into_iter().unzip();
    let changes = PathChanges {
        imported,
        deleted,
        moved_to,
        moved_from,
    };
    if changes.is_empty() {
        return Err(miette::miette!(
            help = "pass --imported, --deleted or --moved",
            "nothing to record"
        ));
    }

    let ws = Workspace::open(open_project(global)?);
    let pending = ws.record_changes(&changes)?;
    if !global.quiet {
        println!(
            "{} Recorded {} change(s); {} pending",
            style("✓").green(),
            changes.len(),
            style(pending).cyan()
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct GraphStatus {
    snapshot: String,
    snapshot_bytes: Option<u64>,
    built_at: Option<String>,
    assets: usize,
    edges: usize,
    dangling_edges: usize,
    pending_changes: bool,
}

fn run_status(global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(open_project(global)?);
    let graph = ws.store().graph();
    let snapshot = ws.store().snapshot_path();

    let status = GraphStatus {
        snapshot: snapshot.display().to_string(),
        snapshot_bytes: std::fs::metadata(snapshot).ok().map(|m| m.len()),
        built_at: ws
            .store()
            .built_at()
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
            .map(|t| t.to_rfc3339()),
        assets: graph.len(),
        edges: graph.edge_count(),
        dangling_edges: graph.dangling_edges().len(),
        pending_changes: ws.project().modlog_path().exists(),
    };

    let format = resolve_format(global, ws.config());
    if print_structured(&status, format)? {
        return Ok(());
    }
    if format == OutputFormat::Tsv {
        println!("assets\t{}", status.assets);
        println!("edges\t{}", status.edges);
        println!("dangling_edges\t{}", status.dangling_edges);
        println!("built_at\t{}", status.built_at.as_deref().unwrap_or(""));
        return Ok(());
    }

    println!("{}", style("Graph Status").bold());
    println!("{}", style("─".repeat(40)).dim());
    println!("  Location:        {}", status.snapshot);
    if ws.needs_rebuild() {
        println!(
            "  Snapshot:        {} (run {})",
            style("missing or unusable").yellow(),
            style("refmerge graph rebuild").yellow()
        );
        return Ok(());
    }
    println!("  Assets:          {}", style(status.assets).cyan());
    println!("  Edges:           {}", style(status.edges).cyan());
    if status.dangling_edges > 0 {
        println!("  Dangling edges:  {}", style(status.dangling_edges).red());
    }
    if let Some(built_at) = &status.built_at {
        println!("  Built at:        {}", built_at);
    }
    if let Some(bytes) = status.snapshot_bytes {
        println!("  Snapshot size:   {} KB", style(bytes / 1024).cyan());
    }
    if status.pending_changes {
        println!(
            "  Pending changes: {} (run {})",
            style("yes").yellow(),
            style("refmerge graph sync").yellow()
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct NodeEntry {
    id: AssetId,
    path: Option<String>,
    state: String,
}

#[derive(Serialize)]
struct NodeView {
    id: AssetId,
    path: String,
    content_hash: String,
    state: String,
    dependencies: Vec<NodeEntry>,
    back_references: Vec<NodeEntry>,
}

fn run_show(query: &str, global: &GlobalOpts) -> Result<()> {
    let mut ws = open_workspace(global)?;
    let (id, _) = ws.find_asset(query)?;
    let node = ws.store().require_node(id)?.clone();

    let dependencies = node.dependencies.clone();
    let back_references: Vec<AssetId> = node.back_references.iter().copied().collect();
    let mut ids = vec![id];
    ids.extend(&dependencies);
    ids.extend(&back_references);
    let states: std::collections::HashMap<_, _> = ws.refresh_states(&ids).into_iter().collect();

    let entry = |ws: &Workspace, other: AssetId| NodeEntry {
        id: other,
        path: ws.store().get_node(other).map(|n| n.path.clone()),
        state: states
            .get(&other)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "missing".to_string()),
    };
    let view = NodeView {
        id,
        path: node.path.clone(),
        content_hash: node.content_hash.clone(),
        state: states
            .get(&id)
            .map(|s| s.to_string())
            .unwrap_or_default(),
        dependencies: dependencies.iter().map(|d| entry(&ws, *d)).collect(),
        back_references: back_references.iter().map(|b| entry(&ws, *b)).collect(),
    };

    let format = resolve_format(global, ws.config());
    if !print_structured(&view, format)? {
        if format == OutputFormat::Tsv {
            for (relation, list) in [("dependency", &view.dependencies), ("back-reference", &view.back_references)] {
                for e in list {
                    println!("{}\t{}\t{}\t{}", relation, e.id, e.path.as_deref().unwrap_or(""), e.state);
                }
            }
        } else {
            print_node(&view, &states);
        }
    }
    ws.close()?;
    Ok(())
}

fn print_node(
    view: &NodeView,
    states: &std::collections::HashMap<AssetId, crate::core::graph::AssetState>,
) {
    println!("{} {}", style(&view.path).cyan().bold(), style(view.id).dim());
    println!("{}", style("─".repeat(60)).dim());
    for (title, list) in [
        ("Dependencies", &view.dependencies),
        ("Referenced by", &view.back_references),
    ] {
        println!("{} ({})", style(title).bold(), list.len());
        for e in list {
            let tag = states.get(&e.id).map(|s| state_tag(*s)).unwrap_or_default();
            match &e.path {
                Some(path) => println!("  {}{}", path, tag),
                None => println!("  {}{}", style(format_short_id(&e.id)).dim(), tag),
            }
        }
    }
}

fn run_clear(global: &GlobalOpts) -> Result<()> {
    let mut ws = Workspace::open(open_project(global)?);
    if ws.clear()? {
        println!("{} Graph snapshot removed", style("✓").green());
    } else {
        println!("{} No graph snapshot to remove", style("!").yellow());
    }
    Ok(())
}
