//! Shared helper functions for CLI commands
//!
//! Project/workspace opening, progress display and output formatting used
//! across the command modules.

use clap::ValueEnum;
use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::config::Config;
use crate::core::graph::AssetState;
use crate::core::identity::AssetId;
use crate::core::project::Project;
use crate::core::resolver::IdentityResolver;
use crate::core::task::{Progress, PROGRESS_INTERVAL};
use crate::core::tree::{ReferenceForest, TreeRow};
use crate::core::workspace::{SyncMode, Workspace};

/// Project from `--project`, or discovered from the current directory
pub fn open_project(global: &GlobalOpts) -> Result<Project> {
    let project = match &global.project {
        Some(root) => Project::at(root)?,
        None => Project::discover()?,
    };
    Ok(project)
}

/// Open the workspace and bring its graph up to date
pub fn open_workspace(global: &GlobalOpts) -> Result<Workspace> {
    let mut ws = Workspace::open(open_project(global)?);
    let summary = ws.ensure_current(progress_printer("Scanning assets", global.quiet))?;
    if let Some(summary) = summary {
        if !global.quiet && summary.mode == SyncMode::FullRebuild {
            eprintln!(
                "{} Built dependency graph ({} assets) in {}ms",
                style("✓").green(),
                summary.stats.assets_scanned,
                summary.stats.duration_ms
            );
        }
    }
    Ok(ws)
}

/// Progress callback redrawing a counter on stderr every few steps
pub fn progress_printer(label: &'static str, quiet: bool) -> impl FnMut(Progress) {
    let enabled = !quiet && console::Term::stderr().is_term();
    move |progress: Progress| {
        if !enabled || progress.total == 0 {
            return;
        }
        let finished = progress.done >= progress.total;
        if progress.done % PROGRESS_INTERVAL == 0 || finished {
            eprint!(
                "\r{} {} {}/{} ({:.0}%)",
                style("→").blue(),
                label,
                progress.done,
                progress.total,
                progress.fraction() * 100.0
            );
            if finished {
                eprintln!();
            }
        }
    }
}

/// Effective output format: the flag, else the configured default
pub fn resolve_format(global: &GlobalOpts, config: &Config) -> OutputFormat {
    if global.format != OutputFormat::Auto {
        return global.format;
    }
    config
        .default_format
        .as_deref()
        .and_then(|s| OutputFormat::from_str(s, true).ok())
        .unwrap_or(OutputFormat::Auto)
}

/// Print a value as JSON or YAML; returns false for the other formats
pub fn print_structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
            Ok(true)
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(value).into_diagnostic()?);
            Ok(true)
        }
        OutputFormat::Auto | OutputFormat::Tsv => Ok(false),
    }
}

/// Format an AssetId for display, truncated to its first 12 digits
pub fn format_short_id(id: &AssetId) -> String {
    truncate_str(&id.to_string(), 15)
}

/// Truncate a string to max_len, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Colored state tag for non-normal assets
pub fn state_tag(state: AssetState) -> String {
    match state {
        AssetState::Normal => String::new(),
        AssetState::Changed => format!(" {}", style("[changed]").yellow()),
        AssetState::Missing => format!(" {}", style("[missing]").red()),
        AssetState::NoData => format!(" {}", style("[no data]").dim()),
    }
}

/// A forest row with its resolved path and state, for structured output
#[derive(Serialize)]
pub struct RowView<'a> {
    #[serde(flatten)]
    pub row: &'a TreeRow,
    pub path: Option<String>,
    pub state: Option<AssetState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair: Option<String>,
}

/// Resolve paths and refresh states of every asset in the forest
pub fn forest_rows<'a>(
    ws: &mut Workspace,
    forest: &'a ReferenceForest,
    pair: impl Fn(&TreeRow) -> Option<String>,
) -> Vec<RowView<'a>> {
    let ids: Vec<AssetId> = forest.rows().iter().filter_map(|r| r.id()).collect();
    let states: std::collections::HashMap<_, _> = ws.refresh_states(&ids).into_iter().collect();
    forest
        .rows()
        .iter()
        .map(|row| {
            let path = row.id().and_then(|id| {
                ws.store()
                    .get_node(id)
                    .map(|n| n.path.clone())
                    .or_else(|| ws.resolver().path_for_id(id))
            });
            RowView {
                row,
                path,
                state: row.id().and_then(|id| states.get(&id).copied()),
                pair: pair(row),
            }
        })
        .collect()
}

/// Print forest rows as an indented tree
pub fn print_forest(rows: &[RowView<'_>]) {
    for view in rows {
        let indent = "  ".repeat(view.row.depth());
        let label = match (&view.path, view.row.id()) {
            (Some(path), _) => path.clone(),
            (None, Some(id)) => format_short_id(&id),
            (None, None) => String::new(),
        };
        let tag = view.state.map(state_tag).unwrap_or_default();
        let pair = view
            .pair
            .as_deref()
            .map(|p| format!(" [{}]", p))
            .unwrap_or_default();
        match view.row {
            TreeRow::CategoryRoot { category } => {
                println!("{}", style(category.to_string()).bold().underlined())
            }
            TreeRow::MatchedAsset { via_container, .. } => {
                let via = if *via_container { " (container)" } else { "" };
                println!("{}{}{}{}", indent, style(label).cyan(), style(via).dim(), tag)
            }
            TreeRow::ReferencingAsset { .. } => {
                let pair = if pair.contains("replaced") {
                    style(pair).green().to_string()
                } else {
                    style(pair).yellow().to_string()
                };
                println!("{}{}{}{}", indent, label, tag, pair)
            }
        }
    }
}
