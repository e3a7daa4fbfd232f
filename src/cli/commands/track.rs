//! `refmerge track` command - Assign asset ids to files

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::cli::helpers::open_project;
use crate::cli::GlobalOpts;
use crate::core::content::META_EXTENSION;
use crate::core::graph::PathChanges;
use crate::core::modlog::ModificationLog;
use crate::core::resolver::ensure_meta;

#[derive(clap::Args, Debug)]
pub struct TrackArgs {
    /// Files or directories to track (directories are walked)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

pub fn run(args: TrackArgs, global: &GlobalOpts) -> Result<()> {
    let project = open_project(global)?;

    let mut files = Vec::new();
    for path in &args.paths {
        if path.is_dir() {
            files.extend(
                WalkDir::new(path)
                    .into_iter()
                    .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.into_path()),
            );
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(miette::miette!("no such file or directory: {}", path.display()));
        }
    }

    let mut changes = PathChanges::default();
    let mut existing = 0;
    for file in files {
        if file.extension().and_then(|e| e.to_str()) == Some(META_EXTENSION) {
            continue;
        }
        let Some(asset_path) = project.asset_path(&file) else {
            tracing::warn!("{} is outside the project; skipped", file.display());
            continue;
        };
        let (id, created) = ensure_meta(&file).into_diagnostic()?;
        if created {
            if !global.quiet {
                println!("{} {} {}", style("+").green(), style(id).dim(), asset_path);
            }
            changes.imported.push(asset_path);
        } else {
            existing += 1;
        }
    }

    if !changes.is_empty() {
        let mut log = ModificationLog::open(&project.modlog_path())?;
        log.record(&changes);
        log.save()?;
    }
    if !global.quiet {
        println!(
            "{} Tracked {} new file(s), {} already tracked",
            style("✓").green(),
            style(changes.imported.len()).cyan(),
            existing
        );
    }
    Ok(())
}
