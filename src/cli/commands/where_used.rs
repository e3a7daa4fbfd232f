//! `refmerge where-used` command - Find every asset referencing an asset

use console::style;
use miette::Result;

use crate::cli::helpers::{forest_rows, open_workspace, print_forest, print_structured, resolve_format};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::matching::MatchSet;
use crate::core::tree::{ReferenceForest, TreeRow};

#[derive(clap::Args, Debug)]
pub struct WhereUsedArgs {
    /// Asset path or id to search for
    pub asset: String,

    /// Show only direct references (not transitive)
    #[arg(long)]
    pub direct_only: bool,
}

pub fn run(args: WhereUsedArgs, global: &GlobalOpts) -> Result<()> {
    let mut ws = open_workspace(global)?;
    let target = ws.matched_asset(&args.asset)?;
    let forest = ReferenceForest::build(&MatchSet::subject_only(target.clone()), ws.store().graph());

    let mut rows = forest_rows(&mut ws, &forest, |_| None);
    if args.direct_only {
        rows.retain(|r| !matches!(r.row, TreeRow::ReferencingAsset { depth, .. } if *depth > 1));
    }
    let referencing = rows
        .iter()
        .filter(|r| matches!(r.row, TreeRow::ReferencingAsset { .. }))
        .count();

    let format = resolve_format(global, ws.config());
    if !print_structured(&rows, format)? {
        if format == OutputFormat::Tsv {
            for r in &rows {
                if let TreeRow::ReferencingAsset { id, depth, via_container, .. } = r.row {
                    println!(
                        "{}\t{}\t{}\t{}",
                        depth,
                        id,
                        r.path.as_deref().unwrap_or(""),
                        if *via_container { "container" } else { "direct" }
                    );
                }
            }
        } else if referencing == 0 {
            println!(
                "{} No references to {} found.",
                style("!").yellow(),
                style(&target.path).cyan()
            );
        } else {
            print_forest(&rows[1..]);
            println!();
            println!("{} reference(s) found.", style(referencing).cyan());
        }
    }
    ws.close()?;
    Ok(())
}
