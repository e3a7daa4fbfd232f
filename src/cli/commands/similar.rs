//! `refmerge similar` command - List images resembling a subject

use console::style;
use miette::Result;

use crate::cli::helpers::{open_workspace, print_structured, progress_printer, resolve_format};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::matching::MatchedAsset;
use crate::core::task::CancelToken;

#[derive(clap::Args, Debug)]
pub struct SimilarArgs {
    /// Image path or id to compare against
    pub image: String,

    /// Only show high-confidence matches
    #[arg(long)]
    pub high_only: bool,
}

pub fn run(args: SimilarArgs, global: &GlobalOpts) -> Result<()> {
    let ws = open_workspace(global)?;
    let subject = ws.matched_asset(&args.image)?;
    let mut set = ws.find_matches(
        subject,
        &CancelToken::new(),
        progress_printer("Comparing images", global.quiet),
    )?;
    if args.high_only {
        set.low.clear();
    }

    let format = resolve_format(global, ws.config());
    if print_structured(&set, format)? {
        return Ok(());
    }
    if format == OutputFormat::Tsv {
        for (confidence, list) in [("high", &set.high), ("low", &set.low)] {
            for m in list {
                let (distance, similarity) = scores(m);
                println!("{}\t{}\t{}\t{}\t{}", confidence, m.id, m.path, distance, similarity);
            }
        }
        return Ok(());
    }

    if set.high.is_empty() && set.low.is_empty() {
        println!(
            "{} No images similar to {}",
            style("!").yellow(),
            style(&set.subject.path).cyan()
        );
    }
    for (title, list) in [("High confidence", &set.high), ("Low confidence", &set.low)] {
        if list.is_empty() {
            continue;
        }
        println!("{} ({})", style(title).bold(), list.len());
        println!(
            "  {:<8} {:<10} {}",
            style("DIST").dim(),
            style("HIST").dim(),
            style("PATH").dim()
        );
        for m in list {
            let (distance, similarity) = scores(m);
            let container = m
                .container
                .as_ref()
                .map(|c| format!(" (in {})", c.path))
                .unwrap_or_default();
            println!(
                "  {:<8} {:<10} {}{}",
                distance,
                similarity,
                style(&m.path).cyan(),
                style(container).dim()
            );
        }
        println!();
    }
    if set.unfingerprinted > 0 && !global.quiet {
        println!(
            "{} {} candidate(s) have no fingerprint and were skipped",
            style("!").yellow(),
            set.unfingerprinted
        );
    }
    Ok(())
}

fn scores(m: &MatchedAsset) -> (String, String) {
    match &m.comparison {
        Some(c) => (
            c.hash_distance.to_string(),
            format!("{:.3}", c.histogram_similarity),
        ),
        None => (String::new(), String::new()),
    }
}
