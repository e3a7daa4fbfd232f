//! `refmerge replace` command - Merge references of duplicate images
//!
//! A session starts from a subject image: its matches are found, a source
//! is chosen, and every asset referencing a match can then be rewritten to
//! reference the source instead. Each (referencer, match) pair can be
//! reverted on its own. The session lives in `.refmerge/session.json`
//! until `replace end`.

use clap::{Subcommand, ValueEnum};
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use crate::cli::helpers::{
    forest_rows, open_project, open_workspace, print_forest, print_structured, progress_printer,
    resolve_format, RowView,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::matching::MatchedAsset;
use crate::core::replace::{
    BatchReport, Direction, PairKey, PairOutcome, PairState, RefKind, ReplaceError,
    ReplacementEngine, Scope,
};
use crate::core::task::CancelToken;
use crate::core::tree::{MatchCategory, ReferenceForest, TreeRow};
use crate::core::workspace::{Workspace, WorkspaceError};

#[derive(Subcommand, Debug)]
pub enum ReplaceCommands {
    /// Find matches of a subject image and start a session
    Start {
        /// Subject image path or id
        subject: String,

        /// Replacement source (the subject or one of its matches)
        #[arg(long)]
        source: Option<String>,

        /// Discard a session already in progress
        #[arg(long)]
        force: bool,
    },

    /// Choose the image every reference should point at
    Source {
        /// Path or id of the subject or one of its matches
        asset: String,

        /// Switch without asking even if pairs are already replaced
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Show the session's reference tree and pair states
    Status,

    /// Rewrite references to point at the source
    Apply {
        #[command(flatten)]
        target: TargetArgs,

        /// Delete matched images once all their references are replaced
        #[arg(long)]
        delete_after: bool,
    },

    /// Restore references to the matched images
    Revert {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Discard the session
    End,
}

/// Which pairs an apply or revert covers (default: every category)
#[derive(clap::Args, Debug)]
pub struct TargetArgs {
    /// Only pairs of this category
    #[arg(long, value_enum, conflicts_with = "matched")]
    pub category: Option<CategoryArg>,

    /// Only pairs of this matched image (path or id)
    #[arg(long)]
    pub matched: Option<String>,

    /// Only the pair of this referencing asset (requires --matched)
    #[arg(long, requires = "matched")]
    pub referencer: Option<String>,

    /// Act on references through the matched image's container
    #[arg(long)]
    pub container: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CategoryArg {
    Subject,
    High,
    Low,
}

impl From<CategoryArg> for MatchCategory {
    fn from(c: CategoryArg) -> Self {
        match c {
            CategoryArg::Subject => MatchCategory::Subject,
            CategoryArg::High => MatchCategory::High,
            CategoryArg::Low => MatchCategory::Low,
        }
    }
}

pub fn run(cmd: ReplaceCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ReplaceCommands::Start {
            subject,
            source,
            force,
        } => run_start(&subject, source.as_deref(), force, global),
        ReplaceCommands::Source { asset, yes } => run_source(&asset, yes, global),
        ReplaceCommands::Status => run_status(global),
        ReplaceCommands::Apply {
            target,
            delete_after,
        } => run_apply(&target, Direction::Replace, delete_after, global),
        ReplaceCommands::Revert { target } => run_apply(&target, Direction::Revert, false, global),
        ReplaceCommands::End => run_end(global),
    }
}

fn run_start(subject: &str, source: Option<&str>, force: bool, global: &GlobalOpts) -> Result<()> {
    let mut ws = open_workspace(global)?;
    if ws.has_session() && !force {
        return Err(miette::miette!(
            help = "finish it with 'refmerge replace end', or pass --force",
            "a replacement session is already in progress"
        ));
    }

    let subject = ws.matched_asset(subject)?;
    let matches = ws.find_matches(
        subject,
        &CancelToken::new(),
        progress_printer("Comparing images", global.quiet),
    )?;
    let mut engine = ReplacementEngine::new(matches);

    if let Some(query) = source {
        let source = session_asset(&ws, &engine, query)?;
        ws.select_source(&mut engine, source, false)?;
    }
    ws.save_session(&engine)?;

    if !global.quiet {
        println!(
            "{} Started session for {}: {} high, {} low confidence match(es)",
            style("✓").green(),
            style(&engine.matches.subject.path).cyan(),
            engine.matches.high.len(),
            engine.matches.low.len()
        );
        if engine.matches.unfingerprinted > 0 {
            println!(
                "{} {} candidate(s) have no fingerprint and were skipped",
                style("!").yellow(),
                engine.matches.unfingerprinted
            );
        }
        println!();
    }
    print_session(&mut ws, &engine, global)?;
    ws.close()?;
    Ok(())
}

fn run_source(query: &str, yes: bool, global: &GlobalOpts) -> Result<()> {
    let mut ws = open_workspace(global)?;
    let mut engine = ws.load_session()?;
    let source = session_asset(&ws, &engine, query)?;

    match ws.select_source(&mut engine, source.clone(), false) {
        Ok(()) => {}
        Err(WorkspaceError::Replace(ReplaceError::SourceSwitchBlocked { replaced })) => {
            if !(yes || confirm_switch(replaced)?) {
                println!("Aborted.");
                return Ok(());
            }
            ws.select_source(&mut engine, source, true)?;
        }
        Err(e) => return Err(e.into()),
    }
    ws.save_session(&engine)?;

    if !global.quiet {
        println!(
            "{} Source set to {} ({} pair(s))",
            style("✓").green(),
            style(&engine.source()?.path).cyan(),
            engine.record.len()
        );
    }
    ws.close()?;
    Ok(())
}

fn confirm_switch(replaced: usize) -> Result<bool> {
    if !console::Term::stdout().is_term() {
        return Err(ReplaceError::SourceSwitchBlocked { replaced }.into());
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "{} pair(s) are replaced; switching discards their rollback state. Continue?",
            replaced
        ))
        .default(false)
        .interact()
        .into_diagnostic()
}

fn run_status(global: &GlobalOpts) -> Result<()> {
    let mut ws = open_workspace(global)?;
    let engine = ws.load_session()?;
    print_session(&mut ws, &engine, global)?;
    ws.close()?;
    Ok(())
}

#[derive(Serialize)]
struct SessionView<'a> {
    created_at: String,
    subject: &'a MatchedAsset,
    source: Option<&'a MatchedAsset>,
    replaced: usize,
    pending: usize,
    deleted: &'a [String],
    rows: Vec<RowView<'a>>,
}

fn print_session(ws: &mut Workspace, engine: &ReplacementEngine, global: &GlobalOpts) -> Result<()> {
    let forest = ReferenceForest::build(&engine.matches, ws.store().graph());
    let marker = |row: &TreeRow| match Scope::for_row(row, &forest)? {
        Scope::Pair(key) => engine.record.state(&key).map(|s| s.to_string()),
        _ => None,
    };
    let rows = forest_rows(ws, &forest, marker);
    let pairs = engine.record.pairs();
    let replaced = pairs.iter().filter(|(_, s)| *s == PairState::Replaced).count();

    let view = SessionView {
        created_at: engine.created_at.to_rfc3339(),
        subject: &engine.matches.subject,
        source: engine.source.as_ref(),
        replaced,
        pending: pairs.len() - replaced,
        deleted: &engine.deleted_paths,
        rows,
    };

    let format = resolve_format(global, ws.config());
    if print_structured(&view, format)? {
        return Ok(());
    }
    if format == OutputFormat::Tsv {
        for (key, state) in &pairs {
            println!("{}\t{}\t{}\t{}", state, kind_name(key.kind), key.matched_path, key.referencer);
        }
        return Ok(());
    }

    match view.source {
        Some(source) => println!("Source:  {}", style(&source.path).cyan().bold()),
        None => println!(
            "Source:  {} (choose one with {})",
            style("none").yellow(),
            style("refmerge replace source <PATH>").yellow()
        ),
    }
    println!(
        "Pairs:   {} replaced, {} pending",
        style(view.replaced).green(),
        style(view.pending).yellow()
    );
    for path in view.deleted {
        println!("Deleted: {}", style(path).red());
    }
    println!();
    print_forest(&view.rows);
    Ok(())
}

fn run_apply(target: &TargetArgs, direction: Direction, delete_after: bool, global: &GlobalOpts) -> Result<()> {
    let mut ws = open_workspace(global)?;
    let mut engine = ws.load_session()?;
    engine.source()?;

    let scopes = scopes_for(&ws, &engine, target)?;
    let mut report = BatchReport::default();
    let mut first_error = None;
    for scope in &scopes {
        match ws.apply(&mut engine, scope, direction, delete_after) {
            Ok(batch) => {
                report.outcomes.extend(batch.outcomes);
                report.deleted.extend(batch.deleted);
            }
            Err(e) => {
                first_error = Some(e);
                break;
            }
        }
    }
    // Pairs applied before a failure must keep their recorded state
    ws.save_session(&engine)?;
    if let Some(e) = first_error {
        return Err(e.into());
    }

    let format = resolve_format(global, ws.config());
    if !print_structured(&report, format)? {
        print_report(&ws, &report, direction, global);
    }
    ws.close()?;
    Ok(())
}

fn scopes_for(ws: &Workspace, engine: &ReplacementEngine, target: &TargetArgs) -> Result<Vec<Scope>> {
    let kind = if target.container {
        RefKind::Container
    } else {
        RefKind::Direct
    };

    let Some(query) = &target.matched else {
        let categories = match target.category {
            Some(c) => vec![c.into()],
            None => vec![MatchCategory::Subject, MatchCategory::High, MatchCategory::Low],
        };
        return Ok(categories.into_iter().map(Scope::Category).collect());
    };

    let matched = session_asset(ws, engine, query)?;
    let Some(referencer) = &target.referencer else {
        return Ok(vec![Scope::Matched {
            path: matched.path,
            kind,
        }]);
    };

    let (referencer, _) = ws.find_asset(referencer)?;
    if kind == RefKind::Container && matched.container.is_none() {
        return Err(miette::miette!("{} is not packed in a container", query));
    }
    Ok(vec![Scope::Pair(PairKey {
        referencer,
        matched_path: matched.path,
        kind,
    })])
}

/// The session's subject or match named by a path or id
fn session_asset(ws: &Workspace, engine: &ReplacementEngine, query: &str) -> Result<MatchedAsset> {
    let found = match ws.find_asset(query) {
        Ok((id, _)) => engine.matches.find_by_id(id),
        Err(_) => engine.matches.find_by_path(query),
    };
    found
        .filter(|m| !engine.deleted_paths.contains(&m.path))
        .cloned()
        .ok_or_else(|| ReplaceError::UnknownAsset(query.to_string()).into())
}

fn print_report(ws: &Workspace, report: &BatchReport, direction: Direction, global: &GlobalOpts) {
    let verb = match direction {
        Direction::Replace => "Replaced",
        Direction::Revert => "Reverted",
    };
    let skipped = report.count(&PairOutcome::Skipped);

    if !global.quiet {
        println!(
            "{} {} {} pair(s){}",
            style("✓").green(),
            verb,
            style(report.applied()).cyan(),
            if skipped > 0 {
                format!(", {} already done", skipped)
            } else {
                String::new()
            }
        );
    }
    for (key, outcome) in report.problems() {
        let referencer = ws
            .store()
            .get_node(key.referencer)
            .map(|n| n.path.clone())
            .unwrap_or_else(|| key.referencer.to_string());
        let detail = match outcome {
            PairOutcome::Mismatch => "reference not found in content".to_string(),
            PairOutcome::Failed(reason) => reason.clone(),
            PairOutcome::Applied | PairOutcome::Skipped => continue,
        };
        println!(
            "{} {} -> {} ({}): {}",
            style("!").yellow(),
            referencer,
            key.matched_path,
            kind_name(key.kind),
            detail
        );
    }
    for path in &report.deleted {
        println!("{} Deleted {}", style("-").red(), path);
    }
}

fn kind_name(kind: RefKind) -> &'static str {
    match kind {
        RefKind::Direct => "direct",
        RefKind::Container => "container",
    }
}

fn run_end(global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(open_project(global)?);
    if ws.end_session()? {
        println!("{} Replacement session ended", style("✓").green());
    } else {
        println!("{} No replacement session in progress", style("!").yellow());
    }
    Ok(())
}
