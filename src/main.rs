use clap::Parser;
use miette::Result;
use refmerge::cli::{Cli, Commands};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    // Logging goes to stderr so stdout stays pipeable; RUST_LOG wins over --verbose
    let default_level = if global.verbose { "refmerge=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    match cli.command {
        Commands::Init(args) => refmerge::cli::commands::init::run(args),
        Commands::Track(args) => refmerge::cli::commands::track::run(args, &global),
        Commands::Graph(cmd) => refmerge::cli::commands::graph::run(cmd, &global),
        Commands::WhereUsed(args) => refmerge::cli::commands::where_used::run(args, &global),
        Commands::Similar(args) => refmerge::cli::commands::similar::run(args, &global),
        Commands::Replace(cmd) => refmerge::cli::commands::replace::run(cmd, &global),
        Commands::Completions(args) => refmerge::cli::commands::completions::run(args),
    }
}
