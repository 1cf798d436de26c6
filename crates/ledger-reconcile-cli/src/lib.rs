mod config;
mod console;
mod kinds;
mod ledger;
mod loader;
mod show;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory as _, Parser, Subcommand, ValueEnum as _};
use ledger_reconcile::reconcile::Reconciliator;
use ledger_reconcile::review::{Console, review};

use config::Config;
use console::StdConsole;
use kinds::ReconciliationKind;
use ledger::FileLedger;
use loader::Loader;

#[derive(Parser)]
#[command(
    name = "ledger-reconcile",
    about = "Match bank and card statements against your own records"
)]
#[command(disable_help_subcommand = true)]
struct Args {
    /// Config file (default: ledger-reconcile.toml in the current directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding statements and ledger files, overriding the config
    #[arg(short, long, global = true)]
    main_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactively confirm matches, then save the results
    Reconcile {
        kind: ReconciliationKind,

        /// Review without writing anything back
        #[arg(long)]
        dry_run: bool,
    },
    /// List candidate matches without changing anything
    Preview { kind: ReconciliationKind },
}

pub fn run(args: impl IntoIterator<Item = String>) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ledger_reconcile=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    clap_complete::CompleteEnv::with_factory(Args::command).complete();

    let args = Args::parse_from(args);
    let (base_dir, config) = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::find_and_load()?.unwrap_or_default(),
    };
    let main_path = args
        .main_path
        .unwrap_or_else(|| base_dir.join(&config.main_path));
    let (default_separator, loading_separator) = config.separators()?;

    let (kind, dry_run, preview) = match args.command {
        Commands::Reconcile { kind, dry_run } => (kind, dry_run, false),
        Commands::Preview { kind } => (kind, true, true),
    };
    let info = kind.loading_info();
    let mut ledger = ReconciliationKind::value_variants().iter().fold(
        FileLedger::new(&main_path),
        |ledger, kind| {
            let info = kind.loading_info();
            ledger.with_sheet(info.sheet, info.owned_variant)
        },
    );
    let mut console = StdConsole;

    let mut loader = Loader {
        info: &info,
        main_path: &main_path,
        config: &config,
        default_separator,
        loading_separator,
        console: &mut console,
        ledger: &mut ledger,
        today: chrono::Local::now().date_naive(),
    };
    let mut reconciliator = if preview {
        loader.load_files()?
    } else {
        loader.load()?
    };

    if config.matching.auto_match {
        auto_match(&mut reconciliator, &mut console)?;
    }

    if preview {
        show::show_preview(&reconciliator, &info, &config.format.currency_symbol);
        return Ok(());
    }

    let outcome = review(&mut reconciliator, &mut console, &config.review_options())?;
    show::show_summary(&reconciliator.summary(), outcome, &info);

    let reconciled = reconciliator.finish()?;
    if dry_run {
        tracing::info!("dry run, nothing written");
        return Ok(());
    }
    loader::save(&reconciled, &info, &main_path, loading_separator, &mut ledger)
}

fn auto_match(reconciliator: &mut Reconciliator, console: &mut impl Console) -> Result<()> {
    let matched = reconciliator.auto_match()?;
    console.output_line(&format!(
        "Matched {matched} same-day record(s) automatically."
    ))?;
    Ok(())
}
