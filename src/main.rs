// src/main.rs

use clap::Parser;
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc;
use token_tree::app_logic::{TreeCommand, TreeSession};
use token_tree::core::{
    ChangeCoalescer, ConfigManagerOperations, CoreConfigManager, CoreFileSystemProvider,
    CoreGitStatusProvider, FileSystemProviderOperations, RefreshSignal, SortDirection, SortMode,
    SortState, TreeConfig, format_token_badge, spawn_coalescing_worker,
};

const APP_NAME: &str = "TokenTree";

#[derive(Parser, Debug)]
#[command(name = "token_tree", about = "Prints a directory tree annotated with token counts")]
struct Args {
    /// Root directory of the tree
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Sort mode: name, size, date or tokens
    #[arg(long, default_value = "name")]
    sort: SortMode,

    /// Sort in descending order
    #[arg(long)]
    desc: bool,

    /// Search term: /regex/, .ext, wildcard or fuzzy text
    #[arg(long)]
    search: Option<String>,

    /// Substring or wildcard filter on names
    #[arg(long)]
    filter: Option<String>,

    /// Show dotfiles
    #[arg(long)]
    show_hidden: bool,

    /// Maximum depth to print (unlimited when omitted)
    #[arg(long)]
    depth: Option<usize>,

    /// Tokenizer strategy id (heuristic, whitespace, cl100k_base, o200k_base, p50k_base, model)
    #[arg(long)]
    tokenizer: Option<String>,

    /// Model identifier for the `model` tokenizer
    #[arg(long)]
    model: Option<String>,

    /// Files larger than this many bytes count as 0 tokens
    #[arg(long)]
    max_file_size: Option<u64>,

    /// Count every file before printing
    #[arg(long)]
    warm: bool,

    /// Keep running and reprint the tree when files change
    #[arg(long)]
    watch: bool,

    /// Also write the log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log debug output to the terminal
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let terminal_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        terminal_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(path) = log_file {
        loggers.push(WriteLogger::new(
            LevelFilter::Debug,
            Config::default(),
            File::create(path)?,
        ));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}

/* Loads persisted settings and lays the command-line overrides on top. */
fn resolve_config(args: &Args) -> TreeConfig {
    let mut config = match CoreConfigManager::new().load_config(APP_NAME) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Main: Could not load settings, using defaults: {e}");
            TreeConfig::default()
        }
    };
    if let Some(tokenizer) = &args.tokenizer {
        config.tokenizer = tokenizer.clone();
    }
    if args.model.is_some() {
        config.model = args.model.clone();
    }
    if let Some(max_file_size) = args.max_file_size {
        config.max_file_size = max_file_size;
    }
    if args.show_hidden {
        config.show_hidden = true;
    }
    config
}

fn print_children(session: &mut TreeSession, dir: &Path, depth: usize, max_depth: Option<usize>) {
    if max_depth.is_some_and(|max| depth >= max) {
        return;
    }
    for entry in session.arranged_children(dir) {
        let name = entry.name().to_string();
        let count = entry.token_count.unwrap_or(0);
        let indent = "  ".repeat(depth + 1);
        if count > 0 {
            println!(
                "{indent}{name} [{} {}]",
                format_token_badge(count),
                session.config().badge_suffix
            );
        } else {
            println!("{indent}{name}");
        }
        if entry.is_dir() {
            print_children(session, &entry.path, depth + 1, max_depth);
        }
    }
}

fn print_tree(session: &mut TreeSession, max_depth: Option<usize>) {
    let root = session.root().to_path_buf();
    let total = session.walker().token_count_of(&root);
    println!(
        "{} [{} {}]",
        root.display(),
        format_token_badge(total),
        session.config().badge_suffix
    );
    print_children(session, &root, 0, max_depth);
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let root = args.root.canonicalize()?;
    let config = resolve_config(&args);
    log::debug!("Main: Using tokenizer '{}'.", config.tokenizer_strategy());

    let file_system: Arc<dyn FileSystemProviderOperations> = Arc::new(CoreFileSystemProvider::new());
    let mut session = TreeSession::with_config(
        root.clone(),
        Arc::clone(&file_system),
        config,
        Arc::new(CoreConfigManager::new()),
        Arc::new(CoreGitStatusProvider::new()),
    );
    let direction = if args.desc {
        SortDirection::Descending
    } else {
        SortDirection::Ascending
    };
    session.set_sort_state(SortState::new(args.sort, direction));
    session.handle(TreeCommand::SetSearch(args.search.clone()));
    session.handle(TreeCommand::SetFilter(args.filter.clone()));

    if args.warm {
        let files = session.walker().warm_cache();
        log::info!("Main: Pre-counted {files} file(s).");
    }

    print_tree(&mut session, args.depth);

    if !args.watch {
        return Ok(());
    }

    let (guard, events) = file_system.watch(&root)?.into_parts();
    let (signal_tx, signal_rx) = mpsc::channel::<RefreshSignal>();
    let _worker = spawn_coalescing_worker(
        Arc::clone(session.walker()),
        events,
        ChangeCoalescer::from_config(session.config()),
        move |signal| {
            // The main loop only stops receiving when the process is exiting.
            let _ = signal_tx.send(signal);
        },
    );

    eprintln!("Watching {} for changes (Ctrl+C to stop)...", root.display());
    for signal in signal_rx {
        log::debug!("Main: Refresh requested: {signal:?}");
        println!();
        print_tree(&mut session, args.depth);
    }
    drop(guard);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(args.verbose, args.log_file.as_deref()) {
        eprintln!("Failed to initialise logging: {e}");
    }
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Main: {e}");
            eprintln!("token_tree: {e}");
            ExitCode::FAILURE
        }
    }
}
