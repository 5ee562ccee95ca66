//! dirstat, directory statistics from the command line.
//!
//! Thin binary entry point. All logic lives in the `dirstat-core` crate.

use std::path::PathBuf;
use std::time::SystemTime;

use anyhow::Context;
use clap::Parser;
use dirstat_core::model::size::{format_blocks, format_count, format_size};
use dirstat_core::model::{DirTree, NodeIndex, ReadState};
use dirstat_core::scanner::progress::ScanProgress;
use dirstat_core::scanner::start_scan;
use dirstat_core::ScanConfig;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "dirstat",
    version,
    about = "Scan a directory tree and summarise where the space goes"
)]
struct Cli {
    /// Directory to scan
    path: PathBuf,

    /// JSON config file; command-line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip directories matching PATTERN (name, `prefix*`, `*suffix` or full path)
    #[arg(short, long = "exclude", value_name = "PATTERN")]
    excludes: Vec<String>,

    /// Descend into directories on other filesystems
    #[arg(short = 'x', long)]
    cross_filesystems: bool,

    /// Read worker threads (default: one per CPU)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Number of largest children to list
    #[arg(short = 'n', long, default_value = "10")]
    top: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging();

    let config = build_config(&cli)?;
    let handle = start_scan(config)
        .with_context(|| format!("cannot scan {}", cli.path.display()))?;

    for message in handle.progress_rx.iter() {
        match message {
            ScanProgress::Update {
                files_found,
                dirs_found,
                total_size,
                current_path,
            } => debug!(
                "{} files, {} dirs, {} so far ({current_path})",
                format_count(files_found),
                format_count(dirs_found),
                format_size(total_size)
            ),
            ScanProgress::Error { path, message } => debug!("{path}: {message}"),
            ScanProgress::Complete {
                duration,
                error_count,
                ..
            } => {
                info!("Scanned in {duration:.2?} with {error_count} errors");
                break;
            }
            ScanProgress::Cancelled => {
                warn!("Scan was cancelled; results are partial");
                break;
            }
        }
    }

    let tree = handle.live_tree.read();
    print_summary(&tree, cli.top);
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file first, then command-line overrides.
fn build_config(cli: &Cli) -> anyhow::Result<ScanConfig> {
    let mut config = match &cli.config {
        Some(path) => ScanConfig::from_json_file(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => ScanConfig::default(),
    };
    config.root = cli.path.clone();
    config.exclude_patterns.extend(cli.excludes.iter().cloned());
    config.cross_filesystems |= cli.cross_filesystems;
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    config.validate()?;
    Ok(config)
}

fn print_summary(tree: &DirTree, top: usize) {
    let root = tree.root();
    let totals = tree.totals(root);

    println!("{}", tree.full_path(root).display());
    println!(
        "  size      {} ({} allocated)",
        format_size(totals.size),
        format_blocks(totals.blocks)
    );
    println!(
        "  items     {} ({} dirs, {} files)",
        format_count(totals.items),
        format_count(totals.sub_dirs),
        format_count(totals.files)
    );
    println!("  modified  {}", format_mtime(totals.latest_mtime));

    let children = tree.children_sorted_by_size(root);
    if children.is_empty() || top == 0 {
        return;
    }

    println!();
    for child in children.into_iter().take(top) {
        let child_totals = tree.totals(child);
        println!(
            "  {:>10}  {:>9} items  {}  {}{}",
            format_size(child_totals.size),
            format_count(child_totals.items),
            format_mtime(child_totals.latest_mtime),
            tree.node(child).name(),
            markers(tree, child)
        );
    }
}

fn markers(tree: &DirTree, node: NodeIndex) -> String {
    let mut out = String::new();
    match tree.read_state(node) {
        ReadState::Error => out.push_str(" [error]"),
        ReadState::Aborted => out.push_str(" [aborted]"),
        _ => {}
    }
    if tree.is_excluded(node) {
        out.push_str(" [excluded]");
    }
    if tree.is_mount_point(node) {
        out.push_str(" [mount point]");
    }
    out
}

fn format_mtime(mtime: SystemTime) -> String {
    if mtime == SystemTime::UNIX_EPOCH {
        return "-".to_string();
    }
    chrono::DateTime::<chrono::Local>::from(mtime)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}
