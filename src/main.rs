//! fatfinder - find out which folders eat your disk space.
//!
//! Usage:
//!   fatfinder [PATH]                     Scan and print the largest folders
//!   fatfinder scan [PATH] --reload SUB   Scan, then rescan SUB in place
//!   fatfinder export [PATH]              Export scan to JSON
//!   fatfinder info PATH                  Show the properties of one entry
//!   fatfinder --help                     Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result, bail};
use parking_lot::RwLock;
use tracing_subscriber::EnvFilter;

use fatfinder_core::{format_modified, percent_of_parent};
use fatfinder_scan::{
    EntryTree, FileKind, FolderSizer, NodeId, OsFileSystem, ReloadCoordinator, ReloadOutcome,
    ScanConfig, SizedFolder, format_percent, format_size, start_scan,
};

#[derive(Parser)]
#[command(
    name = "fatfinder",
    version,
    about = "Find out which folders eat your disk space",
    long_about = "fatfinder sizes a folder and everything below it, then shows \
                  where the bytes went.\n\n\
                  Run `fatfinder [PATH]` for a quick overview, or use the \
                  subcommands to rescan branches or export the tree."
)]
struct Cli {
    /// Path to analyze (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Read scan settings from a TOML file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Include hidden entries
    #[arg(long, global = true, overrides_with = "no_hidden")]
    hidden: bool,

    /// Skip entries whose name starts with a dot
    #[arg(long, global = true)]
    no_hidden: bool,

    /// Skip entries whose name matches this glob (repeatable)
    #[arg(short, long, global = true)]
    ignore: Vec<String>,

    /// Report allocated disk usage instead of apparent size
    #[arg(long, global = true)]
    disk_usage: bool,

    /// More log output on stderr (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Scan and show the largest entries
    Scan {
        /// Path to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Maximum depth to display
        #[arg(short, long, default_value = "3")]
        depth: u32,

        /// Number of top entries to show per directory
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,

        /// Rescan this folder after the first pass (repeatable)
        #[arg(short, long)]
        reload: Vec<PathBuf>,
    },

    /// Export scan results to JSON
    Export {
        /// Path to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the properties of a file or folder
    Info {
        /// Entry to describe
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(&cli)?;

    match cli.command {
        Some(Command::Scan {
            ref path,
            depth,
            top,
            ref reload,
        }) => {
            run_scan(config, path, depth, top, reload).await?;
        }
        Some(Command::Export {
            ref path,
            ref output,
        }) => {
            run_export(config, path, output.as_deref()).await?;
        }
        Some(Command::Info { ref path }) => {
            run_info(config, path).await?;
        }
        None => {
            run_scan(config, &cli.path, 3, 10, &[]).await?;
        }
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Settings from `--config`, then command-line overrides.
fn load_config(cli: &Cli) -> Result<ScanConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("Cannot read config {}", path.display()))?;
            toml::from_str(&text)
                .wrap_err_with(|| format!("Invalid config {}", path.display()))?
        }
        None => ScanConfig::default(),
    };

    if cli.hidden {
        config.include_hidden = true;
    }
    if cli.no_hidden {
        config.include_hidden = false;
    }
    if cli.disk_usage {
        config.apparent_size = false;
    }
    config.ignore_patterns.extend(cli.ignore.iter().cloned());

    tracing::debug!(?config, "scan configuration");
    Ok(config)
}

/// Size `path` on a background worker, drawing a progress line on stderr.
async fn size_with_progress(sizer: &FolderSizer, path: &Path) -> Result<SizedFolder> {
    eprintln!("Scanning {}...", path.display());

    let mut task = start_scan(sizer, path);
    while let Some(progress) = task.progress_rx.recv().await {
        eprint!("\r {:>3}% ", progress.percent());
    }
    eprintln!();

    task.join().await.wrap_err("Scan failed")
}

/// Run a scan, display the tree, then apply the requested reloads.
async fn run_scan(
    config: ScanConfig,
    path: &Path,
    max_depth: u32,
    top_n: usize,
    reloads: &[PathBuf],
) -> Result<()> {
    let path = path.canonicalize().context("Invalid path")?;
    let sizer = FolderSizer::new(config).context("Invalid configuration")?;
    let sized = size_with_progress(&sizer, &path).await?;

    print_summary(&sized.tree, sized.scan_duration.as_secs_f64());
    print_entry(&sized.tree, sized.tree.root(), 0, max_depth, top_n);
    if sized.has_warnings() {
        println!();
        println!("{} warning(s) during scan", sized.warnings.len());
    }

    if reloads.is_empty() {
        return Ok(());
    }

    let coordinator = ReloadCoordinator::new(Arc::new(RwLock::new(sized.tree)), sizer);
    for sub in reloads {
        let target = resolve_target(&coordinator, &path, sub)?;
        let mut task = coordinator.reload(target)?;
        while task.progress_rx.recv().await.is_some() {}

        match task.join().await? {
            ReloadOutcome::Spliced {
                previous_size,
                total_size,
                warnings,
                ..
            } => {
                println!();
                println!(
                    "Reloaded {}: {} -> {}",
                    sub.display(),
                    format_size(previous_size),
                    format_size(total_size)
                );
                if !warnings.is_empty() {
                    println!("{} warning(s) during reload", warnings.len());
                }
            }
            ReloadOutcome::Removed { freed, .. } => {
                println!();
                println!("{} is gone, {} freed", sub.display(), format_size(freed));
            }
        }
    }

    let tree = coordinator.tree().read();
    print_summary(&tree, 0.0);
    print_entry(&tree, tree.root(), 0, max_depth, top_n);

    Ok(())
}

/// Find the tree entry for a `--reload` argument, relative to the scan root.
fn resolve_target(coordinator: &ReloadCoordinator, root: &Path, sub: &Path) -> Result<NodeId> {
    let joined = root.join(sub);
    // a folder that vanished cannot be canonicalized but may still be in the tree
    let path = joined.canonicalize().unwrap_or(joined);

    match coordinator.tree().read().find_by_path(&path) {
        Some(id) => Ok(id),
        None => bail!("{} is not part of the scanned tree", path.display()),
    }
}

/// Export scan results to JSON.
async fn run_export(config: ScanConfig, path: &Path, output: Option<&Path>) -> Result<()> {
    let path = path.canonicalize().context("Invalid path")?;
    let sizer = FolderSizer::new(config).context("Invalid configuration")?;
    let sized = size_with_progress(&sizer, &path).await?;

    let json = serde_json::to_string_pretty(&sized)?;

    match output {
        Some(output_path) => {
            std::fs::write(output_path, json)?;
            eprintln!("Exported to {}", output_path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

/// Print the properties of one entry. Folders are sized first.
async fn run_info(config: ScanConfig, path: &Path) -> Result<()> {
    let props = OsFileSystem::from_config(&config)
        .properties(path)
        .wrap_err_with(|| format!("Cannot read {}", path.display()))?;

    let (size, items) = if props.file_type == FileKind::Directory {
        let path = path.canonicalize().context("Invalid path")?;
        let sizer = FolderSizer::new(config).context("Invalid configuration")?;
        let sized = size_with_progress(&sizer, &path).await?;
        (sized.total_size(), Some(sized.num_items()))
    } else {
        (props.apparent_size, None)
    };

    let yes_no = |flag: bool| if flag { "yes" } else { "no" };
    println!("{:<14} {}", "Name", props.name);
    println!("{:<14} {}", "Kind", props.kind);
    println!("{:<14} {}", "Type", props.file_type);
    println!("{:<14} {}", "Size", format_size(size));
    if let Some(items) = items {
        println!("{:<14} {}", "Items", items);
    }
    println!(
        "{:<14} {}",
        "Size on disk",
        props.size_on_disk.map_or_else(|| "-".to_string(), format_size)
    );
    println!(
        "{:<14} {}",
        "Modified",
        props.modified.map_or_else(|| "-".to_string(), format_modified)
    );
    println!("{:<14} {}", "Hidden", yes_no(props.hidden));
    println!("{:<14} {}", "Read-only", yes_no(props.read_only));
    println!("{:<14} {}", "Executable", yes_no(props.executable));
    if let Some(permissions) = &props.permissions {
        println!("{:<14} {}", "Permissions", permissions);
    }

    Ok(())
}

fn print_summary(tree: &EntryTree, seconds: f64) {
    let root = tree.root_directory();
    println!();
    println!("{}", "─".repeat(60));
    println!(" {} - {}", root.path.display(), format_size(root.total_size));
    println!(
        " {} items, {} in files directly below",
        root.num_items,
        format_size(root.files_size)
    );
    println!(" Modified {}", format_modified(root.modified));
    if seconds > 0.0 {
        println!(" Scanned in {:.2}s", seconds);
    }
    println!("{}", "─".repeat(60));
    println!();
}

/// Print an entry and its largest children.
fn print_entry(tree: &EntryTree, id: NodeId, depth: u32, max_depth: u32, top_n: usize) {
    let Some(entry) = tree.get(id) else {
        return;
    };

    let indent = "  ".repeat(depth as usize);
    let percent = percent_of_parent(tree, id).unwrap_or(100.0);
    let name = if depth == 0 {
        entry.path().display().to_string()
    } else if entry.is_dir() {
        format!("{}/", entry.name())
    } else {
        entry.name().to_string()
    };
    let items = entry
        .as_directory()
        .map(|dir| format!("{} items", dir.num_items))
        .unwrap_or_default();

    println!(
        "{}{}{:<40} {:>12} {:>8} {} {}",
        indent,
        if entry.is_dir() { "▼ " } else { "  " },
        truncate(&name, 40),
        format_size(entry.size()),
        format_percent(percent),
        make_bar(percent / 100.0, 10),
        items
    );

    if entry.is_dir() && depth < max_depth {
        let mut children: Vec<_> = tree.children(id).collect();
        children.sort_by_key(|child| std::cmp::Reverse(child.size()));
        let remaining = children.len().saturating_sub(top_n);

        for child in children.into_iter().take(top_n) {
            print_entry(tree, child.id(), depth + 1, max_depth, top_n);
        }

        if remaining > 0 {
            let indent = "  ".repeat((depth + 1) as usize);
            println!("{}  ... and {} more", indent, remaining);
        }
    }
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = ((ratio * width as f64).round() as usize).min(width);
    let empty = width - filled;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Truncate a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 1).collect();
        format!("{}…", kept)
    }
}
