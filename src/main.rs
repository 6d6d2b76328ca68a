// src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pallet::{Arch, BarProgress, BucketRegistry, Config, Downloader, HttpClient, InstallLock, Layout, Package};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "pallet")]
#[command(author, version, about = "Resolve packages from buckets and fetch them", long_about = None)]
struct Cli {
    /// Configuration file (default: $PALLET_CONFIG or the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose transport diagnostics
    #[arg(long, global = true)]
    debug: bool,

    /// Skip TLS certificate validation
    #[arg(short = 'k', long, global = true)]
    insecure: bool,

    /// Send every request through this proxy
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Resolve descriptors for this architecture (x64, arm64, generic)
    #[arg(long, global = true)]
    arch: Option<Arch>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search packages by name (glob, case-insensitive)
    Search {
        pattern: String,
    },
    /// Show the resolved metadata of a package
    Info {
        name: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Download a package (or a plain URL) and verify its hash
    Fetch {
        /// Package name, `bucket/name`, or an http(s) URL
        target: String,
        /// Destination directory (default: <root>/downloads)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    config.debug |= cli.debug;
    config.insecure |= cli.insecure;
    if cli.proxy.is_some() {
        config.proxy = cli.proxy.clone();
    }

    let layout = Layout::new(&config.root);
    let mut registry = BucketRegistry::new(layout.buckets_dir(), config.buckets.clone());
    if let Some(arch) = cli.arch {
        registry = registry.with_arch(arch);
    }

    match cli.command {
        Commands::Search { pattern } => {
            let found = registry.search(&pattern)?;
            if found.is_empty() {
                println!("No packages match '{pattern}'");
            }
            for pkg in found {
                println!("{:<24} {:<12} [{}] {}", pkg.name, pkg.version, pkg.bucket, pkg.description);
            }
        }
        Commands::Info { name, json } => {
            let pkg = resolve(&registry, &name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&pkg)?);
            } else {
                print_info(&pkg);
            }
        }
        Commands::Fetch { target, dir } => {
            let dir = dir.unwrap_or_else(|| layout.downloads_dir());
            let _lock = InstallLock::acquire(layout.lock_path())
                .context("another pallet process is running")?;

            let client = HttpClient::from_config(&config)?;
            let downloader = Downloader::new(&client).with_progress(Box::new(BarProgress::new(&target)));
            let path = if target.starts_with("http://") || target.starts_with("https://") {
                downloader.download(&target, &dir)?
            } else {
                let pkg = resolve(&registry, &target)?;
                info!("Fetching {}", pkg.display_name());
                downloader.download_package(&pkg, &dir)?
            };
            println!("{}", path.display());
        }
    }

    Ok(())
}

/// `name` searches every bucket; `bucket/name` pins one
fn resolve(registry: &BucketRegistry, target: &str) -> Result<Package> {
    match target.split_once('/') {
        Some((bucket, name)) => {
            let Some(bucket) = registry.bucket(bucket) else {
                bail!("unknown bucket '{bucket}'");
            };
            Ok(registry.resolve(bucket, name)?)
        }
        None => Ok(registry.find(target)?),
    }
}

fn print_info(pkg: &Package) {
    println!("Name:        {}", pkg.name);
    println!("Version:     {}", pkg.version);
    println!("Bucket:      {}", pkg.bucket);
    println!("Description: {}", pkg.description);
    if !pkg.homepage.is_empty() {
        println!("Homepage:    {}", pkg.homepage);
    }
    if !pkg.license.is_empty() {
        println!("License:     {}", pkg.license);
    }
    for url in &pkg.urls {
        println!("URL:         {url}");
    }
    if !pkg.hash.is_empty() {
        println!("Hash:        {}", pkg.hash);
    }
    if !pkg.links.is_empty() {
        println!("Links:       {}", pkg.links.join(", "));
    }
    if !pkg.launchers.is_empty() {
        println!("Launchers:   {}", pkg.launchers.join(", "));
    }
    if !pkg.suggest.is_empty() {
        println!("Suggests:    {}", pkg.suggest.join(", "));
    }
    if let Some(venv) = &pkg.venv {
        println!("Venv:        {}", venv.category);
    }
    if !pkg.notes.is_empty() {
        println!("Notes:       {}", pkg.notes);
    }
}
