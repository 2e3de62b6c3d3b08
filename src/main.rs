use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use triagebox::collect::{self, HashAlgorithm, DEFAULT_BLOCK_SIZE};
use triagebox::logging::{self, LogFormat};
use triagebox::rules::{self, RuleSet};
use triagebox::server;
use triagebox::triage::{Pipeline, TriageConfig};

/// triagebox - forensic triage of uploaded archives
#[derive(Parser)]
#[command(name = "triagebox")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Rule file (overrides the configured path)
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the upload server
    Serve {
        /// Listen address (overrides the configured bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Triage one archive and print the JSON report
    Triage {
        archive: PathBuf,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },

    /// Block-copy a device, file or folder into an image file
    Image {
        source: PathBuf,
        output: PathBuf,

        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,

        /// Print a digest of the finished image
        #[arg(long)]
        hash: Option<HashAlgorithm>,
    },

    /// Print the digest of a file
    Hash {
        path: PathBuf,

        #[arg(long, default_value_t = HashAlgorithm::Sha256)]
        algorithm: HashAlgorithm,
    },

    /// List physical disks
    Disks,

    /// List subdirectories
    Folders {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<TriageConfig> {
    let mut config = match &cli.config {
        Some(path) => TriageConfig::load(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => TriageConfig::default(),
    };
    if let Some(path) = &cli.rules {
        config.rules.path = path.clone();
    }
    Ok(config)
}

fn load_rules(config: &TriageConfig) -> Result<Arc<RuleSet>> {
    rules::load_global(&config.rules.path)
        .with_context(|| format!("failed to compile rules: {}", config.rules.path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    });

    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            config.validate().context("invalid configuration")?;
            let rules = load_rules(&config)?;
            server::serve(Arc::new(config), rules)
                .await
                .context("server failed")?;
        }
        Commands::Triage { archive, pretty } => {
            config.ensure_directories()?;
            let rules = load_rules(&config)?;
            let pipeline = Pipeline::new(Arc::new(config), rules);
            let report = pipeline
                .triage_archive(&archive)
                .await
                .with_context(|| format!("failed to triage {}", archive.display()))?;
            let json = if pretty {
                report.to_json_pretty()?
            } else {
                report.to_json_string()?
            };
            println!("{}", json);
        }
        Commands::Image {
            source,
            output,
            block_size,
            hash,
        } => {
            let copied = if source.is_dir() {
                collect::image_folder(&source, &output, block_size)?
            } else {
                collect::copy_blocks(&source, &output, block_size)?
            };
            println!("{} bytes written to {}", copied, output.display());
            if let Some(algorithm) = hash {
                let digest = collect::hash_file(&output, algorithm)?;
                println!("{}  {}", digest, output.display());
            }
        }
        Commands::Hash { path, algorithm } => {
            let digest = collect::hash_file(&path, algorithm)
                .with_context(|| format!("failed to hash {}", path.display()))?;
            println!("{}  {}", digest, path.display());
        }
        Commands::Disks => {
            let disks = collect::list_disks()?;
            info!(count = disks.len(), "disks enumerated");
            for (idx, disk) in disks.iter().enumerate() {
                println!(
                    "[{}] {}\t{} bytes{}",
                    idx,
                    disk.device.display(),
                    disk.size_bytes,
                    if disk.removable { "\tremovable" } else { "" }
                );
            }
        }
        Commands::Folders { dir } => {
            for (idx, folder) in collect::list_folders(&dir)?.iter().enumerate() {
                println!("[{}] {}", idx, folder);
            }
        }
    }

    Ok(())
}
