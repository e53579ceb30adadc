//! tcas: content addressable storage tool
//!
//! Commands:
//!   digest <file>                    - compute the digest of a file
//!   decompose <file>                 - split a file into BLAKE3ZCC blocks and print its manifest
//!   verify <file> <resource-name>    - check a file against a ByteStream resource name
//!   config show                      - display current configuration

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io;
use std::path::PathBuf;

use tcas_core::config::TcasConfig;
use tcas_digest::HashAlgorithm;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "tcas",
    version,
    about = "Content addressable storage tool",
    long_about = "tcas: compute digests, decompose large blobs into BLAKE3ZCC blocks and verify objects"
)]
struct Cli {
    /// Path to tcas.toml configuration file
    #[arg(long, short = 'c', env = "TCAS_CONFIG", default_value = "tcas.toml")]
    config: PathBuf,

    /// Log level (overrides the configuration file)
    #[arg(long, env = "TCAS_LOG")]
    log: Option<String>,

    /// Log format (overrides the configuration file)
    #[arg(long, env = "TCAS_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute the digest of a local file
    Digest {
        /// Local file
        file: PathBuf,
        /// REv2 instance name to attach to the digest
        #[arg(long, short = 'i', default_value = "")]
        instance: String,
        /// Digest function
        #[arg(long, short = 'a', value_enum, default_value_t = Algorithm::Blake3zcc)]
        algorithm: Algorithm,
    },

    /// Store a local file through the decomposing blob access and list its blocks
    ///
    /// The file is written to an in-memory store, read back through the
    /// manifest and compared against the original.
    Decompose {
        /// Local file
        file: PathBuf,
        /// REv2 instance name to attach to the digest
        #[arg(long, short = 'i', default_value = "")]
        instance: String,
        /// Block size in bytes (overrides the configuration file)
        #[arg(long, short = 'b')]
        block_size: Option<i64>,
    },

    /// Check that a local file matches a ByteStream resource name
    ///
    /// The resource name has the form [{instance}/]blobs/{hash}/{size}.
    Verify {
        /// Local file
        file: PathBuf,
        /// ByteStream resource name of the expected object
        resource_name: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum Algorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Blake3zcc,
}

impl From<Algorithm> for HashAlgorithm {
    fn from(a: Algorithm) -> Self {
        match a {
            Algorithm::Md5 => HashAlgorithm::Md5,
            Algorithm::Sha1 => HashAlgorithm::Sha1,
            Algorithm::Sha256 => HashAlgorithm::Sha256,
            Algorithm::Sha384 => HashAlgorithm::Sha384,
            Algorithm::Sha512 => HashAlgorithm::Sha512,
            Algorithm::Blake3zcc => HashAlgorithm::Blake3Zcc,
        }
    }
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn from_config(format: &str) -> Self {
        if format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

// ── Entry point ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = TcasConfig::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| LogFormat::from_config(&config.logging.format));
    init_logging(&level, &format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "tcas starting"
    );

    let mut out = io::stdout().lock();
    match cli.command {
        Commands::Digest {
            file,
            instance,
            algorithm,
        } => commands::cmd_digest(&mut out, &file, &instance, algorithm.into()),
        Commands::Decompose {
            file,
            instance,
            block_size,
        } => {
            let mut decomposition = config.decomposition.clone();
            if let Some(block_size) = block_size {
                decomposition.block_size_bytes = block_size;
            }
            commands::cmd_decompose(&mut out, &file, &instance, &decomposition)
        }
        Commands::Verify {
            file,
            resource_name,
        } => commands::cmd_verify(&mut out, &file, &resource_name),
        Commands::Config {
            action: ConfigAction::Show,
        } => commands::cmd_config_show(&mut out, &config, &cli.config),
    }
}

/// Logs go to stderr so that command output on stdout stays machine readable.
fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}
