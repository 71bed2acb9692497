//! wgforge: WireGuard Configuration Generator
//!
//! Loads a parameter file, runs one generation and prints or writes the
//! rendered tunnel configs and RouterOS scripts.
//!
//! Usage:
//!   wgforge example --mode client-server > office.toml
//!   wgforge generate office.toml --out-dir ./out
//!   wgforge keygen --count 3
//!   wgforge pubkey <PRIVATE_KEY>

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wgforge_core::{
    Artifact, GenerateRequest, Generated, Generator, KeyRing, TopologyMode, validate_key,
};

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Clone, Copy, ValueEnum, Default)]
enum Format {
    /// wg-quick tunnel configs only
    Tunnel,
    /// RouterOS scripts only
    Vendor,
    /// Both formats
    #[default]
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// One hub, N clients
    ClientServer,
    /// Full mesh between sites
    SiteToSite,
}

impl From<Mode> for TopologyMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::ClientServer => TopologyMode::ClientServer,
            Mode::SiteToSite => TopologyMode::SiteToSite,
        }
    }
}

#[derive(Parser)]
#[command(name = "wgforge")]
#[command(version)]
#[command(about = "Generate consistent WireGuard configs for hub-and-spoke and mesh networks")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate configs from a TOML or JSON parameter file
    Generate {
        /// Parameter file (.toml or .json)
        params: PathBuf,

        /// Write one file per participant here instead of printing
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Output formats
        #[arg(short, long, default_value = "all")]
        format: Format,
    },
    /// Generate key pairs
    Keygen {
        /// Number of key pairs
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
    /// Generate a pre-shared key
    Psk,
    /// Derive the public key of a base64 private key
    Pubkey {
        private_key: String,
    },
    /// Print an example parameter file
    Example {
        #[arg(short, long, default_value = "client-server")]
        mode: Mode,

        /// Print JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so rendered configs on stdout stay clean
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wgforge=info,wgforge_core=info".into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Generate { params, out_dir, format } => {
            generate(&params, out_dir.as_deref(), format).await
        }
        Command::Keygen { count } => {
            let ring = KeyRing::x25519();
            for _ in 0..count {
                let pair = ring.generate()?;
                println!("PrivateKey = {}", pair.private.to_base64());
                println!("PublicKey  = {}", pair.public);
            }
            Ok(())
        }
        Command::Psk => {
            println!("{}", KeyRing::x25519().generate_preshared_key().to_base64());
            Ok(())
        }
        Command::Pubkey { private_key } => {
            if !validate_key(private_key.trim()) {
                bail!("not a WireGuard key: expected 44 base64 characters encoding 32 bytes");
            }
            let pair = KeyRing::x25519().from_manual_private_key(&private_key)?;
            println!("{}", pair.public);
            Ok(())
        }
        Command::Example { mode, json } => {
            let request = GenerateRequest::example(mode.into());
            let text = if json { request.to_json()? } else { request.to_toml()? };
            println!("{}", text);
            Ok(())
        }
    }
}

async fn generate(params: &Path, out_dir: Option<&Path>, format: Format) -> Result<()> {
    let request = GenerateRequest::from_file(params)
        .with_context(|| format!("failed to load parameters from {}", params.display()))?;

    let generated = Generator::x25519()
        .generate(&request)
        .await
        .context("generation failed")?;

    let artifacts = selected(&generated, format);

    match out_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;

            for artifact in &artifacts {
                let path = dir.join(&artifact.file_name);
                tokio::fs::write(&path, &artifact.content)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            info!("Wrote {} files to {}", artifacts.len(), dir.display());
        }
        None => {
            for artifact in &artifacts {
                println!("### {} ({})", artifact.participant, artifact.file_name);
                println!("{}", artifact.content);
            }
        }
    }

    Ok(())
}

fn selected(generated: &Generated, format: Format) -> Vec<&Artifact> {
    match format {
        Format::Tunnel => generated.tunnel_configs.iter().collect(),
        Format::Vendor => generated.vendor_scripts.iter().collect(),
        Format::All => generated.artifacts().collect(),
    }
}
