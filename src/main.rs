//! implant-forge CLI.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use implant_forge::certs::OpensslAuthority;
use implant_forge::pipeline::{BuildOptions, ImplantBuilder};
use implant_forge::targets::SUPPORTED_TARGETS;
use implant_forge::toolchain::GoToolchain;
use implant_forge::{paths, profiles, BuildRequest};

#[derive(Parser)]
#[command(name = "implant-forge")]
#[command(about = "Implant build pipeline")]
#[command(
    after_help = "QUICK START:\n  implant-forge targets                         List compiler targets\n  implant-forge generate --os linux --arch amd64 --lhost 203.0.113.7\n  implant-forge profiles list                   Show saved presets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an implant executable
    Generate {
        #[command(flatten)]
        request: RequestArgs,

        /// Copy the finished binary to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Abort the compile after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Delete the workspace if the build fails (default: keep for postmortem)
        #[arg(long)]
        cleanup_on_failure: bool,
    },

    /// List supported (os, arch) compiler targets
    Targets,

    /// Manage saved request presets
    Profiles {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List saved profiles
    List,
    /// Save a request preset under a name
    Save {
        /// Profile name
        name: String,

        #[command(flatten)]
        request: RequestArgs,
    },
}

#[derive(Args)]
struct RequestArgs {
    /// Target operating system
    #[arg(long)]
    os: String,

    /// Target architecture
    #[arg(long, default_value = "amd64")]
    arch: String,

    /// Implant name (generated when omitted)
    #[arg(long)]
    name: Option<String>,

    /// mTLS listen host
    #[arg(long, default_value = "")]
    lhost: String,

    /// mTLS listen port (0 = default)
    #[arg(long, default_value = "0")]
    lport: u16,

    /// DNS parent domain
    #[arg(long, default_value = "")]
    dns: String,

    /// Debug build: skip obfuscation, keep the tree inspectable
    #[arg(long)]
    debug: bool,

    /// Reconnect interval in seconds (0 = default)
    #[arg(long, default_value = "0")]
    reconnect: u64,
}

impl From<RequestArgs> for BuildRequest {
    fn from(args: RequestArgs) -> Self {
        BuildRequest {
            os: args.os,
            arch: args.arch,
            name: args.name,
            mtls_server: args.lhost,
            mtls_port: args.lport,
            dns_parent: args.dns,
            debug: args.debug,
            reconnect_interval: args.reconnect,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    dotenvy::dotenv().ok();
    let app_root = paths::app_root();

    match cli.command {
        Commands::Generate {
            request,
            output,
            timeout,
            cleanup_on_failure,
        } => {
            let builder = ImplantBuilder::new(
                paths::implants_dir(&app_root),
                Arc::new(OpensslAuthority::new(paths::ca_dir(&app_root))),
                Arc::new(GoToolchain::discover()?),
            );
            let options = BuildOptions {
                timeout: timeout.map(Duration::from_secs),
                cancel: None,
                cleanup_on_failure,
            };

            let result = builder.generate_implant(&request.into(), &options)?;
            println!("Implant '{}' ready: {}", result.name, result.path.display());

            if let Some(output) = output {
                fs::copy(&result.path, &output)
                    .with_context(|| format!("copying binary to {}", output.display()))?;
                println!("Copied to {}", output.display());
            }
        }

        Commands::Targets => {
            for &(os, arch) in SUPPORTED_TARGETS {
                println!("{os}/{arch}");
            }
        }

        Commands::Profiles { action } => match action {
            ProfileAction::List => {
                let profiles = profiles::list(&app_root)?;
                if profiles.is_empty() {
                    println!("No saved profiles.");
                }
                for (name, request) in profiles {
                    println!(
                        "{name}: {}/{} mtls={}:{} dns={} debug={}",
                        request.os,
                        request.arch,
                        request.mtls_server,
                        request.mtls_port,
                        request.dns_parent,
                        request.debug
                    );
                }
            }
            ProfileAction::Save { name, request } => {
                profiles::save(&app_root, &name, &request.into())?;
                println!("Saved profile '{name}'.");
            }
        },
    }

    Ok(())
}
