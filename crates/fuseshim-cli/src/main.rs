use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use fuseshim_core::MountError;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "fuseshim", version, about = "fuseshim - userspace filesystems on libfuse 3")]
struct Cli {
    /// Log level when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mount the in-memory demo filesystem
    Mem {
        /// Directory to mount at
        mountpoint: PathBuf,
        /// Reject every modification with EROFS
        #[arg(long)]
        read_only: bool,
        /// Let libfuse daemonize instead of staying in the foreground
        #[arg(long)]
        background: bool,
        /// Extra arguments handed to libfuse unchanged
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        fuse_options: Vec<String>,
    },
    /// Mirror a host directory at the mount point
    Mirror {
        /// Directory to expose
        base_path: PathBuf,
        /// Directory to mount at
        mountpoint: PathBuf,
        /// Reject every modification with EROFS
        #[arg(long)]
        read_only: bool,
        /// Let libfuse daemonize instead of staying in the foreground
        #[arg(long)]
        background: bool,
        /// Extra arguments handed to libfuse unchanged
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        fuse_options: Vec<String>,
    },
    /// Mount the filesystem described by a configuration file
    Run {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Check a configuration file without mounting
    Validate {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Unmount a fuseshim mount point
    Unmount {
        /// Mount point to release
        mountpoint: PathBuf,
        /// Detach even if the mount is busy
        #[arg(short, long)]
        lazy: bool,
    },
    /// Run libfuse's own argument handling, e.g. `fuseshim libfuse --version`
    Libfuse {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

/// Installs the global subscriber. `RUST_LOG` wins over `level`.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let level = cli.log_level.as_deref();
    match cli.command {
        Commands::Mem {
            mountpoint,
            read_only,
            background,
            fuse_options,
        } => {
            init_logging(level.unwrap_or("info"));
            commands::mount::run_memory(commands::mount::MountArgs {
                mountpoint,
                read_only,
                background,
                fuse_options,
            })
        }
        Commands::Mirror {
            base_path,
            mountpoint,
            read_only,
            background,
            fuse_options,
        } => {
            init_logging(level.unwrap_or("info"));
            commands::mount::run_mirror(
                base_path,
                commands::mount::MountArgs {
                    mountpoint,
                    read_only,
                    background,
                    fuse_options,
                },
            )
        }
        Commands::Run { config } => {
            let config = commands::run::load(config)?;
            init_logging(level.unwrap_or(config.log_level()));
            commands::mount::run(config)
        }
        Commands::Validate { config } => commands::validate::run(config),
        Commands::Unmount { mountpoint, lazy } => {
            init_logging(level.unwrap_or("info"));
            commands::unmount::run(&mountpoint, lazy)
        }
        Commands::Libfuse { args } => Ok(fuseshim_core::call_main(args.as_slice())?),
    }
}

/// Mount failures exit with their errno; everything else with 1.
fn exit_status(error: &(dyn std::error::Error + 'static)) -> u8 {
    let code = error
        .downcast_ref::<MountError>()
        .map(MountError::exit_code)
        .unwrap_or(1);
    u8::try_from(code).unwrap_or(1).max(1)
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = err.exit_code().clamp(0, 255) as u8;
            return ExitCode::from(code);
        }
    };

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        return ExitCode::from(exit_status(e.as_ref()));
    }

    ExitCode::SUCCESS
}
