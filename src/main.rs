use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docpilot::cli::commands::config::ConfigFormat;
use docpilot::cli::commands::docs::DocsOptions;
use docpilot::cli::{OutputFormat, RepoOptions};
use docpilot::{ConfigLoader, DocpilotError};

#[derive(Parser)]
#[command(name = "docpilot")]
#[command(
    version,
    about = "Scan a repository, analyze it and generate checked documentation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project config file (default: .docpilot/config.toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(clap::Args)]
struct RepoArgs {
    /// Repository root
    #[arg(default_value = ".")]
    repo: PathBuf,

    /// Output directory for documents, metrics and checkpoints
    #[arg(long, short)]
    output_dir: Option<PathBuf>,

    /// Extra directory names to exclude, comma-separated
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

impl RepoArgs {
    fn options(&self) -> RepoOptions {
        RepoOptions {
            repo: self.repo.clone(),
            output_dir: self.output_dir.clone(),
            exclude: self.exclude.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the repository and list its files
    Scan {
        #[command(flatten)]
        args: RepoArgs,
    },

    /// Scan, then infer languages, frameworks, entry points and components
    Analyze {
        #[command(flatten)]
        args: RepoArgs,
    },

    /// Run the full workflow and write the documents
    Docs {
        #[command(flatten)]
        args: RepoArgs,
        #[arg(long, help = "Generate README.md")]
        readme: bool,
        #[arg(long, help = "Generate API.md")]
        api: bool,
        #[arg(long, help = "Generate one document per component")]
        components: bool,
        #[arg(long, help = "Model override")]
        model: Option<String>,
        #[arg(long, help = "Sampling temperature override (0.0-2.0)")]
        temperature: Option<f32>,
        #[arg(long, help = "Reuse the scan and analysis of a previous run")]
        resume: bool,
    },

    /// Show the metrics of the last run
    Metrics {
        #[command(flatten)]
        args: RepoArgs,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration (merged from all sources)
    Show {
        #[arg(short = 'f', long, value_enum, default_value_t = ConfigFormat::Toml)]
        format: ConfigFormat,
    },
    /// Show configuration file paths
    Path,
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mdocpilot encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            let code = e
                .downcast_ref::<DocpilotError>()
                .map_or(1, DocpilotError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run_cli() -> anyhow::Result<u8> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ConfigLoader::load_with_file(cli.config.as_deref())?;

    // config commands need no runtime
    if let Commands::Config { action } = &cli.command {
        let code = match action {
            ConfigAction::Show { format } => docpilot::cli::commands::config::show(&config, *format)?,
            ConfigAction::Path => docpilot::cli::commands::config::path()?,
        };
        return Ok(code);
    }

    let rt = Runtime::new()?;
    let cancel = CancellationToken::new();

    let code = rt.block_on(async {
        let signal_token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, stopping after the current step...");
                signal_token.cancel();
            }
        });

        match cli.command {
            Commands::Scan { args } => {
                docpilot::cli::commands::scan::run(&args.options(), args.format, config, cancel).await
            }
            Commands::Analyze { args } => {
                docpilot::cli::commands::analyze::run(&args.options(), args.format, config, cancel).await
            }
            Commands::Docs {
                args,
                readme,
                api,
                components,
                model,
                temperature,
                resume,
            } => {
                let options = DocsOptions {
                    repo: args.options(),
                    readme,
                    api,
                    components,
                    model,
                    temperature,
                    resume,
                };
                docpilot::cli::commands::docs::run(&options, args.format, config, cancel).await
            }
            Commands::Metrics { args } => {
                docpilot::cli::commands::metrics::run(&args.options(), args.format, &config)
            }
            Commands::Config { .. } => Ok(0),
        }
    })?;

    Ok(code)
}
