// campuspay command line entry point.
// Invokes service operations and cached resource refreshes from the terminal.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use campuspay::api::Service;
use campuspay::{App, Config, Result};

#[derive(Parser, Debug)]
#[command(name = "campuspay")]
#[command(about = "Campus payment API client and resource cache")]
#[command(version)]
struct Args {
    /// Path to config file (default: $XDG_CONFIG_HOME/campuspay/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Invoke an operation, e.g. `call github getUser#octocat`
    Call {
        service: String,
        token: String,
        /// Extra arguments; parsed as JSON when possible
        args: Vec<String>,
    },
    /// List registered operations
    Operations { service: Option<String> },
    /// Print repository links
    Links,
    /// Refresh cached resources and print their state
    Refresh {
        #[arg(required = true)]
        resources: Vec<String>,
    },
    /// Check whether a newer release than VERSION is published
    UpdateCheck { version: String },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let app = App::new(&config)?;

    match args.command {
        Command::Call {
            service,
            token,
            args,
        } => {
            let args = args.iter().map(String::as_str).map(parse_arg).collect();
            let payload = app.call(&service, &token, args).await?;
            print_json(&payload)?;
        }
        Command::Operations { service } => {
            let services: Vec<String> = match service {
                Some(service) => vec![service],
                None => app.services().services().map(str::to_string).collect(),
            };
            for service in services {
                for name in app.services().table(&service)?.names() {
                    println!("{service} {name}");
                }
            }
        }
        Command::Links => {
            println!("repository: {}", app.github.repo_url());
            println!("issues:     {}", app.github.issue_url());
            println!("api:        {}", app.payutc.base().base_url());
        }
        Command::Refresh { resources } => {
            let names: Vec<&str> = resources.iter().map(String::as_str).collect();
            for (name, result) in app.fetcher().refresh_many(&names).await {
                if let Err(e) = result {
                    error!(resource = %name, error = %e, "refresh failed");
                }
                let record = app.cache().snapshot(&name);
                println!("{name}: {}", record.status.display());
                if let Some(data) = &record.data {
                    print_json(data)?;
                }
            }
        }
        Command::UpdateCheck { version } => match app.check_for_update(&version).await? {
            Some(release) => {
                info!(tag = %release.tag_name, "update available");
                println!("{} -> {}", version, release.tag_name);
                println!("{}", app.github.version_url(&release.tag_name));
            }
            None => println!("{version} is up to date"),
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
