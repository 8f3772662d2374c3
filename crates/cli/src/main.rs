//! Optimize CLI
//!
//! A command-line tool for generating applications and experiments from
//! manifests, exporting trial patches and inspecting experiments.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{export, generate, get, label};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Optimize CLI
#[derive(Parser)]
#[command(name = "optimize")]
#[command(author, version, about = "Generate, export and inspect optimization experiments", long_about = None)]
pub struct Cli {
    /// Optimization service URL (can also be set via OPTIMIZE_API_URL env var)
    #[arg(long, env = "OPTIMIZE_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate applications and experiments
    #[command(subcommand)]
    Generate(GenerateCommands),

    /// Export the patches of a completed trial
    Export {
        /// Trial name (<experiment>-<number>)
        trial_name: String,

        /// Manifests holding the experiment or its application ("-" for stdin)
        #[arg(long = "filename", short = 'f', required = true)]
        files: Vec<String>,

        /// Only print the rendered patch bodies
        #[arg(long)]
        patch: bool,
    },

    /// Label experiments or trials (TYPE NAME... or TYPE/NAME, then KEY=VALUE or KEY-)
    Label {
        #[arg(required = true, num_args = 1..)]
        args: Vec<String>,
    },

    /// Show cluster resources
    #[command(subcommand)]
    Get(GetCommands),

    /// Inspect the CLI configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum GenerateCommands {
    /// Scan manifests into an application
    Application {
        /// Application name (defaults to the scanned name)
        #[arg(long)]
        name: Option<String>,

        /// Manifest files or directories ("-" or none for stdin)
        #[arg(long = "resources", short = 'r')]
        resources: Vec<String>,

        /// Objective names to add
        #[arg(long, value_delimiter = ',')]
        objectives: Vec<String>,
    },

    /// Generate an experiment from an application
    Experiment {
        /// Manifests holding the application ("-" for stdin)
        #[arg(long = "filename", short = 'f', required = true)]
        files: Vec<String>,

        /// Application name, when the input holds more than one
        #[arg(long)]
        application: Option<String>,

        /// Scenario name
        #[arg(long)]
        scenario: Option<String>,

        /// Objective name
        #[arg(long)]
        objective: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum GetCommands {
    /// Get experiments and their phase
    Experiments {
        /// Namespace to list (defaults to the kubeconfig namespace)
        #[arg(long, short)]
        namespace: Option<String>,

        /// List experiments in all namespaces
        #[arg(long, short = 'A')]
        all_namespaces: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    View,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();
}

fn api_client(cli: &Cli) -> Result<client::ApiClient> {
    let config = config::Config::load()?.with_api_url(cli.api_url.clone());
    client::ApiClient::new(config.api_url(), config.token.clone())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(&cli).await {
        output::print_error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Generate(generate_cmd) => match generate_cmd {
            GenerateCommands::Application {
                name,
                resources,
                objectives,
            } => {
                generate::generate_application(
                    name.clone(),
                    resources.clone(),
                    objectives.clone(),
                    std::io::stdin().lock(),
                    std::io::stdout().lock(),
                )?;
            }
            GenerateCommands::Experiment {
                files,
                application,
                scenario,
                objective,
            } => {
                let options = generate::ExperimentOptions {
                    files: files.clone(),
                    application: application.clone(),
                    scenario: scenario.clone(),
                    objective: objective.clone(),
                };
                generate::generate_experiment(&options, std::io::stdout().lock())?;
            }
        },
        Commands::Export {
            trial_name,
            files,
            patch,
        } => {
            let client = api_client(cli)?;
            export::export_trial(&client, trial_name, files, *patch, std::io::stdout().lock())
                .await?;
        }
        Commands::Label { args } => {
            let (targets, labels) = label::parse_args(args)?;
            let client = api_client(cli)?;
            let changes = output::format_labels(&labels);
            for labeled in label::label(&client, &targets, labels).await? {
                output::print_success(&format!("{labeled} labeled ({changes})"));
            }
        }
        Commands::Get(get_cmd) => match get_cmd {
            GetCommands::Experiments {
                namespace,
                all_namespaces,
            } => {
                let namespace = match namespace {
                    Some(ns) => Some(ns.clone()),
                    None => config::Config::load()
                        .map(|c| c.default_namespace)
                        .unwrap_or_else(|err| {
                            output::print_warning(&format!("Ignoring configuration: {err:#}"));
                            None
                        }),
                };
                let client = config::kube_client(cli.kubeconfig.as_deref()).await?;
                get::get_experiments(client, namespace, *all_namespaces, cli.format).await?;
            }
        },
        Commands::Config(ConfigCommands::View) => {
            let config = config::Config::load()?.with_api_url(cli.api_url.clone());
            commands::config::view(&config, cli.format, std::io::stdout().lock())?;
        }
    }

    Ok(())
}
