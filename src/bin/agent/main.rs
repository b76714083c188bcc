mod hands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use surf_agent::chrome::ChromePage;
use surf_agent::{Agent, AgentConfig, ReasoningResult};

#[derive(Debug, Parser)]
#[command(name = "surf-agent", about = "Drive a browser tab towards a goal", version)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to <config dir>/surf-agent/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Launch Chrome headless when none is running
    #[arg(long, global = true)]
    headless: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plan and execute a goal on the current tab
    Run {
        goal: String,
        /// Navigate here first
        #[arg(long)]
        url: Option<String>,
        /// Neither recall nor store past attempts
        #[arg(long)]
        no_memory: bool,
        #[arg(long)]
        retries: Option<u32>,
        #[arg(long)]
        user_id: Option<String>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the interactive elements of the current tab
    Snapshot {
        #[arg(long)]
        url: Option<String>,
        #[arg(long, default_value_t = 100)]
        max: usize,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("surf_agent=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("surf_agent=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = AgentConfig::load(cli.config.as_deref())?;
    config.apply_env()?;
    if cli.headless {
        config.chrome.headless = true;
    }

    match cli.command {
        Command::Run {
            goal,
            url,
            no_memory,
            retries,
            user_id,
            json,
        } => {
            if no_memory {
                config.use_memory = false;
            }
            if let Some(retries) = retries {
                config.max_retries = retries;
            }
            if let Some(user_id) = user_id {
                config.user_id = user_id;
            }
            let (agent, _browser) = open(config, url.as_deref()).await?;
            let agent = Arc::new(agent);

            let stopper = agent.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, stopping the agent");
                    stopper.stop().await;
                }
            });

            let result = agent.run(&goal).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_summary(&result);
            }
            Ok(if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Snapshot { url, max } => {
            let (agent, _browser) = open(config, url.as_deref()).await?;
            let elements = agent.snapshot(max).await?;
            println!("{}", serde_json::to_string_pretty(&elements)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// The returned session keeps a launched Chrome alive; hold it while the
/// agent runs.
async fn open(config: AgentConfig, url: Option<&str>) -> Result<(Agent, hands::BrowserSession)> {
    let browser = hands::BrowserSession::connect(&config.chrome).await?;
    if let Some(url) = url {
        browser.navigate(url).await?;
    }
    let page = Arc::new(ChromePage::new(browser.tab.clone()));
    Ok((Agent::with_http_clients(config, page)?, browser))
}

fn print_summary(result: &ReasoningResult) {
    let status = if result.success { "succeeded" } else { "failed" };
    println!("{} (attempt {}): {}", result.goal, result.attempt, status);
    if let Some(analysis) = &result.analysis {
        println!("analysis: {analysis}");
    }
    if let Some(plan) = &result.plan {
        println!("plan: {} steps, confidence {:.2}", plan.steps.len(), plan.confidence);
    }
    if let Some(execution) = &result.execution {
        println!(
            "executed: {}/{} steps",
            execution.completed_steps, execution.total_steps
        );
        if let Some(state) = &execution.final_state {
            println!("final state: {state}");
        }
    }
    if let Some(error) = &result.error {
        println!("error: {error}");
    }
}
