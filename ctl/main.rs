#![forbid(unsafe_code)]

//! `reminder-ctl`: operator CLI for a running `reminder-scheduler`.
//!
//! Talks to the server's HTTP surface: probes health, triggers a worker
//! cycle or a reconciliation sweep, and lists an owner's tasks.

use clap::{Parser, Subcommand};

const OWNER_HEADER: &str = "x-owner-id";

#[derive(Debug, Parser)]
#[command(
    name = "reminder-ctl",
    about = "Operator CLI for reminder-scheduler",
    version,
    long_about = None
)]
struct Cli {
    /// Base URL of the server's HTTP surface.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the server is up.
    Health,

    /// Run one notification worker cycle now and print its report.
    RunWorker,

    /// Re-enqueue due reminders that have no queued job.
    Reconcile,

    /// List an owner's tasks with their reminders.
    List {
        /// Owner id to list for.
        #[arg(long)]
        owner: String,
    },
}

type CtlResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn main() {
    let args = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(execute(&args)) {
        Ok(output) => println!("{output}"),
        Err(err) => {
            eprintln!("Error: {err}");
            eprintln!("Is reminder-scheduler listening on {}?", args.url);
            std::process::exit(1);
        }
    }
}

async fn execute(args: &Cli) -> CtlResult<String> {
    let base = args.url.trim_end_matches('/');
    let client = reqwest::Client::new();

    let request = match &args.command {
        Command::Health => client.get(format!("{base}/health")),
        Command::RunWorker => client.post(format!("{base}/worker/run")),
        Command::Reconcile => client.post(format!("{base}/worker/reconcile")),
        Command::List { owner } => client
            .get(format!("{base}/tasks"))
            .header(OWNER_HEADER, owner),
    };

    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(str::to_owned))
            .unwrap_or(body);
        return Err(format!("{status}: {message}").into());
    }

    Ok(match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => serde_json::to_string_pretty(&value)?,
        Err(_) => body,
    })
}
