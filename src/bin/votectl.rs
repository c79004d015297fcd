//! VoteCtl - Command line remote control for a LiveVote server
//!
//! Usage:
//!   votectl login               - Get an admin session token
//!   votectl status              - Show round state
//!   votectl scores              - Show running tallies
//!   votectl open <id> [-d SECS] - Open a round for a contestant
//!   votectl close [--ended]     - Close the open round
//!   votectl reset [--landing]   - Zero all tallies (DESTRUCTIVE)
//!   votectl landing             - Show the welcome screen
//!   votectl export              - Download results as CSV or JSON

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;

const TOKEN_ENV: &str = "LIVEVOTE_TOKEN";

/// LiveVote Control Tool
#[derive(Parser)]
#[command(name = "votectl")]
#[command(about = "Control a running LiveVote server", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "livevote.toml")]
    config: PathBuf,

    /// API endpoint to connect to (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Admin session token (defaults to $LIVEVOTE_TOKEN)
    #[arg(short, long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with the admin password and print a session token
    Login {
        /// Admin password (prompted for when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Show round state
    Status,
    /// Show running tallies
    Scores,
    /// Open a voting round
    Open {
        /// Contestant id
        contestant_id: i64,
        /// Round length in seconds (server default when omitted)
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Close the open round
    Close {
        /// Close as ENDED instead of STOPPED
        #[arg(long)]
        ended: bool,
    },
    /// Zero all tallies and clear the vote log (DESTRUCTIVE)
    Reset {
        /// Return to the landing screen afterwards
        #[arg(long)]
        landing: bool,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Show the landing screen
    Landing,
    /// Download results
    Export {
        /// csv or json
        #[arg(short, long, default_value = "csv")]
        format: String,
        /// Output file (defaults to the server-suggested name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ============ API Response Types ============

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct Contestant {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RoundState {
    #[serde(default)]
    mode: String,
    #[serde(default)]
    active_contestant: Option<Contestant>,
    #[serde(default)]
    deadline: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScoreEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    yes_count: u64,
    #[serde(default)]
    no_count: u64,
}

#[derive(Debug, Deserialize)]
struct ScoresResponse {
    #[serde(default)]
    scores: BTreeMap<i64, ScoreEntry>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    connections: usize,
}

#[derive(Debug, Deserialize)]
struct TransitionResponse {
    #[serde(default)]
    changed: bool,
    state: RoundState,
}

#[derive(Debug, Deserialize)]
struct ResetResponse {
    #[serde(default)]
    cleared_votes: u64,
    state: RoundState,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    code: String,
}

// ============ Config ============

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    server: ServerConfig,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_bind")]
    bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind() }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let endpoint = cli.endpoint.clone().unwrap_or_else(|| endpoint_from_config(&cli.config));
    let token = cli.token.clone().or_else(|| std::env::var(TOKEN_ENV).ok());
    let ctl = Ctl {
        client: reqwest::Client::new(),
        endpoint,
        token,
    };

    let result = match &cli.command {
        Commands::Login { password } => login(&ctl, password.clone()).await,
        Commands::Status => show_status(&ctl).await,
        Commands::Scores => show_scores(&ctl).await,
        Commands::Open { contestant_id, duration } => open_round(&ctl, *contestant_id, *duration).await,
        Commands::Close { ended } => close_round(&ctl, *ended).await,
        Commands::Reset { landing, force } => reset(&ctl, *landing, *force).await,
        Commands::Landing => show_landing(&ctl).await,
        Commands::Export { format, output } => export(&ctl, format, output.clone()).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Derive the API endpoint from the server's bind address
fn endpoint_from_config(path: &Path) -> String {
    let bind = std::fs::read_to_string(path)
        .ok()
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.server.bind_address)
        .unwrap_or_else(default_bind);

    // A wildcard bind is reachable on loopback
    if let Some(port) = bind.strip_prefix("0.0.0.0:") {
        format!("http://127.0.0.1:{}", port)
    } else {
        format!("http://{}", bind)
    }
}

struct Ctl {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl Ctl {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), path)
    }

    fn token(&self) -> Result<&str> {
        match self.token.as_deref() {
            Some(token) => Ok(token),
            None => bail!("no session token; run `votectl login` and set {}", TOKEN_ENV),
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("cannot reach {}", self.endpoint))?;
        check(response).await
    }

    async fn admin_post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(self.token()?)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("cannot reach {}", self.endpoint))?;
        check(response).await
    }
}

/// Turn a non-2xx response into an error carrying the server's message
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match response.json::<ErrorResponse>().await {
        Ok(err) if !err.code.is_empty() => bail!("{} ({}, HTTP {})", err.error, err.code, status),
        Ok(err) => bail!("{} (HTTP {})", err.error, status),
        Err(_) => bail!("API error: {}", status),
    }
}

fn print_state(state: &RoundState) {
    println!("Mode:        {}", state.mode);
    match &state.active_contestant {
        Some(c) => println!("Contestant:  #{} {}", c.id, c.name),
        None => println!("Contestant:  -"),
    }
    if let Some(deadline) = &state.deadline {
        println!("Deadline:    {}", deadline);
    }
}

// ============ Commands ============

async fn login(ctl: &Ctl, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => {
            print!("Admin password: ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            line.trim_end().to_string()
        }
    };

    let response = ctl
        .client
        .post(ctl.url("/login"))
        .json(&json!({ "password": password }))
        .send()
        .await
        .with_context(|| format!("cannot reach {}", ctl.endpoint))?;
    let login: LoginResponse = check(response).await?.json().await?;

    println!("Logged in (session valid for {}s)", login.expires_in);
    println!("export {}={}", TOKEN_ENV, login.token);
    Ok(())
}

async fn show_status(ctl: &Ctl) -> Result<()> {
    let state: RoundState = ctl.get("/state").await?.json().await?;
    let health: HealthResponse = ctl.get("/health").await?.json().await?;

    println!();
    println!("LiveVote Status (votectl v{})", env!("CARGO_PKG_VERSION"));
    println!("=================================");
    print_state(&state);
    println!("Connections: {}", health.connections);
    println!();
    Ok(())
}

async fn show_scores(ctl: &Ctl) -> Result<()> {
    let board: ScoresResponse = ctl.get("/scores").await?.json().await?;

    println!();
    println!("{:<5} {:<30} {:>6} {:>6}", "ID", "CONTESTANT", "YES", "NO");
    println!("{}", "-".repeat(50));
    for (id, entry) in &board.scores {
        println!("{:<5} {:<30} {:>6} {:>6}", id, entry.name, entry.yes_count, entry.no_count);
    }
    println!();
    Ok(())
}

async fn open_round(ctl: &Ctl, contestant_id: i64, duration: Option<u64>) -> Result<()> {
    let body = json!({ "contestant_id": contestant_id, "duration_seconds": duration });
    let result: TransitionResponse = ctl.admin_post("/admin/round/open", body).await?.json().await?;

    println!("Voting opened");
    print_state(&result.state);
    Ok(())
}

async fn close_round(ctl: &Ctl, ended: bool) -> Result<()> {
    let mode = if ended { "ENDED" } else { "STOPPED" };
    let result: TransitionResponse = ctl
        .admin_post("/admin/round/close", json!({ "mode": mode }))
        .await?
        .json()
        .await?;

    if result.changed {
        println!("Voting closed");
    } else {
        println!("No round was open");
    }
    print_state(&result.state);
    Ok(())
}

async fn reset(ctl: &Ctl, landing: bool, force: bool) -> Result<()> {
    if !force {
        print!("This zeroes every tally and deletes the vote log. Type 'yes' to continue: ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        if line.trim() != "yes" {
            println!("Aborted");
            return Ok(());
        }
    }

    let result: ResetResponse = ctl
        .admin_post("/admin/reset", json!({ "landing": landing }))
        .await?
        .json()
        .await?;

    println!("Votes reset, {} log entries cleared", result.cleared_votes);
    print_state(&result.state);
    Ok(())
}

async fn show_landing(ctl: &Ctl) -> Result<()> {
    let result: TransitionResponse = ctl.admin_post("/admin/landing", json!({})).await?.json().await?;
    print_state(&result.state);
    Ok(())
}

async fn export(ctl: &Ctl, format: &str, output: Option<PathBuf>) -> Result<()> {
    let response = ctl
        .client
        .get(ctl.url("/admin/export"))
        .query(&[("format", format)])
        .bearer_auth(ctl.token()?)
        .send()
        .await
        .with_context(|| format!("cannot reach {}", ctl.endpoint))?;
    let response = check(response).await?;

    let suggested = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split("filename=").nth(1))
        .map(|name| name.trim_matches('"').to_string());

    let body = response.bytes().await?;
    let path = output
        .or_else(|| suggested.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(format!("voting_results.{}", format)));

    std::fs::write(&path, &body).with_context(|| format!("cannot write {}", path.display()))?;
    println!("Saved {} bytes to {}", body.len(), path.display());
    Ok(())
}
