use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "sqlary", about = "Sqlary — salary records API", version)]
struct Cli {
    /// Sqlary server URL (default: http://localhost:8080 or $SQLARY_SERVER)
    #[arg(long, env = "SQLARY_SERVER", default_value = "http://localhost:8080")]
    server: String,

    /// Bearer API key for server auth ($SQLARY_TOKEN)
    #[arg(long, env = "SQLARY_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Sqlary HTTP server
    Serve {
        /// Port to listen on (default: $SQLARY_PORT or 8080)
        #[arg(long, env = "SQLARY_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $SQLARY_HOST or 0.0.0.0)
        #[arg(long, env = "SQLARY_HOST", default_value = "0.0.0.0")]
        host: String,
    },
    /// Exchange username/password for an API key
    Login {
        username: String,
        password: String,
    },
    /// Add a salary record
    Add {
        name: String,
        salary: f64,
        currency: String,
        department: String,
        sub_department: String,
        /// Mark the employee as on contract
        #[arg(long)]
        on_contract: bool,
    },
    /// List all salary records
    List,
    /// Delete a salary record by id
    Delete {
        id: i64,
    },
    /// Show salary statistics, optionally filtered and grouped
    Stats {
        /// Only consider records in this currency
        #[arg(long)]
        currency: Option<String>,
        /// Only consider records with this contract status
        #[arg(long)]
        on_contract: Option<bool>,
        /// Group statistics by department
        #[arg(long)]
        by_department: bool,
        /// Group statistics by department and sub-department
        #[arg(long)]
        by_sub_department: bool,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SQLARY_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Serve { port, host } => {
            let cfg = sqlary_server::ServerConfig {
                host,
                port,
                ..Default::default()
            };
            sqlary_server::run(cfg).await
        }

        Commands::Login { username, password } => {
            cmd_login(&cli.server, &username, &password).await
        }

        Commands::Add {
            name,
            salary,
            currency,
            department,
            sub_department,
            on_contract,
        } => {
            let token = require_token(&cli.token)?;
            let body = serde_json::json!({
                "name": name,
                "salary": salary,
                "currency": currency,
                "on_contract": on_contract,
                "department": department,
                "sub_department": sub_department,
            });
            cmd_add(&cli.server, &token, &body).await
        }

        Commands::List => {
            let token = require_token(&cli.token)?;
            cmd_list(&cli.server, &token).await
        }

        Commands::Delete { id } => {
            let token = require_token(&cli.token)?;
            cmd_delete(&cli.server, &token, id).await
        }

        Commands::Stats {
            currency,
            on_contract,
            by_department,
            by_sub_department,
        } => {
            let token = require_token(&cli.token)?;
            cmd_stats(
                &cli.server,
                &token,
                currency.as_deref(),
                on_contract,
                by_department,
                by_sub_department,
            )
            .await
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_login(server: &str, username: &str, password: &str) -> Result<()> {
    let client = Client::new();
    let resp = client
        .post(format!("{}/api-key", server.trim_end_matches('/')))
        .json(&serde_json::json!({"username": username, "password": password}))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;

    if status.is_success() {
        let api_key = json["apiKey"].as_str().unwrap_or("");
        println!("{api_key}");
    } else {
        let error = json["error"].as_str().unwrap_or("unknown error");
        anyhow::bail!("{error}");
    }
    Ok(())
}

async fn cmd_add(server: &str, token: &str, body: &Value) -> Result<()> {
    let client = Client::new();
    let resp = client
        .put(format!("{}/salary", server.trim_end_matches('/')))
        .bearer_auth(token)
        .json(body)
        .send()
        .await
        .context("HTTP request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("server returned {status}: {text}");
    }

    let record: SalaryItem = resp.json().await.context("parse response")?;
    println!("✓ added record {}", record.id);
    Ok(())
}

async fn cmd_list(server: &str, token: &str) -> Result<()> {
    let client = Client::new();
    let resp = client
        .get(format!("{}/salary", server.trim_end_matches('/')))
        .bearer_auth(token)
        .send()
        .await
        .context("HTTP request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        anyhow::bail!("server returned {status}");
    }

    let records: Vec<SalaryItem> = resp.json().await.context("parse salary list")?;
    if records.is_empty() {
        println!("(no salary records)");
        return Ok(());
    }
    for r in &records {
        let contract = if r.on_contract { " — contract" } else { "" };
        println!(
            "  #{} {} — {} {} — {}/{}{}",
            r.id, r.name, r.salary, r.currency, r.department, r.sub_department, contract
        );
    }
    Ok(())
}

async fn cmd_delete(server: &str, token: &str, id: i64) -> Result<()> {
    let client = Client::new();
    let resp = client
        .delete(format!("{}/salary/{}", server.trim_end_matches('/'), id))
        .bearer_auth(token)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    if status.is_success() {
        println!("✓ deleted record {id}");
    } else if status == reqwest::StatusCode::GONE {
        println!("record {id} was already gone");
    } else {
        anyhow::bail!("server returned {status}");
    }
    Ok(())
}

async fn cmd_stats(
    server: &str,
    token: &str,
    currency: Option<&str>,
    on_contract: Option<bool>,
    by_department: bool,
    by_sub_department: bool,
) -> Result<()> {
    let path = if by_sub_department {
        "/salary/stats/department/sub-department"
    } else if by_department {
        "/salary/stats/department"
    } else {
        "/salary/stats"
    };

    let mut query: Vec<(&str, String)> = Vec::new();
    if let Some(currency) = currency {
        query.push(("currency", currency.to_owned()));
    }
    if let Some(on_contract) = on_contract {
        query.push(("on_contract", on_contract.to_string()));
    }

    let client = Client::new();
    let resp = client
        .get(format!("{}{}", server.trim_end_matches('/'), path))
        .query(&query)
        .bearer_auth(token)
        .send()
        .await
        .context("HTTP request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        anyhow::bail!("server returned {status}");
    }

    let json: Value = resp.json().await.context("parse statistics")?;
    match json {
        Value::Array(rows) => {
            if rows.is_empty() {
                println!("(no matching records)");
            }
            for row in rows {
                let group = match row["sub_department"].as_str() {
                    Some(sub) => format!("{}/{}", row["department"].as_str().unwrap_or(""), sub),
                    None => row["department"].as_str().unwrap_or("").to_owned(),
                };
                println!(
                    "  {group}: avg {} — max {} — min {}",
                    fmt_stat(&row["avg"]),
                    fmt_stat(&row["max"]),
                    fmt_stat(&row["min"])
                );
            }
        }
        stats => {
            println!(
                "avg {} — max {} — min {}",
                fmt_stat(&stats["avg"]),
                fmt_stat(&stats["max"]),
                fmt_stat(&stats["min"])
            );
        }
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn require_token(token: &Option<String>) -> Result<String> {
    token
        .clone()
        .context("--token / SQLARY_TOKEN is required for this command")
}

fn fmt_stat(value: &Value) -> String {
    match value.as_f64() {
        Some(n) => n.to_string(),
        None => "n/a".to_owned(),
    }
}

#[derive(serde::Deserialize)]
struct SalaryItem {
    id: i64,
    name: String,
    salary: f64,
    currency: String,
    on_contract: bool,
    department: String,
    sub_department: String,
}
