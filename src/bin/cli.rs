//! Fargift CLI
//!
//! Command-line client for a running Fargift indexer:
//! - Check indexer status and health
//! - List and inspect presents
//! - Trigger a reindex
//! - Search presents between two dates

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use fargift_indexer::store::PresentStatus;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fargift")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query and operate a Fargift present indexer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:3001", global = true)]
    pub api_url: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show indexer status
    Status,

    /// Show server health
    Health,

    /// List indexed presents
    List {
        #[arg(short, long, default_value = "1")]
        page: usize,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show one present
    Get {
        /// Present id (hex, up to 32 bytes)
        id: String,
    },

    /// Rescan from a block (default: the deployment block)
    Reindex {
        #[arg(long)]
        from_block: Option<u64>,
    },

    /// Search presents between two dates
    Search {
        /// Start: RFC 3339, Unix timestamp, "now", or a duration ago (e.g. 7d, 12h)
        #[arg(long)]
        from: String,
        /// End (default: now)
        #[arg(long, default_value = "now")]
        to: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let json_output = cli.format == "json";

    match cli.command {
        Commands::Status => {
            let data = fetch(client.get(format!("{}/api/v1/indexer/status", cli.api_url)), &cli.api_url).await?;
            if json_output {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!("Fargift indexer ({})", cli.api_url);
                println!();
                println!("Phase:                {}", data["phase"].as_str().unwrap_or("unknown"));
                println!("Indexing:             {}", data["isIndexing"].as_bool().unwrap_or(false));
                println!("Last processed block: {}", data["lastProcessedBlock"].as_u64().unwrap_or(0));
                println!("Presents:             {}", data["totalEntities"].as_u64().unwrap_or(0));
                println!("Events applied:       {}", data["totalEventsApplied"].as_u64().unwrap_or(0));
            }
        }

        Commands::Health => {
            let response = client.get(format!("{}/health", cli.api_url)).send().await;
            match response {
                Ok(resp) if resp.status().is_success() => {
                    let health: Value = resp.json().await?;
                    if json_output {
                        println!("{}", serde_json::to_string_pretty(&health)?);
                    } else {
                        println!("Status:  {}", health["status"].as_str().unwrap_or("unknown"));
                        println!("Indexer: {}", health["indexer"].as_str().unwrap_or("unknown"));
                        println!("Version: {}", health["version"].as_str().unwrap_or("-"));
                        if let Some(uptime) = health["uptimeSeconds"].as_u64() {
                            println!("Uptime:  {}", format_duration(uptime));
                        }
                    }
                }
                Ok(resp) => {
                    eprintln!("API returned error: {}", resp.status());
                    std::process::exit(1);
                }
                Err(e) => unreachable_server(&cli.api_url, &e),
            }
        }

        Commands::List { page, limit } => {
            let request = client
                .get(format!("{}/api/v1/presents", cli.api_url))
                .query(&[("page", page), ("limit", limit)]);
            let data = fetch(request, &cli.api_url).await?;

            if json_output {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                let presents = data["presents"].as_array().cloned().unwrap_or_default();
                if presents.is_empty() {
                    println!("No presents indexed yet.");
                } else {
                    print_presents(&presents);
                    println!();
                    println!(
                        "Page {} ({} of {} presents)",
                        page,
                        presents.len(),
                        data["total"].as_u64().unwrap_or(0)
                    );
                }
            }
        }

        Commands::Get { id } => {
            let data = fetch(client.get(format!("{}/api/v1/presents/{}", cli.api_url, id)), &cli.api_url).await?;
            if json_output {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                print_present_detail(&data);
            }
        }

        Commands::Reindex { from_block } => {
            let body = serde_json::json!({ "fromBlock": from_block });
            println!("Reindexing (this waits for the rescan to finish)...");
            let data = fetch(
                client
                    .post(format!("{}/api/v1/indexer/reindex", cli.api_url))
                    .json(&body),
                &cli.api_url,
            )
            .await?;

            if json_output {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!(
                    "Scanned blocks {} to {}: {} events, {} created, {} transitioned",
                    data["fromBlock"].as_u64().unwrap_or(0),
                    data["toBlock"].as_u64().unwrap_or(0),
                    data["events"].as_u64().unwrap_or(0),
                    data["created"].as_u64().unwrap_or(0),
                    data["transitioned"].as_u64().unwrap_or(0),
                );
                let failed = data["failedPages"].as_u64().unwrap_or(0);
                if failed > 0 {
                    println!("{} pages failed; the next poll will retry them", failed);
                }
                println!("Last processed block: {}", data["lastProcessedBlock"].as_u64().unwrap_or(0));
            }
        }

        Commands::Search { from, to } => {
            let now = Utc::now();
            let body = serde_json::json!({
                "fromDate": parse_time(&from, now)?.to_rfc3339(),
                "toDate": parse_time(&to, now)?.to_rfc3339(),
            });
            let data = fetch(
                client
                    .post(format!("{}/api/v1/presents/search-by-time", cli.api_url))
                    .json(&body),
                &cli.api_url,
            )
            .await?;

            if json_output {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!(
                    "Blocks {} to {}{}{}",
                    data["fromBlock"].as_u64().unwrap_or(0),
                    data["toBlock"].as_u64().unwrap_or(0),
                    if data["approximate"].as_bool().unwrap_or(false) { " (approximate)" } else { "" },
                    if data["cached"].as_bool().unwrap_or(false) { " [cached]" } else { "" },
                );
                let counts = &data["eventCounts"];
                println!(
                    "Events: {} wrap, {} unwrap, {} take back",
                    counts["wrap"].as_u64().unwrap_or(0),
                    counts["unwrap"].as_u64().unwrap_or(0),
                    counts["takeBack"].as_u64().unwrap_or(0),
                );
                println!();
                let presents = data["presents"].as_array().cloned().unwrap_or_default();
                if presents.is_empty() {
                    println!("No presents wrapped in this range.");
                } else {
                    print_presents(&presents);
                }
            }
        }

        Commands::Config { output } => {
            let config = fargift_indexer::config::generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// Send a request and unwrap the `{ success, data }` envelope
async fn fetch(request: reqwest::RequestBuilder, api_url: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => unreachable_server(api_url, &e),
    };

    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if !status.is_success() || body["success"] != Value::Bool(true) {
        let message = body["error"]["message"].as_str().unwrap_or("no error message");
        let code = body["error"]["code"].as_str().unwrap_or("UNKNOWN");
        eprintln!("Request failed ({} {}): {}", status, code, message);
        std::process::exit(1);
    }

    Ok(body["data"].clone())
}

fn unreachable_server(api_url: &str, error: &reqwest::Error) -> ! {
    eprintln!("Cannot connect to Fargift indexer at {}", api_url);
    eprintln!("Error: {}", error);
    eprintln!();
    eprintln!("Make sure the indexer is running:");
    eprintln!("  cargo run --bin fargift-indexer");
    std::process::exit(1);
}

/// Accepts RFC 3339, Unix seconds, "now", or a relative duration like 7d / 12h / 30m
fn parse_time(s: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("now") {
        return Ok(now);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(ts) = s.parse::<i64>() {
        return DateTime::from_timestamp(ts, 0).ok_or_else(|| format!("Timestamp out of range: {}", ts).into());
    }
    now.checked_sub_signed(parse_duration(s)?)
        .ok_or_else(|| format!("Time out of range: {} ago", s).into())
}

fn parse_duration(s: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let s = s.trim().to_lowercase();

    let duration = if let Some(days) = s.strip_suffix('d') {
        Duration::try_days(days.parse()?)
    } else if let Some(hours) = s.strip_suffix('h') {
        Duration::try_hours(hours.parse()?)
    } else if let Some(minutes) = s.strip_suffix('m') {
        Duration::try_minutes(minutes.parse()?)
    } else if let Some(weeks) = s.strip_suffix('w') {
        Duration::try_weeks(weeks.parse()?)
    } else {
        return Err(format!("Invalid time: {}. Use RFC 3339, a Unix timestamp, or 7d, 12h, 30m, 2w", s).into());
    };

    duration.ok_or_else(|| format!("Duration out of range: {}", s).into())
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

fn status_label(code: u64) -> String {
    u8::try_from(code)
        .ok()
        .and_then(PresentStatus::from_code)
        .map(|status| status.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn short_hex(s: &str) -> String {
    if s.len() > 14 {
        format!("{}…{}", &s[..8], &s[s.len() - 4..])
    } else {
        s.to_string()
    }
}

fn print_presents(presents: &[Value]) {
    println!("{:<14} {:<14} {:<11} {:<7} {}", "ID", "Sender", "Status", "Assets", "Created");
    println!("{}", "-".repeat(70));

    for present in presents {
        let created = present["createdAt"]
            .as_i64()
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<14} {:<14} {:<11} {:<7} {}",
            short_hex(present["id"].as_str().unwrap_or("-")),
            short_hex(present["sender"].as_str().unwrap_or("-")),
            status_label(present["status"].as_u64().unwrap_or(u64::MAX)),
            present["assets"].as_array().map(|a| a.len()).unwrap_or(0),
            created
        );
    }
}

fn print_present_detail(present: &Value) {
    println!("ID:       {}", present["id"].as_str().unwrap_or("-"));
    println!("Sender:   {}", present["sender"].as_str().unwrap_or("-"));
    println!("Status:   {}", status_label(present["status"].as_u64().unwrap_or(u64::MAX)));
    if !present["message"].as_str().unwrap_or("").is_empty() {
        println!("Message:  {}", present["message"].as_str().unwrap_or(""));
    }

    let recipients = present["recipients"].as_array().cloned().unwrap_or_default();
    if recipients.is_empty() {
        println!("Recipients: anyone (public)");
    } else {
        println!("Recipients:");
        for r in recipients {
            println!("  {}", r.as_str().unwrap_or("-"));
        }
    }

    let assets = present["assets"].as_array().cloned().unwrap_or_default();
    if !assets.is_empty() {
        println!("Assets:");
        for a in assets {
            println!(
                "  {} {} (type {})",
                a["amount"].as_str().unwrap_or("0"),
                a["token"].as_str().unwrap_or("-"),
                a["tokenType"].as_u64().unwrap_or(0)
            );
        }
    }

    if let Some(expiry) = present["expiryTime"].as_i64().and_then(|ts| DateTime::from_timestamp(ts, 0)) {
        println!("Expires:  {}", expiry.to_rfc3339());
    }
    if let Some(block) = present["blockNumber"].as_u64() {
        println!(
            "Last event: {} at block {}",
            present["eventType"].as_str().unwrap_or("-"),
            block
        );
    }
    if !present["enriched"].as_bool().unwrap_or(false) {
        println!("(contract snapshot not loaded yet)");
    }
}
