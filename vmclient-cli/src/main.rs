//! CLI for VictoriaMetrics.
//!
//! Checks health, runs instant and range queries, and pushes single samples.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use vmclient::{Client, Config, Context, DEFAULT_ENDPOINT, TracingObserver};

/// Query and push to a VictoriaMetrics server.
#[derive(Parser)]
#[command(name = "vmclient", version, about)]
struct Cli {
    /// Base URL of the server.
    #[arg(long, global = true, default_value = DEFAULT_ENDPOINT)]
    address: String,

    /// Header sent with every request, as NAME=VALUE. Repeatable.
    #[arg(long = "header", value_name = "NAME=VALUE", global = true)]
    headers: Vec<String>,

    /// Labels added to pushed samples (e.g., 'job="cli",env="dev"').
    #[arg(long, global = true, default_value = "")]
    extra_labels: String,

    /// Skip TLS certificate verification.
    #[arg(long, global = true)]
    insecure: bool,

    /// Deadline for the whole command (e.g., "10s", "1m").
    #[arg(long, global = true, default_value = "30s")]
    timeout: String,

    /// Output format.
    #[arg(long, global = true, default_value = "csv")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Check that the server accepts connections.
    Health,

    /// Evaluate a query at the current time.
    Instant {
        /// MetricsQL expression.
        query: String,

        /// Lookback step (e.g., "5m").
        #[arg(long, default_value = "5m")]
        step: String,
    },

    /// Evaluate a query over a window ending now.
    Range {
        /// MetricsQL expression.
        query: String,

        /// Window to query (e.g., "1h", "30m", "7d").
        #[arg(long, default_value = "1h")]
        range: String,

        /// Resolution of the returned series.
        #[arg(long, default_value = "5m")]
        step: String,
    },

    /// Push a single sample.
    Push {
        #[command(subcommand)]
        kind: PushKind,
    },
}

/// Kind of sample to push.
#[derive(Subcommand)]
enum PushKind {
    /// Push a gauge value.
    Gauge {
        /// Metric name, optionally with labels: 'temp{room="a"}'.
        name: String,

        /// Value to set.
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },

    /// Push a counter value.
    Counter {
        /// Metric name, optionally with labels: 'jobs_total{queue="a"}'.
        name: String,

        /// Value to add.
        value: u64,
    },
}

/// Output format for command results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON document.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::with_timeout(parse_duration(&cli.timeout)?);
    let client = connect(&ctx, &cli)?;

    let result = match cli.command {
        Commands::Health => cmd_health(&ctx, &client, &cli.format),
        Commands::Instant { query, step } => {
            cmd_instant(&ctx, &client, &query, &step, &cli.format)
        }
        Commands::Range { query, range, step } => {
            cmd_range(&ctx, &client, &query, &range, &step, &cli.format)
        }
        Commands::Push { kind } => cmd_push(&ctx, &client, &kind, &cli.format),
    };
    client.close();
    result
}

/// Builds the config from global flags and connects.
fn connect(ctx: &Context, cli: &Cli) -> Result<Client, Box<dyn std::error::Error>> {
    let mut config = Config::new(cli.address.clone())
        .with_extra_labels(cli.extra_labels.clone())
        .with_insecure(cli.insecure);
    for header in &cli.headers {
        let (name, value) = header
            .split_once('=')
            .ok_or_else(|| format!("Invalid header '{header}'. Use NAME=VALUE."))?;
        config = config.with_header(name.trim(), value.trim());
    }

    let client = Client::builder(config)
        .observer(Arc::new(TracingObserver))
        .connect(ctx)?;
    Ok(client)
}

/// Implements `vmclient health`.
fn cmd_health(
    ctx: &Context,
    client: &Client,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    client.health(ctx)?;
    match format {
        OutputFormat::Csv => {
            println!("endpoint,status");
            println!("{},ok", client.endpoint());
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "endpoint": client.endpoint().as_str(),
                "status": "ok",
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Implements `vmclient instant <query>`.
fn cmd_instant(
    ctx: &Context,
    client: &Client,
    query: &str,
    step: &str,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let step = parse_duration(step)?;
    let instants = client.instant_query(ctx, query, chrono::Utc::now(), step)?;

    match format {
        OutputFormat::Csv => {
            println!("# query={query}, series={}", instants.len());
            println!("series,timestamp_ms,value");
            for instant in &instants {
                println!(
                    "{},{},{}",
                    csv_field(&instant.to_string()),
                    instant.timestamp().timestamp_millis(),
                    instant.value()
                );
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "query": query,
                "count": instants.len(),
                "data": instants,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Implements `vmclient range <query>`.
fn cmd_range(
    ctx: &Context,
    client: &Client,
    query: &str,
    range: &str,
    step: &str,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let step = parse_duration(step)?;
    let end = chrono::Utc::now();
    let start = window_start(end, parse_duration(range)?)?;
    let ranges = client.range_query(ctx, query, start, end, step)?;

    match format {
        OutputFormat::Csv => {
            let points: usize = ranges.iter().map(|r| r.values.len()).sum();
            println!(
                "# query={query}, series={}, points={points}",
                ranges.len()
            );
            println!("series,timestamp_ms,value");
            for series in &ranges {
                let name = csv_field(&series.to_string());
                for sample in &series.values {
                    println!(
                        "{name},{},{}",
                        sample.timestamp.timestamp_millis(),
                        sample.value
                    );
                }
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "query": query,
                "start": start.to_rfc3339(),
                "end": end.to_rfc3339(),
                "count": ranges.len(),
                "data": ranges,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Implements `vmclient push gauge|counter <name> <value>`.
fn cmd_push(
    ctx: &Context,
    client: &Client,
    kind: &PushKind,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let (name, value) = match kind {
        PushKind::Gauge { name, value } => {
            client.push_gauge(ctx, name, *value)?;
            (name, serde_json::json!(value))
        }
        PushKind::Counter { name, value } => {
            client.push_counter(ctx, name, *value)?;
            (name, serde_json::json!(value))
        }
    };

    match format {
        OutputFormat::Csv => {
            println!("metric,value,status");
            println!("{},{value},pushed", csv_field(name));
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "metric": name,
                "value": value,
                "status": "pushed",
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Parses a human-readable duration string (e.g., "30s", "5m", "1h", "7d").
fn parse_duration(s: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let s = s.trim();
    let Some((unit_at, _)) = s.char_indices().last() else {
        return Err("Empty duration string".into());
    };
    let (num_str, unit) = s.split_at(unit_at);
    let num: u64 = num_str.parse()?;

    let secs = match unit {
        "s" => Some(num),
        "m" => num.checked_mul(60),
        "h" => num.checked_mul(3600),
        "d" => num.checked_mul(86400),
        _ => return Err(format!("Unknown duration unit: '{unit}'. Use s, m, h, or d.").into()),
    };

    secs.map(Duration::from_secs)
        .ok_or_else(|| format!("Duration '{s}' is too large").into())
}

/// Start of a window of length `range` ending at `end`.
fn window_start(
    end: chrono::DateTime<chrono::Utc>,
    range: Duration,
) -> Result<chrono::DateTime<chrono::Utc>, Box<dyn std::error::Error>> {
    chrono::Duration::from_std(range)
        .ok()
        .and_then(|window| end.checked_sub_signed(window))
        .ok_or_else(|| {
            format!("Range of {}s reaches past the earliest time", range.as_secs()).into()
        })
}

/// Quotes a field when it contains CSV metacharacters.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
