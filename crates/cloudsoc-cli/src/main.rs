mod cycle;
mod display;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use cloudsoc_core::{DEFAULT_FIRST_FETCH, LastRun, LogCategory, parse_categories};
use cloudsoc_store::StateStore;
use cloudsoc_sync::{
    CloudSocClient, CollectionOrchestrator, Credentials, CycleSettings, DEFAULT_MAX_FETCH,
    EventSink, HttpSink, JsonLinesSink,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cloudsoc", version, about = "Symantec Cloud SOC event collector")]
struct Cli {
    #[command(flatten)]
    conn: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Tenant base URL, e.g. https://app.elastica.net
    #[arg(long, env = "CLOUDSOC_URL", global = true)]
    url: Option<String>,

    #[arg(long, env = "CLOUDSOC_KEY_ID", global = true)]
    key_id: Option<String>,

    #[arg(long, env = "CLOUDSOC_KEY_SECRET", hide_env_values = true, global = true)]
    key_secret: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    insecure: bool,

    #[arg(long, env = "CLOUDSOC_PROXY", global = true)]
    proxy: Option<String>,

    #[arg(long, default_value_t = 30, global = true)]
    timeout_secs: u64,

    /// JSON file replacing the built-in category catalog
    #[arg(long, env = "CLOUDSOC_CATEGORIES", global = true)]
    categories: Option<PathBuf>,
}

#[derive(Args)]
struct CollectArgs {
    /// Per-category record budget for one cycle
    #[arg(long, env = "CLOUDSOC_MAX_FETCH", default_value_t = DEFAULT_MAX_FETCH)]
    max_fetch: usize,

    /// How far back to start for categories without state, e.g. "3 days"
    #[arg(long, env = "CLOUDSOC_FIRST_FETCH", default_value = DEFAULT_FIRST_FETCH)]
    first_fetch: String,

    /// Collector endpoint; events are written to stdout as JSON lines otherwise
    #[arg(long, env = "CLOUDSOC_SINK_URL")]
    sink_url: Option<String>,

    #[arg(long, default_value = "symantec")]
    vendor: String,

    #[arg(long, default_value = "cloud_soc")]
    product: String,
}

#[derive(Subcommand)]
enum Command {
    /// Check connectivity and credentials
    Test,
    /// Run one scheduled collection cycle and persist its state
    Fetch {
        #[command(flatten)]
        collect: CollectArgs,

        /// Last-run state file
        #[arg(long, env = "CLOUDSOC_STATE", default_value = "cloudsoc-state.json")]
        state: PathBuf,
    },
    /// Collect events and print them without saving state
    GetEvents {
        #[command(flatten)]
        collect: CollectArgs,

        /// Record budget per category (defaults to --max-fetch)
        #[arg(long)]
        limit: Option<usize>,

        /// Also deliver the events to the sink
        #[arg(long)]
        push: bool,

        /// Read (but never write) resumption state from this file
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!("cloudsoc v{}", env!("CARGO_PKG_VERSION"));

    let categories = load_categories(cli.conn.categories.as_deref())?;
    let client = build_client(&cli.conn)?;

    match cli.command {
        Command::Test => cmd_test(&client, &categories).await,
        Command::Fetch { collect, state } => {
            let sink = build_sink(&cli.conn, &collect)?;
            cmd_fetch(client, &categories, &collect, sink.as_ref(), state).await
        }
        Command::GetEvents {
            collect,
            limit,
            push,
            state,
        } => {
            let sink = build_sink(&cli.conn, &collect)?;
            let push_to = push.then_some(sink.as_ref());
            cmd_get_events(client, &categories, &collect, limit, push_to, state).await
        }
    }
}

// ── Setup ──

fn load_categories(path: Option<&std::path::Path>) -> anyhow::Result<Vec<LogCategory>> {
    let Some(path) = path else {
        return Ok(LogCategory::builtin());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading categories from {}", path.display()))?;
    parse_categories(&text).with_context(|| format!("invalid categories in {}", path.display()))
}

fn build_client(conn: &ConnectionArgs) -> anyhow::Result<CloudSocClient> {
    let url = conn
        .url
        .clone()
        .context("--url (or CLOUDSOC_URL) is required")?;
    let key_id = conn
        .key_id
        .clone()
        .context("--key-id (or CLOUDSOC_KEY_ID) is required")?;
    let key_secret = conn
        .key_secret
        .clone()
        .context("--key-secret (or CLOUDSOC_KEY_SECRET) is required")?;

    CloudSocClient::builder(url, Credentials { key_id, key_secret })
        .with_timeout(Duration::from_secs(conn.timeout_secs))
        .with_insecure(conn.insecure)
        .with_proxy(conn.proxy.clone())
        .build()
        .context("building HTTP client")
}

fn build_sink(conn: &ConnectionArgs, collect: &CollectArgs) -> anyhow::Result<Box<dyn EventSink>> {
    let Some(url) = &collect.sink_url else {
        return Ok(Box::new(JsonLinesSink::stdout()));
    };
    let sink = HttpSink::builder(url, &collect.vendor, &collect.product)
        .with_timeout(Duration::from_secs(conn.timeout_secs))
        .with_insecure(conn.insecure)
        .with_proxy(conn.proxy.clone())
        .build()
        .context("building sink HTTP client")?;
    Ok(Box::new(sink))
}

fn orchestrator(
    client: CloudSocClient,
    collect: &CollectArgs,
    max_fetch: usize,
) -> CollectionOrchestrator<CloudSocClient> {
    CollectionOrchestrator::new(
        client,
        CycleSettings {
            max_fetch,
            first_fetch: collect.first_fetch.clone(),
            ..Default::default()
        },
    )
}

// ── Commands ──

async fn cmd_test(client: &CloudSocClient, categories: &[LogCategory]) -> anyhow::Result<()> {
    match client.test_connection(categories).await {
        Ok(()) => {
            println!("ok");
            Ok(())
        }
        Err(e) if e.is_auth() => bail!("authorization error: check the key id and key secret"),
        Err(e) => Err(e).with_context(|| format!("connecting to {}", client.endpoint())),
    }
}

async fn cmd_fetch(
    client: CloudSocClient,
    categories: &[LogCategory],
    collect: &CollectArgs,
    sink: &dyn EventSink,
    state: PathBuf,
) -> anyhow::Result<()> {
    let store = StateStore::open(state);
    let orch = orchestrator(client, collect, collect.max_fetch);

    eprintln!("Collecting {} categories...", categories.len());
    let report = cycle::run_fetch_cycle(&orch, categories, &store, sink).await?;
    eprint!("{}", display::render_summary(&report.result.stats));
    eprintln!(
        "Delivered {} events in {:.1}s",
        report.delivered, report.elapsed_secs
    );

    if report.all_failed(categories.len()) {
        bail!("every category failed this cycle");
    }
    Ok(())
}

async fn cmd_get_events(
    client: CloudSocClient,
    categories: &[LogCategory],
    collect: &CollectArgs,
    limit: Option<usize>,
    push_to: Option<&dyn EventSink>,
    state: Option<PathBuf>,
) -> anyhow::Result<()> {
    let prior = match &state {
        Some(path) => StateStore::open(path).load()?,
        None => LastRun::default(),
    };
    let orch = orchestrator(client, collect, limit.unwrap_or(collect.max_fetch));
    let result = orch.run(categories, &prior).await;

    for category in categories {
        let records: Vec<_> = result.records_for(&category.id).map(|t| &t.record).collect();
        println!("{}", display::render_events(category, &records));
    }
    for failure in &result.failures {
        eprintln!("  {} failed: {}", failure.category_id, failure.reason);
    }

    if let Some(sink) = push_to {
        let sent = sink
            .send(&result.new_records)
            .await
            .context("pushing events")?;
        eprintln!("Pushed {sent} events");
    }
    Ok(())
}
