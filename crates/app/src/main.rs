#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fleet_api::{MockDirectory, Server};
use fleet_core::{Application, Dimension, ScopeSet, Selection, VisibleRow};
use fleet_engine::{parse_script, Engine, EngineConfig, Frame, Msg};
use fleet_index::ScopeIndex;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "fleet", version, about = "Browse and drive an application fleet")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// JSON fixture describing the application directory
    #[arg(long = "fixture", env = "FLEET_FIXTURE", global = true)]
    fixture: Option<PathBuf>,

    /// Log file shown by the `logs` command
    #[arg(long = "log-file", env = "FLEET_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Level { Clusters, Namespaces, Projects, Appsets }

#[derive(Args, Debug)]
struct ScopeArgs {
    /// Cluster scope (comma separated)
    #[arg(long = "cluster", value_delimiter = ',')]
    clusters: Vec<String>,
    /// Namespace scope (comma separated)
    #[arg(long = "namespace", value_delimiter = ',')]
    namespaces: Vec<String>,
    /// Project scope (comma separated)
    #[arg(long = "project", value_delimiter = ',')]
    projects: Vec<String>,
    /// ApplicationSet scope (comma separated)
    #[arg(long = "appset", value_delimiter = ',')]
    appsets: Vec<String>,
}

impl ScopeArgs {
    fn selection(&self) -> Selection {
        Selection {
            clusters: self.clusters.iter().cloned().collect(),
            namespaces: self.namespaces.iter().cloned().collect(),
            projects: self.projects.iter().cloned().collect(),
            application_sets: self.appsets.iter().cloned().collect(),
            selected_apps: ScopeSet::new(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List applications matching the given scopes
    Ls {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// List the values available at one level under the given scopes
    Scopes {
        #[arg(value_enum)]
        level: Level,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Drive the engine with a key script and print the resulting frame
    Replay {
        /// Keys: `<enter>`, `<esc>`, `<space>`, `<tab>`... or words typed literally
        keys: Vec<String>,
        /// Give up waiting for background results after this long without one
        #[arg(long = "settle-ms", default_value_t = 2000)]
        settle_ms: u64,
    },
}

fn init_tracing() {
    let env = std::env::var("FLEET_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("FLEET_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid FLEET_METRICS_ADDR; expected host:port");
        }
    }
}

fn load_fixture(path: Option<&Path>) -> Result<MockDirectory> {
    let path = path.context("no fixture given; pass --fixture or set FLEET_FIXTURE")?;
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading fixture {}", path.display()))?;
    MockDirectory::from_json(&raw).with_context(|| format!("parsing fixture {}", path.display()))
}

fn print_apps(apps: &[&Application], output: Output) -> Result<()> {
    match output {
        Output::Human => {
            for a in apps {
                let dim = |d: Dimension| a.dimension(d).unwrap_or("-");
                println!(
                    "{} • {} • {} • {}/{} • {}",
                    a.name,
                    if a.sync.is_empty() { "-" } else { a.sync.as_str() },
                    if a.health.is_empty() { "-" } else { a.health.as_str() },
                    dim(Dimension::Cluster),
                    dim(Dimension::Namespace),
                    dim(Dimension::Project),
                );
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(apps)?),
    }
    Ok(())
}

fn print_values(values: &[String], output: Output) -> Result<()> {
    match output {
        Output::Human => values.iter().for_each(|v| println!("{v}")),
        Output::Json => println!("{}", serde_json::to_string_pretty(values)?),
    }
    Ok(())
}

fn print_frame(frame: &Frame, output: Output) -> Result<()> {
    match output {
        Output::Human => {
            println!("view: {} • mode: {} • cursor: {}", frame.view.label(), frame.mode.label(), frame.cursor);
            if !frame.filter.is_empty() { println!("filter: {}", frame.filter); }
            for (i, row) in frame.rows.iter().enumerate() {
                let marker = if i == frame.cursor { ">" } else { " " };
                match row {
                    VisibleRow::Application(a) => {
                        let picked = if frame.selection.selected_apps.contains(&a.name) { "*" } else { " " };
                        println!("{marker}{picked} {} • {} • {}", a.name, a.sync, a.health);
                    }
                    VisibleRow::ScopeLabel(v) => println!("{marker}  {v}"),
                }
            }
            if !frame.status.is_empty() { println!("status: {}", frame.status); }
            if let Some(e) = &frame.error { println!("error: {}", e.message); }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(frame)?),
    }
    Ok(())
}

async fn replay(cli: &Cli, keys: &[String], settle: Duration) -> Result<()> {
    let fixture = cli.fixture.as_deref();
    let directory = load_fixture(fixture)?;
    let keys = parse_script(keys).map_err(anyhow::Error::msg)?;
    let mut config = EngineConfig::from_env();
    if cli.log_file.is_some() { config.log_file = cli.log_file.clone(); }

    let (mut engine, handle) = Engine::new(Arc::new(directory), config);
    let base_url = format!("fixture://{}", fixture.map(|p| p.display().to_string()).unwrap_or_default());
    engine.step(Msg::ServerConfigured(Server { base_url, token: None, insecure: false }));
    engine.settle(settle).await;

    // Synthetic clock: keys land 250ms apart, outside the escape debounce.
    let start = Instant::now();
    for (i, key) in keys.into_iter().enumerate() {
        if engine.is_quit() { break; }
        engine.step_at(Msg::Key(key), start + Duration::from_millis(250 * i as u64));
        engine.settle(settle).await;
    }
    info!(epoch = handle.current().epoch, quit = engine.is_quit(), "replay: done");
    print_frame(&handle.current(), cli.output)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Ls { scope } => {
            let directory = load_fixture(cli.fixture.as_deref())?;
            let idx = ScopeIndex::build(&directory.apps);
            let apps = idx.scoped_applications(&directory.apps, &scope.selection());
            info!(total = idx.total(), matched = apps.len(), "ls: done");
            print_apps(&apps, cli.output)?;
        }
        Commands::Scopes { level, scope } => {
            let directory = load_fixture(cli.fixture.as_deref())?;
            let apps = &directory.apps;
            let idx = ScopeIndex::build(apps);
            let sel = scope.selection();
            let values = match level {
                Level::Clusters => idx.values(Dimension::Cluster).to_vec(),
                Level::Namespaces => idx.scoped_namespaces(apps, &sel.clusters),
                Level::Projects => idx.scoped_projects(apps, &sel.clusters, &sel.namespaces),
                Level::Appsets => idx.scoped_application_sets(apps, &sel),
            };
            print_values(&values, cli.output)?;
        }
        Commands::Replay { keys, settle_ms } => {
            replay(&cli, keys, Duration::from_millis(*settle_ms)).await?;
        }
    }
    Ok(())
}
