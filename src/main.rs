//! confstage CLI
//!
//! Entry point for the `confstage` command: generate configuration files,
//! then run and supervise the configured process.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use serde_json::{Map, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use confstage::config::{DEFAULT_BASE_DIR, ENVIRONMENT_VAR};
use confstage::{Config, Engine, ExecOverride, ExecSpec, SourceRegistry, StatusServer, Supervisor};

#[derive(Parser)]
#[command(name = "confstage")]
#[command(about = "Generate configuration files from pluggable sources, then supervise a process", version)]
struct Cli {
    /// Base directory holding the configuration, environments and templates
    #[arg(long, short = 'b', env = "CONFSTAGE_BASE")]
    base_dir: Option<PathBuf>,

    /// Path to the base configuration file (default: <base-dir>/common.yaml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Environment to generate for
    #[arg(long, short = 'e')]
    environment: Option<String>,

    /// Command to launch after generation, run through /bin/sh
    #[arg(long, short = 'x')]
    exec: Option<String>,

    /// Generate files only; do not launch a process
    #[arg(long, short = 'n')]
    no_exec: bool,

    /// Enable the status endpoint
    #[arg(long, short = 'a')]
    api: bool,

    /// Status endpoint port
    #[arg(long, short = 'p')]
    api_port: Option<u16>,

    /// Log at info level
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Log at debug level
    #[arg(long, short = 'd')]
    debug: bool,
}

impl Cli {
    /// Values that override the base configuration file
    fn overrides(&self) -> Value {
        let mut overrides = Map::new();
        if let Some(base_dir) = &self.base_dir {
            overrides.insert("base_dir".into(), base_dir.display().to_string().into());
        }
        if self.api {
            overrides.insert("api_enable".into(), true.into());
        }
        if let Some(port) = self.api_port {
            overrides.insert("api_port".into(), port.into());
        }
        Value::Object(overrides)
    }

    /// Exec settings that no configuration layer may override
    fn exec_override(&self) -> ExecOverride {
        ExecOverride {
            exec: self.exec.clone(),
            no_exec: self.no_exec,
        }
    }

    fn config_path(&self) -> PathBuf {
        match &self.config {
            Some(path) => path.clone(),
            None => self
                .base_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BASE_DIR))
                .join("common.yaml"),
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let config_path = cli.config_path();
    let mut config = match Config::load(&config_path, Some(cli.overrides())) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };
    debug!(path = %config_path.display(), "loaded configuration");

    let environment = config.resolve_environment(
        cli.environment.as_deref(),
        std::env::var(ENVIRONMENT_VAR).ok(),
    );
    info!(environment = %environment, "using environment");

    let registry = SourceRegistry::builtin();
    let report = match Engine::new(&registry).run(config) {
        Ok(report) => Arc::new(report),
        Err(e) => {
            eprintln!("Error generating templates: {}", e);
            process::exit(1);
        }
    };

    let exec = match ExecSpec::resolve(&cli.exec_override(), &report.config) {
        Ok(exec) => exec,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    // kept alive for as long as the child runs
    let _server = if report.config.api_enabled() {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, report.config.api_port()));
        match StatusServer::spawn(addr, Arc::clone(&report)) {
            Ok(server) => Some(server),
            Err(e) => {
                eprintln!("Error starting status endpoint: {}", e);
                process::exit(1);
            }
        }
    } else {
        None
    };

    let Some(exec) = exec else {
        info!("no exec configured, exiting");
        process::exit(0);
    };

    let mut supervisor = Supervisor::new(exec);
    match supervisor.run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error running child: {}", e);
            process::exit(1);
        }
    }
}
