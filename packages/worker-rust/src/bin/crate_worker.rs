//! Launcher: loads an application and serves its tasks.

use std::path::PathBuf;

use clap::Parser;
use dispatch_worker::demo::{self, DemoConfig, DEFAULT_APP};
use dispatch_worker::logging::init_tracing;
use dispatch_worker::network::{DEFAULT_HOST, DEFAULT_PORT};
use dispatch_worker::service::SchedulerConfig;
use dispatch_worker::AppConfig;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "crate-worker", about = "Crate worker.")]
struct Cli {
    /// Application path (module:object).
    #[arg(short = 'A', long, env = "CRATE_APP", default_value = DEFAULT_APP)]
    app: String,

    /// Host to bind.
    #[arg(short = 'H', long, env = "CRATE_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port to bind.
    #[arg(short = 'P', long, env = "CRATE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Runtime worker threads; omit for a single cooperative thread.
    #[arg(long, env = "CRATE_WORKER_THREADS")]
    worker_threads: Option<usize>,

    /// File the demo `write_log` task appends to.
    #[arg(long, env = "CRATE_LOG_PATH", default_value = "./crate.log")]
    log_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig {
        scheduler: SchedulerConfig {
            worker_threads: cli.worker_threads,
            ..SchedulerConfig::default()
        },
        ..AppConfig::default()
    };
    let demo = DemoConfig {
        log_path: cli.log_path,
        ..DemoConfig::default()
    };

    let app = demo::load(&cli.app, config, &demo)?;
    app.set_host(cli.host);
    app.set_port(cli.port);

    info!("Starting the crate on {}:{}...", app.host(), app.port());
    app.run()
}
