//! Dispatches one task to a running worker and prints the acknowledgment.

use clap::Parser;
use dispatch_core::{Args, Kwargs};
use dispatch_worker::logging::init_tracing;
use dispatch_worker::network::{DEFAULT_HOST, DEFAULT_PORT};
use dispatch_worker::{App, AppConfig};

#[derive(Debug, Parser)]
#[command(name = "crate-send", about = "Send a task to a crate worker.")]
struct Cli {
    /// Registered task name.
    task: String,

    /// Positional arguments as a JSON array.
    #[arg(long, default_value = "[]", value_parser = parse_args)]
    args: Args,

    /// Keyword arguments as a JSON object.
    #[arg(long, default_value = "{}", value_parser = parse_kwargs)]
    kwargs: Kwargs,

    #[arg(short = 'H', long, env = "CRATE_HOST", default_value = DEFAULT_HOST)]
    host: String,

    #[arg(short = 'P', long, env = "CRATE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
}

fn parse_args(raw: &str) -> Result<Args, String> {
    serde_json::from_str(raw).map_err(|err| format!("expected a JSON array: {err}"))
}

fn parse_kwargs(raw: &str) -> Result<Kwargs, String> {
    serde_json::from_str(raw).map_err(|err| format!("expected a JSON object: {err}"))
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let app = App::new(AppConfig::default())?;
    app.set_host(cli.host);
    app.set_port(cli.port);

    match app.call(&cli.task, cli.args, cli.kwargs)? {
        Some(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.success {
                std::process::exit(1);
            }
        }
        None => {
            eprintln!("worker closed the connection without responding");
            std::process::exit(2);
        }
    }
    Ok(())
}
