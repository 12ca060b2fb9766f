//! Demo application shipped with the launcher.
//!
//! Rust cannot import an application object by path at runtime, so the
//! launcher's `--app module:object` selects one of the applications compiled
//! in here.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::app::{App, AppConfig};
use crate::service::task::TaskArgs;

/// Default `--app` path.
pub const DEFAULT_APP: &str = "app:app";

/// Settings for the demo tasks.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// File `write_log` appends to.
    pub log_path: PathBuf,
    /// Pause between the two lines `write_log` writes.
    pub write_log_pause: Duration,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("./crate.log"),
            write_log_pause: Duration::from_secs(5),
        }
    }
}

/// Builds the application named by `path` (`module:object`).
///
/// # Errors
///
/// Returns an error for unknown application paths or if the app's runtime
/// cannot be built.
pub fn load(path: &str, config: AppConfig, demo: &DemoConfig) -> anyhow::Result<App> {
    let (module, object) = path.split_once(':').unwrap_or((path, path));
    info!("Loading {}:{}...", module, object);

    match (module, object) {
        ("app" | "demo", "app") => {
            let app = App::new(config)?;
            register_demo_tasks(&app, demo);
            Ok(app)
        }
        _ => anyhow::bail!("unknown application '{path}' (available: {DEFAULT_APP})"),
    }
}

/// Registers `hello_world`, `fib`, `write_log`, and `fetch_url` on `app`.
pub fn register_demo_tasks(app: &App, demo: &DemoConfig) {
    app.register_task("hello_world", |args: TaskArgs| {
        let mut bound = args.bind(&["waiting"])?;
        let waiting: u64 = bound.optional("waiting", 2)?;
        Ok(async move {
            info!("Hello world!");
            tokio::time::sleep(Duration::from_secs(waiting)).await;
            info!("Wumba lumba dub dub...");
            Ok(())
        })
    });

    app.register_task("fib", |args: TaskArgs| {
        let mut bound = args.bind(&["n"])?;
        let n: u64 = bound.required("n")?;
        Ok(async move {
            fib(n).await;
            Ok(())
        })
    });

    let log_path = demo.log_path.clone();
    let pause = demo.write_log_pause;
    app.register_task("write_log", move |args: TaskArgs| {
        let mut bound = args.bind(&["line"])?;
        let line: String = bound.required("line")?;
        let path = log_path.clone();
        Ok(async move {
            append_line(&path, &line).await?;
            tokio::time::sleep(pause).await;
            let reversed: String = line.chars().rev().collect();
            append_line(&path, &reversed).await
        })
    });

    app.register_task("fetch_url", |args: TaskArgs| {
        let mut bound = args.bind(&["url", "with_text"])?;
        let url: String = bound.required("url")?;
        let with_text: bool = bound.optional("with_text", false)?;
        Ok(async move {
            let resp = reqwest::get(&url).await?;
            info!("{} {}", resp.status(), url);
            if with_text {
                info!("{}", resp.text().await?);
            }
            Ok(())
        })
    });
}

/// Naive recursive Fibonacci that logs every intermediate result.
pub fn fib(n: u64) -> Pin<Box<dyn Future<Output = u64> + Send>> {
    Box::pin(async move {
        let result = if n <= 1 {
            n
        } else {
            fib(n - 1).await + fib(n - 2).await
        };
        info!("fib({}) -> {}", n, result);
        result
    })
}

async fn append_line(path: &Path, line: &str) -> anyhow::Result<()> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("[{stamp}] {line}\n").as_bytes())
        .await?;
    file.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
