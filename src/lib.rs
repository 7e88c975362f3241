#![warn(missing_docs)]
//! Apmrunner main components and helper functions used by `main`
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

pub mod app;
pub mod cache;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod elevation;
pub mod packages;
pub mod queue;
pub mod request;
pub mod scheduler;
pub mod secret;
pub mod tools;
pub mod ui;
pub use app::{App, AppState};
pub use cache::Cache;
pub use command::{CommandResult, CommandRunner, Outcome, SystemCommandRunner};
pub use config::{Action, AppConfig, Args, Mode};
pub use dispatch::{DispatchQueue, Dispatcher, UiEvent};
pub use request::{CommandRequest, Completion, Tag};
pub use scheduler::Scheduler;
pub use ui::{Frontend, Terminal};

/// Setup logging to stderr
/// (Tracing is a bit more involving to set up but will provide much more feature if needed)
pub fn setup_tracing(args: &Args) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let filter_layer =
        EnvFilter::try_new(args.verbose.get_level_filter()).context("Initializing log filter")?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
    Ok(())
}

/// Return a [`Cache`] stored in `dir`, creating the directory if needed.
pub fn get_cache(dir: Option<PathBuf>) -> Result<Cache> {
    let Some(cache_dir) = dir else {
        bail!("Internal Error, no `cache_dir` configured");
    };
    fs::create_dir_all(&cache_dir)
        .with_context(|| format!("Creating cache dir {:?}", &cache_dir))?;
    Ok(Cache::new(cache_dir))
}
