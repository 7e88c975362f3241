#![doc = include_str!("../README.md")]
use ::lib::config::default_config_file;
use ::lib::{
    dispatch, get_cache, setup_tracing, Action, App, Args, Scheduler, SystemCommandRunner,
    Terminal,
};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::debug;

#[paw::main]
fn main(args: Args) -> Result<()> {
    setup_tracing(&args)?;
    if let Some(file) = &args.config {
        if !file.exists() {
            bail!("Configuration file {:?} not found", file);
        }
    }
    // Merge config Default → Config File → command line args
    let config_file = args.config.clone().or_else(default_config_file);
    let args = args.with_config_file(config_file.as_deref())?;
    let action = args.action.clone().unwrap_or(Action::Installed);
    let config = args.validate()?;
    debug!("Configuration: {:#?}", config);

    let cache = get_cache(Some(config.cache_dir.clone())).context("Opening command cache")?;
    let (dispatcher, queue) = dispatch::channel();
    let scheduler = Scheduler::new(
        Arc::new(SystemCommandRunner),
        cache,
        dispatcher,
        config.elevation.clone(),
    );
    let mut terminal = Terminal::new(config.yes);
    let mut app = App::new(config, scheduler);
    app.start(&action, &mut terminal)?;
    app.run(&queue, &mut terminal)
}
