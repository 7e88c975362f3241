//! Application state and the UI thread loop.
//!
//! [`App`] owns the [`AppState`] and is the only code mutating it. Workers
//! report through the dispatch queue; [`App::run`] consumes it on the calling
//! thread, renders through a [`Frontend`] and reacts to completions, possibly
//! by scheduling follow-up requests.
use crate::config::{Action, AppConfig, Mode};
use crate::dispatch::{DispatchQueue, UiEvent};
use crate::packages::{self, Package, Source};
use crate::queue::{PackageQueue, QueueAction};
use crate::request::{CommandRequest, Completion, Tag};
use crate::scheduler::Scheduler;
use crate::tools;
use crate::ui::Frontend;
use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use tracing::debug;

/// Everything the UI displays.
#[derive(Debug, Default)]
pub struct AppState {
    /// back-end being driven
    pub mode: Mode,
    /// a busy request is running
    pub busy: bool,
    /// last status line
    pub status: String,
    /// installed packages, `None` while loading
    pub installed: Option<Vec<Package>>,
    /// names of packages with an update, `None` while loading
    pub upgradable: Option<BTreeSet<String>>,
    /// packages picked for batch processing
    pub queue: PackageQueue,
    listing: bool,
}

/// The UI thread side of the application.
pub struct App {
    config: AppConfig,
    scheduler: Scheduler,
    state: AppState,
    in_flight: usize,
}

impl App {
    #[allow(missing_docs)]
    pub fn new(config: AppConfig, scheduler: Scheduler) -> Self {
        let state = AppState {
            mode: config.mode,
            ..Default::default()
        };
        Self {
            config,
            scheduler,
            state,
            in_flight: 0,
        }
    }

    #[allow(missing_docs)]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Number of completions still expected.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn submit(&mut self, request: CommandRequest) {
        debug!("Submitting `{}` ({:?})", request, request.tag());
        self.in_flight += 1;
        self.scheduler.run(request);
    }

    /// Reload the installed and upgradable lists, then print them.
    pub fn refresh(&mut self, force: bool) {
        let mode = self.state.mode;
        self.state.installed = None;
        self.state.upgradable = None;
        self.state.listing = true;
        self.submit(tools::installed(mode, force));
        self.submit(tools::upgradable(mode));
    }

    /// Start `action`. [`App::run`] then processes its events until done.
    pub fn start(&mut self, action: &Action, frontend: &mut dyn Frontend) -> Result<()> {
        let mode = self.state.mode;
        let force = self.config.refresh;
        let aur = self.config.aur;
        match action {
            Action::Installed => self.refresh(force),
            Action::Search { query } => {
                let query = query.join(" ");
                self.submit(tools::search(mode, aur, &query).with_force_refresh(force));
            }
            Action::Info { package, remote } => {
                let remote = match (mode, remote) {
                    (Mode::Flatpak, Some(remote)) => Some(remote.as_str()),
                    _ => None,
                };
                self.submit(tools::info(mode, aur, package, remote).with_force_refresh(force));
            }
            Action::Groups { group: None } => {
                self.submit(tools::groups().with_force_refresh(force))
            }
            Action::Groups { group: Some(group) } => {
                self.submit(tools::group_members(group).with_force_refresh(force))
            }
            Action::Upgradable => {
                self.state.listing = false;
                self.submit(tools::upgradable(mode));
            }
            Action::Update => self.submit(tools::update_check(mode)),
            Action::Queue {
                install,
                remove,
                flatpak_install,
                flatpak_remove,
            } => {
                let system_source = if aur { Source::Yay } else { Source::Pacman };
                let picks = [
                    (QueueAction::Install, install, system_source),
                    (QueueAction::Remove, remove, Source::Pacman),
                    (QueueAction::Install, flatpak_install, Source::Flatpak),
                    (QueueAction::Remove, flatpak_remove, Source::Flatpak),
                ];
                for (action, names, source) in picks {
                    for name in names {
                        self.state
                            .queue
                            .add(action, name, source)
                            .context("Building package queue")?;
                    }
                }
                self.process_queue(frontend)?;
            }
        }
        Ok(())
    }

    /// Confirm the queued packages and drain them on a worker.
    pub fn process_queue(&mut self, frontend: &mut dyn Frontend) -> Result<()> {
        if self.state.queue.is_empty() {
            bail!("The package queue is empty");
        }
        let items: Vec<String> = self.state.queue.items().iter().map(|i| i.to_string()).collect();
        if !frontend.confirm("Process the package queue?", &items) {
            self.set_status(frontend, "Queue processing cancelled.".into());
            return Ok(());
        }
        let chain = std::mem::take(&mut self.state.queue).into_chain(&self.config.flatpak_remote);
        debug!("Draining {} queue job(s)", chain.len());
        self.in_flight += 1;
        chain.start(self.scheduler.clone());
        Ok(())
    }

    /// Process events until no completion is expected anymore.
    pub fn run(&mut self, queue: &DispatchQueue, frontend: &mut dyn Frontend) -> Result<()> {
        while self.in_flight > 0 {
            let event = queue.recv().context("Dispatch queue closed")?;
            self.handle(event, frontend);
        }
        Ok(())
    }

    /// Apply one event.
    pub fn handle(&mut self, event: UiEvent, frontend: &mut dyn Frontend) {
        match event {
            UiEvent::Status(text) => self.set_status(frontend, text),
            UiEvent::Console(text) => frontend.on_console(&text),
            UiEvent::Output { text, .. } => frontend.on_log_line(&text),
            UiEvent::Busy(busy) => {
                self.state.busy = busy;
                frontend.on_busy_changed(busy);
            }
            UiEvent::Alert { title, message } => frontend.on_alert(&title, &message),
            UiEvent::SecretRequested(reply) => {
                // An empty entry counts as a refusal.
                let secret = frontend.on_secret_requested().filter(|s| !s.is_empty());
                reply.send(secret);
            }
            UiEvent::Completed(completion) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.on_completed(completion, frontend);
            }
        }
    }

    fn set_status(&mut self, frontend: &mut dyn Frontend, text: String) {
        frontend.on_status(&text);
        self.state.status = text;
    }

    fn on_completed(&mut self, completion: Completion, frontend: &mut dyn Frontend) {
        debug!(
            "{:?} completed: {}{}",
            completion.tag,
            completion.outcome,
            if completion.from_cache { " (cached)" } else { "" }
        );
        let success = completion.is_success();
        match completion.tag {
            Tag::Installed(source) => {
                let packages = match (success, source) {
                    (false, _) => Vec::new(),
                    (true, Source::Flatpak) => packages::parse_installed_flatpak(&completion.transcript),
                    (true, _) => packages::parse_installed_system(&completion.transcript),
                };
                self.state.installed = Some(packages);
                self.show_listing(frontend);
            }
            Tag::Upgradable(mode) => {
                let names = if success {
                    parse_upgradable(mode, &completion.transcript)
                } else {
                    BTreeSet::new()
                };
                if !self.state.listing {
                    for name in &names {
                        frontend.on_log_line(&format!("{}\n", name));
                    }
                }
                self.state.upgradable = Some(names);
                self.show_listing(frontend);
            }
            Tag::Search { source, query } => {
                let text = if source == Source::Flatpak && success {
                    filter_lines(&completion.transcript, &query)
                } else {
                    completion.transcript
                };
                if text.trim().is_empty() {
                    frontend.on_console(&format!("No results for '{}'.", query));
                } else {
                    frontend.on_log_line(&text);
                }
            }
            Tag::Info(_) | Tag::Groups | Tag::GroupMembers(_) => {
                frontend.on_log_line(&completion.transcript)
            }
            Tag::UpdateCheck(mode) => self.offer_update(mode, &completion, frontend),
            Tag::Update(mode) => {
                frontend.on_console(&format!("{} update process finished.", mode));
                self.refresh(true);
            }
            Tag::QueueJob(index) => debug!("Queue job {} reported", index),
            Tag::QueueFinished => {
                frontend.on_console("Package queue processing finished.");
                self.refresh(true);
            }
        }
    }

    fn offer_update(&mut self, mode: Mode, completion: &Completion, frontend: &mut dyn Frontend) {
        if !completion.is_success() {
            frontend.on_console(&format!("Could not check for {} updates.", mode));
            return;
        }
        let names: Vec<String> = parse_upgradable(mode, &completion.transcript)
            .into_iter()
            .collect();
        if names.is_empty() {
            self.set_status(frontend, format!("All {} packages are up to date.", mode));
            return;
        }
        let title = format!("{} {} update(s) available:", names.len(), mode);
        if frontend.confirm(&title, &names) {
            self.submit(tools::update(mode));
        } else {
            self.set_status(frontend, "Update cancelled.".into());
        }
    }

    fn show_listing(&mut self, frontend: &mut dyn Frontend) {
        if !self.state.listing {
            return;
        }
        let (Some(installed), Some(upgradable)) = (&self.state.installed, &self.state.upgradable)
        else {
            return;
        };
        for package in installed {
            let flag = if upgradable.contains(&package.name) {
                "  [update available]"
            } else {
                ""
            };
            frontend.on_log_line(&format!("{} {}{}\n", package.name, package.version(), flag));
        }
        self.state.listing = false;
    }
}

fn parse_upgradable(mode: Mode, transcript: &str) -> BTreeSet<String> {
    match mode {
        Mode::System => packages::parse_upgradable_system(transcript),
        Mode::Flatpak => packages::parse_upgradable_flatpak(transcript),
    }
}

/// Keep the lines of `text` containing `query`, ignoring case.
fn filter_lines(text: &str, query: &str) -> String {
    let query = query.to_lowercase();
    text.lines()
        .filter(|line| line.to_lowercase().contains(&query))
        .fold(String::new(), |mut acc, line| {
            acc.push_str(line);
            acc.push('\n');
            acc
        })
}
