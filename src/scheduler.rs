//! Run [`CommandRequest`]s on background workers.
//!
//! The [`Scheduler`] ties the cache, the executor and the elevation broker
//! together. Each call to [`Scheduler::run`] gets its own worker thread; the
//! worker reports everything through the dispatch queue and never touches UI
//! state. Requests are not serialized against each other: callers needing an
//! order use a [`crate::queue::JobChain`].
use crate::cache::Cache;
use crate::command::{CommandResult, CommandRunner, Invocation, Outcome};
use crate::dispatch::{Dispatcher, LineSink, UiEvent};
use crate::elevation::ElevationBroker;
use crate::request::{CommandRequest, Completion};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

const STATUS_READY: &str = "Ready";
const STATUS_FROM_CACHE: &str = "Ready (from cache)";

/// Façade running requests with caching and elevation.
#[derive(Clone)]
pub struct Scheduler {
    runner: Arc<dyn CommandRunner>,
    cache: Cache,
    dispatcher: Dispatcher,
    broker: ElevationBroker,
    elevation: Arc<[String]>,
}

impl Scheduler {
    /// Create a scheduler.
    ///
    /// `elevation` is the prefix put in front of elevated command lines, e.g.
    /// `["sudo", "-S"]`.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        cache: Cache,
        dispatcher: Dispatcher,
        elevation: Vec<String>,
    ) -> Self {
        Self {
            runner,
            cache,
            broker: ElevationBroker::new(dispatcher.clone()),
            dispatcher,
            elevation: elevation.into(),
        }
    }

    /// Dispatcher used to reach the UI thread.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[allow(missing_docs)]
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Run `request` on a new worker thread.
    ///
    /// The completion is posted as [`UiEvent::Completed`], followed by
    /// `Busy(false)` when the request had set the busy state.
    pub fn run(&self, request: CommandRequest) -> JoinHandle<()> {
        let scheduler = self.clone();
        thread::spawn(move || {
            let dispatcher = scheduler.dispatcher.clone();
            scheduler.run_blocking(&request, move |completion| {
                dispatcher.post(UiEvent::Completed(completion.clone()))
            });
        })
    }

    /// Run `request` on the calling thread, which must not be the UI thread.
    ///
    /// `on_complete` is called once the request is over, whatever the
    /// outcome, before the busy state is cleared.
    pub fn run_blocking(
        &self,
        request: &CommandRequest,
        on_complete: impl FnOnce(&Completion),
    ) -> Completion {
        let sink = if request.stream_output() {
            LineSink::forward(self.dispatcher.clone(), request.tag().clone())
        } else {
            LineSink::discard()
        };

        if let Some(completion) = self.replay_cached(request, &sink) {
            on_complete(&completion);
            return completion;
        }

        if request.set_busy() {
            self.dispatcher.post(UiEvent::Busy(true));
        }
        let completion = self.execute(request, &sink);
        if let Some(key) = request.cache_key() {
            if completion.is_success() {
                if let Err(e) = self.cache.put(key, &completion.transcript) {
                    warn!("{:#}", e);
                }
            }
        }
        on_complete(&completion);
        if request.set_busy() {
            self.dispatcher.post(UiEvent::Busy(false));
        }
        completion
    }

    fn replay_cached(&self, request: &CommandRequest, sink: &LineSink) -> Option<Completion> {
        if request.force_refresh() {
            return None;
        }
        let key = request.cache_key()?;
        let transcript = self.cache.get(key)?;
        if let Some(modified) = self.cache.modified(key) {
            debug!("Replaying `{}` cached on {}", key, modified.format("%F %T"));
        }
        sink.line(&transcript);
        self.dispatcher.status(STATUS_FROM_CACHE);
        Some(Completion::cached(request.tag().clone(), transcript))
    }

    fn execute(&self, request: &CommandRequest, sink: &LineSink) -> Completion {
        let invocation = if request.elevate() {
            match self.broker.obtain_secret() {
                Some(secret) => {
                    let argv = self.elevation.iter().chain(request.argv()).cloned().collect();
                    Invocation::elevated(argv, secret)
                }
                None => {
                    let msg = "Elevated command cancelled: no password provided.";
                    info!("{} ({})", msg, request);
                    self.dispatcher.console(msg);
                    sink.line(&format!("{}\n", msg));
                    self.dispatcher.status(STATUS_READY);
                    return Completion::cancelled(request.tag().clone());
                }
            }
        } else {
            Invocation::new(request.argv().to_vec())
        };

        let running = format!("Running: {}", request);
        self.dispatcher.status(running.as_str());
        self.dispatcher.console(running);
        let result = self.runner.run(&invocation, sink);
        // With elevation the spawned program is the elevation tool.
        let program = invocation.argv().first().cloned().unwrap_or_default();
        drop(invocation);
        self.report(request, &program, &result);
        self.dispatcher.status(STATUS_READY);
        Completion::executed(request.tag().clone(), result)
    }

    fn report(&self, request: &CommandRequest, program: &str, result: &CommandResult) {
        match &result.outcome {
            Outcome::Success => debug!("`{}` succeeded", request),
            Outcome::NonZeroExit => {
                warn!("`{}` exited with code {}", request, result.exit_code);
                self.dispatcher
                    .console(format!("Process exited with code {}", result.exit_code));
            }
            Outcome::AuthFailure => {
                error!("Incorrect password for `{}`", request);
                self.dispatcher.console("Error: Incorrect password for sudo.");
                self.alert("Authentication Failed", "The password you entered was incorrect.");
            }
            Outcome::NotFound => {
                let msg = format!("Error: Command not found - {}.", program);
                error!("{}", msg);
                self.dispatcher.console(msg.as_str());
                self.alert("Command Not Found", &msg);
            }
            Outcome::IoError(e) => {
                let msg = format!("An unexpected error occurred: {}", e);
                error!("{}", msg);
                self.dispatcher.console(msg);
            }
            Outcome::Cancelled => {}
        }
    }

    fn alert(&self, title: &str, message: &str) {
        self.dispatcher.post(UiEvent::Alert {
            title: title.to_owned(),
            message: message.to_owned(),
        });
    }
}

#[cfg(test)]
mod should {
    use super::*;
    use crate::command::MockCommandRunner;
    use crate::dispatch::{self, DispatchQueue};
    use crate::packages::Source;
    use crate::request::Tag;
    use crate::secret::Secret;
    use mktemp::Temp;
    use std::time::Duration;
    use test_log::test; // Automatically trace tests

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn scheduler(runner: MockCommandRunner) -> (Temp, Scheduler, DispatchQueue) {
        let temp = Temp::new_dir().unwrap();
        let (dispatcher, queue) = dispatch::channel();
        let scheduler = Scheduler::new(
            Arc::new(runner),
            Cache::new(temp.to_path_buf()),
            dispatcher,
            vec!["sudo".into(), "-S".into()],
        );
        (temp, scheduler, queue)
    }

    fn ok(transcript: &str) -> CommandResult {
        CommandResult {
            transcript: transcript.into(),
            exit_code: 0,
            outcome: Outcome::Success,
        }
    }

    /// Act as the UI thread until the completion arrives, answering password
    /// requests with `password`.
    fn ui_loop(queue: &DispatchQueue, password: Option<&str>) -> (Vec<UiEvent>, Completion) {
        let mut seen = Vec::new();
        loop {
            match queue.recv_timeout(TIMEOUT).expect("worker stalled") {
                UiEvent::SecretRequested(reply) => {
                    reply.send(password.map(|p| Secret::new(p.into())));
                }
                UiEvent::Completed(c) => {
                    seen.extend(queue.try_iter());
                    return (seen, c);
                }
                event => seen.push(event),
            }
        }
    }

    fn installed_request() -> CommandRequest {
        CommandRequest::new(["pkgtool", "-Q"], Tag::Installed(Source::Pacman))
            .with_cache_key("installed.cache")
            .with_streaming(true)
    }

    #[test]
    fn execute_then_cache_then_replay() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv, _| inv.argv() == ["pkgtool", "-Q"] && !inv.is_elevated())
            .times(1)
            .returning(|_, _| ok("bash 5.2\nzsh 5.9\n"));
        let (_temp, scheduler, queue) = scheduler(runner);

        scheduler.run(installed_request()).join().unwrap();
        let (events, completion) = ui_loop(&queue, None);
        assert_eq!(completion.transcript, "bash 5.2\nzsh 5.9\n");
        assert!(!completion.from_cache);
        assert_eq!(
            scheduler.cache().get("installed.cache").as_deref(),
            Some("bash 5.2\nzsh 5.9\n")
        );
        assert!(matches!(events.first(), Some(UiEvent::Busy(true))));
        assert!(matches!(events.last(), Some(UiEvent::Busy(false))));
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::Status(s) if s == "Running: pkgtool -Q")));

        // Second run: the mock allows a single call, a spawn would panic.
        scheduler.run(installed_request()).join().unwrap();
        let (events, completion) = ui_loop(&queue, None);
        assert!(completion.from_cache);
        assert_eq!(completion.outcome, Outcome::Success);
        assert_eq!(completion.transcript, "bash 5.2\nzsh 5.9\n");
        let outputs: Vec<&String> = events
            .iter()
            .filter_map(|e| match e {
                UiEvent::Output { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(outputs, vec!["bash 5.2\nzsh 5.9\n"]);
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::Status(s) if s == "Ready (from cache)")));
        assert!(!events.iter().any(|e| matches!(e, UiEvent::Busy(_))));
    }

    #[test]
    fn force_refresh_bypasses_cache() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|_, _| ok("fresh\n"));
        let (_temp, scheduler, _queue) = scheduler(runner);
        scheduler.cache().put("installed.cache", "stale\n").unwrap();

        let request = installed_request().with_force_refresh(true);
        let completion = scheduler.run_blocking(&request, |_| {});
        assert_eq!(completion.transcript, "fresh\n");
        assert_eq!(scheduler.cache().get("installed.cache").as_deref(), Some("fresh\n"));
    }

    #[test]
    fn do_not_cache_failures_or_blank_output() {
        let mut runner = MockCommandRunner::new();
        let mut results = vec![
            ok("   \n"),
            CommandResult {
                transcript: "error: failed to synchronize\n".into(),
                exit_code: 1,
                outcome: Outcome::NonZeroExit,
            },
        ];
        runner
            .expect_run()
            .times(2)
            .returning(move |_, _| results.pop().unwrap());
        let (_temp, scheduler, queue) = scheduler(runner);

        let failed = scheduler.run_blocking(&installed_request(), |_| {});
        assert_eq!(failed.outcome, Outcome::NonZeroExit);
        assert!(scheduler.cache().get("installed.cache").is_none());
        assert!(queue
            .try_iter()
            .any(|e| matches!(e, UiEvent::Console(s) if s == "Process exited with code 1")));

        scheduler.run_blocking(&installed_request(), |_| {});
        assert!(scheduler.cache().get("installed.cache").is_none());
    }

    #[test]
    fn cancelled_elevation_spawns_nothing() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(0);
        let (_temp, scheduler, queue) = scheduler(runner);

        let request =
            CommandRequest::new(["pacman", "-Syu"], Tag::Update(crate::Mode::System))
                .with_elevation(true);
        scheduler.run(request);
        let (events, completion) = ui_loop(&queue, None);
        assert_eq!(completion.outcome, Outcome::Cancelled);
        assert!(completion.transcript.is_empty());
        assert!(events.iter().any(|e| matches!(e, UiEvent::Console(s) if s.contains("cancelled"))));
        assert!(matches!(events.last(), Some(UiEvent::Busy(false))));
    }

    #[test]
    fn elevated_command_gets_prefix_and_secret() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv, _| inv.argv() == ["sudo", "-S", "pacman", "-Syu"] && inv.is_elevated())
            .times(1)
            .returning(|_, _| ok(":: Starting full system upgrade...\n"));
        let (_temp, scheduler, queue) = scheduler(runner);

        let request =
            CommandRequest::new(["pacman", "-Syu"], Tag::Update(crate::Mode::System))
                .with_elevation(true);
        scheduler.run(request);
        let (events, completion) = ui_loop(&queue, Some("hunter2"));
        assert!(completion.is_success());
        // The status shows the command without the elevation prefix.
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::Status(s) if s == "Running: pacman -Syu")));
    }

    #[test]
    fn alert_on_wrong_password_and_missing_tool() {
        let mut runner = MockCommandRunner::new();
        let mut results = vec![
            CommandResult {
                transcript: String::new(),
                exit_code: -1,
                outcome: Outcome::NotFound,
            },
            CommandResult {
                transcript: "sudo: 1 incorrect password attempt\n".into(),
                exit_code: 1,
                outcome: Outcome::AuthFailure,
            },
        ];
        runner
            .expect_run()
            .times(2)
            .returning(move |_, _| results.pop().unwrap());
        let (_temp, scheduler, queue) = scheduler(runner);

        scheduler.run(CommandRequest::new(["pacman", "-Rns", "vim"], Tag::QueueJob(0)).with_elevation(true));
        let (events, _) = ui_loop(&queue, Some("wrong"));
        assert!(events.iter().any(
            |e| matches!(e, UiEvent::Alert { title, .. } if title == "Authentication Failed")
        ));

        scheduler.run(CommandRequest::new(["yay", "-Qu"], Tag::Upgradable(crate::Mode::System)));
        let (events, completion) = ui_loop(&queue, None);
        assert_eq!(completion.outcome, Outcome::NotFound);
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::Alert { message, .. } if message == "Error: Command not found - yay."
        )));
    }

    #[test]
    fn name_missing_elevation_tool() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(1).returning(|_, _| CommandResult {
            transcript: String::new(),
            exit_code: -1,
            outcome: Outcome::NotFound,
        });
        let (_temp, scheduler, queue) = scheduler(runner);

        scheduler.run(
            CommandRequest::new(["pacman", "-Syu"], Tag::Update(crate::Mode::System))
                .with_elevation(true),
        );
        let (events, _) = ui_loop(&queue, Some("hunter2"));
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::Alert { message, .. } if message == "Error: Command not found - sudo."
        )));
    }
}
