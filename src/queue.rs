//! Batch package installs and removals, then run them one after the other.
//!
//! A [`PackageQueue`] collects what the user picked. [`PackageQueue::into_chain`]
//! groups the items into at most one job per tool and action, and the
//! resulting [`JobChain`] is drained front to back on a single worker: a job
//! starts only once the previous one has completed, whatever its outcome.
use crate::command::Outcome;
use crate::dispatch::UiEvent;
use crate::packages::Source;
use crate::request::{CommandRequest, Completion, Tag};
use crate::scheduler::Scheduler;
use crate::tools::{flatpak, pacman, yay};
use std::collections::VecDeque;
use std::fmt;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Line appended to the queue output once every job has run.
pub const ALL_DONE: &str = "\n\nAll operations complete.\n";

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    Install,
    Remove,
}

impl fmt::Display for QueueAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueAction::Install => write!(f, "install"),
            QueueAction::Remove => write!(f, "remove"),
        }
    }
}

/// One package waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    #[allow(missing_docs)]
    pub action: QueueAction,
    /// package name, or application id for flatpak
    pub name: String,
    #[allow(missing_docs)]
    pub source: Source,
}

impl fmt::Display for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.action, self.name, self.source)
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("`{0}` is already in the queue")]
    Duplicate(String),
}

/// Packages picked for installation or removal.
#[derive(Debug, Clone, Default)]
pub struct PackageQueue {
    items: Vec<QueueItem>,
}

impl PackageQueue {
    /// Append an item. A package name may only appear once.
    pub fn add(&mut self, action: QueueAction, name: &str, source: Source) -> Result<(), QueueError> {
        if self.items.iter().any(|i| i.name == name) {
            return Err(QueueError::Duplicate(name.to_owned()));
        }
        self.items.push(QueueItem {
            action,
            name: name.to_owned(),
            source,
        });
        Ok(())
    }

    #[allow(missing_docs)]
    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn names(&self, system: bool, action: QueueAction) -> Vec<String> {
        self.items
            .iter()
            .filter(|i| i.source.is_system() == system && i.action == action)
            .map(|i| i.name.clone())
            .collect()
    }

    /// Turn the queue into jobs: system installs, system removals, flatpak
    /// installs from `remote`, flatpak removals. Empty groups are skipped.
    ///
    /// System installs go through the AUR helper as soon as one of them comes
    /// from the AUR, since it also handles repository packages. Otherwise
    /// they go through pacman.
    pub fn into_chain(self, remote: &str) -> JobChain {
        let via_aur = self
            .items
            .iter()
            .any(|i| i.source == Source::Yay && i.action == QueueAction::Install);
        let groups = [
            (true, QueueAction::Install),
            (true, QueueAction::Remove),
            (false, QueueAction::Install),
            (false, QueueAction::Remove),
        ];
        let jobs = groups
            .into_iter()
            .filter_map(|(system, action)| {
                let names = self.names(system, action);
                if names.is_empty() {
                    return None;
                }
                let argv = match (system, action) {
                    (true, QueueAction::Install) if via_aur => yay::install(&names),
                    (true, QueueAction::Install) => pacman::sync_install(&names),
                    (true, QueueAction::Remove) => pacman::sync_remove(&names),
                    (false, QueueAction::Install) => flatpak::install(remote, &names),
                    (false, QueueAction::Remove) => flatpak::uninstall(&names),
                };
                Some(Job {
                    argv,
                    elevate: system,
                })
            })
            .collect();
        JobChain { jobs }
    }
}

/// One command of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// command line, without the elevation prefix
    pub argv: Vec<String>,
    /// whether the job runs through the elevation tool
    pub elevate: bool,
}

impl Job {
    fn request(&self, index: usize) -> CommandRequest {
        CommandRequest::new(self.argv.iter().cloned(), Tag::QueueJob(index))
            .with_elevation(self.elevate)
            .with_busy(false)
            .with_streaming(true)
    }
}

/// What happened to a job once drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    #[allow(missing_docs)]
    pub job: Job,
    #[allow(missing_docs)]
    pub outcome: Outcome,
}

/// Ordered jobs, run strictly one after the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobChain {
    jobs: VecDeque<Job>,
}

impl JobChain {
    /// Chain running `jobs` in order.
    pub fn new(jobs: impl IntoIterator<Item = Job>) -> Self {
        Self {
            jobs: jobs.into_iter().collect(),
        }
    }

    #[allow(missing_docs)]
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drain the chain on its own worker.
    pub fn start(self, scheduler: Scheduler) -> JoinHandle<Vec<JobReport>> {
        thread::spawn(move || self.drain(&scheduler))
    }

    /// Run every job on the calling worker, then announce the end of the
    /// queue with [`ALL_DONE`] and a [`Tag::QueueFinished`] completion.
    ///
    /// A failed or cancelled job does not stop the chain.
    pub fn drain(mut self, scheduler: &Scheduler) -> Vec<JobReport> {
        let dispatcher = scheduler.dispatcher().clone();
        let total = self.jobs.len();
        let mut reports = Vec::with_capacity(total);
        let mut index = 0;
        while let Some(job) = self.jobs.pop_front() {
            info!("Queue job {}/{}: {}", index + 1, total, shell_words::join(&job.argv));
            let completion = scheduler.run_blocking(&job.request(index), |c| {
                debug!("Queue job {} ended: {}", index + 1, c.outcome)
            });
            if !completion.is_success() {
                warn!("Queue job {} ended with {}", index + 1, completion.outcome);
                dispatcher.console(format!(
                    "Queue step {} of {} ended with {}, continuing.",
                    index + 1,
                    total,
                    completion.outcome
                ));
            }
            reports.push(JobReport {
                job,
                outcome: completion.outcome,
            });
            index += 1;
        }
        dispatcher.post(UiEvent::Output {
            tag: Tag::QueueFinished,
            text: ALL_DONE.to_owned(),
        });
        dispatcher.post(UiEvent::Completed(Completion {
            tag: Tag::QueueFinished,
            transcript: String::new(),
            outcome: Outcome::Success,
            from_cache: false,
        }));
        reports
    }
}

#[cfg(test)]
mod should {
    use super::*;
    use crate::cache::Cache;
    use crate::command::{CommandResult, MockCommandRunner};
    use crate::dispatch;
    use crate::secret::Secret;
    use mktemp::Temp;
    use mockall::Sequence;
    use std::sync::Arc;
    use test_log::test; // Automatically trace tests

    fn job(argv: &[&str]) -> Job {
        Job {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            elevate: false,
        }
    }

    #[test]
    fn reject_duplicate_names() {
        let mut queue = PackageQueue::default();
        queue.add(QueueAction::Install, "vim", Source::Pacman).unwrap();
        assert_eq!(
            queue.add(QueueAction::Remove, "vim", Source::Yay),
            Err(QueueError::Duplicate("vim".into()))
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn group_items_by_tool_and_action() {
        let mut queue = PackageQueue::default();
        queue.add(QueueAction::Remove, "nano", Source::Pacman).unwrap();
        queue.add(QueueAction::Install, "org.gimp.GIMP", Source::Flatpak).unwrap();
        queue.add(QueueAction::Install, "vim", Source::Pacman).unwrap();
        queue.add(QueueAction::Install, "paru-bin", Source::Yay).unwrap();
        let chain = queue.into_chain("flathub");
        let jobs: Vec<&Job> = chain.jobs().collect();
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].argv, ["yay", "-S", "--noconfirm", "vim", "paru-bin"]);
        assert!(jobs[0].elevate);
        assert_eq!(jobs[1].argv, ["pacman", "-Rns", "--noconfirm", "nano"]);
        assert!(jobs[1].elevate);
        assert_eq!(
            jobs[2].argv,
            ["flatpak", "install", "flathub", "-y", "--verbose", "org.gimp.GIMP"]
        );
        assert!(!jobs[2].elevate);
    }

    #[test]
    fn install_repository_packages_with_pacman() {
        let mut queue = PackageQueue::default();
        queue.add(QueueAction::Install, "vim", Source::Pacman).unwrap();
        queue.add(QueueAction::Install, "git", Source::Pacman).unwrap();
        let chain = queue.into_chain("flathub");
        let jobs: Vec<&Job> = chain.jobs().collect();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].argv, ["pacman", "-S", "--noconfirm", "vim", "git"]);
        assert!(jobs[0].elevate);
    }

    #[test]
    fn empty_queue_gives_empty_chain() {
        assert!(PackageQueue::default().into_chain("flathub").is_empty());
    }

    #[test]
    fn keep_going_after_a_failure() {
        let mut seq = Sequence::new();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv, _| inv.argv() == ["tool-a"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| CommandResult {
                transcript: "error: target not found: a\n".into(),
                exit_code: 1,
                outcome: Outcome::NonZeroExit,
            });
        runner
            .expect_run()
            .withf(|inv, _| inv.argv() == ["tool-b"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| CommandResult {
                transcript: "installed b\n".into(),
                exit_code: 0,
                outcome: Outcome::Success,
            });
        let temp = Temp::new_dir().unwrap();
        let (dispatcher, events) = dispatch::channel();
        let scheduler = Scheduler::new(
            Arc::new(runner),
            Cache::new(temp.to_path_buf()),
            dispatcher,
            vec!["sudo".into(), "-S".into()],
        );

        let chain = JobChain::new([job(&["tool-a"]), job(&["tool-b"])]);
        let reports = chain.start(scheduler).join().unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].outcome, Outcome::NonZeroExit);
        assert_eq!(reports[1].outcome, Outcome::Success);

        let events: Vec<UiEvent> = events.try_iter().collect();
        let done = events
            .iter()
            .position(|e| matches!(e, UiEvent::Output { tag: Tag::QueueFinished, text } if text == ALL_DONE))
            .expect("end of queue line");
        assert!(matches!(
            &events[done + 1],
            UiEvent::Completed(Completion { tag: Tag::QueueFinished, .. })
        ));
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::Console(s) if s.starts_with("Queue step 1 of 2 ended"))));
        // Queue jobs stream to the console and never lock the whole UI.
        assert!(!events.iter().any(|e| matches!(e, UiEvent::Busy(_))));
    }

    #[test]
    fn keep_going_after_cancelled_elevation() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv, _| inv.argv() == ["flatpak", "uninstall", "-y", "--verbose", "org.gimp.GIMP"])
            .times(1)
            .returning(|_, _| CommandResult {
                transcript: "Uninstalling org.gimp.GIMP\n".into(),
                exit_code: 0,
                outcome: Outcome::Success,
            });
        let temp = Temp::new_dir().unwrap();
        let (dispatcher, events) = dispatch::channel();
        let scheduler = Scheduler::new(
            Arc::new(runner),
            Cache::new(temp.to_path_buf()),
            dispatcher,
            vec!["sudo".into(), "-S".into()],
        );

        let mut queue = PackageQueue::default();
        queue.add(QueueAction::Remove, "nano", Source::Pacman).unwrap();
        queue.add(QueueAction::Remove, "org.gimp.GIMP", Source::Flatpak).unwrap();
        let worker = queue.into_chain("flathub").start(scheduler);

        // Decline the password prompt of the elevated job.
        loop {
            match events.recv().unwrap() {
                UiEvent::SecretRequested(reply) => {
                    reply.send(None::<Secret>);
                }
                UiEvent::Completed(Completion {
                    tag: Tag::QueueFinished,
                    ..
                }) => break,
                _ => {}
            }
        }
        let reports = worker.join().unwrap();
        assert_eq!(reports[0].outcome, Outcome::Cancelled);
        assert_eq!(reports[1].outcome, Outcome::Success);
    }
}
