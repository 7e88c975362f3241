//! What callers hand to the [`crate::Scheduler`] and what they get back.
use crate::command::{CommandResult, Outcome};
use crate::config::Mode;
use crate::packages::Source;
use std::fmt;

/// Tells the UI thread which operation a completion or an output line
/// belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// installed package list of a source
    Installed(Source),
    /// packages with an update, refreshing state
    Upgradable(Mode),
    /// search results
    Search {
        /// source that was searched
        source: Source,
        /// the query, used to filter flatpak listings
        query: String,
    },
    /// package details
    Info(String),
    /// package group names
    Groups,
    /// members of a package group
    GroupMembers(String),
    /// packages with an update, before asking to update
    UpdateCheck(Mode),
    /// full system or flatpak update
    Update(Mode),
    /// one job of a package queue, by position
    QueueJob(usize),
    /// the package queue has been drained
    QueueFinished,
}

/// A command to run, with its caching and elevation policy.
///
/// Built once with the `with_*` methods, then handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    argv: Vec<String>,
    tag: Tag,
    cache_key: Option<String>,
    force_refresh: bool,
    elevate: bool,
    set_busy: bool,
    stream_output: bool,
}

impl CommandRequest {
    /// Request running `argv` (program first). Not cached, not elevated,
    /// marks the UI busy, does not stream output.
    pub fn new<I, S>(argv: I, tag: Tag) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            tag,
            cache_key: None,
            force_refresh: false,
            elevate: false,
            set_busy: true,
            stream_output: false,
        }
    }

    /// Cache a successful transcript under `key`, and reuse it later.
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Run even when a cached transcript exists.
    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Run through the elevation tool, asking the user for a password.
    pub fn with_elevation(mut self, elevate: bool) -> Self {
        self.elevate = elevate;
        self
    }

    /// Whether the whole UI is marked busy while the command runs.
    pub fn with_busy(mut self, set_busy: bool) -> Self {
        self.set_busy = set_busy;
        self
    }

    /// Forward each output line to the UI as it arrives.
    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream_output = stream;
        self
    }

    #[allow(missing_docs)]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }
    #[allow(missing_docs)]
    pub fn tag(&self) -> &Tag {
        &self.tag
    }
    #[allow(missing_docs)]
    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }
    #[allow(missing_docs)]
    pub fn force_refresh(&self) -> bool {
        self.force_refresh
    }
    #[allow(missing_docs)]
    pub fn elevate(&self) -> bool {
        self.elevate
    }
    #[allow(missing_docs)]
    pub fn set_busy(&self) -> bool {
        self.set_busy
    }
    #[allow(missing_docs)]
    pub fn stream_output(&self) -> bool {
        self.stream_output
    }
}

impl fmt::Display for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_words::join(&self.argv))
    }
}

/// Result of a request as seen by the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// tag of the originating request
    pub tag: Tag,
    /// merged stdout and stderr, or the cached text
    pub transcript: String,
    /// how the command ended
    pub outcome: Outcome,
    /// `true` when no process was spawned because of a cache hit
    pub from_cache: bool,
}

impl Completion {
    /// Completion replaying a cached transcript.
    pub fn cached(tag: Tag, transcript: String) -> Self {
        Self {
            tag,
            transcript,
            outcome: Outcome::Success,
            from_cache: true,
        }
    }

    /// Completion of a request whose elevation prompt was declined.
    pub fn cancelled(tag: Tag) -> Self {
        Self {
            tag,
            transcript: String::new(),
            outcome: Outcome::Cancelled,
            from_cache: false,
        }
    }

    /// Completion of a process that ran.
    pub fn executed(tag: Tag, result: CommandResult) -> Self {
        Self {
            tag,
            transcript: result.transcript,
            outcome: result.outcome,
            from_cache: false,
        }
    }

    #[allow(missing_docs)]
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}
