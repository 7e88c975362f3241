//! Presentation of [`crate::dispatch::UiEvent`]s.
//!
//! [`Frontend`] is what the [`crate::App`] loop calls on the UI thread.
//! [`Terminal`] renders to the console; tests use the generated mock.
use crate::secret::Secret;
use std::io::{self, BufRead, Write};
use tracing::{error, info, warn};

/// Trait for rendering application events and asking the user questions.
#[cfg_attr(test, mockall::automock)]
pub trait Frontend {
    /// The status line changed.
    fn on_status(&mut self, text: &str);
    /// A message for the application console.
    fn on_console(&mut self, text: &str);
    /// A chunk of command output, usually one line with its terminator.
    fn on_log_line(&mut self, text: &str);
    /// The application entered or left the busy state.
    fn on_busy_changed(&mut self, busy: bool);
    /// Ask for the elevation password. `None` means the user declined.
    fn on_secret_requested(&mut self) -> Option<Secret>;
    /// Show an error that needs the user's attention.
    fn on_alert(&mut self, title: &str, message: &str);
    /// Ask a yes/no question about `items`.
    fn confirm(&mut self, title: &str, items: &[String]) -> bool;
}

/// [`Frontend`] on stdin, stdout and stderr.
///
/// Command output goes to stdout untouched, so it can be piped; everything
/// else goes through `tracing`.
#[derive(Debug, Default)]
pub struct Terminal {
    /// answer yes to every confirmation
    pub assume_yes: bool,
}

impl Terminal {
    #[allow(missing_docs)]
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Frontend for Terminal {
    fn on_status(&mut self, text: &str) {
        info!("{}", text);
    }

    fn on_console(&mut self, text: &str) {
        info!("{}", text);
    }

    fn on_log_line(&mut self, text: &str) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush()) {
            warn!("Unable to write to stdout: {}", e);
        }
    }

    fn on_busy_changed(&mut self, _busy: bool) {}

    fn on_secret_requested(&mut self) -> Option<Secret> {
        match rpassword::prompt_password("[sudo] Administrator password: ") {
            Ok(password) => Some(Secret::new(password)),
            Err(e) => {
                warn!("Password prompt aborted: {}", e);
                None
            }
        }
    }

    fn on_alert(&mut self, title: &str, message: &str) {
        error!("{}: {}", title, message);
    }

    fn confirm(&mut self, title: &str, items: &[String]) -> bool {
        eprintln!("{}", title);
        for item in items {
            eprintln!("  {}", item);
        }
        if self.assume_yes {
            return true;
        }
        eprint!("Proceed? [y/N] ");
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(e) => {
                warn!("Unable to read answer: {}", e);
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
