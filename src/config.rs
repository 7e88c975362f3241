//! Command line arguments, configuration file merging and validated configuration.
use ::structopt::clap::AppSettings;
use anyhow::{bail, Context, Result};
use directories_next::ProjectDirs;
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use structopt::StructOpt;
use thiserror::Error;
use tracing::debug;

/// Elevation wrapper used when none is configured. `-S` makes sudo read the
/// password from its standard input.
pub const DEFAULT_ELEVATION_COMMAND: &str = "sudo -S";
/// Flatpak remote used for installs when none is configured.
pub const DEFAULT_FLATPAK_REMOTE: &str = "flathub";

/// Which package back-end the commands are driving.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// pacman, plus yay for the AUR
    #[default]
    System,
    /// flatpak applications
    Flatpak,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::System => write!(f, "System"),
            Mode::Flatpak => write!(f, "Flatpak"),
        }
    }
}

/// Error specific to configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The mode is neither `system` nor `flatpak`.
    #[error("Unknown mode `{0}` (expected `system` or `flatpak`)")]
    UnknownMode(String),
    /// The elevation command split into nothing.
    #[error("`elevation_command` is empty")]
    EmptyElevation,
}

impl FromStr for Mode {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" | "pacman" => Ok(Mode::System),
            "flatpak" => Ok(Mode::Flatpak),
            _ => Err(ConfigError::UnknownMode(s.to_owned())),
        }
    }
}

/// `-v`/`-q` occurrence counters.
#[derive(StructOpt, Debug, Clone, Default)]
pub struct Verbosity {
    /// Increase the output's verbosity level
    ///
    /// Once for debug, twice for trace.
    #[structopt(
        long = "verbose",
        short = "v",
        parse(from_occurrences),
        conflicts_with = "quiet",
        global = true
    )]
    verbose: u8,

    /// Decrease the output's verbosity level
    ///
    /// Once hides info, twice hides warnings, three times silences the log.
    #[structopt(long = "quiet", short = "q", parse(from_occurrences), global = true)]
    quiet: u8,
}

impl Verbosity {
    /// Filter directive understood by `tracing_subscriber::EnvFilter`.
    pub fn get_level_filter(&self) -> &'static str {
        match i16::from(self.verbose.min(2)) - i16::from(self.quiet.min(3)) {
            i16::MIN..=-3 => "off",
            -2 => "error",
            -1 => "warn",
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// What to do once the configuration is loaded.
#[derive(StructOpt, Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// List installed packages, flagging the ones with an update
    Installed,
    /// Search the repositories (system mode) or the flatpak remotes
    Search {
        /// words to look for
        #[structopt(required = true)]
        query: Vec<String>,
    },
    /// Show detailed information about a package
    Info {
        /// package name, or application id in flatpak mode
        package: String,
        /// flatpak remote to query when the application is not installed
        #[structopt(long)]
        remote: Option<String>,
    },
    /// List package groups, or the members of `group`
    Groups {
        /// group whose members are listed
        group: Option<String>,
    },
    /// List packages with an available update
    Upgradable,
    /// Update every package of the current mode
    Update,
    /// Queue installs and removals, then run them one batch at a time
    Queue {
        /// system packages to install
        #[structopt(long, short = "i")]
        install: Vec<String>,
        /// system packages to remove
        #[structopt(long, short = "r")]
        remove: Vec<String>,
        /// flatpak applications to install
        #[structopt(long)]
        flatpak_install: Vec<String>,
        /// flatpak applications to remove
        #[structopt(long)]
        flatpak_remove: Vec<String>,
    },
}

#[derive(structopt::StructOpt, Serialize, Deserialize, Debug)]
/// Run pacman, yay and flatpak commands with caching and live output
///
/// Query results are cached on disk and replayed until `--refresh` is given.
/// Privileged operations ask for the administrator password once per command
/// and feed it to the elevation tool.
#[structopt(global_settings(&[AppSettings::ColoredHelp, AppSettings::ColorAuto]))]
pub struct Args {
    /// package back-end: `system` or `flatpak`
    #[serde(skip_serializing_if = "Option::is_none")]
    #[structopt(short, long, env = "APM_MODE")]
    pub mode: Option<Mode>,

    /// use the AUR helper (yay) for searches and package info
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    #[structopt(long)]
    pub aur: bool,

    /// directory for cached command output
    ///
    /// Will use `$XDG_CACHE_HOME/apm_cache` if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[structopt(long, env = "APM_CACHE_DIR", parse(from_os_str))]
    pub cache_dir: Option<PathBuf>,

    /// command prefix used to elevate privileged commands
    ///
    /// It must read the password from its standard input.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[structopt(long, env = "APM_ELEVATION_COMMAND")]
    pub elevation_command: Option<String>,

    /// flatpak remote used to install applications
    #[serde(skip_serializing_if = "Option::is_none")]
    #[structopt(long)]
    pub flatpak_remote: Option<String>,

    /// ignore cached results and run the commands again
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    #[structopt(long)]
    pub refresh: bool,

    /// do not ask for confirmation before updating
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    #[structopt(long, short)]
    pub yes: bool,

    /// configuration file
    ///
    /// Defaults to `config.toml` in the user configuration directory.
    #[serde(skip)]
    #[structopt(long, short, parse(from_os_str))]
    pub config: Option<PathBuf>,

    #[allow(missing_docs)]
    #[structopt(flatten)]
    #[serde(skip)]
    pub verbose: Verbosity,

    #[allow(missing_docs)]
    #[structopt(subcommand)]
    #[serde(skip)]
    pub action: Option<Action>,
}

impl Default for Args {
    fn default() -> Args {
        let res = Args {
            mode: Some(Mode::System),
            aur: false,
            cache_dir: ProjectDirs::from("", "", "apm_cache").map(|d| d.cache_dir().to_owned()),
            elevation_command: Some(DEFAULT_ELEVATION_COMMAND.into()),
            flatpak_remote: Some(DEFAULT_FLATPAK_REMOTE.into()),
            refresh: false,
            yes: false,
            config: None,
            verbose: Verbosity::default(),
            action: None,
        };
        debug!("Args::default : {:#?}", res);
        res
    }
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// package back-end
    pub mode: Mode,
    /// use yay for searches and package info
    pub aur: bool,
    /// cache directory
    pub cache_dir: PathBuf,
    /// elevation prefix, e.g. `["sudo", "-S"]`
    pub elevation: Vec<String>,
    /// flatpak remote for installs
    pub flatpak_remote: String,
    /// bypass the cache
    pub refresh: bool,
    /// skip confirmations
    pub yes: bool,
}

/// Default location of the configuration file.
pub fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", "apmrunner").map(|d| d.config_dir().join("config.toml"))
}

impl Args {
    /// Merge configuration: defaults → configuration file → command line.
    ///
    /// `action`, `config` and `verbose` only come from the command line.
    pub fn with_config_file(self, file: Option<&Path>) -> Result<Args> {
        let mut figment = Figment::from(Serialized::defaults(Args::default()));
        if let Some(file) = file {
            debug!("Reading configuration from {:?}", file);
            figment = figment.merge(Toml::file(file));
        }
        let mut merged: Args = figment
            .merge(Serialized::defaults(&self))
            .extract()
            .context("Merging configuration file and command line")?;
        merged.config = self.config;
        merged.verbose = self.verbose;
        merged.action = self.action;
        debug!("Merge config and parameters : {:#?}", merged);
        Ok(merged)
    }

    /// Check the merged arguments and build an [`AppConfig`].
    pub fn validate(&self) -> Result<AppConfig> {
        let cache_dir = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => bail!("No `cache_dir` configured and no home directory found"),
        };
        let elevation_command = self
            .elevation_command
            .as_deref()
            .unwrap_or(DEFAULT_ELEVATION_COMMAND);
        let elevation = shell_words::split(elevation_command)
            .with_context(|| format!("Parsing elevation command `{}`", elevation_command))?;
        if elevation.is_empty() {
            return Err(ConfigError::EmptyElevation.into());
        }
        Ok(AppConfig {
            mode: self.mode.unwrap_or_default(),
            aur: self.aur,
            cache_dir,
            elevation,
            flatpak_remote: self
                .flatpak_remote
                .clone()
                .unwrap_or_else(|| DEFAULT_FLATPAK_REMOTE.into()),
            refresh: self.refresh,
            yes: self.yes,
        })
    }
}

#[cfg(test)]
mod should {
    use super::*;
    use anyhow::anyhow;
    use mktemp::Temp;
    use std::fs;

    #[test]
    fn parse_modes() {
        assert_eq!("Flatpak".parse(), Ok(Mode::Flatpak));
        assert_eq!("system".parse(), Ok(Mode::System));
        assert_eq!(
            "snap".parse::<Mode>(),
            Err(ConfigError::UnknownMode("snap".into()))
        );
    }

    #[test]
    fn map_occurrences_to_level() {
        let level = |verbose, quiet| Verbosity { verbose, quiet }.get_level_filter();
        assert_eq!(level(0, 0), "info");
        assert_eq!(level(1, 0), "debug");
        assert_eq!(level(5, 0), "trace");
        assert_eq!(level(0, 1), "warn");
        assert_eq!(level(0, 2), "error");
        assert_eq!(level(0, 9), "off");
    }

    #[test]
    fn validate_defaults() -> Result<()> {
        let args = Args {
            cache_dir: Some("/tmp/apm".into()),
            ..Default::default()
        };
        let config = args.validate()?;
        assert_eq!(config.mode, Mode::System);
        assert_eq!(config.elevation, vec!["sudo", "-S"]);
        assert_eq!(config.flatpak_remote, "flathub");
        assert!(!config.refresh);
        Ok(())
    }

    #[test]
    fn error_when_elevation_is_blank() -> Result<()> {
        let args = Args {
            cache_dir: Some("/tmp/apm".into()),
            elevation_command: Some("   ".into()),
            ..Default::default()
        };
        match args.validate() {
            Ok(_) => Err(anyhow!("Expected an error")),
            Err(e) => {
                assert_eq!(e.to_string(), "`elevation_command` is empty");
                Ok(())
            }
        }
    }

    #[test]
    fn error_when_cache_dir_is_none() {
        let args = Args {
            cache_dir: None,
            ..Default::default()
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn command_line_overrides_config_file() -> Result<()> {
        let temp = Temp::new_dir()?;
        let file = temp.as_path().join("config.toml");
        fs::write(
            &file,
            "mode = \"flatpak\"\naur = true\nflatpak_remote = \"fedora\"\n",
        )?;
        let cli = Args {
            mode: None,
            aur: false,
            cache_dir: None,
            elevation_command: None,
            flatpak_remote: Some("gnome-nightly".into()),
            refresh: true,
            yes: false,
            config: Some(file.clone()),
            verbose: Verbosity::default(),
            action: Some(Action::Update),
        };
        let merged = cli.with_config_file(Some(&file))?;
        assert_eq!(merged.mode, Some(Mode::Flatpak));
        assert!(merged.aur);
        assert!(merged.refresh);
        assert_eq!(merged.flatpak_remote.as_deref(), Some("gnome-nightly"));
        assert_eq!(merged.elevation_command.as_deref(), Some("sudo -S"));
        assert_eq!(merged.action, Some(Action::Update));
        Ok(())
    }
}
