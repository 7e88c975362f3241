//! Package model shared by the system (pacman/yay) and flatpak back-ends.
//!
//! Only the listings needed to refresh the application state are parsed
//! here: installed packages and packages with an available update.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Package source.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Official repositories through `pacman`
    Pacman,
    /// Arch User Repository through `yay`
    Yay,
    /// Flatpak applications
    Flatpak,
}

impl Source {
    /// Name used in cache keys and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Pacman => "pacman",
            Source::Yay => "yay",
            Source::Flatpak => "flatpak",
        }
    }

    /// `true` for pacman and yay packages.
    pub fn is_system(&self) -> bool {
        !matches!(self, Source::Flatpak)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source specific package data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageDetail {
    /// pacman or yay package
    System {
        /// installed or available version
        version: String,
    },
    /// flatpak application
    Flatpak {
        /// human readable name
        friendly_name: String,
        /// reverse DNS application id, e.g. `org.gnome.Calculator`
        app_id: String,
        /// application version
        version: String,
        /// installed size as reported by flatpak
        size: String,
    },
}

/// A package known to one of the back-ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Identifier passed back to the package tool (app id for flatpak).
    pub name: String,
    /// Where the package comes from.
    pub source: Source,
    /// Whether the package is currently installed.
    pub installed: bool,
    /// Source specific data.
    pub detail: PackageDetail,
}

impl Package {
    /// Version, whatever the source.
    pub fn version(&self) -> &str {
        match &self.detail {
            PackageDetail::System { version } | PackageDetail::Flatpak { version, .. } => version,
        }
    }
}

/// Parse the output of `pacman -Q` (`name version` per line).
pub fn parse_installed_system(output: &str) -> Vec<Package> {
    let mut packages: Vec<Package> = output
        .lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            let name = words.next()?;
            let version = words.next()?;
            Some(Package {
                name: name.to_owned(),
                source: Source::Pacman,
                installed: true,
                detail: PackageDetail::System {
                    version: version.to_owned(),
                },
            })
        })
        .collect();
    sort_by_name(&mut packages);
    packages
}

/// Parse the output of
/// `flatpak list --app --columns=name,application,version,branch,installation,size`.
///
/// Lines with fewer than six tab separated columns are skipped.
pub fn parse_installed_flatpak(output: &str) -> Vec<Package> {
    let mut packages: Vec<Package> = output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 6 {
                return None;
            }
            Some(Package {
                name: parts[1].to_owned(),
                source: Source::Flatpak,
                installed: true,
                detail: PackageDetail::Flatpak {
                    friendly_name: parts[0].to_owned(),
                    app_id: parts[1].to_owned(),
                    version: parts[2].to_owned(),
                    size: parts[5].to_owned(),
                },
            })
        })
        .collect();
    sort_by_name(&mut packages);
    packages
}

/// Parse the output of `yay -Qu` (`name old -> new` per line).
pub fn parse_upgradable_system(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_owned)
        .collect()
}

/// Parse the output of `flatpak remote-ls --updates`; the application id is
/// the second tab separated column.
pub fn parse_upgradable_flatpak(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter_map(|line| line.split('\t').nth(1))
        .map(|id| id.trim().to_owned())
        .filter(|id| !id.is_empty())
        .collect()
}

fn sort_by_name(packages: &mut [Package]) {
    packages.sort_by_key(|p| p.name.to_lowercase());
}
