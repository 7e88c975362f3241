//! Command lines of the package tools, and the requests built from them.
//!
//! Queries get a cache key so their output can be replayed; anything that
//! changes the system is never cached.
use crate::config::Mode;
use crate::packages::Source;
use crate::request::{CommandRequest, Tag};

const PACMAN: &str = "pacman";
const YAY: &str = "yay";
const FLATPAK: &str = "flatpak";

/// Columns asked to `flatpak list` for installed applications.
pub const FLATPAK_INSTALLED_COLUMNS: &str =
    "--columns=name,application,version,branch,installation,size";
/// Columns asked to `flatpak remote-ls` when searching.
pub const FLATPAK_SEARCH_COLUMNS: &str =
    "--columns=name,description,application,version,installed-size,origin";

fn argv<'a>(program: &'a str, args: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    std::iter::once(program)
        .chain(args)
        .map(str::to_owned)
        .collect()
}

fn with_packages(mut argv: Vec<String>, packages: &[String]) -> Vec<String> {
    argv.extend(packages.iter().cloned());
    argv
}

/// System package tool (`pacman`).
pub mod pacman {
    use super::*;

    /// `pacman -Q`
    pub fn query_installed() -> Vec<String> {
        argv(PACMAN, ["-Q"])
    }
    /// `pacman -Ss <query>`
    pub fn search(query: &str) -> Vec<String> {
        argv(PACMAN, ["-Ss", query])
    }
    /// `pacman -Si <package>`
    pub fn info(package: &str) -> Vec<String> {
        argv(PACMAN, ["-Si", package])
    }
    /// `pacman -S --noconfirm <packages>`
    pub fn sync_install(packages: &[String]) -> Vec<String> {
        with_packages(argv(PACMAN, ["-S", "--noconfirm"]), packages)
    }
    /// `pacman -Rns --noconfirm <packages>`
    pub fn sync_remove(packages: &[String]) -> Vec<String> {
        with_packages(argv(PACMAN, ["-Rns", "--noconfirm"]), packages)
    }
    /// `pacman -Syu --noconfirm`
    pub fn sync_update() -> Vec<String> {
        argv(PACMAN, ["-Syu", "--noconfirm"])
    }
    /// `pacman -Sg`
    pub fn list_groups() -> Vec<String> {
        argv(PACMAN, ["-Sg"])
    }
    /// `pacman -Sgq <group>`
    pub fn group_members(group: &str) -> Vec<String> {
        argv(PACMAN, ["-Sgq", group])
    }
}

/// AUR helper (`yay`).
pub mod yay {
    use super::*;

    /// `yay -Ss <query>`
    pub fn search(query: &str) -> Vec<String> {
        argv(YAY, ["-Ss", query])
    }
    /// `yay -Si <package>`
    pub fn info(package: &str) -> Vec<String> {
        argv(YAY, ["-Si", package])
    }
    /// `yay -S --noconfirm <packages>`
    pub fn install(packages: &[String]) -> Vec<String> {
        with_packages(argv(YAY, ["-S", "--noconfirm"]), packages)
    }
    /// `yay -Qu`
    pub fn query_upgradable() -> Vec<String> {
        argv(YAY, ["-Qu"])
    }
}

/// Desktop application tool (`flatpak`).
pub mod flatpak {
    use super::*;

    /// `flatpak list --app --columns=…`
    pub fn list_installed() -> Vec<String> {
        argv(FLATPAK, ["list", "--app", FLATPAK_INSTALLED_COLUMNS])
    }
    /// `flatpak remote-ls --app --columns=…`
    pub fn search_remote() -> Vec<String> {
        argv(FLATPAK, ["remote-ls", "--app", FLATPAK_SEARCH_COLUMNS])
    }
    /// `flatpak info <app>`
    pub fn info_installed(app_id: &str) -> Vec<String> {
        argv(FLATPAK, ["info", app_id])
    }
    /// `flatpak remote-info <remote> <app>`
    pub fn info_remote(remote: &str, app_id: &str) -> Vec<String> {
        argv(FLATPAK, ["remote-info", remote, app_id])
    }
    /// `flatpak install <remote> -y --verbose <apps>`
    pub fn install(remote: &str, app_ids: &[String]) -> Vec<String> {
        with_packages(argv(FLATPAK, ["install", remote, "-y", "--verbose"]), app_ids)
    }
    /// `flatpak uninstall -y --verbose <apps>`
    pub fn uninstall(app_ids: &[String]) -> Vec<String> {
        with_packages(argv(FLATPAK, ["uninstall", "-y", "--verbose"]), app_ids)
    }
    /// `flatpak update -y --verbose`
    pub fn update() -> Vec<String> {
        argv(FLATPAK, ["update", "-y", "--verbose"])
    }
    /// `flatpak remote-ls --updates`
    pub fn query_upgradable() -> Vec<String> {
        argv(FLATPAK, ["remote-ls", "--updates"])
    }
}

/// Source whose installed list is shown in `mode`.
pub fn installed_source(mode: Mode) -> Source {
    match mode {
        Mode::System => Source::Pacman,
        Mode::Flatpak => Source::Flatpak,
    }
}

/// Installed package list, cached per source.
pub fn installed(mode: Mode, force_refresh: bool) -> CommandRequest {
    let source = installed_source(mode);
    let argv = match mode {
        Mode::System => pacman::query_installed(),
        Mode::Flatpak => flatpak::list_installed(),
    };
    CommandRequest::new(argv, Tag::Installed(source))
        .with_cache_key(format!("installed_{}.cache", source))
        .with_force_refresh(force_refresh)
}

fn upgradable_argv(mode: Mode) -> Vec<String> {
    match mode {
        Mode::System => yay::query_upgradable(),
        Mode::Flatpak => flatpak::query_upgradable(),
    }
}

/// Packages with an update, never taken from the cache.
pub fn upgradable(mode: Mode) -> CommandRequest {
    CommandRequest::new(upgradable_argv(mode), Tag::Upgradable(mode)).with_force_refresh(true)
}

/// Same listing as [`upgradable`], to decide whether to offer an update.
pub fn update_check(mode: Mode) -> CommandRequest {
    CommandRequest::new(upgradable_argv(mode), Tag::UpdateCheck(mode)).with_force_refresh(true)
}

/// Full update, elevated in system mode, with live output.
pub fn update(mode: Mode) -> CommandRequest {
    let argv = match mode {
        Mode::System => pacman::sync_update(),
        Mode::Flatpak => flatpak::update(),
    };
    CommandRequest::new(argv, Tag::Update(mode))
        .with_elevation(mode == Mode::System)
        .with_force_refresh(true)
        .with_busy(false)
        .with_streaming(true)
}

/// Search request. Flatpak lists the whole remote, filtering is left to the
/// caller, and the listing is not cached.
pub fn search(mode: Mode, aur: bool, query: &str) -> CommandRequest {
    match mode {
        Mode::System => {
            let (argv, source) = if aur {
                (yay::search(query), Source::Yay)
            } else {
                (pacman::search(query), Source::Pacman)
            };
            CommandRequest::new(
                argv,
                Tag::Search {
                    source,
                    query: query.to_owned(),
                },
            )
            .with_cache_key(format!("{}_{}.cache", source, query))
        }
        Mode::Flatpak => CommandRequest::new(
            flatpak::search_remote(),
            Tag::Search {
                source: Source::Flatpak,
                query: query.to_owned(),
            },
        ),
    }
}

/// Package details. In flatpak mode `remote` selects `remote-info` for an
/// application that is not installed.
pub fn info(mode: Mode, aur: bool, package: &str, remote: Option<&str>) -> CommandRequest {
    let (argv, source) = match (mode, remote) {
        // Remote names cannot contain `/`, which delimits them in the key.
        (Mode::Flatpak, Some(remote)) => (
            flatpak::info_remote(remote, package),
            format!("flatpak-remote/{}/", remote),
        ),
        (Mode::Flatpak, None) => (flatpak::info_installed(package), "flatpak".to_owned()),
        (Mode::System, _) if aur => (yay::info(package), "yay".to_owned()),
        (Mode::System, _) => (pacman::info(package), "pacman".to_owned()),
    };
    CommandRequest::new(argv, Tag::Info(package.to_owned()))
        .with_cache_key(format!("info_{}_{}.cache", source, package))
}

/// Package group names.
pub fn groups() -> CommandRequest {
    CommandRequest::new(pacman::list_groups(), Tag::Groups).with_cache_key("pacman_groups.cache")
}

/// Members of `group`.
pub fn group_members(group: &str) -> CommandRequest {
    CommandRequest::new(pacman::group_members(group), Tag::GroupMembers(group.to_owned()))
        .with_cache_key(format!("group_{}.cache", group))
}
