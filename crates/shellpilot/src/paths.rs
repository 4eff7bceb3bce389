//! Semantic location resolver.
//!
//! Maps free-text destination hints onto concrete directories across
//! the host/guest filesystem split: keyword aliases resolve to known
//! folders, Windows absolute paths translate to their `/mnt/<drive>`
//! equivalents, and anything else is treated as a native path anchored
//! at the user's home. Also discovers (or creates) the persistent
//! workspace root, identified by a marker file.
//!
//! Known-folder lookup is layered so the resolver behaves the same
//! whether it runs inside WSL with a browsable `C:\Users` tree or
//! standalone on a plain Linux host:
//! 1. WSL: the most plausible Windows profile's subfolder, if present.
//! 2. Native: `~/.config/user-dirs.dirs` with variable expansion.
//! 3. Fallback: `~/<Capitalized>` (e.g. `~/Downloads`).

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

/// Name of the persistent workspace directory.
pub const WORKSPACE_DIR: &str = "ShellPilot";
/// Hidden subdirectory holding the workspace marker.
pub const MARKER_SUBDIR: &str = ".shellpilot";
/// Marker file whose existence identifies the canonical workspace.
pub const MARKER_FILE: &str = "home.json";

/// Windows profile names that never belong to a real user.
const SYSTEM_PROFILES: &[&str] = &["Public", "Default", "Default User", "All Users"];

/// Known-folder categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Desktop,
    Documents,
    Downloads,
    Pictures,
    Music,
    Videos,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Desktop,
        Category::Documents,
        Category::Downloads,
        Category::Pictures,
        Category::Music,
        Category::Videos,
    ];

    /// Locale-aware alias set (English + French), matched lowercase.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Category::Desktop => &["desktop", "bureau"],
            Category::Documents => &["documents", "docs"],
            Category::Downloads => &[
                "downloads",
                "download",
                "telechargements",
                "téléchargements",
                "dl",
            ],
            Category::Pictures => &["pictures", "images", "photos"],
            Category::Music => &["music", "musique"],
            Category::Videos => &["videos", "vidéos", "video", "vidéo"],
        }
    }

    /// Subfolder name under a Windows user profile. Doubles as the
    /// native fallback directory name under `$HOME`.
    pub fn subdir(self) -> &'static str {
        match self {
            Category::Desktop => "Desktop",
            Category::Documents => "Documents",
            Category::Downloads => "Downloads",
            Category::Pictures => "Pictures",
            Category::Music => "Music",
            Category::Videos => "Videos",
        }
    }

    /// Key in `user-dirs.dirs` (`XDG_<key>_DIR`).
    fn xdg_key(self) -> &'static str {
        match self {
            Category::Desktop => "DESKTOP",
            Category::Documents => "DOCUMENTS",
            Category::Downloads => "DOWNLOAD",
            Category::Pictures => "PICTURES",
            Category::Music => "MUSIC",
            Category::Videos => "VIDEOS",
        }
    }

    /// Match a lowercased hint against every category's alias set.
    pub fn from_alias(hint: &str) -> Option<Category> {
        let low = hint.to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.aliases().contains(&low.as_str()))
    }
}

/// Host state the resolver works against. Detected once at startup;
/// tests construct it directly against temp directories.
#[derive(Debug, Clone)]
pub struct HostEnv {
    /// The user's home directory.
    pub home: PathBuf,
    /// Root of the mounted Windows profile tree (`/mnt/c/Users`).
    pub users_root: PathBuf,
    /// Whether we are running nested inside WSL.
    pub wsl: bool,
    /// `USERPROFILE`, when forwarded from Windows.
    pub user_profile: Option<String>,
    /// `USERNAME`, when forwarded from Windows.
    pub user_name: Option<String>,
}

impl HostEnv {
    /// Probe the real host.
    pub fn detect() -> Self {
        Self {
            home: std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/")),
            users_root: PathBuf::from("/mnt/c/Users"),
            wsl: is_wsl(),
            user_profile: std::env::var("USERPROFILE").ok(),
            user_name: std::env::var("USERNAME").ok(),
        }
    }
}

/// Whether `/proc/version` identifies a WSL kernel.
pub fn is_wsl() -> bool {
    match std::fs::read_to_string("/proc/version") {
        Ok(v) => {
            let low = v.to_lowercase();
            low.contains("microsoft") || low.contains("wsl")
        }
        Err(_) => false,
    }
}

/// Translate a Windows absolute path (`C:\a\b`) into its WSL mount
/// equivalent (`/mnt/c/a/b`). Non-Windows paths pass through untouched.
pub fn win_to_wsl_path(p: &str) -> String {
    let re = Regex::new(r"^([A-Za-z]):\\(.*)$").expect("static regex");
    match re.captures(p) {
        Some(caps) => {
            let drive = caps[1].to_lowercase();
            let rest = caps[2].replace('\\', "/");
            format!("/mnt/{drive}/{rest}")
        }
        None => p.to_string(),
    }
}

fn is_windows_abs(p: &str) -> bool {
    let bytes = p.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'\\'
}

/// The location resolver. Holds only detected host state; every lookup
/// is a pure function of hint + host filesystem.
#[derive(Debug, Clone)]
pub struct PathResolver {
    host: HostEnv,
}

impl PathResolver {
    pub fn new(host: HostEnv) -> Self {
        Self { host }
    }

    /// Resolver against the real host.
    pub fn detect() -> Self {
        Self::new(HostEnv::detect())
    }

    /// Resolve a destination hint to an absolute directory.
    ///
    /// Empty hints and anything unresolvable degrade to the workspace
    /// root; this function never fails.
    pub fn resolve_hint(&self, hint: &str) -> PathBuf {
        let h = hint.trim().trim_matches('"').trim_matches('\'');
        if h.is_empty() {
            return self.find_workspace_root();
        }
        if let Some(cat) = Category::from_alias(h) {
            return self.known_folder(cat);
        }
        let translated = if is_windows_abs(h) {
            win_to_wsl_path(h)
        } else {
            h.to_string()
        };
        let expanded = self.expand(&translated);
        let p = PathBuf::from(expanded);
        if p.is_absolute() {
            p
        } else {
            self.host.home.join(p)
        }
    }

    /// Resolve a known-folder category through the layered lookup.
    pub fn known_folder(&self, cat: Category) -> PathBuf {
        if self.host.wsl && self.host.users_root.is_dir() {
            if let Some(user) = self.likely_windows_user() {
                let p = self.host.users_root.join(&user).join(cat.subdir());
                if p.is_dir() {
                    return p;
                }
            }
        }
        self.xdg_user_dir(cat)
    }

    /// Discover or create the persistent workspace root.
    ///
    /// Search order: `<desktop>/ShellPilot`, `~/ShellPilot`, then every
    /// Windows profile's `Desktop/ShellPilot`; the first directory
    /// carrying the marker wins. When none exists, a fresh workspace is
    /// initialized on the desktop so reinvocations rediscover it
    /// instead of proliferating copies.
    pub fn find_workspace_root(&self) -> PathBuf {
        let desktop = self.known_folder(Category::Desktop);
        let candidates = [
            desktop.join(WORKSPACE_DIR),
            self.host.home.join(WORKSPACE_DIR),
        ];
        for c in &candidates {
            if has_marker(c) {
                return c.clone();
            }
        }

        if let Ok(entries) = std::fs::read_dir(&self.host.users_root) {
            for entry in entries.flatten() {
                let c = entry.path().join("Desktop").join(WORKSPACE_DIR);
                if has_marker(&c) {
                    return c;
                }
            }
        }

        let workspace = desktop.join(WORKSPACE_DIR);
        let marker_dir = workspace.join(MARKER_SUBDIR);
        if let Err(e) = std::fs::create_dir_all(&marker_dir) {
            warn!(
                workspace = %workspace.display(),
                "Failed to initialize workspace: {e}"
            );
            return workspace;
        }
        let marker = marker_dir.join(MARKER_FILE);
        if !marker.exists() {
            let body = serde_json::json!({
                "created_at": chrono::Utc::now().to_rfc3339(),
            });
            if let Err(e) = std::fs::write(&marker, body.to_string()) {
                warn!(marker = %marker.display(), "Failed to write workspace marker: {e}");
            }
        }
        debug!(workspace = %workspace.display(), "Initialized fresh workspace");
        workspace
    }

    /// The most plausible Windows user for known-folder mapping.
    ///
    /// Explicit environment override first (`USERPROFILE`, then
    /// `USERNAME`), else the profile whose `Desktop` was modified most
    /// recently, else the first profile found. The mtime heuristic is
    /// host-state-dependent; ties go to enumeration order.
    pub fn likely_windows_user(&self) -> Option<String> {
        if let Some(up) = &self.host.user_profile {
            let re = Regex::new(r"^[A-Za-z]:\\Users\\([^\\]+)").expect("static regex");
            if let Some(caps) = re.captures(up) {
                return Some(caps[1].to_string());
            }
        }
        if let Some(un) = &self.host.user_name {
            if !un.is_empty() && !SYSTEM_PROFILES.contains(&un.as_str()) {
                return Some(un.clone());
            }
        }

        let users = self.candidate_windows_users();
        let mut best: Option<(String, std::time::SystemTime)> = None;
        for u in &users {
            let desktop = self.host.users_root.join(u).join("Desktop");
            if !desktop.is_dir() {
                continue;
            }
            let mtime = std::fs::metadata(&desktop)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            match &best {
                Some((_, t)) if *t >= mtime => {}
                _ => best = Some((u.clone(), mtime)),
            }
        }
        best.map(|(u, _)| u).or_else(|| users.into_iter().next())
    }

    fn candidate_windows_users(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.host.users_root) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if SYSTEM_PROFILES.contains(&name.as_str()) {
                continue;
            }
            if entry.path().is_dir() {
                out.push(name);
            }
        }
        out.sort();
        out
    }

    /// Native known-folder lookup via `user-dirs.dirs`, with the fixed
    /// `~/<Capitalized>` fallback.
    fn xdg_user_dir(&self, cat: Category) -> PathBuf {
        let cfg = self.host.home.join(".config").join("user-dirs.dirs");
        if let Ok(body) = std::fs::read_to_string(&cfg) {
            let prefix = format!("XDG_{}_DIR", cat.xdg_key());
            for line in body.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some(rest) = line.strip_prefix(&prefix) {
                    let Some(raw) = rest.split('=').nth(1) else {
                        continue;
                    };
                    let val = raw.trim().trim_matches('"');
                    let val = val.replace("$HOME", &self.host.home.to_string_lossy());
                    return PathBuf::from(self.expand(&val));
                }
            }
        }
        self.host.home.join(cat.subdir())
    }

    /// Expand a leading `~` and `$VAR`/`${VAR}` tokens.
    fn expand(&self, s: &str) -> String {
        let s = if let Some(rest) = s.strip_prefix("~/") {
            format!("{}/{rest}", self.host.home.to_string_lossy())
        } else if s == "~" {
            self.host.home.to_string_lossy().into_owned()
        } else {
            s.to_string()
        };
        let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("static regex");
        re.replace_all(&s, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
    }
}

fn has_marker(workspace: &Path) -> bool {
    workspace.join(MARKER_SUBDIR).join(MARKER_FILE).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_at(home: &Path, users_root: &Path, wsl: bool) -> HostEnv {
        HostEnv {
            home: home.to_path_buf(),
            users_root: users_root.to_path_buf(),
            wsl,
            user_profile: None,
            user_name: None,
        }
    }

    fn native_resolver(home: &Path) -> PathResolver {
        // users_root points at a non-existent directory so the WSL tier
        // never engages.
        PathResolver::new(host_at(home, &home.join("no-users"), false))
    }

    #[test]
    fn win_path_translates_drive_and_separators() {
        assert_eq!(
            win_to_wsl_path(r"C:\Users\bob\file.txt"),
            "/mnt/c/Users/bob/file.txt"
        );
        assert_eq!(win_to_wsl_path(r"d:\data"), "/mnt/d/data");
    }

    #[test]
    fn non_windows_path_passes_through() {
        assert_eq!(win_to_wsl_path("/home/bob/x"), "/home/bob/x");
        assert_eq!(win_to_wsl_path("relative/path"), "relative/path");
    }

    #[test]
    fn aliases_map_to_categories_case_insensitively() {
        assert_eq!(Category::from_alias("Bureau"), Some(Category::Desktop));
        assert_eq!(Category::from_alias("PHOTOS"), Some(Category::Pictures));
        assert_eq!(Category::from_alias("dl"), Some(Category::Downloads));
        assert_eq!(Category::from_alias("musique"), Some(Category::Music));
        assert_eq!(Category::from_alias("spreadsheet"), None);
    }

    #[test]
    fn every_alias_resolves_like_its_known_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = native_resolver(tmp.path());
        for cat in Category::ALL {
            for alias in cat.aliases() {
                assert_eq!(
                    resolver.resolve_hint(alias),
                    resolver.known_folder(cat),
                    "alias {alias} diverged from its category"
                );
            }
        }
    }

    #[test]
    fn wsl_tier_prefers_windows_profile_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let users = tmp.path().join("Users");
        std::fs::create_dir_all(users.join("alice").join("Desktop")).unwrap();
        let resolver = PathResolver::new(host_at(&tmp.path().join("home"), &users, true));
        assert_eq!(
            resolver.known_folder(Category::Desktop),
            users.join("alice").join("Desktop")
        );
    }

    #[test]
    fn wsl_tier_falls_back_when_profile_folder_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().join("home");
        std::fs::create_dir_all(&home).unwrap();
        let users = tmp.path().join("Users");
        std::fs::create_dir_all(users.join("alice")).unwrap();
        let resolver = PathResolver::new(host_at(&home, &users, true));
        // alice has no Pictures folder -> native fallback engages.
        assert_eq!(
            resolver.known_folder(Category::Pictures),
            home.join("Pictures")
        );
    }

    #[test]
    fn system_profiles_are_never_candidates() {
        let tmp = tempfile::tempdir().unwrap();
        let users = tmp.path().join("Users");
        for name in ["Public", "Default", "All Users"] {
            std::fs::create_dir_all(users.join(name).join("Desktop")).unwrap();
        }
        std::fs::create_dir_all(users.join("carol").join("Desktop")).unwrap();
        let resolver = PathResolver::new(host_at(tmp.path(), &users, true));
        assert_eq!(resolver.likely_windows_user().as_deref(), Some("carol"));
    }

    #[test]
    fn userprofile_override_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let mut host = host_at(tmp.path(), &tmp.path().join("Users"), true);
        host.user_profile = Some(r"C:\Users\dave".into());
        let resolver = PathResolver::new(host);
        assert_eq!(resolver.likely_windows_user().as_deref(), Some("dave"));
    }

    #[test]
    fn username_override_skips_system_names() {
        let tmp = tempfile::tempdir().unwrap();
        let users = tmp.path().join("Users");
        std::fs::create_dir_all(users.join("erin")).unwrap();
        let mut host = host_at(tmp.path(), &users, true);
        host.user_name = Some("Public".into());
        let resolver = PathResolver::new(host);
        // "Public" is a system profile; falls through to enumeration.
        assert_eq!(resolver.likely_windows_user().as_deref(), Some("erin"));
    }

    #[test]
    fn user_dirs_config_is_honored() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path();
        std::fs::create_dir_all(home.join(".config")).unwrap();
        std::fs::write(
            home.join(".config").join("user-dirs.dirs"),
            "# comment\nXDG_DOWNLOAD_DIR=\"$HOME/Téléchargements\"\n",
        )
        .unwrap();
        let resolver = native_resolver(home);
        assert_eq!(
            resolver.known_folder(Category::Downloads),
            home.join("Téléchargements")
        );
        // Unlisted categories still use the fixed fallback.
        assert_eq!(resolver.known_folder(Category::Music), home.join("Music"));
    }

    #[test]
    fn relative_hints_anchor_at_home() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = native_resolver(tmp.path());
        assert_eq!(
            resolver.resolve_hint("projects/demo"),
            tmp.path().join("projects/demo")
        );
    }

    #[test]
    fn quoted_hints_are_trimmed() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = native_resolver(tmp.path());
        assert_eq!(
            resolver.resolve_hint("\"photos\""),
            resolver.known_folder(Category::Pictures)
        );
    }

    #[test]
    fn windows_hint_is_translated() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = native_resolver(tmp.path());
        assert_eq!(
            resolver.resolve_hint(r"E:\Media\clips"),
            PathBuf::from("/mnt/e/Media/clips")
        );
    }

    #[test]
    fn empty_hint_resolves_to_workspace_root() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = native_resolver(tmp.path());
        assert_eq!(resolver.resolve_hint(""), resolver.find_workspace_root());
    }

    #[test]
    fn workspace_root_is_created_then_rediscovered() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = native_resolver(tmp.path());
        let first = resolver.find_workspace_root();
        assert!(first.join(MARKER_SUBDIR).join(MARKER_FILE).exists());
        let second = resolver.find_workspace_root();
        assert_eq!(first, second);
    }

    #[test]
    fn marker_in_home_takes_precedence_over_creation() {
        let tmp = tempfile::tempdir().unwrap();
        let home_ws = tmp.path().join(WORKSPACE_DIR);
        std::fs::create_dir_all(home_ws.join(MARKER_SUBDIR)).unwrap();
        std::fs::write(home_ws.join(MARKER_SUBDIR).join(MARKER_FILE), "{}").unwrap();
        let resolver = native_resolver(tmp.path());
        // Desktop candidate has no marker, so ~/ShellPilot wins.
        assert_eq!(resolver.find_workspace_root(), home_ws);
    }

    #[test]
    fn foreign_profile_workspace_is_found() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().join("home");
        std::fs::create_dir_all(&home).unwrap();
        let users = tmp.path().join("Users");
        let ws = users
            .join("frank")
            .join("Desktop")
            .join(WORKSPACE_DIR);
        std::fs::create_dir_all(ws.join(MARKER_SUBDIR)).unwrap();
        std::fs::write(ws.join(MARKER_SUBDIR).join(MARKER_FILE), "{}").unwrap();
        // wsl=false still scans the profile tree for an existing marker.
        let resolver = PathResolver::new(host_at(&home, &users, false));
        assert_eq!(resolver.find_workspace_root(), ws);
    }
}
