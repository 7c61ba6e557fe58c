//! Launch and tuning configuration for the session layer.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use which::which;

/// Configuration for launching the browser and tuning protocol behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    pub executable: PathBuf,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    /// Deadline applied to every protocol call.
    pub call_deadline_ms: u64,
    /// Base delay for exponential backoff on retriable protocol failures.
    pub retry_backoff_ms: u64,
    /// Bounded attempt count for retriable protocol failures.
    pub max_retries: u32,
    /// Connect to an already-running browser instead of launching one.
    pub websocket_url: Option<String>,
    /// Idle time after which a connection is probed before reuse. Zero
    /// disables probing.
    pub heartbeat_interval_ms: u64,
    /// Maximum out-of-process iframe attachments per discovery pass.
    pub max_iframe_attach: usize,
    /// Host suffixes/keywords that are never worth attaching to.
    pub ad_domain_skiplist: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            executable: detect_chrome_executable().unwrap_or_default(),
            user_data_dir: profile_dir_from_env(),
            headless: headless_from_env(),
            call_deadline_ms: 10_000,
            retry_backoff_ms: 250,
            max_retries: 3,
            websocket_url: None,
            heartbeat_interval_ms: 15_000,
            max_iframe_attach: 5,
            ad_domain_skiplist: default_ad_skiplist(),
        }
    }
}

fn default_ad_skiplist() -> Vec<String> {
    [
        "doubleclick.net",
        "googlesyndication.com",
        "googletagmanager.com",
        "googleadservices.com",
        "adsystem",
        "adservice",
        "adnxs.com",
        "taboola.com",
        "outbrain.com",
        "criteo.com",
        "amazon-adsystem.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// PAGELENS_HEADLESS: "0", "false", "no", "off" means headful
fn headless_from_env() -> bool {
    match env::var("PAGELENS_HEADLESS") {
        Ok(value) => !matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        Err(_) => true,
    }
}

fn profile_dir_from_env() -> PathBuf {
    env::var("PAGELENS_CHROME_PROFILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.pagelens-profile"))
}

/// Locate a usable Chrome/Chromium binary. Preference order: the
/// `PAGELENS_CHROME` override, then `$PATH`, then well-known install
/// locations (`PAGELENS_SKIP_OS_PATHS` disables the last step).
pub fn detect_chrome_executable() -> Option<PathBuf> {
    env_override()
        .or_else(path_lookup)
        .or_else(install_dir_lookup)
}

fn env_override() -> Option<PathBuf> {
    let raw = env::var("PAGELENS_CHROME").ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed)).filter(|p| p.exists())
}

fn path_lookup() -> Option<PathBuf> {
    BINARY_NAMES.iter().find_map(|name| which(name).ok())
}

fn install_dir_lookup() -> Option<PathBuf> {
    let skip = env::var("PAGELENS_SKIP_OS_PATHS")
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false);
    if skip {
        return None;
    }
    install_candidates().into_iter().find(|p| p.exists())
}

#[cfg(target_os = "windows")]
const BINARY_NAMES: &[&str] = &["chrome.exe", "chromium.exe", "msedge.exe"];

#[cfg(not(target_os = "windows"))]
const BINARY_NAMES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
];

#[cfg(target_os = "windows")]
fn install_candidates() -> Vec<PathBuf> {
    let mut out = Vec::new();
    for root in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
        let Ok(base) = env::var(root) else { continue };
        if base.trim().is_empty() {
            continue;
        }
        let base = PathBuf::from(base.trim());
        out.push(base.join("Google/Chrome/Application/chrome.exe"));
        out.push(base.join("Chromium/Application/chrome.exe"));
        out.push(base.join("Microsoft/Edge/Application/msedge.exe"));
    }
    out
}

#[cfg(target_os = "macos")]
fn install_candidates() -> Vec<PathBuf> {
    [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn install_candidates() -> Vec<PathBuf> {
    [
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium-browser",
        "/usr/bin/chromium",
        "/opt/google/chrome/chrome",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}
