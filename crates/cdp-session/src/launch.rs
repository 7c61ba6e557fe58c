//! Chromium process launch: argument assembly, profile directory setup,
//! and discovery of the DevTools websocket endpoint on stderr.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use futures::io::{AsyncBufReadExt, BufReader};
use futures::stream::StreamExt;

use crate::config::SessionConfig;
use crate::error::SessionError;

const LAUNCH_DEADLINE: Duration = Duration::from_secs(20);

/// Flags the extraction engine needs from Chromium. Deliberately short:
/// pages are driven over the protocol only, so most browser UI surface
/// is switched off rather than configured.
const BASE_ARGS: &[&str] = &[
    "--disable-background-networking",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--disable-sync",
    "--no-default-browser-check",
    "--no-first-run",
    "--remote-allow-origins=*",
];

const HEADLESS_ARGS: &[&str] = &["--headless=new", "--hide-scrollbars", "--mute-audio"];

pub struct LaunchedBrowser {
    pub child: Child,
    pub ws_url: String,
}

/// Spawn Chromium per `cfg` and wait for its DevTools websocket url.
pub async fn launch_chromium(cfg: &SessionConfig) -> Result<LaunchedBrowser, SessionError> {
    let config = browser_config(cfg)?;
    let mut child = config
        .launch()
        .map_err(|err| SessionError::fatal(format!("chromium failed to start: {err}")))?;
    let ws_url = wait_for_devtools_url(&mut child).await?;
    Ok(LaunchedBrowser { child, ws_url })
}

fn browser_config(cfg: &SessionConfig) -> Result<BrowserConfig, SessionError> {
    if !cfg.executable.as_os_str().is_empty() && !cfg.executable.exists() {
        return Err(SessionError::fatal(format!(
            "chrome executable not found at {} (set PAGELENS_CHROME)",
            cfg.executable.display()
        )));
    }

    let profile_dir = absolute_profile_dir(cfg)?;
    fs::create_dir_all(&profile_dir)
        .map_err(|err| SessionError::fatal(format!("cannot create profile dir: {err}")))?;

    let mut args: Vec<&str> = BASE_ARGS.to_vec();
    if cfg.headless {
        args.extend_from_slice(HEADLESS_ARGS);
    }

    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.call_deadline_ms))
        .launch_timeout(LAUNCH_DEADLINE)
        .args(args)
        .user_data_dir(profile_dir);
    if !cfg.headless {
        builder = builder.with_head();
    }
    if sandbox_disabled() {
        builder = builder.no_sandbox();
    }
    if !cfg.executable.as_os_str().is_empty() {
        builder = builder.chrome_executable(cfg.executable.clone());
    }

    builder
        .build()
        .map_err(|err| SessionError::fatal(format!("browser config rejected: {err}")))
}

fn absolute_profile_dir(cfg: &SessionConfig) -> Result<PathBuf, SessionError> {
    if cfg.user_data_dir.is_absolute() {
        return Ok(cfg.user_data_dir.clone());
    }
    let cwd = std::env::current_dir()
        .map_err(|err| SessionError::fatal(format!("cwd unavailable for profile dir: {err}")))?;
    Ok(cwd.join(&cfg.user_data_dir))
}

fn sandbox_disabled() -> bool {
    std::env::var("PAGELENS_DISABLE_SANDBOX")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Scan one stderr line for the browser-level DevTools endpoint. Page-level
/// websocket urls (`/devtools/page/...`) are not connection points.
fn devtools_url_in(line: &str) -> Option<&str> {
    line.split_whitespace()
        .find(|tok| tok.starts_with("ws") && tok.contains("/devtools/browser/"))
}

async fn wait_for_devtools_url(child: &mut Child) -> Result<String, SessionError> {
    let Some(stderr) = child.stderr.take() else {
        return Err(SessionError::fatal("chromium stderr was not piped"));
    };
    let mut lines = BufReader::new(stderr).lines();

    let scan = async {
        let mut preview: Vec<String> = Vec::new();
        while let Some(line) = lines.next().await {
            let line = line.map_err(|err| {
                SessionError::fatal(format!("chromium stderr read failed: {err}"))
            })?;
            if let Some(url) = devtools_url_in(&line) {
                return Ok(url.to_string());
            }
            if preview.len() < 8 {
                preview.push(line);
            }
        }
        Err(SessionError::fatal(format!(
            "chromium exited without a devtools url; stderr began: {}",
            preview.join(" | ")
        )))
    };

    tokio::time::timeout(LAUNCH_DEADLINE, scan)
        .await
        .map_err(|_| {
            SessionError::Timeout("devtools url not seen within launch deadline".into())
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_browser_endpoint_in_stderr_line() {
        let line = "DevTools listening on ws://127.0.0.1:9222/devtools/browser/5a3b";
        assert_eq!(
            devtools_url_in(line),
            Some("ws://127.0.0.1:9222/devtools/browser/5a3b")
        );
    }

    #[test]
    fn ignores_page_endpoints_and_noise() {
        assert_eq!(
            devtools_url_in("ws://127.0.0.1:9222/devtools/page/AB12"),
            None
        );
        assert_eq!(devtools_url_in("[WARNING] gpu init failed"), None);
        assert_eq!(devtools_url_in(""), None);
    }

    #[test]
    fn headless_args_extend_the_base_set() {
        assert!(BASE_ARGS.iter().all(|a| !a.contains("headless")));
        assert!(HEADLESS_ARGS.contains(&"--headless=new"));
    }
}
