use anyhow::{Context, Result, anyhow};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use surf_agent::config::ChromeConfig;

/// Browser the agent drives. Holds the `Browser` so a launched Chrome
/// lives as long as the session.
pub struct BrowserSession {
    _browser: Browser,
    pub tab: Arc<Tab>,
}

#[derive(Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// DevTools websocket URL for `debug_url`, which may already be one.
async fn websocket_url(debug_url: &str) -> Result<String> {
    if debug_url.starts_with("ws://") || debug_url.starts_with("wss://") {
        return Ok(debug_url.to_string());
    }
    let version = format!("{}/json/version", debug_url.trim_end_matches('/'));
    let info: VersionInfo = reqwest::get(&version)
        .await
        .with_context(|| format!("no DevTools endpoint at {debug_url}"))?
        .json()
        .await
        .context("unexpected /json/version answer")?;
    Ok(info.web_socket_debugger_url)
}

impl BrowserSession {
    /// Attaches to a running Chrome on the debug URL, or launches one.
    pub async fn connect(config: &ChromeConfig) -> Result<Self> {
        info!(debug_url = %config.debug_url, "attaching to Chrome");
        match websocket_url(&config.debug_url).await {
            Ok(ws_url) => {
                let attached = tokio::task::spawn_blocking(move || Self::attach(ws_url))
                    .await
                    .map_err(|e| anyhow!("Chrome attach panicked: {e}"))?;
                match attached {
                    Ok(session) => return Ok(session),
                    Err(err) => warn!(error = %err, "could not attach, launching instead"),
                }
            }
            Err(err) => warn!(error = %err, "could not attach, launching instead"),
        }
        let config = config.clone();
        tokio::task::spawn_blocking(move || Self::launch(&config))
            .await
            .map_err(|e| anyhow!("Chrome launch panicked: {e}"))?
    }

    fn attach(ws_url: String) -> Result<Self> {
        let browser = Browser::connect(ws_url)?;
        let existing = {
            let tabs = browser.get_tabs();
            let tabs = tabs.lock().map_err(|_| anyhow!("tab list lock poisoned"))?;
            tabs.first().cloned()
        };
        let tab = match existing {
            Some(tab) => tab,
            None => browser.new_tab()?,
        };
        info!("attached to existing Chrome");
        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    fn launch(config: &ChromeConfig) -> Result<Self> {
        let profile = match &config.profile_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_local_dir()
                .map(|dir| dir.join("surf-agent").join("profile"))
                .unwrap_or_else(|| PathBuf::from("agent_profile")),
        };
        std::fs::create_dir_all(&profile)
            .with_context(|| format!("cannot create profile dir {}", profile.display()))?;

        let options = LaunchOptions {
            headless: config.headless,
            path: config.path.clone(),
            user_data_dir: Some(profile.clone()),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-infobars"),
                OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: Duration::from_secs(300),
            ..Default::default()
        };
        info!(headless = config.headless, profile = %profile.display(), "launching Chrome");
        let browser = Browser::new(options).map_err(|e| anyhow!("Browser launch failed: {e}"))?;
        let tab = browser.new_tab()?;
        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        let tab = self.tab.clone();
        let url = url.to_string();
        info!(%url, "navigating");
        tokio::task::spawn_blocking(move || -> Result<()> {
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow!("navigation panicked: {e}"))?
    }
}
