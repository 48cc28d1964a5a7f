//! Headless browser fetcher over WebDriver
//!
//! Every `fetch` opens its own session and closes it before returning, also
//! when the page times out. Nothing is shared across items or retries.

use async_trait::async_trait;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::{Client, ClientBuilder};
use rand::Rng;
use reqwest::Url;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{DESKTOP_USER_AGENT, MARKETPLACE_BASE_URL, PageFetcher, RawPage, checked_page};
use crate::config::TrackerConfig;
use crate::error::FetchError;

const CHROME_ARGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--disable-gpu",
    "--window-size=1920,1080",
];

pub struct BrowserFetcher {
    webdriver_url: String,
    warm_up: bool,
}

impl BrowserFetcher {
    pub fn new(webdriver_url: impl Into<String>, warm_up: bool) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            warm_up,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.webdriver_url.clone(), config.warm_up)
    }

    /// Navigate like a visitor would and return the listing markup
    async fn visit(&self, client: &Client, url: &str) -> Result<RawPage, FetchError> {
        if self.warm_up {
            for step in warm_up_path(url) {
                tracing::debug!("Warm-up visit {}", step);
                client.goto(&step).await.map_err(classify_cmd_error)?;
                tokio::time::sleep(human_pause()).await;
            }
        }

        client.goto(url).await.map_err(classify_cmd_error)?;
        tokio::time::sleep(human_pause()).await;

        let html = client.source().await.map_err(classify_cmd_error)?;
        let final_url = client
            .current_url()
            .await
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string());

        checked_page(html, final_url)
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<RawPage, FetchError> {
        let connecting = tokio::spawn(connect(self.webdriver_url.clone()));
        let client = session_within(timeout, connecting, |late: Client| async move {
            if let Err(e) = late.close().await {
                tracing::warn!("Failed to close late webdriver session: {}", e);
            }
        })
        .await?;

        let visited = tokio::time::timeout(timeout, self.visit(&client, url)).await;

        // Release the session before reporting anything
        if let Err(e) = client.close().await {
            tracing::warn!("Failed to close webdriver session for {}: {}", url, e);
        }

        match visited {
            Ok(result) => result,
            Err(_) => Err(FetchError::timeout(format!(
                "{} did not load within {:?}",
                url, timeout
            ))),
        }
    }
}

async fn connect(webdriver_url: String) -> Result<Client, FetchError> {
    let mut args: Vec<String> = CHROME_ARGS.iter().map(|a| a.to_string()).collect();
    args.push(format!("--user-agent={}", DESKTOP_USER_AGENT));

    let mut caps = serde_json::Map::new();
    caps.insert("browserName".to_string(), json!("chrome"));
    caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));

    ClientBuilder::native()
        .capabilities(caps)
        .connect(&webdriver_url)
        .await
        .map_err(|e| FetchError::network(format!("webdriver session at {} failed: {}", webdriver_url, e)))
}

/// Wait up to `timeout` for the session `pending` is creating.
///
/// Session creation keeps running past the deadline; a session that still
/// arrives is passed to `release` in the background instead of being leaked
/// on the WebDriver server.
async fn session_within<S, R, Fut>(
    timeout: Duration,
    mut pending: JoinHandle<Result<S, FetchError>>,
    release: R,
) -> Result<S, FetchError>
where
    S: Send + 'static,
    R: FnOnce(S) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    match tokio::time::timeout(timeout, &mut pending).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(FetchError::unknown(format!("webdriver session task failed: {}", e))),
        Err(_) => {
            tokio::spawn(async move {
                if let Ok(Ok(session)) = pending.await {
                    tracing::debug!("Releasing webdriver session created after the deadline");
                    release(session).await;
                }
            });
            Err(FetchError::timeout(format!("no webdriver session within {:?}", timeout)))
        }
    }
}

/// Pages a visitor passes through before a listing: home, then the game section.
///
/// `https://www.cardmarket.com/en/Magic/Products/...` gives the home page and
/// `https://www.cardmarket.com/en/Magic`.
pub fn warm_up_path(listing_url: &str) -> Vec<String> {
    let base = match Url::parse(listing_url) {
        Ok(parsed) => parsed.origin().ascii_serialization(),
        Err(_) => MARKETPLACE_BASE_URL.to_string(),
    };

    let mut steps = vec![format!("{}/", base)];

    let section = Url::parse(listing_url).ok().and_then(|parsed| {
        let segments: Vec<String> = parsed.path_segments()?.map(str::to_string).collect();
        match segments.as_slice() {
            [lang, game, _, ..] if !lang.is_empty() && !game.is_empty() => {
                Some(format!("{}/{}/{}", base, lang, game))
            }
            _ => None,
        }
    });

    if let Some(section) = section {
        steps.push(section);
    }

    steps
}

fn human_pause() -> Duration {
    Duration::from_millis(rand::rng().random_range(1000..=2000))
}

fn classify_cmd_error(e: CmdError) -> FetchError {
    if let CmdError::Standard(wd) = &e {
        if matches!(wd.error, ErrorStatus::Timeout | ErrorStatus::ScriptTimeout) {
            return FetchError::timeout(e.to_string());
        }
    }

    let message = e.to_string();
    if message.contains("net::ERR") || message.to_lowercase().contains("connection") {
        FetchError::network(message)
    } else {
        FetchError::unknown(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_warm_up_path_for_magic_listing() {
        let steps = warm_up_path(
            "https://www.cardmarket.com/en/Magic/Products/Singles/Alpha/Black-Lotus",
        );
        assert_eq!(
            steps,
            vec![
                "https://www.cardmarket.com/".to_string(),
                "https://www.cardmarket.com/en/Magic".to_string(),
            ]
        );
    }

    #[test]
    fn test_warm_up_path_for_pokemon_listing() {
        let steps = warm_up_path(
            "https://www.cardmarket.com/en/Pokemon/Products/Singles/Base-Set/Charizard",
        );
        assert_eq!(steps[1], "https://www.cardmarket.com/en/Pokemon");
    }

    #[test]
    fn test_warm_up_path_for_odd_url() {
        let steps = warm_up_path("not a url");
        assert_eq!(steps, vec![format!("{}/", MARKETPLACE_BASE_URL)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_within_deadline_is_returned() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();

        let pending = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, FetchError>(7u32)
        });
        let session = session_within(Duration::from_secs(1), pending, move |_| async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap();

        assert_eq!(session, 7);
        assert!(!released.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_session_is_released() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();

        let pending = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, FetchError>(7u32)
        });
        let err = session_within(Duration::from_secs(1), pending, move |session| async move {
            assert_eq!(session, 7);
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind, crate::error::FetchErrorKind::Timeout);
        assert!(!released.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_human_pause_range() {
        for _ in 0..20 {
            let pause = human_pause();
            assert!(pause >= Duration::from_secs(1) && pause <= Duration::from_secs(2));
        }
    }
}
