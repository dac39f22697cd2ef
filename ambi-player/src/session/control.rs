//! Control-plane client
//!
//! Request/response calls that create and steer a remote session. The session
//! actor wraps every call in its own timeout.

use crate::error::{Error, Result};
use crate::session::state::{Book, Prompt};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Result of a call that may target an expired session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Ok,
    NotFound,
}

/// Response to `start`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StartedSession {
    pub session_id: String,
    #[serde(default)]
    pub prompts: Vec<Prompt>,
}

/// Response to `status`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteStatus {
    pub session_id: String,
    pub is_playing: bool,
    #[serde(default)]
    pub prompts: Vec<Prompt>,
}

/// Remote session control
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn start(&self, book: &Book) -> Result<StartedSession>;

    async fn pause(&self, session_id: &str) -> Result<ControlOutcome>;

    async fn resume(&self, session_id: &str) -> Result<ControlOutcome>;

    /// An unknown session counts as already stopped
    async fn stop(&self, session_id: &str) -> Result<()>;

    /// `Error::SessionExpired` when the remote no longer knows the session
    async fn status(&self, session_id: &str) -> Result<RemoteStatus>;
}

#[derive(Serialize)]
struct StartRequest<'a> {
    book: &'a Book,
}

/// REST control plane over reqwest
pub struct HttpControlClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpControlClient {
    pub fn new(server_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(server_url)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Server URL must be http or https: {}",
                server_url
            )));
        }
        // Url::join replaces the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn post_session_action(&self, action: &str, session_id: &str) -> Result<ControlOutcome> {
        let url = self.endpoint(&format!("music/{}/{}", action, session_id))?;
        debug!("POST {}", url);
        let response = self.client.post(url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(ControlOutcome::Ok),
            StatusCode::NOT_FOUND => Ok(ControlOutcome::NotFound),
            status => Err(unexpected_status(action, status, response).await),
        }
    }
}

async fn unexpected_status(call: &str, status: StatusCode, response: reqwest::Response) -> Error {
    let body = response.text().await.unwrap_or_default();
    Error::Protocol(format!("{} returned {}: {}", call, status, body.trim()))
}

#[async_trait]
impl ControlPlane for HttpControlClient {
    async fn start(&self, book: &Book) -> Result<StartedSession> {
        let url = self.endpoint("music/start")?;
        debug!("POST {} for '{}'", url, book.title);
        let response = self
            .client
            .post(url)
            .json(&StartRequest { book })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(unexpected_status("start", status, response).await);
        }
        Ok(response.json::<StartedSession>().await?)
    }

    async fn pause(&self, session_id: &str) -> Result<ControlOutcome> {
        self.post_session_action("pause", session_id).await
    }

    async fn resume(&self, session_id: &str) -> Result<ControlOutcome> {
        self.post_session_action("resume", session_id).await
    }

    async fn stop(&self, session_id: &str) -> Result<()> {
        match self.post_session_action("stop", session_id).await? {
            ControlOutcome::Ok => Ok(()),
            ControlOutcome::NotFound => {
                debug!(session_id, "Stop for unknown session");
                Ok(())
            }
        }
    }

    async fn status(&self, session_id: &str) -> Result<RemoteStatus> {
        let url = self.endpoint(&format!("music/status/{}", session_id))?;
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.json::<RemoteStatus>().await?),
            StatusCode::NOT_FOUND => Err(Error::SessionExpired(session_id.to_string())),
            status => Err(unexpected_status("status", status, response).await),
        }
    }
}
