//! Client for the remote conversational model.
//!
//! One `POST {base_url}/chat` per question, plus `POST /login` for an access
//! token and `GET /models` for the model picker. Transport failures and
//! non-2xx answers come back as errors; the caller decides what to say about
//! them. Nothing here retries.

use std::time::Duration;

use base64::Engine as _;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::error::{AssistantError, Result};
use crate::models::is_hidden_model;

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub enable_audio: bool,
    pub web_search: bool,
    pub rag_search: bool,
    pub stream: bool,
    pub mode: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub reply: String,
    #[serde(default)]
    pub thought: Option<String>,
    /// Base64-encoded audio of the reply.
    #[serde(default)]
    pub audio: Option<String>,
    /// Session id to use for the next request.
    #[serde(default)]
    pub id: Option<String>,
}

impl ChatReply {
    /// Decoded audio clip, if one came with the reply and decodes cleanly.
    pub fn audio_bytes(&self) -> Option<Vec<u8>> {
        let encoded = self.audio.as_deref()?.trim();
        if encoded.is_empty() {
            return None;
        }
        match base64::engine::general_purpose::STANDARD.decode(encoded) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("Ignoring undecodable reply audio: {e}");
                None
            }
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginReply {
    access_token: String,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

pub struct RemoteChatClient {
    config: RemoteConfig,
    client: Client,
}

impl RemoteChatClient {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AssistantError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// False when no server is configured; the assistant then stays local-only.
    pub fn is_configured(&self) -> bool {
        !self.config.base_url.trim().is_empty()
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Request body for `message` with the configured defaults.
    pub fn request(
        &self,
        message: &str,
        session_id: Option<String>,
        model: Option<String>,
        web_search: bool,
    ) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            session_id,
            model,
            enable_audio: self.config.enable_audio,
            web_search,
            rag_search: false,
            stream: false,
            mode: self.config.mode.clone(),
        }
    }

    /// Ask the model. `token` is the login access token, if the user has one.
    pub async fn chat(&self, request: &ChatRequest, token: Option<&str>) -> Result<ChatReply> {
        let url = self.url("chat");
        debug!(
            "Sending to {url} (session {:?}, model {:?})",
            request.session_id, request.model
        );

        let builder = self.authorize(self.client.post(&url).json(request), token);
        let resp = self.send(builder, "Chat").await?;

        let reply: ChatReply = resp.json().await?;
        debug!("Reply: {} chars, audio: {}", reply.reply.len(), reply.audio.is_some());
        Ok(reply)
    }

    /// Exchange credentials for an access token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let builder = self
            .client
            .post(self.url("login"))
            .json(&LoginRequest { username, password });
        let resp = self.send(builder, "Login").await?;

        let reply: LoginReply = resp.json().await?;
        info!("Logged in as {username}");
        Ok(reply.access_token)
    }

    /// Models the server offers, minus the ones not meant for the assistant.
    pub async fn fetch_models(&self, token: Option<&str>) -> Result<Vec<String>> {
        let builder = self.authorize(
            self.client
                .get(self.url("models"))
                .header("Accept", "application/json"),
            token,
        );
        let resp = self.send(builder, "Model list").await?;

        let list: ModelList = resp.json().await?;
        let total = list.models.len();
        let visible: Vec<String> = list
            .models
            .into_iter()
            .filter(|m| !is_hidden_model(m))
            .collect();
        debug!("{} models offered, {} shown", total, visible.len());
        Ok(visible)
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.config.base_url.trim_end_matches('/'))
    }

    /// Login token first, then the configured token, then the API key.
    fn authorize(&self, builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        let bearer = token
            .filter(|t| !t.is_empty())
            .or_else(|| Some(self.config.auth_token.as_str()).filter(|t| !t.is_empty()));
        match bearer {
            Some(bearer) => builder.bearer_auth(bearer),
            None if !self.config.api_key.is_empty() => {
                builder.header("x-api-key", &self.config.api_key)
            }
            None => builder,
        }
    }

    /// Send and require a 200. `what` names the request in logs.
    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_connect() {
                    warn!("{what}: cannot connect to server at {}", self.config.base_url);
                } else if e.is_timeout() {
                    warn!("{what} request timed out");
                } else {
                    warn!("{what} request failed: {e}");
                }
                return Err(e.into());
            }
        };

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            let message = error_message(status, &body);
            warn!("{what}: server returned {status}: {message}");
            return Err(AssistantError::Remote {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }
}

/// Server-provided message from an error body, else "Sunucu hatası: <code>".
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.detail))
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("Sunucu hatası: {}", status.as_u16()))
}

#[cfg(test)]
pub(crate) mod testing {
    use axum::Router;
    use tokio::net::TcpListener;

    /// Serve `router` on an ephemeral local port; returns its base URL.
    pub async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }
}
