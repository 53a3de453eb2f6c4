//! HTTP client for the chat server
//!
//! Wraps every snapshot and mutation endpoint as a typed request/response
//! call. No caching, no retries: the caller decides what to do with a
//! failure.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::validate;
use super::wire::{
    AddFriendResponse, AvatarBody, Credentials, DmsResponse, ErrorBody, ExistsResponse,
    FriendsResponse, HealthResponse, LoginResponse, MeResponse, MessagesResponse, OkResponse,
    PasswordBody, SendMessageBody, SendMessageResponse, UsernameBody,
};
use super::SnapshotFetcher;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::models::{Conversation, Message, User};

/// Default request timeout in seconds
const REQUEST_TIMEOUT: u64 = 10;

/// Client for the chat server's HTTP endpoints
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Create a client for the given server URL
    pub fn new(base_url: &str) -> ApiResult<Self> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("murmur/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Create a client from configuration
    pub fn from_config(config: &Config) -> ApiResult<Self> {
        Self::with_timeout(&config.server_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ==================== Accounts ====================

    pub async fn health(&self) -> ApiResult<HealthResponse> {
        self.send(self.request(Method::GET, "/health", None)).await
    }

    pub async fn user_exists(&self, username: &str) -> ApiResult<bool> {
        let request = self
            .request(Method::GET, "/users/exists", None)
            .query(&[("username", username.trim())]);
        let body: ExistsResponse = self.send(request).await?;
        Ok(body.exists)
    }

    pub async fn register(&self, username: &str, password: &str) -> ApiResult<()> {
        let username = validate::username(username)?;
        let password = validate::password(password)?;
        let request = self
            .request(Method::POST, "/register", None)
            .json(&Credentials { username, password });
        self.send_ok(request).await
    }

    /// Log in and return the new session token with our identity
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<(String, User)> {
        let request = self
            .request(Method::POST, "/login", None)
            .json(&Credentials {
                username: username.trim(),
                password,
            });
        let body: LoginResponse = self.send(request).await?;
        Ok((body.token, body.user))
    }

    // ==================== Mutations ====================

    /// Add a friend by username; returns the id of the conversation with them
    ///
    /// The conversation is created server-side if it did not exist yet.
    pub async fn add_friend(&self, token: &str, username: &str) -> ApiResult<String> {
        let request = self
            .request(Method::POST, "/friends/add", Some(token))
            .json(&UsernameBody {
                username: username.trim(),
            });
        let body: AddFriendResponse = self.send(request).await?;
        Ok(body.dm_id)
    }

    pub async fn send_message(&self, token: &str, dm_id: &str, content: &str) -> ApiResult<Message> {
        let content = validate::message_content(content)?;
        let request = self
            .request(Method::POST, "/messages/send", Some(token))
            .json(&SendMessageBody { dm_id, content });
        let body: SendMessageResponse = self.send(request).await?;
        Ok(body.message)
    }

    pub async fn update_username(&self, token: &str, username: &str) -> ApiResult<()> {
        let username = validate::username(username)?;
        let request = self
            .request(Method::POST, "/account/username", Some(token))
            .json(&UsernameBody { username });
        self.send_ok(request).await
    }

    pub async fn update_password(
        &self,
        token: &str,
        old_password: &str,
        new_password: &str,
    ) -> ApiResult<()> {
        if validate::password(new_password).is_err() {
            return Err(ApiError::Invalid("New password too short".to_string()));
        }
        let request = self
            .request(Method::POST, "/account/password", Some(token))
            .json(&PasswordBody {
                old_password,
                new_password,
            });
        self.send_ok(request).await
    }

    /// Set the avatar to a `data:image/...` URL, or clear it with `None`
    pub async fn update_avatar(&self, token: &str, data_url: Option<&str>) -> ApiResult<()> {
        let avatar_data_url = data_url.map(validate::avatar).transpose()?;
        let request = self
            .request(Method::POST, "/account/avatar", Some(token))
            .json(&AvatarBody { avatar_data_url });
        self.send_ok(request).await
    }

    // ==================== Plumbing ====================

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http.request(method, url);
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = request.send().await?;
        read_response(response).await
    }

    async fn send_ok(&self, request: RequestBuilder) -> ApiResult<()> {
        let body: OkResponse = self.send(request).await?;
        if body.ok {
            Ok(())
        } else {
            Err(ApiError::Rejected {
                status: 200,
                message: "Request was not accepted".to_string(),
            })
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, token: &str) -> ApiResult<T> {
        debug!("GET {}", path);
        self.send(self.request(Method::GET, path, Some(token))).await
    }
}

/// Decode a success body, or turn an error body into a typed error
async fn read_response<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()));
    }

    let detail = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(ErrorBody::into_message);
    Err(ApiError::from_status(status, detail))
}

impl SnapshotFetcher for ApiClient {
    async fn me(&self, token: &str) -> ApiResult<User> {
        let body: MeResponse = self.get("/me", token).await?;
        Ok(body.user)
    }

    async fn friends(&self, token: &str) -> ApiResult<Vec<User>> {
        let body: FriendsResponse = self.get("/friends", token).await?;
        Ok(body.friends)
    }

    async fn conversations(&self, token: &str) -> ApiResult<Vec<Conversation>> {
        let body: DmsResponse = self.get("/dms", token).await?;
        Ok(body.dms)
    }

    async fn messages(&self, token: &str, dm_id: &str) -> ApiResult<Vec<Message>> {
        let body: MessagesResponse = self.get(&format!("/messages/{}", dm_id), token).await?;
        Ok(body.messages)
    }
}
