use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{ACCEPT, COOKIE, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::model::{LikeAck, NewPost, Post, Reply, User};
use crate::search::FeedQuery;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_MUTATION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub mutation_timeout: Option<Duration>,
    pub session_cookie: Option<String>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("songfeed: unauthorized")]
    Unauthorized,
    #[error("songfeed: not found")]
    NotFound,
    #[error("songfeed: rate limited: {0}")]
    RateLimited(String),
    #[error("songfeed: api error {status}: {body}")]
    Status { status: u16, body: String },
}

/// Blocking client for the songfeed backend.
pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    mutation_timeout: Duration,
    session_cookie: Option<String>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("songfeed client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base).with_context(|| format!("parse api base url {base:?}"))?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
            mutation_timeout: config.mutation_timeout.unwrap_or(DEFAULT_MUTATION_TIMEOUT),
            session_cookie: config
                .session_cookie
                .filter(|cookie| !cookie.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn feed(&self, query: &FeedQuery) -> Result<Vec<Post>> {
        self.get_list(&query.path())
    }

    pub fn create_post(&self, post: &NewPost) -> Result<Post> {
        let resp = self.send(self.mutation(Method::POST, "/api/posts")?.json(post))?;
        Ok(resp.json()?)
    }

    pub fn toggle_like(&self, post_id: i64) -> Result<LikeAck> {
        let path = format!("/api/posts/{post_id}/like");
        let resp = self.send(self.mutation(Method::POST, &path)?)?;
        let body = resp.text()?;
        if body.trim().is_empty() {
            return Ok(LikeAck::default());
        }
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }

    pub fn replies(&self, post_id: i64) -> Result<Vec<Reply>> {
        self.get_list(&format!("/api/posts/{post_id}/replies"))
    }

    pub fn reply(&self, post_id: i64, content: &str) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            content: &'a str,
        }
        let path = format!("/api/posts/{post_id}/reply");
        self.send(self.mutation(Method::POST, &path)?.json(&Body { content }))?;
        Ok(())
    }

    pub fn users(&self, query: Option<&str>) -> Result<Vec<User>> {
        let mut url = self.url("/api/search/users")?;
        if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
            url.query_pairs_mut().append_pair("q", q);
        }
        let resp = self.send(self.with_headers(self.http.get(url)))?;
        let users: Option<Vec<User>> = resp.json()?;
        Ok(users.unwrap_or_default())
    }

    /// The signed-in user, or `None` when the cookie is missing or expired.
    pub fn current_user(&self) -> Result<Option<User>> {
        let req = self.with_headers(self.http.get(self.url("/auth/me")?));
        match self.send(req) {
            Ok(resp) => Ok(Some(resp.json()?)),
            Err(err) if matches!(err.downcast_ref::<ApiError>(), Some(ApiError::Unauthorized)) => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn logout(&self) -> Result<()> {
        self.send(self.mutation(Method::POST, "/auth/logout")?)?;
        Ok(())
    }

    fn get_list<T>(&self, path: &str) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let resp = self.send(self.with_headers(self.http.get(self.url(path)?)))?;
        // The backend encodes an empty result as `null`.
        let items: Option<Vec<T>> = resp.json()?;
        Ok(items.unwrap_or_default())
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("build url for {path}"))
    }

    fn mutation(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let req = self
            .http
            .request(method, self.url(path)?)
            .timeout(self.mutation_timeout);
        Ok(self.with_headers(req))
    }

    fn with_headers(&self, mut req: RequestBuilder) -> RequestBuilder {
        req = req.header(USER_AGENT, self.user_agent.clone());
        req = req.header(ACCEPT, "application/json");
        if let Some(cookie) = &self.session_cookie {
            req = req.header(COOKIE, cookie.clone());
        }
        req
    }

    fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req.send()?;
        let status = resp.status();
        debug!(url = %resp.url(), %status, "api response");
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        let err = match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::NOT_FOUND => ApiError::NotFound,
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited(body.trim().to_string()),
            _ => ApiError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            },
        };
        Err(err.into())
    }
}
