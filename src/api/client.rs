//! Client for the content API.
//!
//! The API authenticates with a session cookie it sets on login. The frontend
//! never inspects that cookie; it forwards whatever the browser sent.

use reqwest::{header, multipart, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;
use crate::core::errors::ClientError;
use crate::models::models::{Credentials, Post, PostUpdate, Review, ReviewDraft, User};

/// Cookie header forwarded from the browser to the API.
#[derive(Clone, Debug, Default)]
pub struct Session {
    cookie: Option<String>,
}

impl Session {
    pub fn new(cookie: Option<String>) -> Self {
        Self {
            cookie: cookie.filter(|c| !c.trim().is_empty()),
        }
    }

    pub fn anonymous() -> Self {
        Self { cookie: None }
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(config.api_timeout).build()?;
        Ok(Self {
            http,
            base_url: config.api_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, session: &Session) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("API {} {}", method, url);
        let builder = self.http.request(method, url);
        match session.cookie() {
            Some(cookie) => builder.header(header::COOKIE, cookie),
            None => builder,
        }
    }

    /// Logs in and returns the `Set-Cookie` values the API issued.
    pub async fn login(&self, creds: &Credentials) -> Result<Vec<String>, ClientError> {
        let resp = self
            .request(Method::POST, "/api/login", &Session::anonymous())
            .json(creds)
            .send()
            .await?;
        let resp = check(resp).await?;

        Ok(resp
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect())
    }

    pub async fn current_user(&self, session: &Session) -> Result<User, ClientError> {
        let resp = self.request(Method::GET, "/api/user", session).send().await?;
        decode(check(resp).await?).await
    }

    pub async fn get_post(&self, session: &Session, post_id: &str) -> Result<Post, ClientError> {
        let path = format!("/api/posts/{}", encode(post_id));
        let resp = self.request(Method::GET, &path, session).send().await?;
        decode(check(resp).await?).await
    }

    pub async fn update_post(
        &self,
        session: &Session,
        post_id: &str,
        update: PostUpdate,
    ) -> Result<(), ClientError> {
        let mut form = multipart::Form::new()
            .text("title", update.title)
            .text("body", update.body);

        if let Some(image) = update.image {
            let part = multipart::Part::bytes(image.bytes)
                .file_name(image.file_name)
                .mime_str(&image.content_type)?;
            form = form.part("image", part);
        }

        let path = format!("/api/posts/{}", encode(post_id));
        let resp = self
            .request(Method::PUT, &path, session)
            .multipart(form)
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    /// The API expects the caller's admin flag in the body of the delete.
    pub async fn delete_post(
        &self,
        session: &Session,
        post_id: &str,
        is_admin: bool,
    ) -> Result<(), ClientError> {
        let path = format!("/api/posts/{}", encode(post_id));
        let resp = self
            .request(Method::DELETE, &path, session)
            .json(&json!({ "isAdmin": if is_admin { 1 } else { 0 } }))
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    pub async fn validate_post(&self, session: &Session, post_id: &str) -> Result<(), ClientError> {
        let path = format!("/api/posts/{}/validate", encode(post_id));
        let resp = self
            .request(Method::PUT, &path, session)
            .json(&json!({}))
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    pub async fn list_reviews(
        &self,
        session: &Session,
        post_id: &str,
    ) -> Result<Vec<Review>, ClientError> {
        let path = format!("/api/posts/{}/reviews", encode(post_id));
        let resp = self.request(Method::GET, &path, session).send().await?;
        decode(check(resp).await?).await
    }

    pub async fn create_review(
        &self,
        session: &Session,
        post_id: &str,
        draft: &ReviewDraft,
    ) -> Result<(), ClientError> {
        let path = format!("/api/posts/{}/reviews", encode(post_id));
        let resp = self
            .request(Method::POST, &path, session)
            .json(draft)
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    pub async fn update_review(
        &self,
        session: &Session,
        review_id: &str,
        draft: &ReviewDraft,
    ) -> Result<(), ClientError> {
        let path = format!("/api/reviews/{}", encode(review_id));
        let resp = self
            .request(Method::PUT, &path, session)
            .json(draft)
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    pub async fn delete_review(&self, session: &Session, review_id: &str) -> Result<(), ClientError> {
        let path = format!("/api/reviews/{}", encode(review_id));
        let resp = self.request(Method::DELETE, &path, session).send().await?;
        check(resp).await.map(|_| ())
    }
}

fn encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let url = resp.url().to_string();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

    warn!("API {} failed with {}: {:?}", url, status, message);
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}
