//! HTTP access to the server under test.
//!
//! [`AuthenticatedClient`] attaches a bearer token, a signature, or both to
//! every request. [`ApClient`] pairs one with the remote actor's profile so
//! test cases can address its outbox and collections by property.

use std::sync::Arc;

use apconform::{Document, Prop, SignableRequest, SignedIdentity, ACTIVITY_JSON};
use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Url};
use tracing::debug;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Anything that can GET a JSON-LD document. The paginator only needs this.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Document, EngineError>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    async fn get_json(&self, url: &str) -> Result<Document, EngineError> {
        (**self).get_json(url).await
    }
}

// ---------------------------------------------------------------------------
// PostOutcome
// ---------------------------------------------------------------------------

/// What a POST returned. Non-2xx statuses are not errors here; test cases
/// judge them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOutcome {
    pub status: u16,
    /// The `Location` header, resolved against the request URL.
    pub location: Option<String>,
}

impl PostOutcome {
    pub fn is_created(&self) -> bool {
        self.status == 201
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ---------------------------------------------------------------------------
// AuthenticatedClient
// ---------------------------------------------------------------------------

/// A `reqwest::Client` plus the credentials to present with each request.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    http: Client,
    bearer: Option<String>,
    identity: Option<SignedIdentity>,
}

impl AuthenticatedClient {
    pub fn anonymous(http: Client) -> Self {
        Self {
            http,
            bearer: None,
            identity: None,
        }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Sign every request with `identity`. A fresh signature is computed
    /// per request.
    pub fn with_identity(mut self, identity: SignedIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn identity(&self) -> Option<&SignedIdentity> {
        self.identity.as_ref()
    }

    /// GET `url` as `application/activity+json`.
    ///
    /// Non-2xx responses become [`EngineError::BadStatus`]; bodies that are
    /// not a JSON object become [`EngineError::Malformed`].
    pub async fn get_json(&self, url: &str) -> Result<Document, EngineError> {
        let request = self
            .request(Method::GET, url, None)?
            .header(header::ACCEPT, ACTIVITY_JSON);
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::BadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| EngineError::Malformed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Document::from_value(value).map_err(|e| EngineError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// POST `doc` as `application/activity+json`. The status is returned
    /// rather than raised.
    pub async fn post_json(&self, url: &str, doc: &Document) -> Result<PostOutcome, EngineError> {
        let body = serde_json::to_vec(doc).map_err(|e| EngineError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let request = self
            .request(Method::POST, url, Some(&body))?
            .header(header::CONTENT_TYPE, ACTIVITY_JSON)
            .body(body);
        let response = request.send().await?;
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|loc| response.url().join(loc).ok())
            .map(String::from);
        debug!("client: POST {url} -> {status} location={location:?}");
        Ok(PostOutcome { status, location })
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&[u8]>,
    ) -> Result<RequestBuilder, EngineError> {
        let parsed = Url::parse(url).map_err(|_| EngineError::InvalidUrl(url.to_string()))?;
        let mut builder = self.http.request(method.clone(), parsed.clone());

        if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token);
        }

        if let Some(identity) = &self.identity {
            let mut signable =
                SignableRequest::new(method.as_str(), path_and_query(&parsed), authority(&parsed)?);
            if let Some(body) = body {
                signable = signable.with_body(body.to_vec());
            }
            identity.sign(&mut signable)?;
            for (name, value) in signable.headers() {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }

        Ok(builder)
    }
}

#[async_trait]
impl Fetcher for AuthenticatedClient {
    async fn get_json(&self, url: &str) -> Result<Document, EngineError> {
        AuthenticatedClient::get_json(self, url).await
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_string(),
    }
}

fn authority(url: &Url) -> Result<String, EngineError> {
    let host = url
        .host_str()
        .ok_or_else(|| EngineError::InvalidUrl(url.to_string()))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

// ---------------------------------------------------------------------------
// ApClient
// ---------------------------------------------------------------------------

/// The remote actor under test, reached through its credentials.
#[derive(Debug, Clone)]
pub struct ApClient {
    client: AuthenticatedClient,
    profile: Document,
    uri: String,
}

impl ApClient {
    /// Fails with [`EngineError::MissingProperty`] if the profile has no `id`.
    pub fn new(client: AuthenticatedClient, profile: Document) -> Result<Self, EngineError> {
        let uri = profile
            .id()
            .ok_or_else(|| EngineError::missing(Prop::Id))?
            .to_string();
        Ok(Self {
            client,
            profile,
            uri,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn profile(&self) -> &Document {
        &self.profile
    }

    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    /// An endpoint advertised on the profile, e.g. `liked`.
    pub fn endpoint(&self, prop: Prop) -> Option<&str> {
        self.profile.uri(prop)
    }

    pub fn require_endpoint(&self, prop: Prop) -> Result<&str, EngineError> {
        self.endpoint(prop).ok_or_else(|| EngineError::missing(prop))
    }

    pub async fn post_to_outbox(&self, doc: &Document) -> Result<PostOutcome, EngineError> {
        let outbox = self.require_endpoint(Prop::Outbox)?;
        self.client.post_json(outbox, doc).await
    }

    pub async fn get_json(&self, url: &str) -> Result<Document, EngineError> {
        self.client.get_json(url).await
    }
}

#[async_trait]
impl Fetcher for ApClient {
    async fn get_json(&self, url: &str) -> Result<Document, EngineError> {
        self.client.get_json(url).await
    }
}

/// Fetch a profile anonymously. A document without `id` counts as malformed.
pub async fn fetch_profile(http: &Client, uri: &str) -> Result<Document, EngineError> {
    let profile = AuthenticatedClient::anonymous(http.clone()).get_json(uri).await?;
    if profile.id().is_none() {
        return Err(EngineError::Malformed {
            url: uri.to_string(),
            reason: "actor profile has no id".into(),
        });
    }
    Ok(profile)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
