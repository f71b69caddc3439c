// REST client for the document API.
//
//   GET   {base}/documents/{id}   → 200 record | 404
//   PATCH {base}/documents/{id}   ← DocumentPatch JSON

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{DocumentPatch, RemoteError, RemoteStore};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpRemoteStore {
    /// Build a client for `base_url`, which must be an absolute http(s) URL.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, RemoteError> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let base = Url::parse(base_url)
            .map_err(|e| RemoteError::InvalidUrl(format!("`{base_url}`: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(format!("`{base_url}`: expected an http(s) URL")));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        Ok(Self { client, base, token: token.filter(|t| !t.is_empty()) })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `{base}/documents/{id}` with `id` percent-encoded as one segment.
    pub fn document_url(&self, id: &str) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .push("documents")
            .push(id);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl RemoteStore for HttpRemoteStore {
    async fn fetch(&self, id: &str) -> Result<Option<Value>, RemoteError> {
        let url = self.document_url(id)?;
        let response = self.authorize(self.client.get(url)).send().await.map_err(transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(doc_id = id, "remote fetch: not found");
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        let record = response.json::<Value>().await.map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(Some(record))
    }

    async fn update(&self, id: &str, patch: &DocumentPatch) -> Result<(), RemoteError> {
        let url = self.document_url(id)?;
        let response =
            self.authorize(self.client.patch(url)).json(patch).send().await.map_err(transport)?;
        ensure_success(response).await?;
        debug!(doc_id = id, "remote update accepted");
        Ok(())
    }
}

fn transport(error: reqwest::Error) -> RemoteError {
    RemoteError::Unavailable(error.to_string())
}

async fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(RemoteError::Rejected { status: status.as_u16(), message })
}
