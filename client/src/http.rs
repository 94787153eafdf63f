//! `reqwest` implementation of the remote data service.
//!
//! Endpoints, relative to the API base URL:
//!
//! | Call         | Request                                        | Response           |
//! |--------------|------------------------------------------------|--------------------|
//! | `fetch_page` | `GET /{resource}?page={n}&pageSize={size}`     | `{"items", "total"}` |
//! | `create`     | `POST /{resource}` with the entity             | created entity     |
//! | `patch`      | `PATCH /{resource}/{id}` with the patch        | updated entity     |
//! | `delete`     | `DELETE /{resource}/{id}`                      | any 2xx            |
//! | `search`     | `GET /{resource}/search?q={term}`              | array of entities  |

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use roam_engine::{error::Result, Entity, Error, Page, RemoteService};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;

/// Map a non-success HTTP status to an engine error.
///
/// `target` names what the request addressed and becomes the payload of
/// [`Error::NotFound`].
pub fn status_error(status: StatusCode, target: &str, body: &str) -> Error {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(target.to_string()),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            Error::Validation(detail)
        }
        _ => Error::Network(detail),
    }
}

fn transport(err: reqwest::Error) -> Error {
    Error::Network(err.to_string())
}

/// Remote copy of one resource behind a JSON HTTP API.
pub struct HttpRemote<T> {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for HttpRemote<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemote")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.auth_token.is_some())
            .finish()
    }
}

impl<T: Entity> HttpRemote<T> {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
            _entity: PhantomData,
        }
    }

    /// Send `token` as a bearer token with every request.
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.base_url, T::RESOURCE)
    }

    fn entity_url(&self, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, T::RESOURCE, id)
    }

    async fn send(&self, request: RequestBuilder, target: &str) -> Result<Response> {
        let request = match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = status_error(status, target, &body);
        tracing::warn!(
            resource = T::RESOURCE,
            addressed = target,
            status = status.as_u16(),
            error = %err,
            "request rejected"
        );
        Err(err)
    }
}

#[async_trait]
impl<T> RemoteService<T> for HttpRemote<T>
where
    T: Entity + Serialize + DeserializeOwned,
    T::Patch: Serialize,
{
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page<T>> {
        tracing::debug!(resource = T::RESOURCE, page, page_size, "fetching page");
        let request = self
            .client
            .get(self.collection_url())
            .query(&[("page", page), ("pageSize", page_size)]);
        let response = self.send(request, T::RESOURCE).await?;
        response.json().await.map_err(transport)
    }

    async fn create(&self, payload: T) -> Result<T> {
        let request = self.client.post(self.collection_url()).json(&payload);
        let response = self.send(request, payload.id()).await?;
        response.json().await.map_err(transport)
    }

    async fn patch(&self, id: &str, patch: T::Patch) -> Result<T> {
        let request = self.client.patch(self.entity_url(id)).json(&patch);
        let response = self.send(request, id).await?;
        response.json().await.map_err(transport)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let request = self.client.delete(self.entity_url(id));
        self.send(request, id).await?;
        Ok(())
    }

    async fn search(&self, term: &str) -> Result<Vec<T>> {
        tracing::debug!(resource = T::RESOURCE, term, "searching");
        let request = self
            .client
            .get(format!("{}/search", self.collection_url()))
            .query(&[("q", term)]);
        let response = self.send(request, T::RESOURCE).await?;
        response.json().await.map_err(transport)
    }
}
