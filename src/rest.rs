use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::draft::Draft;
use crate::error::{Result, RosterError};
use crate::service::RecordService;
use crate::types::{Entity, ItemPublic, MeetingPublic, Record, RecordPage, UserPublic};

/// JSON API client for the records backend
pub struct RestClient {
    client: Client,
    base_url: String,
    prefix: String,
    token: String,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// List endpoints wrap rows as `{ "data": [...], "count": n }`
#[derive(Deserialize)]
struct Envelope<T> {
    data: Vec<T>,
    #[serde(default)]
    count: Option<u64>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

impl RestClient {
    pub fn new(base_url: &str, prefix: &str, token: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("roster/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| RosterError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            prefix: normalize_prefix(prefix),
            token,
        })
    }

    fn collection_url(&self, entity: Entity) -> String {
        format!("{}{}/{}/", self.base_url, self.prefix, entity.path())
    }

    fn record_url(&self, entity: Entity, id: u64) -> String {
        format!("{}{}/{}/{}", self.base_url, self.prefix, entity.path(), id)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| RosterError::Api(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        warn!(%status, "request failed");
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(RosterError::Auth(format!("{}: {}", status, error_detail(&text))));
        }
        Err(RosterError::Api(format!("{}: {}", status, error_detail(&text))))
    }

    async fn send_json<T: DeserializeOwned + Send>(&self, request: RequestBuilder) -> Result<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| RosterError::Api(e.to_string()))
    }

    async fn list_as<T: DeserializeOwned + Send>(
        &self,
        entity: Entity,
        skip: u32,
        limit: u32,
        wrap: fn(T) -> Record,
    ) -> Result<RecordPage> {
        let url = self.collection_url(entity);
        let request = self
            .request(Method::GET, &url)
            .query(&[("skip", skip), ("limit", limit)]);
        let envelope: Envelope<T> = self.send_json(request).await?;
        Ok(RecordPage {
            data: envelope.data.into_iter().map(wrap).collect(),
            count: envelope.count,
        })
    }

    async fn write(&self, method: Method, url: &str, draft: &Draft, creating: bool) -> Result<Record> {
        let request = self.request(method, url).json(&draft.body(creating));
        Ok(match draft.entity() {
            Entity::User => Record::User(self.send_json::<UserPublic>(request).await?),
            Entity::Item => Record::Item(self.send_json::<ItemPublic>(request).await?),
            Entity::Meeting => Record::Meeting(self.send_json::<MeetingPublic>(request).await?),
        })
    }
}

/// `api/v1/` and `/api/v1` both become `/api/v1`
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// FastAPI-style backends put the message under `detail`, either as a
/// string or as a list of validation errors
fn error_detail(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return body.trim().to_string();
    };
    match parsed.detail {
        serde_json::Value::String(s) => s,
        serde_json::Value::Array(errors) => errors
            .iter()
            .filter_map(|e| e.get("msg").and_then(|m| m.as_str()))
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

#[async_trait]
impl RecordService for RestClient {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn list(&self, entity: Entity, skip: u32, limit: u32) -> Result<RecordPage> {
        debug!(entity = entity.path(), skip, limit, "GET list");
        match entity {
            Entity::User => self.list_as(entity, skip, limit, Record::User).await,
            Entity::Item => self.list_as(entity, skip, limit, Record::Item).await,
            Entity::Meeting => self.list_as(entity, skip, limit, Record::Meeting).await,
        }
    }

    async fn create(&self, draft: &Draft) -> Result<Record> {
        let url = self.collection_url(draft.entity());
        self.write(Method::POST, &url, draft, true).await
    }

    async fn update(&self, id: u64, draft: &Draft) -> Result<Record> {
        let entity = draft.entity();
        // users take partial updates, the other collections replace
        let method = match entity {
            Entity::User => Method::PATCH,
            Entity::Item | Entity::Meeting => Method::PUT,
        };
        let url = self.record_url(entity, id);
        self.write(method, &url, draft, false).await
    }

    async fn delete(&self, entity: Entity, id: u64) -> Result<()> {
        let url = self.record_url(entity, id);
        self.send(self.request(Method::DELETE, &url)).await?;
        Ok(())
    }
}
