//! Token and vote storage in remote lists, accessed through the Microsoft
//! Graph list items API.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use reqwest::{header, Client as HttpClient, Response, StatusCode};
use rocket::{
    http::Status,
    serde::json::{serde_json::Map, Value},
    tokio::sync::Mutex,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    ballot::{Ballot, LedgerRecord},
    text::is_used_marker,
    token::{format_timestamp, parse_timestamp, AccessToken, TokenCode},
};

use super::{TokenStore, VoteLedger};

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Access tokens are refreshed this long before they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Configuration for the remote list backend.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    // non-secrets
    pub graph_tenant_id: String,
    pub graph_client_id: String,
    pub graph_site_id: String,
    pub graph_tokens_list_id: String,
    pub graph_votes_list_id: String,
    pub graph_base_url: String,
    pub graph_authority_url: String,
    /// Seconds before any single request is abandoned.
    pub request_timeout: u64,
    // secrets
    pub graph_client_secret: String,
}

/// A bearer token and when it stops being valid.
#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// A list item as returned by the list API.
#[derive(Debug, Clone, Deserialize)]
struct ListItem {
    id: String,
    #[serde(rename = "@odata.etag")]
    etag: Option<String>,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ListItems {
    #[serde(default)]
    value: Vec<ListItem>,
}

#[derive(Serialize)]
struct NewItem<'a, F> {
    fields: &'a F,
}

/// An authenticated client for one site's lists. The client-credential
/// access token is cached for the life of the process and refreshed on
/// expiry.
pub struct GraphClient {
    http: HttpClient,
    config: GraphConfig,
    cached: Mutex<Option<CachedToken>>,
}

impl GraphClient {
    pub fn new(config: GraphConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(StdDuration::from_secs(config.request_timeout))
            .build()?;
        Ok(Self {
            http,
            config,
            cached: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.graph_authority_url.trim_end_matches('/'),
            self.config.graph_tenant_id
        )
    }

    fn items_url(&self, list_id: &str) -> String {
        format!(
            "{}/sites/{}/lists/{}/items",
            self.config.graph_base_url.trim_end_matches('/'),
            self.config.graph_site_id,
            list_id
        )
    }

    /// Get a valid bearer token, acquiring a new one if the cached token is
    /// missing or about to expire.
    async fn bearer(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let margin = Duration::seconds(EXPIRY_MARGIN_SECS);
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Utc::now() + margin) {
            return Ok(token.value.clone());
        }

        debug!("Acquiring list API access token");
        let response = self
            .http
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.graph_client_id.as_str()),
                ("client_secret", self.config.graph_client_secret.as_str()),
                ("scope", GRAPH_SCOPE),
            ])
            .send()
            .await?;
        let response = check(response, "access token acquisition")?;
        let body: TokenResponse = response.json().await?;

        let token = CachedToken {
            value: body.access_token,
            expires_at: Utc::now() + Duration::seconds(body.expires_in),
        };
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// First item of `list_id` whose `Title` equals `title`.
    async fn find_by_title(&self, list_id: &str, title: &str) -> Result<Option<ListItem>> {
        let filter = format!("fields/Title eq '{}'", title.replace('\'', "''"));
        let response = self
            .http
            .get(self.items_url(list_id))
            .bearer_auth(self.bearer().await?)
            .header("Prefer", "HonorNonIndexedQueriesWarningMayFailRandomly")
            .query(&[
                ("$filter", filter.as_str()),
                ("$select", "id,fields"),
                ("$top", "1"),
            ])
            .send()
            .await?;
        let items: ListItems = check(response, "list item lookup")?.json().await?;
        Ok(items.value.into_iter().next())
    }

    /// Update fields of one item. With an `etag`, the update only applies if
    /// the item is unchanged since it was read.
    async fn patch_fields(
        &self,
        list_id: &str,
        item_id: &str,
        etag: Option<&str>,
        fields: &Value,
    ) -> Result<()> {
        let mut request = self
            .http
            .patch(format!("{}/{}/fields", self.items_url(list_id), item_id))
            .bearer_auth(self.bearer().await?)
            .json(fields);
        if let Some(etag) = etag {
            request = request.header(header::IF_MATCH, etag);
        }
        check(request.send().await?, "list item update")?;
        Ok(())
    }

    async fn create_item<F: Serialize>(&self, list_id: &str, fields: &F) -> Result<()> {
        let response = self
            .http
            .post(self.items_url(list_id))
            .bearer_auth(self.bearer().await?)
            .json(&NewItem { fields })
            .send()
            .await?;
        check(response, "list item creation")?;
        Ok(())
    }
}

/// Turn any non-2xx response into [`Error::RemoteApi`].
fn check(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::RemoteApi {
            status: Status::new(status.as_u16()),
            context: context.to_string(),
        })
    }
}

/// Interpret a remote `Usado` value, which may be a boolean, number or text.
fn used_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => is_used_marker(s),
        _ => false,
    }
}

impl ListItem {
    fn to_access_token(&self, token: &TokenCode) -> AccessToken {
        let used = used_flag(self.fields.get("Usado"));
        let used_at = if used {
            self.fields
                .get("FechaUso")
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
        } else {
            None
        };
        AccessToken {
            token: token.clone(),
            used,
            used_at,
            email: None,
        }
    }
}

/// The tokens list. Tokens are stored in the `Title` column.
pub struct GraphTokenList {
    client: std::sync::Arc<GraphClient>,
}

impl GraphTokenList {
    pub fn new(client: std::sync::Arc<GraphClient>) -> Self {
        Self { client }
    }

    fn list_id(&self) -> &str {
        &self.client.config().graph_tokens_list_id
    }
}

#[rocket::async_trait]
impl TokenStore for GraphTokenList {
    async fn lookup(&self, token: &TokenCode) -> Result<Option<AccessToken>> {
        let item = self.client.find_by_title(self.list_id(), token.as_str()).await?;
        Ok(item.map(|item| item.to_access_token(token)))
    }

    async fn mark_used(&self, token: &TokenCode, at: DateTime<Utc>) -> Result<()> {
        let item = self
            .client
            .find_by_title(self.list_id(), token.as_str())
            .await?
            .ok_or_else(|| Error::TokenNotFound(token.to_string()))?;
        if item.to_access_token(token).used {
            return Err(Error::TokenAlreadyUsed);
        }

        let fields = rocket::serde::json::json!({
            "Usado": true,
            "FechaUso": format_timestamp(at),
        });
        match self
            .client
            .patch_fields(self.list_id(), &item.id, item.etag.as_deref(), &fields)
            .await
        {
            Err(Error::RemoteApi { status, .. })
                if status.code == StatusCode::PRECONDITION_FAILED.as_u16() =>
            {
                warn!("Access code changed concurrently while being marked used");
                Err(Error::TokenAlreadyUsed)
            }
            other => other,
        }
    }
}

/// The votes list.
pub struct GraphVoteList {
    client: std::sync::Arc<GraphClient>,
}

impl GraphVoteList {
    pub fn new(client: std::sync::Arc<GraphClient>) -> Self {
        Self { client }
    }
}

#[rocket::async_trait]
impl VoteLedger for GraphVoteList {
    async fn append(&self, ballot: &Ballot) -> Result<()> {
        let record: LedgerRecord = ballot.to_record();
        self.client
            .create_item(&self.client.config().graph_votes_list_id, &record)
            .await
    }
}
