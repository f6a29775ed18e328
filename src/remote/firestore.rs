use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};

use super::backoff::Backoff;
use super::document::{contact_document, message_document, parse_contact, parse_message};
use super::{
    CONTACTS_COLLECTION, MESSAGES_COLLECTION, RemoteContacts, RemoteMessages, SnapshotStream,
};
use crate::auth::SessionTokens;
use crate::common::{ChatMessage, Contact, MessageEntry};
use crate::error::SyncError;

const API_ROOT: &str = "https://firestore.googleapis.com/v1";
const PAGE_SIZE: &str = "300";

/// How the live message feed polls the backend.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// Document database client over the Firestore REST API.
#[derive(Clone)]
pub struct FirestoreClient {
    http: HttpClient,
    documents_url: String,
    api_key: Option<String>,
    tokens: Option<Arc<SessionTokens>>,
    poll: PollSettings,
}

impl FirestoreClient {
    pub fn new(project_id: &str, api_key: Option<String>, poll: PollSettings) -> Self {
        Self {
            http: HttpClient::new(),
            documents_url: format!(
                "{API_ROOT}/projects/{}/databases/(default)/documents",
                project_id.trim()
            ),
            api_key: api_key.filter(|key| !key.is_empty()),
            tokens: None,
            poll,
        }
    }

    /// Authorise requests as the signed-in user.
    pub fn with_session(mut self, tokens: Arc<SessionTokens>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.documents_url, collection)
    }

    fn authorize(&self, mut req: RequestBuilder, id_token: Option<&str>) -> RequestBuilder {
        if let Some(key) = &self.api_key {
            req = req.query(&[("key", key.as_str())]);
        }
        if let Some(token) = id_token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Send the request built by `build`. A 401 on a signed-in client
    /// refreshes the ID token and sends once more.
    async fn execute<F>(&self, build: F) -> Result<Response, String>
    where
        F: Fn() -> RequestBuilder,
    {
        let id_token = match &self.tokens {
            Some(tokens) => Some(tokens.id_token().await),
            None => None,
        };
        let resp = self
            .authorize(build(), id_token.as_deref())
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let (Some(tokens), Some(rejected)) = (&self.tokens, id_token) else {
            return check_status(resp).await;
        };
        if resp.status() != StatusCode::UNAUTHORIZED {
            return check_status(resp).await;
        }
        log::info!("ID token rejected, refreshing");
        let fresh = tokens.refresh(&rejected).await.map_err(|e| e.to_string())?;
        let resp = self
            .authorize(build(), Some(&fresh))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        check_status(resp).await
    }

    async fn create_document(&self, collection: &str, body: Value) -> Result<(), String> {
        let url = self.collection_url(collection);
        self.execute(|| self.http.post(&url).json(&body)).await?;
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>, String> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = self.collection_url(CONTACTS_COLLECTION);
            let build = || {
                let req = self.http.get(&url).query(&[("pageSize", PAGE_SIZE)]);
                match &page_token {
                    Some(token) => req.query(&[("pageToken", token.as_str())]),
                    None => req,
                }
            };
            let json: Value = self
                .execute(build)
                .await?
                .json()
                .await
                .map_err(|e| e.to_string())?;

            let documents = json
                .get("documents")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            let before = out.len();
            out.extend(documents.iter().filter_map(parse_contact));
            let skipped = documents.len() - (out.len() - before);
            if skipped > 0 {
                log::debug!("Skipped {skipped} incomplete contact documents");
            }

            page_token = json
                .get("nextPageToken")
                .and_then(|v| v.as_str())
                .filter(|token| !token.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }
        Ok(out)
    }

    async fn query_messages(&self) -> Result<Vec<ChatMessage>, String> {
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": MESSAGES_COLLECTION }],
                "orderBy": [{
                    "field": { "fieldPath": "timestamp" },
                    "direction": "ASCENDING"
                }]
            }
        });
        let url = format!("{}:runQuery", self.documents_url);
        let rows: Vec<Value> = self
            .execute(|| self.http.post(&url).json(&body))
            .await?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        // Rows without a `document` only carry read metadata.
        Ok(rows
            .iter()
            .filter_map(|row| row.get("document"))
            .filter_map(parse_message)
            .collect())
    }
}

async fn check_status(resp: Response) -> Result<Response, String> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let detail = resp
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| {
            body.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default();
    if detail.is_empty() {
        Err(format!("HTTP {status}"))
    } else {
        Err(format!("HTTP {status}: {detail}"))
    }
}

#[async_trait]
impl RemoteContacts for FirestoreClient {
    async fn fetch_all_once(&self) -> Result<Vec<Contact>, SyncError> {
        let contacts = self.list_contacts().await.map_err(SyncError::RemoteFetch)?;
        log::info!("Fetched {} remote contacts", contacts.len());
        Ok(contacts)
    }

    async fn push(&self, contact: &Contact) -> Result<(), SyncError> {
        self.create_document(CONTACTS_COLLECTION, contact_document(contact))
            .await
            .map_err(SyncError::RemoteWrite)
    }
}

struct FeedState {
    client: FirestoreClient,
    backoff: Backoff,
    last: Option<Vec<MessageEntry>>,
    wait: Option<Duration>,
}

#[async_trait]
impl RemoteMessages for FirestoreClient {
    /// Polls the ordered query, yielding only when the result changed.
    /// Failures are yielded too, then retried after an exponential delay.
    fn snapshots(&self) -> SnapshotStream {
        let state = FeedState {
            client: self.clone(),
            backoff: Backoff::new(self.poll.backoff_initial, self.poll.backoff_max),
            last: None,
            wait: None,
        };
        futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(delay) = state.wait.take() {
                    tokio::time::sleep(delay).await;
                }
                match state.client.query_messages().await {
                    Ok(messages) => {
                        state.backoff.reset();
                        state.wait = Some(state.client.poll.interval);
                        let snapshot: Vec<MessageEntry> =
                            messages.iter().map(ChatMessage::entry).collect();
                        if state.last.as_ref() != Some(&snapshot) {
                            state.last = Some(snapshot.clone());
                            return Some((Ok(snapshot), state));
                        }
                    }
                    Err(err) => {
                        let delay = state.backoff.next_delay();
                        log::warn!("Message feed error, retrying in {delay:?}: {err}");
                        state.wait = Some(delay);
                        return Some((Err(SyncError::RemoteFetch(err)), state));
                    }
                }
            }
        })
        .boxed()
    }

    async fn send(&self, message: &ChatMessage) -> Result<(), SyncError> {
        self.create_document(MESSAGES_COLLECTION, message_document(message))
            .await
            .map_err(SyncError::RemoteWrite)
    }
}
