//! Implements the store and feed traits against the dashboard's HTTP API.
//!
//! The API follows PostgREST conventions: row filters are query parameters
//! (`user_id=eq.<id>`), writes return the canonical row under
//! `Prefer: return=representation`, and change notifications are served from
//! a cursor-based `changes` endpoint the client long-polls.

use crate::api::{ChangeFeed, FeedMessage, FeedSubscription, RemoteStore};
use crate::model::{Transaction, TransactionDraft, TransactionId, TransactionPatch, UserId};
use crate::{Config, Error, Result};
use serde::Deserialize;
use tracing::{trace, warn};
use url::Url;

/// Implements `RemoteStore` and `ChangeFeed` over HTTP using `reqwest`.
pub struct RestStore {
    config: Config,
    client: reqwest::Client,
}

/// One page of the `changes` endpoint.
#[derive(Debug, Deserialize)]
struct ChangesPage {
    cursor: u64,
    events: Vec<crate::api::ChangeEvent>,
}

impl RestStore {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, name: &str) -> Result<Url> {
        let base = self.config.base_url().as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{name}"))
            .map_err(|e| Error::Validation(format!("invalid endpoint url for '{name}': {e}")))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match self.config.api_key() {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

/// Maps an HTTP response onto the engine's error kinds.
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 | 403 => Err(Error::Authorization(body)),
        409 => Err(Error::ConflictStale),
        400 | 422 => Err(Error::Validation(body)),
        _ => Err(Error::Network(format!("unexpected status {status}: {body}"))),
    }
}

fn single(mut rows: Vec<Transaction>) -> Result<Transaction> {
    match rows.len() {
        1 => Ok(rows.remove(0)),
        0 => Err(Error::Network(
            "the store returned an empty representation".to_string(),
        )),
        n => Err(Error::Network(format!(
            "the store returned {n} rows where one was expected"
        ))),
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

#[async_trait::async_trait]
impl RemoteStore for RestStore {
    async fn fetch_all(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        trace!("fetch_all for user '{user_id}'");
        let response = self
            .request(reqwest::Method::GET, self.endpoint("transactions")?)
            .query(&[
                ("user_id", eq(user_id)),
                ("order", "transaction_date.desc".to_string()),
            ])
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn insert(&self, user_id: &UserId, draft: &TransactionDraft) -> Result<Transaction> {
        trace!("insert for user '{user_id}'");
        let mut body = serde_json::to_value(draft)
            .map_err(|e| Error::Internal(format!("draft encoding failed: {e}")))?;
        if let Some(map) = body.as_object_mut() {
            map.insert(
                "user_id".to_string(),
                serde_json::Value::String(user_id.to_string()),
            );
        }
        let response = self
            .request(reqwest::Method::POST, self.endpoint("transactions")?)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;
        single(check(response).await?.json().await?)
    }

    async fn update(
        &self,
        user_id: &UserId,
        id: &TransactionId,
        patch: &TransactionPatch,
    ) -> Result<Transaction> {
        trace!("update of '{id}' for user '{user_id}'");
        let response = self
            .request(reqwest::Method::PATCH, self.endpoint("transactions")?)
            .query(&[("id", eq(id)), ("user_id", eq(user_id))])
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;
        single(check(response).await?.json().await?)
    }

    async fn remove(&self, user_id: &UserId, id: &TransactionId) -> Result<()> {
        trace!("remove of '{id}' for user '{user_id}'");
        let response = self
            .request(reqwest::Method::DELETE, self.endpoint("transactions")?)
            .query(&[("id", eq(id)), ("user_id", eq(user_id))])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChangeFeed for RestStore {
    async fn subscribe(&self, user_id: &UserId) -> Result<FeedSubscription> {
        let (sender, subscription) = FeedSubscription::channel();
        let client = self.client.clone();
        let url = self.endpoint("changes")?;
        let api_key = self.config.api_key().map(str::to_string);
        let retry = self.config.feed_retry();
        let user_filter = eq(user_id);
        let user_id = user_id.clone();

        tokio::spawn(async move {
            let mut cursor: u64 = 0;
            loop {
                if sender.is_closed() {
                    return;
                }
                let cursor_param = cursor.to_string();
                let mut request = client.get(url.clone()).query(&[
                    ("user_id", user_filter.as_str()),
                    ("cursor", cursor_param.as_str()),
                ]);
                if let Some(key) = &api_key {
                    request = request.bearer_auth(key);
                }
                let page = match request.send().await {
                    Ok(response) => match check(response).await {
                        Ok(ok) => ok.json::<ChangesPage>().await.map_err(Error::from),
                        Err(e) => Err(e),
                    },
                    Err(e) => Err(Error::from(e)),
                };
                match page {
                    Ok(page) => {
                        cursor = page.cursor;
                        for event in page.events {
                            if sender.send(FeedMessage::Event(event)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("change feed poll for user '{user_id}' failed: {e}");
                        if sender.send(FeedMessage::Disrupted).await.is_err() {
                            return;
                        }
                        tokio::time::sleep(retry).await;
                    }
                }
            }
        });

        Ok(subscription)
    }
}
