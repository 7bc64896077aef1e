use anyhow::{Context, Result};
use async_trait::async_trait;
use domain::protocol::{
    CreateCommentRequest, LookupDisplayNamesRequest, UpsertProfileRequest, CHANGE_EVENT,
};
use domain::{AuthorId, ChangeEvent, NewComment, Profile, StoredComment};
use futures::StreamExt;
use reqwest::header::ACCEPT;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::subscription::Subscription;
use crate::traits::CommentStore;

const CHANGE_BUFFER: usize = 32;

/// Comment store served by a remote `server` process.
#[derive(Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn upsert_profile(&self, author_id: &AuthorId, display_name: &str) -> Result<Profile> {
        let profile = self
            .client
            .put(self.url(&format!("/api/profiles/{}", author_id)))
            .json(&UpsertProfileRequest {
                display_name: display_name.to_string(),
            })
            .send()
            .await
            .context("Failed to reach profile store")?
            .error_for_status()
            .context("Profile update rejected")?
            .json()
            .await
            .context("Malformed profile")?;
        Ok(profile)
    }
}

#[async_trait]
impl CommentStore for HttpStore {
    async fn list_comments(&self) -> Result<Vec<StoredComment>> {
        let comments = self
            .client
            .get(self.url("/api/comments"))
            .send()
            .await
            .context("Failed to reach comment store")?
            .error_for_status()?
            .json()
            .await
            .context("Malformed comment list")?;
        Ok(comments)
    }

    async fn lookup_display_names(
        &self,
        ids: &BTreeSet<AuthorId>,
    ) -> Result<HashMap<AuthorId, String>> {
        let body = LookupDisplayNamesRequest {
            ids: ids.iter().cloned().collect(),
        };
        let names = self
            .client
            .post(self.url("/api/profiles/lookup"))
            .json(&body)
            .send()
            .await
            .context("Failed to reach profile store")?
            .error_for_status()?
            .json()
            .await
            .context("Malformed display name map")?;
        Ok(names)
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<StoredComment> {
        let body = CreateCommentRequest {
            text: comment.text.into_inner(),
            author_id: comment.author_id.to_string(),
        };
        let stored = self
            .client
            .post(self.url("/api/comments"))
            .json(&body)
            .send()
            .await
            .context("Failed to reach comment store")?
            .error_for_status()
            .context("Comment rejected by store")?
            .json()
            .await
            .context("Malformed stored comment")?;
        Ok(stored)
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let resp = self
            .client
            .get(self.url("/api/comments/sse"))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .context("Failed to open change stream")?
            .error_for_status()?;

        let (tx, rx) = mpsc::channel(CHANGE_BUFFER);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut body = resp.bytes_stream();
            let mut decoder = SseDecoder::default();
            loop {
                let chunk = tokio::select! {
                    _ = token.cancelled() => break,
                    next = body.next() => next,
                };
                match chunk {
                    Some(Ok(bytes)) => {
                        for event in decoder.push(&bytes) {
                            if event.name.as_deref().is_some_and(|n| n != CHANGE_EVENT) {
                                continue;
                            }
                            let change = serde_json::from_str::<ChangeEvent>(&event.data)
                                .unwrap_or(ChangeEvent::Resync);
                            if tx.send(change).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Change stream failed: {}", e);
                        break;
                    }
                    None => {
                        info!("Change stream closed by server");
                        break;
                    }
                }
            }
        });

        Ok(Subscription::new(rx, cancel))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub name: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` parser. Chunks may split lines (and
/// UTF-8 sequences) anywhere.
#[derive(Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    name: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);

            if line.is_empty() {
                if let Some(ev) = self.dispatch() {
                    events.push(ev);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
                None => (&*line, ""),
            };
            match field {
                "event" => self.name = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let name = self.name.take();
        if self.data.is_empty() && name.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { name, data })
    }
}
