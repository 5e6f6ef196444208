//! Reddit thread client and comment collector.
//!
//! Talks to the public JSON listing API. A submission's comment tree arrives
//! partially paginated: anywhere in the forest a `more` placeholder can stand
//! in for unloaded children. The collector expands every placeholder (no
//! depth limit), filters deleted and empty comments, and flattens the tree
//! depth-first with each comment ahead of its replies, in listing order.
//!
//! The HTTP transport sits behind the [`RedditApi`] trait so the expansion
//! and ordering logic is exercised against an in-memory fake in tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use axum::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, info};

/// Author shown when the original account is unavailable or deleted.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Bodies carrying these markers are moderation tombstones, not content.
const DELETED_MARKERS: [&str; 2] = ["[deleted]", "[removed]"];

/// The morechildren endpoint accepts at most this many ids per call.
const MORE_CHILDREN_BATCH: usize = 100;

static POST_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:/comments/|redd\.it/)([a-z0-9]+)").unwrap());

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("unrecognized discussion URL: {0}")]
    InvalidUrl(String),

    #[error("reddit request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("reddit returned status {status} for {url}")]
    Api {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("unexpected reddit response shape: {0}")]
    Malformed(String),
}

// ============================================================================
// Wire model
// ============================================================================

/// One node of Reddit's `{"kind": ..., "data": ...}` envelope. Kinds the
/// collector does not care about (subreddits, awards) fall into `Other`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Thing {
    #[serde(rename = "Listing")]
    Listing(Listing),
    #[serde(rename = "t3")]
    Link(LinkData),
    #[serde(rename = "t1")]
    Comment(CommentData),
    #[serde(rename = "more")]
    More(MoreData),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub children: Vec<Thing>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub num_comments: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentData {
    pub id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub parent_id: String,
    /// The API sends `""` instead of an empty listing when a comment has no
    /// loaded replies.
    #[serde(default, deserialize_with = "listing_or_empty")]
    pub replies: Listing,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoreData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub children: Vec<String>,
}

fn listing_or_empty<'de, D>(deserializer: D) -> Result<Listing, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_object() {
        if let Ok(Thing::Listing(listing)) = serde_json::from_value::<Thing>(value) {
            return Ok(listing);
        }
    }
    Ok(Listing::default())
}

#[derive(Debug, Deserialize)]
struct MoreChildrenEnvelope {
    json: MoreChildrenJson,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenJson {
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    data: Option<MoreChildrenData>,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenData {
    #[serde(default)]
    things: Vec<Thing>,
}

// ============================================================================
// Transport
// ============================================================================

/// The three listing operations the collector needs. `RedditClient` is the
/// production implementation; tests substitute an in-memory fake.
#[async_trait]
pub trait RedditApi: Send + Sync {
    /// The submission link plus its top-level comment forest.
    async fn submission(&self, post_id: &str) -> Result<(LinkData, Vec<Thing>), CollectorError>;

    /// Resolves placeholder child ids into a flat list of things.
    async fn more_children(
        &self,
        post_id: &str,
        children: &[String],
    ) -> Result<Vec<Thing>, CollectorError>;

    /// The replies currently under one comment, for depth-exhausted
    /// placeholders that carry no child ids of their own.
    async fn comment_subtree(
        &self,
        post_id: &str,
        comment_id: &str,
    ) -> Result<Vec<Thing>, CollectorError>;
}

pub struct RedditClient {
    client: reqwest::Client,
    base_url: String,
}

impl RedditClient {
    pub fn new(
        base_url: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, CollectorError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(RedditClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CollectorError> {
        debug!(%url, "fetching");
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(CollectorError::Api {
                status: response.status(),
                url: url.to_string(),
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl RedditApi for RedditClient {
    async fn submission(&self, post_id: &str) -> Result<(LinkData, Vec<Thing>), CollectorError> {
        let url = format!(
            "{}/comments/{}.json?raw_json=1&limit=500",
            self.base_url, post_id
        );
        let listings: Vec<Thing> = self.get_json(&url).await?;

        // The endpoint returns two listings: the link itself, then comments.
        let mut listings = listings.into_iter();
        let link = match listings.next() {
            Some(Thing::Listing(listing)) => listing.children.into_iter().find_map(|t| match t {
                Thing::Link(link) => Some(link),
                _ => None,
            }),
            _ => None,
        }
        .ok_or_else(|| {
            CollectorError::Malformed(format!("submission {post_id} carries no link data"))
        })?;

        let comments = match listings.next() {
            Some(Thing::Listing(listing)) => listing.children,
            _ => {
                return Err(CollectorError::Malformed(format!(
                    "submission {post_id} carries no comment listing"
                )))
            }
        };

        Ok((link, comments))
    }

    async fn more_children(
        &self,
        post_id: &str,
        children: &[String],
    ) -> Result<Vec<Thing>, CollectorError> {
        let mut things = Vec::new();
        for chunk in children.chunks(MORE_CHILDREN_BATCH) {
            let url = format!(
                "{}/api/morechildren.json?api_type=json&raw_json=1&link_id=t3_{}&children={}",
                self.base_url,
                post_id,
                chunk.join(",")
            );
            let envelope: MoreChildrenEnvelope = self.get_json(&url).await?;
            if !envelope.json.errors.is_empty() {
                return Err(CollectorError::Malformed(format!(
                    "morechildren reported errors: {:?}",
                    envelope.json.errors
                )));
            }
            things.extend(envelope.json.data.map(|d| d.things).unwrap_or_default());
        }
        Ok(things)
    }

    async fn comment_subtree(
        &self,
        post_id: &str,
        comment_id: &str,
    ) -> Result<Vec<Thing>, CollectorError> {
        let url = format!(
            "{}/comments/{}/_/{}.json?raw_json=1&limit=500",
            self.base_url, post_id, comment_id
        );
        let listings: Vec<Thing> = self.get_json(&url).await?;

        if let Some(Thing::Listing(listing)) = listings.into_iter().nth(1) {
            for child in listing.children {
                if let Thing::Comment(comment) = child {
                    if comment.id == comment_id {
                        return Ok(comment.replies.children);
                    }
                }
            }
        }
        // The focused comment is gone; the placeholder resolves to nothing.
        Ok(Vec::new())
    }
}

// ============================================================================
// Collector
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedComment {
    pub text: String,
    pub author: String,
}

#[derive(Debug, Clone)]
pub struct CollectedThread {
    pub title: String,
    pub comments: Vec<CollectedComment>,
}

pub struct CommentCollector {
    api: Arc<dyn RedditApi>,
}

impl CommentCollector {
    pub fn new(api: Arc<dyn RedditApi>) -> Self {
        CommentCollector { api }
    }

    /// Fetches the submission behind `post_url` and returns its title plus
    /// every reachable comment, fully expanded and in tree order. Any
    /// transport failure aborts the whole fetch.
    pub async fn fetch(&self, post_url: &str) -> Result<CollectedThread, CollectorError> {
        let post_id = extract_post_id(post_url)
            .ok_or_else(|| CollectorError::InvalidUrl(post_url.to_string()))?;

        let (link, forest) = self.api.submission(&post_id).await?;
        info!(
            post_id = %link.id,
            title = %link.title,
            announced_comments = link.num_comments,
            "expanding comment tree"
        );

        let comments = self.flatten(&post_id, forest).await?;
        info!(collected = comments.len(), "comment tree fully expanded");

        Ok(CollectedThread {
            title: link.title,
            comments,
        })
    }

    /// Depth-first walk over the forest. Placeholders are resolved in place:
    /// whatever they expand to is visited before the placeholder's next
    /// sibling, which keeps the output in listing order.
    async fn flatten(
        &self,
        post_id: &str,
        roots: Vec<Thing>,
    ) -> Result<Vec<CollectedComment>, CollectorError> {
        let mut out = Vec::new();
        let mut queue: VecDeque<Thing> = VecDeque::from(roots);

        while let Some(thing) = queue.pop_front() {
            match thing {
                Thing::Comment(comment) => {
                    let CommentData {
                        body,
                        author,
                        replies,
                        ..
                    } = comment;
                    if is_substantive(&body) {
                        out.push(CollectedComment {
                            text: body,
                            author: author_or_sentinel(author),
                        });
                    }
                    for child in replies.children.into_iter().rev() {
                        queue.push_front(child);
                    }
                }
                Thing::More(more) => {
                    let resolved = if more.children.is_empty() {
                        // "continue this thread" stub: the ids live one fetch
                        // deeper, under the placeholder's parent comment.
                        match more.parent_id.strip_prefix("t1_") {
                            Some(parent) => self.api.comment_subtree(post_id, parent).await?,
                            None => Vec::new(),
                        }
                    } else {
                        let flat = self.api.more_children(post_id, &more.children).await?;
                        thread_by_parent(flat)
                    };
                    debug!(
                        placeholder = %more.id,
                        announced = more.count,
                        requested = more.children.len(),
                        resolved = resolved.len(),
                        pending = queue.len(),
                        "expanded placeholder"
                    );
                    for thing in resolved.into_iter().rev() {
                        queue.push_front(thing);
                    }
                }
                Thing::Listing(listing) => {
                    for child in listing.children.into_iter().rev() {
                        queue.push_front(child);
                    }
                }
                Thing::Link(_) | Thing::Other => {}
            }
        }

        Ok(out)
    }
}

/// Extracts the submission id from any `/comments/{id}/...` URL form or a
/// `redd.it/{id}` short link.
pub fn extract_post_id(url: &str) -> Option<String> {
    POST_ID_RE
        .captures(url)
        .map(|caps| caps[1].to_lowercase())
}

fn is_substantive(body: &str) -> bool {
    let trimmed = body.trim();
    !trimmed.is_empty() && !DELETED_MARKERS.contains(&trimmed)
}

/// The API reports a deleted account either as a missing field or as the
/// literal `[deleted]` string; both collapse to the sentinel.
fn author_or_sentinel(author: Option<String>) -> String {
    author
        .filter(|a| {
            let trimmed = a.trim();
            !trimmed.is_empty() && !DELETED_MARKERS.contains(&trimmed)
        })
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}

/// Rebuilds tree structure from a flat morechildren batch. Things whose
/// parent is inside the batch nest under it; the rest surface as roots at the
/// placeholder's position. Relative order is preserved throughout.
fn thread_by_parent(things: Vec<Thing>) -> Vec<Thing> {
    let present: HashSet<String> = things
        .iter()
        .filter_map(|t| match t {
            Thing::Comment(c) => Some(format!("t1_{}", c.id)),
            _ => None,
        })
        .collect();

    let mut children_of: HashMap<String, Vec<Thing>> = HashMap::new();
    let mut roots = Vec::new();
    for thing in things {
        let parent = match &thing {
            Thing::Comment(c) => c.parent_id.clone(),
            Thing::More(m) => m.parent_id.clone(),
            _ => String::new(),
        };
        if present.contains(&parent) {
            children_of.entry(parent).or_default().push(thing);
        } else {
            roots.push(thing);
        }
    }

    roots
        .into_iter()
        .map(|thing| attach_children(thing, &mut children_of))
        .collect()
}

fn attach_children(thing: Thing, children_of: &mut HashMap<String, Vec<Thing>>) -> Thing {
    match thing {
        Thing::Comment(mut comment) => {
            if let Some(kids) = children_of.remove(&format!("t1_{}", comment.id)) {
                for kid in kids {
                    let kid = attach_children(kid, children_of);
                    comment.replies.children.push(kid);
                }
            }
            Thing::Comment(comment)
        }
        other => other,
    }
}
