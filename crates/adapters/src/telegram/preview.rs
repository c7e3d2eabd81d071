//! Source gateway over Telegram's public channel preview (`t.me/s/<name>`)
//!
//! The preview page needs no credentials and lists the most recent posts of
//! a public channel; `?after=<id>` pages forward from a known post.

use async_trait::async_trait;
use news_digest_domain::{ChannelHandle, ChannelRef, PostId, RawPost, SourceError, SourceGateway};
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use url::Url;

pub const DEFAULT_PREVIEW_BASE_URL: &str = "https://t.me";

/// Scrapes public channel previews
pub struct TelegramPreviewSource {
    client: Client,
    base_url: Url,
}

impl TelegramPreviewSource {
    pub fn new(request_timeout: Duration) -> Result<Self, SourceError> {
        Self::with_base_url(DEFAULT_PREVIEW_BASE_URL, request_timeout)
    }

    pub fn with_base_url(base_url: &str, request_timeout: Duration) -> Result<Self, SourceError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SourceError::Api(format!("Invalid preview base URL: {}", e)))?;

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    fn preview_url(&self, channel: &str, after: Option<PostId>) -> Result<Url, SourceError> {
        let mut url = self
            .base_url
            .join(&format!("s/{}", channel))
            .map_err(|e| SourceError::Api(e.to_string()))?;
        if let Some(after) = after {
            url.query_pairs_mut().append_pair("after", &after.to_string());
        }
        Ok(url)
    }

    async fn fetch_page(&self, url: Url, channel: &str) -> Result<String, SourceError> {
        let response = self
            .client
            .get(url)
            .header("Accept-Language", "ru,en;q=0.9")
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(SourceError::RateLimited(retry_after));
        }

        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(channel.to_string()));
        }

        if !status.is_success() {
            return Err(SourceError::Api(format!(
                "Preview for {} returned {}",
                channel, status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))
    }
}

#[async_trait]
impl SourceGateway for TelegramPreviewSource {
    async fn resolve_channel(&self, channel: &ChannelRef) -> Result<ChannelHandle, SourceError> {
        let url = self.preview_url(channel.name(), None)?;
        let html = self.fetch_page(url, channel.name()).await?;

        let title = parse_channel_title(&html)?
            .ok_or_else(|| SourceError::NotFound(channel.name().to_string()))?;

        tracing::debug!(channel = %channel, title = %title, "Resolved channel");

        Ok(ChannelHandle {
            reference: channel.clone(),
            title,
        })
    }

    async fn fetch_since(
        &self,
        handle: &ChannelHandle,
        cursor: PostId,
        limit: usize,
    ) -> Result<Vec<RawPost>, SourceError> {
        let name = handle.reference.name();

        // A fresh channel starts from its latest page rather than its first post
        let after = (cursor > PostId::ZERO).then_some(cursor);
        let url = self.preview_url(name, after)?;
        let html = self.fetch_page(url, name).await?;

        let mut posts: Vec<RawPost> = parse_posts(&html, &handle.title)?
            .into_iter()
            .filter(|post| post.id > cursor)
            .collect();
        posts.sort_by_key(|post| post.id);
        posts.dedup_by_key(|post| post.id);

        let posts: Vec<RawPost> = if after.is_some() {
            posts.into_iter().take(limit).collect()
        } else {
            let skip = posts.len().saturating_sub(limit);
            posts.into_iter().skip(skip).collect()
        };

        tracing::info!(
            channel = %handle.reference,
            cursor = %cursor,
            count = posts.len(),
            "Fetched posts"
        );

        Ok(posts)
    }
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Parse(format!("invalid selector {css}: {e:?}")))
}

/// Channel title from the preview header; `None` when the page has no channel
pub(crate) fn parse_channel_title(html: &str) -> Result<Option<String>, SourceError> {
    let document = Html::parse_document(html);
    let title_sel = selector(".tgme_channel_info_header_title")?;

    Ok(document
        .select(&title_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty()))
}

/// Posts on a preview page, in page order
pub(crate) fn parse_posts(html: &str, fallback_title: &str) -> Result<Vec<RawPost>, SourceError> {
    let document = Html::parse_document(html);
    let message_sel = selector(".tgme_widget_message[data-post]")?;
    let text_sel = selector(".tgme_widget_message_text")?;
    let owner_sel = selector(".tgme_widget_message_owner_name")?;

    let mut posts = Vec::new();

    for element in document.select(&message_sel) {
        let Some(data_post) = element.value().attr("data-post") else {
            continue;
        };
        let Some(id) = data_post
            .rsplit_once('/')
            .and_then(|(_, id)| id.parse::<i64>().ok())
        else {
            tracing::debug!(data_post = %data_post, "Skipping post with unparseable id");
            continue;
        };

        let text = element
            .select(&text_sel)
            .next()
            .map(element_text)
            .filter(|text| !text.trim().is_empty());

        let channel_title = element
            .select(&owner_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| fallback_title.to_string());

        posts.push(RawPost {
            id: PostId(id),
            text,
            channel_title,
        });
    }

    Ok(posts)
}

/// Text content with `<br>` rendered as newlines
fn element_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(e) if e.name() == "br" => text.push('\n'),
            _ => {}
        }
    }
    text
}
