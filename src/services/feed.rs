use chrono::{DateTime, Duration, Utc};

use crate::error::{AppError, Result};
use crate::models::FeedMeta;
use crate::services::{FeedEncoder, FeedToken};
use crate::store::FeedResolver;

/// Encoded calendar ready to be served
#[derive(Debug)]
pub struct RenderedFeed {
    pub calendar_name: String,
    pub body: String,
}

pub struct FeedService;

impl FeedService {
    /// Validate, resolve and encode a calendar feed.
    ///
    /// The encoder only runs once the token has resolved to data. Any access denial is
    /// reported as `NotFound` so a feed client cannot learn whether a token exists.
    pub async fn render_feed(
        resolver: &dyn FeedResolver,
        raw_token: &str,
        base_url: &str,
        refresh_interval: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<RenderedFeed> {
        let raw_token = raw_token.strip_suffix(".ics").unwrap_or(raw_token);
        let token = FeedToken::parse(raw_token).ok_or(AppError::MalformedToken)?;

        let data = match resolver.resolve_feed(&token).await {
            Ok(Some(data)) => data,
            Ok(None) | Err(AppError::GateDenied(_)) => {
                return Err(AppError::NotFound("Calendar not found".to_string()));
            }
            Err(e) => return Err(e),
        };

        let meta = FeedMeta {
            calendar_name: data.calendar_name,
            base_url: base_url.to_string(),
        };
        let body = FeedEncoder::encode(&data.events, &meta, refresh_interval, now);
        tracing::debug!("Rendered calendar feed for {}", data.pet_name);

        Ok(RenderedFeed {
            calendar_name: meta.calendar_name,
            body,
        })
    }
}
