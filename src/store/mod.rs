//! Narrow, token-scoped lookups into the record store.
//!
//! Share and feed handling only ever receives these traits, never a general database
//! handle, so nothing on the public path can read records a token does not point at.

pub mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{FeedData, PetRecord, ShareConfig};
use crate::services::{FeedToken, ShareToken};

/// Outcome of looking up a share token
#[derive(Debug)]
pub enum ShareResolution {
    NotFound,
    Inactive,
    Found {
        record: PetRecord,
        config: ShareConfig,
    },
}

#[async_trait]
pub trait ShareResolver: Send + Sync {
    /// Resolve a well-formed share token to its pet record and share config
    async fn resolve_share(&self, token: &ShareToken) -> Result<ShareResolution>;
}

#[async_trait]
pub trait FeedResolver: Send + Sync {
    /// Resolve a well-formed feed token; `None` when unknown or revoked
    async fn resolve_feed(&self, token: &FeedToken) -> Result<Option<FeedData>>;
}
