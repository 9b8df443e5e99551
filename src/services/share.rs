use std::time::Instant;

use crate::error::{AppError, Result};
use crate::models::ProjectedView;
use crate::services::{AccessGate, GateResult, PinAttemptLimiter, RecordProjector, ShareToken};
use crate::store::{ShareResolution, ShareResolver};

pub struct ShareService;

impl ShareService {
    /// Resolve a share token into the view its holder may see.
    ///
    /// Malformed tokens are rejected before the store is consulted. A missing PIN yields
    /// the `PinRequired` view; a wrong PIN is `GateDenied` and counts toward the lockout.
    pub async fn view_share(
        resolver: &dyn ShareResolver,
        limiter: &PinAttemptLimiter,
        raw_token: &str,
        pin: Option<&str>,
    ) -> Result<ProjectedView> {
        let token = ShareToken::parse(raw_token).ok_or(AppError::MalformedToken)?;

        let (record, config) = match resolver.resolve_share(&token).await? {
            ShareResolution::Found { record, config } if config.is_active => (record, config),
            ShareResolution::Found { .. } | ShareResolution::Inactive => {
                tracing::debug!("Share link is inactive");
                return Err(AppError::NotFound("Share not found".to_string()));
            }
            ShareResolution::NotFound => {
                return Err(AppError::NotFound("Share not found".to_string()));
            }
        };

        let pin = pin.filter(|p| !p.is_empty());
        // Admitting the attempt counts it; only a correct PIN clears the count again.
        let attempt = match pin {
            Some(_) if config.has_pin() => Some(
                limiter
                    .try_attempt(token.as_str(), Instant::now())
                    .map_err(|retry_after| AppError::TooManyAttempts {
                        retry_after_secs: retry_after.as_secs().max(1),
                    })?,
            ),
            _ => None,
        };

        let gate = AccessGate::evaluate(&config, pin);
        match (gate, attempt) {
            (GateResult::PinIncorrect, _) => {
                return Err(AppError::GateDenied("Incorrect PIN".to_string()));
            }
            (GateResult::Granted, Some(attempt)) => attempt.succeed(),
            _ => {}
        }

        Ok(RecordProjector::project(record, &config, gate))
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use async_trait::async_trait;
    use std::collections::HashMap;

    use crate::error::{AppError, Result};
    use crate::models::{FeedData, PetRecord, ShareConfig};
    use crate::services::{FeedToken, ShareToken};
    use crate::store::{FeedResolver, ShareResolution, ShareResolver};

    /// In-memory resolver keyed by raw token
    #[derive(Default)]
    pub struct FakeStore {
        pub shares: HashMap<String, (PetRecord, ShareConfig)>,
        pub feeds: HashMap<String, FeedData>,
        pub fail: bool,
    }

    #[async_trait]
    impl ShareResolver for FakeStore {
        async fn resolve_share(&self, token: &ShareToken) -> Result<ShareResolution> {
            if self.fail {
                return Err(AppError::Internal("store unavailable".to_string()));
            }
            Ok(match self.shares.get(token.as_str()) {
                Some((record, config)) if config.is_active => ShareResolution::Found {
                    record: record.clone(),
                    config: config.clone(),
                },
                Some(_) => ShareResolution::Inactive,
                None => ShareResolution::NotFound,
            })
        }
    }

    #[async_trait]
    impl FeedResolver for FakeStore {
        async fn resolve_feed(&self, token: &FeedToken) -> Result<Option<FeedData>> {
            if self.fail {
                return Err(AppError::Internal("store unavailable".to_string()));
            }
            Ok(self.feeds.get(token.as_str()).cloned())
        }
    }
}
