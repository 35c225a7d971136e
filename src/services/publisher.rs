// src/services/publisher.rs

//! Throttled, retrying wrapper around a [`Poster`].

use std::time::Duration;

use tokio::time::Instant;

use crate::error::Result;
use crate::models::{ErrorHandlingConfig, FeaturesConfig, NaturalKey, ThrottlingConfig};
use crate::pipeline::FormattedPost;
use crate::services::bluesky::{PostReceipt, Poster};

/// Result of publishing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Posted { receipt: PostReceipt, attempts: u32 },
    /// Gave up on this record; the cycle carries on.
    Failed { attempts: u32, reason: String },
}

impl PublishOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            PublishOutcome::Posted { attempts, .. } | PublishOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Applies the throttling and retry policy to every publish call.
pub struct Publisher<P> {
    poster: P,
    throttling: ThrottlingConfig,
    retry: ErrorHandlingConfig,
    last_call: Option<Instant>,
}

impl<P: Poster> Publisher<P> {
    pub fn new(poster: P, features: &FeaturesConfig) -> Self {
        Self {
            poster,
            throttling: features.throttling.clone(),
            retry: features.error_handling.clone(),
            last_call: None,
        }
    }

    /// Total attempts allowed for one record.
    fn max_attempts(&self) -> u32 {
        if self.retry.auto_retry {
            self.retry.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    /// Wait until the minimum spacing since the previous call has passed.
    async fn throttle(&mut self) {
        if !self.throttling.enabled {
            return;
        }
        let min_delay = Duration::from_secs(self.throttling.min_delay_between_posts);
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < min_delay {
                let wait = min_delay - elapsed;
                log::debug!("Rate limiting: sleeping for {:.2} seconds", wait.as_secs_f64());
                tokio::time::sleep(wait).await;
            }
        }
    }

    /// Publish a post for the record identified by `key`.
    ///
    /// Retryable failures are retried after `retry_delay`. Exhausted retries
    /// and permanent rejections come back as [`PublishOutcome::Failed`].
    /// Authentication failures are returned as errors: the cycle cannot go on.
    pub async fn publish(
        &mut self,
        key: &NaturalKey,
        post: &FormattedPost,
    ) -> Result<PublishOutcome> {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.throttle().await;
            let result = self.poster.post(post).await;
            self.last_call = Some(Instant::now());

            match result {
                Ok(receipt) => {
                    log::info!(
                        "Posted announcement for {} (attempt {}/{}): {}",
                        key,
                        attempt,
                        max_attempts,
                        receipt.uri
                    );
                    return Ok(PublishOutcome::Posted {
                        receipt,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_fatal() => {
                    log::error!("Publishing {} failed fatally on attempt {}: {}", key, attempt, e);
                    return Err(e);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    log::warn!(
                        "Failed to post {} (attempt {}/{}): {}. Retrying in {} seconds",
                        key,
                        attempt,
                        max_attempts,
                        e,
                        self.retry.retry_delay
                    );
                    tokio::time::sleep(Duration::from_secs(self.retry.retry_delay)).await;
                }
                Err(e) => {
                    log::error!(
                        "Giving up on {} after {} attempt(s): {}",
                        key,
                        attempt,
                        e
                    );
                    return Ok(PublishOutcome::Failed {
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}
