//! Service layer for the bot.
//!
//! - License records from the Chicago data portal (`ChicagoDataClient`)
//! - Posting to Bluesky (`BlueskyClient`)
//! - Throttling and retry around any poster (`Publisher`)

pub mod bluesky;
pub mod chicago;
pub mod publisher;

pub use bluesky::{BlueskyClient, PostReceipt, Poster};
pub use chicago::{ChicagoDataClient, LicenseSource};
pub use publisher::{PublishOutcome, Publisher};
