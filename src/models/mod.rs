// src/models/mod.rs

//! Domain models for the bot.
//!
//! This module contains the data structures shared by the pipeline,
//! organized by their primary purpose.

mod config;
mod restaurant;

// Re-export all public types
pub use config::{
    AnnouncementFlags, BotConfig, ErrorHandlingConfig, FeaturesConfig, FilterConfig,
    FormattingFlags, HashtagConfig, MonitoringConfig, PostTemplate, SourceConfig,
    ThrottlingConfig,
};
pub use restaurant::{NaturalKey, Restaurant};
