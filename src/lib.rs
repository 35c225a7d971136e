// src/lib.rs

//! Chicago restaurant license bot library
//!
//! Polls the city's business license dataset for new retail food
//! establishments and announces them on Bluesky.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
