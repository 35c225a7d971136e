//! Pipeline entry points for the bot.
//!
//! - `PollLoop`: fetch, filter, format, publish and advance the cursor
//! - `run_preview`: dry run over recent records without posting

pub mod filter;
pub mod format;
pub mod poll;
pub mod preview;

pub use filter::{FilterVerdict, evaluate, passes};
pub use format::{FormattedPost, PostFormatter};
pub use poll::{CycleReport, CycleState, PollLoop};
pub use preview::run_preview;
