//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlStatus`: the incremental-crawl verdict recorded for each reference
//! - `SessionState`: lifecycle of one crawl session

mod crawl_status;
mod session_state;

// Re-export main types
pub use crawl_status::CrawlStatus;
pub use session_state::SessionState;
