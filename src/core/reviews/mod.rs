// Core review module - deferred review requests for long-standing bans.

pub mod review_cache;
pub mod review_scheduler;

pub use review_cache::*;
