// Implementations for the deferred review cache.

pub mod json_review_cache;

pub use json_review_cache::JsonReviewCache;
