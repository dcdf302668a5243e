// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "tracking/mod.rs"]
pub mod tracking;

#[path = "reviews/mod.rs"]
pub mod reviews;
