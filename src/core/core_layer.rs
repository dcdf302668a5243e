// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "tracking/mod.rs"]
pub mod tracking;

#[path = "reviews/mod.rs"]
pub mod reviews;
