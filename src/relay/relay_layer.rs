// Relay layer: talks to the transport over stdin/stdout.
//
// The transport (an IRC client, a test harness, ...) writes one JSON event
// per line; we answer with IRC-style lines.

pub mod commands;
pub mod events;
pub mod outbox;

pub use outbox::Outbox;
