//! Anubis shared types
//!
//! Models, REST payloads and gateway events shared by the client core, the
//! HTTP adapter and the test double. Kept free of async and I/O.

pub mod api;
pub mod events;
pub mod models;
