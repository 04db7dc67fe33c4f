//! `ChatService` over a REST API plus a WebSocket gateway.
//!
//! Request/response calls go through [`rest`]; the live feeds in [`gateway`]
//! open one WebSocket per subscription and re-fetch the channel snapshot on
//! every message event, so the core always receives full replacement lists.

pub mod gateway;
pub mod rest;

pub use rest::HttpService;
