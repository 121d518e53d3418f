//! Route handlers for the HTTP API.

pub mod convert;
pub mod download;
pub mod events;
pub mod health;
pub mod status;
pub mod tools;
