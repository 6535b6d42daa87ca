//! Route modules for the API server.

pub mod board;
pub mod recording;
pub mod recordings;
