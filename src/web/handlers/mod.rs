//! Route handler modules for the bazaar web API.

pub mod chat;
pub mod health;
pub mod inbox;
pub mod listings;
pub mod websocket;
