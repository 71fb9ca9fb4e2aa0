pub mod events;
pub mod inbox;
pub mod logging;
pub mod protocol;
pub mod room;
pub mod session;
pub mod storage;
pub mod web;
