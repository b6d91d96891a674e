//! Quake relay: fetches upstream records once and replays them to WebSocket subscribers.

pub mod api;
pub mod config;
pub mod registry;
pub mod relay;
pub mod upstream;
