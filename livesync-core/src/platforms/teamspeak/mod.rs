// File: src/platforms/teamspeak/mod.rs

pub mod client;
pub mod events;

pub use client::TeamSpeakClient;
pub use events::TsEventFeed;
