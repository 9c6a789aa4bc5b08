//! Dating-match finder for VK: searches candidates around the current
//! user's profile, scores them against shared interests and groups, and
//! keeps ranked results in a local SQLite database.

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod matching;
pub mod profile;
pub mod utils;
pub mod vk;
