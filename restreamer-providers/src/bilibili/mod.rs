//! Bilibili Live Client
//!
//! HTTP client for the Bilibili live API and the `StreamSource` built on it.
//!
//! # Features
//! - Live status and real room id lookup
//! - Playable stream URL resolution with HLS rewrite
//! - Room details and anchor name for notifications

pub mod client;
pub mod error;
pub mod source;
pub mod types;

pub use client::{extract_room_id, flv_to_m3u8, validate_room_id, BilibiliClient};
pub use error::BilibiliError;
pub use source::BilibiliStreamSource;
