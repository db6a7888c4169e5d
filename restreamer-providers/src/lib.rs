//! Streaming platform clients
//!
//! Each platform module exposes an HTTP client plus a `StreamSource`
//! implementation; `PlatformSourceFactory` picks one by platform name.

pub mod bilibili;
pub mod factory;

pub use bilibili::{BilibiliClient, BilibiliError, BilibiliStreamSource};
pub use factory::PlatformSourceFactory;
