pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod source;

pub use config::Config;
pub use error::{Error, Result, SourceError};
pub use models::{DestinationDefinition, Quality, RelayDefinition, RoomDefinition, RoomInfo, SourceDefinition};
pub use source::{SourceFactory, StreamSource};
