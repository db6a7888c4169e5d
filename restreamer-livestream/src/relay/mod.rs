// Relay supervision engine
pub mod args;
pub mod events;
pub mod manager;
pub mod mock;
pub mod process;
pub mod status;
pub mod stream_relay;

pub use args::build_transcoder_args;
pub use events::RelayEvent;
pub use manager::RelayManager;
pub use process::{DestinationProcess, FfmpegSpawner, ProcessSpawner};
pub use status::{RelayPhase, RelayStatus};
pub use stream_relay::{RelayTiming, StreamRelay};
