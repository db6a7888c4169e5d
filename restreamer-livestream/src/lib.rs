// restreamer-livestream - relay supervision engine and live status monitor
//
// - relay/    - RelayManager, StreamRelay, destination processes, argument builder
// - monitor/  - edge-triggered live status polling
//
// Both sides only see sources through `restreamer_core::StreamSource`.

pub mod error;
pub mod monitor;
pub mod relay;

pub use error::{RelayError, RelayResult};
pub use monitor::{Monitor, MonitorEvent, StatusTracker, StatusTransition};
pub use relay::{
    build_transcoder_args, DestinationProcess, FfmpegSpawner, ProcessSpawner, RelayEvent,
    RelayManager, RelayPhase, RelayStatus, RelayTiming, StreamRelay,
};
