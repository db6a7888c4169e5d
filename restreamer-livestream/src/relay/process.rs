// Destination processes
//
// One external transcoder per destination per streaming cycle. The process is
// owned by a single worker task; everyone else reaches it through its kill token.

use std::io;
use std::process::Stdio;

use restreamer_core::config::RelaySettingsConfig;
use restreamer_core::DestinationDefinition;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{RelayError, RelayResult};

/// Launches the external transcoder for a destination.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, destination: &DestinationDefinition, args: &[String]) -> io::Result<Child>;
}

/// Spawns the configured ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegSpawner {
    program: String,
    forward_output: bool,
}

impl FfmpegSpawner {
    pub fn new(program: impl Into<String>, forward_output: bool) -> Self {
        Self {
            program: program.into(),
            forward_output,
        }
    }

    #[must_use]
    pub fn from_config(config: &RelaySettingsConfig) -> Self {
        Self::new(config.transcoder_path.clone(), config.transcoder_output)
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for FfmpegSpawner {
    fn default() -> Self {
        Self::new("ffmpeg", false)
    }
}

impl ProcessSpawner for FfmpegSpawner {
    fn spawn(&self, destination: &DestinationDefinition, args: &[String]) -> io::Result<Child> {
        let output = || {
            if self.forward_output {
                Stdio::inherit()
            } else {
                Stdio::null()
            }
        };

        debug!(
            destination = %destination.name,
            program = %self.program,
            ?args,
            "Spawning transcoder"
        );

        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(output())
            .stderr(output())
            .kill_on_drop(true)
            .spawn()
    }
}

/// A running transcoder relaying to one destination
#[derive(Debug)]
pub struct DestinationProcess {
    destination: String,
    child: Child,
    kill_token: CancellationToken,
}

impl DestinationProcess {
    /// Spawn the transcoder. A launch failure is reported as [`RelayError::Launch`].
    pub fn launch(
        spawner: &dyn ProcessSpawner,
        destination: &DestinationDefinition,
        args: &[String],
        kill_token: CancellationToken,
    ) -> RelayResult<Self> {
        let child = spawner
            .spawn(destination, args)
            .map_err(|source| RelayError::Launch {
                destination: destination.name.clone(),
                source,
            })?;

        Ok(Self {
            destination: destination.name.clone(),
            child,
            kill_token,
        })
    }

    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit, or kill it once the kill token fires.
    ///
    /// A kill is not an error; a non-zero exit status is.
    pub async fn run(mut self) -> RelayResult<()> {
        tokio::select! {
            status = self.child.wait() => match status {
                Ok(status) if status.success() => {
                    debug!(destination = %self.destination, "Transcoder exited cleanly");
                    Ok(())
                }
                Ok(status) => Err(RelayError::Exited {
                    destination: self.destination,
                    status,
                }),
                Err(source) => Err(RelayError::Wait {
                    destination: self.destination,
                    source,
                }),
            },
            () = self.kill_token.cancelled() => {
                if let Err(e) = self.child.kill().await {
                    warn!(destination = %self.destination, error = %e, "Failed to kill transcoder");
                } else {
                    debug!(destination = %self.destination, "Transcoder killed");
                }
                Ok(())
            }
        }
    }
}
