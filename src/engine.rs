use std::{path::Path, process::Command};

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::models::Stem;

/// Narrow contract for the source-separation backend: given an input
/// file and an output directory, leave `vocals.wav` and
/// `instrumental.wav` behind and report percentages along the way.
/// Everything else about the model is opaque to this service.
pub trait SeparationEngine: Send + Sync {
    fn separate(&self, input: &Path, output_dir: &Path, progress: &mut dyn FnMut(u8))
        -> Result<()>;
}

/// Runs an external separator process as `<cmd> <input> <output_dir>`.
/// The command owns resampling, model dispatch and codec handling; we
/// only verify that both stem files materialized.
pub struct CommandEngine {
    command: String,
}

impl CommandEngine {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

impl SeparationEngine for CommandEngine {
    fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        progress: &mut dyn FnMut(u8),
    ) -> Result<()> {
        progress(15);
        info!(command = %self.command, input = %input.display(), "Running separator");

        let status = Command::new(&self.command)
            .arg(input)
            .arg(output_dir)
            .status()
            .with_context(|| format!("Failed to launch separator '{}'", self.command))?;
        if !status.success() {
            bail!("Separator '{}' exited with {status}", self.command);
        }
        progress(90);

        for stem in [Stem::Vocals, Stem::Instrumental] {
            let path = output_dir.join(stem.file_name());
            if !path.exists() {
                bail!("Separator finished without producing {}", stem.file_name());
            }
        }
        progress(95);
        Ok(())
    }
}
