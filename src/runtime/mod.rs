//! Task execution runtime.
//!
//! # Data Flow
//! ```text
//! runtime.docker config → Runtime (Host | Docker)
//! project env sources   → Session (system env? + dotenv layers)
//! Runtime + Session     → CommandFactory → tokio::process::Command
//! ```

pub mod command;
pub mod session;

use std::fmt;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};

pub use command::{look_path, CommandFactory, ProgramSpec};
pub use session::Session;

/// Where task commands execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Runtime {
    Host,
    Docker {
        image: String,
        build_context: PathBuf,
        dockerfile: String,
    },
}

impl Runtime {
    /// Select the runtime; relative build contexts resolve against `root`.
    pub fn from_config(config: &RuntimeConfig, root: &Path) -> Self {
        let docker = &config.docker;
        if !docker.enabled {
            return Runtime::Host;
        }
        Runtime::Docker {
            image: docker.image.clone(),
            build_context: root.join(&docker.build.context),
            dockerfile: docker.build.dockerfile.clone(),
        }
    }

    /// Build the container image if it is not present locally.
    pub async fn prepare(&self) -> Result<()> {
        let Runtime::Docker {
            image,
            build_context,
            dockerfile,
        } = self
        else {
            return Ok(());
        };

        let present = Command::new("docker")
            .args(["image", "inspect", image.as_str()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map_err(|e| Error::io("failed to run docker", e))?
            .success();
        if present {
            return Ok(());
        }

        tracing::info!(image = %image, context = %build_context.display(), "Building runtime image");
        let status = Command::new("docker")
            .arg("build")
            .arg("-t")
            .arg(image)
            .arg("-f")
            .arg(build_context.join(dockerfile))
            .arg(build_context)
            .status()
            .await
            .map_err(|e| Error::io("failed to run docker build", e))?;
        if !status.success() {
            return Err(Error::Usage(format!("failed to build image {}", image)));
        }
        Ok(())
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runtime::Host => f.write_str("host"),
            Runtime::Docker { image, .. } => write!(f, "docker({})", image),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = RuntimeConfig::default();
        assert_eq!(Runtime::from_config(&config, Path::new("/repo")), Runtime::Host);

        config.docker.enabled = true;
        match Runtime::from_config(&config, Path::new("/repo")) {
            Runtime::Docker {
                image,
                build_context,
                dockerfile,
            } => {
                assert_eq!(image, "runme-runtime:latest");
                assert_eq!(build_context, Path::new("/repo/./experimental/docker"));
                assert_eq!(dockerfile, "Dockerfile");
            }
            other => panic!("unexpected runtime {}", other),
        }
    }
}
