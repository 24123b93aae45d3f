//! External engine backend
//!
//! Delegates the pause to an engine executable (for example a CRIU wrapper):
//!
//! ```text
//! <engine_path> checkpoint <checkpoint_to>
//! ```
//!
//! with `CRAC_PID` set to this process id. The call blocks until the engine
//! exits. Exit status 0 means the process was checkpointed and is now running
//! again (possibly restored from the image). Any other status is a refusal;
//! stderr lines of the form `open file: ...`, `open socket: ...` and
//! `open resource: ...` become typed causes.

use super::{Backend, BackendError, ProbeError, EXEC_ENGINE};
use crate::config::CracConfig;
use crac_core::CheckpointCause;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tracing::{info, warn};

/// Env var carrying the target process id to the engine
pub const ENGINE_PID_VAR: &str = "CRAC_PID";

/// Backend that runs an external engine executable
#[derive(Debug, Clone)]
pub struct ExecBackend {
    engine: PathBuf,
    image_dir: PathBuf,
}

impl ExecBackend {
    /// Create a backend for the given engine and image directory
    pub fn new(engine: impl Into<PathBuf>, image_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine: engine.into(),
            image_dir: image_dir.into(),
        }
    }

    /// Engine executable
    pub fn engine(&self) -> &PathBuf {
        &self.engine
    }

    /// Checkpoint image directory
    pub fn image_dir(&self) -> &PathBuf {
        &self.image_dir
    }
}

impl Backend for ExecBackend {
    fn name(&self) -> &str {
        EXEC_ENGINE
    }

    fn checkpoint_restore(&self) -> Result<(), BackendError> {
        info!(
            target: "crac::backend",
            engine = %self.engine.display(),
            image_dir = %self.image_dir.display(),
            "Invoking checkpoint engine"
        );

        let output = Command::new(&self.engine)
            .arg("checkpoint")
            .arg(&self.image_dir)
            .env(ENGINE_PID_VAR, std::process::id().to_string())
            .output()
            .map_err(|e| {
                BackendError::Unavailable(format!(
                    "failed to run engine '{}': {}",
                    self.engine.display(),
                    e
                ))
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(
            target: "crac::backend",
            status = %output.status,
            "Checkpoint engine refused"
        );
        Err(BackendError::CheckpointRefused(parse_refusal(
            &stderr,
            &output.status.to_string(),
        )))
    }
}

/// Translate engine stderr into checkpoint causes
///
/// Falls back to a single `Backend` cause carrying the exit status and the
/// trimmed output when no line is recognized.
pub fn parse_refusal(stderr: &str, status: &str) -> Vec<CheckpointCause> {
    let causes: Vec<CheckpointCause> = stderr
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            if let Some(detail) = line.strip_prefix("open file:") {
                Some(CheckpointCause::OpenFile(detail.trim().to_string()))
            } else if let Some(detail) = line.strip_prefix("open socket:") {
                Some(CheckpointCause::OpenSocket(detail.trim().to_string()))
            } else {
                line.strip_prefix("open resource:")
                    .map(|detail| CheckpointCause::OpenResource(detail.trim().to_string()))
            }
        })
        .collect();

    if !causes.is_empty() {
        return causes;
    }

    let trimmed = stderr.trim();
    let message = if trimmed.is_empty() {
        format!("engine exited with {}", status)
    } else {
        format!("engine exited with {}: {}", status, trimmed)
    };
    vec![CheckpointCause::Backend(message)]
}

pub(crate) fn probe(config: &CracConfig, _explicit: bool) -> Result<Arc<dyn Backend>, ProbeError> {
    let engine = config
        .engine_path
        .as_ref()
        .ok_or_else(|| ProbeError::Misconfigured("engine_path is not set".to_string()))?;
    if !engine.is_file() {
        return Err(ProbeError::NotInstalled(format!(
            "engine '{}' does not exist",
            engine.display()
        )));
    }
    let image_dir = config
        .checkpoint_to
        .as_ref()
        .ok_or_else(|| ProbeError::Misconfigured("checkpoint_to is not set".to_string()))?;
    Ok(Arc::new(ExecBackend::new(engine.clone(), image_dir.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_parse_typed_refusals() {
        let stderr = "\
checking process 4242
open file: /var/log/app.log (fd 5)
open socket: tcp 0.0.0.0:8080
open resource: /dev/nvidia0
";
        let causes = parse_refusal(stderr, "exit status: 1");
        assert_eq!(
            causes,
            vec![
                CheckpointCause::OpenFile("/var/log/app.log (fd 5)".to_string()),
                CheckpointCause::OpenSocket("tcp 0.0.0.0:8080".to_string()),
                CheckpointCause::OpenResource("/dev/nvidia0".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_unrecognized_refusal() {
        let causes = parse_refusal("permission denied\n", "exit status: 2");
        assert_eq!(
            causes,
            vec![CheckpointCause::Backend(
                "engine exited with exit status: 2: permission denied".to_string()
            )]
        );

        let causes = parse_refusal("", "exit status: 2");
        assert_eq!(
            causes,
            vec![CheckpointCause::Backend("engine exited with exit status: 2".to_string())]
        );
    }

    #[test]
    fn test_probe_requires_engine_path() {
        let config = CracConfig::default();
        assert!(matches!(probe(&config, true), Err(ProbeError::Misconfigured(_))));
    }

    #[test]
    fn test_probe_requires_existing_engine() {
        let temp = TempDir::new().unwrap();
        let config = CracConfig {
            engine_path: Some(temp.path().join("no-such-engine")),
            checkpoint_to: Some(temp.path().to_path_buf()),
            ..CracConfig::default()
        };
        assert!(matches!(probe(&config, false), Err(ProbeError::NotInstalled(_))));
    }

    #[test]
    fn test_probe_requires_image_dir() {
        let temp = TempDir::new().unwrap();
        let engine = temp.path().join("engine");
        std::fs::write(&engine, "").unwrap();
        let config = CracConfig {
            engine_path: Some(engine),
            ..CracConfig::default()
        };
        assert!(matches!(probe(&config, false), Err(ProbeError::Misconfigured(_))));
    }

    #[test]
    fn test_probe_binds_configured_engine() {
        let temp = TempDir::new().unwrap();
        let engine = temp.path().join("engine");
        std::fs::write(&engine, "").unwrap();
        let config = CracConfig {
            engine_path: Some(engine),
            checkpoint_to: Some(temp.path().join("cr")),
            ..CracConfig::default()
        };
        let backend = probe(&config, false).unwrap();
        assert_eq!(backend.name(), EXEC_ENGINE);
    }

    #[test]
    fn test_missing_engine_is_unavailable() {
        let backend = ExecBackend::new("/nonexistent/crac-engine", "/tmp/cr");
        assert!(matches!(
            backend.checkpoint_restore(),
            Err(BackendError::Unavailable(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_exit_status() {
        if Path::new("/bin/true").exists() {
            let backend = ExecBackend::new("/bin/true", "/tmp/cr");
            assert!(backend.checkpoint_restore().is_ok());
        }
        if Path::new("/bin/false").exists() {
            let backend = ExecBackend::new("/bin/false", "/tmp/cr");
            match backend.checkpoint_restore() {
                Err(BackendError::CheckpointRefused(causes)) => {
                    assert_eq!(causes.len(), 1);
                    assert!(matches!(causes[0], CheckpointCause::Backend(_)));
                }
                other => panic!("expected refusal, got {:?}", other),
            }
        }
    }

    #[cfg(unix)]
    fn write_engine(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let engine = dir.join("engine.sh");
        std::fs::write(&engine, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&engine, std::fs::Permissions::from_mode(0o755)).unwrap();
        engine
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_refusal_reaches_checkpoint_aggregate() {
        use crate::coordinator::Coordinator;

        let temp = TempDir::new().unwrap();
        let engine = write_engine(
            temp.path(),
            "echo 'dumping' >&2\n\
             echo 'open file: /var/log/app.log (fd 5)' >&2\n\
             echo 'open socket: tcp 0.0.0.0:8080' >&2\n\
             exit 1\n",
        );
        let config = CracConfig {
            engine_path: Some(engine),
            checkpoint_to: Some(temp.path().join("cr")),
            ..CracConfig::default()
        };
        let coordinator = Coordinator::new(Some(probe(&config, false).unwrap()));

        let err = coordinator.checkpoint_restore().unwrap_err();
        assert!(err.is_checkpoint());
        assert!(!err.is_unsupported());
        let causes: Vec<_> = err
            .causes()
            .iter()
            .map(|c| c.downcast_ref::<CheckpointCause>().cloned())
            .collect();
        assert_eq!(
            causes,
            vec![
                Some(CheckpointCause::OpenFile("/var/log/app.log (fd 5)".to_string())),
                Some(CheckpointCause::OpenSocket("tcp 0.0.0.0:8080".to_string())),
            ]
        );
        assert!(!coordinator.restore_stats().has_restored());
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_receives_image_dir_and_pid() {
        let temp = TempDir::new().unwrap();
        let record = temp.path().join("invocation");
        let engine = write_engine(
            temp.path(),
            &format!(
                "echo \"$1 $2 $CRAC_PID\" > '{}'\n",
                record.display()
            ),
        );
        let image_dir = temp.path().join("cr");
        let backend = ExecBackend::new(engine, &image_dir);

        backend.checkpoint_restore().unwrap();
        let invocation = std::fs::read_to_string(&record).unwrap();
        assert_eq!(
            invocation.trim(),
            format!("checkpoint {} {}", image_dir.display(), std::process::id())
        );
    }
}
