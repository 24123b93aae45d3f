//! Error types for checkpoint/restore coordination
//!
//! A single notification phase can fail for many independent reasons, one per
//! participating resource. Those failures are collected into [`NestedErrors`]
//! and only the aggregate crosses the coordination boundary, wrapped in a
//! [`CheckpointRestoreError`].
//!
//! We use `thiserror` for `Display` and `Error` implementations. Individual
//! causes are `anyhow::Error` so resources can fail with any error type.

use std::fmt;
use thiserror::Error;

/// Result type alias for a full checkpoint/restore cycle
pub type CracResult<T> = std::result::Result<T, CheckpointRestoreError>;

/// Result type returned by resource callbacks
pub type ResourceResult = std::result::Result<(), anyhow::Error>;

// ============================================================================
// Phase
// ============================================================================

/// The two notification phases of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Resources quiesce external state before the pause
    BeforeCheckpoint,
    /// Resources re-acquire external state after resume
    AfterRestore,
}

impl Phase {
    /// Name of the aggregate raised for this phase
    pub fn exception_name(&self) -> &'static str {
        match self {
            Phase::BeforeCheckpoint => "CheckpointException",
            Phase::AfterRestore => "RestoreException",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::BeforeCheckpoint => write!(f, "checkpoint"),
            Phase::AfterRestore => write!(f, "restore"),
        }
    }
}

// ============================================================================
// Coordinator-synthesized causes
// ============================================================================

/// Causes produced by the coordinator or a backend rather than by a resource
///
/// These end up inside a [`NestedErrors`] alongside resource failures and can
/// be recovered with `anyhow::Error::downcast_ref::<CheckpointCause>()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckpointCause {
    /// No backend is bound, or the bound backend cannot be reached
    #[error("checkpoint/restore is not supported: {0}")]
    Unsupported(String),

    /// The backend refused to checkpoint because of an open file
    #[error("open file prevents checkpoint: {0}")]
    OpenFile(String),

    /// The backend refused to checkpoint because of an open socket
    #[error("open socket prevents checkpoint: {0}")]
    OpenSocket(String),

    /// The backend refused to checkpoint because of some other open resource
    #[error("open resource prevents checkpoint: {0}")]
    OpenResource(String),

    /// Any other failure reported by the backend
    #[error("backend failure: {0}")]
    Backend(String),

    /// A resource callback panicked
    #[error("resource panicked during {phase}: {message}")]
    Panicked {
        /// Phase whose callback panicked
        phase: Phase,
        /// Panic payload, when it was a string
        message: String,
    },
}

// ============================================================================
// Exception Aggregate
// ============================================================================

/// Ordered collection of independent failures from one notification phase
///
/// Holds exactly one cause per failing callback, in dispatch order. Append-only
/// while a phase runs; each phase builds its own aggregate.
#[derive(Debug)]
pub struct NestedErrors {
    phase: Phase,
    causes: Vec<anyhow::Error>,
}

impl NestedErrors {
    /// Create an empty aggregate for a phase
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            causes: Vec::new(),
        }
    }

    /// Create an aggregate holding a single cause
    pub fn single(phase: Phase, cause: impl Into<anyhow::Error>) -> Self {
        let mut nested = Self::new(phase);
        nested.push(cause);
        nested
    }

    /// Phase that produced this aggregate
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Append a cause
    pub fn push(&mut self, cause: impl Into<anyhow::Error>) {
        self.causes.push(cause.into());
    }

    /// All causes in dispatch order
    pub fn causes(&self) -> &[anyhow::Error] {
        &self.causes
    }

    /// Consume the aggregate, returning its causes
    pub fn into_causes(self) -> Vec<anyhow::Error> {
        self.causes
    }

    /// Number of causes
    pub fn len(&self) -> usize {
        self.causes.len()
    }

    /// True if no callback failed
    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    /// `Ok(())` when empty, otherwise `Err(self)`
    pub fn into_result(self) -> Result<(), NestedErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Human-readable report enumerating every cause
    ///
    /// ```text
    /// CheckpointException: Failed with 2 nested exceptions
    /// Cause 1/2: <first cause and its source chain>
    /// Cause 2/2: <second cause and its source chain>
    /// ```
    pub fn report(&self) -> String {
        let total = self.causes.len();
        let mut out = format!(
            "{}: Failed with {} nested exceptions\n",
            self.phase.exception_name(),
            total
        );
        for (i, cause) in self.causes.iter().enumerate() {
            out.push_str(&format!("Cause {}/{}: {:?}\n", i + 1, total, cause));
        }
        out
    }
}

impl fmt::Display for NestedErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.causes.len();
        write!(
            f,
            "{} failed with {} nested exception{}",
            self.phase,
            n,
            if n == 1 { "" } else { "s" }
        )
    }
}

impl std::error::Error for NestedErrors {}

// ============================================================================
// Cycle outcome
// ============================================================================

/// Failure of a checkpoint/restore cycle
#[derive(Debug, Error)]
pub enum CheckpointRestoreError {
    /// Before-checkpoint notification (or the backend) failed
    #[error("{0}")]
    Checkpoint(NestedErrors),

    /// Checkpoint succeeded but after-restore notification failed
    #[error("{0}")]
    Restore(NestedErrors),

    /// A cycle was requested while another one is running
    #[error("a checkpoint/restore cycle is already in progress")]
    CycleInProgress,
}

impl CheckpointRestoreError {
    /// Checkpoint failure with a single `Unsupported` cause
    pub fn unsupported(reason: impl Into<String>) -> Self {
        CheckpointRestoreError::Checkpoint(NestedErrors::single(
            Phase::BeforeCheckpoint,
            CheckpointCause::Unsupported(reason.into()),
        ))
    }

    /// The aggregate carried by this error, if any
    pub fn nested(&self) -> Option<&NestedErrors> {
        match self {
            CheckpointRestoreError::Checkpoint(n) | CheckpointRestoreError::Restore(n) => Some(n),
            CheckpointRestoreError::CycleInProgress => None,
        }
    }

    /// Causes carried by this error (empty for `CycleInProgress`)
    pub fn causes(&self) -> &[anyhow::Error] {
        self.nested().map(|n| n.causes()).unwrap_or(&[])
    }

    /// True for a checkpoint failure
    pub fn is_checkpoint(&self) -> bool {
        matches!(self, CheckpointRestoreError::Checkpoint(_))
    }

    /// True for a restore failure
    pub fn is_restore(&self) -> bool {
        matches!(self, CheckpointRestoreError::Restore(_))
    }

    /// True if the cycle failed only because checkpointing is unsupported
    pub fn is_unsupported(&self) -> bool {
        match self {
            CheckpointRestoreError::Checkpoint(n) => {
                n.len() == 1
                    && matches!(
                        n.causes()[0].downcast_ref::<CheckpointCause>(),
                        Some(CheckpointCause::Unsupported(_))
                    )
            }
            _ => false,
        }
    }

    /// Report of the nested causes, or the plain message
    pub fn report(&self) -> String {
        match self.nested() {
            Some(n) => n.report(),
            None => format!("{}\n", self),
        }
    }
}
