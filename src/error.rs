use std::path::PathBuf;

use thiserror::Error;

/// Failure modes of handle resolution. Both are recoverable: a stale
/// handle should be dropped and the resource re-requested, a pending
/// one polled again after the next maintain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("handle is stale, the slot was freed or reused")]
    Stale,
    #[error("handle is pending, the load has not completed yet")]
    NotReady,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("entity is dead or was never created")]
    DeadEntity,
    #[error("entity has no {0} component")]
    MissingComponent(&'static str),
}
