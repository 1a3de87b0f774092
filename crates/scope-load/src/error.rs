use std::path::PathBuf;

use scope_core::CoreError;
use thiserror::Error;

use crate::pool::MAX_OPEN_TRAJECTORIES;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported file extension: '{0}'")]
    UnsupportedExtension(String),
    #[error("failed to open trajectory backend for {}", path.display())]
    BackendCreateFailed {
        path: PathBuf,
        #[source]
        source: CoreError,
    },
    #[error("trajectory has {trajectory} atoms, molecule has {molecule}")]
    TopologyMismatch { trajectory: usize, molecule: usize },
    #[error("frame decode failed")]
    DecodeFailed(#[source] CoreError),
    #[error("unknown trajectory handle {0}")]
    UnknownHandle(u64),
    #[error("too many open trajectories (limit {MAX_OPEN_TRAJECTORIES})")]
    CapacityExceeded,
    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type LoadResult<T> = Result<T, LoadError>;
