// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("another loomd instance is already running against this state directory")]
    LockFailed(#[source] std::io::Error),
    #[error(transparent)]
    Store(#[from] loom_storage::StoreError),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}
