use dpk_store::StoreError;

use crate::config::ConfigError;

/// Errors assembling a [`UnionStore`](crate::UnionStore).
///
/// Lookups on a built union report in the plain [`StoreError`] taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum UnionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
