// SPDX-License-Identifier: Apache-2.0

use nrp_core::HookError;

/// Errors a supervisor hook can raise. Maps onto spec §7's `UserError` /
/// `ServerError` taxonomy; both ultimately surface to the FSM as
/// [`HookError`], driving the lifecycle to `failed`.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("user error: {0}")]
    User(String),
    #[error("server error: {0}")]
    Server(String),
    #[error(transparent)]
    Storage(#[from] nrp_storage::StorageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<SupervisorError> for HookError {
    fn from(e: SupervisorError) -> Self {
        HookError::new(e.to_string())
    }
}
