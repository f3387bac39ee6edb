// SPDX-License-Identifier: Apache-2.0

use crate::broker::BrokerError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("failed to encode synchronization message: {0}")]
    Encode(#[from] serde_json::Error),
}
