// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use thiserror::Error;
use tower::BoxError;

/// Why a batch was not accepted by the collector.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("request failed: {0}")]
    Request(BoxError),

    #[error("unexpected response status: {0}")]
    Status(u16),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to encode events: {0}")]
    Encode(#[from] serde_json::Error),
}
