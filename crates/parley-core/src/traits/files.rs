// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access to uploaded file bytes held by the delivery surface.

use async_trait::async_trait;

use crate::error::ParleyError;

/// Downloads the bytes of a previously uploaded file by its identifier.
#[async_trait]
pub trait FileFetcher: Send + Sync + 'static {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>, ParleyError>;
}
