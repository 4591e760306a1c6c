// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;

use async_trait::async_trait;
use parley_core::{FileFetcher, ParleyError};
use tokio::sync::Mutex;

/// Serves uploaded file bytes from a map keyed by file id.
#[derive(Default)]
pub struct MockFileFetcher {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockFileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, file_id: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.lock().await.insert(file_id.into(), bytes.into());
    }
}

#[async_trait]
impl FileFetcher for MockFileFetcher {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>, ParleyError> {
        self.files
            .lock()
            .await
            .get(file_id)
            .cloned()
            .ok_or_else(|| ParleyError::Internal(format!("no such file: {file_id}")))
    }
}
