// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reusable download buffers.

use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use courier_config::model::AttachmentConfig;

/// A bounded stack of cleared byte buffers shared across pipeline runs.
#[derive(Debug)]
pub struct BufferPool {
    max_buffers: usize,
    release_threshold: u64,
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(max_buffers: usize, release_threshold: u64) -> Self {
        Self {
            max_buffers,
            release_threshold,
            free: Mutex::new(Vec::with_capacity(max_buffers)),
        }
    }

    pub fn from_config(config: &AttachmentConfig) -> Self {
        Self::new(config.pool_max_buffers, config.pool_release_threshold_bytes)
    }

    fn free(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// An empty buffer, reused when one is available.
    pub fn acquire(&self) -> Vec<u8> {
        self.free().pop().unwrap_or_default()
    }

    /// Return a buffer. Dropped when the pool is already full.
    pub fn release(&self, mut buffer: Vec<u8>) {
        buffer.clear();
        let mut free = self.free();
        if free.len() < self.max_buffers && buffer.capacity() > 0 {
            free.push(buffer);
        }
    }

    pub fn retained_buffers(&self) -> usize {
        self.free().len()
    }

    /// Capacity held by retained buffers.
    pub fn retained_bytes(&self) -> u64 {
        self.free().iter().map(|b| b.capacity() as u64).sum()
    }

    /// Drop every retained buffer if their total capacity exceeds the
    /// release threshold. Returns whether anything was released.
    pub fn trim(&self) -> bool {
        let mut free = self.free();
        let retained: u64 = free.iter().map(|b| b.capacity() as u64).sum();
        if retained <= self.release_threshold {
            return false;
        }
        debug!(buffers = free.len(), retained, "releasing pooled attachment buffers");
        free.clear();
        free.shrink_to_fit();
        true
    }
}
