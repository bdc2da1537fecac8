// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::errors::RecordError;
use crate::record::Record;

/// Records keyed by id; a record whose id is already present is merged into it.
#[derive(Debug, Default)]
pub struct Window {
    records: HashMap<String, Record>,
}

impl Window {
    pub fn accept(&mut self, record: Record) -> Result<(), RecordError> {
        match self.records.entry(record.id().to_string()) {
            Entry::Occupied(mut existing) => existing.get_mut().merge(&record),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Record> {
        self.records.drain().map(|(_, record)| record).collect()
    }
}

/// Two windows and an atomic index naming the one accepting records.
///
/// A flush flips the index and then drains the previous window under its
/// lock. An insert that raced the flip notices the index moved once it holds
/// the lock and retries against the new window, so every record is counted in
/// exactly one window.
#[derive(Debug, Default)]
pub struct DoubleBufferedWindow {
    buffers: [Mutex<Window>; 2],
    active_index: AtomicUsize,
}

impl DoubleBufferedWindow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&self, record: Record) -> Result<(), RecordError> {
        loop {
            let index = self.active_index.load(Ordering::Acquire);
            let mut window = lock(&self.buffers[index]);
            if self.active_index.load(Ordering::Acquire) != index {
                continue;
            }
            return window.accept(record);
        }
    }

    /// Makes the other window active and returns the content of the old one.
    pub fn swap_and_drain(&self) -> Vec<Record> {
        let old_index = self.active_index.fetch_xor(1, Ordering::AcqRel);
        let mut window = lock(&self.buffers[old_index]);
        window.drain()
    }

    /// Distinct ids waiting in either window.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffers.iter().map(|b| lock(b).len()).sum()
    }
}

fn lock(window: &Mutex<Window>) -> MutexGuard<'_, Window> {
    #[allow(clippy::expect_used)]
    window.lock().expect("lock poisoned")
}
