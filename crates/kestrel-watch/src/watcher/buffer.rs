// Copyright (c) 2025 Kestrel and contributors

// SPDX-License-Identifier: MIT
// Third-party contributions licensed under DCO

// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to
// deal in the Software without restriction, including without limitation the
// rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
// sell copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:

// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NON-INFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
// IN THE SOFTWARE.

// ----------------------------------------------------------------------------

//! Shared event buffer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::event::NotifyEvent;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Shared event buffer.
///
/// A strict FIFO of events guarded by a single mutex, shared between all
/// workers and the draining consumer. Workers publish each kernel batch
/// under one lock acquisition, so batches interleave as wholes and the
/// order of insertion equals the order of observation. The mutex is the
/// only lock in the crate and is never held while another is taken.
#[derive(Clone, Debug, Default)]
pub(crate) struct EventBuffer {
    /// Buffered events.
    queue: Arc<Mutex<VecDeque<NotifyEvent>>>,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl EventBuffer {
    /// Creates an event buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a single event.
    pub fn publish(&self, event: NotifyEvent) {
        self.lock().push_back(event);
    }

    /// Publishes a batch of events under one lock acquisition.
    pub fn publish_all<I>(&self, events: I)
    where
        I: IntoIterator<Item = NotifyEvent>,
    {
        self.lock().extend(events);
    }

    /// Drains all buffered events in insertion order.
    ///
    /// The lock is held for the whole drain, so events published while the
    /// callback runs are observed on the next call.
    pub fn drain<F>(&self, mut f: F)
    where
        F: FnMut(&NotifyEvent),
    {
        let mut queue = self.lock();
        while let Some(event) = queue.pop_front() {
            f(&event);
        }
    }

    /// Locks the queue, ignoring poisoning from a panicked producer.
    fn lock(&self) -> MutexGuard<'_, VecDeque<NotifyEvent>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn drains_in_insertion_order() {
        let buffer = EventBuffer::new();
        buffer.publish(NotifyEvent::created(PathBuf::from("/a")));
        buffer.publish_all([
            NotifyEvent::modified(PathBuf::from("/a")),
            NotifyEvent::deleted(PathBuf::from("/a")),
        ]);

        let mut paths = Vec::new();
        buffer.drain(|event| paths.push(event.flags));
        assert_eq!(
            paths,
            [
                super::super::event::NotifyFilter::CREATED,
                super::super::event::NotifyFilter::MODIFIED,
                super::super::event::NotifyFilter::DELETED,
            ]
        );

        // A second drain observes nothing
        buffer.drain(|_| panic!("buffer should be empty"));
    }
}
