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

//! Directory watcher.

use std::fs;
use std::path::{Component, Path, PathBuf};

mod buffer;
mod error;
pub mod event;
mod worker;

pub use error::{Error, Result};
pub use event::{Kind, NotifyEvent, NotifyFilter, WatchOptions};

use buffer::EventBuffer;
use worker::Worker;

// ----------------------------------------------------------------------------
// Traits
// ----------------------------------------------------------------------------

/// Event handler.
///
/// The watcher invokes the handler once per buffered event while draining
/// in [`DirectoryWatcher::process_events`]. The buffer mutex is held for
/// the whole drain, so the handler must not call back into the watcher
/// and must not block on worker threads.
pub trait Handler {
    /// Handles a single drained event.
    fn handle(&mut self, event: &NotifyEvent);
}

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Directory watcher.
///
/// Watches directories for changes, optionally covering their subtrees
/// and the targets of directory symbolic links. Each watched root is
/// serviced by a background worker; the watcher itself only hands out
/// events when [`process_events`] is called, so the handler runs on the
/// caller's thread and never observes kernel timing.
///
/// Per watched root, the handler observes exactly one [`Kind::Start`]
/// marker, then any number of filesystem events in kernel order, then at
/// most one [`Kind::Stop`] marker. Stopping a watch without intervening
/// filesystem activity produces the start and stop markers back to back.
///
/// [`process_events`]: DirectoryWatcher::process_events
///
/// # Examples
///
/// ```
/// # use std::error::Error;
/// # fn main() -> Result<(), Box<dyn Error>> {
/// use kestrel_watch::{DirectoryWatcher, NotifyEvent, WatchOptions};
///
/// // Create directory watcher and start watching
/// let mut watcher = DirectoryWatcher::new(|event: &NotifyEvent| {
///     println!("Event: {:?}", event);
/// });
/// watcher.watch(std::env::temp_dir(), WatchOptions::default())?;
///
/// // Stop watching and drain the start and stop markers
/// watcher.stop_watching();
/// watcher.process_events();
/// # Ok(())
/// # }
/// ```
pub struct DirectoryWatcher<H>
where
    H: Handler,
{
    /// Root workers in insertion order, joined before the buffer is
    /// released.
    workers: Vec<Worker>,
    /// Shared event buffer.
    buffer: EventBuffer,
    /// Event handler.
    handler: H,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl<H> DirectoryWatcher<H>
where
    H: Handler,
{
    /// Creates a directory watcher with the given handler.
    #[must_use]
    pub fn new(handler: H) -> Self {
        Self {
            workers: Vec::new(),
            buffer: EventBuffer::new(),
            handler,
        }
    }

    /// Starts watching the given directory.
    ///
    /// The path must name an existing directory and should be absolute,
    /// as all reported event paths are built from it. The worker covering
    /// the root is running when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotADirectory`] if the path names something other
    /// than a directory, and an I/O error if it cannot be queried at all.
    /// No worker is created in either case.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::error::Error;
    /// # fn main() -> Result<(), Box<dyn Error>> {
    /// use kestrel_watch::{DirectoryWatcher, NotifyEvent, WatchOptions};
    ///
    /// // Create directory watcher and start watching
    /// let mut watcher = DirectoryWatcher::new(|_: &NotifyEvent| {});
    /// watcher.watch(std::env::temp_dir(), WatchOptions::default())?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn watch<P>(&mut self, path: P, options: WatchOptions) -> Result
    where
        P: AsRef<Path>,
    {
        let path = normalize(path.as_ref());
        if !fs::metadata(&path)?.is_dir() {
            return Err(Error::NotADirectory(path));
        }

        self.workers
            .push(Worker::spawn(true, path, options, self.buffer.clone()));
        Ok(())
    }

    /// Checks whether the given directory is being watched.
    ///
    /// Only roots count – directories covered by a subtree watch do not
    /// register here.
    #[must_use]
    pub fn is_watching<P>(&self, path: P) -> bool
    where
        P: AsRef<Path>,
    {
        let path = normalize(path.as_ref());
        self.workers
            .iter()
            .any(|worker| worker.is_running() && worker.base_path() == path)
    }

    /// Stops watching all directories.
    ///
    /// Every root worker is cancelled and joined before this returns, so
    /// each one's terminal stop marker is buffered and the next drain
    /// observes the complete start-to-stop sequence.
    pub fn stop_watching(&mut self) {
        self.workers.clear();
    }

    /// Drains all buffered events into the handler.
    ///
    /// Events drain in insertion order. Events published by workers while
    /// the drain is running are served on the next call.
    pub fn process_events(&mut self) {
        let Self {
            handler, buffer, ..
        } = self;
        buffer.drain(|event| handler.handle(event));
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl<F> Handler for F
where
    F: FnMut(&NotifyEvent),
{
    /// Handles a single drained event.
    #[inline]
    fn handle(&mut self, event: &NotifyEvent) {
        self(event);
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Normalizes a path lexically.
///
/// Resolves `.` and `..` components without consulting the filesystem,
/// so symbolic links along the path are deliberately left intact.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            component => normalized.push(component),
        }
    }
    normalized
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
