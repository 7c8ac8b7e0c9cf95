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

//! Watch worker.

use std::path::{Path, PathBuf};
use std::thread::{Builder, JoinHandle};

use super::buffer::EventBuffer;
use super::event::{NotifyEvent, WatchOptions};

#[cfg(target_os = "linux")]
mod linux;
#[cfg(windows)]
mod windows;

#[cfg(target_os = "linux")]
use linux as platform;
#[cfg(windows)]
use windows as platform;

#[cfg(not(any(target_os = "linux", windows)))]
compile_error!("only Linux and Windows watch backends are available");

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Watch worker.
///
/// A worker owns one platform event source and the thread that runs it.
/// Root workers, created directly by a watch call, frame their lifetime
/// with a start marker on entry and a stop marker on exit; workers that
/// cover symlinked subtrees on behalf of a parent do not. The platform
/// source is set up on the worker thread itself, so a source that cannot
/// be created still produces consistent framing.
pub(crate) struct Worker {
    /// Covered directory path.
    base_path: PathBuf,
    /// Cancel signal waking the thread out of its kernel wait.
    cancel: Option<platform::Cancel>,
    /// Join handle for the worker thread.
    thread: Option<JoinHandle<()>>,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Worker {
    /// Spawns a worker covering the given directory.
    ///
    /// The thread is running when this returns. Cancellation is the only
    /// way to stop it, and dropping the worker is the only cancellation
    /// trigger.
    pub fn spawn(
        is_root: bool,
        base_path: PathBuf,
        options: WatchOptions,
        buffer: EventBuffer,
    ) -> Self {
        let (cancel, armed) = match platform::arm() {
            Ok((cancel, armed)) => (Some(cancel), Some(armed)),
            Err(err) => {
                log::error!(
                    "failed to arm watch source for {}: {err}",
                    base_path.display()
                );
                (None, None)
            }
        };

        let path = base_path.clone();
        let run = move || {
            if is_root {
                buffer.publish(NotifyEvent::start(path.clone()));
            }
            if let Some(armed) = armed {
                if let Err(err) = armed.run(&path, &options, &buffer) {
                    log::error!(
                        "watch on {} terminated: {err}",
                        path.display()
                    );
                }
            }
            if is_root {
                buffer.publish(NotifyEvent::stop(path));
            }
        };

        // We deliberately use unwrap here, as the capability to spawn
        // threads is a fundamental requirement of the watcher
        let thread = Builder::new()
            .name(String::from("kestrel/watcher"))
            .spawn(run)
            .unwrap();

        Self {
            base_path,
            cancel,
            thread: Some(thread),
        }
    }

    /// Returns the covered directory path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Checks whether the worker still holds its thread.
    ///
    /// This mirrors thread joinability – a worker counts as running until
    /// it is dropped, even if its event loop has already unwound.
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl Drop for Worker {
    /// Cancels and joins the worker thread.
    ///
    /// The order is fixed: set the cancel signal, join the thread, then
    /// release the platform source together with the thread's state. The
    /// thread buffers a terminal stop marker for root workers before it
    /// exits, so that marker is in the buffer once this returns.
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.set();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
