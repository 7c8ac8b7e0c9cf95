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

//! Cross-platform recursive directory watching.
//!
//! Each watched root is covered by a worker that owns a dedicated thread and
//! one kernel change-notification facility – inotify on Linux, an overlapped
//! directory-change read on Windows. Workers normalize the kernel's records
//! into a single event vocabulary and publish them to a shared buffer, which
//! the embedding host drains on its own cadence, typically once per frame.
//! The host therefore never observes kernel timing, only a linearized stream
//! of events framed by start and stop markers.
//!
//! This is deliberately implemented with sync Rust and blocking kernel waits
//! to keep dependencies minimal and avoid async runtimes.

#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]

pub mod watcher;

pub use watcher::event::{Kind, NotifyEvent, NotifyFilter, WatchOptions};
pub use watcher::{DirectoryWatcher, Error, Handler, Result};
