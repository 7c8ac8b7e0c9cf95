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

//! Shared test helpers.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use kestrel_watch::{
    DirectoryWatcher, Handler, Kind, NotifyEvent, NotifyFilter,
};
use tempfile::TempDir;

/// Collected events, shared with the watcher's handler.
pub type Events = Arc<Mutex<Vec<NotifyEvent>>>;

/// Creates a watcher whose handler collects every drained event.
pub fn collector() -> (DirectoryWatcher<impl Handler>, Events) {
    let events: Events = Arc::default();
    let sink = Arc::clone(&events);
    let watcher = DirectoryWatcher::new(move |event: &NotifyEvent| {
        sink.lock().unwrap().push(event.clone());
    });
    (watcher, events)
}

/// Creates a scratch directory and its resolved path.
pub fn scratch() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().canonicalize().unwrap();
    (dir, path)
}

/// Lets kernel notifications settle between filesystem operations and
/// the next drain.
pub fn settle() {
    thread::sleep(Duration::from_millis(100));
}

/// Asserts that the event is a start marker for the given root.
pub fn assert_start(event: &NotifyEvent, path: &Path) {
    assert_eq!(event.kind, Kind::Start, "expected start marker: {event:?}");
    assert_eq!(event.path, path);
}

/// Asserts that the event is a stop marker for the given root.
pub fn assert_stop(event: &NotifyEvent, path: &Path) {
    assert_eq!(event.kind, Kind::Stop, "expected stop marker: {event:?}");
    assert_eq!(event.path, path);
}

/// Asserts that the event is a filesystem change with the given flag.
pub fn assert_change(event: &NotifyEvent, flags: NotifyFilter, path: &Path) {
    assert_eq!(event.kind, Kind::Filesystem, "expected change: {event:?}");
    assert_eq!(event.flags, flags);
    assert_eq!(event.path, path);
    if flags != NotifyFilter::RENAMED {
        assert_eq!(event.last_path, None);
    }
}

/// Asserts that the event is a rename carrying both paths.
pub fn assert_renamed(event: &NotifyEvent, last_path: &Path, path: &Path) {
    assert_eq!(event.kind, Kind::Filesystem, "expected rename: {event:?}");
    assert_eq!(event.flags, NotifyFilter::RENAMED);
    assert_eq!(event.last_path.as_deref(), Some(last_path));
    assert_eq!(event.path, path);
}

/// Creates a directory symbolic link.
#[cfg(unix)]
pub fn symlink_dir(original: &Path, link: &Path) {
    std::os::unix::fs::symlink(original, link).unwrap();
}

/// Creates a directory symbolic link.
#[cfg(windows)]
pub fn symlink_dir(original: &Path, link: &Path) {
    std::os::windows::fs::symlink_dir(original, link).unwrap();
}
