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

//! Watcher façade behavior.

mod common;

use std::fs;

use kestrel_watch::{Error, NotifyFilter, WatchOptions};

#[test]
fn frames_watch_without_activity() {
    let (_dir, root) = common::scratch();
    let (mut watcher, events) = common::collector();

    // No settling here on purpose: the frame is deterministic because
    // stopping joins the worker after it buffered its stop marker
    watcher.watch(&root, WatchOptions::default()).unwrap();
    watcher.stop_watching();
    watcher.process_events();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2, "unexpected events: {events:#?}");
    common::assert_start(&events[0], &root);
    common::assert_stop(&events[1], &root);
}

#[test]
fn rejects_missing_roots() {
    let (_dir, root) = common::scratch();
    let (mut watcher, _) = common::collector();

    let missing = root.join("missing");
    assert!(matches!(
        watcher.watch(&missing, WatchOptions::default()),
        Err(Error::Io(_))
    ));
    assert!(!watcher.is_watching(&missing));
}

#[test]
fn rejects_file_roots() {
    let (_dir, root) = common::scratch();
    let (mut watcher, _) = common::collector();

    let file = root.join("file");
    fs::write(&file, "Hello world").unwrap();

    assert!(matches!(
        watcher.watch(&file, WatchOptions::default()),
        Err(Error::NotADirectory(path)) if path == file
    ));
    assert!(!watcher.is_watching(&file));
}

#[test]
fn reports_watched_roots() {
    let (_dir, root) = common::scratch();
    let (mut watcher, _) = common::collector();

    assert!(!watcher.is_watching(&root));

    watcher.watch(&root, WatchOptions::default()).unwrap();
    assert!(watcher.is_watching(&root));

    // Paths compare after lexical normalization
    assert!(watcher.is_watching(root.join("sub").join("..")));

    watcher.stop_watching();
    assert!(!watcher.is_watching(&root));
}

#[test]
fn drains_are_incremental() {
    let (_dir, root) = common::scratch();
    let (mut watcher, events) = common::collector();

    watcher.watch(&root, WatchOptions::default()).unwrap();
    common::settle();

    fs::write(root.join("new_file"), "Hello world").unwrap();
    common::settle();
    watcher.process_events();

    {
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3, "unexpected events: {events:#?}");
        common::assert_start(&events[0], &root);
        common::assert_change(
            &events[1],
            NotifyFilter::CREATED,
            &root.join("new_file"),
        );
        common::assert_change(
            &events[2],
            NotifyFilter::MODIFIED,
            &root.join("new_file"),
        );
    }

    // The next drain only observes what happened since the last one
    watcher.stop_watching();
    watcher.process_events();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 4, "unexpected events: {events:#?}");
    common::assert_stop(&events[3], &root);
}
