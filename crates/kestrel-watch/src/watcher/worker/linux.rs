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

//! inotify event source.

use inotify::{Event, EventMask, Inotify, WatchDescriptor, WatchMask};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::{io, mem};
use walkdir::WalkDir;

use crate::watcher::buffer::EventBuffer;
use crate::watcher::event::{NotifyEvent, WatchOptions};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Token for the inotify file descriptor.
const INOTIFY: Token = Token(0);

/// Token for the cancel signal.
const CANCEL: Token = Token(usize::MAX);

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Cancel signal.
///
/// Wraps a [`Waker`], which is backed by an `eventfd` on Linux, so the
/// worker can poll it next to the inotify descriptor.
pub(super) struct Cancel {
    /// Waker registered with the worker's poller.
    waker: Waker,
}

// ----------------------------------------------------------------------------

/// Armed event source, ready to run on the worker thread.
pub(super) struct Armed {
    /// Poll instance with the cancel signal registered.
    poll: Poll,
}

// ----------------------------------------------------------------------------

/// inotify event source.
///
/// One non-blocking inotify instance covers the whole watched tree: every
/// directory of interest gets its own watch descriptor, recorded in an
/// ordered map from descriptor to the directory's path relative to the
/// worker's base. Event paths are rebuilt by joining the base path, the
/// recorded relative path and the entry name the kernel supplied.
struct Source<'a> {
    /// Poll instance.
    poll: Poll,
    /// inotify instance.
    inotify: Inotify,
    /// Watch descriptors and their relative directory paths.
    watches: BTreeMap<WatchDescriptor, PathBuf>,
    /// Covered directory path.
    base: &'a Path,
    /// Watch options.
    options: &'a WatchOptions,
    /// Kernel readback buffer.
    readback: Vec<u8>,
}

// ----------------------------------------------------------------------------

/// Classified event awaiting publication.
///
/// The pairing token is kept here rather than on the published event, as
/// it is only meaningful inside a single kernel batch.
struct Record {
    /// Event to publish.
    event: NotifyEvent,
    /// Pairing token for rename halves, zero when spent.
    cookie: u32,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Cancel {
    /// Sets the cancel signal.
    pub fn set(&self) {
        if let Err(err) = self.waker.wake() {
            log::warn!("failed to signal cancellation: {err}");
        }
    }
}

// ----------------------------------------------------------------------------

impl Armed {
    /// Runs the event source until cancellation or a terminal error.
    pub fn run(
        self,
        base: &Path,
        options: &WatchOptions,
        buffer: &EventBuffer,
    ) -> io::Result<()> {
        Source::new(self.poll, base, options)?.run(buffer)
    }
}

// ----------------------------------------------------------------------------

impl<'a> Source<'a> {
    /// Creates an event source for the given directory.
    fn new(
        poll: Poll,
        base: &'a Path,
        options: &'a WatchOptions,
    ) -> io::Result<Self> {
        let inotify = Inotify::init()?;
        poll.registry().register(
            &mut SourceFd(&inotify.as_raw_fd()),
            INOTIFY,
            Interest::READABLE,
        )?;

        let mut source = Self {
            poll,
            inotify,
            watches: BTreeMap::new(),
            base,
            options,
            readback: vec![0; options.buffer_size],
        };

        // The root watch must succeed for the source to be viable, watches
        // on nested directories are best-effort
        source.add_directory(PathBuf::new())?;
        Ok(source)
    }

    /// Runs the event loop until cancellation or a terminal error.
    fn run(mut self, buffer: &EventBuffer) -> io::Result<()> {
        let mut events = Events::with_capacity(8);
        loop {
            if let Err(err) = self.poll.poll(&mut events, None) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            // Check the cancel signal first, so shutdown does not lose to
            // a simultaneously readable inotify descriptor
            if events.iter().any(|event| event.token() == CANCEL) {
                return Ok(());
            }

            if events.iter().any(|event| event.token() == INOTIFY) {
                let batch = self.drain()?;
                buffer.publish_all(
                    batch
                        .into_iter()
                        .map(|record| record.event)
                        .filter(|event| {
                            self.options.filter.intersects(event.flags)
                        }),
                );

                // The root watch has unwound, nothing left to report
                if self.watches.is_empty() {
                    return Ok(());
                }
            }
        }
    }

    /// Drains the inotify descriptor into a batch of classified events.
    ///
    /// Reads are repeated until the descriptor would block, so one wakeup
    /// consumes everything the kernel has queued. Rename halves pair only
    /// within the returned batch; a half whose partner lands in a later
    /// batch degrades to a standalone creation or deletion.
    fn drain(&mut self) -> io::Result<Vec<Record>> {
        let mut batch = Vec::new();
        loop {
            let records: Vec<Event<OsString>> =
                match self.inotify.read_events(&mut self.readback) {
                    Ok(events) => {
                        events.map(|event| event.into_owned()).collect()
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                        break;
                    }
                    Err(err) => return Err(err),
                };

            if records.is_empty() {
                break;
            }
            for record in records {
                self.classify(record, &mut batch);
            }
        }
        Ok(batch)
    }

    /// Classifies a single kernel record into the batch.
    fn classify(&mut self, event: Event<OsString>, batch: &mut Vec<Record>) {
        if event.mask.contains(EventMask::Q_OVERFLOW) {
            log::warn!(
                "inotify queue overflow on {}, events were lost",
                self.base.display()
            );
            return;
        }

        // Kernel-side acknowledgement of a removed watch
        if event.mask.contains(EventMask::IGNORED) {
            self.watches.remove(&event.wd);
            return;
        }

        // The watched directory itself went away, unwind it and all
        // watches below it without emitting user events
        if event
            .mask
            .intersects(EventMask::MOVE_SELF | EventMask::DELETE_SELF)
        {
            self.remove_subtree(
                &event.wd,
                event.mask.contains(EventMask::MOVE_SELF),
            );
            return;
        }

        let Some(rel) = self.watches.get(&event.wd).cloned() else {
            return;
        };
        let name = event.name.unwrap_or_default();
        let path = self.base.join(&rel).join(&name);

        if event
            .mask
            .intersects(EventMask::CREATE | EventMask::MOVED_TO)
        {
            if self.options.subtree && self.is_watchable(&event.mask, &path) {
                if let Err(err) = self.add_directory(rel.join(&name)) {
                    log::debug!(
                        "failed to watch new directory {}: {err}",
                        path.display()
                    );
                }
            }

            if event.mask.contains(EventMask::MOVED_TO)
                && pair_rename(event.cookie, &path, batch)
            {
                return;
            }
            batch.push(Record {
                event: NotifyEvent::created(path),
                cookie: event.cookie,
            });
            return;
        }

        if event
            .mask
            .intersects(EventMask::DELETE | EventMask::MOVED_FROM)
        {
            if event.mask.contains(EventMask::MOVED_FROM)
                && pair_rename(event.cookie, &path, batch)
            {
                return;
            }
            batch.push(Record {
                event: NotifyEvent::deleted(path),
                cookie: event.cookie,
            });
            return;
        }

        if event.mask.contains(EventMask::CLOSE_WRITE) {
            batch.push(Record {
                event: NotifyEvent::modified(path),
                cookie: event.cookie,
            });
        }
    }

    /// Adds a watch for the directory at the given relative path, and for
    /// its nested directories when watching the subtree.
    ///
    /// Directories that cannot be entered are skipped silently, and
    /// directory symbolic links are only descended into when following
    /// links was requested – inotify itself follows a link given to it,
    /// so the watch lands on the target.
    fn add_directory(&mut self, rel: PathBuf) -> io::Result<()> {
        self.add_watch(&rel)?;
        if !self.options.subtree {
            return Ok(());
        }

        let walker = WalkDir::new(self.base.join(&rel))
            .min_depth(1)
            .follow_links(self.options.symlinks);
        for entry in walker.into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_dir() {
                continue;
            }
            let Ok(sub) = entry.path().strip_prefix(self.base) else {
                continue;
            };
            if let Err(err) = self.add_watch(sub) {
                log::debug!(
                    "failed to watch {}: {err}",
                    entry.path().display()
                );
            }
        }
        Ok(())
    }

    /// Adds a watch for a single directory.
    ///
    /// The full mask is always requested, filtering happens when a batch
    /// is published. Re-adding a path the kernel already watches yields
    /// the same descriptor, so the recorded path is simply replaced.
    fn add_watch(&mut self, rel: &Path) -> io::Result<()> {
        let mask = WatchMask::CREATE
            | WatchMask::MOVE
            | WatchMask::DELETE
            | WatchMask::CLOSE_WRITE
            | WatchMask::DELETE_SELF
            | WatchMask::MOVE_SELF;

        let wd = self.inotify.watches().add(self.base.join(rel), mask)?;
        self.watches.insert(wd, rel.to_path_buf());
        Ok(())
    }

    /// Removes the watch for the given descriptor and the watches of all
    /// directories below its recorded path.
    fn remove_subtree(&mut self, wd: &WatchDescriptor, moved: bool) {
        let Some(rel) = self.watches.remove(wd) else {
            return;
        };

        // A deleted watch is detached by the kernel on its own, a moved
        // one has to be removed explicitly
        if moved {
            let _ = self.inotify.watches().remove(wd.clone());
        }
        self.watches.retain(|_, path| !path.starts_with(&rel));
    }

    /// Checks whether a created entry warrants a watch of its own.
    fn is_watchable(&self, mask: &EventMask, path: &Path) -> bool {
        if mask.contains(EventMask::ISDIR) {
            return true;
        }
        self.options.symlinks
            && path
                .symlink_metadata()
                .is_ok_and(|meta| meta.file_type().is_symlink())
            && path.is_dir()
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Arms a cancel signal and the poller it is registered with.
pub(super) fn arm() -> io::Result<(Cancel, Armed)> {
    let poll = Poll::new()?;
    let waker = Waker::new(poll.registry(), CANCEL)?;
    Ok((Cancel { waker }, Armed { poll }))
}

/// Pairs a rename half against the batch.
///
/// Scans the batch in reverse for a record with the same non-zero pairing
/// token and turns it into a rename from its path to the given one. The
/// token is spent in the process, so a record pairs at most once.
fn pair_rename(cookie: u32, path: &Path, batch: &mut [Record]) -> bool {
    if cookie == 0 {
        return false;
    }
    for record in batch.iter_mut().rev() {
        if record.cookie == cookie {
            let last_path = mem::take(&mut record.event.path);
            record.event = NotifyEvent::renamed(last_path, path.to_path_buf());
            record.cookie = 0;
            return true;
        }
    }
    false
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::event::NotifyFilter;

    fn record(event: NotifyEvent, cookie: u32) -> Record {
        Record { event, cookie }
    }

    #[test]
    fn pairs_matching_cookie_in_reverse() {
        let mut batch = vec![
            record(NotifyEvent::created(PathBuf::from("/t/other")), 7),
            record(NotifyEvent::deleted(PathBuf::from("/t/old")), 9),
        ];

        assert!(pair_rename(9, Path::new("/t/new"), &mut batch));
        assert_eq!(batch[1].cookie, 0);
        assert_eq!(
            batch[1].event,
            NotifyEvent::renamed(
                PathBuf::from("/t/old"),
                PathBuf::from("/t/new")
            )
        );

        // The first record is untouched
        assert_eq!(batch[0].cookie, 7);
        assert_eq!(batch[0].event.flags, NotifyFilter::CREATED);
    }

    #[test]
    fn ignores_unmatched_and_zero_cookies() {
        let mut batch =
            vec![record(NotifyEvent::deleted(PathBuf::from("/t/old")), 0)];

        assert!(!pair_rename(0, Path::new("/t/new"), &mut batch));
        assert!(!pair_rename(3, Path::new("/t/new"), &mut batch));
        assert_eq!(batch[0].event.flags, NotifyFilter::DELETED);
    }

    #[test]
    fn spent_cookie_does_not_pair_again() {
        let mut batch =
            vec![record(NotifyEvent::deleted(PathBuf::from("/t/old")), 4)];

        assert!(pair_rename(4, Path::new("/t/new"), &mut batch));
        assert!(!pair_rename(4, Path::new("/t/other"), &mut batch));
        assert_eq!(batch[0].event.path, PathBuf::from("/t/new"));
    }
}
