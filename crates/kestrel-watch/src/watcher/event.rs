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

//! Watch events and options.

use bitflags::bitflags;
use std::path::PathBuf;

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// Watch event kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// Filesystem change.
    Filesystem,
    /// A root worker started watching.
    Start,
    /// A root worker stopped watching.
    Stop,
}

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

bitflags! {
    /// Filesystem change flags.
    ///
    /// Every published [`Kind::Filesystem`] event carries exactly one of
    /// these bits. As a [`WatchOptions`] filter, any combination selects
    /// which changes reach the event buffer – the empty set delivers
    /// nothing, [`NotifyFilter::all`] delivers everything.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct NotifyFilter: u32 {
        /// An entry was created.
        const CREATED = 1 << 0;
        /// An entry was deleted.
        const DELETED = 1 << 1;
        /// An entry's contents were written.
        const MODIFIED = 1 << 2;
        /// An entry was renamed within the watched tree.
        const RENAMED = 1 << 3;
    }
}

// ----------------------------------------------------------------------------

/// Watch event.
///
/// Paths are absolute, built by joining the reporting worker's base path
/// with the entry name the kernel supplied. For renames, [`path`] is the
/// name after the rename and [`last_path`] the name before it.
///
/// [`path`]: NotifyEvent::path
/// [`last_path`]: NotifyEvent::last_path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotifyEvent {
    /// Event kind.
    pub kind: Kind,
    /// Change flags, meaningful only for [`Kind::Filesystem`].
    pub flags: NotifyFilter,
    /// Absolute path of the affected entry.
    pub path: PathBuf,
    /// Previous absolute path, carried iff the entry was renamed.
    pub last_path: Option<PathBuf>,
}

// ----------------------------------------------------------------------------

/// Watch options.
///
/// Options are fixed when [`DirectoryWatcher::watch`] is called and stay
/// immutable for the lifetime of the worker they configure.
///
/// [`DirectoryWatcher::watch`]: super::DirectoryWatcher::watch
#[derive(Clone, Copy, Debug)]
pub struct WatchOptions {
    /// Watch all nested directories recursively.
    pub subtree: bool,
    /// Follow directory symbolic links when watching the subtree, even
    /// when the target lies outside the watched root.
    pub symlinks: bool,
    /// Changes that reach the event buffer.
    pub filter: NotifyFilter,
    /// Size in bytes of the kernel readback buffer. Must be large enough
    /// to hold at least one native event record.
    pub buffer_size: usize,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl NotifyEvent {
    /// Creates a start marker.
    pub(crate) fn start(path: PathBuf) -> Self {
        Self {
            kind: Kind::Start,
            flags: NotifyFilter::empty(),
            path,
            last_path: None,
        }
    }

    /// Creates a stop marker.
    pub(crate) fn stop(path: PathBuf) -> Self {
        Self {
            kind: Kind::Stop,
            flags: NotifyFilter::empty(),
            path,
            last_path: None,
        }
    }

    /// Creates a creation event.
    pub(crate) fn created(path: PathBuf) -> Self {
        Self {
            kind: Kind::Filesystem,
            flags: NotifyFilter::CREATED,
            path,
            last_path: None,
        }
    }

    /// Creates a deletion event.
    pub(crate) fn deleted(path: PathBuf) -> Self {
        Self {
            kind: Kind::Filesystem,
            flags: NotifyFilter::DELETED,
            path,
            last_path: None,
        }
    }

    /// Creates a modification event.
    pub(crate) fn modified(path: PathBuf) -> Self {
        Self {
            kind: Kind::Filesystem,
            flags: NotifyFilter::MODIFIED,
            path,
            last_path: None,
        }
    }

    /// Creates a rename event.
    pub(crate) fn renamed(last_path: PathBuf, path: PathBuf) -> Self {
        Self {
            kind: Kind::Filesystem,
            flags: NotifyFilter::RENAMED,
            path,
            last_path: Some(last_path),
        }
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl Default for WatchOptions {
    /// Creates watch options for a non-recursive watch that delivers all
    /// changes through an 8 KiB readback buffer.
    fn default() -> Self {
        Self {
            subtree: false,
            symlinks: false,
            filter: NotifyFilter::all(),
            buffer_size: 8192,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
