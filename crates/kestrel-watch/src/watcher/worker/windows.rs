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

//! Directory-change event source.

use std::ffi::OsString;
use std::mem::offset_of;
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{io, mem, ptr, slice};
use walkdir::WalkDir;
use windows_sys::Win32::Foundation::{
    CloseHandle, GENERIC_READ, HANDLE, INVALID_HANDLE_VALUE, WAIT_OBJECT_0,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, ReadDirectoryChangesExW, ReadDirectoryNotifyExtendedInformation,
    FILE_ACTION_ADDED, FILE_ACTION_MODIFIED, FILE_ACTION_REMOVED,
    FILE_ACTION_RENAMED_NEW_NAME, FILE_ACTION_RENAMED_OLD_NAME,
    FILE_ATTRIBUTE_DIRECTORY, FILE_FLAG_BACKUP_SEMANTICS, FILE_FLAG_OVERLAPPED,
    FILE_LIST_DIRECTORY, FILE_NOTIFY_CHANGE_DIR_NAME,
    FILE_NOTIFY_CHANGE_FILE_NAME, FILE_NOTIFY_CHANGE_LAST_WRITE,
    FILE_NOTIFY_EXTENDED_INFORMATION, FILE_SHARE_READ, FILE_SHARE_WRITE,
    OPEN_EXISTING,
};
use windows_sys::Win32::System::Threading::{
    CreateEventW, ResetEvent, SetEvent, WaitForMultipleObjects, INFINITE,
};
use windows_sys::Win32::System::IO::{
    CancelIo, GetOverlappedResult, OVERLAPPED,
};

use super::Worker;
use crate::watcher::buffer::EventBuffer;
use crate::watcher::event::{NotifyEvent, NotifyFilter, WatchOptions};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Change classes requested from the kernel.
///
/// The full set is always requested, filtering happens when a batch is
/// published.
const FILTER: u32 = FILE_NOTIFY_CHANGE_FILE_NAME
    | FILE_NOTIFY_CHANGE_DIR_NAME
    | FILE_NOTIFY_CHANGE_LAST_WRITE;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Owned kernel handle, closed on drop.
struct OwnedHandle(HANDLE);

// Handles are process-wide kernel object references, moving or sharing
// them across threads is sound
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

// ----------------------------------------------------------------------------

/// Cancel signal.
///
/// Wraps a manual-reset event the worker waits on next to its overlapped
/// directory read.
pub(super) struct Cancel {
    /// Manual-reset event handle.
    event: Arc<OwnedHandle>,
}

// ----------------------------------------------------------------------------

/// Armed event source, ready to run on the worker thread.
pub(super) struct Armed {
    /// Cancel signal handle shared with the owning worker.
    cancel: Arc<OwnedHandle>,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl OwnedHandle {
    /// Returns the raw handle.
    fn raw(&self) -> HANDLE {
        self.0
    }
}

// ----------------------------------------------------------------------------

impl Cancel {
    /// Sets the cancel signal.
    pub fn set(&self) {
        unsafe {
            SetEvent(self.event.raw());
        }
    }
}

// ----------------------------------------------------------------------------

impl Armed {
    /// Runs the event source until cancellation or a terminal error.
    ///
    /// When the subtree is watched with symbolic links, every directory
    /// link discovered at startup or reported later gets a child worker
    /// rooted at the link, since the kernel's subtree flag does not cross
    /// reparse points. Children live in this call frame, so they are
    /// inserted and removed by the parent thread only and are joined
    /// before the parent's terminal stop marker is published.
    pub fn run(
        self,
        base: &Path,
        options: &WatchOptions,
        buffer: &EventBuffer,
    ) -> io::Result<()> {
        let directory = open_directory(base)?;
        let change = create_event()?;

        let mut children = Vec::new();
        if options.subtree && options.symlinks {
            let walker = WalkDir::new(base).min_depth(1).follow_links(false);
            for entry in walker.into_iter().filter_map(Result::ok) {
                if entry.file_type().is_symlink() && entry.path().is_dir() {
                    children.push(Worker::spawn(
                        false,
                        entry.path().to_path_buf(),
                        *options,
                        buffer.clone(),
                    ));
                }
            }
        }

        watch_loop(
            &directory,
            &change,
            &self.cancel,
            base,
            options,
            buffer,
            &mut children,
        )
    }
}

// ----------------------------------------------------------------------------

impl Drop for OwnedHandle {
    /// Closes the handle.
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Arms a cancel signal for a worker.
pub(super) fn arm() -> io::Result<(Cancel, Armed)> {
    let event = Arc::new(create_event()?);
    Ok((
        Cancel {
            event: Arc::clone(&event),
        },
        Armed { cancel: event },
    ))
}

/// Creates a manual-reset event.
fn create_event() -> io::Result<OwnedHandle> {
    let event = unsafe { CreateEventW(ptr::null(), 1, 0, ptr::null()) };
    if event.is_null() {
        return Err(io::Error::last_os_error());
    }
    Ok(OwnedHandle(event))
}

/// Opens the directory to watch.
///
/// A symlinked root resolves through the open, as the flags do not ask
/// for the reparse point itself.
fn open_directory(base: &Path) -> io::Result<OwnedHandle> {
    let path: Vec<u16> =
        base.as_os_str().encode_wide().chain(Some(0)).collect();

    let handle = unsafe {
        CreateFileW(
            path.as_ptr(),
            FILE_LIST_DIRECTORY | GENERIC_READ,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            ptr::null(),
            OPEN_EXISTING,
            FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OVERLAPPED,
            ptr::null_mut(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error());
    }
    Ok(OwnedHandle(handle))
}

/// Runs the overlapped read loop until cancellation or a terminal error.
#[allow(clippy::too_many_arguments)]
fn watch_loop(
    directory: &OwnedHandle,
    change: &OwnedHandle,
    cancel: &OwnedHandle,
    base: &Path,
    options: &WatchOptions,
    buffer: &EventBuffer,
    children: &mut Vec<Worker>,
) -> io::Result<()> {
    // The kernel writes records with natural alignment, so the readback
    // buffer must be at least DWORD-aligned
    let mut readback = vec![0u64; options.buffer_size.div_ceil(8)];
    let handles = [cancel.raw(), change.raw()];

    loop {
        let mut overlapped: OVERLAPPED = unsafe { mem::zeroed() };
        overlapped.hEvent = change.raw();

        let armed = unsafe {
            ReadDirectoryChangesExW(
                directory.raw(),
                readback.as_mut_ptr().cast(),
                (readback.len() * 8) as u32,
                i32::from(options.subtree),
                FILTER,
                ptr::null_mut(),
                &mut overlapped,
                None,
                ReadDirectoryNotifyExtendedInformation,
            )
        };
        if armed == 0 {
            return Err(io::Error::last_os_error());
        }

        match unsafe { WaitForMultipleObjects(2, handles.as_ptr(), 0, INFINITE) } {
            WAIT_OBJECT_0 => {
                // Cancelled, abandon the outstanding read
                unsafe {
                    CancelIo(directory.raw());
                }
                return Ok(());
            }
            n if n == WAIT_OBJECT_0 + 1 => {
                let mut bytes = 0u32;
                let ok = unsafe {
                    GetOverlappedResult(
                        directory.raw(),
                        &overlapped,
                        &mut bytes,
                        1,
                    )
                };
                if ok == 0 {
                    return Err(io::Error::last_os_error());
                }
                unsafe {
                    ResetEvent(change.raw());
                }

                // A completion without payload means the kernel buffer
                // overflowed, events were lost
                if bytes == 0 {
                    log::warn!(
                        "change buffer overflow on {}, events were lost",
                        base.display()
                    );
                    continue;
                }

                let records = unsafe {
                    slice::from_raw_parts(
                        readback.as_ptr().cast::<u8>(),
                        bytes as usize,
                    )
                };
                let batch = decode(records, base, options, buffer, children);
                buffer.publish_all(
                    batch
                        .into_iter()
                        .filter(|event| options.filter.intersects(event.flags)),
                );
            }
            _ => return Err(io::Error::last_os_error()),
        }
    }
}

/// Decodes one completed read into a batch of events.
///
/// Rename halves arrive as adjacent old/new records, so the new name is
/// patched onto the placeholder at the tail of the batch. Child workers
/// for directory links are spawned and dropped here, on the parent's own
/// thread.
fn decode(
    records: &[u8],
    base: &Path,
    options: &WatchOptions,
    buffer: &EventBuffer,
    children: &mut Vec<Worker>,
) -> Vec<NotifyEvent> {
    let mut batch: Vec<NotifyEvent> = Vec::new();
    let mut offset = 0;

    loop {
        // Records are only 16-bit aligned in some environments, read them
        // unaligned
        let record = unsafe {
            ptr::read_unaligned(
                records
                    .as_ptr()
                    .add(offset)
                    .cast::<FILE_NOTIFY_EXTENDED_INFORMATION>(),
            )
        };

        let name = unsafe {
            slice::from_raw_parts(
                records
                    .as_ptr()
                    .add(offset)
                    .add(offset_of!(
                        FILE_NOTIFY_EXTENDED_INFORMATION,
                        FileName
                    ))
                    .cast::<u16>(),
                record.FileNameLength as usize / 2,
            )
        };
        let path = base.join(PathBuf::from(OsString::from_wide(name)));

        match record.Action {
            FILE_ACTION_ADDED => {
                batch.push(NotifyEvent::created(path.clone()));
                if options.subtree
                    && options.symlinks
                    && is_directory_link(&path)
                {
                    children.push(Worker::spawn(
                        false,
                        path,
                        *options,
                        buffer.clone(),
                    ));
                }
            }
            FILE_ACTION_REMOVED => {
                if options.subtree {
                    children.retain(|worker| {
                        worker.is_running() && worker.base_path() != path
                    });
                }
                batch.push(NotifyEvent::deleted(path));
            }
            FILE_ACTION_MODIFIED => {
                // Directory timestamp churn is noise to consumers
                if record.FileAttributes & FILE_ATTRIBUTE_DIRECTORY == 0 {
                    batch.push(NotifyEvent::modified(path));
                }
            }
            FILE_ACTION_RENAMED_OLD_NAME => {
                batch.push(NotifyEvent::renamed(path, PathBuf::new()));
            }
            FILE_ACTION_RENAMED_NEW_NAME => {
                let placeholder = batch.last_mut().filter(|event| {
                    event.flags == NotifyFilter::RENAMED
                        && event.path.as_os_str().is_empty()
                });
                if let Some(event) = placeholder {
                    event.path = path.clone();
                } else {
                    log::warn!(
                        "rename record without old name: {}",
                        path.display()
                    );
                }

                if options.subtree {
                    let last = batch
                        .last()
                        .and_then(|event| event.last_path.clone());
                    if let Some(last) = last {
                        children.retain(|worker| {
                            worker.is_running() && worker.base_path() != last
                        });
                    }
                    if options.symlinks && is_directory_link(&path) {
                        children.push(Worker::spawn(
                            false,
                            path,
                            *options,
                            buffer.clone(),
                        ));
                    }
                }
            }
            _ => {}
        }

        if record.NextEntryOffset == 0 {
            break;
        }
        offset += record.NextEntryOffset as usize;
    }
    batch
}

/// Checks whether the entry is a symbolic link to a directory.
fn is_directory_link(path: &Path) -> bool {
    path.symlink_metadata()
        .is_ok_and(|meta| meta.file_type().is_symlink())
        && path.is_dir()
}
