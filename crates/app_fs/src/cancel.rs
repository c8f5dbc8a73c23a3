//! Cancellation inside blocking copies

use crate::{FsError, Result};
use std::io::{self, Write};
use tokio_util::sync::CancellationToken;

/// Sink adapter failing the next write once `cancel` fires, so a copy
/// running on a blocking thread stops at the following chunk
struct CancelOnWrite<'a> {
    inner: &'a mut dyn Write,
    cancel: &'a CancellationToken,
}

impl Write for CancelOnWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // not `Interrupted`: io::copy retries those
        if self.cancel.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Other, "copy cancelled"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Run `copy` against `sink`, aborting between chunks when `cancel` fires
pub(crate) fn copy_cancellable<F>(
    cancel: &CancellationToken,
    sink: &mut dyn Write,
    copy: F,
) -> Result<u64>
where
    F: FnOnce(&mut dyn Write) -> Result<u64>,
{
    if cancel.is_cancelled() {
        return Err(FsError::Cancelled);
    }

    let mut guarded = CancelOnWrite {
        inner: sink,
        cancel,
    };
    match copy(&mut guarded) {
        // backends may wrap the io error in their own variant
        Err(_) if cancel.is_cancelled() => Err(FsError::Cancelled),
        result => result,
    }
}
