//! Panic capture
//!
//! Assertions in callbacks panic. The hook installed here remembers where
//! the last panic on each thread happened so the failure report can carry
//! `file:line`, and keeps panics raised inside scheduled runnables off
//! stderr; the reporter prints them instead.

use futures::FutureExt;
use std::cell::RefCell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use super::context;
use crate::models::{Failure, FailureKind, SourceLocation};

thread_local! {
    static LAST_PANIC: RefCell<Option<SourceLocation>> = const { RefCell::new(None) };
}

static INSTALL: Once = Once::new();

/// Install the capturing panic hook once per process
pub fn install_hook() {
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let location = info.location().map(SourceLocation::from_location);
            LAST_PANIC.with(|last| *last.borrow_mut() = location);
            if !context::in_line() {
                previous(info);
            }
        }));
    });
}

/// Location of the most recent panic on this thread
pub fn take_location() -> Option<SourceLocation> {
    LAST_PANIC.with(|last| last.borrow_mut().take())
}

/// Drive a callback future, turning panics and errors into a [`Failure`]
pub async fn catch_failure<F>(fut: F) -> Result<(), Failure>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(Failure::from_error(error, FailureKind::Error)),
        Err(payload) => Err(Failure::from_panic(payload, take_location())),
    }
}
