//! Cancellation scopes for blocking workers
//!
//! Scopes are [`CancellationToken`]s: a child made with
//! [`CancellationToken::child_token`] is cancelled along with its parent, while
//! cancelling the child leaves the parent untouched. Worker threads are not
//! async, so [`wait_cancelled`] drives the token's `cancelled()` future on the
//! calling thread, parking it until the token fires or the timeout runs out.

use futures::task::{waker, ArcWake};
use std::future::Future;
use std::sync::Arc;
use std::task::Context;
use std::thread::Thread;
use std::time::{Duration, Instant};

pub use tokio_util::sync::CancellationToken;

/// Wakes a parked thread
struct Unparker(Thread);

impl ArcWake for Unparker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.unpark();
    }
}

/// Block for up to `timeout`, returning early if `token` is cancelled
///
/// Returns `true` if the token was cancelled.
pub fn wait_cancelled(token: &CancellationToken, timeout: Duration) -> bool {
    if token.is_cancelled() {
        return true;
    }

    let deadline = Instant::now() + timeout;
    let waker = waker(Arc::new(Unparker(std::thread::current())));
    let mut cx = Context::from_waker(&waker);
    let mut cancelled = std::pin::pin!(token.cancelled());

    loop {
        if cancelled.as_mut().poll(&mut cx).is_ready() {
            return true;
        }

        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        // Spurious unparks just poll again
        std::thread::park_timeout(deadline - now);
    }
}
