use core::{
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicBool, Ordering},
    task::{Context, Poll},
    time::Duration,
};

use futures::task::AtomicWaker;

use crate::osal::{Kernel, poll_timeout};

const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// 一次性完成通知，可被多个等待者同时观察
///
/// Blocking waiters poll the flag, so every waiter sees `complete_all`. The
/// async side registers a single waker.
pub struct Completion {
    done: AtomicBool,
    waker: AtomicWaker,
}

impl Completion {
    pub fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            waker: AtomicWaker::new(),
        }
    }

    pub fn reinit(&self) {
        self.done.store(false, Ordering::Release);
    }

    pub fn complete_all(&self) {
        self.done.store(true, Ordering::Release);
        self.waker.wake();
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_timeout(&self, kernel: &dyn Kernel, timeout: Duration) -> bool {
        poll_timeout(kernel, COMPLETION_POLL_INTERVAL, timeout, || self.is_done())
    }

    pub fn wait(&self) -> CompletionWait<'_> {
        CompletionWait { completion: self }
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CompletionWait<'a> {
    completion: &'a Completion,
}

impl Future for CompletionWait<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.completion.is_done() {
            return Poll::Ready(());
        }
        self.completion.waker.register(cx.waker());
        if self.completion.is_done() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}
