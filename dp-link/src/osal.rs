use core::time::Duration;

/// Services the driver needs from the surrounding kernel.
pub trait Kernel: Send + Sync + 'static {
    /// Blocking sleep.
    fn delay(&self, duration: Duration);
    /// Monotonic time since an arbitrary epoch.
    fn now(&self) -> Duration;
}

/// usleep_range 等价物：睡眠区间的下限
pub fn sleep_range_us(kernel: &dyn Kernel, min_us: u64, _max_us: u64) {
    kernel.delay(Duration::from_micros(min_us));
}

pub fn msleep(kernel: &dyn Kernel, ms: u64) {
    kernel.delay(Duration::from_millis(ms));
}

/// Polls `cond` every `interval` until it holds or `timeout` elapses.
/// Returns whether the condition was met.
pub fn poll_timeout<F>(kernel: &dyn Kernel, interval: Duration, timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = kernel.now();
    loop {
        if cond() {
            return true;
        }
        if kernel.now().saturating_sub(start) >= timeout {
            return cond();
        }
        kernel.delay(interval);
    }
}

pub struct SpinWhile<F>
where
    F: Fn() -> bool,
{
    pub condition: F,
}

impl<F> SpinWhile<F>
where
    F: Fn() -> bool,
{
    #[must_use]
    pub fn new(condition: F) -> Self {
        Self { condition }
    }
}

impl<F> core::future::Future for SpinWhile<F>
where
    F: Fn() -> bool,
{
    type Output = ();

    fn poll(
        self: core::pin::Pin<&mut Self>,
        cx: &mut core::task::Context<'_>,
    ) -> core::task::Poll<Self::Output> {
        if (self.condition)() {
            cx.waker().wake_by_ref();
            core::task::Poll::Pending
        } else {
            core::task::Poll::Ready(())
        }
    }
}
