//! Response-time padding for authentication calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Pads the wrapped operation so that it never settles faster than `floor`.
///
/// An observer timing the sign-in endpoint then sees the same latency for an
/// unknown email, a wrong password and a fast provider round-trip. Slower
/// operations are not delayed further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingProtection {
    floor: Duration,
}

impl TimingProtection {
    pub fn new(floor: Duration) -> Self {
        Self { floor }
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    /// Await `op`, then sleep until `floor` has passed since the call began.
    ///
    /// The output is handed back untouched, so an `Err` keeps its original
    /// value. No error of its own is introduced and there is no timeout; wrap
    /// `op` in one if the inner call may hang.
    pub async fn protect<F>(&self, op: F) -> F::Output
    where
        F: Future,
    {
        let started = Instant::now();
        let output = op.await;

        let elapsed = started.elapsed();
        if elapsed < self.floor {
            tracing::debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                floor_ms = self.floor.as_millis() as u64,
                "Padding authentication response to timing floor"
            );
            tokio::time::sleep_until(started + self.floor).await;
        }

        output
    }
}
