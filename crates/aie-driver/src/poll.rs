//! Busy-wait retry loops
//!
//! The only blocking primitive in the driver. Lock requests retry against a
//! wall-clock deadline; `timeout_us == 0` means exactly one attempt.
//! Backends with interrupt support can override
//! [`RegisterIo::mask_poll`](crate::RegisterIo::mask_poll) instead of using
//! this loop.

use crate::error::Result;
use std::time::{Duration, Instant};

/// Run `attempt` until it reports success or `timeout_us` elapses.
///
/// Returns `Ok(true)` on success, `Ok(false)` once the deadline passes.
/// The attempt always runs at least once, and the last attempt is made after
/// the deadline has been observed.
///
/// # Errors
///
/// Propagates the first error returned by `attempt`.
pub fn retry_until<F>(timeout_us: u32, mut attempt: F) -> Result<bool>
where
    F: FnMut() -> Result<bool>,
{
    if timeout_us == 0 {
        return attempt();
    }

    let deadline = Instant::now() + Duration::from_micros(u64::from(timeout_us));
    loop {
        let expired = Instant::now() >= deadline;
        if attempt()? {
            return Ok(true);
        }
        if expired {
            return Ok(false);
        }
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AieError;

    #[test]
    fn zero_timeout_is_single_attempt() {
        let mut calls = 0;
        let ok = retry_until(0, || {
            calls += 1;
            Ok(false)
        })
        .unwrap();
        assert!(!ok);
        assert_eq!(calls, 1);
    }

    #[test]
    fn retries_until_success() {
        let mut calls = 0;
        let ok = retry_until(1_000_000, || {
            calls += 1;
            Ok(calls == 5)
        })
        .unwrap();
        assert!(ok);
        assert_eq!(calls, 5);
    }

    #[test]
    fn gives_up_after_deadline() {
        let start = Instant::now();
        let ok = retry_until(2_000, || Ok(false)).unwrap();
        assert!(!ok);
        assert!(start.elapsed() >= Duration::from_micros(2_000));
    }

    #[test]
    fn errors_abort_the_loop() {
        let mut calls = 0;
        let err = retry_until(1_000_000, || {
            calls += 1;
            Err(AieError::hardware_access_failed(0, "bus error"))
        });
        assert!(err.is_err());
        assert_eq!(calls, 1);
    }
}
