use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use lumen_gfx::{CreateDeviceError, DeviceProvider, GpuContext};

use crate::graphics::GraphicsDevice;

/// Fixed delay between rebuild attempts so a driver stuck in a reset loop is
/// not hammered.
pub const REBUILD_BACKOFF: Duration = Duration::from_millis(500);

/// Lifecycle of one recovery instance. An instance guards exactly one device
/// generation; `Rearmed` is terminal because the successor instance has taken
/// over by then.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecoveryState {
    /// Waiting on the device-removal signal.
    Armed,
    /// Constructing a replacement device.
    Rebuilding,
    /// A rebuild failed with a recoverable error; sleeping out the backoff.
    Retrying,
    /// A successor instance guards the new device; this one is done.
    Rearmed,
}

/// Retry `create` until it succeeds or fails non-recoverably, sleeping
/// `backoff` between attempts. Only the device-removed/device-reset error
/// class is retried.
pub fn rebuild_with_backoff<T>(
    mut create: impl FnMut() -> Result<T, CreateDeviceError>,
    backoff: Duration,
) -> Result<T, CreateDeviceError> {
    loop {
        log::debug!("recovery state: {:?}", RecoveryState::Rebuilding);
        match create() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_recoverable() => {
                log::warn!("device rebuild failed recoverably ({err}); retrying in {backoff:?}");
                log::debug!("recovery state: {:?}", RecoveryState::Retrying);
                std::thread::sleep(backoff);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Arm a recovery instance for `context`.
///
/// The spawned thread blocks on the context's removal signal. When it fires,
/// the thread re-arms the signal, rebuilds a device through `provider` with
/// the fixed backoff, spawns the successor instance for the new context
/// *before* making it live, and then substitutes the new context into
/// `graphics` (which synchronously notifies the replaced listeners).
///
/// The instance is supervised: a non-recoverable rebuild error, or a failure
/// while rebinding, is delivered once to `on_fatal` before the thread exits.
pub fn spawn_recovery<P>(
    context: GpuContext,
    provider: P,
    graphics: Arc<Mutex<GraphicsDevice>>,
    on_fatal: Arc<dyn Fn(anyhow::Error) + Send + Sync>,
) -> JoinHandle<()>
where
    P: DeviceProvider + Clone + 'static,
{
    let generation = context.generation();
    std::thread::Builder::new()
        .name(format!("device-recovery-{generation}"))
        .spawn(move || {
            let signal = context.removal_signal();
            log::debug!("recovery state: {:?} (generation {generation})", RecoveryState::Armed);
            signal.wait();

            // Re-arm the shared event for the next device and let go of the
            // dead handle before anything else.
            signal.reset();
            drop(context);
            log::warn!("device removal signalled for generation {generation}; rebuilding");

            match rebuild_with_backoff(|| provider.create_context(), REBUILD_BACKOFF) {
                Ok(new_context) => {
                    // Arm the successor before the new device goes live so no
                    // window exists in which a loss goes unobserved.
                    let _ = spawn_recovery(
                        new_context.clone(),
                        provider.clone(),
                        graphics.clone(),
                        on_fatal.clone(),
                    );
                    log::debug!(
                        "recovery state: {:?} (generation {} -> {})",
                        RecoveryState::Rearmed,
                        generation,
                        new_context.generation()
                    );
                    let result = graphics.lock().unwrap().set_rendering_device(new_context);
                    if let Err(err) = result {
                        on_fatal(err.context("redraw after device replacement failed"));
                    }
                }
                Err(err) => {
                    on_fatal(anyhow::Error::new(err).context("device rebuild failed"));
                }
            }
        })
        .expect("failed to spawn device-recovery thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_succeeds_first_try_without_backoff() {
        let mut attempts = 0;
        let start = Instant::now();
        let value = rebuild_with_backoff(
            || {
                attempts += 1;
                Ok::<_, CreateDeviceError>(42u32)
            },
            Duration::from_millis(50),
        )
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(attempts, 1);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_retries_exactly_n_times_on_recoverable_errors() {
        let mut attempts = 0;
        let backoff = Duration::from_millis(5);
        let start = Instant::now();
        let value = rebuild_with_backoff(
            || {
                attempts += 1;
                if attempts <= 3 {
                    Err(CreateDeviceError::Removed)
                } else {
                    Ok(7u32)
                }
            },
            backoff,
        )
        .unwrap();
        assert_eq!(value, 7);
        // 3 recoverable failures then success: exactly 4 creation attempts
        // with a backoff after each failure.
        assert_eq!(attempts, 4);
        assert!(start.elapsed() >= backoff * 3);
    }

    #[test]
    fn test_nonrecoverable_error_terminates_without_retry() {
        let mut attempts = 0;
        let start = Instant::now();
        let err = rebuild_with_backoff(
            || {
                attempts += 1;
                Err::<u32, _>(CreateDeviceError::NoAdapter)
            },
            Duration::from_millis(50),
        )
        .unwrap_err();
        assert_eq!(attempts, 1);
        assert!(!err.is_recoverable());
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_mixed_errors_stop_at_first_fatal() {
        let mut attempts = 0;
        let err = rebuild_with_backoff(
            || {
                attempts += 1;
                if attempts == 1 {
                    Err::<u32, _>(CreateDeviceError::Reset)
                } else {
                    Err(CreateDeviceError::NoAdapter)
                }
            },
            Duration::from_millis(1),
        )
        .unwrap_err();
        assert_eq!(attempts, 2);
        assert!(matches!(err, CreateDeviceError::NoAdapter));
    }
}
