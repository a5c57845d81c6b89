use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Hands out exclusive ownership of devices to execution units.
///
/// A unit claims its whole device set at once; the claim is released when
/// the [`DeviceClaim`] drops. Acquisition blocks while any wanted device is
/// held, up to a deadline, so contention surfaces as an error instead of a
/// deadlock.
#[derive(Debug, Default)]
pub struct SessionBroker {
    held: Mutex<HashSet<String>>,
    freed: Condvar,
}

impl SessionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim exclusive use of the named devices.
    ///
    /// # Errors
    ///
    /// Returns a [`ClaimError`] naming the still-busy devices when the
    /// deadline expires first.
    pub fn acquire(
        self: &Arc<Self>,
        devices: &[String],
        deadline: Duration,
    ) -> Result<DeviceClaim, ClaimError> {
        let until = Instant::now() + deadline;
        let mut held = self.lock();
        loop {
            if devices.iter().all(|d| !held.contains(d)) {
                for device in devices {
                    held.insert(device.clone());
                }
                tracing::trace!(devices = ?devices, "devices claimed");
                return Ok(DeviceClaim {
                    broker: Arc::clone(self),
                    devices: devices.to_vec(),
                });
            }
            let now = Instant::now();
            if now >= until {
                let busy: Vec<String> = devices
                    .iter()
                    .filter(|d| held.contains(*d))
                    .cloned()
                    .collect();
                return Err(ClaimError {
                    busy,
                    waited: deadline,
                });
            }
            let (guard, _) = self
                .freed
                .wait_timeout(held, until - now)
                .unwrap_or_else(PoisonError::into_inner);
            held = guard;
        }
    }

    /// Whether the named device is currently claimed.
    pub fn is_held(&self, device: &str) -> bool {
        self.lock().contains(device)
    }

    fn release(&self, devices: &[String]) {
        let mut held = self.lock();
        for device in devices {
            held.remove(device);
        }
        tracing::trace!(devices = ?devices, "devices released");
        self.freed.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // A holder that panicked mid-run left the set consistent; keep going.
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive ownership of a set of devices, released on drop.
#[derive(Debug)]
pub struct DeviceClaim {
    broker: Arc<SessionBroker>,
    devices: Vec<String>,
}

impl DeviceClaim {
    pub fn devices(&self) -> &[String] {
        &self.devices
    }
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        self.broker.release(&self.devices);
    }
}

/// The claim deadline expired while other units held wanted devices.
#[derive(Debug, Clone)]
pub struct ClaimError {
    pub busy: Vec<String>,
    pub waited: Duration,
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timed out after {:.1}s waiting for devices: {}",
            self.waited.as_secs_f64(),
            self.busy.join(", ")
        )
    }
}

impl std::error::Error for ClaimError {}
