//! Periodic polling of both devices in a fixed order (spec §4.4).
//!
//! Fires once a second, hopper before validator, because a hopper `RESET`
//! must be observed before validator events that depend on coin
//! replenishment. Each SSP exchange — including poll itself — is preceded
//! by a 300 ms "hardware wait time" matching the peripherals' inter-command
//! recovery window.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, warn};
use parking_lot::Mutex;

use crate::bus::{topics, EventSink};
use crate::device::{Device, DeviceRole};
use crate::error::SspError;
use crate::translate::translate;

/// Inter-exchange recovery window the hardware needs (spec §4.4).
pub const HARDWARE_WAIT: Duration = Duration::from_millis(300);
/// Poll tick period (spec §4.4 / §5).
pub const POLL_PERIOD: Duration = Duration::from_secs(1);

/// Signals an unrecoverable condition up to the supervisor (spec §6: exit
/// code 3, "the post-RESET host_protocol(0x06) fails during operation").
pub struct FatalResyncFailure;

/// Drives one poll tick across both devices and publishes translated
/// events. Owns no state itself beyond the device handles and sink; the
/// supervisor is responsible for the 1 s timer.
pub struct PollLoop {
    hopper: Arc<Mutex<Device>>,
    validator: Arc<Mutex<Device>>,
}

impl PollLoop {
    pub fn new(hopper: Arc<Mutex<Device>>, validator: Arc<Mutex<Device>>) -> Self {
        Self { hopper, validator }
    }

    /// Runs one tick: polls the hopper, then the validator, publishing
    /// events for each in order. Returns `Err` only on the unrecoverable
    /// re-sync failure; all other per-device failures are logged and
    /// skipped for that tick (spec §4.3's "recoverable outcomes").
    pub fn tick(&self, sink: &mut dyn EventSink) -> Result<(), FatalResyncFailure> {
        self.poll_one(&self.hopper, DeviceRole::Hopper, topics::HOPPER_EVENT, sink)?;
        self.poll_one(&self.validator, DeviceRole::Validator, topics::VALIDATOR_EVENT, sink)?;
        Ok(())
    }

    fn poll_one(
        &self,
        device: &Arc<Mutex<Device>>,
        role: DeviceRole,
        event_topic: &str,
        sink: &mut dyn EventSink,
    ) -> Result<(), FatalResyncFailure> {
        thread::sleep(HARDWARE_WAIT);

        let mut guard = device.lock();
        let events = match guard.poll() {
            Ok(events) => events,
            Err(SspError::ReSyncFailed) => {
                error!("{role:?}: host_protocol re-sync after RESET failed, unrecoverable");
                return Err(FatalResyncFailure);
            }
            Err(err) => {
                warn!("{role:?}: poll failed: {err}");
                return Ok(());
            }
        };

        let setup_report = guard.setup_report().cloned();
        let mut run_calibration = false;

        for raw in &events {
            let translation = translate(role, raw, setup_report.as_ref());
            run_calibration |= translation.needs_recalibration;
            for payload in translation.events {
                if let Ok(bytes) = serde_json::to_vec(&payload) {
                    sink.publish_event(event_topic, &bytes);
                }
            }
        }

        if run_calibration {
            if let Err(err) = guard.run_calibration() {
                warn!("{role:?}: run_calibration after recal request failed: {err}");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::InMemoryBus;
    use crate::transport::SspTransport;
    use std::io::{Read, Write};

    struct DeadLink;
    impl Read for DeadLink {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "no hardware"))
        }
    }
    impl Write for DeadLink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn device(role: DeviceRole) -> Arc<Mutex<Device>> {
        let transport = Arc::new(SspTransport::from_link(Box::new(DeadLink)));
        Arc::new(Mutex::new(Device::new(0x10, role, "Mr. Coin", transport)))
    }

    #[test]
    fn tick_on_dead_hardware_logs_and_does_not_panic() {
        let loop_ = PollLoop::new(device(DeviceRole::Hopper), device(DeviceRole::Validator));
        let mut bus = InMemoryBus::new();
        let result = loop_.tick(&mut bus);
        assert!(result.is_ok());
        assert!(bus.events.is_empty());
    }
}
