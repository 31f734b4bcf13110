//! Daemon entrypoint: parses CLI flags, opens the serial link, constructs
//! both devices, connects the bus, and runs the supervisor's event loop
//! until shutdown (spec §6).

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;

use metacash::config::Config;
use metacash::device::{Device, DeviceRole};
use metacash::supervisor::{exit_code, Supervisor};
use metacash::transport::SspTransport;

const HOPPER_ADDRESS: u8 = 0x10;
const VALIDATOR_ADDRESS: u8 = 0x00;

/// Stand-in serial link used when the real device couldn't be opened at
/// startup. Every read/write fails, so `Device::init()` falls back to
/// `Degraded` the same way it would on a live but unresponsive unit, and
/// the router's existing "hardware unavailable" path (spec §7) takes over
/// instead of the daemon never reaching the bus at all.
struct NullLink;

impl io::Read for NullLink {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::NotConnected, "no serial device attached"))
    }
}

impl io::Write for NullLink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::NotConnected, "no serial device attached"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::NotConnected, "no serial device attached"))
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let config = Config::parse_args();

    match run(config) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            log::error!("fatal setup failure: {err:#}");
            ExitCode::from(exit_code::FATAL_SETUP as u8)
        }
    }
}

fn run(config: Config) -> anyhow::Result<i32> {
    log::info!("opening serial device {}", config.device);
    let transport = Arc::new(match SspTransport::open(&config.device) {
        Ok(transport) => transport,
        Err(err) => {
            log::warn!(
                "could not open {}: {err}; starting with hardware unavailable",
                config.device
            );
            SspTransport::from_link(Box::new(NullLink))
        }
    });

    let hopper = Arc::new(Mutex::new(Device::new(HOPPER_ADDRESS, DeviceRole::Hopper, "Mr. Coin", transport.clone())));
    let validator =
        Arc::new(Mutex::new(Device::new(VALIDATOR_ADDRESS, DeviceRole::Validator, "Ms. Note", transport)));

    if let Err(err) = hopper.lock().init() {
        log::warn!("hopper init failed, starting in degraded state: {err}");
    }
    if let Err(err) = validator.lock().init() {
        log::warn!("validator init failed, starting in degraded state: {err}");
    }

    #[cfg(not(feature = "redis-bus"))]
    anyhow::bail!("no bus backend compiled in (enable the redis-bus feature)");

    #[cfg(feature = "redis-bus")]
    {
        use metacash::bus::redis_bus::{RedisPublisher, RedisRequestSource};

        let request_source = RedisRequestSource::connect(&config.host, config.port)
            .with_context(|| format!("connecting bus request source to {}:{}", config.host, config.port))?;
        let publisher = RedisPublisher::connect(&config.host, config.port)
            .with_context(|| format!("connecting bus publisher to {}:{}", config.host, config.port))?;

        let supervisor = Supervisor::new(request_source, publisher, hopper, validator);
        supervisor.install_signal_handlers().context("installing signal handlers")?;
        log::info!("metacashd ready, entering event loop");
        Ok(supervisor.run())
    }
}
