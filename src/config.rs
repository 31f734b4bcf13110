//! CLI argument parsing (spec §6).

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "metacashd", about = "SSP6 cash-handling bus bridge")]
pub struct Config {
    /// Pub/sub bus host.
    #[arg(short = 'h', long = "host", default_value = "127.0.0.1")]
    pub host: String,

    /// Pub/sub bus port.
    #[arg(short = 'p', long = "port", default_value_t = 6379)]
    pub port: u16,

    /// Serial character device the SSP6 bus is attached to.
    #[arg(short = 'd', long = "device", default_value = "/dev/ttyACM0")]
    pub device: String,
}

impl Config {
    pub fn parse_args() -> Self {
        Config::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::parse_from(["metacashd"]);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6379);
        assert_eq!(config.device, "/dev/ttyACM0");
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::parse_from(["metacashd", "-h", "10.0.0.5", "-p", "7000", "-d", "/dev/ttyUSB0"]);
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 7000);
        assert_eq!(config.device, "/dev/ttyUSB0");
    }
}
