use crate::prelude::*;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: Device,

    #[serde(default = "Config::default_listen")]
    pub listen: String,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,
}

// Device {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Device {
    #[serde(default = "Config::default_device_host")]
    pub host: String,

    #[serde(default = "Config::default_device_port")]
    pub port: u16,

    #[serde(default = "Config::default_unit_id")]
    pub unit_id: u8,

    /// Connect and per-request timeout in milliseconds.
    #[serde(default = "Config::default_timeout_ms")]
    pub timeout_ms: u64,

    /// When true, raw register values above `i16::MAX` are rejected as
    /// out-of-range instead of being reinterpreted as negative.
    #[serde(default)]
    pub strict_decode: bool,
}

impl Device {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    pub fn strict_decode(&self) -> bool {
        self.strict_decode
    }
}

impl Default for Device {
    fn default() -> Self {
        Self {
            host: Config::default_device_host(),
            port: Config::default_device_port(),
            unit_id: Config::default_unit_id(),
            timeout_ms: Config::default_timeout_ms(),
            strict_decode: false,
        }
    }
}
// }}}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: Device::default(),
            listen: Self::default_listen(),
            loglevel: Self::default_loglevel(),
        }
    }
}

impl Config {
    /// Load configuration, starting from the YAML file when one is given and
    /// applying command line overrides on top.
    pub fn new(options: &Options) -> Result<Self> {
        let mut config = match &options.config_file {
            Some(file) => Self::from_file(file)?,
            None => Self::default(),
        };

        if let Some(address) = &options.address {
            let (host, port) = Self::parse_address(address)?;
            config.device.host = host;
            config.device.port = port;
        }
        if let Some(listen) = &options.listen {
            config.listen = listen.clone();
        }

        Ok(config)
    }

    pub fn from_file(file: &str) -> Result<Self> {
        let content = std::fs::read_to_string(file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;
        serde_yaml::from_str(&content).map_err(|err| anyhow!("error parsing {}: {}", file, err))
    }

    pub fn loglevel(&self) -> String {
        self.loglevel.clone()
    }

    pub fn listen(&self) -> &str {
        &self.listen
    }

    // "host" or "host:port"; a bare host keeps the default Modbus port
    fn parse_address(address: &str) -> Result<(String, u16)> {
        match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| anyhow!("invalid port in device address: {}", address))?;
                Ok((host.to_string(), port))
            }
            None => Ok((address.to_string(), Self::default_device_port())),
        }
    }

    fn default_listen() -> String {
        "0.0.0.0:9000".to_string()
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_device_host() -> String {
        "192.168.222.10".to_string()
    }

    fn default_device_port() -> u16 {
        502
    }

    fn default_unit_id() -> u8 {
        1
    }

    fn default_timeout_ms() -> u64 {
        1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.device.address(), "192.168.222.10:502");
        assert_eq!(config.device.unit_id(), 1);
        assert_eq!(config.device.timeout(), std::time::Duration::from_secs(1));
        assert!(!config.device.strict_decode());
        assert_eq!(config.listen(), "0.0.0.0:9000");
        assert_eq!(config.loglevel(), "info");
    }

    #[test]
    fn parses_yaml_with_partial_keys() {
        let config: Config = serde_yaml::from_str(
            r#"
device:
  host: 10.0.0.5
  strict_decode: true
loglevel: debug
"#,
        )
        .unwrap();

        assert_eq!(config.device.host(), "10.0.0.5");
        assert_eq!(config.device.port(), 502);
        assert!(config.device.strict_decode());
        assert_eq!(config.loglevel(), "debug");
        assert_eq!(config.listen(), "0.0.0.0:9000");
    }

    #[test]
    fn loads_from_file_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "device:\n  host: 10.0.0.5\n  port: 1502").unwrap();

        let options = Options {
            config_file: Some(file.path().to_string_lossy().to_string()),
            address: Some("10.0.0.9:10502".to_string()),
            listen: Some("127.0.0.1:9999".to_string()),
        };

        let config = Config::new(&options).unwrap();
        assert_eq!(config.device.address(), "10.0.0.9:10502");
        assert_eq!(config.listen(), "127.0.0.1:9999");
    }

    #[test]
    fn bare_host_override_keeps_default_port() {
        let options = Options {
            config_file: None,
            address: Some("heatpump.local".to_string()),
            listen: None,
        };

        let config = Config::new(&options).unwrap();
        assert_eq!(config.device.address(), "heatpump.local:502");
    }

    #[test]
    fn missing_file_is_an_error() {
        let options = Options {
            config_file: Some("/nonexistent/config.yaml".to_string()),
            address: None,
            listen: None,
        };

        assert!(Config::new(&options).is_err());
    }
}
