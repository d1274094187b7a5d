use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BasaltConfig {
    #[serde(default)]
    pub side: SideConfig,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default)]
    pub region: RegionConfig,
    #[serde(default)]
    pub channel: ChannelSection,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SideConfig {
    #[default]
    Guest,
    Host,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backing {
    /// A physical memory window opened through a memory device.
    #[default]
    Device,
    /// A regular file, for peers on the same machine.
    File,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    #[serde(default)]
    pub backing: Backing,
    #[serde(default = "defaults::region_path")]
    pub path: String,
    #[serde(default = "defaults::phys_addr")]
    pub phys_addr: u64,
    #[serde(default = "defaults::region_size")]
    pub size: u64,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            backing: Backing::default(),
            path: defaults::region_path(),
            phys_addr: defaults::phys_addr(),
            size: defaults::region_size(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ChannelSection {
    #[serde(default)]
    pub safety_margin: Option<u32>,
    #[serde(default = "defaults::write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "defaults::poll_interval_us")]
    pub poll_interval_us: u64,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            safety_margin: None,
            write_timeout_ms: defaults::write_timeout_ms(),
            poll_interval_us: defaults::poll_interval_us(),
        }
    }
}

impl ChannelSection {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

mod defaults {
    pub fn log_level() -> String {
        "info".into()
    }

    pub fn region_path() -> String {
        "/dev/mem".into()
    }

    pub fn phys_addr() -> u64 {
        0x3F00_0000
    }

    pub fn region_size() -> u64 {
        16 << 20
    }

    pub fn write_timeout_ms() -> u64 {
        1000
    }

    pub fn poll_interval_us() -> u64 {
        1000
    }
}

impl BasaltConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let toml_to_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&toml_to_str)
    }

    /// Parses and validates a config document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: BasaltConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.size == 0 {
            return Err(ConfigError::Invalid("region.size must be non-zero".into()));
        }
        if self.region.path.is_empty() {
            return Err(ConfigError::Invalid("region.path must be set".into()));
        }
        if self.region.backing == Backing::File && self.region.phys_addr != defaults::phys_addr() {
            return Err(ConfigError::Invalid(
                "region.phys_addr only applies to backing = \"device\"".into(),
            ));
        }
        if self.channel.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid("channel.write_timeout_ms must be non-zero".into()));
        }
        if self.channel.poll_interval_us == 0 {
            return Err(ConfigError::Invalid("channel.poll_interval_us must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_takes_defaults() {
        let config = BasaltConfig::from_toml_str("").unwrap();
        assert_eq!(config.side, SideConfig::Guest);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.region, RegionConfig::default());
        assert_eq!(config.region.path, "/dev/mem");
        assert_eq!(config.region.phys_addr, 0x3F00_0000);
        assert_eq!(config.region.size, 16 * 1024 * 1024);
        assert_eq!(config.channel.safety_margin, None);
        assert_eq!(config.channel.write_timeout(), Duration::from_secs(1));
        assert_eq!(config.channel.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn full_document() {
        let config = BasaltConfig::from_toml_str(
            r#"
            side = "host"
            log_level = "debug"

            [region]
            backing = "file"
            path = "/tmp/basalt_region"
            size = 65536

            [channel]
            safety_margin = 128
            write_timeout_ms = 250
            poll_interval_us = 200
            "#,
        )
        .unwrap();

        assert_eq!(config.side, SideConfig::Host);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.region.backing, Backing::File);
        assert_eq!(config.region.path, "/tmp/basalt_region");
        assert_eq!(config.region.size, 65536);
        assert_eq!(config.channel.safety_margin, Some(128));
        assert_eq!(config.channel.write_timeout(), Duration::from_millis(250));
        assert_eq!(config.channel.poll_interval(), Duration::from_micros(200));
    }

    #[test]
    fn unknown_side_is_a_parse_error() {
        let err = BasaltConfig::from_toml_str(r#"side = "both""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = BasaltConfig::from_toml_str("[region]\nsize_mb = 16").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_values_are_invalid() {
        for doc in [
            "[region]\nsize = 0",
            "[channel]\nwrite_timeout_ms = 0",
            "[channel]\npoll_interval_us = 0",
            "[region]\npath = \"\"",
        ] {
            let err = BasaltConfig::from_toml_str(doc).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{doc}: {err:?}");
        }
    }

    #[test]
    fn phys_addr_with_file_backing_is_invalid() {
        let err = BasaltConfig::from_toml_str(
            "[region]\nbacking = \"file\"\npath = \"/tmp/r\"\nphys_addr = 4096",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = BasaltConfig::load("/nonexistent/basalt.toml").unwrap_err();
        match err {
            ConfigError::Read { path, source } => {
                assert_eq!(path, "/nonexistent/basalt.toml");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
