mod config;

pub use config::{Backing, BasaltConfig, ChannelSection, ConfigError, RegionConfig, SideConfig};
