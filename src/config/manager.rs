//! Configuration Manager

use super::Config;
use crate::protocol::constants::MAX_FRAME_SIZE_LIMIT;
use crate::Result;
use anyhow::{bail, Context};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with priority: config file > environment > defaults
    pub fn load(path: &Path) -> Result<Config> {
        Self::load_layered(path, |key| std::env::var(key).ok())
    }

    /// Load configuration layering `path` over variables from `lookup`
    pub fn load_layered<F>(path: &Path, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut layers = Self::env_overlay(lookup)?;
        if let Some(file) = Self::read_table(path)? {
            merge_tables(&mut layers, file);
        }

        let config: Config = toml::Value::Table(layers)
            .try_into()
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        tracing::info!("Configuration loaded and validated successfully");
        Ok(config)
    }

    /// Load configuration from file, ignoring the environment
    pub fn load_from_file(path: &Path) -> Result<Config> {
        Self::load_layered(path, |_| None)
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        Self::load_from_env_with(|key| std::env::var(key).ok())
    }

    /// Load configuration from variables supplied by `lookup`
    pub fn load_from_env_with<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config: Config = toml::Value::Table(Self::env_overlay(lookup)?)
            .try_into()
            .context("Failed to apply environment configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text without validating it
    pub fn parse(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Render a configuration as TOML
    pub fn render(config: &Config) -> Result<String> {
        toml::to_string_pretty(config).context("Failed to render configuration")
    }

    fn read_table(path: &Path) -> Result<Option<toml::Table>> {
        if !path.exists() {
            tracing::warn!(
                "Configuration file not found at {}, using environment and defaults",
                path.display()
            );
            return Ok(None);
        }

        tracing::info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let table = content
            .parse::<toml::Table>()
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(Some(table))
    }

    /// Collect `FLYCAM_*` variables into a partial config table
    fn env_overlay<F>(lookup: F) -> Result<toml::Table>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut relay = toml::Table::new();
        let mut monitoring = toml::Table::new();

        if let Some(max_frame_size) = lookup("FLYCAM_MAX_FRAME_SIZE") {
            let size = max_frame_size
                .parse::<i64>()
                .ok()
                .filter(|size| *size >= 0)
                .with_context(|| format!("Invalid FLYCAM_MAX_FRAME_SIZE: {}", max_frame_size))?;
            relay.insert("max_frame_size".into(), toml::Value::Integer(size));
        }

        if let Some(interval) = lookup("FLYCAM_REPORT_INTERVAL") {
            let parsed = humantime::parse_duration(&interval)
                .with_context(|| format!("Invalid FLYCAM_REPORT_INTERVAL: {}", interval))?;
            relay.insert(
                "report_interval".into(),
                toml::Value::String(humantime::format_duration(parsed).to_string()),
            );
        }

        if let Some(metrics_addr) = lookup("FLYCAM_METRICS_ADDR") {
            let addr = metrics_addr
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid FLYCAM_METRICS_ADDR: {}", metrics_addr))?;
            monitoring.insert("metrics_addr".into(), toml::Value::String(addr.to_string()));
        }

        if let Some(log_level) = lookup("FLYCAM_LOG_LEVEL") {
            monitoring.insert("log_level".into(), toml::Value::String(log_level));
        }

        let mut overlay = toml::Table::new();
        if !relay.is_empty() {
            overlay.insert("relay".into(), toml::Value::Table(relay));
        }
        if !monitoring.is_empty() {
            overlay.insert("monitoring".into(), toml::Value::Table(monitoring));
        }
        Ok(overlay)
    }
}

/// Merge `upper` into `base`; keys set in `upper` win, nested tables merge
fn merge_tables(base: &mut toml::Table, upper: toml::Table) {
    for (key, value) in upper {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(lower)), toml::Value::Table(upper)) => {
                merge_tables(lower, upper);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_relay_settings()
            .with_context(|| "Relay settings validation failed")?;

        self.validate_channels()
            .with_context(|| "Channel configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    fn validate_relay_settings(&self) -> Result<()> {
        if self.relay.max_frame_size == 0 {
            bail!("max_frame_size must be greater than 0");
        }

        if self.relay.max_frame_size > MAX_FRAME_SIZE_LIMIT {
            bail!(
                "max_frame_size cannot exceed {} bytes",
                MAX_FRAME_SIZE_LIMIT
            );
        }

        if self.relay.report_interval.is_zero() {
            bail!("report_interval must be greater than 0");
        }

        Ok(())
    }

    fn validate_channels(&self) -> Result<()> {
        if self.channels.is_empty() {
            bail!("at least one channel must be configured");
        }

        let mut names = HashSet::new();
        let mut addrs = HashSet::new();

        for (i, channel) in self.channels.iter().enumerate() {
            if channel.name.trim().is_empty() {
                bail!("Channel {} has empty name", i);
            }

            if !names.insert(channel.name.as_str()) {
                bail!("Duplicate channel name '{}'", channel.name);
            }

            // Port 0 asks the OS for a fresh port, so it never collides
            for addr in [channel.inbound_addr, channel.outbound_addr] {
                if addr.port() != 0 && !addrs.insert(addr) {
                    bail!(
                        "Channel '{}' reuses address {} already bound by another endpoint",
                        channel.name,
                        addr
                    );
                }
            }
        }

        Ok(())
    }

    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!(
                "monitoring.log_level must be one of: {}",
                valid_log_levels.join(", ")
            );
        }

        if let Some(metrics_addr) = self.monitoring.metrics_addr {
            if metrics_addr.port() != 0 {
                let clash = self.channels.iter().any(|c| {
                    c.inbound_addr == metrics_addr || c.outbound_addr == metrics_addr
                });
                if clash {
                    bail!("metrics_addr {} is already used by a relay channel", metrics_addr);
                }
            }
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        log_level: Option<&str>,
        max_frame_size: Option<usize>,
        report_interval: Option<Duration>,
        metrics_addr: Option<SocketAddr>,
        monitor_all: bool,
    ) {
        if let Some(level) = log_level {
            self.monitoring.log_level = level.to_string();
            tracing::info!("CLI override: log level set to {}", level);
        }

        if let Some(size) = max_frame_size {
            self.relay.max_frame_size = size;
            tracing::info!("CLI override: max frame size set to {} bytes", size);
        }

        if let Some(interval) = report_interval {
            self.relay.report_interval = interval;
            tracing::info!("CLI override: report interval set to {:?}", interval);
        }

        if let Some(addr) = metrics_addr {
            self.monitoring.metrics_addr = Some(addr);
            tracing::info!("CLI override: metrics address set to {}", addr);
        }

        if monitor_all {
            for channel in &mut self.channels {
                channel.monitored = true;
            }
            tracing::info!("CLI override: throughput monitoring enabled on all channels");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use std::collections::HashMap;

    fn loopback(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_env_sets_each_variable() {
        let config = ConfigManager::load_from_env_with(vars(&[
            ("FLYCAM_MAX_FRAME_SIZE", "2048"),
            ("FLYCAM_REPORT_INTERVAL", "250ms"),
            ("FLYCAM_METRICS_ADDR", "127.0.0.1:9100"),
            ("FLYCAM_LOG_LEVEL", "warn"),
        ]))
        .unwrap();

        assert_eq!(config.relay.max_frame_size, 2048);
        assert_eq!(config.relay.report_interval, Duration::from_millis(250));
        assert_eq!(config.monitoring.metrics_addr, Some(loopback(9100)));
        assert_eq!(config.monitoring.log_level, "warn");
        assert_eq!(config.channels.len(), 2);
    }

    #[test]
    fn test_env_without_variables_gives_defaults() {
        let config = ConfigManager::load_from_env_with(vars(&[])).unwrap();

        assert_eq!(config.relay.report_interval, Duration::from_secs(1));
        assert_eq!(config.monitoring.log_level, "info");
        assert!(config.monitoring.metrics_addr.is_none());
    }

    #[test]
    fn test_env_rejects_invalid_values() {
        for (key, value) in [
            ("FLYCAM_MAX_FRAME_SIZE", "abc"),
            ("FLYCAM_MAX_FRAME_SIZE", "-1"),
            ("FLYCAM_REPORT_INTERVAL", "soon"),
            ("FLYCAM_METRICS_ADDR", "localhost"),
        ] {
            let err = ConfigManager::load_from_env_with(vars(&[(key, value)])).unwrap_err();
            let message = format!("{:#}", err);
            assert!(message.contains(key), "unexpected error for {key}: {message}");
        }
    }

    #[test]
    fn test_env_values_still_validated() {
        let result = ConfigManager::load_from_env_with(vars(&[("FLYCAM_LOG_LEVEL", "loud")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_tables_keeps_lower_keys() {
        let mut base: toml::Table = "[relay]\nmax_frame_size = 10\nreport_interval = \"3s\"\n"
            .parse()
            .unwrap();
        let upper: toml::Table = "[relay]\nmax_frame_size = 20\n".parse().unwrap();

        merge_tables(&mut base, upper);

        let relay = base["relay"].as_table().unwrap();
        assert_eq!(relay["max_frame_size"].as_integer(), Some(20));
        assert_eq!(relay["report_interval"].as_str(), Some("3s"));
    }

    #[test]
    fn test_render_effective_config() {
        let mut config = Config::default();
        config.monitoring.metrics_addr = Some(loopback(9100));

        let rendered = ConfigManager::render(&config).unwrap();
        assert!(rendered.contains("report_interval = \"1s\""));
        assert!(rendered.contains("name = \"metadata\""));

        let parsed = ConfigManager::parse(&rendered).unwrap();
        assert_eq!(parsed.channels, config.channels);
        assert_eq!(parsed.monitoring.metrics_addr, Some(loopback(9100)));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].name, "video");
        assert_eq!(config.channels[0].inbound_addr.port(), 5555);
        assert_eq!(config.channels[0].outbound_addr.port(), 5556);
        assert!(config.channels[0].monitored);
        assert_eq!(config.channels[1].name, "metadata");
        assert_eq!(config.channels[1].inbound_addr.port(), 5557);
        assert_eq!(config.channels[1].outbound_addr.port(), 5558);
        assert!(!config.channels[1].monitored);
        assert_eq!(config.relay.report_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_empty_channel_list() {
        let mut config = Config::default();
        config.channels.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let mut config = Config::default();
        config.channels[1].name = "video".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_shared_address() {
        let mut config = Config::default();
        config.channels[1].inbound_addr = config.channels[0].outbound_addr;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_port_zero_may_repeat() {
        let mut config = Config::default();
        config.channels = vec![
            ChannelConfig::new("a", loopback(0), loopback(0), true),
            ChannelConfig::new("b", loopback(0), loopback(0), false),
        ];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_frame_size_and_interval() {
        let mut config = Config::default();
        config.relay.max_frame_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.relay.max_frame_size = MAX_FRAME_SIZE_LIMIT + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.relay.report_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let mut config = Config::default();
        config.monitoring.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_metrics_addr_clash() {
        let mut config = Config::default();
        config.monitoring.metrics_addr = Some(config.channels[0].inbound_addr);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_partial_toml_uses_defaults() {
        let config = ConfigManager::parse(
            r#"
            [relay]
            report_interval = "2s"
            "#,
        )
        .unwrap();

        assert_eq!(config.relay.report_interval, Duration::from_secs(2));
        assert_eq!(config.channels.len(), 2);
        assert!(config.relay.tcp_nodelay);
    }

    #[test]
    fn test_parse_channel_list() {
        let config = ConfigManager::parse(
            r#"
            [[channels]]
            name = "video"
            inbound_addr = "127.0.0.1:6000"
            outbound_addr = "127.0.0.1:6001"
            monitored = true

            [[channels]]
            name = "telemetry"
            inbound_addr = "127.0.0.1:6002"
            outbound_addr = "127.0.0.1:6003"
            "#,
        )
        .unwrap();

        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[1].name, "telemetry");
        assert!(!config.channels[1].monitored);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_with_cli_args() {
        let mut config = Config::default();
        config.merge_with_cli_args(
            Some("debug"),
            Some(1024),
            Some(Duration::from_secs(5)),
            Some(loopback(9100)),
            true,
        );

        assert_eq!(config.monitoring.log_level, "debug");
        assert_eq!(config.relay.max_frame_size, 1024);
        assert_eq!(config.relay.report_interval, Duration::from_secs(5));
        assert_eq!(config.monitoring.metrics_addr, Some(loopback(9100)));
        assert!(config.channels.iter().all(|c| c.monitored));
    }

    #[test]
    fn test_merge_without_overrides_keeps_config() {
        let mut config = Config::default();
        config.merge_with_cli_args(None, None, None, None, false);

        assert_eq!(config.monitoring.log_level, "info");
        assert!(!config.channels[1].monitored);
    }
}
