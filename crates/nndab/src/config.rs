use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use nndab_bus::{DEFAULT_ADDRESS, DEFAULT_DEVICE};
use nndab_dispatch::{DispatchConfig, RetryPolicy, DEFAULT_MAX_POLLS};
use nndab_frame::{
    DEFAULT_FLUSH_LIMIT, DEFAULT_FRAME_CAPACITY, DEFAULT_RESPONSE_CAPACITY, HEADER_SIZE,
    MIN_FLUSH_CAPACITY,
};
use nndab_sp::{Endpoint, DEFAULT_IPC_ENDPOINT, DEFAULT_TCP_ENDPOINT};
use serde::Deserialize;

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{io_error, sp_error, CliError, CliResult, DATA_INVALID};

/// Which bus handle `serve` drives.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// Linux i2c-dev device node.
    I2c,
    /// In-memory module that echoes every request.
    Sim,
}

/// Settings for `serve`, loadable from a JSON file. Every field is optional.
///
/// Durations are strings such as `"500us"`, `"20ms"` or `"30s"`; a deadline
/// of `"off"` disables the wall-clock bound.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub device: PathBuf,
    pub address: u16,
    pub endpoints: Vec<String>,
    pub bus: BusKind,
    pub frame_capacity: usize,
    pub response_capacity: usize,
    pub flush_capacity: usize,
    pub flush_limit: usize,
    pub retries: usize,
    pub poll_interval: String,
    pub deadline: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            address: DEFAULT_ADDRESS,
            endpoints: vec![
                DEFAULT_IPC_ENDPOINT.to_string(),
                DEFAULT_TCP_ENDPOINT.to_string(),
            ],
            bus: BusKind::I2c,
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            response_capacity: DEFAULT_RESPONSE_CAPACITY,
            flush_capacity: MIN_FLUSH_CAPACITY,
            flush_limit: DEFAULT_FLUSH_LIMIT,
            retries: DEFAULT_MAX_POLLS,
            poll_interval: "500us".to_string(),
            deadline: "30s".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Read a config file.
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        Self::from_json(&text).map_err(|err| {
            CliError::new(
                err.code,
                format!("invalid config {}: {}", path.display(), err.message),
            )
        })
    }

    pub fn from_json(text: &str) -> CliResult<Self> {
        serde_json::from_str(text).map_err(|err| CliError::new(DATA_INVALID, err.to_string()))
    }

    /// Overlay command-line flags; flags win over the file.
    pub fn apply(&mut self, args: &ServeArgs) {
        if let Some(device) = &args.device {
            self.device = device.clone();
        }
        if let Some(address) = args.address {
            self.address = address;
        }
        if !args.bind.is_empty() {
            self.endpoints = args.bind.clone();
        }
        if let Some(bus) = args.bus {
            self.bus = bus;
        }
        if let Some(retries) = args.retries {
            self.retries = retries;
        }
        if let Some(interval) = &args.poll_interval {
            self.poll_interval = interval.clone();
        }
        if let Some(deadline) = &args.deadline {
            self.deadline = deadline.clone();
        }
    }

    pub fn endpoints(&self) -> CliResult<Vec<Endpoint>> {
        if self.endpoints.is_empty() {
            return Err(CliError::new(DATA_INVALID, "at least one endpoint is required"));
        }
        self.endpoints
            .iter()
            .map(|ep| ep.parse().map_err(|err| sp_error("invalid endpoint", err)))
            .collect()
    }

    pub fn dispatch_config(&self) -> CliResult<DispatchConfig> {
        if self.frame_capacity <= HEADER_SIZE {
            return Err(CliError::new(
                DATA_INVALID,
                format!("frame_capacity must exceed {HEADER_SIZE} bytes"),
            ));
        }
        if self.response_capacity <= HEADER_SIZE {
            return Err(CliError::new(
                DATA_INVALID,
                format!("response_capacity must exceed {HEADER_SIZE} bytes"),
            ));
        }

        Ok(DispatchConfig {
            frame_capacity: self.frame_capacity,
            response_capacity: self.response_capacity,
            flush_capacity: self.flush_capacity,
            flush_limit: self.flush_limit,
            retry: RetryPolicy {
                max_polls: self.retries,
                poll_interval: parse_duration(&self.poll_interval)?,
                deadline: parse_deadline(&self.deadline)?,
            },
        })
    }
}

fn parse_deadline(input: &str) -> CliResult<Option<Duration>> {
    match input.trim() {
        "off" | "none" => Ok(None),
        other => parse_duration(other).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = BridgeConfig::from_json("{}").unwrap();
        assert_eq!(config, BridgeConfig::default());

        let dispatch = config.dispatch_config().unwrap();
        assert_eq!(dispatch, DispatchConfig::default());
        assert_eq!(config.endpoints().unwrap().len(), 2);
    }

    #[test]
    fn file_fields_override_defaults() {
        let config = BridgeConfig::from_json(
            r#"{
                "device": "/dev/i2c-1",
                "address": 66,
                "endpoints": ["tcp://127.0.0.1:12001"],
                "bus": "sim",
                "retries": 20,
                "poll_interval": "0us",
                "deadline": "off"
            }"#,
        )
        .unwrap();

        assert_eq!(config.device, PathBuf::from("/dev/i2c-1"));
        assert_eq!(config.address, 0x42);
        assert_eq!(config.bus, BusKind::Sim);

        let retry = config.dispatch_config().unwrap().retry;
        assert_eq!(retry.max_polls, 20);
        assert_eq!(retry.poll_interval, Duration::ZERO);
        assert_eq!(retry.deadline, None);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = BridgeConfig::from_json(r#"{"retry": 5}"#).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn undersized_buffers_are_rejected() {
        let config = BridgeConfig {
            response_capacity: 2,
            ..BridgeConfig::default()
        };
        assert_eq!(config.dispatch_config().unwrap_err().code, DATA_INVALID);
    }

    #[test]
    fn bad_endpoint_is_usage_error() {
        let config = BridgeConfig {
            endpoints: vec!["udp://1.2.3.4:5".into()],
            ..BridgeConfig::default()
        };
        assert_eq!(config.endpoints().unwrap_err().code, crate::exit::USAGE);
    }
}
