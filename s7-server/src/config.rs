//! Per-instance JSON configuration.
//!
//! Anything invalid falls back to a default with a logged warning; the
//! plugin always comes up, possibly with fewer areas than asked for.

use std::fs;
use std::path::Path;

use plcr_image::BufferType;
use serde::Deserialize;

use plcr_logger::warn_target;

use crate::LOG_TARGET;

pub const DEFAULT_PORT: u16 = 102;
pub const DEFAULT_MAX_CLIENTS: u32 = 16;
pub const DEFAULT_PDU_SIZE: u32 = 480;

/// Protocol-legal PDU bounds.
pub const PDU_MIN: u32 = 240;
pub const PDU_MAX: u32 = 960;

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub data_blocks: Vec<DataBlockConfig>,
    pub system_areas: SystemAreasConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
    pub max_clients: u32,
    pub send_timeout_ms: u64,
    pub recv_timeout_ms: u64,
    pub ping_timeout_ms: u64,
    pub pdu_size: u32,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            enabled: true,
            bind_address: String::from("0.0.0.0"),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            send_timeout_ms: 3_000,
            recv_timeout_ms: 3_000,
            ping_timeout_ms: 30_000,
            pdu_size: DEFAULT_PDU_SIZE,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub as_name: String,
    pub module_name: String,
    pub plant_id: String,
    pub copyright: String,
    pub serial_number: String,
    pub order_code: String,
}

impl Default for IdentityConfig {
    fn default() -> IdentityConfig {
        IdentityConfig {
            as_name: String::from("PLCR"),
            module_name: String::from("PLCR S7 Server"),
            plant_id: String::new(),
            copyright: String::from("Copyright PLCR Core Dev"),
            serial_number: String::from("PLCR-000000000001"),
            order_code: String::from("6AG9 000-1AA00-0AA0"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct MappingConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    pub start_buffer: i64,
    pub bit_addressing: bool,
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct DataBlockConfig {
    pub db_number: i64,
    pub size_bytes: i64,
    pub mapping: MappingConfig,
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct SystemAreaConfig {
    pub enabled: bool,
    pub size_bytes: i64,
    pub mapping: MappingConfig,
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct SystemAreasConfig {
    pub pe: Option<SystemAreaConfig>,
    pub pa: Option<SystemAreaConfig>,
    pub mk: Option<SystemAreaConfig>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_connections: bool,
    pub log_data_access: bool,
    pub log_errors: bool,
}

impl Default for LoggingConfig {
    fn default() -> LoggingConfig {
        LoggingConfig {
            log_connections: true,
            log_data_access: false,
            log_errors: true,
        }
    }
}

impl Config {
    /// Reads and sanitizes the instance configuration. A missing path or
    /// unparsable file yields the defaults with a warning.
    pub fn load(path: Option<&Path>) -> Config {
        let config = match path {
            Some(path) => match fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str::<Config>(&content) {
                    Ok(config) => config,
                    Err(err) => {
                        warn_target!(
                            LOG_TARGET,
                            "{}: {err}; using default configuration",
                            path.display()
                        );
                        Config::default()
                    }
                },
                Err(err) => {
                    warn_target!(
                        LOG_TARGET,
                        "{}: {err}; using default configuration",
                        path.display()
                    );
                    Config::default()
                }
            },
            None => Config::default(),
        };
        config.sanitize()
    }

    /// Applies the validation rules: bad scalars fall back to defaults, bad
    /// areas are dropped, and every rejection is logged.
    pub fn sanitize(mut self) -> Config {
        if self.server.port == 0 {
            warn_target!(LOG_TARGET, "port 0 is invalid, using {DEFAULT_PORT}");
            self.server.port = DEFAULT_PORT;
        }
        if !(PDU_MIN..=PDU_MAX).contains(&self.server.pdu_size) {
            warn_target!(
                LOG_TARGET,
                "pdu_size {} outside {PDU_MIN}..{PDU_MAX}, using {DEFAULT_PDU_SIZE}",
                self.server.pdu_size
            );
            self.server.pdu_size = DEFAULT_PDU_SIZE;
        }
        if !(1..=1024).contains(&self.server.max_clients) {
            warn_target!(
                LOG_TARGET,
                "max_clients {} outside 1..1024, using {DEFAULT_MAX_CLIENTS}",
                self.server.max_clients
            );
            self.server.max_clients = DEFAULT_MAX_CLIENTS;
        }

        let mut seen_numbers = Vec::new();
        self.data_blocks.retain(|block| {
            if block.db_number < 0 || block.db_number > u16::MAX as i64 {
                warn_target!(LOG_TARGET, "db_number {} out of range, dropped", block.db_number);
                return false;
            }
            if seen_numbers.contains(&block.db_number) {
                warn_target!(LOG_TARGET, "duplicate db_number {}, dropped", block.db_number);
                return false;
            }
            if !mapping_is_usable(&block.mapping, block.size_bytes) {
                return false;
            }
            seen_numbers.push(block.db_number);
            true
        });

        for (name, area) in [
            ("pe", &mut self.system_areas.pe),
            ("pa", &mut self.system_areas.pa),
            ("mk", &mut self.system_areas.mk),
        ] {
            if let Some(config) = area {
                if config.enabled && !mapping_is_usable(&config.mapping, config.size_bytes) {
                    warn_target!(LOG_TARGET, "system area {name} disabled");
                    config.enabled = false;
                }
            }
        }
        self
    }
}

fn mapping_is_usable(mapping: &MappingConfig, size_bytes: i64) -> bool {
    if size_bytes <= 0 {
        warn_target!(LOG_TARGET, "area size {size_bytes} is not positive, dropped");
        return false;
    }
    if mapping.start_buffer < 0 {
        warn_target!(
            LOG_TARGET,
            "negative start_buffer {}, dropped",
            mapping.start_buffer
        );
        return false;
    }
    match buffer_type_by_name(&mapping.type_name) {
        Some(ty) => {
            if mapping.bit_addressing && !ty.is_bool() {
                warn_target!(
                    LOG_TARGET,
                    "bit_addressing is only meaningful for bool families, ignored for {}",
                    mapping.type_name
                );
            }
            true
        }
        None => {
            warn_target!(LOG_TARGET, "unknown mapping type `{}`, dropped", mapping.type_name);
            false
        }
    }
}

/// Maps the configuration's family names onto buffer-type codes.
pub fn buffer_type_by_name(name: &str) -> Option<BufferType> {
    Some(match name {
        "bool_input" => BufferType::BoolInput,
        "bool_output" => BufferType::BoolOutput,
        "bool_memory" => BufferType::BoolMemory,
        "byte_input" => BufferType::ByteInput,
        "byte_output" => BufferType::ByteOutput,
        "int_input" => BufferType::IntInput,
        "int_output" => BufferType::IntOutput,
        "int_memory" => BufferType::IntMemory,
        "dint_input" => BufferType::DintInput,
        "dint_output" => BufferType::DintOutput,
        "dint_memory" => BufferType::DintMemory,
        "lint_input" => BufferType::LintInput,
        "lint_output" => BufferType::LintOutput,
        "lint_memory" => BufferType::LintMemory,
        _ => return None,
    })
}
