use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use plcr_logger::{debug, error};

use crate::PluginError;

/// How a plugin module is realised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PluginKind {
    /// A dynamic library (or a registered built-in vtable).
    Native,
    /// A module run by an embedded interpreter; recognised but not
    /// supported in this build.
    Scripted,
}

impl FromStr for PluginKind {
    type Err = ();

    fn from_str(s: &str) -> Result<PluginKind, ()> {
        match s {
            "native" => Ok(PluginKind::Native),
            "scripted" => Ok(PluginKind::Scripted),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PluginKind::Native => write!(f, "native"),
            PluginKind::Scripted => write!(f, "scripted"),
        }
    }
}

/// One line of the plugin list file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub name: String,
    /// Module path, or the name of a registered built-in.
    pub path: String,
    pub enabled: bool,
    pub kind: PluginKind,
    pub config_path: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

/// Parses one non-comment line: `name, path, enabled, kind, config, env`.
pub fn parse_descriptor_line(line: &str, number: usize) -> Result<PluginDescriptor, PluginError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 6 {
        return Err(PluginError::MalformedDescriptor { line: number });
    }
    let kind = fields[3]
        .parse::<PluginKind>()
        .map_err(|_| PluginError::UnknownKind {
            line: number,
            kind: fields[3].to_string(),
        })?;
    let optional = |field: &str| {
        if field.is_empty() {
            None
        } else {
            Some(PathBuf::from(field))
        }
    };
    Ok(PluginDescriptor {
        name: fields[0].to_string(),
        path: fields[1].to_string(),
        enabled: matches!(fields[2], "1" | "true" | "yes"),
        kind,
        config_path: optional(fields[4]),
        env_path: optional(fields[5]),
    })
}

/// Reads the plugin list. Malformed lines are logged and skipped so one bad
/// entry cannot block the remaining plugins; only an unreadable file is an
/// error.
pub fn parse_descriptor_file(path: &Path) -> Result<Vec<PluginDescriptor>, PluginError> {
    let content = fs::read_to_string(path).map_err(|source| PluginError::ConfigUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let mut descriptors = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_descriptor_line(line, index + 1) {
            Ok(descriptor) => {
                debug!(
                    "plugin descriptor {} ({}, enabled={})",
                    descriptor.name, descriptor.kind, descriptor.enabled
                );
                descriptors.push(descriptor);
            }
            Err(err) => error!("{}: {err}", path.display()),
        }
    }
    Ok(descriptors)
}
