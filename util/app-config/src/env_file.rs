use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::ConfigError;

/// Parses a `KEY=VALUE` file. `#`-introduced comment lines and blank lines
/// are skipped; values may contain `=`. Quotes around the value are stripped
/// so hand-edited files behave the way shell users expect.
pub fn parse_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::StateDir {
        path: path.to_path_buf(),
        source,
    })?;
    let mut values = HashMap::new();
    for (number, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::Malformed {
                file: path.to_path_buf(),
                line: number + 1,
                content: raw.to_string(),
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::Malformed {
                file: path.to_path_buf(),
                line: number + 1,
                content: raw.to_string(),
            });
        }
        let value = value.trim().trim_matches('"').trim_matches('\'');
        values.insert(key.to_string(), value.to_string());
    }
    Ok(values)
}
