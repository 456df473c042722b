//! Provider discovery: `MCP_SERVER_CONFIG` env var plus a platform-specific
//! filesystem scan, unioned with first-seen-id-wins semantics.

use crate::provider::ProviderConfig;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Discover provider configs from the environment variable and the
/// platform's config directories, in that order (env wins on duplicate ids).
#[must_use]
pub fn discover_providers() -> Vec<ProviderConfig> {
    let mut seen_ids = HashSet::new();
    let mut configs = Vec::new();

    for cfg in from_env_var() {
        if seen_ids.insert(cfg.id.clone()) {
            configs.push(cfg);
        }
    }

    for dir in platform_config_dirs() {
        for cfg in scan_directory(&dir) {
            if seen_ids.insert(cfg.id.clone()) {
                configs.push(cfg);
            }
        }
    }

    configs
}

/// Load provider configs from a `-c/--config` path: a single JSON file (an
/// object or array), or a directory scanned the same way as the platform
/// config directories.
#[must_use]
pub fn configs_from_path(path: &Path) -> Vec<ProviderConfig> {
    if path.is_dir() {
        return scan_directory(path);
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_config_file(&contents, path),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read --config path");
            Vec::new()
        }
    }
}

/// Parse `MCP_SERVER_CONFIG` as a JSON array of `ProviderConfig`. Parse
/// errors are logged and treated as "no configs from this source".
fn from_env_var() -> Vec<ProviderConfig> {
    let Ok(raw) = std::env::var("MCP_SERVER_CONFIG") else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<Value>>(&raw) {
        Ok(values) => values.into_iter().filter_map(parse_provider_value).collect(),
        Err(e) => {
            warn!(error = %e, "failed to parse MCP_SERVER_CONFIG, ignoring");
            Vec::new()
        }
    }
}

/// Directories scanned for `*.mcp.json` / `mcp-config.json` files, per
/// platform. Fixed, non-pluggable data per the distilled spec.
fn platform_config_dirs() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let Some(appdata) = std::env::var_os("APPDATA") else {
            return Vec::new();
        };
        let base = PathBuf::from(appdata);
        vec![
            base.join("Claude Desktop").join("mcp"),
            base.join("Cursor").join("mcp"),
            base.join("Code").join("User").join("mcp"),
        ]
    }
    #[cfg(target_os = "macos")]
    {
        let Some(home) = std::env::var_os("HOME") else {
            return Vec::new();
        };
        let base = PathBuf::from(home).join("Library").join("Application Support");
        vec![
            base.join("Claude Desktop").join("mcp"),
            base.join("Cursor").join("mcp"),
            base.join("Code").join("User").join("mcp"),
        ]
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        let Some(home) = std::env::var_os("HOME") else {
            return Vec::new();
        };
        let base = PathBuf::from(home).join(".config");
        vec![
            base.join("Claude Desktop").join("mcp"),
            base.join("Cursor").join("mcp"),
            base.join("Code").join("User").join("mcp"),
        ]
    }
}

/// Read every `*.mcp.json` or exactly-named `mcp-config.json` file in `dir`.
/// Missing directories are silently skipped.
fn scan_directory(dir: &Path) -> Vec<ProviderConfig> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut configs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !is_config_file(&path) {
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(contents) => configs.extend(parse_config_file(&contents, &path)),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to read provider config file"),
        }
    }
    configs
}

fn is_config_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name == "mcp-config.json" || name.ends_with(".mcp.json")
}

/// A config file may hold either a single object or an array of objects.
fn parse_config_file(contents: &str, path: &Path) -> Vec<ProviderConfig> {
    match serde_json::from_str::<Value>(contents) {
        Ok(Value::Array(values)) => values.into_iter().filter_map(parse_provider_value).collect(),
        Ok(value @ Value::Object(_)) => parse_provider_value(value).into_iter().collect(),
        Ok(_) | Err(_) => {
            warn!(path = %path.display(), "ignoring provider config file: not a valid JSON object/array");
            Vec::new()
        }
    }
}

/// A valid config has a string `id`, string `name`, and a non-empty array
/// `command` of strings.
fn parse_provider_value(value: Value) -> Option<ProviderConfig> {
    let id = value.get("id")?.as_str()?.to_string();
    let name = value.get("name")?.as_str()?.to_string();
    let command: Vec<String> = value
        .get("command")?
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()?;
    if command.is_empty() {
        return None;
    }
    let description = value.get("description").and_then(Value::as_str).map(str::to_string);

    Some(ProviderConfig {
        id,
        name,
        command,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_valid_config() {
        let v = json!({"id": "p1", "name": "Provider 1", "command": ["node", "server.js"]});
        let cfg = parse_provider_value(v).expect("should parse");
        assert_eq!(cfg.id, "p1");
        assert_eq!(cfg.command, vec!["node".to_string(), "server.js".to_string()]);
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(parse_provider_value(json!({"id": "p1"})).is_none());
        assert!(parse_provider_value(json!({"id": "p1", "name": "n", "command": []})).is_none());
    }

    #[test]
    fn is_config_file_matches_both_patterns() {
        assert!(is_config_file(Path::new("/tmp/mcp-config.json")));
        assert!(is_config_file(Path::new("/tmp/foo.mcp.json")));
        assert!(!is_config_file(Path::new("/tmp/other.json")));
    }
}
