//! TOML parser with helpful error messages

use super::schema::TetherConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse tether.toml with detailed error messages
pub fn parse_tether_toml(path: &Path) -> Result<TetherConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_tether_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse tether.toml content from string
pub fn parse_tether_toml_str(content: &str) -> Result<TetherConfig> {
    let config: TetherConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;

    config.validate()?;

    Ok(config)
}

/// Point at the offending line when the error carries a span
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();
    let Some(span) = error.span() else {
        return anyhow::anyhow!("TOML parsing error: {}", message);
    };

    let line_num = content[..span.start.min(content.len())].matches('\n').count() + 1;
    anyhow::anyhow!(
        "TOML parsing error at line {}:\n{}\n\nError: {}",
        line_num,
        get_line_context(content, line_num),
        message
    )
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize a configuration to TOML string
pub fn to_toml(config: &TetherConfig) -> Result<String> {
    toml::to_string_pretty(config).with_context(|| "Failed to serialize configuration to TOML")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
root = "/studio/pipeline/site"
config = "catalog:primary?id=42&version=v1.4.0"
core = "path:/dev/core"
default_core = "catalog:core?version=v0.19.3"
cache_dir = "/var/cache/tether"
catalog_dir = "/studio/catalog"

[pipeline]
project_id = 123
plugin_id = "basic.desktop"
pipeline_config_id = 7
bundle_cache_fallback_paths = ["/mnt/bundles"]
"#;

        let config = parse_tether_toml_str(toml).unwrap();
        assert_eq!(config.root, PathBuf::from("/studio/pipeline/site"));
        assert_eq!(config.core.as_deref(), Some("path:/dev/core"));
        assert_eq!(config.pipeline.project_id, Some(123));
        assert_eq!(
            config.pipeline.bundle_cache_fallback_paths,
            vec![PathBuf::from("/mnt/bundles")]
        );
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_tether_toml_str("root = \"/r\"\nconfig = \"path:/cfg\"\n").unwrap();
        assert_eq!(config.core, None);
        assert_eq!(config.pipeline, Default::default());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = parse_tether_toml_str("root = \"/r\"\nconfig = \"path:/c\"\nflavour = 1\n")
            .unwrap_err();
        assert!(err.to_string().contains("flavour"), "{}", err);
    }

    #[test]
    fn test_invalid_location_rejected() {
        assert!(parse_tether_toml_str("root = \"/r\"\nconfig = \"svn:/c\"\n").is_err());
    }

    #[test]
    fn test_catalog_needs_catalog_dir() {
        let err = parse_tether_toml_str("root = \"/r\"\nconfig = \"catalog:primary\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("catalog_dir"));
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let mut original = TetherConfig::new(PathBuf::from("/r"), "git:https://h/c.git@v1");
        original.default_core = Some("path:/core".to_string());
        original.pipeline.plugin_id = Some("basic.desktop".to_string());

        let parsed = parse_tether_toml_str(&to_toml(&original).unwrap()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_parse_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "root = \"/r\"\nconfig = \"path:/cfg\"").unwrap();

        let config = parse_tether_toml(temp_file.path()).unwrap();
        assert_eq!(config.config, "path:/cfg");
    }

    #[test]
    fn test_parse_nonexistent_file() {
        let err = parse_tether_toml(Path::new("/nonexistent/tether.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tether.toml"));
    }
}
