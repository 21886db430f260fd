use equity_valuation_core::config::ValuationConfig;
use tracing::debug;

use crate::input::file;

/// Load a `ValuationConfig` from YAML or JSON, chosen by extension.
/// Without a path every documented default applies.
pub fn load_config(path: Option<&str>) -> Result<ValuationConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(ValuationConfig::default());
    };
    let (canonical, contents) = file::read_text(path)?;
    let config = parse_config(&contents, file::extension(path).as_deref())
        .map_err(|e| format!("Failed to parse config '{}': {}", canonical.display(), e))?;
    debug!(path = %canonical.display(), "configuration loaded");
    Ok(config)
}

fn parse_config(
    contents: &str,
    extension: Option<&str>,
) -> Result<ValuationConfig, Box<dyn std::error::Error>> {
    match extension {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(contents)?),
        Some("json") => Ok(serde_json::from_str(contents)?),
        other => Err(format!(
            "unsupported config format {:?}; use .yaml, .yml or .json",
            other.unwrap_or("")
        )
        .into()),
    }
}
