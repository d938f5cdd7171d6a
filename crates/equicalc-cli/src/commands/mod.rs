//! Subcommand implementations

pub(crate) mod calculate;
pub(crate) mod simulate;

use anyhow::{Context, Result};
use equicalc_client::ClientConfig;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Client config from `path` (or defaults), then environment overrides
pub(crate) fn load_client_config(path: Option<&Path>) -> Result<ClientConfig> {
    let config = match path {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    Ok(config.apply_env()?)
}

/// Decode a TOML document
pub(crate) fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("cannot parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use equicalc_types::{CalculationInput, SimulationConfig};
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn scenario_roundtrips_through_toml() {
        let input = equicalc_test_utils::rsu_input(10_000.0);
        let file = write(&toml::to_string(&input).unwrap());

        let loaded: CalculationInput = load_toml(file.path()).unwrap();
        assert_eq!(loaded, input);
        assert!(loaded.is_valid());
    }

    #[test]
    fn simulation_config_loads() {
        let config = equicalc_test_utils::simulation_config();
        let file = write(&toml::to_string(&config).unwrap());

        let loaded: SimulationConfig = load_toml(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_toml::<CalculationInput>(Path::new("/nonexistent/scenario.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/scenario.toml"));
    }

    #[test]
    fn default_client_config_without_file() {
        let config = load_client_config(None).unwrap();
        assert!(config.api_base_url.starts_with("http"));
    }
}
