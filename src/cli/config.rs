use crate::error::{CompilerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub system_libraries: Option<Vec<String>>,
    pub local_libraries: Option<Vec<String>>,
    pub extra_usings: Option<Vec<String>>,
    pub init_statements: Option<Vec<String>>,
    pub ignore_warnings: Option<bool>,
    pub temp_dir: Option<String>,
}

pub fn load(config_path: &str) -> Result<ConfigFile> {
    log::info!("Loading configuration from {}", config_path);
    let config_content = fs::read_to_string(config_path).map_err(|e| {
        CompilerError::FileNotFound { path: format!("Config file {}: {}", config_path, e) }
    })?;

    if config_path.ends_with(".json") {
        serde_json::from_str(&config_content).map_err(|e| CompilerError::InvalidFormat {
            message: format!("Invalid JSON config: {}", e),
        })
    } else if config_path.ends_with(".toml") {
        toml::from_str(&config_content).map_err(|e| CompilerError::InvalidFormat {
            message: format!("Invalid TOML config: {}", e),
        })
    } else {
        Err(CompilerError::InvalidFormat {
            message: "Config file must be .json or .toml format".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_toml_config() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "ignore_warnings = true\nsystem_libraries = [\"math\"]").unwrap();
        let config = load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.ignore_warnings, Some(true));
        assert_eq!(config.system_libraries, Some(vec!["math".to_string()]));
    }

    #[test]
    fn rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(load(file.path().to_str().unwrap()).is_err());
    }
}
