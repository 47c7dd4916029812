use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    pub data_dir: PathBuf,
    pub config_file: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("jackpot"),
            config_file: None,
            verbose: false,
        }
    }
}

impl CliConfig {
    pub fn new(data_dir: Option<PathBuf>, config_file: Option<PathBuf>, verbose: bool) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: data_dir.unwrap_or(defaults.data_dir),
            config_file,
            verbose,
        }
    }

    /// Explicit `--config`, otherwise `jackpot.json` in the data directory.
    pub fn config_path(&self) -> PathBuf {
        self.config_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("jackpot.json"))
    }

    pub fn log_filter(&self) -> String {
        let level = if self.verbose { "debug" } else { "info" };
        format!("jackpot={},jackpot_core={}", level, level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_defaults_to_data_dir() {
        let cli = CliConfig::new(Some(PathBuf::from("/tmp/jp")), None, false);
        assert_eq!(cli.config_path(), PathBuf::from("/tmp/jp/jackpot.json"));

        let cli = CliConfig::new(None, Some(PathBuf::from("custom.json")), true);
        assert_eq!(cli.config_path(), PathBuf::from("custom.json"));
        assert_eq!(cli.log_filter(), "jackpot=debug,jackpot_core=debug");
    }
}
