//! Dashboard configuration file support.
//!
//! Reads data locations and calendar settings from a TOML file. Relative
//! paths are resolved against the directory holding the file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, FiscalConvention, LoadOptions, DEFAULT_TIMESTAMP_FORMATS};
use crate::error::RidershipError;
use crate::notes::NotesTable;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub data: DataSettings,
    #[serde(default)]
    pub calendar: CalendarSettings,
    #[serde(skip)]
    base_dir: PathBuf,
}

/// Where the ridership and notes tables live and how to read them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    pub ridership_path: PathBuf,
    #[serde(default)]
    pub notes_path: Option<PathBuf>,
    #[serde(default = "default_timestamp_formats")]
    pub timestamp_formats: Vec<String>,
    /// Source header -> canonical column name, for both tables.
    #[serde(default)]
    pub rename: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSettings {
    #[serde(default)]
    pub fiscal_convention: FiscalConvention,
    #[serde(default = "default_window_years")]
    pub default_window_years: u32,
}

fn default_timestamp_formats() -> Vec<String> {
    DEFAULT_TIMESTAMP_FORMATS
        .iter()
        .map(|f| f.to_string())
        .collect()
}

fn default_window_years() -> u32 {
    4
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            fiscal_convention: FiscalConvention::default(),
            default_window_years: default_window_years(),
        }
    }
}

impl DashboardConfig {
    /// Defaults for everything but the ridership file.
    pub fn new(ridership_path: impl Into<PathBuf>) -> Self {
        Self {
            data: DataSettings {
                ridership_path: ridership_path.into(),
                notes_path: None,
                timestamp_formats: default_timestamp_formats(),
                rename: HashMap::new(),
            },
            calendar: CalendarSettings::default(),
            base_dir: PathBuf::new(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RidershipError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RidershipError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_toml_str(&content, base_dir)
    }

    pub fn from_toml_str(
        content: &str,
        base_dir: impl Into<PathBuf>,
    ) -> Result<Self, RidershipError> {
        let mut config: DashboardConfig = toml::from_str(content)
            .map_err(|e| RidershipError::Config(format!("Failed to parse config: {}", e)))?;
        if config.data.timestamp_formats.is_empty() {
            return Err(RidershipError::Config(
                "data.timestamp_formats must not be empty".to_string(),
            ));
        }
        config.base_dir = base_dir.into();
        Ok(config)
    }

    pub fn ridership_path(&self) -> PathBuf {
        self.resolve(&self.data.ridership_path)
    }

    pub fn notes_path(&self) -> Option<PathBuf> {
        self.data.notes_path.as_deref().map(|p| self.resolve(p))
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            fiscal_convention: self.calendar.fiscal_convention,
            timestamp_formats: self.data.timestamp_formats.clone(),
            rename: self.data.rename.clone(),
        }
    }

    pub fn load_dataset(&self) -> Result<Dataset, RidershipError> {
        Dataset::load(self.ridership_path(), &self.load_options())
    }

    /// An empty table when no notes file is configured.
    pub fn load_notes(&self) -> Result<NotesTable, RidershipError> {
        match self.notes_path() {
            Some(path) => NotesTable::load(path, &self.data.rename),
            None => Ok(NotesTable::empty()),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = DashboardConfig::from_toml_str(
            "[data]\nridership_path = \"loop.csv\"\n",
            "/srv/dashboard",
        )
        .unwrap();
        assert_eq!(config.ridership_path(), PathBuf::from("/srv/dashboard/loop.csv"));
        assert_eq!(config.notes_path(), None);
        assert_eq!(config.calendar.default_window_years, 4);
        assert_eq!(config.calendar.fiscal_convention, FiscalConvention::EndingYear);
        assert_eq!(config.data.timestamp_formats.len(), DEFAULT_TIMESTAMP_FORMATS.len());
    }

    #[test]
    fn full_config_is_parsed() {
        let toml = r#"
[data]
ridership_path = "/data/loop.csv"
notes_path = "notes.csv"
timestamp_formats = ["%d.%m.%Y"]

[data.rename]
datetime = "timestamp"
total_number = "count"

[calendar]
fiscal_convention = "starting-year"
default_window_years = 2
"#;
        let config = DashboardConfig::from_toml_str(toml, "conf").unwrap();
        assert_eq!(config.ridership_path(), PathBuf::from("/data/loop.csv"));
        assert_eq!(config.notes_path(), Some(PathBuf::from("conf/notes.csv")));

        let options = config.load_options();
        assert_eq!(options.fiscal_convention, FiscalConvention::StartingYear);
        assert_eq!(options.timestamp_formats, vec!["%d.%m.%Y".to_string()]);
        assert_eq!(options.rename.get("total_number").map(String::as_str), Some("count"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let err = DashboardConfig::from_toml_str("[data]\n", ".").unwrap_err();
        assert!(matches!(err, RidershipError::Config(_)));

        let err = DashboardConfig::from_file("/nonexistent/dashboard.toml").unwrap_err();
        assert!(matches!(err, RidershipError::Config(_)));
    }

    #[test]
    fn missing_notes_file_setting_gives_empty_table() {
        let config = DashboardConfig::new("loop.csv");
        assert!(config.load_notes().unwrap().is_empty());
    }
}
