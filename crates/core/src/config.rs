//! Editor configuration: hit radii, thresholds and grid defaults.
//!
//! Configuration starts from built-in defaults and can be loaded from a JSON
//! file, from environment variables, or built programmatically.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const ENV_CLOSE_RADIUS: &str = "HERBIVORY_CLOSE_RADIUS_PX";
const ENV_VERTEX_RADIUS: &str = "HERBIVORY_VERTEX_RADIUS_PX";
const ENV_ENDPOINT_RADIUS: &str = "HERBIVORY_ENDPOINT_RADIUS_PX";
const ENV_DRAG_THRESHOLD: &str = "HERBIVORY_DRAG_THRESHOLD_PX";
const ENV_MIN_LINE: &str = "HERBIVORY_MIN_LINE_PX";
const ENV_GRID_MM: &str = "HERBIVORY_GRID_MM";
const ENV_RESEARCHER: &str = "HERBIVORY_RESEARCHER";

/// Tunables for the interactive editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    /// Click distance from the first vertex that closes a polygon
    pub close_hit_radius: f64,
    /// Pointer distance that counts as touching a polygon vertex
    pub vertex_hit_radius: f64,
    /// Pointer distance that counts as touching a scale line endpoint
    pub endpoint_hit_radius: f64,
    /// Movement needed before a vertex press becomes a drag
    pub drag_threshold: f64,
    /// Scale lines this short or shorter are discarded on release
    pub min_line_length: f64,
    /// Grid cell edge in millimetres
    pub grid_size_mm: f64,
    /// Name recorded on cell classifications
    pub researcher: Option<String>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            close_hit_radius: 10.0,
            vertex_hit_radius: 6.0,
            endpoint_hit_radius: 15.0,
            drag_threshold: 2.0,
            min_line_length: 10.0,
            grid_size_mm: crate::grid::DEFAULT_GRID_SIZE_MM,
            researcher: None,
        }
    }
}

impl EditorConfig {
    pub fn with_close_hit_radius(mut self, px: f64) -> Self {
        self.close_hit_radius = px;
        self
    }

    pub fn with_vertex_hit_radius(mut self, px: f64) -> Self {
        self.vertex_hit_radius = px;
        self
    }

    pub fn with_endpoint_hit_radius(mut self, px: f64) -> Self {
        self.endpoint_hit_radius = px;
        self
    }

    pub fn with_grid_size_mm(mut self, mm: f64) -> Self {
        self.grid_size_mm = mm;
        self
    }

    pub fn with_researcher(mut self, name: impl Into<String>) -> Self {
        self.researcher = Some(name.into());
        self
    }

    /// Returns the default configuration file for the current platform.
    ///
    /// - macOS: ~/Library/Application Support/org.herbivory.HerbivoryCounter/config.json
    /// - Linux: ~/.config/herbivory-counter/config.json
    /// - Windows: %APPDATA%\herbivory\HerbivoryCounter\config\config.json
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "herbivory", "HerbivoryCounter")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Defaults, then the platform config file if present, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Self::default().apply_env(),
        }
    }

    /// The given config file with environment overrides on top.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_file(path)?.apply_env()
    }

    /// Loads configuration from environment variables on top of the defaults.
    ///
    /// Environment variables:
    /// - `HERBIVORY_CLOSE_RADIUS_PX` (default: 10)
    /// - `HERBIVORY_VERTEX_RADIUS_PX` (default: 6)
    /// - `HERBIVORY_ENDPOINT_RADIUS_PX` (default: 15)
    /// - `HERBIVORY_DRAG_THRESHOLD_PX` (default: 2)
    /// - `HERBIVORY_MIN_LINE_PX` (default: 10)
    /// - `HERBIVORY_GRID_MM` (default: 1)
    /// - `HERBIVORY_RESEARCHER`
    ///
    /// # Errors
    /// Returns an error if any variable holds a value that is not a positive number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    fn apply_env(mut self) -> Result<Self, ConfigError> {
        let numeric = [
            (ENV_CLOSE_RADIUS, &mut self.close_hit_radius),
            (ENV_VERTEX_RADIUS, &mut self.vertex_hit_radius),
            (ENV_ENDPOINT_RADIUS, &mut self.endpoint_hit_radius),
            (ENV_DRAG_THRESHOLD, &mut self.drag_threshold),
            (ENV_MIN_LINE, &mut self.min_line_length),
            (ENV_GRID_MM, &mut self.grid_size_mm),
        ];

        for (key, slot) in numeric {
            if let Ok(val) = std::env::var(key) {
                *slot = parse_positive(key, &val)?;
            }
        }

        if let Ok(val) = std::env::var(ENV_RESEARCHER) {
            let val = val.trim();
            self.researcher = (!val.is_empty()).then(|| val.to_string());
        }

        Ok(self)
    }

    /// Loads configuration from a JSON file. Missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path.as_ref(), serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("closeHitRadius", self.close_hit_radius),
            ("vertexHitRadius", self.vertex_hit_radius),
            ("endpointHitRadius", self.endpoint_hit_radius),
            ("dragThreshold", self.drag_threshold),
            ("minLineLength", self.min_line_length),
            ("gridSizeMm", self.grid_size_mm),
        ];
        match fields.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
            Some((key, _)) => Err(ConfigError::InvalidValue(key.to_string())),
            None => Ok(()),
        }
    }
}

fn parse_positive(key: &str, val: &str) -> Result<f64, ConfigError> {
    val.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| ConfigError::InvalidValue(key.to_string()))
}

/// Errors that can occur while loading or saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed configuration file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ALL_VARS: [&str; 7] = [
        ENV_CLOSE_RADIUS,
        ENV_VERTEX_RADIUS,
        ENV_ENDPOINT_RADIUS,
        ENV_DRAG_THRESHOLD,
        ENV_MIN_LINE,
        ENV_GRID_MM,
        ENV_RESEARCHER,
    ];

    #[test]
    fn test_default_config() {
        let config = EditorConfig::default();
        assert_eq!(config.close_hit_radius, 10.0);
        assert_eq!(config.vertex_hit_radius, 6.0);
        assert_eq!(config.endpoint_hit_radius, 15.0);
        assert_eq!(config.drag_threshold, 2.0);
        assert_eq!(config.min_line_length, 10.0);
        assert_eq!(config.grid_size_mm, 1.0);
        assert!(config.researcher.is_none());
    }

    #[test]
    fn test_builder_methods() {
        let config = EditorConfig::default()
            .with_close_hit_radius(12.0)
            .with_vertex_hit_radius(4.0)
            .with_endpoint_hit_radius(20.0)
            .with_grid_size_mm(5.0)
            .with_researcher("ana");

        assert_eq!(config.close_hit_radius, 12.0);
        assert_eq!(config.vertex_hit_radius, 4.0);
        assert_eq!(config.endpoint_hit_radius, 20.0);
        assert_eq!(config.grid_size_mm, 5.0);
        assert_eq!(config.researcher.as_deref(), Some("ana"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&ALL_VARS);
        for var in ALL_VARS {
            env::remove_var(var);
        }

        env::set_var(ENV_CLOSE_RADIUS, "14");
        env::set_var(ENV_GRID_MM, "2.5");
        env::set_var(ENV_RESEARCHER, "  mika ");

        let config = EditorConfig::from_env().unwrap();
        assert_eq!(config.close_hit_radius, 14.0);
        assert_eq!(config.grid_size_mm, 2.5);
        assert_eq!(config.researcher.as_deref(), Some("mika"));
        assert_eq!(config.vertex_hit_radius, 6.0); // default
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&ALL_VARS);
        for var in ALL_VARS {
            env::remove_var(var);
        }

        env::set_var(ENV_VERTEX_RADIUS, "wide");
        assert!(matches!(
            EditorConfig::from_env(),
            Err(ConfigError::InvalidValue(key)) if key == ENV_VERTEX_RADIUS
        ));

        env::set_var(ENV_VERTEX_RADIUS, "-1");
        assert!(EditorConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_load_from_applies_env_over_file() {
        let _guard = EnvGuard::new(&ALL_VARS);
        for var in ALL_VARS {
            env::remove_var(var);
        }
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{ "gridSizeMm": 4, "researcher": "lee" }"#).unwrap();

        let config = EditorConfig::load_from(&path).unwrap();
        assert_eq!(config.grid_size_mm, 4.0);
        assert_eq!(config.researcher.as_deref(), Some("lee"));

        env::set_var(ENV_RESEARCHER, "mika");
        let config = EditorConfig::load_from(&path).unwrap();
        assert_eq!(config.researcher.as_deref(), Some("mika"));
        assert_eq!(config.grid_size_mm, 4.0);
    }

    // Saves and restores environment variables around a test
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_file_save_and_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("config.json");

        let config = EditorConfig::default().with_grid_size_mm(2.0).with_researcher("lee");
        config.save_to_file(&path).unwrap();

        let loaded = EditorConfig::from_file(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{ "vertexHitRadius": 8 }"#).unwrap();

        let config = EditorConfig::from_file(&path).unwrap();
        assert_eq!(config.vertex_hit_radius, 8.0);
        assert_eq!(config.close_hit_radius, 10.0);
    }

    #[test]
    fn test_file_rejects_negative_radius() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{ "closeHitRadius": -5 }"#).unwrap();

        assert!(matches!(
            EditorConfig::from_file(&path),
            Err(ConfigError::InvalidValue(key)) if key == "closeHitRadius"
        ));
    }
}
