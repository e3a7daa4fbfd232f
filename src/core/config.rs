//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::path::PathBuf;

use crate::core::fingerprint::Thresholds;
use crate::core::Project;

/// Image extensions compared by default
pub const DEFAULT_TEXTURE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tga", "bmp"];

/// refmerge configuration with layered hierarchy
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum perceptual hash distance (exclusive)
    pub hash_threshold: Option<u32>,

    /// Minimum histogram similarity
    pub histogram_threshold: Option<f64>,

    /// Extensions of comparable image assets
    pub texture_extensions: Option<Vec<String>>,

    /// Restrict candidates to assets below this directory
    pub compare_root: Option<String>,

    /// Default output format
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(project: Option<&Project>) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (accessors below)

        // 2. Global user config (~/.config/refmerge/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read_file(&global_path) {
                config.merge(global);
            }
        }

        // 3. Project config (.refmerge/config.yaml)
        if let Some(project) = project {
            if let Some(project_config) = Self::read_file(&project.config_path()) {
                config.merge(project_config);
            }
        }

        // 4. Environment variables
        if let Some(v) = std::env::var("REFMERGE_HASH_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.hash_threshold = Some(v);
        }
        if let Some(v) = std::env::var("REFMERGE_HISTOGRAM_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.histogram_threshold = Some(v);
        }

        config
    }

    fn read_file(path: &std::path::Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("ignoring invalid config {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "refmerge")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.hash_threshold.is_some() {
            self.hash_threshold = other.hash_threshold;
        }
        if other.histogram_threshold.is_some() {
            self.histogram_threshold = other.histogram_threshold;
        }
        if other.texture_extensions.is_some() {
            self.texture_extensions = other.texture_extensions;
        }
        if other.compare_root.is_some() {
            self.compare_root = other.compare_root;
        }
        if other.default_format.is_some() {
            self.default_format = other.default_format;
        }
    }

    /// Effective match thresholds
    pub fn thresholds(&self) -> Thresholds {
        let defaults = Thresholds::default();
        Thresholds {
            max_hash_distance: self.hash_threshold.unwrap_or(defaults.max_hash_distance),
            min_histogram_similarity: self
                .histogram_threshold
                .unwrap_or(defaults.min_histogram_similarity),
        }
    }

    /// Lowercased extensions (without the dot) of comparable images
    pub fn texture_extensions(&self) -> Vec<String> {
        match &self.texture_extensions {
            Some(exts) => exts
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            None => DEFAULT_TEXTURE_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }

    /// Whether an asset path has one of the comparable image extensions
    pub fn is_texture_path(&self, path: &str) -> bool {
        let Some(ext) = path.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()) else {
            return false;
        };
        self.texture_extensions().iter().any(|e| *e == ext)
    }

    /// Candidate directory prefix, normalized without a trailing slash
    pub fn compare_root(&self) -> Option<String> {
        self.compare_root
            .as_deref()
            .map(|r| r.trim_end_matches('/').to_string())
            .filter(|r| !r.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        let thresholds = config.thresholds();
        assert_eq!(thresholds.max_hash_distance, 3);
        assert!((thresholds.min_histogram_similarity - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.texture_extensions().len(), 5);
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = Config {
            hash_threshold: Some(3),
            compare_root: Some("Assets".to_string()),
            ..Default::default()
        };
        base.merge(Config {
            hash_threshold: Some(5),
            ..Default::default()
        });
        assert_eq!(base.hash_threshold, Some(5));
        assert_eq!(base.compare_root.as_deref(), Some("Assets"));
    }

    #[test]
    fn test_is_texture_path() {
        let config = Config::default();
        assert!(config.is_texture_path("Assets/ui/Icon.PNG"));
        assert!(config.is_texture_path("a/b.jpeg"));
        assert!(!config.is_texture_path("Assets/ui/panel.prefab"));
        assert!(!config.is_texture_path("Makefile"));
    }

    #[test]
    fn test_custom_extensions_normalized() {
        let config = Config {
            texture_extensions: Some(vec![".PSD".to_string()]),
            ..Default::default()
        };
        assert!(config.is_texture_path("art/source.psd"));
        assert!(!config.is_texture_path("art/source.png"));
    }

    #[test]
    fn test_parse_yaml() {
        let config: Config =
            serde_yml::from_str("hash_threshold: 4\ncompare_root: Assets/ui/\n").unwrap();
        assert_eq!(config.thresholds().max_hash_distance, 4);
        assert_eq!(config.compare_root().as_deref(), Some("Assets/ui"));
    }
}
