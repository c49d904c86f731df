use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// Process-wide ephemeral state currently only lives in an in-process
/// `dashmap` table (SPEC_FULL.md §3); the enum exists so a future network
/// cache backend can be selected without changing the config shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheBackend {
    InMemory,
}

impl Default for CacheBackend {
    fn default() -> Self {
        CacheBackend::InMemory
    }
}

/// Loaded configuration for one `his-sync` process (SPEC_FULL.md §4.8).
#[derive(Debug, Clone)]
pub struct HisSyncConfig {
    pub database_path: PathBuf,
    pub cache_backend: CacheBackend,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub default_page_size: u32,
    pub default_aggregate_chunk_size: usize,
    pub default_event_chunk_size: usize,
    pub default_tracker_org_unit_cap: usize,
    pub watermark_ttl_secs: u64,
    pub rate_window_secs: u64,
}

impl Default for HisSyncConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/his-sync.sled"),
            cache_backend: CacheBackend::InMemory,
            log_dir: PathBuf::from("./logs"),
            log_level: "info".to_string(),
            default_page_size: 50,
            default_aggregate_chunk_size: 1000,
            default_event_chunk_size: 500,
            default_tracker_org_unit_cap: 10,
            watermark_ttl_secs: 24 * 3600,
            rate_window_secs: 3600,
        }
    }
}

/// The TOML file shape: every field optional, so a partial file only
/// overrides what it names. Unknown keys are ignored rather than
/// rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FileConfig {
    database_path: Option<PathBuf>,
    cache_backend: Option<CacheBackend>,
    log_dir: Option<PathBuf>,
    log_level: Option<String>,
    default_page_size: Option<u32>,
    default_aggregate_chunk_size: Option<usize>,
    default_event_chunk_size: Option<usize>,
    default_tracker_org_unit_cap: Option<usize>,
    watermark_ttl_secs: Option<u64>,
    rate_window_secs: Option<u64>,
}

impl HisSyncConfig {
    /// Loads the layered configuration: environment overrides the file,
    /// the file overrides built-in defaults (SPEC_FULL.md §4.8). A
    /// missing file is not an error — it falls back to defaults; a
    /// malformed one is.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::default();
        if let Some(file) = read_file(path)? {
            apply_file(&mut config, file);
        }
        apply_env(&mut config)?;
        Ok(config)
    }
}

fn read_file(path: Option<&Path>) -> ConfigResult<Option<FileConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("his-sync.toml"));
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io { path: path.clone(), source })?;
    let parsed: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })?;
    Ok(Some(parsed))
}

fn apply_file(config: &mut HisSyncConfig, file: FileConfig) {
    if let Some(v) = file.database_path {
        config.database_path = v;
    }
    if let Some(v) = file.cache_backend {
        config.cache_backend = v;
    }
    if let Some(v) = file.log_dir {
        config.log_dir = v;
    }
    if let Some(v) = file.log_level {
        config.log_level = v;
    }
    if let Some(v) = file.default_page_size {
        config.default_page_size = v;
    }
    if let Some(v) = file.default_aggregate_chunk_size {
        config.default_aggregate_chunk_size = v;
    }
    if let Some(v) = file.default_event_chunk_size {
        config.default_event_chunk_size = v;
    }
    if let Some(v) = file.default_tracker_org_unit_cap {
        config.default_tracker_org_unit_cap = v;
    }
    if let Some(v) = file.watermark_ttl_secs {
        config.watermark_ttl_secs = v;
    }
    if let Some(v) = file.rate_window_secs {
        config.rate_window_secs = v;
    }
}

macro_rules! apply_parsed_env {
    ($config:expr, $field:ident, $var:literal) => {
        if let Ok(raw) = env::var($var) {
            $config.$field = raw.parse().map_err(|_| ConfigError::InvalidEnvValue { var: $var, value: raw })?;
        }
    };
}

fn apply_env(config: &mut HisSyncConfig) -> ConfigResult<()> {
    if let Ok(v) = env::var("HIS_SYNC_DATABASE_PATH") {
        config.database_path = PathBuf::from(v);
    }
    if let Ok(v) = env::var("HIS_SYNC_LOG_DIR") {
        config.log_dir = PathBuf::from(v);
    }
    if let Ok(v) = env::var("HIS_SYNC_LOG_LEVEL") {
        config.log_level = v;
    }
    apply_parsed_env!(config, default_page_size, "HIS_SYNC_PAGE_SIZE");
    apply_parsed_env!(config, default_aggregate_chunk_size, "HIS_SYNC_AGGREGATE_CHUNK_SIZE");
    apply_parsed_env!(config, default_event_chunk_size, "HIS_SYNC_EVENT_CHUNK_SIZE");
    apply_parsed_env!(config, default_tracker_org_unit_cap, "HIS_SYNC_TRACKER_ORG_UNIT_CAP");
    apply_parsed_env!(config, watermark_ttl_secs, "HIS_SYNC_WATERMARK_TTL_SECS");
    apply_parsed_env!(config, rate_window_secs, "HIS_SYNC_RATE_WINDOW_SECS");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize every test that
    // touches them so parallel `cargo test` threads don't race.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "HIS_SYNC_DATABASE_PATH",
            "HIS_SYNC_LOG_DIR",
            "HIS_SYNC_LOG_LEVEL",
            "HIS_SYNC_PAGE_SIZE",
            "HIS_SYNC_AGGREGATE_CHUNK_SIZE",
            "HIS_SYNC_EVENT_CHUNK_SIZE",
            "HIS_SYNC_TRACKER_ORG_UNIT_CAP",
            "HIS_SYNC_WATERMARK_TTL_SECS",
            "HIS_SYNC_RATE_WINDOW_SECS",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let config = HisSyncConfig::load(Some(Path::new("/nonexistent/his-sync.toml"))).unwrap();
        assert_eq!(config.default_page_size, 50);
        assert_eq!(config.default_aggregate_chunk_size, 1000);
        assert_eq!(config.default_event_chunk_size, 500);
        assert_eq!(config.default_tracker_org_unit_cap, 10);
        assert_eq!(config.watermark_ttl_secs, 86_400);
        assert_eq!(config.rate_window_secs, 3_600);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let config = HisSyncConfig::load(Some(Path::new("/definitely/does/not/exist.toml"))).unwrap();
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let mut file = tempfile_path();
        writeln!(file.1, "this is not valid toml = = =").unwrap();
        let err = HisSyncConfig::load(Some(&file.0)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn file_values_override_defaults_and_env_overrides_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let mut file = tempfile_path();
        writeln!(file.1, "default-page-size = 200\nlog-level = \"debug\"").unwrap();

        let config = HisSyncConfig::load(Some(&file.0)).unwrap();
        assert_eq!(config.default_page_size, 200);
        assert_eq!(config.log_level, "debug");

        env::set_var("HIS_SYNC_PAGE_SIZE", "333");
        let config = HisSyncConfig::load(Some(&file.0)).unwrap();
        assert_eq!(config.default_page_size, 333);
        assert_eq!(config.log_level, "debug");
        clear_env();
    }

    #[test]
    fn invalid_env_value_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("HIS_SYNC_PAGE_SIZE", "not-a-number");
        let err = HisSyncConfig::load(Some(Path::new("/nonexistent/his-sync.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvValue { .. }));
        clear_env();
    }

    fn tempfile_path() -> (PathBuf, std::fs::File) {
        let mut path = std::env::temp_dir();
        path.push(format!("his-sync-config-test-{}.toml", std::process::id()));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
