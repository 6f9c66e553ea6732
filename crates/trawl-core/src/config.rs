//! Configuration loading.
//!
//! TOML is the primary source; every field can additionally be overridden
//! by an environment variable named `TREND_<SECTION>__<KEY>` (e.g.
//! `TREND_RETENTION__TRENDING_THRESHOLD=10`). Parsed once at process start
//! into an immutable struct — nothing in this crate re-reads config after
//! startup.

use serde::Deserialize;
use std::env;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub retention: RetentionConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub sslmode: String,
}

impl DatabaseConfig {
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.dbname, self.sslmode
        )
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub handle: String,
    pub app_password: String,
    pub pds_base_url: String,
    pub jetstream_url: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    pub rate_limit_rpm: u32,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub posts_per_page: u32,
    pub max_concurrent: usize,
    pub rate_limit_ms: u64,
    pub initial_lookback_hours: u32,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_pages_per_user: u32,
}

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub retention_hours: u32,
    pub cleanup_interval_min: u32,
    pub trending_threshold: i64,
    pub cursor_update_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub include_2nd_degree: bool,
    pub min_source_count: i32,
    pub crawler_rps: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            posts_per_page: 50,
            max_concurrent: 10,
            rate_limit_ms: 100,
            initial_lookback_hours: 24,
            max_retries: 3,
            retry_backoff_ms: 1000,
            max_pages_per_user: 10,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_hours: 24,
            cleanup_interval_min: 60,
            trending_threshold: 5,
            cursor_update_seconds: 10,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            include_2nd_degree: true,
            min_source_count: 2,
            crawler_rps: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (all-optional, defaults applied after)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    database: Option<RawDatabase>,
    upstream: Option<RawUpstream>,
    server: Option<RawServer>,
    ingest: Option<RawIngest>,
    retention: Option<RawRetention>,
    network: Option<RawNetwork>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDatabase {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    dbname: Option<String>,
    sslmode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUpstream {
    handle: Option<String>,
    app_password: Option<String>,
    pds_base_url: Option<String>,
    jetstream_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawServer {
    host: Option<String>,
    port: Option<u16>,
    cors_origin: Option<String>,
    rate_limit_rpm: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIngest {
    posts_per_page: Option<u32>,
    max_concurrent: Option<usize>,
    rate_limit_ms: Option<u64>,
    initial_lookback_hours: Option<u32>,
    max_retries: Option<u32>,
    retry_backoff_ms: Option<u64>,
    max_pages_per_user: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRetention {
    retention_hours: Option<u32>,
    cleanup_interval_min: Option<u32>,
    trending_threshold: Option<i64>,
    cursor_update_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNetwork {
    include_2nd_degree: Option<bool>,
    min_source_count: Option<i32>,
    crawler_rps: Option<u32>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load config from the path named by `CONFIG_PATH`, falling back to
/// `./config.toml`, falling back again to built-in defaults if no file is
/// present at all (every field is still overridable by env var).
pub fn load_config() -> Result<Config, ConfigError> {
    let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "./config.toml".to_owned());
    load_config_from_path(Path::new(&path))
}

/// Parse `--config <path>` off a binary's own argv, falling back to
/// `CONFIG_PATH`/`./config.toml` when absent. Every binary calls this with
/// its own name before `load_config`, so `--help` reports the right usage.
#[must_use]
pub fn parse_config_path_arg(bin_name: &'static str) -> Option<String> {
    let matches = clap::Command::new(bin_name)
        .version(env!("CARGO_PKG_VERSION"))
        .about("part of the trawl link-trending pipeline")
        .arg(
            clap::Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("path to a TOML config file (defaults to $CONFIG_PATH or ./config.toml)"),
        )
        .get_matches();
    matches.get_one::<String>("config").cloned()
}

pub fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    let raw = if path.exists() {
        let toml_str = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("reading config file '{}': {e}", path.display())))?;
        toml::from_str(&toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?
    } else {
        RawConfig::default()
    };
    build_config(raw)
}

fn build_config(raw: RawConfig) -> Result<Config, ConfigError> {
    let raw_db = raw.database.unwrap_or_default();
    let database = DatabaseConfig {
        host: env_or(&raw_db.host, "DATABASE", "HOST", "localhost"),
        port: env_or_parse(&raw_db.port, "DATABASE", "PORT", 5432)?,
        user: env_or(&raw_db.user, "DATABASE", "USER", "postgres"),
        password: env_or(&raw_db.password, "DATABASE", "PASSWORD", ""),
        dbname: env_or(&raw_db.dbname, "DATABASE", "DBNAME", "trawl"),
        sslmode: env_or(&raw_db.sslmode, "DATABASE", "SSLMODE", "prefer"),
    };

    let raw_up = raw.upstream.unwrap_or_default();
    let handle = env_or(&raw_up.handle, "UPSTREAM", "HANDLE", "");
    let app_password = env_or(&raw_up.app_password, "UPSTREAM", "APP_PASSWORD", "");
    if handle.is_empty() || app_password.is_empty() {
        return Err(ConfigError::MissingField(
            "upstream.handle and upstream.app_password are required".to_owned(),
        ));
    }
    let upstream = UpstreamConfig {
        handle,
        app_password,
        pds_base_url: env_or(
            &raw_up.pds_base_url,
            "UPSTREAM",
            "PDS_BASE_URL",
            "https://bsky.social",
        ),
        jetstream_url: env_or(
            &raw_up.jetstream_url,
            "UPSTREAM",
            "JETSTREAM_URL",
            "wss://jetstream2.us-east.bsky.network/subscribe",
        ),
    };

    let raw_srv = raw.server.unwrap_or_default();
    let server = ServerConfig {
        host: env_or(&raw_srv.host, "SERVER", "HOST", "0.0.0.0"),
        port: env_or_parse(&raw_srv.port, "SERVER", "PORT", 8080)?,
        cors_origin: env_or(&raw_srv.cors_origin, "SERVER", "CORS_ORIGIN", "*"),
        rate_limit_rpm: env_or_parse(&raw_srv.rate_limit_rpm, "SERVER", "RATE_LIMIT_RPM", 600)?,
    };

    let d = IngestConfig::default();
    let raw_ing = raw.ingest.unwrap_or_default();
    let ingest = IngestConfig {
        posts_per_page: env_or_parse(&raw_ing.posts_per_page, "INGEST", "POSTS_PER_PAGE", d.posts_per_page)?,
        max_concurrent: env_or_parse(&raw_ing.max_concurrent, "INGEST", "MAX_CONCURRENT", d.max_concurrent)?,
        rate_limit_ms: env_or_parse(&raw_ing.rate_limit_ms, "INGEST", "RATE_LIMIT_MS", d.rate_limit_ms)?,
        initial_lookback_hours: env_or_parse(
            &raw_ing.initial_lookback_hours,
            "INGEST",
            "INITIAL_LOOKBACK_HOURS",
            d.initial_lookback_hours,
        )?,
        max_retries: env_or_parse(&raw_ing.max_retries, "INGEST", "MAX_RETRIES", d.max_retries)?,
        retry_backoff_ms: env_or_parse(
            &raw_ing.retry_backoff_ms,
            "INGEST",
            "RETRY_BACKOFF_MS",
            d.retry_backoff_ms,
        )?,
        max_pages_per_user: env_or_parse(
            &raw_ing.max_pages_per_user,
            "INGEST",
            "MAX_PAGES_PER_USER",
            d.max_pages_per_user,
        )?,
    };

    let d = RetentionConfig::default();
    let raw_ret = raw.retention.unwrap_or_default();
    let retention = RetentionConfig {
        retention_hours: env_or_parse(&raw_ret.retention_hours, "RETENTION", "RETENTION_HOURS", d.retention_hours)?,
        cleanup_interval_min: env_or_parse(
            &raw_ret.cleanup_interval_min,
            "RETENTION",
            "CLEANUP_INTERVAL_MIN",
            d.cleanup_interval_min,
        )?,
        trending_threshold: env_or_parse(
            &raw_ret.trending_threshold,
            "RETENTION",
            "TRENDING_THRESHOLD",
            d.trending_threshold,
        )?,
        cursor_update_seconds: env_or_parse(
            &raw_ret.cursor_update_seconds,
            "RETENTION",
            "CURSOR_UPDATE_SECONDS",
            d.cursor_update_seconds,
        )?,
    };

    let d = NetworkConfig::default();
    let raw_net = raw.network.unwrap_or_default();
    let network = NetworkConfig {
        include_2nd_degree: env_or_parse(
            &raw_net.include_2nd_degree,
            "NETWORK",
            "INCLUDE_2ND_DEGREE",
            d.include_2nd_degree,
        )?,
        min_source_count: env_or_parse(&raw_net.min_source_count, "NETWORK", "MIN_SOURCE_COUNT", d.min_source_count)?,
        crawler_rps: env_or_parse(&raw_net.crawler_rps, "NETWORK", "CRAWLER_RPS", d.crawler_rps)?,
    };

    Ok(Config {
        database,
        upstream,
        server,
        ingest,
        retention,
        network,
    })
}

fn env_key(section: &str, key: &str) -> String {
    format!("TREND_{section}__{key}")
}

fn env_or(raw: &Option<String>, section: &str, key: &str, default: &str) -> String {
    env::var(env_key(section, key))
        .ok()
        .or_else(|| raw.clone())
        .unwrap_or_else(|| default.to_owned())
}

fn env_or_parse<T: std::str::FromStr>(
    raw: &Option<T>,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: Clone,
{
    if let Ok(v) = env::var(env_key(section, key)) {
        return v
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}: '{}'", env_key(section, key), v)));
    }
    Ok(raw.clone().unwrap_or(default))
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "parse error: {s}"),
            ConfigError::MissingField(s) => write!(f, "missing required field: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "invalid config value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_sections_absent() {
        let raw = RawConfig::default();
        // handle/app_password required, so this should fail without them.
        let err = build_config(raw).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn toml_values_round_trip_into_config() {
        let toml_str = r#"
            [upstream]
            handle = "user.bsky.social"
            app_password = "xxxx-xxxx-xxxx-xxxx"

            [retention]
            trending_threshold = 9
        "#;
        let raw: RawConfig = toml::from_str(toml_str).unwrap();
        let cfg = build_config(raw).unwrap();
        assert_eq!(cfg.upstream.handle, "user.bsky.social");
        assert_eq!(cfg.retention.trending_threshold, 9);
        assert_eq!(cfg.retention.retention_hours, 24);
    }

    #[test]
    fn env_override_wins_over_toml() {
        let toml_str = r#"
            [upstream]
            handle = "user.bsky.social"
            app_password = "xxxx"

            [retention]
            trending_threshold = 9
        "#;
        let raw: RawConfig = toml::from_str(toml_str).unwrap();
        std::env::set_var("TREND_RETENTION__TRENDING_THRESHOLD", "42");
        let cfg = build_config(raw).unwrap();
        std::env::remove_var("TREND_RETENTION__TRENDING_THRESHOLD");
        assert_eq!(cfg.retention.trending_threshold, 42);
    }

    #[test]
    fn loads_from_a_real_file_on_disk() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        write!(
            file,
            r#"
            [upstream]
            handle = "file.bsky.social"
            app_password = "xxxx"

            [network]
            crawler_rps = 7
            "#
        )
        .expect("write temp config");

        let cfg = load_config_from_path(file.path()).expect("load config from path");
        assert_eq!(cfg.upstream.handle, "file.bsky.social");
        assert_eq!(cfg.network.crawler_rps, 7);
    }

    #[test]
    fn missing_path_falls_back_to_defaults_plus_env() {
        std::env::set_var("TREND_UPSTREAM__HANDLE", "env.bsky.social");
        std::env::set_var("TREND_UPSTREAM__APP_PASSWORD", "xxxx");
        let cfg = load_config_from_path(Path::new("/nonexistent/path/config.toml"))
            .expect("defaults plus env should satisfy required fields");
        std::env::remove_var("TREND_UPSTREAM__HANDLE");
        std::env::remove_var("TREND_UPSTREAM__APP_PASSWORD");
        assert_eq!(cfg.upstream.handle, "env.bsky.social");
    }
}
