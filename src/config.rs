use std::path::PathBuf;
use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_GEOCODER_ENDPOINT: &str = "https://api.map.baidu.com/geocoding/v3/";
const DEFAULT_GEOCODER_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_GEOCODER_RETRY_DELAY_MS: u64 = 2_000;
const DEFAULT_ROW_PAUSE_MS: u64 = 1_000;
const DEFAULT_HEADER_ROWS: usize = 2;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub spreadsheet_path: PathBuf,
    pub database_path: PathBuf,
    pub export_dir: PathBuf,
    pub baidu_api_key: Option<SecretString>,
    pub geocoder_endpoint: String,
    pub geocoder_timeout_secs: u64,
    pub geocoder_max_attempts: u32,
    pub geocoder_retry_delay_ms: u64,
    pub row_pause_ms: u64,
    pub header_rows: usize,
    pub import_sheets: Option<Vec<String>>,
    pub subbrand_sheets: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub spreadsheet_path: String,
    pub database_path: String,
    pub export_dir: String,
    pub geocoder_endpoint: String,
    pub geocoder_timeout_secs: u64,
    pub geocoder_max_attempts: u32,
    pub geocoder_retry_delay_ms: u64,
    pub row_pause_ms: u64,
    pub header_rows: usize,
    pub import_sheets: Option<Vec<String>>,
    pub subbrand_sheets: Vec<String>,
    pub has_baidu_api_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            spreadsheet_path: parse_path("SPREADSHEET_PATH", "data/hotels.xlsx"),
            database_path: parse_path("DATABASE_PATH", "data/hotels.db"),
            export_dir: parse_path("EXPORT_DIR", "data"),
            baidu_api_key: env::var("BAIDU_AK")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            geocoder_endpoint: env::var("GEOCODER_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GEOCODER_ENDPOINT.to_string()),
            geocoder_timeout_secs: parse_u64("GEOCODER_TIMEOUT_SECS", 10),
            geocoder_max_attempts: parse_u32(
                "GEOCODER_MAX_ATTEMPTS",
                DEFAULT_GEOCODER_MAX_ATTEMPTS,
            )
            .max(1),
            geocoder_retry_delay_ms: parse_u64(
                "GEOCODER_RETRY_DELAY_MS",
                DEFAULT_GEOCODER_RETRY_DELAY_MS,
            ),
            row_pause_ms: parse_u64("ROW_PAUSE_MS", DEFAULT_ROW_PAUSE_MS),
            header_rows: parse_usize("HEADER_ROWS", DEFAULT_HEADER_ROWS),
            import_sheets: parse_list("IMPORT_SHEETS"),
            subbrand_sheets: parse_list("SUBBRAND_SHEETS").unwrap_or_default(),
        }
    }

    pub fn geocoder_timeout(&self) -> Duration {
        Duration::from_secs(self.geocoder_timeout_secs)
    }

    pub fn geocoder_retry_delay(&self) -> Duration {
        Duration::from_millis(self.geocoder_retry_delay_ms)
    }

    pub fn row_pause(&self) -> Duration {
        Duration::from_millis(self.row_pause_ms)
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            spreadsheet_path: self.spreadsheet_path.display().to_string(),
            database_path: self.database_path.display().to_string(),
            export_dir: self.export_dir.display().to_string(),
            geocoder_endpoint: self.geocoder_endpoint.clone(),
            geocoder_timeout_secs: self.geocoder_timeout_secs,
            geocoder_max_attempts: self.geocoder_max_attempts,
            geocoder_retry_delay_ms: self.geocoder_retry_delay_ms,
            row_pause_ms: self.row_pause_ms,
            header_rows: self.header_rows,
            import_sheets: self.import_sheets.clone(),
            subbrand_sheets: self.subbrand_sheets.clone(),
            has_baidu_api_key: self.baidu_api_key.is_some(),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn parse_path(key: &str, default: &str) -> PathBuf {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

fn parse_list(key: &str) -> Option<Vec<String>> {
    let raw = env::var(key).ok()?;
    let items = raw
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
