use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: IpAddr,
    pub port: u16,
    pub base_url: String,
    pub registration: RegistrationMode,
    pub storage: StorageBackend,
    pub max_upload_size: usize,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationMode {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Disk(PathBuf),
    Memory,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;
        let jwt_secret = env_required("JWT_SECRET")?;

        let host: IpAddr = env_or("TASKBOARD_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid TASKBOARD_HOST: {e}"))?;

        let port: u16 = env_or("TASKBOARD_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid TASKBOARD_PORT: {e}"))?;

        let base_url = env_or("TASKBOARD_BASE_URL", &format!("http://{host}:{port}"));

        let registration = match env_or("TASKBOARD_REGISTRATION", "open").as_str() {
            "closed" => RegistrationMode::Closed,
            _ => RegistrationMode::Open,
        };

        let storage = match env_or("TASKBOARD_UPLOAD_DIR", "storage/public").as_str() {
            ":memory:" => StorageBackend::Memory,
            dir => StorageBackend::Disk(PathBuf::from(dir)),
        };

        // Room for a maximum-size image plus the other form fields.
        let max_upload_size: usize = env_or("TASKBOARD_MAX_UPLOAD_SIZE", "8388608")
            .parse()
            .map_err(|e| format!("Invalid TASKBOARD_MAX_UPLOAD_SIZE: {e}"))?;

        let log_level = env_or("TASKBOARD_LOG_LEVEL", "info");

        Ok(Config {
            database_url,
            jwt_secret,
            host,
            port,
            base_url,
            registration,
            storage,
            max_upload_size,
            log_level,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
