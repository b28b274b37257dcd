use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_url: String,
    pub s3_endpoint: String,
    pub s3_public_endpoint: Option<String>,
    pub s3_region: String,
    pub s3_bucket: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub session_key: [u8; 32],
    pub session_ttl_minutes: u64,
    pub cookie_secure: bool,
    pub upload_max_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;

        Ok(Self {
            http_addr,
            database_url: env_or_err("DATABASE_URL")?,
            s3_endpoint: env_or_err("S3_ENDPOINT")?,
            s3_public_endpoint: std::env::var("S3_PUBLIC_ENDPOINT").ok(),
            s3_region: env_or("S3_REGION", "us-east-1"),
            s3_bucket: env_or_err("S3_BUCKET")?,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            session_key: decode_key_32("SESSION_KEY", &env_or_err("SESSION_KEY")?)?,
            session_ttl_minutes: env_or_parse("SESSION_TTL_MINUTES", "43200")?,
            cookie_secure: env_or_parse("COOKIE_SECURE", "false")?,
            upload_max_bytes: env_or_parse("UPLOAD_MAX_BYTES", "1024000")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn decode_key_32(key: &str, value: &str) -> Result<[u8; 32]> {
    let decoded = STANDARD
        .decode(value.trim().as_bytes())
        .map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    let key_bytes: [u8; 32] = decoded
        .try_into()
        .map_err(|_| anyhow!("invalid {}: expected 32 bytes", key))?;
    Ok(key_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_32_byte_key() {
        let encoded = STANDARD.encode([7u8; 32]);
        let key = decode_key_32("SESSION_KEY", &encoded).unwrap();
        assert_eq!(key, [7u8; 32]);
    }

    #[test]
    fn rejects_short_key() {
        let encoded = STANDARD.encode([7u8; 16]);
        let err = decode_key_32("SESSION_KEY", &encoded).unwrap_err();
        assert_eq!(err.to_string(), "invalid SESSION_KEY: expected 32 bytes");
    }

    #[test]
    fn rejects_non_base64_key() {
        assert!(decode_key_32("SESSION_KEY", "not base64!!").is_err());
    }
}
