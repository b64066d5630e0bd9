use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::warn;

use loreweave_api::verification::DEFAULT_CODE_TTL;

const PLACEHOLDER_SECRET: &str = "dev-secret-change-me";

/// Server settings read from `LOREWEAVE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub code_ttl: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("LOREWEAVE_JWT_SECRET").unwrap_or_else(|| PLACEHOLDER_SECRET.into());
        if jwt_secret == PLACEHOLDER_SECRET {
            warn!("LOREWEAVE_JWT_SECRET is not set, using the development placeholder");
        }

        let db_path = PathBuf::from(get("LOREWEAVE_DB_PATH").unwrap_or_else(|| "loreweave.db".into()));
        let host = get("LOREWEAVE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("LOREWEAVE_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("LOREWEAVE_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let code_ttl = match get("LOREWEAVE_CODE_TTL_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .context("LOREWEAVE_CODE_TTL_SECS must be a number of seconds")?,
            ),
            None => DEFAULT_CODE_TTL,
        };

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            code_ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.jwt_secret, PLACEHOLDER_SECRET);
        assert_eq!(c.db_path, PathBuf::from("loreweave.db"));
        assert_eq!(c.addr.port(), 3000);
        assert_eq!(c.code_ttl, DEFAULT_CODE_TTL);
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("LOREWEAVE_JWT_SECRET", "s3cret"),
            ("LOREWEAVE_HOST", "127.0.0.1"),
            ("LOREWEAVE_PORT", "8080"),
            ("LOREWEAVE_CODE_TTL_SECS", "60"),
        ])
        .unwrap();
        assert_eq!(c.jwt_secret, "s3cret");
        assert_eq!(c.addr.to_string(), "127.0.0.1:8080");
        assert_eq!(c.code_ttl, Duration::from_secs(60));
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(config(&[("LOREWEAVE_PORT", "harbour")]).is_err());
    }
}
