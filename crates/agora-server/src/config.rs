use std::path::PathBuf;

use anyhow::{Result, bail};

const PLACEHOLDER_SECRETS: &[&str] = &["", "change-me", "dev-secret-change-me", "secret"];

/// Server settings, read from `AGORA_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
    /// Base URL that blob links are built from.
    pub public_url: String,
    pub max_upload_bytes: usize,
    pub seed_channels: bool,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn flag(name: &str, default: bool) -> bool {
    match var(name).as_deref().map(str::trim) {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let dev = flag("AGORA_DEV", false);

        let jwt_secret = var("AGORA_JWT_SECRET").unwrap_or_default();
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) && !dev {
            bail!(
                "AGORA_JWT_SECRET is unset or still a placeholder. It must match the \
                 identity provider's signing secret (set AGORA_DEV=1 to run anyway)"
            );
        }
        let jwt_secret = if jwt_secret.is_empty() {
            "dev-secret-change-me".to_string()
        } else {
            jwt_secret
        };

        let host = var("AGORA_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("AGORA_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()?;

        let db_path = match var("AGORA_DB_PATH") {
            Some(p) if p.trim().is_empty() => None,
            Some(p) => Some(PathBuf::from(p)),
            None => Some(PathBuf::from("agora.db")),
        };

        let upload_dir = var("AGORA_UPLOAD_DIR")
            .unwrap_or_else(|| "./uploads".into())
            .into();
        let public_url =
            var("AGORA_PUBLIC_URL").unwrap_or_else(|| format!("http://localhost:{port}"));
        let max_upload_bytes = var("AGORA_MAX_UPLOAD_BYTES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(25 * 1024 * 1024); // 25 MB

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            upload_dir,
            public_url,
            max_upload_bytes,
            seed_channels: flag("AGORA_SEED_CHANNELS", true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_list_covers_unset_secret() {
        assert!(PLACEHOLDER_SECRETS.contains(&""));
        assert!(!PLACEHOLDER_SECRETS.contains(&"a-real-secret"));
    }
}
