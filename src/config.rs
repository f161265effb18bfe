use crate::cache::TtlPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Upstream base every cached object is pulled from
    pub origin_url: String,
    pub is_dev: bool,
    /// Manifest (.m3u8) TTL in seconds (default: 4)
    pub manifest_ttl_secs: u64,
    /// Segment (.ts) TTL in seconds (default: 60)
    pub segment_ttl_secs: u64,
    /// Sweep cadence; derived from the manifest TTL when unset
    pub sweep_interval_secs: Option<u64>,
    /// Bound on one upstream retrieval in seconds (default: 30)
    pub fetch_timeout_secs: u64,
    /// Directory holding the backing files of cached objects
    pub cache_dir: PathBuf,
    /// Root for requests that bypass the cache
    pub static_dir: PathBuf,
    /// Client signature sent upstream
    pub user_agent: String,
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode, provides sensible defaults. In PROD mode, PORT and ORIGIN_URL are required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Check if running in dev mode
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        // Port: required in prod, defaults to 2014 in dev
        let port = if is_dev {
            env::var("PORT")
                .unwrap_or_else(|_| "2014".to_string())
                .parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        // Origin URL: required in prod, defaults to a local origin in dev
        let origin_url = if is_dev {
            env::var("ORIGIN_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
        } else {
            env::var("ORIGIN_URL").map_err(|_| "ORIGIN_URL is required in production")?
        };
        validate_origin(&origin_url)?;

        let manifest_ttl_secs = parse_or("MANIFEST_TTL_SECS", 4);
        let segment_ttl_secs = parse_or("SEGMENT_TTL_SECS", 60);
        let sweep_interval_secs = env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs: &u64| *secs > 0);
        // A zero timeout would fail every fetch.
        let fetch_timeout_secs = env::var("FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .unwrap_or(30);

        let cache_dir = env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("hlscache"));
        let static_dir = env::var("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let user_agent = env::var("USER_AGENT")
            .unwrap_or_else(|_| format!("hlscache/{}", env!("CARGO_PKG_VERSION")));

        Ok(Config {
            port,
            origin_url,
            is_dev,
            manifest_ttl_secs,
            segment_ttl_secs,
            sweep_interval_secs,
            fetch_timeout_secs,
            cache_dir,
            static_dir,
            user_agent,
        })
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            manifest: Duration::from_secs(self.manifest_ttl_secs),
            segment: Duration::from_secs(self.segment_ttl_secs),
        }
    }

    /// Configured sweep cadence, or one second less than the manifest TTL
    /// (at least one second).
    pub fn sweep_interval(&self) -> Duration {
        match self.sweep_interval_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.ttl_policy().default_sweep_interval(),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn parse_or(var: &str, default: u64) -> u64 {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Only absolute http(s) origins are accepted.
fn validate_origin(origin: &str) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = Url::parse(origin).map_err(|e| format!("Invalid ORIGIN_URL '{origin}': {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(format!(
            "ORIGIN_URL scheme '{scheme}' not allowed, only http/https permitted"
        )
        .into()),
    }
}
