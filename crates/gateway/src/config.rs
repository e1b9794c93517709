use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use rptflow_auth::{EXTERNAL_IDENTITY_PROVIDER, OidcConfig};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub backend_url: String,
    pub backend_timeout_ms: u64,
    pub reports_segment: String,
    pub reports_base: String,
    pub fail_closed_path: String,
    pub constrained_identity_provider: String,
    pub auth_mode: AuthMode,
    pub oidc: Option<OidcConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Local,
    Oidc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl GatewayConfig {
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("RPTFLOW_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let bind_addr = parse_socket_addr(
            kv.get("RPTFLOW_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            "RPTFLOW_BIND_ADDR",
        )?;

        let auth_mode = parse_auth_mode(kv.get("RPTFLOW_AUTH_MODE"))?;

        let dev_allow_nonlocal_bind =
            parse_bool(kv.get("RPTFLOW_DEV_ALLOW_NONLOCAL_BIND")).unwrap_or(false);

        if !bind_addr.ip().is_loopback() && auth_mode != AuthMode::Oidc {
            if dev_allow_nonlocal_bind && is_unspecified_ip(bind_addr.ip()) {
                // Dev-only escape hatch for local containers.
            } else {
                return Err(StartupError {
                    code: "ERR_NONLOCAL_BIND_REQUIRES_AUTH",
                    message: "non-local bind requires oidc auth mode; refuse startup".to_string(),
                });
            }
        }

        let backend_url = require_nonempty(kv, "RPTFLOW_BACKEND_URL")?;
        if !(backend_url.starts_with("http://") || backend_url.starts_with("https://")) {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "RPTFLOW_BACKEND_URL must be an http(s) URL".to_string(),
            });
        }
        let backend_url = backend_url.trim_end_matches('/').to_string();

        let backend_timeout_ms = parse_u64(
            kv.get("RPTFLOW_BACKEND_TIMEOUT_MS"),
            2000,
            "RPTFLOW_BACKEND_TIMEOUT_MS",
        )?;
        if !(1..=60_000).contains(&backend_timeout_ms) {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "RPTFLOW_BACKEND_TIMEOUT_MS must be between 1 and 60000".to_string(),
            });
        }

        let reports_segment = optional_string(kv, "RPTFLOW_REPORTS_SEGMENT", "reports");
        if reports_segment.contains('/') {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "RPTFLOW_REPORTS_SEGMENT must be a single path segment".to_string(),
            });
        }

        let reports_base = absolute_path(kv, "RPTFLOW_REPORTS_BASE", "/reports")?;
        let fail_closed_path = absolute_path(kv, "RPTFLOW_FAIL_CLOSED_PATH", "/onboarding")?;

        let constrained_identity_provider = optional_string(
            kv,
            "RPTFLOW_CONSTRAINED_IDENTITY_PROVIDER",
            EXTERNAL_IDENTITY_PROVIDER,
        );

        let oidc = if auth_mode == AuthMode::Oidc {
            Some(parse_oidc_config(kv)?)
        } else {
            None
        };

        Ok(Self {
            bind_addr,
            backend_url,
            backend_timeout_ms,
            reports_segment,
            reports_base,
            fail_closed_path,
            constrained_identity_provider,
            auth_mode,
            oidc,
        })
    }
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    parse_env_lines(&contents)
}

fn parse_env_lines(contents: &str) -> Result<HashMap<String, String>, StartupError> {
    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()));
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..bytes.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn require_nonempty(
    kv: &HashMap<String, String>,
    key: &'static str,
) -> Result<String, StartupError> {
    kv.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| StartupError {
            code: "ERR_MISSING_CONFIG",
            message: format!("missing required config key {}", key),
        })
}

fn optional_string(kv: &HashMap<String, String>, key: &str, default: &str) -> String {
    kv.get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn absolute_path(
    kv: &HashMap<String, String>,
    key: &'static str,
    default: &str,
) -> Result<String, StartupError> {
    let value = optional_string(kv, key, default);
    if !value.starts_with('/') || value.contains("://") {
        return Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an absolute path", key),
        });
    }
    Ok(value)
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, StartupError> {
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse::<SocketAddr>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a valid host:port socket address", key),
        }),
    }
}

fn parse_u64(value: Option<&String>, default: u64, key: &'static str) -> Result<u64, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u64>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_auth_mode(value: Option<&String>) -> Result<AuthMode, StartupError> {
    let mode = value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("local");

    match mode {
        "local" => Ok(AuthMode::Local),
        "oidc" => Ok(AuthMode::Oidc),
        _ => Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "RPTFLOW_AUTH_MODE must be local or oidc".to_string(),
        }),
    }
}

fn parse_oidc_config(kv: &HashMap<String, String>) -> Result<OidcConfig, StartupError> {
    let issuer = require_nonempty(kv, "RPTFLOW_OIDC_ISSUER")?;

    let jwks_json = kv
        .get("RPTFLOW_OIDC_JWKS_JSON")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    let jwks_url = kv
        .get("RPTFLOW_OIDC_JWKS_URL")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    if jwks_json.is_none() && jwks_url.is_none() {
        return Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "oidc requires RPTFLOW_OIDC_JWKS_URL or RPTFLOW_OIDC_JWKS_JSON".to_string(),
        });
    }

    let audience = kv
        .get("RPTFLOW_OIDC_AUDIENCE")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    let jwks_timeout_ms = parse_u64(
        kv.get("RPTFLOW_OIDC_JWKS_TIMEOUT_MS"),
        2000,
        "RPTFLOW_OIDC_JWKS_TIMEOUT_MS",
    )?;
    let jwks_refresh_ttl_secs = parse_u64(
        kv.get("RPTFLOW_OIDC_JWKS_REFRESH_TTL_SECS"),
        300,
        "RPTFLOW_OIDC_JWKS_REFRESH_TTL_SECS",
    )?;
    let clock_skew_secs = parse_u64(
        kv.get("RPTFLOW_OIDC_CLOCK_SKEW_SECS"),
        60,
        "RPTFLOW_OIDC_CLOCK_SKEW_SECS",
    )?;

    Ok(OidcConfig {
        issuer,
        audience,
        jwks_url,
        jwks_json,
        jwks_timeout: Duration::from_millis(jwks_timeout_ms),
        jwks_refresh_ttl: Duration::from_secs(jwks_refresh_ttl_secs),
        clock_skew: Duration::from_secs(clock_skew_secs),
        user_guid_claim: optional_string(kv, "RPTFLOW_OIDC_USER_GUID_CLAIM", "sub"),
        identity_provider_claim: optional_string(
            kv,
            "RPTFLOW_OIDC_IDENTITY_PROVIDER_CLAIM",
            "identity_provider",
        ),
    })
}

fn parse_bool(value: Option<&String>) -> Option<bool> {
    let value = value.map(|v| v.trim()).filter(|v| !v.is_empty())?;

    match value {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

fn is_unspecified_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_unspecified(),
        IpAddr::V6(v6) => v6.is_unspecified(),
    }
}
