use std::env;

const DEFAULT_BIND: &str = "0.0.0.0:8001";
const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: String,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            allowed_origins: Vec::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            bind: env::var("PULSE_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string()),
            allowed_origins: env::var("PULSE_ALLOWED_ORIGINS")
                .map(|value| parse_origins(&value))
                .unwrap_or_default(),
            max_body_bytes: env::var("PULSE_MAX_BODY_BYTES")
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(DEFAULT_MAX_BODY_BYTES),
        }
    }
}

fn parse_origins(value: &str) -> Vec<String> {
    let origins = value
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect::<Vec<_>>();

    if origins.iter().any(|origin| origin == "*") {
        Vec::new()
    } else {
        origins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_means_any_origin() {
        assert!(parse_origins("https://a.example, *").is_empty());
        assert_eq!(
            parse_origins(" https://a.example/ ,,http://localhost:5173"),
            vec!["https://a.example".to_string(), "http://localhost:5173".to_string()]
        );
    }
}
