//! Environment variable overrides.
//!
//! Applied after the file layers and before CLI flags:
//!
//! | Variable | Effect |
//! |---|---|
//! | `CONDUIT_SERVER_<ID>_URL` | base URL of server `<id>` |
//! | `CONDUIT_ROUTING_STRATEGY` | `prefix` or `header` |
//! | `CONDUIT_TIMEOUT_SECS` | global per-call timeout |
//! | `CONDUIT_HEALTH_INTERVAL_SECS` | health poll interval |
//! | `CONDUIT_DEFAULT_TARGET` | header-strategy fallback target |

use crate::{ConduitConfig, ConfigError, Result, RoutingStrategy};

const PREFIX: &str = "CONDUIT_";
const SERVER_PREFIX: &str = "CONDUIT_SERVER_";
const URL_SUFFIX: &str = "_URL";

const ROUTING_STRATEGY: &str = "CONDUIT_ROUTING_STRATEGY";
const TIMEOUT_SECS: &str = "CONDUIT_TIMEOUT_SECS";
const HEALTH_INTERVAL_SECS: &str = "CONDUIT_HEALTH_INTERVAL_SECS";
const DEFAULT_TARGET: &str = "CONDUIT_DEFAULT_TARGET";
/// Client URL read by the CLI; not a server override.
const CLIENT_SERVER_URL: &str = "CONDUIT_SERVER_URL";

/// Name of the URL override variable for a server id.
///
/// The id is uppercased and `-`/`.` become `_`, so `code-search` maps to
/// `CONDUIT_SERVER_CODE_SEARCH_URL`.
pub fn server_url_var(id: &str) -> String {
    let normalized: String = id
        .chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    format!("{}{}{}", SERVER_PREFIX, normalized, URL_SUFFIX)
}

/// Apply `CONDUIT_*` overrides from the given variables.
///
/// Returns warnings for variables that look like overrides but match nothing
/// (e.g. a URL override for an unregistered server). Unparseable values are
/// errors.
pub fn apply_env_overrides<I, K, V>(config: &mut ConduitConfig, vars: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut warnings = Vec::new();

    for (key, value) in vars {
        let key = key.as_ref();
        let value = value.as_ref().trim();
        if !key.starts_with(PREFIX) || value.is_empty() {
            continue;
        }

        match key {
            ROUTING_STRATEGY => {
                let strategy: RoutingStrategy = value
                    .parse()
                    .map_err(|e: ConfigError| env_error(key, value, e.to_string()))?;
                gateway(config).routing_strategy = strategy;
            }
            TIMEOUT_SECS => {
                gateway(config).timeout_secs = parse_secs(key, value)?;
            }
            HEALTH_INTERVAL_SECS => {
                gateway(config).health_interval_secs = parse_secs(key, value)?;
            }
            DEFAULT_TARGET => {
                gateway(config).default_target = Some(value.to_string());
            }
            CLIENT_SERVER_URL => {}
            _ if key.starts_with(SERVER_PREFIX) && key.ends_with(URL_SUFFIX) => {
                match config
                    .servers
                    .iter_mut()
                    .find(|s| server_url_var(&s.id) == key)
                {
                    Some(entry) => entry.url = value.to_string(),
                    None => warnings.push(format!(
                        "{} does not match any configured server; ignored",
                        key
                    )),
                }
            }
            _ => {}
        }
    }

    Ok(warnings)
}

fn gateway(config: &mut ConduitConfig) -> &mut crate::GatewayConfig {
    config.gateway.get_or_insert_with(Default::default)
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    match value.parse::<u64>() {
        Ok(0) => Err(env_error(key, value, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(e) => Err(env_error(key, value, e.to_string())),
    }
}

fn env_error(key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidEnv {
        var: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DownstreamEntry;

    fn config_with_servers() -> ConduitConfig {
        let mut config = ConduitConfig::new();
        config
            .servers
            .push(DownstreamEntry::new("alpha", "http://localhost:8001"));
        config
            .servers
            .push(DownstreamEntry::new("code-search", "http://localhost:8002"));
        config
    }

    #[test]
    fn test_server_url_var() {
        assert_eq!(server_url_var("alpha"), "CONDUIT_SERVER_ALPHA_URL");
        assert_eq!(server_url_var("code-search"), "CONDUIT_SERVER_CODE_SEARCH_URL");
    }

    #[test]
    fn test_url_overrides() {
        let mut config = config_with_servers();
        let warnings = apply_env_overrides(
            &mut config,
            [
                ("CONDUIT_SERVER_ALPHA_URL", "http://alpha.internal:80"),
                ("CONDUIT_SERVER_CODE_SEARCH_URL", "http://search:9000"),
                ("CONDUIT_SERVER_GAMMA_URL", "http://gamma:1"),
            ],
        )
        .unwrap();

        assert_eq!(config.server("alpha").unwrap().url, "http://alpha.internal:80");
        assert_eq!(config.server("code-search").unwrap().url, "http://search:9000");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("CONDUIT_SERVER_GAMMA_URL"));
    }

    #[test]
    fn test_gateway_overrides() {
        let mut config = config_with_servers();
        apply_env_overrides(
            &mut config,
            [
                ("CONDUIT_ROUTING_STRATEGY", "header"),
                ("CONDUIT_TIMEOUT_SECS", "12"),
                ("CONDUIT_HEALTH_INTERVAL_SECS", "3"),
                ("CONDUIT_DEFAULT_TARGET", "alpha"),
                ("PATH", "/usr/bin"),
            ],
        )
        .unwrap();

        let gateway = config.gateway.as_ref().unwrap();
        assert_eq!(gateway.routing_strategy, RoutingStrategy::Header);
        assert_eq!(gateway.timeout_secs, 12);
        assert_eq!(gateway.health_interval_secs, 3);
        assert_eq!(gateway.default_target.as_deref(), Some("alpha"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let mut config = config_with_servers();
        let err = apply_env_overrides(&mut config, [("CONDUIT_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref var, .. } if var == "CONDUIT_TIMEOUT_SECS"));

        let err = apply_env_overrides(&mut config, [("CONDUIT_HEALTH_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));

        let err = apply_env_overrides(&mut config, [("CONDUIT_ROUTING_STRATEGY", "random")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_empty_values_ignored() {
        let mut config = config_with_servers();
        let warnings =
            apply_env_overrides(&mut config, [("CONDUIT_SERVER_ALPHA_URL", "  ")]).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(config.server("alpha").unwrap().url, "http://localhost:8001");
        assert!(config.gateway.is_none());
    }

    #[test]
    fn test_client_url_is_not_a_server_override() {
        let mut config = config_with_servers();
        let warnings =
            apply_env_overrides(&mut config, [("CONDUIT_SERVER_URL", "http://localhost:8000")])
                .unwrap();
        assert!(warnings.is_empty());
    }
}
