//! Target resolution for inbound requests.
//!
//! Two mutually exclusive strategies, fixed at startup:
//!
//! - **prefix**: `/proxy/{target}/{rest...}` forwards `/{rest...}` to `target`.
//! - **header**: `/mcp/{rest...}` with `X-Target-MCP: {target}` forwards
//!   `/{rest...}` to `target`, falling back to the configured default target.

use std::sync::Arc;

use conduit_config::RoutingStrategy;
use reqwest::header::HeaderMap;
use thiserror::Error;

use crate::registry::Registry;

/// Base path of the prefix strategy's route.
pub const PREFIX_BASE: &str = "/proxy";

/// Base path of the header strategy's route.
pub const HEADER_BASE: &str = "/mcp";

/// Header naming the target under the header strategy.
pub const TARGET_HEADER: &str = "x-target-mcp";

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    /// Target server id.
    pub target: String,
    /// Path to request on the target, always starting with `/`.
    pub path: String,
}

/// Why a request could not be routed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// Header strategy without the routing header and without a default target.
    #[error("missing routing header '{header}'")]
    MissingHeader {
        /// Header that was expected.
        header: &'static str,
        /// Registered server ids.
        valid_targets: Vec<String>,
    },

    /// Prefix strategy with an empty target segment.
    #[error("no target server in request path")]
    MissingTarget,

    /// The named target is not registered.
    #[error("unknown target server '{target}'")]
    UnknownTarget {
        /// Requested target.
        target: String,
        /// Registered server ids.
        valid_targets: Vec<String>,
    },
}

impl RoutingError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingHeader { .. } => "missing_header",
            Self::MissingTarget => "missing_target",
            Self::UnknownTarget { .. } => "unknown_target",
        }
    }

    /// Registered ids to help the caller correct the request, if carried.
    pub fn valid_targets(&self) -> Option<&[String]> {
        match self {
            Self::MissingHeader { valid_targets, .. } | Self::UnknownTarget { valid_targets, .. } => {
                Some(valid_targets)
            }
            Self::MissingTarget => None,
        }
    }
}

/// Resolves the downstream target for a request.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    strategy: RoutingStrategy,
    registry: Arc<Registry>,
    default_target: Option<String>,
}

impl RequestRouter {
    /// Create a router for `strategy`.
    ///
    /// `default_target` only applies to the header strategy.
    pub fn new(
        strategy: RoutingStrategy,
        registry: Arc<Registry>,
        default_target: Option<String>,
    ) -> Self {
        Self {
            strategy,
            registry,
            default_target,
        }
    }

    /// The active strategy.
    pub fn strategy(&self) -> RoutingStrategy {
        self.strategy
    }

    /// Base path the active strategy's route is mounted under.
    pub fn base_path(&self) -> &'static str {
        match self.strategy {
            RoutingStrategy::Prefix => PREFIX_BASE,
            RoutingStrategy::Header => HEADER_BASE,
        }
    }

    /// Header fallback target.
    pub fn default_target(&self) -> Option<&str> {
        self.default_target.as_deref()
    }

    /// Registered ids, sorted.
    pub fn valid_targets(&self) -> Vec<String> {
        self.registry.ids()
    }

    /// Resolve `path` and `headers` to a target and downstream path.
    pub fn resolve(
        &self,
        path: &str,
        headers: &HeaderMap,
    ) -> std::result::Result<RoutingDecision, RoutingError> {
        let (target, path) = match self.strategy {
            RoutingStrategy::Prefix => split_prefix_path(path)?,
            RoutingStrategy::Header => (self.header_target(headers)?, strip_base(path, HEADER_BASE)),
        };

        if !self.registry.contains(&target) {
            return Err(RoutingError::UnknownTarget {
                target,
                valid_targets: self.valid_targets(),
            });
        }

        tracing::trace!(target = %target, path = %path, "request routed");
        Ok(RoutingDecision { target, path })
    }

    fn header_target(&self, headers: &HeaderMap) -> std::result::Result<String, RoutingError> {
        let from_header = headers
            .get(TARGET_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match (from_header, self.default_target.as_deref()) {
            (Some(target), _) => Ok(target.to_string()),
            (None, Some(default)) => Ok(default.to_string()),
            (None, None) => Err(RoutingError::MissingHeader {
                header: TARGET_HEADER,
                valid_targets: self.valid_targets(),
            }),
        }
    }
}

/// Split `/proxy/{target}/{rest}` into the target and `/{rest}`.
fn split_prefix_path(path: &str) -> std::result::Result<(String, String), RoutingError> {
    let under_base = path
        .strip_prefix(PREFIX_BASE)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or(RoutingError::MissingTarget)?;

    let (target, rest) = match under_base.split_once('/') {
        Some((target, rest)) => (target, format!("/{}", rest)),
        None => (under_base, "/".to_string()),
    };
    if target.is_empty() {
        return Err(RoutingError::MissingTarget);
    }
    Ok((target.to_string(), rest))
}

/// Strip `base` from `path`, leaving at least `/`.
fn strip_base(path: &str, base: &str) -> String {
    match path.strip_prefix(base) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DownstreamServer;
    use conduit_config::DownstreamEntry;
    use reqwest::header::HeaderValue;
    use std::time::Duration;

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::from_servers(["beta", "alpha"].iter().map(|id| {
            DownstreamServer::from_entry(
                &DownstreamEntry::new(*id, format!("http://{}.local", id)),
                Duration::from_secs(1),
            )
        })))
    }

    fn prefix_router() -> RequestRouter {
        RequestRouter::new(RoutingStrategy::Prefix, registry(), None)
    }

    fn header_router(default: Option<&str>) -> RequestRouter {
        RequestRouter::new(
            RoutingStrategy::Header,
            registry(),
            default.map(str::to_string),
        )
    }

    fn with_target(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-Target-MCP", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_prefix_resolves_target_and_rest() {
        let router = prefix_router();
        let decision = router
            .resolve("/proxy/alpha/tools/call", &HeaderMap::new())
            .unwrap();
        assert_eq!(decision.target, "alpha");
        assert_eq!(decision.path, "/tools/call");

        let decision = router.resolve("/proxy/beta", &HeaderMap::new()).unwrap();
        assert_eq!(decision.path, "/");

        let decision = router.resolve("/proxy/beta/", &HeaderMap::new()).unwrap();
        assert_eq!(decision.path, "/");
    }

    #[test]
    fn test_prefix_ignores_routing_header() {
        let decision = prefix_router()
            .resolve("/proxy/alpha/x", &with_target("beta"))
            .unwrap();
        assert_eq!(decision.target, "alpha");
    }

    #[test]
    fn test_prefix_missing_target() {
        let router = prefix_router();
        for path in ["/proxy", "/proxy/", "/proxy//tools", "/other/alpha"] {
            assert_eq!(
                router.resolve(path, &HeaderMap::new()),
                Err(RoutingError::MissingTarget),
                "path {path}"
            );
        }
    }

    #[test]
    fn test_unknown_target_lists_sorted_ids() {
        let err = prefix_router()
            .resolve("/proxy/gamma/tools", &HeaderMap::new())
            .unwrap_err();
        assert_eq!(
            err,
            RoutingError::UnknownTarget {
                target: "gamma".to_string(),
                valid_targets: vec!["alpha".to_string(), "beta".to_string()],
            }
        );
        assert_eq!(err.code(), "unknown_target");
        assert_eq!(err.valid_targets().unwrap().len(), 2);
    }

    #[test]
    fn test_header_strategy() {
        let router = header_router(None);
        let decision = router.resolve("/mcp/tools", &with_target(" beta ")).unwrap();
        assert_eq!(decision.target, "beta");
        assert_eq!(decision.path, "/tools");

        let decision = router.resolve("/mcp", &with_target("alpha")).unwrap();
        assert_eq!(decision.path, "/");
    }

    #[test]
    fn test_header_missing_without_default() {
        let err = header_router(None)
            .resolve("/mcp/tools", &HeaderMap::new())
            .unwrap_err();
        assert!(matches!(err, RoutingError::MissingHeader { header: TARGET_HEADER, .. }));

        let err = header_router(None)
            .resolve("/mcp/tools", &with_target("   "))
            .unwrap_err();
        assert_eq!(err.code(), "missing_header");
    }

    #[test]
    fn test_header_default_target() {
        let router = header_router(Some("alpha"));
        let decision = router.resolve("/mcp/tools", &HeaderMap::new()).unwrap();
        assert_eq!(decision.target, "alpha");

        // An explicit header wins over the default.
        let decision = router.resolve("/mcp/tools", &with_target("beta")).unwrap();
        assert_eq!(decision.target, "beta");
    }

    #[test]
    fn test_header_unknown_target() {
        let err = header_router(None)
            .resolve("/mcp/tools", &with_target("gamma"))
            .unwrap_err();
        assert!(matches!(err, RoutingError::UnknownTarget { .. }));
    }

    #[test]
    fn test_base_path() {
        assert_eq!(prefix_router().base_path(), "/proxy");
        assert_eq!(header_router(None).base_path(), "/mcp");
    }

    #[test]
    fn test_strip_base() {
        assert_eq!(strip_base("/mcp/a/b", "/mcp"), "/a/b");
        assert_eq!(strip_base("/mcp", "/mcp"), "/");
        assert_eq!(strip_base("/mcpx", "/mcp"), "/mcpx");
    }
}
