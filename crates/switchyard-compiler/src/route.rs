//! Route compilation.
//!
//! Each route in a route group becomes one [`CompiledRoute`]: a path match,
//! exactly one action and a set of independent policies. A route without a
//! usable match or action is left out of the group instead of failing it.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use switchyard_core::{PathType, Route};
use tracing::{debug, warn};

use crate::attributes::{split_list, RouteAttribute as A, TypedAttributes};
use crate::common::RegexMatcher;

/// Upstream timeout when `Timeout` is set but unparsable.
pub const DEFAULT_ROUTE_TIMEOUT: Duration = Duration::from_secs(20);

/// Retry count when `NumRetries` is absent.
pub const DEFAULT_NUM_RETRIES: u32 = 2;

/// Per-attempt timeout when `PerTryTimeout` is absent.
pub const DEFAULT_PER_TRY_TIMEOUT: Duration = Duration::from_millis(500);

/// Retriable status codes when `RetryOnStatusCodes` is absent.
pub const DEFAULT_RETRY_STATUS_CODES: &str = "500,503,504";

/// Host predicate added to every retry policy.
pub const RETRY_HOST_PREDICATE_PREVIOUS_HOSTS: &str = "envoy.retry_host_predicates.previous_hosts";

/// Header carrying upstream credentials.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// How the request path is matched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMatch {
    /// Whole path equals.
    Path(String),
    /// Path starts with.
    Prefix(String),
    /// Path matches a regular expression.
    SafeRegex(RegexMatcher),
}

impl PathMatch {
    /// Match for a stored route, `None` for an unknown path type.
    pub fn for_route(route: &Route) -> Option<Self> {
        match &route.path_type {
            PathType::Exact => Some(Self::Path(route.path.clone())),
            PathType::Prefix => Some(Self::Prefix(route.path.clone())),
            PathType::Regex => Some(Self::SafeRegex(RegexMatcher::re2(route.path.clone()))),
            PathType::Unknown(_) => None,
        }
    }
}

/// A route ready to be placed in a virtual host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompiledRoute {
    /// Stored route name.
    pub name: String,
    /// Path match.
    #[serde(rename = "match")]
    pub path_match: PathMatch,
    /// What to do with a matching request.
    pub action: RouteAction,
    /// CORS policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsPolicy>,
    /// Retry policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    /// Shadow traffic policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_mirror_policy: Option<RequestMirrorPolicy>,
    /// Headers added before forwarding, sorted by key.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_headers_to_add: Vec<HeaderValue>,
    /// Headers stripped before forwarding.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_headers_to_remove: Vec<String>,
    /// Per-route authorization override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authz: Option<AuthzOverride>,
}

/// Route action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAction {
    /// Proxy to one or more clusters.
    Route(ForwardAction),
    /// Answer inline.
    DirectResponse(DirectResponse),
    /// Answer with a redirect.
    Redirect(RedirectAction),
}

/// Where forwarded traffic goes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Upstream {
    /// A single cluster.
    Cluster(String),
    /// A weighted split.
    WeightedClusters(WeightedClusters),
}

/// Forwarding to upstream clusters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ForwardAction {
    /// Target clusters.
    #[serde(flatten)]
    pub upstream: Upstream,
    /// Replacement for the matched prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_rewrite: Option<String>,
    /// Literal host header sent upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_rewrite_literal: Option<String>,
    /// Upstream request timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

/// One cluster of a weighted split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClusterWeight {
    /// Cluster name.
    pub name: String,
    /// Relative weight.
    pub weight: u32,
}

/// Weighted upstream split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WeightedClusters {
    /// Clusters in attribute order.
    pub clusters: Vec<ClusterWeight>,
    /// Sum of all weights.
    pub total_weight: u32,
}

impl WeightedClusters {
    /// Parse `name:weight,...`. Entries without a name or a parsable
    /// weight are dropped. `None` when no entry survives, or when the
    /// weights sum to zero or overflow `u32`.
    pub fn parse(value: &str) -> Option<Self> {
        let clusters: Vec<ClusterWeight> = value
            .split(',')
            .filter_map(|entry| {
                let (name, weight) = entry.split_once(':')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                let weight = weight.trim().parse().ok()?;
                Some(ClusterWeight {
                    name: name.to_string(),
                    weight,
                })
            })
            .collect();

        let total_weight = clusters
            .iter()
            .try_fold(0u32, |acc, c| acc.checked_add(c.weight))?;
        if total_weight == 0 {
            return None;
        }
        Some(Self {
            clusters,
            total_weight,
        })
    }
}

/// Inline response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DirectResponse {
    /// HTTP status.
    pub status: u32,
    /// Inline body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Redirect status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedirectResponseCode {
    /// 301
    MovedPermanently,
    /// 302
    Found,
    /// 303
    SeeOther,
    /// 307
    TemporaryRedirect,
    /// 308
    PermanentRedirect,
}

impl RedirectResponseCode {
    /// Code for an HTTP status, `None` when not a redirect we emit.
    pub fn from_status(status: &str) -> Option<Self> {
        match status.trim() {
            "301" => Some(Self::MovedPermanently),
            "302" => Some(Self::Found),
            "303" => Some(Self::SeeOther),
            "307" => Some(Self::TemporaryRedirect),
            "308" => Some(Self::PermanentRedirect),
            _ => None,
        }
    }
}

/// Redirect response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RedirectAction {
    /// Status sent.
    pub response_code: RedirectResponseCode,
    /// New scheme.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme_redirect: Option<String>,
    /// New host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_redirect: Option<String>,
    /// New port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_redirect: Option<u32>,
    /// New path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_redirect: Option<String>,
    /// Drop the query string.
    pub strip_query: bool,
}

/// CORS policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CorsPolicy {
    /// Allowed origins.
    pub allow_origin_string_match: Vec<RegexMatcher>,
    /// `Access-Control-Allow-Methods`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_methods: Option<String>,
    /// `Access-Control-Allow-Headers`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_headers: Option<String>,
    /// `Access-Control-Expose-Headers`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expose_headers: Option<String>,
    /// `Access-Control-Max-Age`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<String>,
    /// `Access-Control-Allow-Credentials`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<bool>,
}

/// Retry policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    /// Retry conditions.
    pub retry_on: String,
    /// Attempts after the first.
    pub num_retries: u32,
    /// Timeout per attempt.
    pub per_try_timeout: Duration,
    /// Status codes treated as retriable.
    pub retriable_status_codes: Vec<u32>,
    /// Host predicates.
    pub retry_host_predicate: Vec<String>,
}

/// Denominator of a fractional percentage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FractionDenominator {
    /// Parts per hundred.
    Hundred,
}

/// `numerator / denominator`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FractionalPercent {
    /// Numerator.
    pub numerator: u32,
    /// Denominator.
    pub denominator: FractionDenominator,
}

/// Shadow a fraction of traffic to another cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RequestMirrorPolicy {
    /// Shadow cluster.
    pub cluster: String,
    /// Share of requests mirrored.
    pub runtime_fraction: FractionalPercent,
}

/// A header to add.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HeaderValue {
    /// Header name.
    pub key: String,
    /// Header value.
    pub value: String,
}

/// Per-route external authorization override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthzOverride {
    /// Skip the listener's authorization filter.
    Disabled,
}

/// Compile the routes of `route_group`, keeping input order.
pub fn compile_routes(route_group: &str, routes: &[Route]) -> Vec<CompiledRoute> {
    routes
        .iter()
        .filter(|route| route.route_group == route_group)
        .filter_map(compile_route)
        .collect()
}

/// Compile one route. `None` when it has no usable match or action.
pub fn compile_route(route: &Route) -> Option<CompiledRoute> {
    let Some(path_match) = PathMatch::for_route(route) else {
        warn!(
            route = %route.name,
            path_type = %route.path_type,
            "unknown path type, route skipped"
        );
        return None;
    };

    let attrs = TypedAttributes::<A>::resolve(&route.name, &route.attributes);
    let Some(action) = build_action(&attrs) else {
        debug!(route = %route.name, "no action derivable, route skipped");
        return None;
    };

    Some(CompiledRoute {
        name: route.name.clone(),
        path_match,
        action,
        cors: build_cors_policy(&attrs),
        retry_policy: build_retry_policy(&attrs),
        request_mirror_policy: build_request_mirror_policy(&attrs),
        request_headers_to_add: build_headers_to_add(&attrs),
        request_headers_to_remove: build_headers_to_remove(&attrs),
        authz: build_authz_override(&attrs),
    })
}

fn build_action(attrs: &TypedAttributes<A>) -> Option<RouteAction> {
    if let Some(direct) = build_direct_response(attrs) {
        return Some(RouteAction::DirectResponse(direct));
    }
    if let Some(weighted) = attrs.get(A::WeightedClusters).and_then(WeightedClusters::parse) {
        return Some(RouteAction::Route(forward(
            attrs,
            Upstream::WeightedClusters(weighted),
        )));
    }
    if let Some(redirect) = build_redirect(attrs) {
        return Some(RouteAction::Redirect(redirect));
    }
    attrs
        .string(A::Cluster)
        .map(|cluster| RouteAction::Route(forward(attrs, Upstream::Cluster(cluster))))
}

fn forward(attrs: &TypedAttributes<A>, upstream: Upstream) -> ForwardAction {
    ForwardAction {
        upstream,
        prefix_rewrite: attrs.string(A::PrefixRewrite),
        host_rewrite_literal: attrs.string(A::HostHeader),
        timeout: attrs
            .get(A::Timeout)
            .map(|_| attrs.get_as_duration(A::Timeout, DEFAULT_ROUTE_TIMEOUT)),
    }
}

fn build_direct_response(attrs: &TypedAttributes<A>) -> Option<DirectResponse> {
    let status = attrs.get_as_u32(A::DirectResponseStatusCode, 0);
    if !(1..=999).contains(&status) {
        return None;
    }
    Some(DirectResponse {
        status,
        body: attrs.string(A::DirectResponseBody),
    })
}

fn build_redirect(attrs: &TypedAttributes<A>) -> Option<RedirectAction> {
    let response_code = attrs
        .get(A::RedirectStatusCode)
        .and_then(RedirectResponseCode::from_status)?;

    Some(RedirectAction {
        response_code,
        scheme_redirect: attrs.string(A::RedirectScheme),
        host_redirect: attrs.string(A::RedirectHostName),
        port_redirect: attrs.non_zero_u32(A::RedirectPort),
        path_redirect: attrs.string(A::RedirectPath),
        strip_query: attrs.is_true(A::RedirectStripQuery),
    })
}

fn build_cors_policy(attrs: &TypedAttributes<A>) -> Option<CorsPolicy> {
    let policy = CorsPolicy {
        allow_origin_string_match: vec![RegexMatcher::re2(".")],
        allow_methods: attrs.string(A::CorsAllowMethods),
        allow_headers: attrs.string(A::CorsAllowHeaders),
        expose_headers: attrs.string(A::CorsExposeHeaders),
        max_age: attrs.string(A::CorsMaxAge),
        allow_credentials: attrs.is_true(A::CorsAllowCredentials).then_some(true),
    };

    let configured = policy.allow_methods.is_some()
        || policy.allow_headers.is_some()
        || policy.expose_headers.is_some()
        || policy.max_age.is_some()
        || policy.allow_credentials.is_some();
    configured.then_some(policy)
}

fn build_retry_policy(attrs: &TypedAttributes<A>) -> Option<RetryPolicy> {
    let retry_on = attrs.string(A::RetryOn)?;
    let status_codes = attrs
        .get(A::RetryOnStatusCodes)
        .unwrap_or(DEFAULT_RETRY_STATUS_CODES);

    Some(RetryPolicy {
        retry_on,
        num_retries: attrs.get_as_u32(A::NumRetries, DEFAULT_NUM_RETRIES),
        per_try_timeout: attrs.get_as_duration(A::PerTryTimeout, DEFAULT_PER_TRY_TIMEOUT),
        retriable_status_codes: parse_status_codes(status_codes).unwrap_or_default(),
        retry_host_predicate: vec![RETRY_HOST_PREDICATE_PREVIOUS_HOSTS.to_string()],
    })
}

fn build_request_mirror_policy(attrs: &TypedAttributes<A>) -> Option<RequestMirrorPolicy> {
    let cluster = attrs.string(A::RequestMirrorCluster)?;
    let percentage: i64 = attrs.get(A::RequestMirrorPercentage)?.trim().parse().ok()?;
    let numerator = u32::try_from(percentage).ok().filter(|p| *p <= 100)?;

    Some(RequestMirrorPolicy {
        cluster,
        runtime_fraction: FractionalPercent {
            numerator,
            denominator: FractionDenominator::Hundred,
        },
    })
}

fn build_headers_to_add(attrs: &TypedAttributes<A>) -> Vec<HeaderValue> {
    let mut headers = BTreeMap::new();
    for slot in A::HEADER_SLOTS {
        if let Some((key, value)) = attrs.get(slot).and_then(|v| v.split_once('=')) {
            headers.insert(key.to_string(), value.to_string());
        }
    }
    if let Some(credentials) = attrs.get_non_empty(A::BasicAuth) {
        headers.insert(
            AUTHORIZATION_HEADER.to_string(),
            format!("Basic {}", STANDARD.encode(credentials)),
        );
    }

    headers
        .into_iter()
        .map(|(key, value)| HeaderValue { key, value })
        .collect()
}

fn build_headers_to_remove(attrs: &TypedAttributes<A>) -> Vec<String> {
    let mut headers = Vec::new();
    if attrs.is_true(A::ExtAuthz) {
        headers.push(AUTHORIZATION_HEADER.to_string());
    }
    if let Some(list) = attrs.get(A::RequestHeadersToRemove) {
        headers.extend(split_list(list));
    }
    headers
}

fn build_authz_override(attrs: &TypedAttributes<A>) -> Option<AuthzOverride> {
    if attrs.is_true(A::ExtAuthz) {
        None
    } else {
        Some(AuthzOverride::Disabled)
    }
}

/// Parse a comma separated status code list. Tokens that are not integers
/// are dropped; `None` when nothing parses.
pub fn parse_status_codes(value: &str) -> Option<Vec<u32>> {
    let codes: Vec<u32> = value
        .split(',')
        .filter_map(|token| token.trim().parse().ok())
        .collect();
    (!codes.is_empty()).then_some(codes)
}
