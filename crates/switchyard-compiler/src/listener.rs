//! Listener compilation.
//!
//! A stored listener becomes one [`CompiledListener`] bound on all
//! interfaces. Its HTTP connection manager pulls routes from the route
//! configuration named after the listener's route group, and carries the
//! filter chain built from the listener's attributes.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use switchyard_core::{Listener, Route};

use crate::attributes::{ListenerAttribute as A, TypedAttributes};
use crate::cluster::DEFAULT_CONNECT_TIMEOUT;
use crate::common::{
    common_tls_context, CommonTlsContext, GrpcService, SocketAddress, TlsKeys,
};
use crate::route::{compile_routes, CompiledRoute};

/// Address every listener binds to.
pub const LISTEN_ADDRESS: &str = "0.0.0.0";
/// Stats prefix of the connection manager.
pub const STAT_PREFIX: &str = "ingress_http";
/// Default downstream idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Default authorization call timeout.
pub const DEFAULT_EXT_AUTHZ_TIMEOUT: Duration = Duration::from_millis(10);
/// Default rate limit call timeout.
pub const DEFAULT_RATE_LIMIT_TIMEOUT: Duration = Duration::from_millis(10);
/// Default gRPC access log buffer.
pub const DEFAULT_ACCESS_LOG_BUFFER_SIZE: u32 = 16384;

/// A listener ready for the proxy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompiledListener {
    /// Stored listener name.
    pub name: String,
    /// Bind address.
    pub address: SocketAddress,
    /// Virtual hosts served.
    pub virtual_hosts: Vec<String>,
    /// Policy names.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<String>,
    /// Compiled routes of the listener's route group.
    pub routes: Vec<CompiledRoute>,
    /// The single filter chain.
    pub filter_chain: FilterChain,
}

/// Filter chain of a listener.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FilterChain {
    /// SNI match, set when downstream TLS is on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_chain_match: Option<FilterChainMatch>,
    /// HTTP connection manager.
    pub http_connection_manager: HttpConnectionManager,
    /// Downstream TLS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<DownstreamTlsContext>,
}

/// Filter chain selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FilterChainMatch {
    /// SNI names.
    pub server_names: Vec<String>,
}

/// Downstream TLS settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DownstreamTlsContext {
    /// Shared TLS settings.
    pub common_tls_context: CommonTlsContext,
}

/// Downstream codec selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodecType {
    /// Detect from the connection.
    Auto,
}

/// HTTP connection manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HttpConnectionManager {
    /// Stats prefix.
    pub stat_prefix: String,
    /// Codec.
    pub codec_type: CodecType,
    /// Trust the peer address for `x-forwarded-for`.
    pub use_remote_address: bool,
    /// `server` response header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    /// Route configuration fetched by name.
    pub route_config_name: String,
    /// HTTP filters; the router is always last.
    pub http_filters: Vec<HttpFilter>,
    /// Access logs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub access_log: Vec<AccessLog>,
    /// Downstream idle timeout.
    pub idle_timeout: Duration,
    /// HTTP/2 options.
    pub http2_protocol_options: Http2ProtocolOptions,
}

/// HTTP filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "name")]
pub enum HttpFilter {
    /// External authorization.
    #[serde(rename = "envoy.filters.http.ext_authz")]
    ExtAuthz(ExtAuthz),
    /// CORS.
    #[serde(rename = "envoy.filters.http.cors")]
    Cors,
    /// Global rate limiting.
    #[serde(rename = "envoy.filters.http.ratelimit")]
    RateLimit(RateLimit),
    /// Router.
    #[serde(rename = "envoy.filters.http.router")]
    Router,
}

impl HttpFilter {
    /// Filter name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExtAuthz(_) => "envoy.filters.http.ext_authz",
            Self::Cors => "envoy.filters.http.cors",
            Self::RateLimit(_) => "envoy.filters.http.ratelimit",
            Self::Router => "envoy.filters.http.router",
        }
    }
}

/// External authorization filter settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExtAuthz {
    /// Authorization service.
    pub grpc_service: GrpcService,
    /// Let requests through when the service fails.
    pub failure_mode_allow: bool,
    /// Body bytes forwarded to the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_request_bytes: Option<u32>,
}

/// Rate limit filter settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RateLimit {
    /// Rate limit domain.
    pub domain: String,
    /// Rate limit service.
    pub grpc_service: GrpcService,
    /// Call timeout.
    pub timeout: Duration,
    /// Let requests through when the service fails.
    pub failure_mode_allow: bool,
}

/// Access log sink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "name")]
pub enum AccessLog {
    /// JSON lines to a file.
    #[serde(rename = "envoy.access_loggers.file")]
    File {
        /// File path.
        path: String,
        /// Output field name to format string.
        json_format: BTreeMap<String, String>,
    },
    /// Stream to a gRPC access log service.
    #[serde(rename = "envoy.access_loggers.http_grpc")]
    Grpc {
        /// Log name, the listener's name.
        log_name: String,
        /// Access log service.
        grpc_service: GrpcService,
        /// Buffer before flushing.
        buffer_size_bytes: u32,
    },
}

/// HTTP/2 limits; unset values use the proxy defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Http2ProtocolOptions {
    /// Stream limit per connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_streams: Option<u32>,
    /// Connection flow control window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_connection_window_size: Option<u32>,
    /// Stream flow control window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_stream_window_size: Option<u32>,
}

/// Compile every listener, keeping input order.
pub fn compile_listeners(listeners: &[Listener], routes: &[Route]) -> Vec<CompiledListener> {
    listeners
        .iter()
        .map(|listener| compile_listener(listener, routes))
        .collect()
}

/// Compile one listener against the full route collection.
pub fn compile_listener(listener: &Listener, routes: &[Route]) -> CompiledListener {
    let attrs = TypedAttributes::<A>::resolve(&listener.name, &listener.attributes);
    let tls = build_tls(&attrs);

    CompiledListener {
        name: listener.name.clone(),
        address: SocketAddress::new(LISTEN_ADDRESS, listener.port),
        virtual_hosts: listener.virtual_hosts.clone(),
        policies: listener.policy_names().map(str::to_string).collect(),
        routes: compile_routes(&listener.route_group, routes),
        filter_chain: FilterChain {
            filter_chain_match: tls.as_ref().map(|_| FilterChainMatch {
                server_names: listener.virtual_hosts.clone(),
            }),
            http_connection_manager: build_connection_manager(listener, &attrs),
            tls,
        },
    }
}

fn build_connection_manager(
    listener: &Listener,
    attrs: &TypedAttributes<A>,
) -> HttpConnectionManager {
    HttpConnectionManager {
        stat_prefix: STAT_PREFIX.to_string(),
        codec_type: CodecType::Auto,
        use_remote_address: true,
        server_name: attrs.string(A::ServerName),
        route_config_name: listener.route_group.clone(),
        http_filters: build_http_filters(attrs),
        access_log: build_access_log(&listener.name, attrs),
        idle_timeout: attrs.get_as_duration(A::IdleTimeout, DEFAULT_IDLE_TIMEOUT),
        http2_protocol_options: Http2ProtocolOptions {
            max_concurrent_streams: attrs.non_zero_u32(A::MaxConcurrentStreams),
            initial_connection_window_size: attrs.non_zero_u32(A::InitialConnectionWindowSize),
            initial_stream_window_size: attrs.non_zero_u32(A::InitialStreamWindowSize),
        },
    }
}

fn build_http_filters(attrs: &TypedAttributes<A>) -> Vec<HttpFilter> {
    let mut filters = Vec::with_capacity(4);
    if let Some(ext_authz) = build_ext_authz(attrs) {
        filters.push(HttpFilter::ExtAuthz(ext_authz));
    }
    if attrs.is_true(A::Cors) {
        filters.push(HttpFilter::Cors);
    }
    if let Some(rate_limit) = build_rate_limit(attrs) {
        filters.push(HttpFilter::RateLimit(rate_limit));
    }
    filters.push(HttpFilter::Router);
    filters
}

fn build_ext_authz(attrs: &TypedAttributes<A>) -> Option<ExtAuthz> {
    if !attrs.is_true(A::ExtAuthz) {
        return None;
    }
    let cluster_name = attrs.string(A::ExtAuthzCluster)?;

    Some(ExtAuthz {
        grpc_service: GrpcService {
            cluster_name,
            timeout: attrs.get_as_duration(A::ExtAuthzTimeout, DEFAULT_EXT_AUTHZ_TIMEOUT),
        },
        failure_mode_allow: attrs.is_true(A::ExtAuthzFailureModeAllow),
        max_request_bytes: attrs.non_zero_u32(A::ExtAuthzRequestBodySize),
    })
}

fn build_rate_limit(attrs: &TypedAttributes<A>) -> Option<RateLimit> {
    if !attrs.is_true(A::RateLimiting) {
        return None;
    }
    let cluster_name = attrs.string(A::RateLimitingCluster)?;
    let timeout = attrs.get_as_duration(A::RateLimitingTimeout, DEFAULT_RATE_LIMIT_TIMEOUT);

    Some(RateLimit {
        domain: attrs.string(A::RateLimitingDomain).unwrap_or_default(),
        grpc_service: GrpcService {
            cluster_name,
            timeout,
        },
        timeout,
        failure_mode_allow: attrs.is_true(A::RateLimitingFailureModeAllow),
    })
}

fn build_access_log(listener: &str, attrs: &TypedAttributes<A>) -> Vec<AccessLog> {
    let mut logs = Vec::new();

    if let (Some(path), Some(fields)) = (
        attrs.string(A::AccessLogFile),
        attrs.get_non_empty(A::AccessLogFileFields),
    ) {
        logs.push(AccessLog::File {
            path,
            json_format: parse_log_fields(fields),
        });
    }

    if let Some(cluster_name) = attrs.string(A::AccessLogCluster) {
        logs.push(AccessLog::Grpc {
            log_name: listener.to_string(),
            grpc_service: GrpcService {
                cluster_name,
                timeout: DEFAULT_CONNECT_TIMEOUT,
            },
            buffer_size_bytes: attrs
                .get_as_u32(A::AccessLogClusterBufferSize, DEFAULT_ACCESS_LOG_BUFFER_SIZE),
        });
    }
    logs
}

/// Parse `field=format,...`; entries without exactly one `=` are skipped.
fn parse_log_fields(fields: &str) -> BTreeMap<String, String> {
    fields
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => {
                    Some((key.trim().to_string(), value.trim().to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

const TLS_KEYS: TlsKeys<A> = TlsKeys {
    minimum_version: A::TlsMinimumVersion,
    maximum_version: A::TlsMaximumVersion,
    cipher_suites: A::TlsCipherSuites,
    http_protocol: A::HttpProtocol,
    certificate: Some((A::TlsCertificate, A::TlsCertificateKey)),
};

fn build_tls(attrs: &TypedAttributes<A>) -> Option<DownstreamTlsContext> {
    if !attrs.is_true(A::Tls) {
        return None;
    }
    let common_tls_context = common_tls_context(attrs, &TLS_KEYS);
    if common_tls_context.tls_certificates.is_empty() {
        return None;
    }
    Some(DownstreamTlsContext { common_tls_context })
}
