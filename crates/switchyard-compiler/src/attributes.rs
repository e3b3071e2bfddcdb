//! Typed attribute lookup.
//!
//! An entity's attribute bag is resolved once into `(key, value)` pairs with
//! a typed key per entity kind. Unknown names are dropped at that point, so
//! the builders only ever ask for keys that exist.

use std::fmt;
use std::time::Duration;

use switchyard_core::{parse_duration, Attributes, VALUE_TRUE};
use tracing::debug;

/// A typed attribute name.
pub trait AttributeKey: Copy + Eq + fmt::Debug + 'static {
    /// Key for an attribute name, `None` when unknown.
    fn from_name(name: &str) -> Option<Self>;

    /// The attribute name.
    fn as_str(&self) -> &'static str;
}

macro_rules! attribute_keys {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every key.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];
        }

        impl AttributeKey for $name {
            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( $text => Some(Self::$variant), )+
                    _ => None,
                }
            }

            fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

attribute_keys! {
    /// Attributes understood on routes.
    pub enum RouteAttribute {
        /// Upstream cluster.
        Cluster => "Cluster",
        /// `name:weight,...` upstream split.
        WeightedClusters => "WeightedClusters",
        /// `"true"` keeps the listener's authorization filter active.
        ExtAuthz => "ExtAuthz",
        /// Inline response status.
        DirectResponseStatusCode => "DirectResponseStatusCode",
        /// Inline response body.
        DirectResponseBody => "DirectResponseBody",
        /// Redirect status.
        RedirectStatusCode => "RedirectStatusCode",
        /// Redirect scheme.
        RedirectScheme => "RedirectScheme",
        /// Redirect host.
        RedirectHostName => "RedirectHostName",
        /// Redirect port.
        RedirectPort => "RedirectPort",
        /// Redirect path.
        RedirectPath => "RedirectPath",
        /// `"true"` drops the query string on redirect.
        RedirectStripQuery => "RedirectStripQuery",
        /// Path prefix rewrite.
        PrefixRewrite => "PrefixRewrite",
        /// Upstream host header.
        HostHeader => "HostHeader",
        /// Upstream request timeout.
        Timeout => "Timeout",
        /// CORS credentials.
        CorsAllowCredentials => "CORSAllowCredentials",
        /// CORS methods.
        CorsAllowMethods => "CORSAllowMethods",
        /// CORS request headers.
        CorsAllowHeaders => "CORSAllowHeaders",
        /// CORS response headers.
        CorsExposeHeaders => "CORSExposeHeaders",
        /// CORS preflight cache time.
        CorsMaxAge => "CORSMaxAge",
        /// Extra upstream header, slot 1.
        RequestHeaderToAdd1 => "RequestHeaderToAdd1",
        /// Extra upstream header, slot 2.
        RequestHeaderToAdd2 => "RequestHeaderToAdd2",
        /// Extra upstream header, slot 3.
        RequestHeaderToAdd3 => "RequestHeaderToAdd3",
        /// Extra upstream header, slot 4.
        RequestHeaderToAdd4 => "RequestHeaderToAdd4",
        /// Extra upstream header, slot 5.
        RequestHeaderToAdd5 => "RequestHeaderToAdd5",
        /// Headers stripped before forwarding.
        RequestHeadersToRemove => "RequestHeadersToRemove",
        /// `user:password` for upstream basic auth.
        BasicAuth => "BasicAuth",
        /// Retry conditions.
        RetryOn => "RetryOn",
        /// Per-attempt timeout.
        PerTryTimeout => "PerTryTimeout",
        /// Retry count.
        NumRetries => "NumRetries",
        /// Retriable status codes.
        RetryOnStatusCodes => "RetryOnStatusCodes",
        /// Shadow traffic cluster.
        RequestMirrorCluster => "RequestMirrorCluster",
        /// Shadow traffic percentage.
        RequestMirrorPercentage => "RequestMirrorPercentage",
    }
}

impl RouteAttribute {
    /// The five header slots, in order.
    pub const HEADER_SLOTS: [RouteAttribute; 5] = [
        Self::RequestHeaderToAdd1,
        Self::RequestHeaderToAdd2,
        Self::RequestHeaderToAdd3,
        Self::RequestHeaderToAdd4,
        Self::RequestHeaderToAdd5,
    ];
}

attribute_keys! {
    /// Attributes understood on clusters.
    pub enum ClusterAttribute {
        /// Connect timeout.
        ConnectTimeout => "ConnectTimeout",
        /// Upstream connection idle timeout.
        IdleTimeout => "IdleTimeout",
        /// DNS refresh interval.
        DnsRefreshRate => "DNSRefreshRate",
        /// Comma separated resolver addresses.
        DnsResolvers => "DNSResolvers",
        /// `V4_ONLY`, `V6_ONLY` or `AUTO`.
        DnsLookupFamily => "DNSLookupFamily",
        /// Load balancing policy.
        LbPolicy => "LbPolicy",
        /// Circuit breaker connection limit.
        MaxConnections => "MaxConnections",
        /// Circuit breaker pending request limit.
        MaxPendingRequests => "MaxPendingRequests",
        /// Circuit breaker request limit.
        MaxRequests => "MaxRequests",
        /// Circuit breaker retry limit.
        MaxRetries => "MaxRetries",
        /// `HTTP` enables active health checks.
        HealthCheckProtocol => "HealthCheckProtocol",
        /// Health check request path.
        HealthCheckPath => "HealthCheckPath",
        /// Health check interval.
        HealthCheckInterval => "HealthCheckInterval",
        /// Health check timeout.
        HealthCheckTimeout => "HealthCheckTimeout",
        /// Failures before a host is unhealthy.
        HealthCheckUnhealthyThreshold => "HealthCheckUnhealthyThreshold",
        /// Successes before a host is healthy.
        HealthCheckHealthyThreshold => "HealthCheckHealthyThreshold",
        /// Health check event log path.
        HealthCheckLogFile => "HealthCheckLogFile",
        /// Host header sent with health checks.
        HealthCheckHostHeader => "HealthCheckHostHeader",
        /// Upstream protocol.
        HttpProtocol => "HTTPProtocol",
        /// `"true"` enables upstream TLS.
        Tls => "TLS",
        /// SNI name, defaults to the host.
        SniHostName => "SNIHostName",
        /// Lowest accepted TLS version.
        TlsMinimumVersion => "TLSMinimumVersion",
        /// Highest accepted TLS version.
        TlsMaximumVersion => "TLSMaximumVersion",
        /// Comma separated cipher suites.
        TlsCipherSuites => "TLSCipherSuites",
    }
}

attribute_keys! {
    /// Attributes understood on listeners.
    pub enum ListenerAttribute {
        /// Server header value.
        ServerName => "ServerName",
        /// `"true"` enables the external authorization filter.
        ExtAuthz => "ExtAuthz",
        /// Authorization service cluster.
        ExtAuthzCluster => "ExtAuthzCluster",
        /// Authorization call timeout.
        ExtAuthzTimeout => "ExtAuthzTimeout",
        /// `"true"` lets requests through when authorization fails.
        ExtAuthzFailureModeAllow => "ExtAuthzFailureModeAllow",
        /// Request body bytes forwarded to authorization.
        ExtAuthzRequestBodySize => "ExtAuthzRequestBodySize",
        /// `"true"` enables the CORS filter.
        Cors => "CORS",
        /// `"true"` enables the rate limit filter.
        RateLimiting => "RateLimiting",
        /// Rate limit service cluster.
        RateLimitingCluster => "RateLimitingCluster",
        /// Rate limit call timeout.
        RateLimitingTimeout => "RateLimitingTimeout",
        /// Rate limit domain.
        RateLimitingDomain => "RateLimitingDomain",
        /// `"true"` lets requests through when the rate limiter fails.
        RateLimitingFailureModeAllow => "RateLimitingFailureModeAllow",
        /// Access log file path.
        AccessLogFile => "AccessLogFile",
        /// `key=format,...` JSON access log fields.
        AccessLogFileFields => "AccessLogFileFields",
        /// gRPC access log cluster.
        AccessLogCluster => "AccessLogCluster",
        /// gRPC access log buffer size.
        AccessLogClusterBufferSize => "AccessLogClusterBufferSize",
        /// HTTP/2 stream limit.
        MaxConcurrentStreams => "MaxConcurrentStreams",
        /// HTTP/2 connection window.
        InitialConnectionWindowSize => "InitialConnectionWindowSize",
        /// HTTP/2 stream window.
        InitialStreamWindowSize => "InitialStreamWindowSize",
        /// Downstream connection idle timeout.
        IdleTimeout => "IdleTimeout",
        /// `"true"` enables downstream TLS.
        Tls => "TLS",
        /// PEM certificate chain.
        TlsCertificate => "TLSCertificate",
        /// PEM private key.
        TlsCertificateKey => "TLSCertificateKey",
        /// Lowest accepted TLS version.
        TlsMinimumVersion => "TLSMinimumVersion",
        /// Highest accepted TLS version.
        TlsMaximumVersion => "TLSMaximumVersion",
        /// Comma separated cipher suites.
        TlsCipherSuites => "TLSCipherSuites",
        /// Downstream protocol, drives ALPN.
        HttpProtocol => "HTTPProtocol",
    }
}

/// An attribute bag resolved against one key type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypedAttributes<K> {
    values: Vec<(K, String)>,
}

impl<K: AttributeKey> TypedAttributes<K> {
    /// Resolve `attributes` of the entity `owner`. Later duplicates of a key
    /// are ignored.
    pub fn resolve(owner: &str, attributes: &Attributes) -> Self {
        let mut values: Vec<(K, String)> = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            match K::from_name(&attribute.name) {
                Some(key) if values.iter().all(|(k, _)| *k != key) => {
                    values.push((key, attribute.value.clone()));
                }
                Some(_) => {}
                None => debug!(
                    entity = owner,
                    attribute = %attribute.name,
                    "ignoring unknown attribute"
                ),
            }
        }
        Self { values }
    }

    /// Raw value of `key`.
    pub fn get(&self, key: K) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of `key` when present and not empty.
    pub fn get_non_empty(&self, key: K) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Value of `key` as an owned string when present and not empty.
    pub fn string(&self, key: K) -> Option<String> {
        self.get_non_empty(key).map(str::to_string)
    }

    /// Value of `key` as `u32`, `default` when absent or unparsable.
    pub fn get_as_u32(&self, key: K, default: u32) -> u32 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Non-zero value of `key` as `u32`.
    pub fn non_zero_u32(&self, key: K) -> Option<u32> {
        Some(self.get_as_u32(key, 0)).filter(|v| *v != 0)
    }

    /// Value of `key` as a duration, `default` when absent or unparsable.
    pub fn get_as_duration(&self, key: K, default: Duration) -> Duration {
        self.get(key).and_then(parse_duration).unwrap_or(default)
    }

    /// Whether `key` is exactly `"true"`.
    pub fn is_true(&self, key: K) -> bool {
        self.get(key) == Some(VALUE_TRUE)
    }

    /// Number of recognized attributes.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no attribute was recognized.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Split a comma separated list, trimming entries and dropping empty ones.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
