//! Cluster compilation.

use std::time::Duration;

use serde::Serialize;
use switchyard_core::Cluster;
use tracing::warn;

use crate::attributes::{split_list, ClusterAttribute as A, TypedAttributes};
use crate::common::{common_tls_context, CommonTlsContext, SocketAddress, TlsKeys};

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default upstream idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);
/// Default DNS refresh rate.
pub const DEFAULT_DNS_REFRESH_RATE: Duration = Duration::from_secs(5);
/// Port used for every DNS resolver.
pub const DNS_RESOLVER_PORT: u32 = 53;
/// Default health check interval.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// Default health check timeout.
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
/// Default unhealthy threshold.
pub const DEFAULT_HEALTH_CHECK_UNHEALTHY_THRESHOLD: u32 = 2;
/// Default healthy threshold.
pub const DEFAULT_HEALTH_CHECK_HEALTHY_THRESHOLD: u32 = 2;

/// Cluster discovery type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryType {
    /// Resolve the host through DNS, use the first answer.
    LogicalDns,
}

/// Address family used for DNS lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DnsLookupFamily {
    /// Either family.
    Auto,
    /// IPv4 only.
    V4Only,
    /// IPv6 only.
    V6Only,
}

impl DnsLookupFamily {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("V4_ONLY") => Self::V4Only,
            Some("V6_ONLY") => Self::V6Only,
            _ => Self::Auto,
        }
    }
}

/// Load balancing policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LbPolicy {
    /// Round robin.
    RoundRobin,
    /// Least outstanding requests.
    LeastRequest,
    /// Consistent hashing ring.
    RingHash,
    /// Random.
    Random,
    /// Maglev hashing.
    Maglev,
}

impl LbPolicy {
    fn parse(cluster: &str, value: Option<&str>) -> Self {
        match value {
            None | Some("ROUND_ROBIN") => Self::RoundRobin,
            Some("LEAST_REQUEST") => Self::LeastRequest,
            Some("RING_HASH") => Self::RingHash,
            Some("RANDOM") => Self::Random,
            Some("MAGLEV") => Self::Maglev,
            Some(other) => {
                warn!(cluster, lb_policy = other, "unknown load balancing policy");
                Self::RoundRobin
            }
        }
    }
}

/// Upstream HTTP codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodecClientType {
    /// HTTP/1.1
    Http1,
    /// HTTP/2
    Http2,
    /// HTTP/3
    Http3,
}

impl CodecClientType {
    fn parse(cluster: &str, value: Option<&str>) -> Self {
        match value {
            None | Some("HTTP/1.1") => Self::Http1,
            Some("HTTP/2") => Self::Http2,
            Some("HTTP/3") => Self::Http3,
            Some(other) => {
                warn!(cluster, http_protocol = other, "unknown HTTP protocol");
                Self::Http1
            }
        }
    }
}

/// Circuit breaker limits; unset limits use the proxy defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    /// Connection limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
    /// Pending request limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pending_requests: Option<u32>,
    /// Request limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests: Option<u32>,
    /// Retry limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

/// Active HTTP health check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    /// Request path.
    pub path: String,
    /// Host header, defaults to the cluster name on the proxy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Codec used for checks.
    pub codec_client_type: CodecClientType,
    /// Time between checks.
    pub interval: Duration,
    /// Check timeout.
    pub timeout: Duration,
    /// Failures before unhealthy.
    pub unhealthy_threshold: u32,
    /// Successes before healthy.
    pub healthy_threshold: u32,
    /// Event log file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_log_path: Option<String>,
}

/// Upstream TLS settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpstreamTlsContext {
    /// SNI sent upstream.
    pub sni: String,
    /// Shared TLS settings.
    pub common_tls_context: CommonTlsContext,
}

/// A cluster ready for the proxy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompiledCluster {
    /// Cluster name.
    pub name: String,
    /// Discovery type.
    #[serde(rename = "type")]
    pub discovery_type: DiscoveryType,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Idle timeout of upstream connections.
    pub idle_timeout: Duration,
    /// DNS refresh interval.
    pub dns_refresh_rate: Duration,
    /// DNS lookup family.
    pub dns_lookup_family: DnsLookupFamily,
    /// Custom DNS resolvers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dns_resolvers: Vec<SocketAddress>,
    /// Load balancing policy.
    pub lb_policy: LbPolicy,
    /// The single static endpoint.
    pub endpoints: Vec<SocketAddress>,
    /// Circuit breaker thresholds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breakers: Option<Thresholds>,
    /// Active health checks.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub health_checks: Vec<HealthCheck>,
    /// Upstream codec.
    pub codec: CodecClientType,
    /// Whether HTTP/2 protocol options are set.
    pub http2_protocol_options: bool,
    /// Upstream TLS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<UpstreamTlsContext>,
    /// Per-cluster stats tracking.
    pub track_cluster_stats: bool,
}

/// Compile every cluster, keeping input order.
pub fn compile_clusters(clusters: &[Cluster]) -> Vec<CompiledCluster> {
    clusters.iter().map(compile_cluster).collect()
}

/// Compile one cluster.
pub fn compile_cluster(cluster: &Cluster) -> CompiledCluster {
    let attrs = TypedAttributes::<A>::resolve(&cluster.name, &cluster.attributes);
    let codec = CodecClientType::parse(&cluster.name, attrs.get(A::HttpProtocol));

    CompiledCluster {
        name: cluster.name.clone(),
        discovery_type: DiscoveryType::LogicalDns,
        connect_timeout: attrs.get_as_duration(A::ConnectTimeout, DEFAULT_CONNECT_TIMEOUT),
        idle_timeout: attrs.get_as_duration(A::IdleTimeout, DEFAULT_IDLE_TIMEOUT),
        dns_refresh_rate: attrs.get_as_duration(A::DnsRefreshRate, DEFAULT_DNS_REFRESH_RATE),
        dns_lookup_family: DnsLookupFamily::parse(attrs.get(A::DnsLookupFamily)),
        dns_resolvers: attrs
            .get(A::DnsResolvers)
            .map(split_list)
            .unwrap_or_default()
            .into_iter()
            .map(|resolver| SocketAddress::new(resolver, DNS_RESOLVER_PORT))
            .collect(),
        lb_policy: LbPolicy::parse(&cluster.name, attrs.get(A::LbPolicy)),
        endpoints: vec![SocketAddress::new(cluster.host.clone(), cluster.port)],
        circuit_breakers: build_circuit_breakers(&attrs),
        health_checks: build_health_check(&attrs, codec).into_iter().collect(),
        codec,
        http2_protocol_options: codec == CodecClientType::Http2,
        tls: build_tls(cluster, &attrs),
        track_cluster_stats: true,
    }
}

fn build_circuit_breakers(attrs: &TypedAttributes<A>) -> Option<Thresholds> {
    let thresholds = Thresholds {
        max_connections: attrs.non_zero_u32(A::MaxConnections),
        max_pending_requests: attrs.non_zero_u32(A::MaxPendingRequests),
        max_requests: attrs.non_zero_u32(A::MaxRequests),
        max_retries: attrs.non_zero_u32(A::MaxRetries),
    };
    (thresholds != Thresholds::default()).then_some(thresholds)
}

fn build_health_check(attrs: &TypedAttributes<A>, codec: CodecClientType) -> Option<HealthCheck> {
    if attrs.get(A::HealthCheckProtocol) != Some("HTTP") {
        return None;
    }
    let path = attrs.string(A::HealthCheckPath)?;

    Some(HealthCheck {
        path,
        host: attrs.string(A::HealthCheckHostHeader),
        codec_client_type: codec,
        interval: attrs.get_as_duration(A::HealthCheckInterval, DEFAULT_HEALTH_CHECK_INTERVAL),
        timeout: attrs.get_as_duration(A::HealthCheckTimeout, DEFAULT_HEALTH_CHECK_TIMEOUT),
        unhealthy_threshold: attrs.get_as_u32(
            A::HealthCheckUnhealthyThreshold,
            DEFAULT_HEALTH_CHECK_UNHEALTHY_THRESHOLD,
        ),
        healthy_threshold: attrs.get_as_u32(
            A::HealthCheckHealthyThreshold,
            DEFAULT_HEALTH_CHECK_HEALTHY_THRESHOLD,
        ),
        event_log_path: attrs.string(A::HealthCheckLogFile),
    })
}

const TLS_KEYS: TlsKeys<A> = TlsKeys {
    minimum_version: A::TlsMinimumVersion,
    maximum_version: A::TlsMaximumVersion,
    cipher_suites: A::TlsCipherSuites,
    http_protocol: A::HttpProtocol,
    certificate: None,
};

fn build_tls(cluster: &Cluster, attrs: &TypedAttributes<A>) -> Option<UpstreamTlsContext> {
    if !attrs.is_true(A::Tls) {
        return None;
    }
    Some(UpstreamTlsContext {
        sni: attrs
            .string(A::SniHostName)
            .unwrap_or_else(|| cluster.host.clone()),
        common_tls_context: common_tls_context(attrs, &TLS_KEYS),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TlsVersion;
    use switchyard_core::{Attribute, Attributes};

    fn cluster(attributes: &[(&str, &str)]) -> Cluster {
        Cluster::new("backend", "backend.internal", 8080).with_attributes(
            attributes
                .iter()
                .map(|(name, value)| Attribute::new(*name, *value))
                .collect::<Attributes>(),
        )
    }

    #[test]
    fn test_defaults() {
        let compiled = compile_cluster(&cluster(&[]));

        assert_eq!(compiled.name, "backend");
        assert_eq!(compiled.discovery_type, DiscoveryType::LogicalDns);
        assert_eq!(compiled.connect_timeout, Duration::from_secs(5));
        assert_eq!(compiled.idle_timeout, Duration::from_secs(900));
        assert_eq!(compiled.dns_refresh_rate, Duration::from_secs(5));
        assert_eq!(compiled.dns_lookup_family, DnsLookupFamily::Auto);
        assert_eq!(compiled.lb_policy, LbPolicy::RoundRobin);
        assert_eq!(
            compiled.endpoints,
            vec![SocketAddress::new("backend.internal", 8080)]
        );
        assert!(compiled.dns_resolvers.is_empty());
        assert!(compiled.circuit_breakers.is_none());
        assert!(compiled.health_checks.is_empty());
        assert!(compiled.tls.is_none());
        assert!(!compiled.http2_protocol_options);
        assert!(compiled.track_cluster_stats);
    }

    #[test]
    fn test_timeouts_and_dns() {
        let compiled = compile_cluster(&cluster(&[
            ("ConnectTimeout", "2s"),
            ("IdleTimeout", "1m"),
            ("DNSRefreshRate", "30s"),
            ("DNSResolvers", "8.8.8.8, 1.1.1.1"),
            ("DNSLookupFamily", "V6_ONLY"),
            ("LbPolicy", "MAGLEV"),
        ]));

        assert_eq!(compiled.connect_timeout, Duration::from_secs(2));
        assert_eq!(compiled.idle_timeout, Duration::from_secs(60));
        assert_eq!(compiled.dns_refresh_rate, Duration::from_secs(30));
        assert_eq!(
            compiled.dns_resolvers,
            vec![
                SocketAddress::new("8.8.8.8", 53),
                SocketAddress::new("1.1.1.1", 53),
            ]
        );
        assert_eq!(compiled.dns_lookup_family, DnsLookupFamily::V6Only);
        assert_eq!(compiled.lb_policy, LbPolicy::Maglev);
    }

    #[test]
    fn test_unknown_lb_policy_falls_back() {
        let compiled = compile_cluster(&cluster(&[("LbPolicy", "FASTEST")]));
        assert_eq!(compiled.lb_policy, LbPolicy::RoundRobin);
    }

    #[test]
    fn test_circuit_breakers() {
        let compiled = compile_cluster(&cluster(&[
            ("MaxConnections", "100"),
            ("MaxRetries", "0"),
        ]));
        assert_eq!(
            compiled.circuit_breakers,
            Some(Thresholds {
                max_connections: Some(100),
                ..Thresholds::default()
            })
        );

        let compiled = compile_cluster(&cluster(&[("MaxRequests", "0")]));
        assert!(compiled.circuit_breakers.is_none());
    }

    #[test]
    fn test_health_check() {
        let compiled = compile_cluster(&cluster(&[
            ("HealthCheckProtocol", "HTTP"),
            ("HealthCheckPath", "/healthz"),
            ("HealthCheckInterval", "2s"),
            ("HealthCheckLogFile", "/tmp/hc.log"),
            ("HealthCheckHostHeader", "health.internal"),
            ("HTTPProtocol", "HTTP/2"),
        ]));

        let check = &compiled.health_checks[0];
        assert_eq!(check.path, "/healthz");
        assert_eq!(check.interval, Duration::from_secs(2));
        assert_eq!(check.timeout, Duration::from_secs(10));
        assert_eq!(check.unhealthy_threshold, 2);
        assert_eq!(check.healthy_threshold, 2);
        assert_eq!(check.codec_client_type, CodecClientType::Http2);
        assert_eq!(check.event_log_path.as_deref(), Some("/tmp/hc.log"));
        assert_eq!(check.host.as_deref(), Some("health.internal"));
        assert!(compiled.http2_protocol_options);
    }

    #[test]
    fn test_health_check_requires_http_and_path() {
        let compiled = compile_cluster(&cluster(&[("HealthCheckProtocol", "HTTP")]));
        assert!(compiled.health_checks.is_empty());

        let compiled = compile_cluster(&cluster(&[
            ("HealthCheckProtocol", "TCP"),
            ("HealthCheckPath", "/healthz"),
        ]));
        assert!(compiled.health_checks.is_empty());
    }

    #[test]
    fn test_upstream_tls() {
        let compiled = compile_cluster(&cluster(&[
            ("TLS", "true"),
            ("TLSMinimumVersion", "TLS1.2"),
            ("TLSCipherSuites", "ECDHE-RSA-AES128-GCM-SHA256,ECDHE-RSA-AES256-GCM-SHA384"),
        ]));

        let tls = compiled.tls.unwrap();
        assert_eq!(tls.sni, "backend.internal");
        assert_eq!(tls.common_tls_context.alpn_protocols, vec!["http/1.1"]);
        assert_eq!(
            tls.common_tls_context.tls_params.minimum_version,
            Some(TlsVersion::V1_2)
        );
        assert_eq!(tls.common_tls_context.tls_params.maximum_version, None);
        assert_eq!(tls.common_tls_context.tls_params.cipher_suites.len(), 2);
        assert!(tls.common_tls_context.tls_certificates.is_empty());
    }

    #[test]
    fn test_sni_override() {
        let compiled = compile_cluster(&cluster(&[
            ("TLS", "true"),
            ("SNIHostName", "api.example.com"),
            ("HTTPProtocol", "HTTP/2"),
        ]));
        let tls = compiled.tls.unwrap();
        assert_eq!(tls.sni, "api.example.com");
        assert_eq!(tls.common_tls_context.alpn_protocols, vec!["h2", "http/1.1"]);
    }

    #[test]
    fn test_tls_disabled_unless_true() {
        let compiled = compile_cluster(&cluster(&[("TLS", "yes")]));
        assert!(compiled.tls.is_none());
    }
}
