//! Building blocks shared by clusters, routes and listeners.

use std::time::Duration;

use serde::Serialize;

use crate::attributes::{split_list, AttributeKey, TypedAttributes};

/// Regex programs larger than this are rejected by the proxy.
pub const REGEX_MAX_PROGRAM_SIZE: u32 = 100;

/// Regex engine settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegexEngine {
    /// RE2 with a bounded program size.
    GoogleRe2 {
        /// Largest accepted compiled program.
        max_program_size: u32,
    },
}

/// A safe regular expression.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegexMatcher {
    /// The expression.
    pub regex: String,
    /// Engine settings; `None` leaves the proxy default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<RegexEngine>,
}

impl RegexMatcher {
    /// RE2 matcher with the bounded program size.
    pub fn re2(regex: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            engine: Some(RegexEngine::GoogleRe2 {
                max_program_size: REGEX_MAX_PROGRAM_SIZE,
            }),
        }
    }

    /// Matcher without engine settings.
    pub fn plain(regex: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            engine: None,
        }
    }
}

/// TCP socket address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SocketAddress {
    /// Host name or IP.
    pub address: String,
    /// Port.
    pub port: u32,
}

impl SocketAddress {
    /// Create an address.
    pub fn new(address: impl Into<String>, port: u32) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

/// A gRPC service reached through a cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GrpcService {
    /// Cluster serving the service.
    pub cluster_name: String,
    /// Call timeout.
    pub timeout: Duration,
}

/// TLS protocol version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TlsVersion {
    /// Let the proxy decide.
    #[serde(rename = "TLS_AUTO")]
    Auto,
    /// TLS 1.0.
    #[serde(rename = "TLSv1_0")]
    V1_0,
    /// TLS 1.1.
    #[serde(rename = "TLSv1_1")]
    V1_1,
    /// TLS 1.2.
    #[serde(rename = "TLSv1_2")]
    V1_2,
    /// TLS 1.3.
    #[serde(rename = "TLSv1_3")]
    V1_3,
}

impl TlsVersion {
    /// Parse `TLS1.0` .. `TLS1.3`; anything else is [`TlsVersion::Auto`].
    pub fn parse(value: &str) -> Self {
        match value {
            "TLS1.0" => Self::V1_0,
            "TLS1.1" => Self::V1_1,
            "TLS1.2" => Self::V1_2,
            "TLS1.3" => Self::V1_3,
            _ => Self::Auto,
        }
    }
}

/// TLS version range and ciphers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TlsParameters {
    /// Lowest accepted version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_version: Option<TlsVersion>,
    /// Highest accepted version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_version: Option<TlsVersion>,
    /// Cipher suites, empty for the proxy default.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cipher_suites: Vec<String>,
}

/// Inline certificate and key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TlsCertificate {
    /// PEM certificate chain.
    pub certificate_chain: String,
    /// PEM private key.
    pub private_key: String,
}

/// TLS settings common to upstream and downstream contexts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommonTlsContext {
    /// ALPN protocols offered.
    pub alpn_protocols: Vec<String>,
    /// Versions and ciphers.
    pub tls_params: TlsParameters,
    /// Certificates presented.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tls_certificates: Vec<TlsCertificate>,
}

/// The keys a TLS context is read from, per entity kind.
pub(crate) struct TlsKeys<K> {
    pub minimum_version: K,
    pub maximum_version: K,
    pub cipher_suites: K,
    pub http_protocol: K,
    pub certificate: Option<(K, K)>,
}

pub(crate) const ALPN_HTTP11: &str = "http/1.1";
pub(crate) const ALPN_HTTP2: &str = "h2";

/// ALPN protocols for an `HTTPProtocol` value.
pub(crate) fn alpn_protocols(http_protocol: Option<&str>) -> Vec<String> {
    match http_protocol {
        Some("HTTP/2") => vec![ALPN_HTTP2.to_string(), ALPN_HTTP11.to_string()],
        _ => vec![ALPN_HTTP11.to_string()],
    }
}

pub(crate) fn common_tls_context<K: AttributeKey>(
    attrs: &TypedAttributes<K>,
    keys: &TlsKeys<K>,
) -> CommonTlsContext {
    let tls_params = TlsParameters {
        minimum_version: attrs.get(keys.minimum_version).map(TlsVersion::parse),
        maximum_version: attrs.get(keys.maximum_version).map(TlsVersion::parse),
        cipher_suites: attrs
            .get(keys.cipher_suites)
            .map(split_list)
            .unwrap_or_default(),
    };

    let tls_certificates = keys
        .certificate
        .and_then(|(cert, key)| Some((attrs.get(cert)?, attrs.get(key)?)))
        .map(|(certificate_chain, private_key)| {
            vec![TlsCertificate {
                certificate_chain: certificate_chain.to_string(),
                private_key: private_key.to_string(),
            }]
        })
        .unwrap_or_default();

    CommonTlsContext {
        alpn_protocols: alpn_protocols(attrs.get(keys.http_protocol)),
        tls_params,
        tls_certificates,
    }
}
