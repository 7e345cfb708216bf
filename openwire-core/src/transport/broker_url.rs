//! Broker connection URL parsing (spec.md §6): `tcp://host:port?opt=value`,
//! `ssl://host:port?opt=value`, and `failover:(uri,uri,...)?opt=value`.
//!
//! Grounded on `hdbconnect_impl`'s `ConnectParams`/`url` modules for the
//! overall shape (an immutable parameters struct plus a `FromStr`/`TryFrom`
//! entry point), adapted to OpenWire's scheme and query-option vocabulary.

use crate::error::OpenWireError;
use secstr::SecUtf8;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportScheme {
    Tcp,
    Ssl,
}

#[derive(Debug, Clone)]
pub struct BrokerEndpoint {
    pub scheme: TransportScheme,
    pub host: String,
    pub port: u16,
}

/// Parsed `tcp://`/`ssl://` connect parameters, or a `failover:` wrapping a
/// prioritized list of them (spec.md §6 "Failover transport").
#[derive(Debug, Clone)]
pub struct BrokerUrl {
    pub endpoints: Vec<BrokerEndpoint>,
    pub is_failover: bool,
    pub user_name: Option<String>,
    pub password: Option<SecUtf8>,
    pub wire_format_options: WireFormatOptions,
    pub failover_options: FailoverOptions,
}

#[derive(Debug, Clone)]
pub struct WireFormatOptions {
    pub max_inactivity_duration: Duration,
    pub tcp_no_delay: bool,
    /// Requests tight encoding (spec.md §4.1); only takes effect if the
    /// broker also requests it, since negotiation ANDs both sides' flags.
    pub tight_encoding_enabled: bool,
}

impl Default for WireFormatOptions {
    fn default() -> Self {
        Self {
            max_inactivity_duration: Duration::from_millis(30_000),
            tcp_no_delay: true,
            tight_encoding_enabled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailoverOptions {
    pub max_reconnect_attempts: Option<u32>,
    pub initial_reconnect_delay: Duration,
    pub use_exponential_back_off: bool,
    pub randomize: bool,
}

impl Default for FailoverOptions {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: None,
            initial_reconnect_delay: Duration::from_millis(10),
            use_exponential_back_off: true,
            randomize: true,
        }
    }
}

impl FromStr for BrokerUrl {
    type Err = OpenWireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(inner) = s.strip_prefix("failover:") {
            return parse_failover(inner);
        }
        let endpoint = parse_single_endpoint(s)?;
        let url = Url::parse(s)?;
        Ok(Self {
            endpoints: vec![endpoint],
            is_failover: false,
            user_name: non_empty(url.username()),
            password: url.password().map(SecUtf8::from),
            wire_format_options: wire_format_options_from_query(&url),
            failover_options: FailoverOptions::default(),
        })
    }
}

fn parse_single_endpoint(s: &str) -> Result<BrokerEndpoint, OpenWireError> {
    let url = Url::parse(s)?;
    let scheme = match url.scheme() {
        "tcp" => TransportScheme::Tcp,
        "ssl" | "tls" => TransportScheme::Ssl,
        other => {
            return Err(OpenWireError::UrlParse(format!(
                "unsupported transport scheme: {other}"
            )))
        }
    };
    let host = url
        .host_str()
        .ok_or_else(|| OpenWireError::UrlParse("missing host".to_string()))?
        .to_string();
    let port = url.port().unwrap_or(match scheme {
        TransportScheme::Tcp => 61616,
        TransportScheme::Ssl => 61617,
    });
    Ok(BrokerEndpoint { scheme, host, port })
}

fn wire_format_options_from_query(url: &Url) -> WireFormatOptions {
    let mut options = WireFormatOptions::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "wireFormat.maxInactivityDuration" => {
                if let Ok(millis) = value.parse::<u64>() {
                    options.max_inactivity_duration = Duration::from_millis(millis);
                }
            }
            "soTcpNoDelay" | "tcpNoDelay" => {
                options.tcp_no_delay = value == "true";
            }
            "wireFormat.tightEncodingEnabled" => {
                options.tight_encoding_enabled = value == "true";
            }
            _ => {}
        }
    }
    options
}

/// `failover:(tcp://a:61616,tcp://b:61616)?randomize=false`.
fn parse_failover(inner: &str) -> Result<BrokerUrl, OpenWireError> {
    let (list, query) = match inner.split_once('?') {
        Some((l, q)) => (l, Some(q)),
        None => (inner, None),
    };
    let list = list
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(list);
    let endpoints: Vec<BrokerEndpoint> = list
        .split(',')
        .map(|part| parse_single_endpoint(part.trim()))
        .collect::<Result<_, _>>()?;
    if endpoints.is_empty() {
        return Err(OpenWireError::UrlParse(
            "failover: url has no component uris".to_string(),
        ));
    }
    let mut failover_options = FailoverOptions::default();
    if let Some(query) = query {
        for pair in query.split('&') {
            let Some((k, v)) = pair.split_once('=') else { continue };
            match k {
                "maxReconnectAttempts" => {
                    failover_options.max_reconnect_attempts = v.parse().ok();
                }
                "initialReconnectDelay" => {
                    if let Ok(millis) = v.parse::<u64>() {
                        failover_options.initial_reconnect_delay = Duration::from_millis(millis);
                    }
                }
                "useExponentialBackOff" => {
                    failover_options.use_exponential_back_off = v == "true";
                }
                "randomize" => {
                    failover_options.randomize = v == "true";
                }
                _ => {}
            }
        }
    }
    Ok(BrokerUrl {
        endpoints,
        is_failover: true,
        user_name: None,
        password: None,
        wire_format_options: WireFormatOptions::default(),
        failover_options,
    })
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_tcp_url() {
        let url: BrokerUrl = "tcp://localhost:61616".parse().unwrap();
        assert!(!url.is_failover);
        assert_eq!(url.endpoints[0].host, "localhost");
        assert_eq!(url.endpoints[0].port, 61616);
        assert_eq!(url.endpoints[0].scheme, TransportScheme::Tcp);
    }

    #[test]
    fn defaults_ssl_port_when_absent() {
        let url: BrokerUrl = "ssl://broker.example".parse().unwrap();
        assert_eq!(url.endpoints[0].port, 61617);
    }

    #[test]
    fn parses_failover_with_multiple_endpoints() {
        let url: BrokerUrl = "failover:(tcp://a:61616,tcp://b:61617)?randomize=false"
            .parse()
            .unwrap();
        assert!(url.is_failover);
        assert_eq!(url.endpoints.len(), 2);
        assert!(!url.failover_options.randomize);
    }

    #[test]
    fn rejects_unsupported_scheme() {
        assert!("http://localhost:1".parse::<BrokerUrl>().is_err());
    }
}
