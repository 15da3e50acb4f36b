use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use ipnet::IpNet;

/// Default maximum time to serve a single HTTP request
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(15);
/// Default maximum time to wait on a graceful shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the provisioning server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Shared secret between the operator and the device
    pub secret: String,
    /// Address and port to listen on
    pub listen_addr: SocketAddr,
    /// Source networks the operator may connect from
    pub allowed_nets: Vec<IpNet>,
    /// Host name handed back to the operator at commit time
    pub hostname: String,
    /// Maximum time to serve a single HTTP request
    pub request_deadline: Duration,
    /// Maximum time to wait on a graceful shutdown
    pub shutdown_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed address: {0}")]
    MalformedAddress(String),
}

/// Parse a list of allowed source addresses in CIDR format.
///
/// An address without a subnet mask defaults to `/32` (IPv4) or `/128`
/// (IPv6).
pub fn parse_allow_list(addresses: &[String]) -> Result<Vec<IpNet>, ConfigError> {
    addresses
        .iter()
        .map(|addr| {
            if addr.contains('/') {
                addr.parse()
                    .map_err(|_| ConfigError::MalformedAddress(addr.clone()))
            } else {
                addr.parse::<IpAddr>()
                    .map(IpNet::from)
                    .map_err(|_| ConfigError::MalformedAddress(addr.clone()))
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(addrs: &[&str]) -> Result<Vec<IpNet>, ConfigError> {
        parse_allow_list(&addrs.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn test_parse_allow_list() {
        let nets = parse(&["127.0.0.1/25", "10.0.0.1"]).unwrap();
        assert_eq!(nets.len(), 2);
        assert_eq!(nets[1].prefix_len(), 32);
        assert!(nets[0].contains(&"127.0.0.12".parse::<IpAddr>().unwrap()));
        assert!(!nets[0].contains(&"127.0.0.128".parse::<IpAddr>().unwrap()));

        let nets = parse(&["::1"]).unwrap();
        assert_eq!(nets[0].prefix_len(), 128);
    }

    #[test]
    fn test_parse_allow_list_rejects_garbage() {
        assert!(parse(&["127.0.0"]).is_err());
        assert!(parse(&["127.0.0.1/33"]).is_err());
        assert!(parse(&["hostname.example.org"]).is_err());
    }
}
