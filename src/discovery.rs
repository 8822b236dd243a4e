use crate::error::Result;
use crate::types::{Endpoint, Switch, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

const MULTICAST_ADDR: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 1982);
const SEARCH_REQUEST: &str = "M-SEARCH * HTTP/1.1\r\n\
HOST: 239.255.255.250:1982\r\n\
MAN: \"ssdp:discover\"\r\n\
ST: wifi_bulb\r\n";
const LOCATION_SCHEME: &str = "yeelight://";

/// How long [`discover`] listens for replies by default
pub const DISCOVERY_WINDOW: Duration = Duration::from_secs(5);

/// A bulb that answered the discovery search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredBulb {
    pub address: String,
    pub port: u16,
    pub id: Option<String>,
    pub model: Option<String>,
    pub name: Option<String>,
    pub power: Option<Switch>,
    pub color_temperature: Option<u16>,
}

impl DiscoveredBulb {
    /// Parse a discovery reply
    ///
    /// Returns `None` when the reply has no usable `Location` header.
    pub fn parse(reply: &str) -> Option<Self> {
        let mut headers = BTreeMap::new();
        for line in reply.lines().skip(1) {
            if let Some((key, value)) = line.split_once(':') {
                headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let location = headers.get("location")?;
        let (address, port) = parse_location(location)?;
        let non_empty = |key: &str| headers.get(key).filter(|v| !v.is_empty()).cloned();

        Some(Self {
            address,
            port,
            id: non_empty("id"),
            model: non_empty("model"),
            name: non_empty("name"),
            power: headers.get("power").and_then(|p| match p.as_str() {
                "on" => Some(Switch::On),
                "off" => Some(Switch::Off),
                _ => None,
            }),
            color_temperature: headers.get("ct").and_then(|ct| ct.parse().ok()),
        })
    }

    /// Endpoint for connecting to this bulb with default session settings
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone()).with_port(self.port)
    }
}

fn parse_location(location: &str) -> Option<(String, u16)> {
    let scheme = location.get(..LOCATION_SCHEME.len())?;
    if !scheme.eq_ignore_ascii_case(LOCATION_SCHEME) {
        return None;
    }
    let rest = location.get(LOCATION_SCHEME.len()..)?.trim_end_matches('/');

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => (rest, DEFAULT_PORT),
    };
    let ip: Ipv4Addr = host.parse().ok()?;
    Some((ip.to_string(), port))
}

/// Search the local network for bulbs
///
/// Sends one multicast search and collects replies for `window`. The result
/// is keyed by bulb address; a bulb that answers twice keeps its last reply.
///
/// # Example
///
/// ```no_run
/// use yeelight_lan::{discover, DISCOVERY_WINDOW};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     for (address, bulb) in discover(DISCOVERY_WINDOW).await? {
///         println!("{} {:?} {:?}", address, bulb.model, bulb.name);
///     }
///     Ok(())
/// }
/// ```
pub async fn discover(window: Duration) -> Result<BTreeMap<String, DiscoveredBulb>> {
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.send_to(SEARCH_REQUEST.as_bytes(), MULTICAST_ADDR).await?;
    tracing::info!("Sent discovery search, listening for {:?}", window);

    let deadline = Instant::now() + window;
    let mut bulbs = BTreeMap::new();
    let mut buf = vec![0u8; 2048];

    loop {
        let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Err(_) => break,
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                tracing::warn!("Discovery receive error: {}", e);
                break;
            }
        };

        let reply = String::from_utf8_lossy(buf.get(..len).unwrap_or_default());
        match DiscoveredBulb::parse(&reply) {
            Some(bulb) => {
                tracing::info!("Found bulb {:?} at {}:{}", bulb.name, bulb.address, bulb.port);
                bulbs.insert(bulb.address.clone(), bulb);
            }
            None => {
                tracing::debug!("Ignoring discovery reply from {}", from);
            }
        }
    }

    tracing::info!("Discovery finished with {} bulb(s)", bulbs.len());
    Ok(bulbs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = "HTTP/1.1 200 OK\r\n\
Cache-Control: max-age=3600\r\n\
Date: \r\n\
Ext: \r\n\
Location: yeelight://192.168.1.239:55443\r\n\
Server: POSIX UPnP/1.0 YGLC/1\r\n\
id: 0x000000000015243f\r\n\
model: color\r\n\
fw_ver: 18\r\n\
support: get_prop set_default set_power toggle set_bright\r\n\
power: on\r\n\
bright: 100\r\n\
color_mode: 2\r\n\
ct: 4000\r\n\
rgb: 16711680\r\n\
hue: 100\r\n\
sat: 35\r\n\
name: desk\r\n";

    #[test]
    fn test_parse_reply() {
        let bulb = DiscoveredBulb::parse(REPLY).unwrap();
        assert_eq!(
            bulb,
            DiscoveredBulb {
                address: "192.168.1.239".to_string(),
                port: 55443,
                id: Some("0x000000000015243f".to_string()),
                model: Some("color".to_string()),
                name: Some("desk".to_string()),
                power: Some(Switch::On),
                color_temperature: Some(4000),
            }
        );
        assert_eq!(bulb.endpoint(), Endpoint::new("192.168.1.239"));
    }

    #[test]
    fn test_parse_minimal_reply() {
        let bulb = DiscoveredBulb::parse("HTTP/1.1 200 OK\r\nLOCATION: Yeelight://10.0.0.4:1234\r\n")
            .unwrap();
        assert_eq!(bulb.address, "10.0.0.4");
        assert_eq!(bulb.port, 1234);
        assert_eq!(bulb.name, None);
        assert_eq!(bulb.power, None);
        assert_eq!(bulb.endpoint().port, 1234);
    }

    #[test]
    fn test_parse_rejects_bad_location() {
        assert!(DiscoveredBulb::parse("HTTP/1.1 200 OK\r\nid: 1\r\n").is_none());
        assert!(DiscoveredBulb::parse("HTTP/1.1 200 OK\r\nLocation: http://10.0.0.4:80\r\n").is_none());
        assert!(
            DiscoveredBulb::parse("HTTP/1.1 200 OK\r\nLocation: yeelight://bulb.local:55443\r\n")
                .is_none()
        );
    }

    #[test]
    fn test_location_without_port_uses_default() {
        assert_eq!(
            parse_location("yeelight://10.0.0.9"),
            Some(("10.0.0.9".to_string(), DEFAULT_PORT))
        );
    }
}
