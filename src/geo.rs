//! IP to location resolution.

use std::net::IpAddr;
use std::path::Path;

use ipnetwork::IpNetwork;
use serde::Deserialize;

use crate::{FootfallError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// ISO 3166-1 alpha-2 code.
    pub country: String,
    /// Name of the first subdivision.
    pub region: String,
    pub city: String,
}

pub trait GeoLookup: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Option<Location>;
}

/// Network table loaded from a JSON file of
/// `{"network": "<ip>/<prefix>", "country": .., "region": .., "city": ..}`
/// entries. A bare address is a single host. The most specific matching
/// network wins.
#[derive(Debug, Default)]
pub struct GeoTable {
    networks: Vec<Network>,
}

#[derive(Debug)]
struct Network {
    net: IpNetwork,
    location: Location,
}

#[derive(Debug, Deserialize)]
struct NetworkEntry {
    network: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    city: String,
}

impl GeoTable {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FootfallError::Configuration(format!(
                "cannot read geo database {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let entries: Vec<NetworkEntry> = serde_json::from_str(raw)
            .map_err(|e| FootfallError::Configuration(format!("malformed geo database: {}", e)))?;

        let networks = entries
            .into_iter()
            .map(|entry| {
                let net = entry.network.trim().parse::<IpNetwork>().map_err(|e| {
                    FootfallError::Configuration(format!(
                        "invalid network {:?}: {}",
                        entry.network, e
                    ))
                })?;
                Ok(Network {
                    net,
                    location: Location {
                        country: entry.country,
                        region: entry.region,
                        city: entry.city,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { networks })
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

impl GeoLookup for GeoTable {
    fn lookup(&self, ip: IpAddr) -> Option<Location> {
        self.networks
            .iter()
            .filter(|n| n.net.contains(ip))
            .max_by_key(|n| n.net.prefix())
            .map(|n| n.location.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TABLE: &str = r#"[
        {"network": "203.0.113.0/24", "country": "CH", "region": "Zurich", "city": "Zurich"},
        {"network": "203.0.113.128/25", "country": "CH", "region": "Geneva", "city": "Geneva"},
        {"network": "2001:db8::/32", "country": "DE"}
    ]"#;

    #[test]
    fn test_most_specific_network_wins() {
        let table = GeoTable::from_json(TABLE).unwrap();

        let zurich = table.lookup("203.0.113.7".parse().unwrap()).unwrap();
        assert_eq!(zurich.city, "Zurich");

        let geneva = table.lookup("203.0.113.200".parse().unwrap()).unwrap();
        assert_eq!(geneva.region, "Geneva");

        let de = table.lookup("2001:db8::1".parse().unwrap()).unwrap();
        assert_eq!(de.country, "DE");
        assert_eq!(de.city, "");

        assert!(table.lookup("198.51.100.1".parse().unwrap()).is_none());
    }

    #[test]
    fn test_zero_prefix_matches_family() {
        let table =
            GeoTable::from_json(r#"[{"network": "0.0.0.0/0", "country": "ZZ"}]"#).unwrap();
        assert!(table.lookup("8.8.8.8".parse().unwrap()).is_some());
        assert!(table.lookup("::1".parse().unwrap()).is_none());
    }

    #[test]
    fn test_host_entries_and_bad_prefixes() {
        let table = GeoTable::from_json(
            r#"[
                {"network": "192.0.2.0/24", "country": "NL"},
                {"network": " 192.0.2.10 ", "country": "NL", "city": "Utrecht"}
            ]"#,
        )
        .unwrap();
        assert_eq!(table.lookup("192.0.2.10".parse().unwrap()).unwrap().city, "Utrecht");
        assert_eq!(table.lookup("192.0.2.11".parse().unwrap()).unwrap().city, "");

        for bad in ["10.0.0.0/33", "2001:db8::/129", "10.0.0.0/x", "example.com"] {
            let raw = format!(r#"[{{"network": "{}"}}]"#, bad);
            assert!(
                matches!(GeoTable::from_json(&raw), Err(FootfallError::Configuration(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_open_rejects_unreadable_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GeoTable::open(dir.path().join("not-there.json")),
            Err(FootfallError::Configuration(_))
        ));

        let path = dir.path().join("bad.json");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"[{{"network": "300.1.1.1/8"}}]"#).unwrap();
        assert!(matches!(
            GeoTable::open(&path),
            Err(FootfallError::Configuration(_))
        ));

        let path = dir.path().join("good.json");
        std::fs::write(&path, TABLE).unwrap();
        assert_eq!(GeoTable::open(&path).unwrap().len(), 3);
    }
}
