use log::error;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::ProtocolTableError;

/// Answer for ports missing from the table.
pub const UNKNOWN_PROTOCOL: &str = "No specific protocol associated with this port.";

const EMBEDDED_TABLE: &str = include_str!("../data/port_list.csv");

/// Read-only port number to service name lookup.
#[derive(Debug, Clone, Default)]
pub struct ProtocolResolver {
    table: HashMap<u16, String>,
}

impl ProtocolResolver {
    /// Parse a `port,protocol` table. The first line is a header and is skipped,
    /// blank lines are ignored.
    pub fn parse(content: &str) -> Result<Self, ProtocolTableError> {
        let mut table = HashMap::new();
        for (idx, raw) in content.lines().enumerate().skip(1) {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let malformed = || ProtocolTableError::Malformed {
                line: idx + 1,
                row: line.to_string(),
            };
            let (port, protocol) = line.split_once(',').ok_or_else(malformed)?;
            let port: u16 = port.trim().parse().map_err(|_| malformed())?;
            let protocol = protocol.trim();
            if protocol.is_empty() {
                return Err(malformed());
            }
            table.insert(port, protocol.to_string());
        }
        Ok(Self { table })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ProtocolTableError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// The table compiled into the binary.
    pub fn embedded() -> Self {
        Self::parse(EMBEDDED_TABLE).unwrap_or_else(|e| {
            error!("embedded protocol table is unusable: {e}");
            Self::default()
        })
    }

    /// Load from `path` when given, else the embedded table.
    ///
    /// A load failure is logged here, once; the returned resolver is then empty
    /// and every lookup yields [`UNKNOWN_PROTOCOL`].
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::from_path(p).unwrap_or_else(|e| {
                error!("protocol table {} not loaded: {e}", p.display());
                Self::default()
            }),
            None => Self::embedded(),
        }
    }

    pub fn lookup(&self, port: u16) -> &str {
        self.table
            .get(&port)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_PROTOCOL)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_knows_common_ports() {
        let r = ProtocolResolver::embedded();
        assert_eq!(r.lookup(22), "SSH");
        assert_eq!(r.lookup(443), "HTTPS");
        assert_eq!(r.lookup(1), UNKNOWN_PROTOCOL);
    }

    #[test]
    fn parse_skips_header_and_blank_lines() {
        let r = ProtocolResolver::parse("port,protocol\n 80 , HTTP \n\n8080,HTTP Proxy\n").unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.lookup(80), "HTTP");
    }

    #[test]
    fn malformed_row_fails_load() {
        let err = ProtocolResolver::parse("port,protocol\n80\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(ProtocolResolver::parse("port,protocol\nabc,HTTP\n").is_err());
    }

    #[test]
    fn missing_file_degrades_to_unknown() {
        let r = ProtocolResolver::load(Some(Path::new("/definitely/not/here.csv")));
        assert!(r.is_empty());
        assert_eq!(r.lookup(80), UNKNOWN_PROTOCOL);
    }
}
