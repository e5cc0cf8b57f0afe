use std::{net::Ipv4Addr, str::FromStr};

use ipnet::Ipv4Net;

use crate::error::{Error, Result};

/// Shortest prefix accepted by [`AddressRange::parse`]; anything wider would
/// enumerate more addresses than a local sweep can sensibly probe.
pub const MIN_PREFIX_LEN: u8 = 16;

/// Ordered host addresses of an IPv4 network.
///
/// The sequence starts at the first host after the network address and ends
/// at the last host before the broadcast address, so a `/24` yields 254
/// addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressRange {
    net: Ipv4Net,
    hosts: Vec<Ipv4Addr>,
}

impl AddressRange {
    /// Parses a CIDR string such as `"192.168.1.0/24"` and enumerates its hosts.
    ///
    /// Host bits set in the address part are masked off, so `"192.168.1.42/24"`
    /// describes the same range as `"192.168.1.0/24"`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] if the string is not IPv4 CIDR notation or
    /// its prefix is shorter than [`MIN_PREFIX_LEN`].
    pub fn parse(cidr: &str) -> Result<Self> {
        let net = Ipv4Net::from_str(cidr.trim())
            .map_err(|_| Error::InvalidRange(cidr.to_string()))?
            .trunc();
        if net.prefix_len() < MIN_PREFIX_LEN {
            return Err(Error::InvalidRange(cidr.to_string()));
        }
        Ok(Self::from_net(net))
    }

    fn from_net(net: Ipv4Net) -> Self {
        let first = u32::from(net.network()).saturating_add(1);
        let broadcast = u32::from(net.broadcast());
        let hosts = (first..broadcast).map(Ipv4Addr::from).collect();
        Self { net, hosts }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.net.network()
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        self.net.broadcast()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Ipv4Addr> {
        self.hosts.iter()
    }

    pub fn as_slice(&self) -> &[Ipv4Addr] {
        &self.hosts
    }
}

impl FromStr for AddressRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl<'a> IntoIterator for &'a AddressRange {
    type Item = &'a Ipv4Addr;
    type IntoIter = std::slice::Iter<'a, Ipv4Addr>;

    fn into_iter(self) -> Self::IntoIter {
        self.hosts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slash_24_yields_254_hosts_in_order() {
        for cidr in ["10.0.0.0/24", "192.168.1.0/24", "172.16.254.0/24"] {
            let range = AddressRange::parse(cidr).unwrap();
            assert_eq!(range.len(), 254, "{cidr}");
            let network = range.network();
            let broadcast = range.broadcast();
            let net: Ipv4Net = cidr.parse().unwrap();
            for addr in &range {
                assert!(net.contains(addr));
                assert_ne!(*addr, network);
                assert_ne!(*addr, broadcast);
            }
            assert!(range
                .as_slice()
                .windows(2)
                .all(|pair| u32::from(pair[0]) < u32::from(pair[1])));
        }
    }

    // A loop that starts at the network address and stops before the last
    // host would scan .0 and skip .254. The range now covers .1 through .254.
    #[test]
    fn test_broadcast_adjacent_host_is_scanned() {
        let range = AddressRange::parse("192.168.1.0/24").unwrap();
        assert_eq!(range.iter().next(), Some(&Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(range.iter().last(), Some(&Ipv4Addr::new(192, 168, 1, 254)));
        assert!(!range.as_slice().contains(&Ipv4Addr::new(192, 168, 1, 0)));
    }

    #[test]
    fn test_host_bits_are_masked() {
        let range = AddressRange::parse("192.168.1.42/24").unwrap();
        assert_eq!(range.network(), Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(range.broadcast(), Ipv4Addr::new(192, 168, 1, 255));
        assert_eq!(range.len(), 254);
    }

    #[test]
    fn test_invalid_cidr() {
        for cidr in ["not-a-cidr", "192.168.1.0", "192.168.1.0/33", "::1/128", ""] {
            assert!(
                matches!(AddressRange::parse(cidr), Err(Error::InvalidRange(_))),
                "{cidr}"
            );
        }
    }

    #[test]
    fn test_prefix_too_wide() {
        assert!(matches!(
            AddressRange::parse("10.0.0.0/8"),
            Err(Error::InvalidRange(_))
        ));
        assert_eq!(AddressRange::parse("10.0.0.0/16").unwrap().len(), 65534);
    }

    #[test]
    fn test_point_to_point_prefixes_are_empty() {
        assert!(AddressRange::parse("10.0.0.0/31").unwrap().is_empty());
        assert!(AddressRange::parse("10.0.0.7/32").unwrap().is_empty());
        assert!(AddressRange::parse("255.255.255.255/32")
            .unwrap()
            .is_empty());
        assert_eq!(AddressRange::parse("10.0.0.0/30").unwrap().len(), 2);
    }
}
