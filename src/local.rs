//! Locating the subnet to sweep from the host's own interfaces.

use std::net::{IpAddr, Ipv4Addr};

use pnet::datalink::{self, NetworkInterface};

use crate::error::{Error, Result};

/// Prefix length of the derived local subnet.
pub const LOCAL_PREFIX_LEN: u8 = 24;

/// First IPv4 address of the named interface, which must be up and not a
/// loopback.
pub fn interface_ipv4(interface_name: &str) -> Result<Ipv4Addr> {
    datalink::interfaces()
        .into_iter()
        .filter(|iface| iface.name == interface_name)
        .find_map(|iface| usable_ipv4(&iface))
        .ok_or_else(|| Error::NoLocalAddress(interface_name.to_string()))
}

/// Name and IPv4 address of the first interface that is up, not a loopback
/// and has an IPv4 address.
pub fn default_interface_ipv4() -> Result<(String, Ipv4Addr)> {
    datalink::interfaces()
        .into_iter()
        .find_map(|iface| usable_ipv4(&iface).map(|ip| (iface.name.clone(), ip)))
        .ok_or_else(|| Error::NoLocalAddress("<any>".to_string()))
}

fn usable_ipv4(iface: &NetworkInterface) -> Option<Ipv4Addr> {
    if !iface.is_up() || iface.is_loopback() {
        return None;
    }
    iface.ips.iter().find_map(|net| match net.ip() {
        IpAddr::V4(ipv4) => Some(ipv4),
        IpAddr::V6(_) => None,
    })
}

/// The `/24` network containing `addr`, in CIDR notation.
pub fn subnet_cidr(addr: Ipv4Addr) -> String {
    let [a, b, c, _] = addr.octets();
    format!("{}.{}.{}.0/{}", a, b, c, LOCAL_PREFIX_LEN)
}
