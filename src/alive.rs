use std::{
    collections::HashSet,
    net::Ipv4Addr,
    sync::{Mutex, PoisonError},
};

/// Addresses confirmed alive during one scan.
///
/// The only mutation is [`AliveSet::insert_if_absent`], which performs the
/// existence check and the insert under one lock.
#[derive(Debug, Default)]
pub struct AliveSet {
    hosts: Mutex<HashSet<Ipv4Addr>>,
}

impl AliveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `addr` was not present before.
    pub fn insert_if_absent(&self, addr: Ipv4Addr) -> bool {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addr)
    }

    pub fn contains(&self, addr: &Ipv4Addr) -> bool {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(addr)
    }

    pub fn len(&self) -> usize {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Alive addresses in ascending numeric order.
    pub fn finalize(&self) -> Vec<Ipv4Addr> {
        let hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        finalize(hosts.iter().copied())
    }
}

/// Deduplicates `addrs` and sorts them by their big-endian integer value.
pub fn finalize(addrs: impl IntoIterator<Item = Ipv4Addr>) -> Vec<Ipv4Addr> {
    let mut sorted: Vec<_> = addrs.into_iter().collect();
    sorted.sort_unstable_by_key(|addr| u32::from(*addr));
    sorted.dedup();
    sorted
}
