use farol_protocol::ServerDescriptor;
use serde::Serialize;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use tokio::time::Instant;

/// Snapshot of one discovered server.
///
/// Handed to subscribers and enumerators as a defensive copy; it never
/// aliases the registry's own state, so holding onto it is always safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredServer {
    pub server: ServerDescriptor,

    /// Every address this server has been seen announcing from.
    pub addresses: Vec<IpAddr>,
}

impl DiscoveredServer {
    /// Connect endpoints of one hosted service: each known address paired
    /// with the service's port. Empty when the service is unknown or has
    /// no port.
    pub fn endpoints(&self, service_name: &str) -> Vec<SocketAddr> {
        match self.server.services.get(service_name) {
            Some(service) if service.port != 0 => self
                .addresses
                .iter()
                .map(|address| SocketAddr::new(*address, service.port))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// The discovered-server store behind a finder.
///
/// Records are keyed by announced name for compatibility with the wire
/// protocol: a server that restarts under a new random id but the same name
/// updates its old record instead of spawning a duplicate. Records are never
/// removed, only hidden from enumeration once they exceed the dead threshold.
#[derive(Debug)]
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    records: Vec<Record>,
    dead_threshold: Duration,
}

#[derive(Debug)]
struct Record {
    server: ServerDescriptor,
    addresses: Vec<IpAddr>,
    last_touch: Instant,
}

impl Record {
    fn snapshot(&self) -> DiscoveredServer {
        DiscoveredServer {
            server: self.server.clone(),
            addresses: self.addresses.clone(),
        }
    }
}

impl Registry {
    pub fn new(dead_threshold: Duration) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                records: Vec::new(),
                dead_threshold,
            }),
        }
    }

    /// Feeds one valid announcement into the store.
    ///
    /// Returns a snapshot when the announcement constitutes a discovery:
    /// either the name has never been seen, or its record had already aged
    /// past the dead threshold and this announcement revives it. The caller
    /// dispatches the snapshot outside the lock.
    pub fn observe(
        &self,
        incoming: ServerDescriptor,
        source: IpAddr,
        now: Instant,
    ) -> Option<DiscoveredServer> {
        let mut inner = self.lock();
        let dead_threshold = inner.dead_threshold;
        let existing = inner
            .records
            .iter()
            .position(|record| record.server.name == incoming.name);
        match existing {
            Some(index) => {
                let record = &mut inner.records[index];
                let rediscovered = now.duration_since(record.last_touch) >= dead_threshold;
                if !record.addresses.contains(&source) {
                    record.addresses.push(source);
                }
                // The id, services and parameters stay as first seen; only
                // the display strings follow later announcements.
                record.server.name = incoming.name;
                record.server.description = incoming.description;
                record.last_touch = now;
                rediscovered.then(|| record.snapshot())
            }
            None => {
                let record = Record {
                    server: incoming,
                    addresses: vec![source],
                    last_touch: now,
                };
                let snapshot = record.snapshot();
                inner.records.push(record);
                Some(snapshot)
            }
        }
    }

    /// Snapshots every record still considered alive at `now`.
    ///
    /// Computed fresh on every call; dead records stay in the store and are
    /// simply skipped, so they reappear once a new announcement touches them.
    pub fn live(&self, now: Instant) -> Vec<DiscoveredServer> {
        let inner = self.lock();
        inner
            .records
            .iter()
            .filter(|record| now.duration_since(record.last_touch) < inner.dead_threshold)
            .map(Record::snapshot)
            .collect()
    }

    pub fn dead_threshold(&self) -> Duration {
        self.lock().dead_threshold
    }

    pub fn set_dead_threshold(&self, dead_threshold: Duration) {
        self.lock().dead_threshold = dead_threshold;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use farol_protocol::ServiceDescriptor;

    const DEAD_THRESHOLD: Duration = Duration::from_millis(10_000);

    fn named(id: u64, name: &str) -> ServerDescriptor {
        let mut server = ServerDescriptor::with_id(id);
        server.name = Some(name.into());
        server
    }

    fn address(last_octet: u8) -> IpAddr {
        IpAddr::from([192, 168, 0, last_octet])
    }

    #[test]
    fn first_sight_is_a_discovery() {
        let registry = Registry::new(DEAD_THRESHOLD);
        let now = Instant::now();

        let discovered = registry.observe(named(1, "Alice"), address(1), now);

        let snapshot = discovered.expect("First sight must be a discovery");
        assert_eq!(snapshot.server.name.as_deref(), Some("Alice"));
        assert_eq!(snapshot.addresses, [address(1)]);
        assert_eq!(registry.live(now).len(), 1);
    }

    #[test]
    fn repeated_announcement_is_not_a_discovery() {
        let registry = Registry::new(DEAD_THRESHOLD);
        let now = Instant::now();

        registry.observe(named(1, "Alice"), address(1), now);
        let second = registry.observe(named(1, "Alice"), address(1), now + Duration::from_secs(2));

        assert_eq!(second, None);
        assert_eq!(registry.live(now + Duration::from_secs(2)).len(), 1);
    }

    #[test]
    fn dead_records_leave_enumeration_but_not_the_store() {
        let registry = Registry::new(DEAD_THRESHOLD);
        let now = Instant::now();
        registry.observe(named(1, "Alice"), address(1), now);

        let just_alive = now + DEAD_THRESHOLD - Duration::from_millis(1);
        assert_eq!(registry.live(just_alive).len(), 1);

        let just_dead = now + DEAD_THRESHOLD;
        assert!(registry.live(just_dead).is_empty());

        // A fresh announcement revives the same record.
        let later = now + DEAD_THRESHOLD + Duration::from_secs(5);
        registry.observe(named(1, "Alice"), address(1), later);
        assert_eq!(registry.live(later).len(), 1);
    }

    #[test]
    fn reviving_a_dead_record_is_a_rediscovery() {
        let registry = Registry::new(DEAD_THRESHOLD);
        let now = Instant::now();
        registry.observe(named(1, "Alice"), address(1), now);

        let later = now + DEAD_THRESHOLD + Duration::from_secs(5);
        let rediscovered = registry.observe(named(1, "Alice"), address(1), later);

        assert!(
            rediscovered.is_some(),
            "Reviving a dead record must be a rediscovery"
        );
    }

    #[test]
    fn touching_a_live_record_is_not_a_rediscovery() {
        let registry = Registry::new(DEAD_THRESHOLD);
        let now = Instant::now();
        registry.observe(named(1, "Alice"), address(1), now);

        let still_alive = now + DEAD_THRESHOLD - Duration::from_millis(1);
        assert_eq!(registry.observe(named(1, "Alice"), address(1), still_alive), None);
    }

    #[test]
    fn same_name_merges_across_ids_and_addresses() {
        let registry = Registry::new(DEAD_THRESHOLD);
        let now = Instant::now();

        registry.observe(named(1, "Alice"), address(1), now);
        registry.observe(named(2, "Alice"), address(2), now + Duration::from_secs(1));

        let live = registry.live(now + Duration::from_secs(1));
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].addresses, [address(1), address(2)]);
        assert_eq!(live[0].server.id, 1, "The id must stay as first seen");
    }

    #[test]
    fn duplicate_source_address_is_kept_once() {
        let registry = Registry::new(DEAD_THRESHOLD);
        let now = Instant::now();

        registry.observe(named(1, "Alice"), address(1), now);
        registry.observe(named(1, "Alice"), address(1), now + Duration::from_secs(1));

        let live = registry.live(now + Duration::from_secs(1));
        assert_eq!(live[0].addresses, [address(1)]);
    }

    #[test]
    fn name_and_description_follow_the_latest_announcement() {
        let registry = Registry::new(DEAD_THRESHOLD);
        let now = Instant::now();
        registry.observe(named(1, "Alice"), address(1), now);

        let mut renamed = named(1, "Alice");
        renamed.description = Some("Back from lunch".into());
        registry.observe(renamed, address(1), now + Duration::from_secs(1));

        let live = registry.live(now + Duration::from_secs(1));
        assert_eq!(live[0].server.description.as_deref(), Some("Back from lunch"));
    }

    #[test]
    fn endpoints_pair_every_address_with_the_service_port() {
        let mut server = named(1, "Alice");
        server.add_service(ServiceDescriptor::new("Checker", 87));
        server.add_service(ServiceDescriptor::new("NoPort", 0));

        let registry = Registry::new(DEAD_THRESHOLD);
        let now = Instant::now();
        registry.observe(server, address(1), now);
        registry.observe(named(2, "Alice"), address(2), now);

        let live = registry.live(now);
        let endpoints = live[0].endpoints("Checker");
        assert_eq!(
            endpoints,
            [
                SocketAddr::new(address(1), 87),
                SocketAddr::new(address(2), 87)
            ]
        );
        assert!(live[0].endpoints("NoPort").is_empty());
        assert!(live[0].endpoints("Unknown").is_empty());
    }
}
