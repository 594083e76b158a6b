use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

/// Identity and metadata of one announced server.
///
/// The authoring side builds one of these and hands it to an announcer; the
/// receiving side only ever sees decoded copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Random per-process identity. Carried on the wire but not used to
    /// deduplicate discoveries; see the finder.
    pub id: u64,

    pub name: Option<String>,
    pub description: Option<String>,

    /// Services hosted by this server, keyed by their unique name.
    pub services: BTreeMap<String, ServiceDescriptor>,

    /// Free-form server-level metadata.
    pub parameters: BTreeMap<String, String>,
}

impl ServerDescriptor {
    /// New descriptor with a freshly drawn random identity.
    pub fn new() -> Self {
        Self::with_id(rand::random())
    }

    pub fn with_id(id: u64) -> Self {
        Self {
            id,
            name: None,
            description: None,
            services: BTreeMap::new(),
            parameters: BTreeMap::new(),
        }
    }

    /// Registers a service under its own name, replacing any previous
    /// service with the same name.
    pub fn add_service(&mut self, service: ServiceDescriptor) {
        self.services.insert(service.name.clone(), service);
    }
}

impl Default for ServerDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

/// One named sub-service hosted by a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,

    /// Connect port. 0 means the service has no port of its own.
    pub port: u16,

    /// Free-form service-level metadata.
    pub parameters: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
            parameters: BTreeMap::new(),
        }
    }
}
