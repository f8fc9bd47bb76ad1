//! Read-only collaborators: the room/slot catalog and the identity directory.
//!
//! The engine only ever reads through these traits. The server loads a
//! [`StaticCatalog`] from a JSON file at startup.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use ulid::Ulid;

use crate::limits::MAX_ACTOR_ID_LEN;
use crate::model::{Actor, Resource, Slot};

pub trait Catalog: Send + Sync {
    fn resource(&self, id: &Ulid) -> Option<Resource>;
    fn slot(&self, id: &Ulid) -> Option<Slot>;
    /// Every slot, active or not.
    fn slots(&self) -> Vec<Slot>;
}

pub trait Directory: Send + Sync + std::fmt::Debug {
    fn actor(&self, login: &str) -> Option<Actor>;
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed catalog: {0}")]
    Json(#[from] serde_json::Error),
    #[error("resource {0} must have a positive capacity")]
    ZeroCapacity(Ulid),
    #[error("slot {0} ends at or before it starts")]
    InvertedSlot(Ulid),
    #[error("actor id {0:?} must be 1 to {max} bytes", max = MAX_ACTOR_ID_LEN)]
    BadActorId(String),
    #[error("duplicate id in catalog: {0}")]
    Duplicate(String),
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    resources: Vec<Resource>,
    #[serde(default)]
    slots: Vec<Slot>,
    #[serde(default)]
    actors: Vec<Actor>,
}

/// Immutable in-memory catalog + directory.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    resources: HashMap<Ulid, Resource>,
    slots: HashMap<Ulid, Slot>,
    actors: HashMap<String, Actor>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(text)?;
        let mut catalog = Self::new();
        for r in file.resources {
            if r.capacity == 0 {
                return Err(CatalogError::ZeroCapacity(r.id));
            }
            if catalog.resources.contains_key(&r.id) {
                return Err(CatalogError::Duplicate(r.id.to_string()));
            }
            catalog.resources.insert(r.id, r);
        }
        for s in file.slots {
            if !s.is_well_formed() {
                return Err(CatalogError::InvertedSlot(s.id));
            }
            if catalog.slots.contains_key(&s.id) {
                return Err(CatalogError::Duplicate(s.id.to_string()));
            }
            catalog.slots.insert(s.id, s);
        }
        for a in file.actors {
            if a.id.is_empty() || a.id.len() > MAX_ACTOR_ID_LEN {
                return Err(CatalogError::BadActorId(a.id));
            }
            if catalog.actors.contains_key(&a.id) {
                return Err(CatalogError::Duplicate(a.id));
            }
            catalog.actors.insert(a.id.clone(), a);
        }
        Ok(catalog)
    }

    /// Builder-style insert, bypassing the load-time checks so tests can
    /// register malformed entries.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.insert(resource.id, resource);
        self
    }

    pub fn with_slot(mut self, slot: Slot) -> Self {
        self.slots.insert(slot.id, slot);
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actors.insert(actor.id.clone(), actor);
        self
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

impl Catalog for StaticCatalog {
    fn resource(&self, id: &Ulid) -> Option<Resource> {
        self.resources.get(id).cloned()
    }

    fn slot(&self, id: &Ulid) -> Option<Slot> {
        self.slots.get(id).cloned()
    }

    fn slots(&self) -> Vec<Slot> {
        self.slots.values().cloned().collect()
    }
}

impl Directory for StaticCatalog {
    fn actor(&self, login: &str) -> Option<Actor> {
        self.actors.get(login).cloned()
    }
}
