//! Registry of simulation spaces.
//!
//! The host owns exactly one registry. Spaces are created explicitly when
//! a world/space loads and removed explicitly when it unloads; nothing is
//! cleaned up implicitly. The per-step driver calls [`SpaceRegistry::tick`]
//! once per simulation step for each loaded space.

use std::collections::HashMap;

use crate::error::{Result, VoltgridError};
use crate::network::SpaceId;
use crate::solver::SolverConfig;
use crate::space::Space;

/// Arena of live simulation spaces keyed by opaque identifier.
#[derive(Debug, Default)]
pub struct SpaceRegistry {
    spaces: HashMap<SpaceId, Space>,
    next_space: u64,
    solver_config: SolverConfig,
}

impl SpaceRegistry {
    /// Create an empty registry with default solver settings.
    pub fn new() -> Self {
        Self::with_config(SolverConfig::default())
    }

    /// Create an empty registry; every space it spawns uses `config`.
    pub fn with_config(config: SolverConfig) -> Self {
        Self {
            spaces: HashMap::new(),
            next_space: 0,
            solver_config: config,
        }
    }

    /// Create a new space, to be called from the host's space-load hook.
    pub fn create_space(&mut self) -> SpaceId {
        let id = SpaceId(self.next_space);
        self.next_space += 1;
        self.spaces
            .insert(id, Space::with_config(self.solver_config.clone()));
        log::debug!("created simulation space {id}");
        id
    }

    /// Tear down a space, dropping all its networks and nodes. To be
    /// called from the host's space-unload hook.
    pub fn remove_space(&mut self, id: SpaceId) -> Result<()> {
        self.spaces
            .remove(&id)
            .map(|_| log::debug!("removed simulation space {id}"))
            .ok_or(VoltgridError::SpaceNotFound { space: id })
    }

    /// Borrow a space.
    pub fn space(&self, id: SpaceId) -> Result<&Space> {
        self.spaces
            .get(&id)
            .ok_or(VoltgridError::SpaceNotFound { space: id })
    }

    /// Mutably borrow a space.
    pub fn space_mut(&mut self, id: SpaceId) -> Result<&mut Space> {
        self.spaces
            .get_mut(&id)
            .ok_or(VoltgridError::SpaceNotFound { space: id })
    }

    /// Whether the registry holds the given space.
    pub fn contains(&self, id: SpaceId) -> bool {
        self.spaces.contains_key(&id)
    }

    /// Number of live spaces.
    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    /// Whether no spaces are loaded.
    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// Run the per-step recomputation pass for one space.
    pub fn tick(&mut self, id: SpaceId) -> Result<()> {
        self.space_mut(id)?.tick()
    }
}
