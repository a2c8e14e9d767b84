//! Preset storage and change notifications.
//!
//! The store itself is an external collaborator. The authority only echoes
//! successful mutations to connected clients and never lets them touch the
//! shared beat state.

use dashmap::DashMap;
use std::sync::Arc;
use syncbeat_core::{Preset, PresetDraft, PresetUpdate, WallClock};
use syncbeat_protocol::{PresetRemoved, ServerMessage};

use crate::broadcast::Broadcaster;
use crate::error::{Result, ServerError};

pub trait PresetStore: Send + Sync {
    /// Newest first.
    fn list(&self) -> Vec<Preset>;

    /// Favorites only, newest first.
    fn favorites(&self) -> Vec<Preset> {
        self.list().into_iter().filter(|p| p.is_favorite).collect()
    }

    fn get(&self, id: &str) -> Result<Preset>;
    fn create(&self, draft: PresetDraft) -> Result<Preset>;
    fn update(&self, id: &str, update: &PresetUpdate) -> Result<Preset>;
    fn delete(&self, id: &str) -> Result<()>;
}

/// Process-lifetime preset store.
pub struct InMemoryPresetStore {
    presets: DashMap<String, Preset>,
    clock: Arc<dyn WallClock>,
}

impl InMemoryPresetStore {
    pub fn new(clock: Arc<dyn WallClock>) -> Self {
        Self {
            presets: DashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

impl PresetStore for InMemoryPresetStore {
    fn list(&self) -> Vec<Preset> {
        let mut all: Vec<Preset> = self.presets.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    fn get(&self, id: &str) -> Result<Preset> {
        self.presets
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| ServerError::PresetNotFound(id.to_string()))
    }

    fn create(&self, draft: PresetDraft) -> Result<Preset> {
        draft.validate()?;
        let id = uuid::Uuid::new_v4().to_string();
        let preset = draft.into_preset(id.clone(), self.clock.now_ms());
        self.presets.insert(id, preset.clone());
        Ok(preset)
    }

    fn update(&self, id: &str, update: &PresetUpdate) -> Result<Preset> {
        let mut entry = self
            .presets
            .get_mut(id)
            .ok_or_else(|| ServerError::PresetNotFound(id.to_string()))?;
        update.apply_to(entry.value_mut(), self.clock.now_ms())?;
        Ok(entry.value().clone())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.presets
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ServerError::PresetNotFound(id.to_string()))
    }
}

/// Wraps a store and announces successful create/update/delete.
#[derive(Clone)]
pub struct PresetNotifier {
    store: Arc<dyn PresetStore>,
    broadcaster: Broadcaster,
}

impl PresetNotifier {
    pub fn new(store: Arc<dyn PresetStore>, broadcaster: Broadcaster) -> Self {
        Self { store, broadcaster }
    }

    pub fn list(&self) -> Vec<Preset> {
        self.store.list()
    }

    pub fn favorites(&self) -> Vec<Preset> {
        self.store.favorites()
    }

    pub fn get(&self, id: &str) -> Result<Preset> {
        self.store.get(id)
    }

    pub fn create(&self, draft: PresetDraft) -> Result<Preset> {
        let preset = self.store.create(draft)?;
        tracing::info!("Preset created: {} ({})", preset.name, preset.id);
        self.broadcaster
            .to_all(ServerMessage::PresetCreated(preset.clone()));
        Ok(preset)
    }

    pub fn update(&self, id: &str, update: &PresetUpdate) -> Result<Preset> {
        let preset = self.store.update(id, update)?;
        tracing::info!("Preset updated: {}", preset.id);
        self.broadcaster
            .to_all(ServerMessage::PresetUpdated(preset.clone()));
        Ok(preset)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id)?;
        tracing::info!("Preset deleted: {}", id);
        self.broadcaster.to_all(ServerMessage::PresetDeleted(PresetRemoved {
            id: id.to_string(),
        }));
        Ok(())
    }
}
