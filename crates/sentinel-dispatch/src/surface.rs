//! In-memory map surface
//!
//! Keeps the latest layer set so a front-end can fetch and render it.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;

use sentinel_core::{Coordinate, MapSurface, MarkerKind};

/// One keyed layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapLayer {
    Marker { kind: MarkerKind, at: Coordinate },
    Polyline { kind: MarkerKind, points: Vec<Coordinate> },
}

/// Everything currently drawn
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapSnapshot {
    pub layers: BTreeMap<String, MapLayer>,
    /// Points the view was last fitted to
    pub view: Vec<Coordinate>,
    /// Bumped on every command
    pub revision: u64,
}

/// [`MapSurface`] that records state instead of rendering
#[derive(Debug, Default)]
pub struct MemorySurface {
    state: RwLock<MapSnapshot>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MapSnapshot {
        self.state.read().clone()
    }

    pub fn layer(&self, id: &str) -> Option<MapLayer> {
        self.state.read().layers.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().layers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.state.read().layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().layers.is_empty()
    }

    fn mutate(&self, f: impl FnOnce(&mut MapSnapshot)) {
        let mut state = self.state.write();
        f(&mut state);
        state.revision += 1;
    }
}

impl MapSurface for MemorySurface {
    fn upsert_marker(&self, id: &str, kind: MarkerKind, at: Coordinate) {
        self.mutate(|s| {
            s.layers.insert(id.to_string(), MapLayer::Marker { kind, at });
        });
    }

    fn draw_polyline(&self, id: &str, kind: MarkerKind, points: &[Coordinate]) {
        self.mutate(|s| {
            s.layers.insert(
                id.to_string(),
                MapLayer::Polyline {
                    kind,
                    points: points.to_vec(),
                },
            );
        });
    }

    fn remove(&self, id: &str) {
        self.mutate(|s| {
            s.layers.remove(id);
        });
    }

    fn fit_view(&self, points: &[Coordinate]) {
        self.mutate(|s| s.view = points.to_vec());
    }

    fn clear(&self) {
        self.mutate(|s| {
            s.layers.clear();
            s.view.clear();
        });
    }
}
