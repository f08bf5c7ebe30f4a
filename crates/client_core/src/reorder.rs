//! Drag-to-reorder gesture tracking.
//!
//! A gesture goes `Idle -> Pending -> Dragging -> Dropped | Cancelled`. While
//! dragging, every hover over a different entry is applied to the collection
//! immediately, so the stored order always matches what the user sees.

use std::time::{Duration, Instant};

use shared::domain::ItemId;
use tracing::{debug, warn};

use crate::{collection::CollectionStore, error::CollectionError};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn distance(self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down {
        entry: ItemId,
        at: Point,
        time: Instant,
    },
    Move {
        at: Point,
        over: Option<ItemId>,
        time: Instant,
    },
    Up,
    Cancel,
}

/// Separates a drag from a tap on the entry's remove control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivationConstraint {
    pub min_distance: f32,
    pub hold: Duration,
    pub tolerance: f32,
}

impl Default for ActivationConstraint {
    fn default() -> Self {
        Self {
            min_distance: 5.0,
            hold: Duration::from_millis(150),
            tolerance: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReorderConfig {
    pub activation: ActivationConstraint,
    /// Put the dragged entry back at its start index when a drag is cancelled.
    pub restore_on_cancel: bool,
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self {
            activation: ActivationConstraint::default(),
            restore_on_cancel: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureState {
    Idle,
    Pending {
        entry: ItemId,
        start_index: usize,
        origin: Point,
        pressed_at: Instant,
    },
    Dragging {
        entry: ItemId,
        start_index: usize,
        current_index: usize,
    },
    Dropped {
        entry: ItemId,
        start_index: usize,
        final_index: usize,
    },
    Cancelled {
        entry: ItemId,
        start_index: usize,
        restored: bool,
    },
}

impl GestureState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending { .. } | Self::Dragging { .. })
    }

    pub fn dragged_entry(&self) -> Option<ItemId> {
        match self {
            Self::Dragging { entry, .. } => Some(*entry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    Ignored,
    Pressed,
    Activated,
    Moved { from: usize, to: usize },
    Tapped,
    Aborted,
    Dropped { start_index: usize, final_index: usize },
    Cancelled { restored: bool },
}

impl GestureOutcome {
    pub fn changed_collection(&self) -> bool {
        matches!(
            self,
            Self::Moved { .. } | Self::Cancelled { restored: true }
        )
    }
}

pub struct ReorderSession {
    config: ReorderConfig,
    state: GestureState,
}

impl Default for ReorderSession {
    fn default() -> Self {
        Self::new(ReorderConfig::default())
    }
}

impl ReorderSession {
    pub fn new(config: ReorderConfig) -> Self {
        Self {
            config,
            state: GestureState::Idle,
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub async fn handle(
        &mut self,
        event: PointerEvent,
        collection: &CollectionStore,
    ) -> GestureOutcome {
        match (self.state, event) {
            (state, PointerEvent::Down { entry, at, time }) => {
                if state.is_active() {
                    debug!(entry = entry.0, "reorder: pointer-down ignored, gesture in progress");
                    return GestureOutcome::Ignored;
                }
                let Some(start_index) = collection.index_of(entry).await else {
                    return GestureOutcome::Ignored;
                };
                self.state = GestureState::Pending {
                    entry,
                    start_index,
                    origin: at,
                    pressed_at: time,
                };
                GestureOutcome::Pressed
            }
            (
                GestureState::Pending {
                    entry,
                    start_index,
                    origin,
                    pressed_at,
                },
                PointerEvent::Move { at, over, time },
            ) => {
                let activation = self.config.activation;
                let held = time.saturating_duration_since(pressed_at) >= activation.hold;
                let displacement = at.distance(origin);
                if !held {
                    if displacement > activation.tolerance {
                        debug!(entry = entry.0, "reorder: moved before hold elapsed, aborting");
                        self.state = GestureState::Idle;
                        return GestureOutcome::Aborted;
                    }
                    return GestureOutcome::Pressed;
                }
                if displacement < activation.min_distance {
                    return GestureOutcome::Pressed;
                }

                debug!(entry = entry.0, start_index, "reorder: drag activated");
                self.state = GestureState::Dragging {
                    entry,
                    start_index,
                    current_index: start_index,
                };
                match self.drag_over(over, collection).await {
                    GestureOutcome::Ignored => GestureOutcome::Activated,
                    outcome => outcome,
                }
            }
            (GestureState::Dragging { .. }, PointerEvent::Move { over, .. }) => {
                self.drag_over(over, collection).await
            }
            (GestureState::Pending { .. }, PointerEvent::Up) => {
                self.state = GestureState::Idle;
                GestureOutcome::Tapped
            }
            (GestureState::Pending { .. }, PointerEvent::Cancel) => {
                self.state = GestureState::Idle;
                GestureOutcome::Aborted
            }
            (
                GestureState::Dragging {
                    entry,
                    start_index,
                    current_index,
                },
                PointerEvent::Up,
            ) => {
                self.state = GestureState::Dropped {
                    entry,
                    start_index,
                    final_index: current_index,
                };
                GestureOutcome::Dropped {
                    start_index,
                    final_index: current_index,
                }
            }
            (
                GestureState::Dragging {
                    entry, start_index, ..
                },
                PointerEvent::Cancel,
            ) => {
                let restored = self.config.restore_on_cancel
                    && restore(entry, start_index, collection).await;
                self.state = GestureState::Cancelled {
                    entry,
                    start_index,
                    restored,
                };
                GestureOutcome::Cancelled { restored }
            }
            _ => GestureOutcome::Ignored,
        }
    }

    async fn drag_over(
        &mut self,
        over: Option<ItemId>,
        collection: &CollectionStore,
    ) -> GestureOutcome {
        let GestureState::Dragging {
            entry, start_index, ..
        } = self.state
        else {
            return GestureOutcome::Ignored;
        };
        let Some(target) = over else {
            return GestureOutcome::Ignored;
        };
        let Some(target_index) = collection.index_of(target).await else {
            return GestureOutcome::Ignored;
        };
        // The collection may have changed since the last hover.
        let current_index = collection.index_of(entry).await;
        if current_index == Some(target_index) {
            return GestureOutcome::Ignored;
        }

        match collection.move_item(entry, target_index).await {
            Ok(from) => {
                self.state = GestureState::Dragging {
                    entry,
                    start_index,
                    current_index: target_index,
                };
                GestureOutcome::Moved {
                    from,
                    to: target_index,
                }
            }
            Err(CollectionError::UnknownItem(_)) => {
                warn!(entry = entry.0, "reorder: dragged entry vanished, cancelling");
                self.state = GestureState::Cancelled {
                    entry,
                    start_index,
                    restored: false,
                };
                GestureOutcome::Cancelled { restored: false }
            }
            Err(CollectionError::IndexOutOfRange { .. }) => GestureOutcome::Ignored,
        }
    }
}

async fn restore(entry: ItemId, start_index: usize, collection: &CollectionStore) -> bool {
    let len = collection.len().await;
    if len == 0 {
        return false;
    }
    match collection.move_item(entry, start_index.min(len - 1)).await {
        Ok(_) => true,
        Err(err) => {
            warn!(entry = entry.0, error = %err, "reorder: could not restore order on cancel");
            false
        }
    }
}

#[cfg(test)]
#[path = "tests/reorder_tests.rs"]
mod tests;
