//! Music layer stack
//!
//! A fixed number of indexed slots, each holding at most one buffer plus the
//! metadata needed to rebuild it from a save game.

use std::collections::HashSet;

use super::ambient::AmbientLoopParams;
use super::buffer::{BufferHandle, BufferId};
use super::persistence::SavedLayer;

/// Persisted metadata of one music layer
#[derive(Debug, Clone, PartialEq)]
pub struct AudioLayer {
    /// `None` or empty when the layer was explicitly silenced
    pub track_name: Option<String>,
    pub base_volume: f32,
    pub base_rate: f32,
    pub fade_in_frames: u32,
    pub playing: bool,

    /// Present for ambient loops only
    pub loop_params: Option<AmbientLoopParams>,
}

impl AudioLayer {
    pub fn is_ambient(&self) -> bool {
        self.loop_params.is_some()
    }

    pub fn to_saved(&self) -> SavedLayer {
        SavedLayer {
            name: self.track_name.clone().unwrap_or_default(),
            volume: self.base_volume,
            rate: self.base_rate,
            fade_in_time: self.fade_in_frames,
            playing: self.playing,
            custom_data: self.loop_params.clone(),
        }
    }
}

/// A buffer currently mixed for a layer
#[derive(Debug)]
pub struct ActiveEntry {
    pub handle: BufferHandle,
    pub layer: usize,
    pub base_volume: f32,

    /// Scheduler state; `Some` marks the buffer as an ambient loop
    pub ambient: Option<AmbientLoopParams>,
}

/// De-duplicated set of buffers mixed for music layers
#[derive(Debug, Default)]
pub struct ActiveBufferSet {
    entries: Vec<ActiveEntry>,
}

impl ActiveBufferSet {
    /// Insert or replace the entry for the handle's buffer
    ///
    /// Returns the layer that previously owned the buffer, if any.
    pub fn insert(&mut self, entry: ActiveEntry) -> Option<usize> {
        let id = entry.handle.id();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.handle.id() == id) {
            let previous = existing.layer;
            *existing = entry;
            return Some(previous);
        }
        self.entries.push(entry);
        None
    }

    pub fn remove(&mut self, id: BufferId) -> Option<ActiveEntry> {
        let index = self.entries.iter().position(|e| e.handle.id() == id)?;
        Some(self.entries.remove(index))
    }

    pub fn get(&self, id: BufferId) -> Option<&ActiveEntry> {
        self.entries.iter().find(|e| e.handle.id() == id)
    }

    pub fn get_mut(&mut self, id: BufferId) -> Option<&mut ActiveEntry> {
        self.entries.iter_mut().find(|e| e.handle.id() == id)
    }

    pub fn contains(&self, id: BufferId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ActiveEntry> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
struct LayerSlot {
    meta: Option<AudioLayer>,
    buffer: Option<BufferHandle>,
}

/// Fixed set of music slots plus the buffers they mix
#[derive(Debug)]
pub struct LayerStack {
    slots: Vec<LayerSlot>,
    active: ActiveBufferSet,
}

impl LayerStack {
    pub fn new(layer_count: usize) -> Self {
        let mut slots = Vec::with_capacity(layer_count);
        slots.resize_with(layer_count, LayerSlot::default);
        Self {
            slots,
            active: ActiveBufferSet::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains_layer(&self, layer: usize) -> bool {
        layer < self.slots.len()
    }

    pub fn layer(&self, layer: usize) -> Option<&AudioLayer> {
        self.slots.get(layer)?.meta.as_ref()
    }

    pub fn layer_mut(&mut self, layer: usize) -> Option<&mut AudioLayer> {
        self.slots.get_mut(layer)?.meta.as_mut()
    }

    pub fn buffer(&self, layer: usize) -> Option<&BufferHandle> {
        self.slots.get(layer)?.buffer.as_ref()
    }

    pub fn active(&self) -> &ActiveBufferSet {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut ActiveBufferSet {
        &mut self.active
    }

    /// Active entry for the buffer bound to `layer`
    pub fn entry_mut(&mut self, layer: usize) -> Option<&mut ActiveEntry> {
        let id = self.buffer(layer)?.id();
        self.active.get_mut(id)
    }

    /// Record the persisted metadata of a layer
    pub fn record(&mut self, layer: usize, meta: AudioLayer) {
        if let Some(slot) = self.slots.get_mut(layer) {
            slot.meta = Some(meta);
        }
    }

    /// Bind a playing buffer to a layer and register it as active
    pub fn attach(&mut self, layer: usize, entry: ActiveEntry) {
        if !self.contains_layer(layer) {
            return;
        }
        let handle = entry.handle.clone();
        if let Some(previous) = self.active.insert(entry) {
            if previous != layer {
                tracing::warn!(
                    "Buffer {} moved from layer {} to layer {}",
                    handle.id(),
                    previous,
                    layer
                );
                if let Some(slot) = self.slots.get_mut(previous) {
                    slot.buffer = None;
                }
            }
        }
        self.slots[layer].buffer = Some(handle);
    }

    /// Stop and unregister a layer's buffer and clear its bookkeeping
    pub fn dispose(&mut self, layer: usize) {
        let Some(slot) = self.slots.get_mut(layer) else {
            return;
        };
        if let Some(handle) = slot.buffer.take() {
            handle.borrow_mut().stop(0);
            self.active.remove(handle.id());
        }
        slot.meta = None;
    }

    /// Tear down every active buffer contained in `owned`
    ///
    /// Returns the number of buffers torn down.
    pub fn dispose_matching(&mut self, owned: &HashSet<BufferId>) -> usize {
        let matching: Vec<(BufferId, usize)> = self
            .active
            .iter()
            .filter(|e| owned.contains(&e.handle.id()))
            .map(|e| (e.handle.id(), e.layer))
            .collect();
        for &(id, layer) in &matching {
            if self.buffer(layer).map(|h| h.id()) == Some(id) {
                self.dispose(layer);
            } else if let Some(entry) = self.active.remove(id) {
                entry.handle.borrow_mut().stop(0);
            }
        }
        matching.len()
    }

    /// Dispose every layer
    pub fn dispose_all(&mut self) {
        for layer in 0..self.slots.len() {
            self.dispose(layer);
        }
        for orphan in self.active.iter() {
            orphan.handle.borrow_mut().stop(0);
        }
        self.active = ActiveBufferSet::default();
    }

    /// Layers in persisted form, `None` for never-used or disposed slots
    ///
    /// Ambient layers report the live scheduler state.
    pub fn dump(&self) -> Vec<Option<SavedLayer>> {
        self.slots
            .iter()
            .map(|slot| {
                let meta = slot.meta.as_ref()?;
                let mut saved = meta.to_saved();
                if let Some(live) = slot
                    .buffer
                    .as_ref()
                    .and_then(|h| self.active.get(h.id()))
                    .and_then(|e| e.ambient.clone())
                {
                    saved.custom_data = Some(live);
                }
                Some(saved)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_system::headless::HeadlessBuffer;

    fn meta(name: &str) -> AudioLayer {
        AudioLayer {
            track_name: Some(name.to_string()),
            base_volume: 100.0,
            base_rate: 100.0,
            fade_in_frames: 0,
            playing: true,
            loop_params: None,
        }
    }

    fn entry(handle: &BufferHandle, layer: usize) -> ActiveEntry {
        ActiveEntry {
            handle: handle.clone(),
            layer,
            base_volume: 100.0,
            ambient: None,
        }
    }

    #[test]
    fn test_attach_and_dispose() {
        let mut stack = LayerStack::new(2);
        let handle = BufferHandle::new(HeadlessBuffer::decoded(10.0));
        stack.record(0, meta("theme"));
        stack.attach(0, entry(&handle, 0));
        assert_eq!(stack.active().len(), 1);
        assert_eq!(stack.buffer(0).map(|h| h.id()), Some(handle.id()));

        stack.dispose(0);
        assert!(stack.buffer(0).is_none());
        assert!(stack.layer(0).is_none());
        assert!(stack.active().is_empty());

        // Disposing an empty slot is a no-op
        stack.dispose(0);
        stack.dispose(7);
    }

    #[test]
    fn test_active_set_deduplicates() {
        let mut stack = LayerStack::new(2);
        let handle = BufferHandle::new(HeadlessBuffer::decoded(10.0));
        stack.attach(0, entry(&handle, 0));
        stack.attach(1, entry(&handle, 1));
        assert_eq!(stack.active().len(), 1);
        assert!(stack.buffer(0).is_none());
        assert_eq!(stack.buffer(1).map(|h| h.id()), Some(handle.id()));
    }

    #[test]
    fn test_dispose_matching_only_tears_down_owned() {
        let mut stack = LayerStack::new(3);
        let a = BufferHandle::new(HeadlessBuffer::decoded(10.0));
        let b = BufferHandle::new(HeadlessBuffer::decoded(10.0));
        stack.record(0, meta("a"));
        stack.attach(0, entry(&a, 0));
        stack.record(1, meta("b"));
        stack.attach(1, entry(&b, 1));

        let owned: HashSet<BufferId> = [a.id()].into_iter().collect();
        assert_eq!(stack.dispose_matching(&owned), 1);
        assert!(stack.buffer(0).is_none());
        assert!(stack.buffer(1).is_some());
        assert!(!stack.active().contains(a.id()));
        assert!(stack.active().contains(b.id()));
    }

    #[test]
    fn test_dump_has_one_entry_per_layer() {
        let mut stack = LayerStack::new(3);
        stack.record(1, meta("rain"));
        let dump = stack.dump();
        assert_eq!(dump.len(), 3);
        assert!(dump[0].is_none());
        assert_eq!(dump[1].as_ref().map(|l| l.name.as_str()), Some("rain"));
        assert!(dump[2].is_none());
    }
}
