//! # Layer Batch Compiler
//!
//! Groups the live objects of one layer by model and flattens the groups into
//! a contiguous draw-command list, one command per object, so every group can
//! be issued as a single multi-draw call.
//!
//! ## Architecture
//!
//! ```text
//! groups: model 3 ─► { obj 1: cmd, obj 4: cmd }
//!         model 7 ─► { obj 2: cmd }
//!                │
//!                ▼  (only when membership changed)
//! commands: [ cmd(obj 1), cmd(obj 4), cmd(obj 2) ]
//! batches:  [ model 3 @ 0 x2, model 7 @ 2 x1 ]
//! ```
//!
//! The flat list is rebuilt lazily: a tick that adds, removes, moves or alters
//! no command leaves the previous list untouched.

use std::collections::{BTreeMap, HashMap};

use super::draw_command::{DrawCommand, IndirectDraw};
use crate::foundation::ids::{LayerId, ModelId, ObjectId};
use crate::render::slots::ObjectRecordTable;
use crate::scene::{LayerChanges, ModelInfo};

/// A run of commands sharing one model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelBatch {
    /// Model drawn by the run
    pub model: ModelId,
    /// Offset of the run within the layer's command list
    pub first_command: u32,
    /// Commands in the run
    pub draw_count: u32,
}

/// Per-layer grouping and compaction state
#[derive(Debug, Clone)]
pub struct LayerBatchCompiler {
    layer: LayerId,
    groups: BTreeMap<ModelId, BTreeMap<ObjectId, DrawCommand>>,
    membership: HashMap<ObjectId, ModelId>,
    commands: Vec<DrawCommand>,
    batches: Vec<ModelBatch>,
    base_offset: u32,
    rebuilds: u64,
}

impl LayerBatchCompiler {
    /// Empty compiler for `layer`
    pub fn new(layer: LayerId) -> Self {
        Self {
            layer,
            groups: BTreeMap::new(),
            membership: HashMap::new(),
            commands: Vec::new(),
            batches: Vec::new(),
            base_offset: 0,
            rebuilds: 0,
        }
    }

    /// Apply one tick of changes
    ///
    /// `resolve` yields the model an object is drawn with, or `None` if it has
    /// no geometry in this layer. Returns whether the flat list was rebuilt.
    pub fn compile<F>(&mut self, changes: &LayerChanges, objects: &ObjectRecordTable, resolve: F) -> bool
    where
        F: Fn(ObjectId) -> Option<ModelInfo>,
    {
        let mut changed = false;

        for &object in &changes.destroyed {
            changed |= self.remove(object);
        }

        for &object in &changes.updated {
            let Some(model) = resolve(object) else {
                log::trace!("{}: {} has no model, skipped", self.layer, object);
                changed |= self.remove(object);
                continue;
            };
            let Some(slot) = objects.slot_of(object) else {
                log::trace!("{}: {} has no record slot, skipped", self.layer, object);
                changed |= self.remove(object);
                continue;
            };
            changed |= self.place(object, model, DrawCommand::single(model.index_count, slot));
        }

        if changed {
            self.rebuild();
        }
        changed
    }

    fn remove(&mut self, object: ObjectId) -> bool {
        let Some(model) = self.membership.remove(&object) else {
            return false;
        };
        if let Some(group) = self.groups.get_mut(&model) {
            group.remove(&object);
            if group.is_empty() {
                self.groups.remove(&model);
            }
        }
        true
    }

    fn place(&mut self, object: ObjectId, model: ModelInfo, command: DrawCommand) -> bool {
        match self.membership.get(&object) {
            Some(&current) if current == model.id => {
                let existing = self
                    .groups
                    .get_mut(&model.id)
                    .and_then(|group| group.get_mut(&object));
                match existing {
                    Some(existing) if *existing != command => {
                        *existing = command;
                        true
                    }
                    _ => false,
                }
            }
            Some(_) => {
                self.remove(object);
                self.insert(object, model.id, command);
                true
            }
            None => {
                self.insert(object, model.id, command);
                true
            }
        }
    }

    fn insert(&mut self, object: ObjectId, model: ModelId, command: DrawCommand) {
        self.membership.insert(object, model);
        self.groups.entry(model).or_default().insert(object, command);
    }

    fn rebuild(&mut self) {
        self.commands.clear();
        self.batches.clear();
        for (&model, group) in &self.groups {
            let first_command = self.commands.len() as u32;
            self.commands.extend(group.values().copied());
            self.batches.push(ModelBatch {
                model,
                first_command,
                draw_count: group.len() as u32,
            });
        }
        self.rebuilds += 1;
        log::debug!(
            "{}: compacted {} commands in {} batches",
            self.layer,
            self.commands.len(),
            self.batches.len()
        );
    }

    /// The compacted command list
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Per-model runs within [`commands`](Self::commands)
    pub fn batches(&self) -> &[ModelBatch] {
        &self.batches
    }

    /// Sum of instance counts over all commands
    pub fn instance_count(&self) -> u32 {
        self.commands.iter().map(|command| command.instance_count).sum()
    }

    /// Record where this layer's list starts in the shared buffer
    pub fn set_base_offset(&mut self, offset: u32) {
        self.base_offset = offset;
    }

    /// Start of this layer's list in the shared buffer
    pub fn base_offset(&self) -> u32 {
        self.base_offset
    }

    /// Times the flat list has been rebuilt
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Layer this compiler serves
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// Append one multi-draw call per model batch
    pub fn emit_draws(&self, draws: &mut Vec<IndirectDraw>) {
        draws.extend(self.batches.iter().map(|batch| IndirectDraw {
            layer: self.layer,
            model: batch.model,
            first_command: self.base_offset + batch.first_command,
            draw_count: batch.draw_count,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::slots::ResourceTable;
    use crate::scene::ObjectDescriptor;
    use nalgebra::Matrix4;

    const LAYER: LayerId = LayerId(0);

    struct Fixture {
        resources: ResourceTable,
        objects: ObjectRecordTable,
        models: HashMap<ObjectId, ModelInfo>,
        compiler: LayerBatchCompiler,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                resources: ResourceTable::new(4, 1),
                objects: ObjectRecordTable::new(64, 1),
                models: HashMap::new(),
                compiler: LayerBatchCompiler::new(LAYER),
            }
        }

        fn create(&mut self, id: u32, model: Option<u32>) -> ObjectId {
            let object = ObjectId(id);
            self.objects
                .upsert(object, LAYER, &ObjectDescriptor::new(Matrix4::identity()), &mut self.resources)
                .unwrap();
            if let Some(model) = model {
                self.models.insert(object, ModelInfo { id: ModelId(model), index_count: 3 * model });
            }
            object
        }

        fn destroy(&mut self, object: ObjectId) {
            self.objects.remove(object, &mut self.resources).unwrap();
            self.models.remove(&object);
        }

        fn compile(&mut self, changes: &LayerChanges) -> bool {
            let models = &self.models;
            self.compiler
                .compile(changes, &self.objects, |object| models.get(&object).copied())
        }
    }

    fn updated(ids: &[ObjectId]) -> LayerChanges {
        LayerChanges {
            created: ids.to_vec(),
            updated: ids.to_vec(),
            destroyed: Vec::new(),
        }
    }

    #[test]
    fn test_groups_by_model_in_stable_order() {
        let mut fx = Fixture::new();
        let a = fx.create(1, Some(7));
        let b = fx.create(2, Some(3));
        let c = fx.create(3, Some(7));
        assert!(fx.compile(&updated(&[a, b, c])));

        let batches = fx.compiler.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], ModelBatch { model: ModelId(3), first_command: 0, draw_count: 1 });
        assert_eq!(batches[1], ModelBatch { model: ModelId(7), first_command: 1, draw_count: 2 });

        let slots: Vec<u32> = fx.compiler.commands().iter().map(|c| c.first_instance).collect();
        assert_eq!(
            slots,
            vec![
                fx.objects.slot_of(b).unwrap(),
                fx.objects.slot_of(a).unwrap(),
                fx.objects.slot_of(c).unwrap()
            ]
        );
        assert_eq!(fx.compiler.commands()[0].index_count, 9);
    }

    #[test]
    fn test_unchanged_tick_reuses_list() {
        let mut fx = Fixture::new();
        let a = fx.create(1, Some(1));
        fx.compile(&updated(&[a]));
        let before = fx.compiler.commands().to_vec();
        let rebuilds = fx.compiler.rebuilds();

        assert!(!fx.compile(&LayerChanges::default()));
        // A transform-only update leaves every command identical
        assert!(!fx.compile(&LayerChanges { updated: vec![a], ..LayerChanges::default() }));
        assert_eq!(fx.compiler.commands(), before.as_slice());
        assert_eq!(fx.compiler.rebuilds(), rebuilds);
    }

    #[test]
    fn test_model_change_moves_object() {
        let mut fx = Fixture::new();
        let a = fx.create(1, Some(1));
        let b = fx.create(2, Some(1));
        fx.compile(&updated(&[a, b]));

        fx.models.insert(a, ModelInfo { id: ModelId(2), index_count: 6 });
        assert!(fx.compile(&LayerChanges { updated: vec![a], ..LayerChanges::default() }));
        let models: Vec<ModelId> = fx.compiler.batches().iter().map(|b| b.model).collect();
        assert_eq!(models, vec![ModelId(1), ModelId(2)]);
        assert_eq!(fx.compiler.instance_count(), 2);
    }

    #[test]
    fn test_unmodeled_objects_skipped_and_model_loss_removes() {
        let mut fx = Fixture::new();
        let light = fx.create(1, None);
        let mesh = fx.create(2, Some(4));
        fx.compile(&updated(&[light, mesh]));
        assert_eq!(fx.compiler.commands().len(), 1);

        fx.models.remove(&mesh);
        assert!(fx.compile(&LayerChanges { updated: vec![mesh], ..LayerChanges::default() }));
        assert!(fx.compiler.commands().is_empty());
        assert!(fx.compiler.batches().is_empty());
    }

    #[test]
    fn test_destroy_of_unknown_is_not_a_change() {
        let mut fx = Fixture::new();
        let changes = LayerChanges { destroyed: vec![ObjectId(99)], ..LayerChanges::default() };
        assert!(!fx.compile(&changes));
    }

    #[test]
    fn test_emit_draws_applies_base_offset() {
        let mut fx = Fixture::new();
        let a = fx.create(1, Some(1));
        let b = fx.create(2, Some(2));
        fx.compile(&updated(&[a, b]));
        fx.compiler.set_base_offset(10);

        let mut draws = Vec::new();
        fx.compiler.emit_draws(&mut draws);
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].first_command, 10);
        assert_eq!(draws[1].first_command, 11);
        assert!(draws.iter().all(|d| d.layer == LAYER && d.draw_count == 1));
    }

    #[test]
    fn test_instance_count_matches_live_modeled_objects_under_churn() {
        let mut fx = Fixture::new();
        let mut live: Vec<ObjectId> = Vec::new();
        let mut next = 0;
        let mut state = 0x9e37_79b9_u32;

        for _ in 0..200 {
            let mut changes = LayerChanges::default();
            for _ in 0..4 {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                match state % 4 {
                    0 | 1 if live.len() < 60 => {
                        let model = if state % 5 == 0 { None } else { Some(state % 3 + 1) };
                        let object = fx.create(next, model);
                        next += 1;
                        live.push(object);
                        changes.created.push(object);
                        changes.updated.push(object);
                    }
                    2 if !live.is_empty() => {
                        let object = live.swap_remove((state as usize) % live.len());
                        fx.destroy(object);
                        changes.created.retain(|&o| o != object);
                        changes.updated.retain(|&o| o != object);
                        changes.destroyed.push(object);
                    }
                    _ if !live.is_empty() => {
                        let object = live[(state as usize) % live.len()];
                        fx.models.insert(object, ModelInfo { id: ModelId(state % 3 + 1), index_count: 3 });
                        changes.updated.push(object);
                    }
                    _ => {}
                }
            }
            changes.updated.sort();
            changes.updated.dedup();
            fx.compile(&changes);

            let modeled = live.iter().filter(|o| fx.models.contains_key(o)).count();
            assert_eq!(fx.compiler.instance_count() as usize, modeled);
            let drawn: u32 = fx.compiler.batches().iter().map(|b| b.draw_count).sum();
            assert_eq!(drawn as usize, fx.compiler.commands().len());
        }
    }
}
