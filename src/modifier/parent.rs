//! Parent modifier: a composite that dispatches lifecycle and `tweak`
//! calls to a fixed child list plus, optionally, a randomly drawn one.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::device::DeviceEvent;

use super::{Modifier, ModifierCtx, ModifierKind, ModifierMeta};

/// Produces a fresh child [`Modifier`] instance. Stored per candidate so a
/// parent can draw several independent children from the same kind.
pub type ChildFactory = Arc<dyn Fn() -> Modifier + Send + Sync>;

pub struct ParentModifier {
    fixed_children: Vec<Modifier>,
    random_children: Vec<Modifier>,
    /// Selectable pool for random mode: every modifier template with
    /// `allow_as_child == true` known to the engine at load time.
    candidate_pool: Vec<ChildFactory>,
    random: bool,
    value: usize,
}

impl ParentModifier {
    pub fn new(fixed_children: Vec<Modifier>, candidate_pool: Vec<ChildFactory>, random: bool, value: usize) -> Self {
        Self {
            fixed_children,
            random_children: Vec::new(),
            candidate_pool,
            random,
            value,
        }
    }

    fn all_children_mut(&mut self) -> impl Iterator<Item = &mut Modifier> {
        self.fixed_children.iter_mut().chain(self.random_children.iter_mut())
    }
}

impl ModifierKind for ParentModifier {
    fn begin(&mut self, _meta: ModifierMeta, ctx: &mut ModifierCtx) {
        if self.random && self.value > 0 {
            let mut pool: Vec<&ChildFactory> = self.candidate_pool.iter().collect();
            pool.shuffle(&mut rand::thread_rng());
            self.random_children = pool
                .into_iter()
                .take(self.value)
                .map(|factory| {
                    let mut child = factory();
                    child.allow_as_child = false;
                    child
                })
                .collect();
        }
        for child in self.all_children_mut() {
            child._begin(ctx);
        }
    }

    fn update(&mut self, _meta: ModifierMeta, ctx: &mut ModifierCtx, dt_us: u64) {
        for child in self.all_children_mut() {
            child._update(ctx, dt_us, false);
        }
    }

    fn finish(&mut self, _meta: ModifierMeta, ctx: &mut ModifierCtx) {
        for child in self.all_children_mut() {
            child._finish(ctx);
        }
        self.random_children.clear();
    }

    fn remap(&mut self, _meta: ModifierMeta, ctx: &mut ModifierCtx, event: DeviceEvent) -> Option<DeviceEvent> {
        let mut current = Some(event);
        for child in self.all_children_mut() {
            current = match current {
                Some(ev) => child.remap(ctx, ev),
                None => return None,
            };
        }
        current
    }

    fn tweak(&mut self, _meta: ModifierMeta, ctx: &mut ModifierCtx, event: DeviceEvent) -> Option<DeviceEvent> {
        let mut current = Some(event);
        for child in self.all_children_mut() {
            current = match current {
                Some(ev) => child._tweak(ctx, ev),
                None => return None,
            };
        }
        current
    }
}
