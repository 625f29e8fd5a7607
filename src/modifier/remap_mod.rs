//! Remap modifier: installs a cascading remap batch at `begin` and
//! performs the actual per-event translation in `remap`, against the
//! engine-wide shared [`RemapTable`](crate::remap::RemapTable).

use rand::seq::SliceRandom;

use crate::device::DeviceEvent;
use crate::remap::RemapRecord;
use crate::signal::ControllerSignal;

use super::{ModifierCtx, ModifierKind, ModifierMeta};

/// Mutually exclusive remap configuration: a modifier picks one or the
/// other, never both.
pub enum RemapConfig {
    Fixed(Vec<(ControllerSignal, RemapRecord)>),
    /// Declared source set; `begin` permutes destinations among them
    /// uniformly without replacement.
    Random(Vec<ControllerSignal>),
}

pub struct RemapModifier {
    config: RemapConfig,
}

impl RemapModifier {
    pub fn new(config: RemapConfig) -> Self {
        Self { config }
    }
}

impl ModifierKind for RemapModifier {
    fn begin(&mut self, _meta: ModifierMeta, ctx: &mut ModifierCtx) {
        let batch = match &self.config {
            RemapConfig::Fixed(entries) => entries.clone(),
            RemapConfig::Random(sources) => {
                let mut targets = sources.clone();
                targets.shuffle(&mut rand::thread_rng());
                sources
                    .iter()
                    .zip(targets.iter())
                    .map(|(&from, &to)| {
                        (
                            from,
                            RemapRecord {
                                to,
                                ..RemapRecord::identity(from)
                            },
                        )
                    })
                    .collect()
            }
        };
        ctx.remap_table.install_cascading(batch);
    }

    fn remap(&mut self, meta: ModifierMeta, ctx: &mut ModifierCtx, event: DeviceEvent) -> Option<DeviceEvent> {
        let now = event.time;
        let translated = ctx.remap_table.translate(event, ctx.touchpad, now);
        for synth in translated.synthetic {
            ctx.injector.fake_pipelined_event(synth, meta.name);
        }
        translated.primary
    }
}
