use etude_domain_score::ExpectedStep;
use etude_ports::storage::SettingsDto;
use etude_ports::tempo::{MeasureTempo, TempoDataSource};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Per-step input to delay computation.
#[derive(Clone, Debug)]
pub struct TempoContext {
    pub duration_beats: f64,
    /// Notation-layer tag; "fermata" / "phrase" substrings select overrides.
    pub note_id: Option<String>,
}

impl TempoContext {
    pub fn new(duration_beats: f64) -> Self {
        Self {
            duration_beats,
            note_id: None,
        }
    }

    pub fn for_step(step: &ExpectedStep) -> Self {
        Self {
            duration_beats: step.duration_beats,
            note_id: step.note_id.clone(),
        }
    }

    fn has_tag(&self, tag: &str) -> bool {
        self.note_id.as_deref().map_or(false, |id| id.contains(tag))
    }
}

/// Which code path produced a delay. A fallback is never reported as
/// `Computed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelayKind {
    Computed,
    FermataHold,
    PhraseBreath,
    Fallback,
    Fixed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDelay {
    pub millis: u64,
    pub kind: DelayKind,
}

/// Override magnitudes and fallbacks are policy, not constants.
#[derive(Clone, Copy, Debug)]
pub struct DelayPolicy {
    pub fermata_scale: f64,
    pub phrase_scale: f64,
    pub fallback_ms: u64,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self {
            fermata_scale: 2.5,
            phrase_scale: 1.5,
            fallback_ms: 1_000,
        }
    }
}

impl DelayPolicy {
    pub fn from_settings(settings: &SettingsDto) -> Self {
        Self {
            fermata_scale: settings.fermata_scale.max(1.0),
            phrase_scale: settings.phrase_scale.max(1.0),
            fallback_ms: settings.fallback_delay_ms.max(1),
        }
    }
}

/// Wraps a tempo data source with a by-measure cache so lookups stay well
/// under a millisecond: the source is consulted at most once per measure,
/// and priority merging (markup > engine-derived > cached default) happens
/// at insertion time.
pub struct TempoService {
    source: Option<Box<dyn TempoDataSource>>,
    cache: BTreeMap<u32, MeasureTempo>,
    queried: HashSet<u32>,
    policy: DelayPolicy,
}

impl TempoService {
    pub fn new(source: Option<Box<dyn TempoDataSource>>, policy: DelayPolicy) -> Self {
        Self {
            source,
            cache: BTreeMap::new(),
            queried: HashSet::new(),
            policy,
        }
    }

    pub fn policy(&self) -> DelayPolicy {
        self.policy
    }

    /// Feed tempo data from outside the wrapped source (engine-derived
    /// figures, a session default). Lower-priority data never displaces
    /// what a better source already provided for the same measure.
    pub fn set_measure_tempo(&mut self, measure_index: u32, tempo: MeasureTempo) {
        match self.cache.get(&measure_index) {
            Some(existing) if existing.source > tempo.source => {}
            _ => {
                self.cache.insert(measure_index, tempo);
            }
        }
    }

    /// Tempo in effect at a measure: nearest cached entry at or before it,
    /// after consulting the source once for this measure.
    pub fn tempo_for_measure(&mut self, measure_index: u32) -> Option<MeasureTempo> {
        if self.queried.insert(measure_index) {
            if let Some(tempo) = self
                .source
                .as_ref()
                .and_then(|source| source.measure_tempo(measure_index))
            {
                self.set_measure_tempo(measure_index, tempo);
            }
        }
        self.cache
            .range(..=measure_index)
            .next_back()
            .map(|(_, tempo)| *tempo)
    }

    /// Delay before the cursor advances past a step at `measure_index`.
    pub fn compute_delay(&mut self, measure_index: u32, ctx: &TempoContext) -> StepDelay {
        let baseline = match self.tempo_for_measure(measure_index) {
            Some(tempo) => StepDelay {
                millis: ((60_000.0 / tempo.bpm) * ctx.duration_beats).round() as u64,
                kind: DelayKind::Computed,
            },
            None => {
                warn!(
                    "no tempo data at measure {}; using fallback delay {}ms",
                    measure_index, self.policy.fallback_ms
                );
                StepDelay {
                    millis: self.policy.fallback_ms,
                    kind: DelayKind::Fallback,
                }
            }
        };

        if ctx.has_tag("fermata") {
            let millis = scale_millis(baseline.millis, self.policy.fermata_scale);
            debug!("fermata hold: {}ms -> {}ms", baseline.millis, millis);
            return StepDelay {
                millis,
                kind: DelayKind::FermataHold,
            };
        }
        if ctx.has_tag("phrase") {
            let millis = scale_millis(baseline.millis, self.policy.phrase_scale);
            debug!("phrase breath: {}ms -> {}ms", baseline.millis, millis);
            return StepDelay {
                millis,
                kind: DelayKind::PhraseBreath,
            };
        }
        baseline
    }

    /// Constant pacing for sessions that ignore score tempo entirely.
    pub fn fixed_delay(&self) -> StepDelay {
        StepDelay {
            millis: self.policy.fallback_ms,
            kind: DelayKind::Fixed,
        }
    }
}

fn scale_millis(millis: u64, scale: f64) -> u64 {
    (millis as f64 * scale).round() as u64
}
