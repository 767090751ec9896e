use serde::{Deserialize, Serialize};

/// Where a tempo figure came from. Higher-priority data replaces lower:
/// markup written in the score beats anything derived by a rendering
/// engine, which beats the session default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TempoSource {
    CachedDefault,
    EngineDerived,
    ScoreMarkup,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasureTempo {
    pub bpm: f64,
    pub source: TempoSource,
}

/// Tempo-by-measure lookups. A miss is an expected outcome, not an error:
/// scores frequently carry no tempo markup at all.
pub trait TempoDataSource: Send {
    fn measure_tempo(&self, measure_index: u32) -> Option<MeasureTempo>;
}
