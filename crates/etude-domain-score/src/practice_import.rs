use crate::model::ExpectedStep;
use etude_ports::tempo::{MeasureTempo, TempoDataSource, TempoSource};
use etude_ports::types::Tick;
use midly::{Fps, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum ScoreImportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("score contains no notes")]
    Empty,
}

/// Practice-ready extraction of a Standard MIDI File: the ordered step
/// sequence plus the tempo markup found along the way.
#[derive(Clone, Debug)]
pub struct PracticeScore {
    pub title: Option<String>,
    pub ppq: u16,
    pub steps: Vec<ExpectedStep>,
    pub tempo_by_measure: BTreeMap<u32, MeasureTempo>,
}

impl PracticeScore {
    pub fn tempo_map(&self) -> ScoreTempoMap {
        ScoreTempoMap::new(self.tempo_by_measure.clone())
    }
}

/// Tempo-by-measure view over score markup. Lookups resolve to the nearest
/// tempo at or before the requested measure, matching how a tempo marking
/// stays in effect until the next one.
#[derive(Clone, Debug, Default)]
pub struct ScoreTempoMap {
    by_measure: BTreeMap<u32, MeasureTempo>,
}

impl ScoreTempoMap {
    pub fn new(by_measure: BTreeMap<u32, MeasureTempo>) -> Self {
        Self { by_measure }
    }
}

impl TempoDataSource for ScoreTempoMap {
    fn measure_tempo(&self, measure_index: u32) -> Option<MeasureTempo> {
        self.by_measure
            .range(..=measure_index)
            .next_back()
            .map(|(_, tempo)| *tempo)
    }
}

pub fn import_practice_path(path: &Path) -> Result<PracticeScore, ScoreImportError> {
    let data = std::fs::read(path).map_err(|e| ScoreImportError::Io(e.to_string()))?;
    import_practice_bytes(&data)
}

pub fn import_practice_bytes(data: &[u8]) -> Result<PracticeScore, ScoreImportError> {
    let smf = Smf::parse(data).map_err(|e| ScoreImportError::Parse(e.to_string()))?;
    let (ppq, tempo_override) = match smf.header.timing {
        Timing::Metrical(ticks) => (ticks.as_int(), None),
        Timing::Timecode(fps, ticks_per_frame) => {
            let (ppq, us_per_quarter) = timecode_ppq_and_tempo(fps, ticks_per_frame);
            (ppq, Some(us_per_quarter))
        }
    };

    let mut title: Option<String> = None;
    let mut tempo_points: BTreeMap<Tick, u32> = BTreeMap::new();
    let mut time_sigs: Vec<(Tick, u8, u8)> = Vec::new();
    let mut note_ons: Vec<(Tick, u8)> = Vec::new();

    for track in &smf.tracks {
        let mut tick: Tick = 0;
        for event in track {
            tick += event.delta.as_int() as Tick;
            match &event.kind {
                TrackEventKind::Midi { message, .. } => {
                    if let MidiMessage::NoteOn { key, vel } = message {
                        if vel.as_int() > 0 {
                            note_ons.push((tick, key.as_int()));
                        }
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                    tempo_points.insert(tick, us_per_quarter.as_int());
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(num, den_pow2, _, _)) => {
                    // Denominators beyond a 64th note are not meaningful here.
                    time_sigs.push((tick, *num, 1u8 << (*den_pow2).min(6)));
                }
                TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                    if title.is_none() && !name.is_empty() {
                        title = Some(String::from_utf8_lossy(name).into_owned());
                    }
                }
                _ => {}
            }
        }
    }

    if note_ons.is_empty() {
        return Err(ScoreImportError::Empty);
    }

    let ruler = MeasureRuler::new(ppq, time_sigs);
    let steps = build_steps(ppq, &ruler, note_ons);
    let tempo_by_measure = build_tempo_by_measure(&ruler, tempo_points, tempo_override);

    Ok(PracticeScore {
        title,
        ppq,
        steps,
        tempo_by_measure,
    })
}

/// Tick-to-measure mapping under the active time signature.
struct MeasureRuler {
    segments: Vec<MeasureSegment>,
}

#[derive(Clone, Copy)]
struct MeasureSegment {
    start_tick: Tick,
    start_measure: u32,
    ticks_per_measure: i64,
    beats_per_measure: f64,
}

impl MeasureRuler {
    fn new(ppq: u16, mut sigs: Vec<(Tick, u8, u8)>) -> Self {
        if sigs.is_empty() || sigs[0].0 != 0 {
            sigs.insert(0, (0, 4, 4));
        }
        sigs.sort_by_key(|s| s.0);

        let mut segments: Vec<MeasureSegment> = Vec::with_capacity(sigs.len());
        for (tick, num, den) in sigs {
            let num = num.max(1) as i64;
            let den = den.max(1) as i64;
            let ticks_per_measure = (ppq as i64 * 4 * num / den).max(1);
            let beats_per_measure = 4.0 * num as f64 / den as f64;

            let start_measure = match segments.last() {
                Some(prev) => {
                    let delta = tick - prev.start_tick;
                    // Mid-measure signature changes round up to the next boundary.
                    let spanned = (delta + prev.ticks_per_measure - 1) / prev.ticks_per_measure;
                    prev.start_measure + spanned.max(0) as u32
                }
                None => 0,
            };

            segments.push(MeasureSegment {
                start_tick: tick,
                start_measure,
                ticks_per_measure,
                beats_per_measure,
            });
        }

        Self { segments }
    }

    fn segment_for_tick(&self, tick: Tick) -> MeasureSegment {
        let mut current = self.segments[0];
        for seg in &self.segments {
            if seg.start_tick > tick {
                break;
            }
            current = *seg;
        }
        current
    }

    fn measure_for_tick(&self, tick: Tick) -> u32 {
        let seg = self.segment_for_tick(tick);
        let delta = (tick - seg.start_tick).max(0);
        seg.start_measure + (delta / seg.ticks_per_measure) as u32
    }

    fn beats_per_measure_at(&self, tick: Tick) -> f64 {
        self.segment_for_tick(tick).beats_per_measure
    }
}

fn build_steps(ppq: u16, ruler: &MeasureRuler, mut note_ons: Vec<(Tick, u8)>) -> Vec<ExpectedStep> {
    note_ons.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut groups: Vec<(Tick, Vec<u8>)> = Vec::new();
    for (tick, note) in note_ons {
        match groups.last_mut() {
            Some((group_tick, notes)) if *group_tick == tick => notes.push(note),
            _ => groups.push((tick, vec![note])),
        }
    }

    let mut steps: Vec<ExpectedStep> = Vec::with_capacity(groups.len());
    let mut next_id: u64 = 1;
    for (idx, (tick, notes)) in groups.iter().enumerate() {
        let measure_index = ruler.measure_for_tick(*tick);

        if let Some(prev) = steps.last() {
            // Bridge whole empty measures with explicit rest steps.
            let mut rest_measure = prev.measure_index + 1;
            while rest_measure < measure_index {
                let beats = ruler.beats_per_measure_at(*tick);
                steps.push(ExpectedStep::rest(next_id, rest_measure, beats));
                next_id += 1;
                rest_measure += 1;
            }
        }

        let beats_per_measure = ruler.beats_per_measure_at(*tick);
        let duration_beats = match groups.get(idx + 1) {
            Some((next_tick, _)) => {
                let gap = (*next_tick - *tick) as f64 / ppq as f64;
                gap.clamp(0.25, beats_per_measure)
            }
            None => 1.0,
        };

        let step = if notes.len() == 1 {
            ExpectedStep::single(next_id, measure_index, duration_beats, notes[0])
        } else {
            ExpectedStep::chord(next_id, measure_index, duration_beats, notes)
        };
        next_id += 1;
        steps.push(step);
    }

    steps
}

fn build_tempo_by_measure(
    ruler: &MeasureRuler,
    tempo_points: BTreeMap<Tick, u32>,
    override_us_per_quarter: Option<u32>,
) -> BTreeMap<u32, MeasureTempo> {
    let mut map: BTreeMap<u32, MeasureTempo> = BTreeMap::new();

    if let Some(us_per_quarter) = override_us_per_quarter {
        map.insert(
            0,
            MeasureTempo {
                bpm: bpm_from_us(us_per_quarter),
                source: TempoSource::ScoreMarkup,
            },
        );
        return map;
    }

    // Later points within the same measure win, matching iteration order.
    for (tick, us_per_quarter) in tempo_points {
        let measure = ruler.measure_for_tick(tick);
        map.insert(
            measure,
            MeasureTempo {
                bpm: bpm_from_us(us_per_quarter),
                source: TempoSource::ScoreMarkup,
            },
        );
    }

    map
}

fn bpm_from_us(us_per_quarter: u32) -> f64 {
    60_000_000.0 / us_per_quarter.max(1) as f64
}

fn timecode_ppq_and_tempo(fps: Fps, ticks_per_frame: u8) -> (u16, u32) {
    let ticks_per_frame = ticks_per_frame.max(1) as u16;
    match fps {
        Fps::Fps24 => (24 * ticks_per_frame, 1_000_000),
        Fps::Fps25 => (25 * ticks_per_frame, 1_000_000),
        Fps::Fps30 => (30 * ticks_per_frame, 1_000_000),
        Fps::Fps29 => (30 * ticks_per_frame, 1_001_000),
    }
}
