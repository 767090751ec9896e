use etude_core::{DelayKind, DelayPolicy, TempoContext, TempoService};
use etude_ports::tempo::{MeasureTempo, TempoDataSource, TempoSource};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

struct FixedSource {
    tempo: Option<MeasureTempo>,
    calls: Arc<AtomicU32>,
}

impl TempoDataSource for FixedSource {
    fn measure_tempo(&self, _measure_index: u32) -> Option<MeasureTempo> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.tempo
    }
}

fn service_at(bpm: f64) -> TempoService {
    let source = FixedSource {
        tempo: Some(MeasureTempo {
            bpm,
            source: TempoSource::ScoreMarkup,
        }),
        calls: Arc::new(AtomicU32::new(0)),
    };
    TempoService::new(Some(Box::new(source)), DelayPolicy::default())
}

#[test]
fn baseline_follows_bpm_and_duration() {
    let mut service = service_at(120.0);
    let delay = service.compute_delay(0, &TempoContext::new(1.0));
    assert_eq!(delay.millis, 500);
    assert_eq!(delay.kind, DelayKind::Computed);

    let delay = service.compute_delay(0, &TempoContext::new(2.0));
    assert_eq!(delay.millis, 1_000);
}

#[test]
fn fermata_override_is_longer_than_baseline() {
    let mut service = service_at(120.0);

    let plain = service.compute_delay(
        0,
        &TempoContext {
            duration_beats: 1.0,
            note_id: Some("note-123".to_string()),
        },
    );
    let fermata = service.compute_delay(
        0,
        &TempoContext {
            duration_beats: 1.0,
            note_id: Some("note-with-fermata".to_string()),
        },
    );

    assert_eq!(plain.kind, DelayKind::Computed);
    assert_eq!(fermata.kind, DelayKind::FermataHold);
    assert!(fermata.millis > plain.millis);
    assert_eq!(fermata.millis, 1_250);
}

#[test]
fn phrase_override_sits_between_baseline_and_fermata() {
    let mut service = service_at(120.0);

    let plain = service.compute_delay(0, &TempoContext::new(1.0));
    let phrase = service.compute_delay(
        0,
        &TempoContext {
            duration_beats: 1.0,
            note_id: Some("phrase-end-7".to_string()),
        },
    );
    let fermata = service.compute_delay(
        0,
        &TempoContext {
            duration_beats: 1.0,
            note_id: Some("fermata-3".to_string()),
        },
    );

    assert_eq!(phrase.kind, DelayKind::PhraseBreath);
    assert!(plain.millis < phrase.millis);
    assert!(phrase.millis < fermata.millis);
}

#[test]
fn fermata_wins_when_both_tags_occur() {
    let mut service = service_at(120.0);
    let delay = service.compute_delay(
        0,
        &TempoContext {
            duration_beats: 1.0,
            note_id: Some("phrase-end-fermata".to_string()),
        },
    );
    assert_eq!(delay.kind, DelayKind::FermataHold);
}

#[test]
fn lookup_miss_takes_the_fallback_path() {
    let policy = DelayPolicy {
        fallback_ms: 750,
        ..DelayPolicy::default()
    };
    let mut service = TempoService::new(None, policy);

    let delay = service.compute_delay(3, &TempoContext::new(4.0));
    // Fixed value, not duration-scaled, and a distinct kind for telemetry.
    assert_eq!(delay.millis, 750);
    assert_eq!(delay.kind, DelayKind::Fallback);
}

#[test]
fn fallback_still_honors_fermata_override() {
    let mut service = TempoService::new(None, DelayPolicy::default());
    let delay = service.compute_delay(
        0,
        &TempoContext {
            duration_beats: 1.0,
            note_id: Some("fermata-1".to_string()),
        },
    );
    assert_eq!(delay.kind, DelayKind::FermataHold);
    assert_eq!(delay.millis, 2_500);
}

#[test]
fn source_is_consulted_once_per_measure() {
    let calls = Arc::new(AtomicU32::new(0));
    let source = FixedSource {
        tempo: Some(MeasureTempo {
            bpm: 100.0,
            source: TempoSource::ScoreMarkup,
        }),
        calls: calls.clone(),
    };
    let mut service = TempoService::new(Some(Box::new(source)), DelayPolicy::default());

    for _ in 0..10 {
        service.compute_delay(2, &TempoContext::new(1.0));
    }
    assert_eq!(calls.load(Ordering::Relaxed), 1);

    service.compute_delay(3, &TempoContext::new(1.0));
    assert_eq!(calls.load(Ordering::Relaxed), 2);
}

#[test]
fn markup_outranks_engine_derived_and_default() {
    let mut service = TempoService::new(None, DelayPolicy::default());

    service.set_measure_tempo(
        0,
        MeasureTempo {
            bpm: 90.0,
            source: TempoSource::EngineDerived,
        },
    );
    service.set_measure_tempo(
        0,
        MeasureTempo {
            bpm: 120.0,
            source: TempoSource::ScoreMarkup,
        },
    );
    // A late lower-priority figure must not displace the markup.
    service.set_measure_tempo(
        0,
        MeasureTempo {
            bpm: 60.0,
            source: TempoSource::CachedDefault,
        },
    );

    let tempo = service.tempo_for_measure(0).unwrap();
    assert_eq!(tempo.bpm, 120.0);
    assert_eq!(tempo.source, TempoSource::ScoreMarkup);
}

#[test]
fn tempo_carries_forward_to_later_measures() {
    let mut service = TempoService::new(None, DelayPolicy::default());
    service.set_measure_tempo(
        2,
        MeasureTempo {
            bpm: 80.0,
            source: TempoSource::ScoreMarkup,
        },
    );

    assert_eq!(service.tempo_for_measure(1), None);
    assert_eq!(service.tempo_for_measure(7).unwrap().bpm, 80.0);
}

#[test]
fn fixed_delay_is_its_own_kind() {
    let service = TempoService::new(None, DelayPolicy::default());
    let delay = service.fixed_delay();
    assert_eq!(delay.kind, DelayKind::Fixed);
    assert_eq!(delay.millis, 1_000);
}
