use etude_domain_score::{import_practice_bytes, ScoreImportError};
use etude_ports::tempo::{TempoDataSource, TempoSource};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use pretty_assertions::assert_eq;

fn build_midi(track: Vec<TrackEvent<'static>>) -> Vec<u8> {
    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(u15::new(480)),
        },
        tracks: vec![track],
    };
    let mut data = Vec::new();
    smf.write(&mut data).expect("midi write should succeed");
    data
}

fn note_on(delta: u32, key: u8) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(100),
            },
        },
    }
}

fn tempo(delta: u32, us_per_quarter: u32) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(us_per_quarter))),
    }
}

fn end_of_track() -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

#[test]
fn simultaneous_notes_group_into_one_chord_step() {
    let midi = build_midi(vec![
        tempo(0, 500_000),
        note_on(0, 60),
        note_on(0, 64),
        note_on(480, 62),
        end_of_track(),
    ]);

    let score = import_practice_bytes(&midi).expect("import should succeed");
    assert_eq!(score.ppq, 480);
    assert_eq!(score.steps.len(), 2);

    let chord = &score.steps[0];
    assert!(chord.is_chord);
    assert!(!chord.is_rest);
    let values: Vec<u8> = chord.midi_values().collect();
    assert_eq!(values, vec![60, 64]);
    assert_eq!(chord.measure_index, 0);
    assert_eq!(chord.duration_beats, 1.0);

    let single = &score.steps[1];
    assert!(!single.is_chord);
    assert_eq!(single.midi_values().collect::<Vec<_>>(), vec![62]);
    // Last step falls back to one beat.
    assert_eq!(single.duration_beats, 1.0);
}

#[test]
fn empty_measures_become_rest_steps() {
    // Notes at tick 0 (measure 0) and tick 3840 (measure 2, 4/4 at 480 ppq).
    let midi = build_midi(vec![
        note_on(0, 60),
        note_on(3840, 62),
        end_of_track(),
    ]);

    let score = import_practice_bytes(&midi).expect("import should succeed");
    assert_eq!(score.steps.len(), 3);

    assert_eq!(score.steps[0].measure_index, 0);
    // Inter-onset gap is capped at one measure of beats.
    assert_eq!(score.steps[0].duration_beats, 4.0);

    let rest = &score.steps[1];
    assert!(rest.is_rest);
    assert!(rest.notes.is_empty());
    assert_eq!(rest.measure_index, 1);
    assert_eq!(rest.duration_beats, 4.0);

    assert_eq!(score.steps[2].measure_index, 2);
}

#[test]
fn tempo_markup_maps_to_measures_and_carries_forward() {
    let midi = build_midi(vec![
        tempo(0, 500_000),
        note_on(0, 60),
        tempo(1920, 400_000),
        note_on(0, 62),
        end_of_track(),
    ]);

    let score = import_practice_bytes(&midi).expect("import should succeed");
    let map = score.tempo_map();

    let measure0 = map.measure_tempo(0).expect("measure 0 should have tempo");
    assert_eq!(measure0.bpm, 120.0);
    assert_eq!(measure0.source, TempoSource::ScoreMarkup);

    let measure1 = map.measure_tempo(1).expect("measure 1 should have tempo");
    assert_eq!(measure1.bpm, 150.0);

    // The last marking stays in effect for later measures.
    assert_eq!(map.measure_tempo(9).expect("carried").bpm, 150.0);
}

#[test]
fn step_ids_are_sequential_and_measures_monotonic() {
    let midi = build_midi(vec![
        note_on(0, 60),
        note_on(480, 62),
        note_on(480, 64),
        note_on(2880, 65),
        end_of_track(),
    ]);

    let score = import_practice_bytes(&midi).expect("import should succeed");
    let ids: Vec<u64> = score.steps.iter().map(|s| s.id).collect();
    assert_eq!(ids, (1..=score.steps.len() as u64).collect::<Vec<_>>());

    let mut last = 0u32;
    for step in &score.steps {
        assert!(step.measure_index >= last);
        last = step.measure_index;
    }
}

#[test]
fn score_without_notes_is_rejected() {
    let midi = build_midi(vec![tempo(0, 500_000), end_of_track()]);
    let err = import_practice_bytes(&midi).expect_err("import should fail");
    assert!(matches!(err, ScoreImportError::Empty));
}

#[test]
fn velocity_zero_note_on_is_not_a_step() {
    let silent = TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn {
                key: u7::new(60),
                vel: u7::new(0),
            },
        },
    };
    let midi = build_midi(vec![silent, end_of_track()]);
    let err = import_practice_bytes(&midi).expect_err("import should fail");
    assert!(matches!(err, ScoreImportError::Empty));
}
