use etude_domain_score::{
    ExpectedStep, NoteSpec, SequenceError, StepError, StepProvider, VecStepProvider,
};
use pretty_assertions::assert_eq;

#[test]
fn note_spec_spells_pitches() {
    let middle_c = NoteSpec::from_midi(60);
    assert_eq!(middle_c.pitch_name, "C");
    assert_eq!(middle_c.octave, 4);

    let c_sharp = NoteSpec::from_midi(61);
    assert_eq!(c_sharp.pitch_name, "C#");
    assert_eq!(c_sharp.octave, 4);

    let lowest = NoteSpec::from_midi(0);
    assert_eq!(lowest.pitch_name, "C");
    assert_eq!(lowest.octave, -1);

    let highest = NoteSpec::from_midi(127);
    assert_eq!(highest.pitch_name, "G");
    assert_eq!(highest.octave, 9);
}

#[test]
fn chord_constructor_sorts_and_dedups() {
    let step = ExpectedStep::chord(1, 0, 1.0, &[64, 60, 64, 67]);
    assert!(step.is_chord);
    assert_eq!(step.midi_values().collect::<Vec<_>>(), vec![60, 64, 67]);
    assert!(step.validate().is_ok());
}

#[test]
fn single_note_is_not_a_chord() {
    let step = ExpectedStep::single(1, 0, 1.0, 60);
    assert!(!step.is_chord);
    assert!(!step.is_rest);
    assert!(step.validate().is_ok());
}

#[test]
fn validate_rejects_rest_with_notes() {
    let mut step = ExpectedStep::rest(1, 0, 1.0);
    step.notes.push(NoteSpec::from_midi(60));
    assert_eq!(step.validate(), Err(StepError::RestWithNotes(1)));
}

#[test]
fn validate_rejects_underfilled_chord() {
    let mut step = ExpectedStep::single(1, 0, 1.0, 60);
    step.is_chord = true;
    assert_eq!(step.validate(), Err(StepError::ChordUnderfilled(1)));
}

#[test]
fn validate_rejects_duplicate_notes() {
    let mut step = ExpectedStep::single(1, 0, 1.0, 60);
    step.notes.push(NoteSpec::from_midi(60));
    assert_eq!(step.validate(), Err(StepError::DuplicateNote(60)));
}

#[test]
fn validate_rejects_non_positive_duration() {
    let step = ExpectedStep::single(1, 0, 0.0, 60);
    assert_eq!(step.validate(), Err(StepError::NonPositiveDuration));
}

#[test]
fn provider_rejects_decreasing_measure_indices() {
    let steps = vec![
        ExpectedStep::single(1, 2, 1.0, 60),
        ExpectedStep::single(2, 1, 1.0, 62),
    ];
    let err = VecStepProvider::new(steps).expect_err("construction should fail");
    assert!(matches!(err, SequenceError::Malformed { index: 1, .. }));
}

#[test]
fn provider_rejects_malformed_steps() {
    let mut bad = ExpectedStep::rest(1, 0, 1.0);
    bad.notes.push(NoteSpec::from_midi(60));
    let err = VecStepProvider::new(vec![bad]).expect_err("construction should fail");
    assert!(matches!(err, SequenceError::Malformed { index: 0, .. }));
}

#[test]
fn cursor_moves_within_bounds() {
    let steps = vec![
        ExpectedStep::single(1, 0, 1.0, 60),
        ExpectedStep::single(2, 0, 1.0, 62),
    ];
    let mut provider = VecStepProvider::new(steps).expect("steps are well-formed");
    assert_eq!(provider.cursor(), 0);
    assert_eq!(provider.len(), 2);

    provider.move_cursor(1).expect("index 1 exists");
    assert_eq!(provider.cursor(), 1);
    assert_eq!(provider.step(1).unwrap().midi_values().next(), Some(62));

    let err = provider.move_cursor(2).expect_err("index 2 is out of range");
    assert!(matches!(err, SequenceError::OutOfRange(2)));
    assert_eq!(provider.cursor(), 1);
}

#[test]
fn steps_are_returned_by_index() {
    let steps = vec![ExpectedStep::single(1, 0, 1.0, 60)];
    let provider = VecStepProvider::new(steps).expect("steps are well-formed");
    assert!(provider.step(0).is_ok());
    assert!(matches!(
        provider.step(5),
        Err(SequenceError::OutOfRange(5))
    ));
}
