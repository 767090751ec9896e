use etude_domain_eval::{all_expected_held, compare_notes, ComparisonResult};
use etude_domain_score::ExpectedStep;
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

fn single(midi: u8) -> ExpectedStep {
    ExpectedStep::single(1, 0, 1.0, midi)
}

fn chord(notes: &[u8]) -> ExpectedStep {
    ExpectedStep::chord(1, 0, 1.0, notes)
}

fn rest() -> ExpectedStep {
    ExpectedStep::rest(1, 0, 1.0)
}

#[test]
fn single_correct_note() {
    assert_eq!(compare_notes(&[60], &single(60)), ComparisonResult::Correct);
}

#[test]
fn missing_note_in_chord() {
    assert_eq!(
        compare_notes(&[60], &chord(&[60, 64])),
        ComparisonResult::MissingNotes { missing: vec![64] }
    );
}

#[test]
fn extra_note_is_wrong() {
    assert_eq!(
        compare_notes(&[60, 61], &single(60)),
        ComparisonResult::WrongNotes {
            wrong: vec![61],
            expected: vec![60],
        }
    );
}

#[test]
fn rest_is_correct_for_any_input() {
    assert_eq!(compare_notes(&[], &rest()), ComparisonResult::Correct);
    assert_eq!(
        compare_notes(&[60, 61, 62], &rest()),
        ComparisonResult::Correct
    );
}

#[test]
fn playing_exactly_the_expected_set_is_correct() {
    for notes in [vec![60], vec![60, 64], vec![48, 52, 55, 60, 64]] {
        let step = chord(&notes);
        let played: Vec<i32> = notes.iter().map(|&n| i32::from(n)).collect();
        assert_eq!(compare_notes(&played, &step), ComparisonResult::Correct);
    }
}

#[test]
fn played_order_does_not_matter() {
    let step = chord(&[60, 64]);
    assert_eq!(
        compare_notes(&[60, 64], &step),
        compare_notes(&[64, 60], &step)
    );

    let wrong_step = single(60);
    assert_eq!(
        compare_notes(&[61, 60], &wrong_step),
        compare_notes(&[60, 61], &wrong_step)
    );
}

#[test]
fn duplicates_collapse() {
    let step = single(60);
    assert_eq!(
        compare_notes(&[60, 60, 60], &step),
        compare_notes(&[60], &step)
    );

    // A repeated wrong note is reported once.
    assert_eq!(
        compare_notes(&[61, 61, 62], &step),
        ComparisonResult::WrongNotes {
            wrong: vec![61, 62],
            expected: vec![60],
        }
    );
}

#[test]
fn strict_superset_is_wrong_never_missing() {
    assert_eq!(
        compare_notes(&[60, 64, 67], &chord(&[60, 64])),
        ComparisonResult::WrongNotes {
            wrong: vec![67],
            expected: vec![60, 64],
        }
    );
}

#[test]
fn wrong_takes_precedence_over_missing() {
    // 61 substituted for 64: both a wrong note and a missing note exist.
    assert_eq!(
        compare_notes(&[60, 61], &chord(&[60, 64])),
        ComparisonResult::WrongNotes {
            wrong: vec![61],
            expected: vec![60, 64],
        }
    );
}

#[test]
fn out_of_range_values_surface_as_wrong() {
    assert_eq!(
        compare_notes(&[60, 200, -5], &single(60)),
        ComparisonResult::WrongNotes {
            wrong: vec![200, -5],
            expected: vec![60],
        }
    );
}

#[test]
fn missing_follows_expected_note_order() {
    assert_eq!(
        compare_notes(&[64], &chord(&[60, 64, 67])),
        ComparisonResult::MissingNotes {
            missing: vec![60, 67],
        }
    );
}

#[test]
fn all_expected_held_tracks_chord_progress() {
    let step = chord(&[60, 64]);
    assert!(!all_expected_held(&[60], &step));
    assert!(all_expected_held(&[60, 64], &step));
    assert!(all_expected_held(&[60, 64, 99], &step));
}

#[test]
fn ten_note_chord_p99_under_one_millisecond() {
    let notes: Vec<u8> = (60..70).collect();
    let step = chord(&notes);
    let played: Vec<i32> = (60..70).collect();

    let mut timings: Vec<Duration> = Vec::with_capacity(1000);
    for _ in 0..1000 {
        let start = Instant::now();
        let result = compare_notes(&played, &step);
        timings.push(start.elapsed());
        assert_eq!(result, ComparisonResult::Correct);
    }

    timings.sort();
    let p99 = timings[989];
    assert!(p99 < Duration::from_millis(1), "p99 was {p99:?}");
}
