use etude_domain_score::ExpectedStep;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Outcome of comparing a played-note set against an expected step.
///
/// Exactly one variant applies. When both extraneous and missing notes
/// occur, the result is `WrongNotes`: extraneous notes take precedence
/// over missing-note reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonResult {
    Correct,
    /// Expected values not present among played notes, in expected-note
    /// order. Only reported when nothing extraneous was played.
    MissingNotes { missing: Vec<i32> },
    /// Played values absent from the expected set, in first-encounter
    /// order with duplicates removed; `expected` lists the full expected
    /// set in expected-note order.
    WrongNotes { wrong: Vec<i32>, expected: Vec<i32> },
}

/// Pure comparison of currently-sounding notes against one expected step.
///
/// Duplicates in `played` are collapsed. Values outside 0..=127 can never
/// match an expected note and surface as wrong notes rather than being
/// silently dropped. Rests compare as `Correct` for any input.
pub fn compare_notes(played: &[i32], expected: &ExpectedStep) -> ComparisonResult {
    if expected.is_rest {
        return ComparisonResult::Correct;
    }

    let expected_values: Vec<i32> = expected.midi_values().map(i32::from).collect();
    let expected_set: HashSet<i32> = expected_values.iter().copied().collect();

    let mut seen: HashSet<i32> = HashSet::with_capacity(played.len());
    let mut wrong: Vec<i32> = Vec::new();
    for &value in played {
        if !seen.insert(value) {
            continue;
        }
        if !expected_set.contains(&value) {
            wrong.push(value);
        }
    }

    if !wrong.is_empty() {
        return ComparisonResult::WrongNotes {
            wrong,
            expected: expected_values,
        };
    }

    let missing: Vec<i32> = expected_values
        .iter()
        .copied()
        .filter(|value| !seen.contains(value))
        .collect();

    if !missing.is_empty() {
        return ComparisonResult::MissingNotes { missing };
    }

    ComparisonResult::Correct
}

/// True when every expected value of the step is among `played`.
/// Drives the chord-complete comparison trigger; vacuously true for rests.
pub fn all_expected_held(played: &[i32], expected: &ExpectedStep) -> bool {
    expected
        .midi_values()
        .all(|value| played.contains(&i32::from(value)))
}
