use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StepError {
    #[error("rest step carries {0} notes")]
    RestWithNotes(usize),
    #[error("chord flag set with {0} notes")]
    ChordUnderfilled(usize),
    #[error("duplicate note {0} within step")]
    DuplicateNote(u8),
    #[error("non-positive duration")]
    NonPositiveDuration,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteSpec {
    pub midi_value: u8,
    pub pitch_name: String,
    pub octave: i8,
}

impl NoteSpec {
    /// Derive spelled pitch from a MIDI value (middle C = 60 = "C4").
    pub fn from_midi(midi_value: u8) -> Self {
        let pitch_name = NOTE_NAMES[(midi_value % 12) as usize].to_string();
        let octave = (midi_value / 12) as i8 - 1;
        Self {
            midi_value,
            pitch_name,
            octave,
        }
    }
}

/// One unit of the practice sequence: a note, a chord, or a rest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpectedStep {
    pub id: u64,
    pub notes: Vec<NoteSpec>,
    pub is_chord: bool,
    pub is_rest: bool,
    pub measure_index: u32,
    pub duration_beats: f64,
    /// Musical-context tag from the notation layer. Substrings "fermata"
    /// and "phrase" select delay overrides downstream.
    pub note_id: Option<String>,
    /// Identity/logging only, never timing logic.
    pub created_at_ms: u64,
}

impl ExpectedStep {
    pub fn rest(id: u64, measure_index: u32, duration_beats: f64) -> Self {
        Self {
            id,
            notes: Vec::new(),
            is_chord: false,
            is_rest: true,
            measure_index,
            duration_beats,
            note_id: None,
            created_at_ms: now_ms(),
        }
    }

    pub fn single(id: u64, measure_index: u32, duration_beats: f64, midi_value: u8) -> Self {
        Self {
            id,
            notes: vec![NoteSpec::from_midi(midi_value)],
            is_chord: false,
            is_rest: false,
            measure_index,
            duration_beats,
            note_id: None,
            created_at_ms: now_ms(),
        }
    }

    pub fn chord(id: u64, measure_index: u32, duration_beats: f64, midi_values: &[u8]) -> Self {
        let mut values = midi_values.to_vec();
        values.sort_unstable();
        values.dedup();
        let notes: Vec<NoteSpec> = values.into_iter().map(NoteSpec::from_midi).collect();
        let is_chord = notes.len() >= 2;
        Self {
            id,
            notes,
            is_chord,
            is_rest: false,
            measure_index,
            duration_beats,
            note_id: None,
            created_at_ms: now_ms(),
        }
    }

    pub fn with_note_id(mut self, note_id: impl Into<String>) -> Self {
        self.note_id = Some(note_id.into());
        self
    }

    pub fn midi_values(&self) -> impl Iterator<Item = u8> + '_ {
        self.notes.iter().map(|n| n.midi_value)
    }

    /// Re-check the step invariants for data arriving from outside the
    /// constructors (deserialized sequences, external providers).
    pub fn validate(&self) -> Result<(), StepError> {
        if self.is_rest && !self.notes.is_empty() {
            return Err(StepError::RestWithNotes(self.notes.len()));
        }
        if self.is_chord && self.notes.len() < 2 {
            return Err(StepError::ChordUnderfilled(self.notes.len()));
        }
        if !(self.duration_beats > 0.0) {
            return Err(StepError::NonPositiveDuration);
        }
        for (idx, note) in self.notes.iter().enumerate() {
            if self.notes[..idx].iter().any(|n| n.midi_value == note.midi_value) {
                return Err(StepError::DuplicateNote(note.midi_value));
            }
        }
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
