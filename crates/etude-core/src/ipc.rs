use crate::controller::PracticeStatus;
use crate::tempo::StepDelay;
use etude_domain_eval::ComparisonResult;
use etude_domain_score::ExpectedStep;
use etude_ports::midi::MidiLikeEvent;
use etude_ports::storage::SettingsDto;
use etude_ports::types::{DeviceId, MidiInputDevice};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ScoreSource {
    MidiFile(String),
    /// Built-in C-major scale, for trying the tool without a score file.
    DemoScale,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    ListMidiInputs,
    SelectMidiInput { device_id: DeviceId },
    LoadScore { source: ScoreSource },
    StartPractice,
    StopPractice,
    ResetSession,
    ToggleRepeat,
    SetDebounceMs { ms: u64 },
    SetMicroBatching { enabled: bool },
    SetScorePaced { enabled: bool },
    SetFermataScale { scale: f64 },
    SetPhraseScale { scale: f64 },
    SetFallbackDelayMs { ms: u64 },
    ExportDiagnostics { path: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    MidiInputsUpdated {
        devices: Vec<MidiInputDevice>,
    },
    SettingsUpdated {
        settings: SettingsDto,
    },
    ScoreLoaded {
        title: Option<String>,
        steps: usize,
    },
    StatusChanged {
        status: PracticeStatus,
        step_index: usize,
        repeat_active: bool,
    },
    CursorMoved {
        step_index: usize,
        measure_index: u32,
    },
    ComparisonFeedback {
        step_index: usize,
        result: ComparisonResult,
    },
    AdvanceScheduled {
        step_index: usize,
        delay: StepDelay,
    },
    RepeatToggled {
        active: bool,
    },
    PracticeError {
        message: String,
    },
    RecentInputEvents {
        events: Vec<MidiLikeEvent>,
    },
}

/// Read-only view for the UI layer; effects of commands are observed here
/// and through the event stream, never through return values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PracticeSnapshot {
    pub status: PracticeStatus,
    pub step_index: usize,
    pub current_step: Option<ExpectedStep>,
    pub repeat_active: bool,
    pub last_error: Option<String>,
}

impl Default for PracticeSnapshot {
    fn default() -> Self {
        Self {
            status: PracticeStatus::Idle,
            step_index: 0,
            current_step: None,
            repeat_active: false,
            last_error: None,
        }
    }
}
