use crate::controller::{PracticeController, PracticeStatus, SessionConfig};
use crate::diagnostics::export_diagnostics;
use crate::ipc::{Command, Event, PracticeSnapshot, ScoreSource};
use crate::tempo::{DelayPolicy, TempoService};
use etude_domain_score::{
    import_practice_path, ExpectedStep, PracticeScore, StepProvider, VecStepProvider,
};
use etude_ports::midi::{MidiError, MidiInputPort, MidiInputStream, MidiLikeEvent, PlayerEvent};
use etude_ports::storage::{SettingsDto, StorageError, StoragePort};
use etude_ports::tempo::{MeasureTempo, TempoSource};
use etude_ports::types::DeviceId;
use log::warn;
use parking_lot::Mutex;
use rtrb::{Consumer, RingBuffer};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("midi error: {0}")]
    Midi(#[from] MidiError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("score load failed: {0}")]
    ScoreLoad(String),
    #[error("no score loaded")]
    NoScore,
    #[error("no MIDI input selected")]
    NoMidiInput,
}

/// Application shell around the practice controller: owns the ports and
/// settings, builds a fresh controller per session from the settings in
/// effect at that moment, and pumps MIDI input into it.
pub struct PracticeCore {
    midi_port: Box<dyn MidiInputPort>,
    storage: Option<Box<dyn StoragePort>>,
    settings: SettingsDto,
    score: Option<PracticeScore>,
    session: Option<PracticeController>,
    resume_index: usize,
    repeat_requested: bool,
    midi_stream: Option<Box<dyn MidiInputStream>>,
    midi_queue_rx: Option<Consumer<PlayerEvent>>,
    events: VecDeque<Event>,
    recent_inputs: VecDeque<MidiLikeEvent>,
    last_input_emit: Instant,
}

impl PracticeCore {
    pub fn new(midi_port: Box<dyn MidiInputPort>, storage: Option<Box<dyn StoragePort>>) -> Self {
        let settings = if let Some(storage) = storage.as_ref() {
            storage.load_settings().unwrap_or_default()
        } else {
            SettingsDto::default()
        };

        Self {
            midi_port,
            storage,
            settings,
            score: None,
            session: None,
            resume_index: 0,
            repeat_requested: false,
            midi_stream: None,
            midi_queue_rx: None,
            events: VecDeque::new(),
            recent_inputs: VecDeque::with_capacity(32),
            last_input_emit: Instant::now(),
        }
    }

    pub fn handle_command(&mut self, cmd: Command) -> Result<(), CoreError> {
        match cmd {
            Command::ListMidiInputs => {
                let devices = self.midi_port.list_inputs()?;
                self.events.push_back(Event::MidiInputsUpdated { devices });
            }
            Command::SelectMidiInput { device_id } => {
                self.settings.selected_midi_in = Some(device_id);
                self.emit_settings();
                self.save_settings();
            }
            Command::LoadScore { source } => {
                self.load_score(source)?;
            }
            Command::StartPractice => {
                self.start_practice()?;
            }
            Command::StopPractice => {
                self.stop_practice();
            }
            Command::ResetSession => {
                self.reset_session();
            }
            Command::ToggleRepeat => {
                match self.session.as_mut() {
                    Some(session) => session.toggle_repeat(),
                    None => {
                        self.repeat_requested = !self.repeat_requested;
                        self.events.push_back(Event::RepeatToggled {
                            active: self.repeat_requested,
                        });
                    }
                }
            }
            Command::SetDebounceMs { ms } => {
                self.settings.debounce_ms = ms.max(1);
                self.emit_settings();
                self.save_settings();
            }
            Command::SetMicroBatching { enabled } => {
                self.settings.micro_batching_enabled = enabled;
                self.emit_settings();
                self.save_settings();
            }
            Command::SetScorePaced { enabled } => {
                self.settings.score_paced = enabled;
                self.emit_settings();
                self.save_settings();
            }
            Command::SetFermataScale { scale } => {
                self.settings.fermata_scale = scale.max(1.0);
                self.emit_settings();
                self.save_settings();
            }
            Command::SetPhraseScale { scale } => {
                self.settings.phrase_scale = scale.max(1.0);
                self.emit_settings();
                self.save_settings();
            }
            Command::SetFallbackDelayMs { ms } => {
                self.settings.fallback_delay_ms = ms.max(1);
                self.emit_settings();
                self.save_settings();
            }
            Command::ExportDiagnostics { path } => {
                let devices = self.midi_port.list_inputs()?;
                export_diagnostics(
                    Path::new(&path),
                    &self.settings,
                    devices,
                    self.recent_inputs.iter().copied().collect(),
                )?;
            }
        }
        Ok(())
    }

    /// Drive the session: drain MIDI input, pump timers, surface events.
    pub fn tick(&mut self) {
        let now = Instant::now();

        let mut pending: Vec<PlayerEvent> = Vec::new();
        if let Some(consumer) = self.midi_queue_rx.as_mut() {
            while let Ok(event) = consumer.pop() {
                pending.push(event);
            }
        }
        for event in pending {
            self.record_recent_input(event.event);
            if let Some(session) = self.session.as_mut() {
                session.on_midi_event(event.event, event.at);
            }
        }

        if let Some(session) = self.session.as_mut() {
            session.tick_at(now);
        }

        self.forward_session_events();
        self.emit_recent_inputs();
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.forward_session_events();
        self.events.drain(..).collect()
    }

    pub fn snapshot(&self) -> PracticeSnapshot {
        self.session
            .as_ref()
            .map(|session| session.snapshot())
            .unwrap_or_default()
    }

    pub fn settings(&self) -> &SettingsDto {
        &self.settings
    }

    fn load_score(&mut self, source: ScoreSource) -> Result<(), CoreError> {
        // A stale session (and its timers) must never outlive the score it
        // was practicing.
        self.close_session();

        let score = match source {
            ScoreSource::MidiFile(path) => import_practice_path(Path::new(&path))
                .map_err(|e| CoreError::ScoreLoad(e.to_string()))?,
            ScoreSource::DemoScale => demo_scale(),
        };

        self.events.push_back(Event::ScoreLoaded {
            title: score.title.clone(),
            steps: score.steps.len(),
        });
        self.resume_index = 0;
        self.score = Some(score);
        Ok(())
    }

    fn start_practice(&mut self) -> Result<(), CoreError> {
        if self
            .session
            .as_ref()
            .is_some_and(|s| s.status() != PracticeStatus::Idle)
        {
            return Ok(());
        }

        let score = self.score.as_ref().ok_or(CoreError::NoScore)?;
        let mut provider = VecStepProvider::new(score.steps.clone())
            .map_err(|e| CoreError::ScoreLoad(e.to_string()))?;
        if self.resume_index > 0 && self.resume_index < score.steps.len() {
            let _ = provider.move_cursor(self.resume_index);
        }

        let config = SessionConfig::from_settings(&self.settings);
        let policy = DelayPolicy::from_settings(&self.settings);
        let tempo = TempoService::new(Some(Box::new(score.tempo_map())), policy);

        let mut controller = PracticeController::new(config, tempo, Box::new(provider));
        if self.repeat_requested {
            controller.toggle_repeat();
        }

        self.open_midi_input()?;
        controller.start_practice(Instant::now());
        self.session = Some(controller);
        Ok(())
    }

    fn stop_practice(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.stop_practice();
            self.resume_index = session.step_index();
        }
        self.forward_session_events();
        self.close_midi_input();
    }

    fn reset_session(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.reset_session();
        }
        self.forward_session_events();
        self.close_midi_input();
        self.resume_index = 0;
    }

    fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop_practice();
            self.events.extend(session.drain_events());
        }
        self.close_midi_input();
        self.resume_index = 0;
    }

    fn open_midi_input(&mut self) -> Result<(), CoreError> {
        self.close_midi_input();

        let device_id: DeviceId = self
            .settings
            .selected_midi_in
            .clone()
            .ok_or(CoreError::NoMidiInput)?;

        let (producer, consumer) = RingBuffer::new(2048);
        let producer = Arc::new(Mutex::new(producer));
        let cb = Arc::new(move |event: PlayerEvent| {
            if let Some(mut guard) = producer.try_lock() {
                let _ = guard.push(event);
            }
        });

        let stream = self.midi_port.open_input(&device_id, cb)?;
        self.midi_stream = Some(stream);
        self.midi_queue_rx = Some(consumer);
        Ok(())
    }

    fn close_midi_input(&mut self) {
        if let Some(stream) = self.midi_stream.take() {
            stream.close();
        }
        self.midi_queue_rx = None;
    }

    fn forward_session_events(&mut self) {
        let drained = self
            .session
            .as_mut()
            .map(|session| session.drain_events())
            .unwrap_or_default();
        self.events.extend(drained);
    }

    fn record_recent_input(&mut self, event: MidiLikeEvent) {
        if self.recent_inputs.len() >= 20 {
            self.recent_inputs.pop_front();
        }
        self.recent_inputs.push_back(event);
    }

    fn emit_recent_inputs(&mut self) {
        if self.last_input_emit.elapsed() < Duration::from_millis(50) {
            return;
        }
        if !self.recent_inputs.is_empty() {
            self.events.push_back(Event::RecentInputEvents {
                events: self.recent_inputs.iter().copied().collect(),
            });
        }
        self.last_input_emit = Instant::now();
    }

    fn emit_settings(&mut self) {
        self.events.push_back(Event::SettingsUpdated {
            settings: self.settings.clone(),
        });
    }

    fn save_settings(&self) {
        if let Some(storage) = self.storage.as_ref() {
            if let Err(e) = storage.save_settings(&self.settings) {
                warn!("failed to persist settings: {e}");
            }
        }
    }
}

/// One octave of C major at 90 bpm, final note held under a fermata.
fn demo_scale() -> PracticeScore {
    let pitches: [u8; 8] = [60, 62, 64, 65, 67, 69, 71, 72];
    let mut steps: Vec<ExpectedStep> = pitches
        .iter()
        .enumerate()
        .map(|(idx, &pitch)| {
            ExpectedStep::single(idx as u64 + 1, idx as u32 / 4, 1.0, pitch)
        })
        .collect();
    if let Some(last) = steps.last_mut() {
        *last = last.clone().with_note_id("demo-final-fermata");
    }

    let mut tempo_by_measure = BTreeMap::new();
    tempo_by_measure.insert(
        0,
        MeasureTempo {
            bpm: 90.0,
            source: TempoSource::ScoreMarkup,
        },
    );

    PracticeScore {
        title: Some("C major scale".to_string()),
        ppq: 480,
        steps,
        tempo_by_measure,
    }
}
