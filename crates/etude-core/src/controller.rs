use crate::ipc::{Event, PracticeSnapshot};
use crate::tempo::{StepDelay, TempoContext, TempoService};
use crate::timer::{DebounceSlot, TimerQueue};
use etude_domain_eval::{all_expected_held, compare_notes, ComparisonResult};
use etude_domain_score::{ExpectedStep, StepProvider};
use etude_ports::midi::MidiLikeEvent;
use etude_ports::storage::SettingsDto;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PracticeStatus {
    Idle,
    Listening,
    Correct,
    Incorrect,
    Advancing,
}

/// When comparisons run relative to incoming note events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonStrategy {
    /// Compare on every note-on; in-progress chords stay pending.
    Immediate,
    /// Coalesce rapid note-ons over the debounce window; a completed
    /// chord still short-circuits to an immediate comparison.
    MicroBatched,
}

/// Where the post-correct advance delay comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempoStrategy {
    ScorePaced,
    FixedPace,
}

/// Session behavior is picked here, at construction, and never by mutating
/// a live controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerVariant {
    pub comparison: ComparisonStrategy,
    pub tempo: TempoStrategy,
}

impl Default for ControllerVariant {
    fn default() -> Self {
        Self {
            comparison: ComparisonStrategy::MicroBatched,
            tempo: TempoStrategy::ScorePaced,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    pub variant: ControllerVariant,
    pub debounce_window: Duration,
    pub timer_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            variant: ControllerVariant::default(),
            debounce_window: Duration::from_millis(120),
            timer_capacity: 16,
        }
    }
}

impl SessionConfig {
    pub fn from_settings(settings: &SettingsDto) -> Self {
        let comparison = if settings.micro_batching_enabled {
            ComparisonStrategy::MicroBatched
        } else {
            ComparisonStrategy::Immediate
        };
        let tempo = if settings.score_paced {
            TempoStrategy::ScorePaced
        } else {
            TempoStrategy::FixedPace
        };
        Self {
            variant: ControllerVariant { comparison, tempo },
            debounce_window: Duration::from_millis(settings.debounce_ms.max(1)),
            timer_capacity: 16,
        }
    }
}

enum PendingAction {
    RunComparison,
    AdvanceCursor,
}

/// The practice state machine. Owns all mutable session state; everything
/// it does happens on the host's single pump context, driven by
/// `on_midi_event` and `tick_at`.
pub struct PracticeController {
    config: SessionConfig,
    tempo: TempoService,
    provider: Box<dyn StepProvider>,
    status: PracticeStatus,
    step_index: usize,
    current_step: Option<ExpectedStep>,
    held_notes: BTreeSet<u8>,
    repeat_active: bool,
    last_error: Option<String>,
    timers: TimerQueue<PendingAction>,
    advance_slot: DebounceSlot,
    input_slot: DebounceSlot,
    events: VecDeque<Event>,
}

impl PracticeController {
    pub fn new(
        config: SessionConfig,
        tempo: TempoService,
        provider: Box<dyn StepProvider>,
    ) -> Self {
        let timers = TimerQueue::new(config.timer_capacity);
        Self {
            config,
            tempo,
            provider,
            status: PracticeStatus::Idle,
            step_index: 0,
            current_step: None,
            held_notes: BTreeSet::new(),
            repeat_active: false,
            last_error: None,
            timers,
            advance_slot: DebounceSlot::default(),
            input_slot: DebounceSlot::default(),
            events: VecDeque::new(),
        }
    }

    pub fn status(&self) -> PracticeStatus {
        self.status
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn current_step(&self) -> Option<&ExpectedStep> {
        self.current_step.as_ref()
    }

    pub fn repeat_active(&self) -> bool {
        self.repeat_active
    }

    pub fn snapshot(&self) -> PracticeSnapshot {
        PracticeSnapshot {
            status: self.status,
            step_index: self.step_index,
            current_step: self.current_step.clone(),
            repeat_active: self.repeat_active,
            last_error: self.last_error.clone(),
        }
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub fn start_practice(&mut self, now: Instant) {
        if self.status != PracticeStatus::Idle {
            debug!("start_practice ignored: session already active");
            return;
        }
        self.last_error = None;
        self.held_notes.clear();
        self.enter_step(self.provider.cursor(), now);
    }

    /// Any state -> Idle; every outstanding timer dies here so a stale
    /// advance can never fire into a later session.
    pub fn stop_practice(&mut self) {
        self.teardown();
    }

    /// Stop and rewind to the first step.
    pub fn reset_session(&mut self) {
        self.teardown();
        self.last_error = None;
        if self.provider.len() > 0 {
            if let Err(e) = self.provider.move_cursor(0) {
                warn!("reset could not rewind cursor: {e}");
            }
        }
        self.step_index = 0;
    }

    /// Orthogonal to the state machine; only consulted when the advance
    /// timer fires.
    pub fn toggle_repeat(&mut self) {
        self.repeat_active = !self.repeat_active;
        self.events.push_back(Event::RepeatToggled {
            active: self.repeat_active,
        });
    }

    pub fn on_midi_event(&mut self, event: MidiLikeEvent, now: Instant) {
        if self.status == PracticeStatus::Idle {
            return;
        }
        match event {
            MidiLikeEvent::NoteOn { note, .. } => {
                // Duplicate note-on is idempotent by construction.
                self.held_notes.insert(note);
                if self.comparison_allowed() {
                    self.on_note_trigger(now);
                }
            }
            MidiLikeEvent::NoteOff { note } => {
                // Unknown note-off (stale, or from before a cursor move)
                // falls through as a no-op.
                self.held_notes.remove(&note);
                if !self.comparison_allowed() {
                    return;
                }
                if self.held_notes.is_empty() {
                    self.input_slot.cancel(&mut self.timers);
                    return;
                }
                // Releasing a wrong note can complete the step; a partial
                // release re-arms the window instead.
                if self.current_chord_complete() {
                    self.run_comparison(now);
                } else {
                    self.arm_input_debounce(now);
                }
            }
        }
    }

    /// Pump due timers. The host calls this from its tick loop.
    pub fn tick_at(&mut self, now: Instant) {
        for action in self.timers.poll_due(now) {
            match action {
                PendingAction::RunComparison => {
                    self.input_slot.clear();
                    self.run_comparison(now);
                }
                PendingAction::AdvanceCursor => {
                    self.advance_slot.clear();
                    self.fire_advance(now);
                }
            }
        }
    }

    fn comparison_allowed(&self) -> bool {
        matches!(
            self.status,
            PracticeStatus::Listening | PracticeStatus::Incorrect
        )
    }

    fn on_note_trigger(&mut self, now: Instant) {
        let Some(step) = self.current_step.clone() else {
            return;
        };
        let played = self.held_as_values();
        let complete = all_expected_held(&played, &step);

        match self.config.variant.comparison {
            ComparisonStrategy::Immediate => {
                let result = compare_notes(&played, &step);
                match result {
                    // An in-progress chord is not an error yet; the window
                    // catches a stalled one.
                    ComparisonResult::MissingNotes { .. } if !complete => {
                        self.arm_input_debounce(now);
                    }
                    result => self.apply_result(result, now),
                }
            }
            ComparisonStrategy::MicroBatched => {
                if complete {
                    self.run_comparison(now);
                } else {
                    self.arm_input_debounce(now);
                }
            }
        }
    }

    fn current_chord_complete(&self) -> bool {
        match self.current_step.as_ref() {
            Some(step) => all_expected_held(&self.held_as_values(), step),
            None => false,
        }
    }

    fn arm_input_debounce(&mut self, now: Instant) {
        let window = self.config.debounce_window;
        if let Err(e) =
            self.input_slot
                .schedule(&mut self.timers, now, window, PendingAction::RunComparison)
        {
            // Degrade to comparing right away rather than dropping the trigger.
            warn!("could not arm comparison window ({e}); comparing now");
            self.run_comparison(now);
        }
    }

    fn run_comparison(&mut self, now: Instant) {
        if !self.comparison_allowed() {
            return;
        }
        let Some(step) = self.current_step.clone() else {
            return;
        };
        let played = self.held_as_values();
        let result = compare_notes(&played, &step);
        self.apply_result(result, now);
    }

    fn apply_result(&mut self, result: ComparisonResult, now: Instant) {
        self.events.push_back(Event::ComparisonFeedback {
            step_index: self.step_index,
            result: result.clone(),
        });
        match result {
            ComparisonResult::Correct => {
                self.set_status(PracticeStatus::Correct);
                self.accept_step(now);
            }
            ComparisonResult::MissingNotes { .. } | ComparisonResult::WrongNotes { .. } => {
                // Stay receptive: the same step is re-compared as held
                // notes change.
                self.set_status(PracticeStatus::Incorrect);
            }
        }
    }

    /// Correct path: queue the advance after the musically-appropriate
    /// delay. The status flips to Advancing immediately; the cursor moves
    /// only when the timer fires.
    fn accept_step(&mut self, now: Instant) {
        self.input_slot.cancel(&mut self.timers);
        let delay = self.delay_for_current_step();
        self.events.push_back(Event::AdvanceScheduled {
            step_index: self.step_index,
            delay,
        });

        let wait = Duration::from_millis(delay.millis);
        match self
            .advance_slot
            .schedule(&mut self.timers, now, wait, PendingAction::AdvanceCursor)
        {
            Ok(_) => self.set_status(PracticeStatus::Advancing),
            Err(e) => {
                // Never strand the session in Advancing with nothing pending.
                error!("advance timer unavailable ({e}); advancing immediately");
                self.set_status(PracticeStatus::Advancing);
                self.fire_advance(now);
            }
        }
    }

    fn delay_for_current_step(&mut self) -> StepDelay {
        let Some(step) = self.current_step.as_ref() else {
            return self.tempo.fixed_delay();
        };
        match self.config.variant.tempo {
            TempoStrategy::ScorePaced => {
                let measure_index = step.measure_index;
                let ctx = TempoContext::for_step(step);
                self.tempo.compute_delay(measure_index, &ctx)
            }
            TempoStrategy::FixedPace => self.tempo.fixed_delay(),
        }
    }

    fn fire_advance(&mut self, now: Instant) {
        if self.status != PracticeStatus::Advancing {
            return;
        }
        let target = match self.resolve_advance_target() {
            Ok(target) => target,
            Err(message) => {
                self.fail_session(message);
                return;
            }
        };
        if let Err(e) = self.provider.move_cursor(target) {
            self.fail_session(format!("cursor move failed: {e}"));
            return;
        }
        self.enter_step(target, now);
    }

    fn resolve_advance_target(&self) -> Result<usize, String> {
        let Some(current) = self.current_step.as_ref() else {
            return Err("no active step to advance from".to_string());
        };

        let next = self.step_index + 1;
        let leaving_measure = match self.provider.step(next) {
            Ok(step) => step.measure_index != current.measure_index,
            Err(_) => true,
        };

        if self.repeat_active && leaving_measure {
            return Ok(self.measure_start(current.measure_index));
        }
        if next >= self.provider.len() {
            return Err("end of score reached".to_string());
        }
        Ok(next)
    }

    fn measure_start(&self, measure_index: u32) -> usize {
        let mut index = self.step_index;
        while index > 0 {
            match self.provider.step(index - 1) {
                Ok(step) if step.measure_index == measure_index => index -= 1,
                _ => break,
            }
        }
        index
    }

    fn enter_step(&mut self, index: usize, now: Instant) {
        match self.provider.step(index) {
            Ok(step) => {
                self.step_index = index;
                self.held_notes.clear();
                self.set_status(PracticeStatus::Listening);
                self.events.push_back(Event::CursorMoved {
                    step_index: index,
                    measure_index: step.measure_index,
                });
                let is_rest = step.is_rest;
                self.current_step = Some(step);
                if is_rest {
                    // Rests have nothing to play incorrectly; take the
                    // correct path straight away.
                    self.apply_result(ComparisonResult::Correct, now);
                }
            }
            Err(e) => self.fail_session(format!("cannot resolve step {index}: {e}")),
        }
    }

    fn fail_session(&mut self, message: String) {
        error!("practice session failed: {message}");
        self.teardown();
        self.last_error = Some(message.clone());
        self.events.push_back(Event::PracticeError { message });
    }

    fn teardown(&mut self) {
        self.timers.clear();
        self.advance_slot.clear();
        self.input_slot.clear();
        self.held_notes.clear();
        self.current_step = None;
        self.set_status(PracticeStatus::Idle);
    }

    fn held_as_values(&self) -> Vec<i32> {
        self.held_notes.iter().map(|&note| i32::from(note)).collect()
    }

    fn set_status(&mut self, status: PracticeStatus) {
        if self.status == status {
            return;
        }
        self.status = status;
        self.events.push_back(Event::StatusChanged {
            status,
            step_index: self.step_index,
            repeat_active: self.repeat_active,
        });
    }
}
