//! Drill session state machine
//!
//! A [`Session`] owns the clock substrate, the random source and the current
//! set. Presentation code feeds it [`SessionInput`]s and renders the
//! [`SessionEvent`]s it returns; it also calls [`Session::tick`] regularly so
//! time-based transitions (calibration finishing, auto-advance) can fire.
//!
//! All mutation happens synchronously inside `handle`, `tick` and
//! `update_settings`. Deferred work is stored as a due time on the session's
//! clock, so pausing the clock also holds back the auto-advance.

use crate::clock::ClockAdapter;
use crate::completion::Completion;
use crate::generator::{generate, Question};
use crate::scheduler::{
    calibration_events, melody_events, schedule, ScheduleOptions, ScheduledPlayback,
    CALIBRATION_BPM,
};
use crate::types::{DrillSettings, ScaleDegree, SetParameters, SettingsError};
use rand::Rng;
use std::collections::BTreeSet;
use thiserror::Error;

/// Seconds between completing a question and the next one starting
pub const AUTO_ADVANCE_DELAY: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    PreStart,
    /// Cadence playing; the first question is queued behind it
    Calibrating,
    AwaitingAnswer,
    QuestionComplete,
    SetComplete,
}

impl SessionState {
    pub fn in_set(self) -> bool {
        !matches!(self, SessionState::PreStart)
    }
}

/// What the presentation layer can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    StartSet,
    Reshuffle,
    Answer(ScaleDegree),
    TogglePause,
    ReplayQuestion,
    ReplayCalibration,
    NextQuestion,
    RestartSet,
    StopSet,
}

/// What the presentation layer should render
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ParametersChosen(SetParameters),
    /// 1-based question number out of the set size
    Progress { question: usize, total: usize },
    QuestionReady { len: usize },
    Filled { position: usize, degree: ScaleDegree },
    WrongFlagged { degree: ScaleDegree },
    WrongFlagsCleared,
    QuestionCompleted,
    SetCompleted,
    Stopped,
    Paused(Completion),
    Resumed(Completion),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid settings: {}", describe(.0))]
    InvalidSettings(Vec<SettingsError>),
    #[error("Cannot reshuffle while a set is in progress")]
    SetInProgress,
    #[error("Voice engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("Voice engine is still loading")]
    EngineLoading,
}

fn describe(errors: &[SettingsError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type SessionResult = Result<Vec<SessionEvent>, SessionError>;

pub struct Session<C: ClockAdapter, R: Rng> {
    clock: C,
    rng: R,
    settings: DrillSettings,
    params: SetParameters,
    state: SessionState,
    question: Option<Question>,
    /// 0-based index of the current question within the set
    index: usize,
    /// Next position to be answered
    position: usize,
    /// Wrong degrees already flagged at the current position
    wrong: BTreeSet<ScaleDegree>,
    calibration: Option<ScheduledPlayback>,
    melody: Option<ScheduledPlayback>,
    calibration_ends_at: f64,
    /// Clock time at which the next question starts by itself
    advance_due: Option<f64>,
}

impl<C: ClockAdapter, R: Rng> Session<C, R> {
    /// Validate `settings` and draw the first set's parameters
    pub fn new(clock: C, settings: DrillSettings, mut rng: R) -> Result<Self, SessionError> {
        settings.validate().map_err(SessionError::InvalidSettings)?;
        let params = SetParameters::choose(&settings, &mut rng);
        Ok(Self {
            clock,
            rng,
            settings,
            params,
            state: SessionState::PreStart,
            question: None,
            index: 0,
            position: 0,
            wrong: BTreeSet::new(),
            calibration: None,
            melody: None,
            calibration_ends_at: 0.0,
            advance_due: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn params(&self) -> SetParameters {
        self.params
    }

    pub fn settings(&self) -> &DrillSettings {
        &self.settings
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    /// 1-based number of the current question, 0 before a set starts
    pub fn question_number(&self) -> usize {
        if self.state.in_set() {
            self.index + 1
        } else {
            0
        }
    }

    pub fn total_questions(&self) -> usize {
        self.settings.questions_per_set
    }

    /// Degrees answered correctly so far in the current question
    pub fn filled(&self) -> &[crate::generator::QuestionNote] {
        match &self.question {
            Some(q) => &q.notes()[..self.position],
            None => &[],
        }
    }

    pub fn wrong_flags(&self) -> impl Iterator<Item = ScaleDegree> + '_ {
        self.wrong.iter().copied()
    }

    pub fn auto_advance_pending(&self) -> bool {
        self.advance_due.is_some()
    }

    fn is_last_question(&self) -> bool {
        self.index + 1 >= self.settings.questions_per_set
    }

    pub fn handle(&mut self, input: SessionInput) -> SessionResult {
        match input {
            SessionInput::StartSet => self.start_set(),
            SessionInput::Reshuffle => self.reshuffle(),
            SessionInput::Answer(degree) => Ok(self.answer(degree)),
            SessionInput::TogglePause => Ok(self.toggle_pause()),
            SessionInput::ReplayQuestion => Ok(self.replay_question()),
            SessionInput::ReplayCalibration => Ok(self.replay_calibration()),
            SessionInput::NextQuestion => Ok(self.next_question()),
            SessionInput::RestartSet => Ok(self.restart_set()),
            SessionInput::StopSet => Ok(self.stop_set()),
        }
    }

    /// Fire time-based transitions that have come due
    pub fn tick(&mut self) -> Vec<SessionEvent> {
        let now = self.clock.now();
        if self.state == SessionState::Calibrating && now >= self.calibration_ends_at {
            log::debug!("calibration finished at {:.3}s", now);
            self.state = SessionState::AwaitingAnswer;
        }
        match self.advance_due {
            Some(due) if now >= due => self.advance_question(),
            _ => Vec::new(),
        }
    }

    /// Replace the settings. Key and mode stay fixed for a running set;
    /// the new tempo applies to whatever is scheduled next.
    pub fn update_settings(&mut self, settings: DrillSettings) -> SessionResult {
        settings.validate().map_err(SessionError::InvalidSettings)?;
        self.settings = settings;
        self.params.tempo_bpm = self.settings.bpm();

        let mut events = Vec::new();
        if self.state == SessionState::PreStart
            && (!self.settings.keys.contains(&self.params.key)
                || !self.settings.modes.contains(&self.params.mode))
        {
            self.params = SetParameters::choose(&self.settings, &mut self.rng);
            events.push(SessionEvent::ParametersChosen(self.params));
        }
        Ok(events)
    }

    fn start_set(&mut self) -> SessionResult {
        if self.state.in_set() {
            log::debug!("start ignored: set already running");
            return Ok(Vec::new());
        }
        match self.clock.ensure_ready().outcome() {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(SessionError::EngineUnavailable(e.to_string())),
            None => return Err(SessionError::EngineLoading),
        }

        log::info!("starting set: {}", self.params);
        self.index = 0;
        let mut events = vec![SessionEvent::ParametersChosen(self.params)];
        events.extend(self.begin_set());
        Ok(events)
    }

    fn reshuffle(&mut self) -> SessionResult {
        if self.state.in_set() {
            return Err(SessionError::SetInProgress);
        }
        self.params = SetParameters::choose(&self.settings, &mut self.rng);
        Ok(vec![SessionEvent::ParametersChosen(self.params)])
    }

    /// Calibration at offset 0, then a fresh question right behind it
    fn begin_set(&mut self) -> Vec<SessionEvent> {
        self.cancel_playback();
        self.advance_due = None;

        let calibration = self.schedule_calibration();
        let offset = calibration.total_duration;
        self.calibration_ends_at = calibration.ends_at;
        self.calibration = Some(calibration);

        self.state = SessionState::Calibrating;
        self.prepare_question(offset)
    }

    /// Generate the question at `self.index` and schedule it at `offset`
    fn prepare_question(&mut self, offset: f64) -> Vec<SessionEvent> {
        let question = generate(&self.settings, &self.params, &mut self.rng);
        log::debug!(
            "question {}: degrees {:?}",
            self.index + 1,
            question.degrees()
        );
        self.melody = Some(schedule(
            &self.clock,
            &melody_events(&question),
            self.params.bpm(),
            offset,
            ScheduleOptions::melody(),
        ));
        let len = question.len();
        self.question = Some(question);
        self.position = 0;
        self.wrong.clear();

        vec![
            SessionEvent::Progress {
                question: self.index + 1,
                total: self.settings.questions_per_set,
            },
            SessionEvent::QuestionReady { len },
        ]
    }

    fn schedule_calibration(&self) -> ScheduledPlayback {
        schedule(
            &self.clock,
            &calibration_events(self.params.key, self.params.mode),
            CALIBRATION_BPM,
            0.0,
            ScheduleOptions::calibration(),
        )
    }

    fn answer(&mut self, degree: ScaleDegree) -> Vec<SessionEvent> {
        match self.state {
            SessionState::Calibrating => self.state = SessionState::AwaitingAnswer,
            SessionState::AwaitingAnswer => {}
            other => {
                log::debug!("answer {} ignored in {:?}", degree, other);
                return Vec::new();
            }
        }
        let Some(expected) = self.question.as_ref().and_then(|q| q.degree_at(self.position))
        else {
            return Vec::new();
        };

        let mut events = Vec::new();
        if degree != expected {
            if self.wrong.insert(degree) {
                events.push(SessionEvent::WrongFlagged { degree });
            }
            return events;
        }

        events.push(SessionEvent::Filled {
            position: self.position,
            degree,
        });
        if !self.wrong.is_empty() {
            self.wrong.clear();
            events.push(SessionEvent::WrongFlagsCleared);
        }
        self.position += 1;

        let len = self.question.as_ref().map_or(0, Question::len);
        if self.position >= len {
            events.extend(self.complete_question());
        }
        events
    }

    fn complete_question(&mut self) -> Vec<SessionEvent> {
        let mut events = vec![SessionEvent::QuestionCompleted];
        if self.is_last_question() {
            self.state = SessionState::SetComplete;
            events.push(SessionEvent::SetCompleted);
            log::info!("set complete");
        } else {
            self.state = SessionState::QuestionComplete;
            if self.settings.auto_proceed {
                self.advance_due = Some(self.clock.now() + AUTO_ADVANCE_DELAY);
            }
        }
        events
    }

    /// Move on to the next question, scheduled from offset 0
    fn advance_question(&mut self) -> Vec<SessionEvent> {
        self.advance_due = None;
        self.cancel_playback();
        self.index += 1;
        self.state = SessionState::AwaitingAnswer;
        self.prepare_question(0.0)
    }

    fn next_question(&mut self) -> Vec<SessionEvent> {
        match self.state {
            SessionState::Calibrating
            | SessionState::AwaitingAnswer
            | SessionState::QuestionComplete => {
                if self.is_last_question() {
                    self.advance_due = None;
                    self.cancel_playback();
                    self.state = SessionState::SetComplete;
                    vec![SessionEvent::SetCompleted]
                } else {
                    self.advance_question()
                }
            }
            other => {
                log::debug!("next ignored in {:?}", other);
                Vec::new()
            }
        }
    }

    fn restart_set(&mut self) -> Vec<SessionEvent> {
        if !self.state.in_set() {
            log::debug!("restart ignored before a set starts");
            return Vec::new();
        }
        self.index = 0;
        self.begin_set()
    }

    fn stop_set(&mut self) -> Vec<SessionEvent> {
        self.cancel_playback();
        self.advance_due = None;
        self.question = None;
        self.index = 0;
        self.position = 0;
        self.wrong.clear();
        self.state = SessionState::PreStart;
        vec![SessionEvent::Stopped]
    }

    fn replay_question(&mut self) -> Vec<SessionEvent> {
        let Some(question) = self.question.as_ref() else {
            log::debug!("replay ignored: no question");
            return Vec::new();
        };
        if let Some(previous) = self.melody.take() {
            previous.cancel.cancel();
        }
        self.melody = Some(schedule(
            &self.clock,
            &melody_events(question),
            self.params.bpm(),
            0.0,
            ScheduleOptions::melody(),
        ));
        Vec::new()
    }

    fn replay_calibration(&mut self) -> Vec<SessionEvent> {
        if !self.state.in_set() {
            log::debug!("calibration replay ignored before a set starts");
            return Vec::new();
        }
        if let Some(previous) = self.calibration.take() {
            previous.cancel.cancel();
        }
        let calibration = self.schedule_calibration();
        if self.state == SessionState::Calibrating {
            self.calibration_ends_at = calibration.ends_at;
        }
        self.calibration = Some(calibration);
        Vec::new()
    }

    fn toggle_pause(&mut self) -> Vec<SessionEvent> {
        if self.clock.is_suspended() {
            vec![SessionEvent::Resumed(self.clock.resume())]
        } else {
            vec![SessionEvent::Paused(self.clock.suspend())]
        }
    }

    fn cancel_playback(&mut self) {
        for playback in [self.calibration.take(), self.melody.take()]
            .into_iter()
            .flatten()
        {
            playback.cancel.cancel();
        }
    }
}

impl<C: ClockAdapter, R: Rng> Drop for Session<C, R> {
    fn drop(&mut self) {
        self.cancel_playback();
    }
}
