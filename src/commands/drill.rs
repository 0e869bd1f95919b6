//! Drill commands (start, answer, pause, replay, ...) and event rendering

use crate::commands::{CommandContext, CommandResult};
use colored::*;
use rand::rngs::StdRng;
use solfa_core::{ClockAdapter, ScaleDegree, Session, SessionEvent, SessionInput, SessionState};
use std::time::Duration;

/// How long `start` waits for the voice engine before giving up
pub const ENGINE_LOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// How long pause/resume wait for the engine to acknowledge
const TRANSPORT_TIMEOUT: Duration = Duration::from_millis(500);

/// Handle `start`
pub fn cmd_start<C: ClockAdapter>(_args: &str, ctx: &mut CommandContext<C>) -> CommandResult {
    if !ctx.session.state().in_set() {
        let loading = ctx.session.clock().ensure_ready();
        if !loading.is_finished() {
            println!("{}", "Loading voice engine...".dimmed());
        }
        if loading.wait_timeout(ENGINE_LOAD_TIMEOUT).is_none() {
            return CommandResult::Error(
                "Voice engine is still loading, try 'start' again in a moment".to_string(),
            );
        }
    }
    run(SessionInput::StartSet, ctx)
}

/// Handle `reshuffle`
pub fn cmd_reshuffle<C: ClockAdapter>(_args: &str, ctx: &mut CommandContext<C>) -> CommandResult {
    run(SessionInput::Reshuffle, ctx)
}

/// Handle `answer <degree>`
pub fn cmd_answer<C: ClockAdapter>(args: &str, ctx: &mut CommandContext<C>) -> CommandResult {
    if args.is_empty() {
        return CommandResult::Error(
            "Usage: answer <degree> (e.g. 'answer 5' or 'answer so')".to_string(),
        );
    }
    match args.parse::<ScaleDegree>() {
        Ok(degree) => answer(degree, ctx),
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

/// Treat a bare degree ("5", "so") as an answer
pub fn try_bare_answer<C: ClockAdapter>(
    line: &str,
    ctx: &mut CommandContext<C>,
) -> Option<CommandResult> {
    line.parse::<ScaleDegree>()
        .ok()
        .map(|degree| answer(degree, ctx))
}

fn answer<C: ClockAdapter>(degree: ScaleDegree, ctx: &mut CommandContext<C>) -> CommandResult {
    match ctx.session.state() {
        SessionState::PreStart => {
            CommandResult::Error("No set running. Type 'start' to begin.".to_string())
        }
        SessionState::QuestionComplete => CommandResult::Message(
            "Question already answered. Type 'next' to continue.".dimmed().to_string(),
        ),
        SessionState::SetComplete => CommandResult::Message(
            "Set already finished. Type 'restart' to go again.".dimmed().to_string(),
        ),
        _ => run(SessionInput::Answer(degree), ctx),
    }
}

/// Handle `pause` (toggles)
pub fn cmd_pause<C: ClockAdapter>(_args: &str, ctx: &mut CommandContext<C>) -> CommandResult {
    run(SessionInput::TogglePause, ctx)
}

/// Handle `replay`
pub fn cmd_replay<C: ClockAdapter>(_args: &str, ctx: &mut CommandContext<C>) -> CommandResult {
    if ctx.session.question().is_none() {
        return CommandResult::Error("Nothing to replay yet".to_string());
    }
    run(SessionInput::ReplayQuestion, ctx)
}

/// Handle `calibrate`
pub fn cmd_calibrate<C: ClockAdapter>(_args: &str, ctx: &mut CommandContext<C>) -> CommandResult {
    if !ctx.session.state().in_set() {
        return CommandResult::Error("Start a set first".to_string());
    }
    let message = format!("🎹 Cadence in {}", ctx.session.params());
    match run(SessionInput::ReplayCalibration, ctx) {
        CommandResult::Success => CommandResult::Message(message),
        other => other,
    }
}

/// Handle `next`
pub fn cmd_next<C: ClockAdapter>(_args: &str, ctx: &mut CommandContext<C>) -> CommandResult {
    run(SessionInput::NextQuestion, ctx)
}

/// Handle `restart`
pub fn cmd_restart<C: ClockAdapter>(_args: &str, ctx: &mut CommandContext<C>) -> CommandResult {
    run(SessionInput::RestartSet, ctx)
}

/// Handle `stop`
pub fn cmd_stop<C: ClockAdapter>(_args: &str, ctx: &mut CommandContext<C>) -> CommandResult {
    run(SessionInput::StopSet, ctx)
}

/// Feed one input to the session and render what comes back
fn run<C: ClockAdapter>(input: SessionInput, ctx: &mut CommandContext<C>) -> CommandResult {
    match ctx.session.handle(input) {
        Ok(events) if events.is_empty() => CommandResult::Success,
        Ok(events) => CommandResult::Message(render_events(&events, &ctx.session)),
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

/// Turn session events into REPL output, one line per visible event
pub fn render_events<C: ClockAdapter>(
    events: &[SessionEvent],
    session: &Session<C, StdRng>,
) -> String {
    let mut lines = Vec::new();
    for event in events {
        match event {
            SessionEvent::ParametersChosen(params) => {
                lines.push(format!("🎼 {}", params.to_string().bright_cyan()));
            }
            SessionEvent::Progress { question, total } => {
                lines.push(format!("{}", format!("Question {}/{}", question, total).bold()));
            }
            SessionEvent::QuestionReady { len } => {
                let hint = if session.state() == SessionState::Calibrating {
                    "after the cadence"
                } else {
                    "now"
                };
                lines.push(format!(
                    "👂 {} notes, playing {}. Answer with degrees ({}).",
                    len,
                    hint,
                    "1-7 or do..ti".cyan()
                ));
            }
            SessionEvent::Filled { degree, .. } => {
                lines.push(format!(
                    "{} {}   {}",
                    "✓".bright_green(),
                    degree.label().green(),
                    answer_line(session)
                ));
            }
            SessionEvent::WrongFlagged { degree } => {
                lines.push(format!("{} {}", "✗".bright_red(), degree.label().red()));
            }
            // the next Filled line already shows the cleared state
            SessionEvent::WrongFlagsCleared => {}
            SessionEvent::QuestionCompleted => {
                let done = "Question complete!".bright_green();
                match session.state() {
                    // the SetCompleted line follows
                    SessionState::SetComplete => lines.push(done.to_string()),
                    _ if session.auto_advance_pending() => {
                        lines.push(format!("{} (next question coming up)", done))
                    }
                    _ => lines.push(format!("{} (type 'next' to continue)", done)),
                }
            }
            SessionEvent::SetCompleted => {
                lines.push(format!(
                    "{} Type '{}' to go again in this key, or '{}' then '{}' for a new one.",
                    "🎉 Set complete!".bright_green().bold(),
                    "restart".bright_green(),
                    "stop".bright_green(),
                    "start".bright_green()
                ));
            }
            SessionEvent::Stopped => lines.push("⏹ Stopped".to_string()),
            SessionEvent::Paused(done) => lines.push(transport_line("⏸ Paused", done)),
            SessionEvent::Resumed(done) => lines.push(transport_line("▶ Resumed", done)),
        }
    }
    lines.join("\n")
}

fn transport_line(label: &str, done: &solfa_core::Completion) -> String {
    match done.wait_timeout(TRANSPORT_TIMEOUT) {
        Some(Err(e)) => format!("{} {}", label, format!("({})", e).red()),
        Some(Ok(())) => label.to_string(),
        None => format!("{} {}", label, "(waiting for the engine)".dimmed()),
    }
}

/// Answered degrees followed by a blank per open position, e.g. "1 3 _ _"
pub fn answer_line<C: ClockAdapter>(session: &Session<C, StdRng>) -> String {
    let Some(question) = session.question() else {
        return String::new();
    };
    let filled = session.filled();
    let mut parts: Vec<String> = filled.iter().map(|n| n.degree.to_string()).collect();
    parts.extend(std::iter::repeat("_".to_string()).take(question.len() - filled.len()));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;
    use solfa_core::{DrillSettings, ManualClock, Mode, RhythmValue, ScaleKey};

    fn settings() -> DrillSettings {
        DrillSettings {
            keys: vec![ScaleKey::C],
            modes: vec![Mode::Major],
            rhythms: vec![RhythmValue::Crotchet],
            num_notes: 4,
            questions_per_set: 2,
            auto_proceed: false,
            ..DrillSettings::default()
        }
    }

    fn message(result: CommandResult) -> String {
        match result {
            CommandResult::Message(m) => m,
            other => panic!("expected a message, got {:?}", other),
        }
    }

    fn wrong_degree(ctx: &CommandContext<ManualClock>) -> ScaleDegree {
        let expected = ctx.session.question().unwrap().degree_at(0).unwrap();
        ScaleDegree::diatonic().find(|d| *d != expected).unwrap()
    }

    #[test]
    fn test_start_announces_set_and_first_question() {
        colored::control::set_override(false);
        let mut ctx = context(settings());
        let out = message(cmd_start("", &mut ctx));
        assert!(out.contains("C Major at 90 BPM"));
        assert!(out.contains("Question 1/2"));
        assert!(out.contains("4 notes, playing after the cadence"));
        assert_eq!(ctx.session.state(), SessionState::Calibrating);
    }

    #[test]
    fn test_answer_before_start_is_an_error() {
        let mut ctx = context(settings());
        assert!(matches!(
            cmd_answer("3", &mut ctx),
            CommandResult::Error(_)
        ));
        assert!(matches!(cmd_answer("", &mut ctx), CommandResult::Error(_)));
    }

    #[test]
    fn test_wrong_then_right_answer() {
        colored::control::set_override(false);
        let mut ctx = context(settings());
        cmd_start("", &mut ctx);

        let wrong = wrong_degree(&ctx);
        let out = message(cmd_answer(&wrong.to_string(), &mut ctx));
        assert!(out.contains(&format!("✗ {}", wrong.label())));
        // flagged once per position
        assert_eq!(cmd_answer(&wrong.to_string(), &mut ctx), CommandResult::Success);

        let right = ctx.session.question().unwrap().degree_at(0).unwrap();
        let out = message(try_bare_answer(right.solfege(), &mut ctx).unwrap());
        assert!(out.contains(&format!("✓ {}", right.label())));
        assert!(out.ends_with(&format!("{} _ _ _", right)));
    }

    #[test]
    fn test_bare_answer_ignores_other_text() {
        let mut ctx = context(settings());
        assert!(try_bare_answer("hello", &mut ctx).is_none());
    }

    #[test]
    fn test_full_question_then_next_to_completion() {
        colored::control::set_override(false);
        let mut ctx = context(settings());
        cmd_start("", &mut ctx);

        let degrees = ctx.session.question().unwrap().degrees();
        let mut last = String::new();
        for d in degrees {
            last = message(cmd_answer(&d.to_string(), &mut ctx));
        }
        assert!(last.contains("Question complete! (type 'next' to continue)"));
        assert!(matches!(
            cmd_answer("1", &mut ctx),
            CommandResult::Message(_)
        ));

        let out = message(cmd_next("", &mut ctx));
        assert!(out.contains("Question 2/2"));
        let out = message(cmd_next("", &mut ctx));
        assert!(out.contains("Set complete!"));
    }

    #[test]
    fn test_finished_set_hint_leads_to_a_new_set() {
        colored::control::set_override(false);
        let mut ctx = context(DrillSettings {
            questions_per_set: 1,
            ..settings()
        });
        cmd_start("", &mut ctx);

        let degrees = ctx.session.question().unwrap().degrees();
        let mut last = String::new();
        for d in degrees {
            last = message(cmd_answer(&d.to_string(), &mut ctx));
        }
        assert!(last.contains("Set complete! Type 'restart' to go again"));
        assert!(!last.contains("type 'next'"));
        assert_eq!(ctx.session.state(), SessionState::SetComplete);

        // start is a no-op while the finished set is still on screen
        assert_eq!(cmd_start("", &mut ctx), CommandResult::Success);
        assert!(message(cmd_answer("1", &mut ctx)).contains("'restart'"));

        let out = message(cmd_restart("", &mut ctx));
        assert!(out.contains("Question 1/1"));
        assert_eq!(ctx.session.state(), SessionState::Calibrating);

        // the other advertised route: stop, then start afresh
        let degrees = ctx.session.question().unwrap().degrees();
        for d in degrees {
            cmd_answer(&d.to_string(), &mut ctx);
        }
        assert_eq!(ctx.session.state(), SessionState::SetComplete);
        cmd_stop("", &mut ctx);
        let out = message(cmd_start("", &mut ctx));
        assert!(out.contains("Question 1/1"));
    }

    #[test]
    fn test_reshuffle_refused_mid_set() {
        let mut ctx = context(settings());
        assert!(matches!(cmd_reshuffle("", &mut ctx), CommandResult::Message(_)));
        cmd_start("", &mut ctx);
        assert_eq!(
            cmd_reshuffle("", &mut ctx),
            CommandResult::Error("Cannot reshuffle while a set is in progress".to_string())
        );
    }

    #[test]
    fn test_pause_toggles_clock() {
        colored::control::set_override(false);
        let mut ctx = context(settings());
        assert_eq!(message(cmd_pause("", &mut ctx)), "⏸ Paused");
        assert!(ctx.session.clock().is_suspended());
        assert_eq!(message(cmd_pause("", &mut ctx)), "▶ Resumed");
        assert!(!ctx.session.clock().is_suspended());
    }

    #[test]
    fn test_replay_and_calibrate_need_a_set() {
        let mut ctx = context(settings());
        assert!(matches!(cmd_replay("", &mut ctx), CommandResult::Error(_)));
        assert!(matches!(cmd_calibrate("", &mut ctx), CommandResult::Error(_)));
        cmd_start("", &mut ctx);
        assert!(matches!(cmd_calibrate("", &mut ctx), CommandResult::Message(_)));
    }

    #[test]
    fn test_stop_returns_to_pre_start() {
        colored::control::set_override(false);
        let mut ctx = context(settings());
        cmd_start("", &mut ctx);
        assert_eq!(message(cmd_stop("", &mut ctx)), "⏹ Stopped");
        assert_eq!(ctx.session.state(), SessionState::PreStart);
        assert_eq!(answer_line(&ctx.session), "");
    }
}
