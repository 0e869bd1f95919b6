//! General REPL commands (help, quit, status, settings)

use crate::commands::drill::answer_line;
use crate::commands::{CommandContext, CommandResult};
use anyhow::{anyhow, Result};
use colored::*;
use solfa_core::{
    ClockAdapter, DrillSettings, Mode, RhythmValue, ScaleDegree, ScaleKey, SessionEvent,
    SessionState, TempoChoice,
};
use std::str::FromStr;

/// Handle `help` command
pub fn cmd_help<C: ClockAdapter>(_args: &str, _ctx: &mut CommandContext<C>) -> CommandResult {
    print_help();
    CommandResult::Success
}

/// Handle `quit` or `exit` command
pub fn cmd_quit<C: ClockAdapter>(_args: &str, _ctx: &mut CommandContext<C>) -> CommandResult {
    CommandResult::Exit
}

/// Handle `status` command
pub fn cmd_status<C: ClockAdapter>(_args: &str, ctx: &mut CommandContext<C>) -> CommandResult {
    let session = &ctx.session;
    let state = match session.state() {
        SessionState::PreStart => "not started",
        SessionState::Calibrating => "playing the cadence",
        SessionState::AwaitingAnswer => "waiting for your answer",
        SessionState::QuestionComplete => "question complete",
        SessionState::SetComplete => "set complete",
    };
    let mut out = format!("{} {}\n", "Set:".green(), session.params());
    out.push_str(&format!("{} {}", "State:".green(), state));
    if session.clock().is_suspended() {
        out.push_str(&format!(" {}", "(paused)".yellow()));
    }
    if session.state().in_set() {
        out.push_str(&format!(
            "\n{} {}/{}",
            "Question:".green(),
            session.question_number(),
            session.total_questions()
        ));
        out.push_str(&format!("\n{} {}", "Answer:".green(), answer_line(session)));
        let wrong: Vec<String> = session.wrong_flags().map(|d| d.to_string()).collect();
        if !wrong.is_empty() {
            out.push_str(&format!("\n{} {}", "Tried:".green(), wrong.join(" ").red()));
        }
    }
    CommandResult::Message(out)
}

/// Handle `settings` command
pub fn cmd_settings<C: ClockAdapter>(_args: &str, ctx: &mut CommandContext<C>) -> CommandResult {
    CommandResult::Message(format_settings(ctx.session.settings()))
}

/// Handle `set <field> <value>` command
pub fn cmd_set<C: ClockAdapter>(args: &str, ctx: &mut CommandContext<C>) -> CommandResult {
    let Some((field, value)) = args.split_once(char::is_whitespace) else {
        return CommandResult::Error(
            "Usage: set <field> <value> (type 'settings' to see the fields)".to_string(),
        );
    };

    let mut settings = ctx.session.settings().clone();
    if let Err(e) = apply_setting(&mut settings, field, value.trim()) {
        return CommandResult::Error(e.to_string());
    }
    match ctx.session.update_settings(settings) {
        Ok(events) => {
            let mut out = format!("{} {} updated", "✓".bright_green(), field);
            for event in events {
                if let SessionEvent::ParametersChosen(params) = event {
                    out.push_str(&format!("\n🎼 Next set: {}", params.to_string().bright_cyan()));
                }
            }
            CommandResult::Message(out)
        }
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

/// Write one field of `settings` from its textual value
pub fn apply_setting(settings: &mut DrillSettings, field: &str, value: &str) -> Result<()> {
    match field {
        "keys" | "key" => settings.keys = parse_list(value, ScaleKey::ALL)?,
        "degrees" | "degree" => settings.degrees = parse_list(value, ScaleDegree::diatonic())?,
        "rhythms" | "rhythm" => settings.rhythms = parse_list(value, RhythmValue::ALL)?,
        "modes" | "mode" => settings.modes = parse_list(value, Mode::ALL)?,
        "tempo" => {
            settings.tempo = TempoChoice::parse(value)
                .ok_or_else(|| anyhow!("Tempo must be slow, medium, fast or a BPM number"))?
        }
        "notes" => settings.num_notes = parse_number(value)?,
        "jump" => settings.max_jump = parse_number(value)?,
        "questions" => settings.questions_per_set = parse_number(value)?,
        "auto" => settings.auto_proceed = parse_switch(value)?,
        other => return Err(anyhow!("Unknown setting: {}", other)),
    }
    Ok(())
}

/// Comma or space separated values, or "all"
fn parse_list<T, I>(value: &str, all: I) -> Result<Vec<T>>
where
    T: FromStr<Err = anyhow::Error> + PartialEq,
    I: IntoIterator<Item = T>,
{
    if value.eq_ignore_ascii_case("all") {
        return Ok(all.into_iter().collect());
    }
    let mut items = Vec::new();
    for part in value.split(|c: char| c == ',' || c.is_whitespace()) {
        if part.is_empty() {
            continue;
        }
        let item = part.parse::<T>()?;
        if !items.contains(&item) {
            items.push(item);
        }
    }
    Ok(items)
}

fn parse_number<T: FromStr>(value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| anyhow!("Expected a whole number, got '{}'", value))
}

fn parse_switch(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        _ => Err(anyhow!("Expected on or off, got '{}'", value)),
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_settings(settings: &DrillSettings) -> String {
    let rhythms: Vec<&str> = settings.rhythms.iter().map(|r| r.name()).collect();
    let tempo = match settings.tempo {
        TempoChoice::Custom(bpm) => format!("{} BPM", bpm),
        other => format!("{:?} ({} BPM)", other, other.bpm()).to_lowercase(),
    };
    let auto = if settings.auto_proceed { "on" } else { "off" };
    let rows = [
        ("keys", join(&settings.keys)),
        ("degrees", join(&settings.degrees)),
        ("rhythms", rhythms.join(", ")),
        ("modes", join(&settings.modes)),
        ("tempo", tempo),
        ("notes", settings.num_notes.to_string()),
        ("jump", format!("{} semitones", settings.max_jump)),
        ("auto", auto.to_string()),
        ("questions", settings.questions_per_set.to_string()),
    ];
    rows.iter()
        .map(|(name, value)| format!("  {} {}", format!("{:<10}", name).cyan(), value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print help information
fn print_help() {
    println!("{}", "🎵 Solfa Help".bold());
    println!("{}", "=============".bold());
    println!();
    println!("{}", "Drill:".green());
    println!("  {}           - Play the cadence and the first question", "start".cyan());
    println!(
        "  {} or {}  - Answer the next note (1-7 or do, re, mi...)",
        "answer 5".cyan(),
        "5".cyan()
    );
    println!("  {}          - Hear the question again", "replay".cyan());
    println!("  {}       - Hear the key's cadence again", "calibrate".cyan());
    println!("  {}            - Skip to the next question", "next".cyan());
    println!("  {}           - Pause or resume all sound", "pause".cyan());
    println!("  {}         - Start the set over", "restart".cyan());
    println!("  {}            - End the set", "stop".cyan());
    println!("  {}       - Pick a different key and mode", "reshuffle".cyan());
    println!("  {}          - Where you are in the set", "status".cyan());
    println!();
    println!("{}", "Settings:".green());
    println!("  {}        - Show current settings", "settings".cyan());
    println!("  {}   - Keys to draw from (e.g. C, G, Eb or all)", "set keys ...".cyan());
    println!("  {} - Degrees to use (e.g. 1 3 5)", "set degrees ...".cyan());
    println!("  {} - quaver, crotchet, 1/16, ...", "set rhythms ...".cyan());
    println!("  {}   - major, minor or all", "set modes ...".cyan());
    println!("  {}  - slow, medium, fast or 30-240", "set tempo ...".cyan());
    println!("  {}  - Notes per question", "set notes <n>".cyan());
    println!("  {}   - Largest leap in semitones", "set jump <n>".cyan());
    println!("  {} - Move on automatically", "set auto on|off".cyan());
    println!("  {} - Questions per set", "set questions <n>".cyan());
    println!();
    println!("  {} or {} - Exit", "quit".cyan(), "Ctrl+D".cyan());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;

    #[test]
    fn test_apply_lists() {
        let mut settings = DrillSettings::default();
        apply_setting(&mut settings, "keys", "C, G g Eb").unwrap();
        assert_eq!(settings.keys, vec![ScaleKey::C, ScaleKey::G, ScaleKey::Eb]);

        apply_setting(&mut settings, "degrees", "1 3 5 so").unwrap();
        assert_eq!(settings.degrees.len(), 3);

        apply_setting(&mut settings, "modes", "all").unwrap();
        assert_eq!(settings.modes, Mode::ALL.to_vec());

        apply_setting(&mut settings, "rhythms", "quaver,1/16").unwrap();
        assert_eq!(
            settings.rhythms,
            vec![RhythmValue::Quaver, RhythmValue::Semiquaver]
        );
    }

    #[test]
    fn test_apply_scalars() {
        let mut settings = DrillSettings::default();
        apply_setting(&mut settings, "tempo", "fast").unwrap();
        assert_eq!(settings.tempo, TempoChoice::Fast);
        apply_setting(&mut settings, "tempo", "132").unwrap();
        assert_eq!(settings.tempo, TempoChoice::Custom(132));
        apply_setting(&mut settings, "notes", "8").unwrap();
        assert_eq!(settings.num_notes, 8);
        apply_setting(&mut settings, "auto", "off").unwrap();
        assert!(!settings.auto_proceed);

        assert!(apply_setting(&mut settings, "notes", "many").is_err());
        assert!(apply_setting(&mut settings, "volume", "3").is_err());
        assert!(apply_setting(&mut settings, "keys", "H").is_err());
    }

    #[test]
    fn test_set_rejects_invalid_settings() {
        let mut ctx = context(DrillSettings::default());
        let result = cmd_set("tempo 20", &mut ctx);
        assert_eq!(
            result,
            CommandResult::Error(
                "Invalid settings: Custom BPM must be between 30 and 240, got 20".to_string()
            )
        );
        assert_eq!(ctx.session.settings().tempo, TempoChoice::Medium);
        assert!(matches!(cmd_set("tempo", &mut ctx), CommandResult::Error(_)));
    }

    #[test]
    fn test_set_keys_redraws_parameters() {
        colored::control::set_override(false);
        let mut ctx = context(DrillSettings {
            keys: vec![ScaleKey::C],
            ..DrillSettings::default()
        });
        let out = match cmd_set("keys F#", &mut ctx) {
            CommandResult::Message(m) => m,
            other => panic!("unexpected {:?}", other),
        };
        assert!(out.contains("Next set: Gb"));
        assert_eq!(ctx.session.params().key, ScaleKey::Gb);
    }

    #[test]
    fn test_status_mid_set() {
        colored::control::set_override(false);
        let mut ctx = context(DrillSettings {
            num_notes: 3,
            ..DrillSettings::default()
        });
        crate::commands::drill::cmd_start("", &mut ctx);
        let CommandResult::Message(out) = cmd_status("", &mut ctx) else {
            panic!("status should print");
        };
        assert!(out.contains("State: playing the cadence"));
        assert!(out.contains("Question: 1/10"));
        assert!(out.contains("Answer: _ _ _"));
    }

    #[test]
    fn test_settings_listing() {
        colored::control::set_override(false);
        let listing = format_settings(&DrillSettings::default());
        assert!(listing.contains("medium (90 bpm)"));
        assert!(listing.contains("degrees    1, 2, 3, 4, 5, 6, 7"));
    }
}
