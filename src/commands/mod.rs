//! Command registry for REPL commands
//!
//! Provides a clean, extensible pattern for handling REPL commands.

pub mod drill;
pub mod general;

use rand::rngs::StdRng;
use solfa_core::{ClockAdapter, Session};

/// Result of executing a command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Command executed successfully, continue REPL
    Success,
    /// Command executed, show this message
    Message(String),
    /// Exit the REPL
    Exit,
    /// Not a command
    NotACommand,
    /// Error occurred
    Error(String),
}

/// Context passed to command handlers
pub struct CommandContext<C: ClockAdapter> {
    pub session: Session<C, StdRng>,
}

impl<C: ClockAdapter> CommandContext<C> {
    pub fn new(session: Session<C, StdRng>) -> Self {
        Self { session }
    }
}

/// A command handler function
pub type CommandHandler<C> = fn(&str, &mut CommandContext<C>) -> CommandResult;

/// Registry of available commands
pub struct CommandRegistry<C: ClockAdapter> {
    /// Commands indexed by their prefix (e.g., "set tempo")
    /// Sorted by prefix length descending for longest-match-first lookup
    commands: Vec<(String, CommandHandler<C>)>,
}

impl<C: ClockAdapter> CommandRegistry<C> {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Register a command with its prefix
    pub fn register(&mut self, prefix: &str, handler: CommandHandler<C>) {
        self.commands.push((prefix.to_string(), handler));
        // Sort by prefix length descending for longest-match-first
        self.commands.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    /// Execute a command, returning NotACommand if no match found
    pub fn execute(&self, input: &str, ctx: &mut CommandContext<C>) -> CommandResult {
        for (prefix, handler) in &self.commands {
            if input == prefix || input.starts_with(&format!("{} ", prefix)) {
                let args = if input.len() > prefix.len() {
                    input[prefix.len()..].trim()
                } else {
                    ""
                };
                return handler(args, ctx);
            }
        }
        CommandResult::NotACommand
    }

    /// Get all registered command prefixes
    pub fn list_commands(&self) -> Vec<&str> {
        self.commands.iter().map(|(p, _)| p.as_str()).collect()
    }
}

impl<C: ClockAdapter> Default for CommandRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a fully populated command registry with all built-in commands
pub fn create_registry<C: ClockAdapter>() -> CommandRegistry<C> {
    let mut registry = CommandRegistry::new();

    // Drill commands
    registry.register("start", drill::cmd_start);
    registry.register("reshuffle", drill::cmd_reshuffle);
    registry.register("answer", drill::cmd_answer);
    registry.register("pause", drill::cmd_pause);
    registry.register("replay", drill::cmd_replay);
    registry.register("calibrate", drill::cmd_calibrate);
    registry.register("next", drill::cmd_next);
    registry.register("restart", drill::cmd_restart);
    registry.register("stop", drill::cmd_stop);

    // General commands
    registry.register("status", general::cmd_status);
    registry.register("settings", general::cmd_settings);
    registry.register("set", general::cmd_set);
    registry.register("help", general::cmd_help);
    registry.register("quit", general::cmd_quit);
    registry.register("exit", general::cmd_quit);

    registry
}


#[cfg(test)]
mod tests {
    use super::*;
    use solfa_core::{DrillSettings, ManualClock};

    #[test]
    fn test_longest_prefix_wins() {
        let registry = create_registry::<ManualClock>();
        let commands = registry.list_commands();
        let settings = commands.iter().position(|c| *c == "settings").unwrap();
        let set = commands.iter().position(|c| *c == "set").unwrap();
        assert!(settings < set);
    }

    #[test]
    fn test_unknown_input_is_not_a_command() {
        let registry = create_registry();
        let mut ctx = test_support::context(DrillSettings::default());
        assert_eq!(
            registry.execute("starts", &mut ctx),
            CommandResult::NotACommand
        );
        assert_eq!(registry.execute("quit", &mut ctx), CommandResult::Exit);
    }
}
