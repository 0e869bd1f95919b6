//! REPL (Read-Eval-Print Loop) driving a drill session

use crate::audio::Backend;
use crate::commands::drill::{render_events, try_bare_answer};
use crate::commands::{create_registry, CommandContext, CommandResult};
use anyhow::Result;
use colored::*;
use crossbeam_channel::{tick, unbounded, Receiver, Sender};
use rand::rngs::StdRng;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use solfa_core::{ClockAdapter, DrillSettings, Session};
use std::thread;
use std::time::Duration;

/// How often time-based session transitions are checked
const TICK_INTERVAL: Duration = Duration::from_millis(25);

/// Types of events the REPL loop handles
enum ReplEvent {
    Input(Result<String, ReadlineError>),
}

/// Interactive REPL for ear-training drills
pub struct Repl {
    editor: Option<DefaultEditor>,
    ctx: CommandContext<Backend>,

    // Event channels
    tx_input: Sender<ReplEvent>,
    rx_input: Receiver<ReplEvent>,
}

impl Repl {
    /// Create a REPL around `backend`. The engine starts loading right away.
    pub fn new(backend: Backend, settings: DrillSettings, rng: StdRng) -> Result<Self> {
        let editor = DefaultEditor::new()?;
        // loads in the background; `start` waits for it
        let _ = backend.ensure_ready();
        let session = Session::new(backend, settings, rng)?;
        let (tx_input, rx_input) = unbounded();

        Ok(Repl {
            editor: Some(editor),
            ctx: CommandContext::new(session),
            tx_input,
            rx_input,
        })
    }

    fn spawn_reader(&mut self) -> Result<()> {
        let mut editor = self
            .editor
            .take()
            .ok_or_else(|| anyhow::anyhow!("REPL is already running"))?;
        let tx_input = self.tx_input.clone();

        thread::Builder::new()
            .name("solfa-input".to_string())
            .spawn(move || loop {
                let prompt = format!("{} ", "solfa>".bright_magenta().bold());
                let readline = editor.readline(&prompt);

                match readline {
                    Ok(line) => {
                        let line = line.trim().to_string();
                        if !line.is_empty() {
                            let _ = editor.add_history_entry(&line);
                        }
                        if tx_input.send(ReplEvent::Input(Ok(line))).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        let _ = tx_input.send(ReplEvent::Input(Err(err)));
                        break;
                    }
                }
            })?;
        Ok(())
    }

    /// Start the REPL loop
    pub fn run(&mut self) -> Result<()> {
        println!(
            "{} {}",
            "🎵".bright_yellow(),
            "Solfa Ear Trainer".bright_cyan().bold()
        );
        println!(
            "Hear a cadence, then name each note of the melody by its scale degree ({}).",
            "1-7 or do..ti".cyan()
        );
        println!(
            "Type '{}' to begin, '{}' for more information, '{}' or {} to exit.\n",
            "start".bright_green(),
            "help".bright_green(),
            "quit".bright_red(),
            "Ctrl+C".bright_red()
        );
        println!(
            "🎼 First set: {}",
            self.ctx.session.params().to_string().bright_cyan()
        );

        self.spawn_reader()?;
        let registry = create_registry();
        let ticker = tick(TICK_INTERVAL);

        loop {
            crossbeam_channel::select! {
                recv(self.rx_input) -> msg => match msg {
                    Ok(ReplEvent::Input(res)) => match res {
                        Ok(line) => {
                            if line.is_empty() {
                                continue;
                            }

                            // Engine details live on the concrete backend
                            if line == "engine" {
                                println!("🔊 {}", self.ctx.session.clock().describe());
                                continue;
                            }

                            let result = match registry.execute(&line, &mut self.ctx) {
                                CommandResult::NotACommand => try_bare_answer(&line, &mut self.ctx)
                                    .unwrap_or(CommandResult::NotACommand),
                                other => other,
                            };
                            match result {
                                CommandResult::Success => {}
                                CommandResult::Message(msg) => println!("{}", msg),
                                CommandResult::Exit => {
                                    println!("{} 🎵", "Goodbye!".bright_cyan());
                                    break;
                                }
                                CommandResult::Error(e) => {
                                    println!("{} {}", "Error:".bright_red().bold(), e.red());
                                }
                                CommandResult::NotACommand => println!(
                                    "{} '{}'. Type '{}' for a list of commands.",
                                    "Unknown command".bright_red(),
                                    line,
                                    "help".bright_green()
                                ),
                            }
                        }
                        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                            println!("{} 🎵", "Goodbye!".bright_cyan());
                            break;
                        }
                        Err(err) => {
                            println!(
                                "{} {}",
                                "Error reading input:".bright_red().bold(),
                                err.to_string().red()
                            );
                        }
                    },
                    Err(_) => break, // Channel closed
                },

                recv(ticker) -> _ => {
                    let events = self.ctx.session.tick();
                    if !events.is_empty() {
                        println!("\n{}", render_events(&events, &self.ctx.session));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Convenience function to start the REPL
pub fn start(backend: Backend, settings: DrillSettings, rng: StdRng) -> Result<()> {
    let mut repl = Repl::new(backend, settings, rng)?;
    repl.run()
}
