//! MIDI output substrate
//!
//! `MidiClock` drives an external instrument instead of the built-in synth.
//! A dispatcher thread owns the midir connection and a min-heap of timed
//! note-on/note-off messages, and sleeps until the earliest one is due. Time
//! is measured on a pausable wall clock: suspending stops it and silences
//! sounding notes, resuming picks up where it left off.

use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use midir::{MidiOutput, MidiOutputConnection};
use solfa_core::{
    ClockAdapter, Completer, Completion, CompletionError, Pitch, SingleFlight, VoiceStop,
};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const CLIENT_NAME: &str = "Solfa";

/// Clamp a pitch into the MIDI note range
pub fn pitch_to_note(pitch: Pitch) -> u8 {
    pitch.clamp(0, 127) as u8
}

/// Wall clock that can be stopped and restarted
#[derive(Debug)]
pub struct PausableClock {
    origin: Instant,
    paused_total: Duration,
    paused_at: Option<Instant>,
}

impl PausableClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            paused_total: Duration::ZERO,
            paused_at: None,
        }
    }

    pub fn seconds_at(&self, instant: Instant) -> f64 {
        let end = self.paused_at.unwrap_or(instant);
        end.saturating_duration_since(self.origin)
            .saturating_sub(self.paused_total)
            .as_secs_f64()
    }

    pub fn seconds(&self) -> f64 {
        self.seconds_at(Instant::now())
    }

    pub fn pause_at(&mut self, instant: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(instant);
        }
    }

    pub fn resume_at(&mut self, instant: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += instant.saturating_duration_since(paused_at);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }
}

impl Default for PausableClock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum NoteAction {
    On { note: u8, velocity: u8 },
    Off { note: u8 },
}

/// A message due at `at` seconds on the pausable clock
#[derive(Debug, Clone, Copy)]
struct TimedMessage {
    at: f64,
    /// Insertion order, so simultaneous messages keep their order
    seq: u64,
    voice: u64,
    action: NoteAction,
}

impl PartialEq for TimedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for TimedMessage {}

impl PartialOrd for TimedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedMessage {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // reversed: BinaryHeap pops the earliest message first
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

enum DispatchCommand {
    Connect(Completer),
    Schedule {
        voice: u64,
        note: u8,
        velocity: u8,
        at: f64,
        off_at: f64,
    },
    Cancel(u64),
    Suspend(Completer),
    Resume(Completer),
    Shutdown,
}

/// External-instrument clock and voice engine
pub struct MidiClock {
    port: String,
    channel: u8,
    clock: Arc<Mutex<PausableClock>>,
    suspended: AtomicBool,
    connected: Arc<AtomicBool>,
    commands: Sender<DispatchCommand>,
    thread: Option<JoinHandle<()>>,
    next_voice: AtomicU64,
    load: SingleFlight,
    resuming: SingleFlight,
    suspending: SingleFlight,
}

impl MidiClock {
    /// Prepare a clock for the first port whose name contains `port`.
    /// The port is opened by [`ClockAdapter::ensure_ready`].
    pub fn new(port: &str, channel: u8) -> Result<Self> {
        let (tx, rx) = unbounded();
        let clock = Arc::new(Mutex::new(PausableClock::new()));
        let connected = Arc::new(AtomicBool::new(false));

        let dispatcher = Dispatcher {
            port: port.to_string(),
            channel: channel & 0x0F,
            clock: clock.clone(),
            connected: connected.clone(),
            commands: rx,
            connection: None,
            queue: BinaryHeap::new(),
            sounding: HashMap::new(),
            seq: 0,
        };
        let thread = thread::Builder::new()
            .name("solfa-midi".to_string())
            .spawn(move || dispatcher.run())
            .map_err(|e| anyhow!("Failed to start MIDI thread: {}", e))?;

        Ok(Self {
            port: port.to_string(),
            channel: channel & 0x0F,
            clock,
            suspended: AtomicBool::new(false),
            connected,
            commands: tx,
            thread: Some(thread),
            next_voice: AtomicU64::new(1),
            load: SingleFlight::once(),
            resuming: SingleFlight::repeatable(),
            suspending: SingleFlight::repeatable(),
        })
    }

    /// Names of the available MIDI output ports.
    /// Retries a few times since creating a client occasionally fails on macOS.
    pub fn list_ports() -> Result<Vec<String>> {
        let mut last_err = None;
        for attempt in 0..3 {
            if attempt > 0 {
                thread::sleep(Duration::from_millis(100));
            }
            match MidiOutput::new(CLIENT_NAME) {
                Ok(midi_out) => {
                    return Ok(midi_out
                        .ports()
                        .iter()
                        .filter_map(|p| midi_out.port_name(p).ok())
                        .collect());
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(anyhow!(
            "MIDI initialization failed after 3 attempts: {:?}",
            last_err
        ))
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn clock(&self) -> MutexGuard<'_, PausableClock> {
        self.clock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send(&self, command: DispatchCommand) {
        if self.commands.send(command).is_err() {
            log::warn!("MIDI dispatcher is gone");
        }
    }
}

impl Drop for MidiClock {
    fn drop(&mut self) {
        let _ = self.commands.send(DispatchCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct MidiStop {
    commands: Sender<DispatchCommand>,
    voice: u64,
    stopped: AtomicBool,
}

impl VoiceStop for MidiStop {
    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            let _ = self.commands.send(DispatchCommand::Cancel(self.voice));
        }
    }
}

impl ClockAdapter for MidiClock {
    fn ensure_ready(&self) -> Completion {
        self.load
            .run(|completer| self.send(DispatchCommand::Connect(completer)))
    }

    fn now(&self) -> f64 {
        self.clock().seconds()
    }

    fn resume(&self) -> Completion {
        self.suspended.store(false, Ordering::Release);
        self.resuming
            .run(|completer| self.send(DispatchCommand::Resume(completer)))
    }

    fn suspend(&self) -> Completion {
        self.suspended.store(true, Ordering::Release);
        self.suspending
            .run(|completer| self.send(DispatchCommand::Suspend(completer)))
    }

    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    fn trigger_voice(
        &self,
        pitch: Pitch,
        at: f64,
        duration: f64,
        velocity: u8,
    ) -> Box<dyn VoiceStop> {
        let voice = self.next_voice.fetch_add(1, Ordering::Relaxed);
        self.send(DispatchCommand::Schedule {
            voice,
            note: pitch_to_note(pitch),
            velocity: velocity.clamp(1, 127),
            at,
            off_at: at + duration.max(0.0),
        });
        Box::new(MidiStop {
            commands: self.commands.clone(),
            voice,
            stopped: AtomicBool::new(false),
        })
    }
}

/// Owns the connection; runs on the MIDI thread
struct Dispatcher {
    port: String,
    channel: u8,
    clock: Arc<Mutex<PausableClock>>,
    connected: Arc<AtomicBool>,
    commands: Receiver<DispatchCommand>,
    connection: Option<MidiOutputConnection>,
    queue: BinaryHeap<TimedMessage>,
    /// Voice id to the note it is holding
    sounding: HashMap<u64, u8>,
    seq: u64,
}

impl Dispatcher {
    fn clock(&self) -> MutexGuard<'_, PausableClock> {
        self.clock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run(mut self) {
        loop {
            let wait = self.time_to_next();
            let command = match wait {
                Some(wait) => crossbeam_channel::select! {
                    recv(self.commands) -> msg => msg.ok(),
                    default(wait) => {
                        self.dispatch_due();
                        continue;
                    }
                },
                None => self.commands.recv().ok(),
            };
            match command {
                Some(DispatchCommand::Shutdown) | None => break,
                Some(command) => self.handle(command),
            }
        }
        self.all_notes_off();
    }

    /// Real time until the earliest message is due; `None` while paused or idle
    fn time_to_next(&self) -> Option<Duration> {
        let next = self.queue.peek()?;
        let clock = self.clock();
        if clock.is_paused() {
            return None;
        }
        let ahead = (next.at - clock.seconds()).max(0.0);
        Some(Duration::from_secs_f64(ahead))
    }

    fn handle(&mut self, command: DispatchCommand) {
        match command {
            DispatchCommand::Connect(done) => match self.connect() {
                Ok(name) => {
                    log::info!("MIDI output connected to '{}'", name);
                    self.connected.store(true, Ordering::Release);
                    done.complete(Ok(()));
                }
                Err(e) => {
                    log::error!("MIDI connect failed: {:#}", e);
                    done.complete(Err(CompletionError::new(format!("{:#}", e))));
                }
            },
            DispatchCommand::Schedule {
                voice,
                note,
                velocity,
                at,
                off_at,
            } => {
                self.push(at, voice, NoteAction::On { note, velocity });
                self.push(off_at, voice, NoteAction::Off { note });
            }
            DispatchCommand::Cancel(voice) => {
                let remaining: Vec<_> = self.queue.drain().filter(|m| m.voice != voice).collect();
                self.queue.extend(remaining);
                if let Some(note) = self.sounding.remove(&voice) {
                    self.send(&[0x80 | self.channel, note, 0]);
                }
            }
            DispatchCommand::Suspend(done) => {
                self.clock().pause_at(Instant::now());
                // held notes would otherwise ring through the pause
                let held: Vec<u8> = self.sounding.values().copied().collect();
                for note in held {
                    self.send(&[0x80 | self.channel, note, 0]);
                }
                done.complete(Ok(()));
            }
            DispatchCommand::Resume(done) => {
                self.clock().resume_at(Instant::now());
                done.complete(Ok(()));
            }
            DispatchCommand::Shutdown => {}
        }
    }

    fn push(&mut self, at: f64, voice: u64, action: NoteAction) {
        self.seq += 1;
        self.queue.push(TimedMessage {
            at,
            seq: self.seq,
            voice,
            action,
        });
    }

    fn dispatch_due(&mut self) {
        let now = self.clock().seconds();
        while self.queue.peek().is_some_and(|m| m.at <= now) {
            let Some(message) = self.queue.pop() else {
                break;
            };
            match message.action {
                NoteAction::On { note, velocity } => {
                    self.sounding.insert(message.voice, note);
                    self.send(&[0x90 | self.channel, note, velocity]);
                }
                NoteAction::Off { note } => {
                    if self.sounding.remove(&message.voice).is_some() {
                        self.send(&[0x80 | self.channel, note, 0]);
                    }
                }
            }
        }
    }

    fn connect(&mut self) -> Result<String> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|name| name.contains(&self.port))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("MIDI port '{}' not found", self.port))?;
        let name = midi_out.port_name(port)?;
        let connection = midi_out
            .connect(port, "solfa-out")
            .map_err(|e| anyhow!("Failed to connect to '{}': {}", name, e))?;
        self.connection = Some(connection);
        Ok(name)
    }

    fn send(&mut self, message: &[u8]) {
        if let Some(conn) = self.connection.as_mut() {
            if let Err(e) = conn.send(message) {
                log::warn!("MIDI send failed: {}", e);
            }
        }
    }

    fn all_notes_off(&mut self) {
        // CC 123 on our channel
        self.send(&[0xB0 | self.channel, 123, 0]);
        self.sounding.clear();
    }
}
