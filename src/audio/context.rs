//! Built-in synth substrate
//!
//! `AudioContext` owns the single output stream for the process. The stream
//! is opened lazily on a dedicated engine thread (cpal streams are not
//! `Send` on every platform), and its sample-frame counter is the clock the
//! scheduler works against. Suspending freezes that counter, so everything
//! scheduled waits with it.
//!
//! Load, resume and suspend hand back a [`Completion`]; concurrent callers
//! share whatever operation is already in flight.

use super::synth::{Reverb, Voice, VoiceTable};
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use solfa_core::{
    ClockAdapter, Completer, Completion, CompletionError, NoopStop, Pitch, SingleFlight, VoiceStop,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// State shared between the context and the audio callback
struct EngineShared {
    voices: Mutex<VoiceTable>,
    /// Frames rendered while not suspended
    frames: AtomicU64,
    /// 0 until a stream is open
    sample_rate: AtomicU32,
    suspended: AtomicBool,
    next_voice: AtomicU64,
}

impl EngineShared {
    fn voices(&self) -> MutexGuard<'_, VoiceTable> {
        self.voices.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_open(&self) -> bool {
        self.sample_rate.load(Ordering::Acquire) != 0
    }
}

/// Acknowledged by the callback once it has seen the new transport state
enum TransportCommand {
    Suspend(Completer),
    Resume(Completer),
}

struct EngineHandle {
    transport: Sender<TransportCommand>,
    shutdown: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

/// The synth's clock and voice engine
pub struct AudioContext {
    shared: Arc<EngineShared>,
    engine: Mutex<Option<EngineHandle>>,
    load: SingleFlight,
    resuming: SingleFlight,
    suspending: SingleFlight,
    with_reverb: bool,
}

impl AudioContext {
    /// Create a context; no device is opened until [`ClockAdapter::ensure_ready`]
    pub fn new(with_reverb: bool) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                voices: Mutex::new(VoiceTable::default()),
                frames: AtomicU64::new(0),
                sample_rate: AtomicU32::new(0),
                suspended: AtomicBool::new(false),
                next_voice: AtomicU64::new(1),
            }),
            engine: Mutex::new(None),
            load: SingleFlight::once(),
            resuming: SingleFlight::repeatable(),
            suspending: SingleFlight::repeatable(),
            with_reverb,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate.load(Ordering::Acquire)
    }

    /// Voices not yet faded out
    pub fn active_voices(&self) -> usize {
        self.shared.voices().len()
    }

    fn engine(&self) -> MutexGuard<'_, Option<EngineHandle>> {
        self.engine.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn spawn_engine(&self, completer: Completer) {
        let (transport_tx, transport_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let shared = self.shared.clone();
        let with_reverb = self.with_reverb;

        let spawned = thread::Builder::new()
            .name("solfa-audio".to_string())
            .spawn(move || {
                run_engine(shared, with_reverb, transport_rx, shutdown_rx, completer)
            });

        match spawned {
            Ok(thread) => {
                // a failed earlier attempt may have left a finished handle behind
                if let Some(old) = self.engine().replace(EngineHandle {
                    transport: transport_tx,
                    shutdown: shutdown_tx,
                    thread: Some(thread),
                }) {
                    shut_down(old);
                }
            }
            // the completer went down with the closure, so waiters see a failure
            Err(e) => log::error!("could not start audio thread: {}", e),
        }
    }

    /// Request a transport change, or apply it directly before a stream exists
    fn transport(&self, flight: &SingleFlight, suspend: bool) -> Completion {
        self.shared.suspended.store(suspend, Ordering::Release);
        flight.run(|completer| {
            let engine = self.engine();
            match engine.as_ref() {
                Some(handle) if self.shared.is_open() => {
                    let command = if suspend {
                        TransportCommand::Suspend(completer)
                    } else {
                        TransportCommand::Resume(completer)
                    };
                    if handle.transport.send(command).is_err() {
                        log::warn!("audio thread is gone; transport change not acknowledged");
                    }
                }
                _ => completer.complete(Ok(())),
            }
        })
    }
}

impl Default for AudioContext {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        if let Some(handle) = self.engine().take() {
            shut_down(handle);
        }
    }
}

fn shut_down(mut handle: EngineHandle) {
    let _ = handle.shutdown.send(());
    if let Some(thread) = handle.thread.take() {
        let _ = thread.join();
    }
}

/// Stops one synth voice through the shared table
struct SynthStop {
    shared: Arc<EngineShared>,
    id: u64,
}

impl VoiceStop for SynthStop {
    fn stop(&self) {
        let frame = self.shared.frames.load(Ordering::Acquire);
        self.shared.voices().stop(self.id, frame);
    }
}

impl ClockAdapter for AudioContext {
    fn ensure_ready(&self) -> Completion {
        self.load.run(|completer| self.spawn_engine(completer))
    }

    fn now(&self) -> f64 {
        let rate = self.sample_rate();
        if rate == 0 {
            return 0.0;
        }
        self.shared.frames.load(Ordering::Acquire) as f64 / rate as f64
    }

    fn resume(&self) -> Completion {
        self.transport(&self.resuming, false)
    }

    fn suspend(&self) -> Completion {
        self.transport(&self.suspending, true)
    }

    fn is_suspended(&self) -> bool {
        self.shared.suspended.load(Ordering::Acquire)
    }

    fn trigger_voice(
        &self,
        pitch: Pitch,
        at: f64,
        duration: f64,
        velocity: u8,
    ) -> Box<dyn VoiceStop> {
        let rate = self.sample_rate();
        if rate == 0 {
            log::debug!("voice {} dropped: audio engine not loaded", pitch);
            return Box::new(NoopStop);
        }
        let id = self.shared.next_voice.fetch_add(1, Ordering::Relaxed);
        let start_frame = (at.max(0.0) * rate as f64).round() as u64;
        let hold_frames = (duration.max(0.0) * rate as f64).round() as u64;
        self.shared.voices().add(Voice::new(
            id,
            pitch,
            velocity,
            start_frame,
            hold_frames,
            rate as f32,
        ));
        Box::new(SynthStop {
            shared: self.shared.clone(),
            id,
        })
    }
}

/// Body of the engine thread: open the stream, report, then keep it alive
fn run_engine(
    shared: Arc<EngineShared>,
    with_reverb: bool,
    transport: Receiver<TransportCommand>,
    shutdown: Receiver<()>,
    completer: Completer,
) {
    let stream = match open_stream(shared.clone(), with_reverb, transport) {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("audio engine failed to load: {:#}", e);
            completer.complete(Err(CompletionError::new(format!("{:#}", e))));
            return;
        }
    };
    log::info!(
        "audio engine running at {} Hz",
        shared.sample_rate.load(Ordering::Acquire)
    );
    completer.complete(Ok(()));

    // returns on shutdown or when the context is dropped
    let _ = shutdown.recv();
    drop(stream);
    shared.sample_rate.store(0, Ordering::Release);
}

fn open_stream(
    shared: Arc<EngineShared>,
    with_reverb: bool,
    transport: Receiver<TransportCommand>,
) -> Result<Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device available"))?;
    let config = device
        .default_output_config()
        .context("Failed to query output configuration")?;

    let sample_format = config.sample_format();
    let config: StreamConfig = config.into();
    let sample_rate = config.sample_rate.0;

    let reverb = if with_reverb {
        match Reverb::new(sample_rate) {
            Ok(reverb) => Some(reverb),
            Err(e) => {
                log::warn!("reverb unavailable, continuing dry: {}", e);
                None
            }
        }
    } else {
        None
    };

    let renderer = Renderer {
        shared: shared.clone(),
        transport,
        reverb,
        channels: config.channels as usize,
        sample_rate: sample_rate as f32,
    };
    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, renderer)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, renderer)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, renderer)?,
        _ => return Err(anyhow!("Unsupported sample format: {:?}", sample_format)),
    };

    go_live(&shared, &stream, sample_rate)?;
    Ok(stream)
}

/// Start `stream`, then publish its rate so voices can be scheduled
fn go_live<S: StreamTrait>(shared: &EngineShared, stream: &S, sample_rate: u32) -> Result<()> {
    stream
        .play()
        .map_err(|e| anyhow!("Failed to play stream: {}", e))?;
    shared.sample_rate.store(sample_rate, Ordering::Release);
    Ok(())
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut renderer: Renderer,
) -> Result<Stream>
where
    T: Sample + SizedSample + Send + 'static + cpal::FromSample<f32>,
{
    let err_fn = |err: cpal::StreamError| log::error!("output stream error: {}", err);
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| renderer.fill(data),
            err_fn,
            None,
        )
        .map_err(|e| anyhow!("Failed to build output stream: {}", e))
}

/// Owned by the audio callback
struct Renderer {
    shared: Arc<EngineShared>,
    transport: Receiver<TransportCommand>,
    reverb: Option<Reverb>,
    channels: usize,
    sample_rate: f32,
}

impl Renderer {
    fn fill<T>(&mut self, data: &mut [T])
    where
        T: Sample + cpal::FromSample<f32>,
    {
        let suspended = self.shared.suspended.load(Ordering::Acquire);
        while let Ok(command) = self.transport.try_recv() {
            match command {
                TransportCommand::Suspend(done) | TransportCommand::Resume(done) => {
                    done.complete(Ok(()))
                }
            }
        }

        if suspended {
            data.fill(T::EQUILIBRIUM);
            return;
        }

        let mut frame = self.shared.frames.load(Ordering::Acquire);
        {
            let mut voices = self.shared.voices();
            for out in data.chunks_mut(self.channels) {
                let mut value = voices.render(frame, self.sample_rate);
                if let Some(reverb) = self.reverb.as_mut() {
                    value = reverb.process(value);
                }
                let sample: T = T::from_sample(value);
                out.fill(sample);
                frame += 1;
            }
            voices.prune();
        }
        self.shared.frames.store(frame, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unloaded_context_is_silent_and_frozen() {
        let ctx = AudioContext::new(false);
        assert_eq!(ctx.now(), 0.0);
        let stop = ctx.trigger_voice(60, 0.0, 0.5, 90);
        stop.stop();
        assert_eq!(ctx.active_voices(), 0);
    }

    #[test]
    fn test_transport_before_load_completes_immediately() {
        let ctx = AudioContext::new(false);
        assert_eq!(ctx.suspend().wait(), Ok(()));
        assert!(ctx.is_suspended());
        assert_eq!(ctx.resume().wait(), Ok(()));
        assert!(!ctx.is_suspended());
    }

    struct FakeStream {
        playable: bool,
    }

    impl StreamTrait for FakeStream {
        fn play(&self) -> Result<(), cpal::PlayStreamError> {
            if self.playable {
                Ok(())
            } else {
                Err(cpal::PlayStreamError::DeviceNotAvailable)
            }
        }

        fn pause(&self) -> Result<(), cpal::PauseStreamError> {
            Ok(())
        }
    }

    #[test]
    fn test_rate_stays_unset_when_play_fails() {
        let ctx = AudioContext::new(false);
        let broken = FakeStream { playable: false };
        let err = go_live(&ctx.shared, &broken, 48_000).unwrap_err();
        assert!(err.to_string().contains("Failed to play stream"));
        assert_eq!(ctx.sample_rate(), 0);
        // voices are still dropped rather than queued against a dead stream
        ctx.trigger_voice(60, 0.0, 0.5, 90);
        assert_eq!(ctx.active_voices(), 0);

        let working = FakeStream { playable: true };
        go_live(&ctx.shared, &working, 48_000).unwrap();
        assert_eq!(ctx.sample_rate(), 48_000);
    }

    #[test]
    fn test_load_is_shared() {
        // may fail on machines without an output device; both callers must agree
        let ctx = AudioContext::new(false);
        let first = ctx.ensure_ready();
        let second = ctx.ensure_ready();
        assert_eq!(first.wait(), second.wait());
    }
}
