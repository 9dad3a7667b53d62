//! `SegmentationEngine` — top-level lifecycle controller.
//!
//! ## Data flow
//!
//! ```text
//! push_chunk()
//!     └─► bounded command queue ─► classification worker (spawn_blocking)
//!             scorer.score() → hysteresis → state machine
//!                 └─► SpeechReady ─► DispatchQueue ─► transcriber worker
//!                                         │
//!                     broadcast::Sender<EngineEvent> ◄┘
//! ```
//!
//! ## Serialization domains
//!
//! Two independent domains, never merged:
//! - the classification worker owns the scorer and its recurrent state, so
//!   scorer calls are one-at-a-time and in stream order;
//! - the dispatch worker owns the transcriber, so transcription calls are
//!   one-at-a-time and in finalization order.
//!
//! Transcription lag never blocks classification: the two workers only share
//! the unbounded segment FIFO between them.

pub mod config;
pub mod dispatch;
pub mod state_machine;

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    buffering::chunk::{ChunkAccumulator, FixedChunk},
    engine::config::{ConfigPatch, EngineConfig},
    engine::dispatch::DispatchQueue,
    engine::state_machine::{SegmentationStateMachine, StepEvent},
    error::{EngineError, Result},
    events::{EngineEvent, StatusKind},
    inference::Transcriber,
    vad::{HysteresisClassifier, RecurrentState, SpeechScorer},
};

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Bounded inbound chunk queue. 512 chunks of 512 samples ≈ 16 s at 16 kHz —
/// enough slack for a slow scorer warm-up, small enough that a stuck scorer
/// surfaces as `ChunkQueueOverrun` instead of unbounded growth.
const CHUNK_QUEUE_CAP: usize = 512;

/// Shared pipeline counters for observability.
#[derive(Debug, Default)]
pub struct EngineDiagnostics {
    chunks_in: AtomicUsize,
    scorer_errors: AtomicUsize,
    segments_ready: AtomicUsize,
    segments_discarded: AtomicUsize,
    transcripts: AtomicUsize,
    transcription_errors: AtomicUsize,
    overruns: AtomicUsize,
}

impl EngineDiagnostics {
    pub(crate) fn inc_transcripts(&self) {
        self.transcripts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_transcription_errors(&self) {
        self.transcription_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_in: self.chunks_in.load(Ordering::Relaxed),
            scorer_errors: self.scorer_errors.load(Ordering::Relaxed),
            segments_ready: self.segments_ready.load(Ordering::Relaxed),
            segments_discarded: self.segments_discarded.load(Ordering::Relaxed),
            transcripts: self.transcripts.load(Ordering::Relaxed),
            transcription_errors: self.transcription_errors.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub chunks_in: usize,
    pub scorer_errors: usize,
    pub segments_ready: usize,
    pub segments_discarded: usize,
    pub transcripts: usize,
    pub transcription_errors: usize,
    pub overruns: usize,
}

/// Commands travel through one ordered queue so reconfiguration lands
/// exactly between the chunks that preceded and followed it.
enum Command {
    Chunk(FixedChunk),
    Reconfigure { config: EngineConfig, reallocate: bool },
    Shutdown,
}

/// The streaming VAD + segmentation engine.
///
/// Owns all mutable state explicitly — construct one per session; multiple
/// engines coexist freely. `SegmentationEngine` is `Send + Sync`; wrap in
/// `Arc` to share between the audio source and event consumers.
pub struct SegmentationEngine {
    config: Mutex<EngineConfig>,
    accumulator: Mutex<ChunkAccumulator>,
    running: Arc<AtomicBool>,
    recording: Arc<AtomicBool>,
    cmd_tx: Sender<Command>,
    events_tx: broadcast::Sender<EngineEvent>,
    diagnostics: Arc<EngineDiagnostics>,
}

impl SegmentationEngine {
    /// Create the engine and spawn its two workers.
    ///
    /// # Errors
    /// `ConfigurationInvalid` if `config` fails validation.
    pub fn new(
        config: EngineConfig,
        scorer: Box<dyn SpeechScorer>,
        transcriber: Box<dyn Transcriber>,
    ) -> Result<Self> {
        config.validate()?;

        let (events_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (cmd_tx, cmd_rx) = bounded::<Command>(CHUNK_QUEUE_CAP);
        let diagnostics = Arc::new(EngineDiagnostics::default());
        let running = Arc::new(AtomicBool::new(true));
        let recording = Arc::new(AtomicBool::new(false));

        let dispatch = DispatchQueue::spawn(
            transcriber,
            events_tx.clone(),
            Arc::clone(&diagnostics),
        );

        let worker = ClassificationWorker {
            scorer,
            classifier: HysteresisClassifier::new(config.speech_threshold, config.exit_threshold),
            machine: SegmentationStateMachine::new(&config),
            state: RecurrentState::default(),
            sample_rate: config.sample_rate,
            dispatch,
            events_tx: events_tx.clone(),
            diagnostics: Arc::clone(&diagnostics),
            recording: Arc::clone(&recording),
        };
        tokio::task::spawn_blocking(move || worker.run(cmd_rx));

        info!(
            sample_rate = config.sample_rate,
            chunk_size = config.chunk_size,
            "segmentation engine started"
        );

        Ok(Self {
            accumulator: Mutex::new(ChunkAccumulator::new(config.chunk_size)),
            config: Mutex::new(config),
            running,
            recording,
            cmd_tx,
            events_tx,
            diagnostics,
        })
    }

    /// Push one chunk-aligned block of mono samples, in stream order.
    ///
    /// # Errors
    /// - `NotRunning` after [`shutdown`](Self::shutdown);
    /// - `InvalidChunkSize` for misaligned input — a caller bug, state untouched;
    /// - `ChunkQueueOverrun` when classification cannot keep up. The chunk is
    ///   not enqueued; nothing is ever dropped silently or reordered.
    pub fn push_chunk(&self, samples: &[f32]) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(EngineError::NotRunning);
        }
        let chunk = self.accumulator.lock().accept(samples)?;
        match self.cmd_tx.try_send(Command::Chunk(chunk)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.diagnostics.overruns.fetch_add(1, Ordering::Relaxed);
                warn!("inbound chunk queue full");
                Err(EngineError::ChunkQueueOverrun)
            }
            Err(TrySendError::Disconnected(_)) => Err(EngineError::NotRunning),
        }
    }

    /// Apply a partial reconfiguration.
    ///
    /// The merged config is validated first; on rejection the prior config is
    /// retained untouched. Changing `sample_rate` or `max_buffer_duration_secs`
    /// reallocates the main buffer and discards any in-progress segment —
    /// documented data loss, not a bug.
    pub fn update_config(&self, patch: ConfigPatch) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(EngineError::NotRunning);
        }

        let merged = {
            let mut current = self.config.lock();
            let merged = patch.apply(&current);
            merged.validate()?;
            *current = merged.clone();
            merged
        };
        self.accumulator.lock().set_chunk_size(merged.chunk_size);

        let reallocate = patch.requires_reallocation();
        info!(
            sample_rate = merged.sample_rate,
            reallocate, "reconfiguring engine"
        );
        self.cmd_tx
            .send(Command::Reconfigure {
                config: merged,
                reallocate,
            })
            .map_err(|_| EngineError::NotRunning)
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> EngineConfig {
        self.config.lock().clone()
    }

    /// Whether an utterance is currently being recorded.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    /// Subscribe to the engine's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Stop accepting pushes and wind the workers down.
    ///
    /// Chunks already queued ahead of the shutdown marker finish processing
    /// (ordered teardown — nothing is dropped mid-stream); in-flight scorer
    /// and transcribe calls complete or reject on their own. Idempotent.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("engine shutdown requested");
            let _ = self.cmd_tx.send(Command::Shutdown);
        }
    }
}

impl Drop for SegmentationEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// All state owned by the classification worker loop.
struct ClassificationWorker {
    scorer: Box<dyn SpeechScorer>,
    classifier: HysteresisClassifier,
    machine: SegmentationStateMachine,
    /// Live recurrent state, replaced wholesale after every scorer call.
    state: RecurrentState,
    sample_rate: u32,
    dispatch: DispatchQueue,
    events_tx: broadcast::Sender<EngineEvent>,
    diagnostics: Arc<EngineDiagnostics>,
    recording: Arc<AtomicBool>,
}

impl ClassificationWorker {
    fn run(mut self, cmd_rx: crossbeam_channel::Receiver<Command>) {
        for cmd in cmd_rx.iter() {
            match cmd {
                Command::Shutdown => break,
                Command::Reconfigure { config, reallocate } => {
                    self.classifier = HysteresisClassifier::new(
                        config.speech_threshold,
                        config.exit_threshold,
                    );
                    self.machine.reconfigure(&config, reallocate);
                    self.sample_rate = config.sample_rate;
                    if reallocate {
                        // The model's memory is tied to the old sample rate.
                        self.state = RecurrentState::default();
                        self.recording.store(false, Ordering::Relaxed);
                    }
                }
                Command::Chunk(chunk) => self.process_chunk(&chunk),
            }
        }

        let snap = self.diagnostics.snapshot();
        info!(
            chunks_in = snap.chunks_in,
            scorer_errors = snap.scorer_errors,
            segments_ready = snap.segments_ready,
            segments_discarded = snap.segments_discarded,
            overruns = snap.overruns,
            "classification worker stopped"
        );
    }

    fn process_chunk(&mut self, chunk: &FixedChunk) {
        self.diagnostics.chunks_in.fetch_add(1, Ordering::Relaxed);

        let probability = match self.scorer.score(chunk.samples(), self.sample_rate, &self.state) {
            Ok(outcome) => {
                self.state = outcome.next_state;
                outcome.probability
            }
            Err(e) => {
                // Never block the stream on a scorer failure: report it and
                // carry on with the chunk classified as non-speech.
                self.diagnostics.scorer_errors.fetch_add(1, Ordering::Relaxed);
                let err = EngineError::ScorerUnavailable(e.to_string());
                warn!(error = %err, "treating chunk as non-speech");
                let _ = self.events_tx.send(EngineEvent::Status {
                    kind: StatusKind::Error,
                    message: err.to_string(),
                });
                0.0
            }
        };

        let _ = self.events_tx.send(EngineEvent::Debug { probability });

        let decision = self
            .classifier
            .classify(probability, self.machine.is_recording());

        for step in self.machine.process(chunk.samples(), decision.is_speech) {
            match step {
                StepEvent::SpeechStart => {
                    let _ = self.events_tx.send(EngineEvent::SpeechStart);
                    let _ = self.events_tx.send(EngineEvent::Status {
                        kind: StatusKind::Info,
                        message: "speech detected".into(),
                    });
                }
                StepEvent::SpeechEnd => {
                    let _ = self.events_tx.send(EngineEvent::SpeechEnd);
                }
                StepEvent::SegmentReady(segment) => {
                    self.diagnostics.segments_ready.fetch_add(1, Ordering::Relaxed);
                    let _ = self.events_tx.send(EngineEvent::SpeechReady {
                        segment: segment.clone(),
                    });
                    if self.dispatch.enqueue(segment).is_err() {
                        warn!("dispatch queue gone — segment not transcribed");
                    }
                }
                StepEvent::Discarded => {
                    self.diagnostics
                        .segments_discarded
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.recording
            .store(self.machine.is_recording(), Ordering::Relaxed);
    }
}
