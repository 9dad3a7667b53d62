use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;

use speechseg::{
    ConfigPatch, EngineConfig, EngineError, EngineEvent, RecurrentState, ScoreOutcome,
    SegmentationEngine, SpeechScorer, SpeechSegment, StatusKind, StubTranscriber, Transcriber,
    RECURRENT_STATE_LEN,
};

const CHUNK: usize = 512;

/// Opt-in pipeline logs: `RUST_LOG=speechseg=debug cargo test`.
fn init_tracing() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
            )
            .try_init();
    });
}

/// Scripted scorer: one probability (or failure) per chunk, in order.
///
/// Also verifies recurrent-state threading: call `n` encodes `n + 1` into
/// `next_state` and expects to receive the previous call's encoding back.
/// Mismatches are flagged through an atomic because a panic inside the
/// blocking worker would be swallowed.
struct ScriptedScorer {
    script: Vec<Option<f32>>,
    calls: usize,
    state_ok: Arc<AtomicBool>,
    seen_sample_rate: Arc<AtomicU32>,
}

impl ScriptedScorer {
    fn new(script: Vec<Option<f32>>) -> (Self, Arc<AtomicBool>, Arc<AtomicU32>) {
        let state_ok = Arc::new(AtomicBool::new(true));
        let seen_sample_rate = Arc::new(AtomicU32::new(0));
        (
            Self {
                script,
                calls: 0,
                state_ok: Arc::clone(&state_ok),
                seen_sample_rate: Arc::clone(&seen_sample_rate),
            },
            state_ok,
            seen_sample_rate,
        )
    }
}

impl SpeechScorer for ScriptedScorer {
    fn score(
        &mut self,
        _chunk: &[f32],
        sample_rate: u32,
        state: &RecurrentState,
    ) -> speechseg::error::Result<ScoreOutcome> {
        self.seen_sample_rate.store(sample_rate, Ordering::SeqCst);

        let expected = vec![self.calls as f32; RECURRENT_STATE_LEN];
        if state.as_slice() != expected.as_slice() {
            self.state_ok.store(false, Ordering::SeqCst);
        }

        let step = self.script.get(self.calls).copied().flatten();
        self.calls += 1;

        match step {
            Some(p) => Ok(ScoreOutcome {
                probability: p,
                next_state: RecurrentState::from_vec(vec![self.calls as f32; RECURRENT_STATE_LEN]),
            }),
            None => Err(EngineError::ScorerUnavailable("scripted failure".into())),
        }
    }
}

/// Scorer that blocks on a gate before its first score, then records the
/// first sample of every chunk it sees. Lets a test stall classification
/// long enough to fill the bounded inbound queue.
struct GatedScorer {
    gate: std::sync::mpsc::Receiver<()>,
    released: bool,
    seen: Arc<Mutex<Vec<f32>>>,
}

impl SpeechScorer for GatedScorer {
    fn score(
        &mut self,
        chunk: &[f32],
        _sample_rate: u32,
        _state: &RecurrentState,
    ) -> speechseg::error::Result<ScoreOutcome> {
        if !self.released {
            let _ = self.gate.recv();
            self.released = true;
        }
        self.seen.lock().unwrap().push(chunk[0]);
        Ok(ScoreOutcome {
            probability: 0.0,
            next_state: RecurrentState::default(),
        })
    }
}

/// Transcriber that tracks how many calls run at once.
struct SerialCheckTranscriber {
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl SerialCheckTranscriber {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        (
            Self {
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: Arc::clone(&max_in_flight),
            },
            max_in_flight,
        )
    }
}

impl Transcriber for SerialCheckTranscriber {
    fn transcribe(&mut self, segment: &SpeechSegment) -> speechseg::error::Result<String> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("text for {}", segment.id))
    }
}

/// Utterance script: `speech` chunks above threshold, then `silence` below.
fn utterance(speech: usize, silence: usize) -> Vec<Option<f32>> {
    let mut script = vec![Some(0.9); speech];
    script.extend(vec![Some(0.05); silence]);
    script
}

async fn collect_events<F>(
    rx: &mut tokio::sync::broadcast::Receiver<EngineEvent>,
    mut done: F,
) -> Vec<EngineEvent>
where
    F: FnMut(&[EngineEvent]) -> bool,
{
    let mut events = Vec::new();
    loop {
        let event = match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(RecvError::Lagged(_))) => continue,
            Ok(Err(RecvError::Closed)) => panic!("event channel closed"),
            Err(_) => panic!("timed out waiting for events; got {events:#?}"),
        };
        events.push(event);
        if done(&events) {
            return events;
        }
    }
}

fn transcript_count(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::Transcript { .. }))
        .count()
}

fn position<F: Fn(&EngineEvent) -> bool>(events: &[EngineEvent], pred: F) -> usize {
    events.iter().position(|e| pred(e)).expect("event missing")
}

#[tokio::test]
async fn speech_then_silence_produces_segment_and_transcript() {
    init_tracing();
    let (scorer, state_ok, _) = ScriptedScorer::new(utterance(20, 15));
    let engine = SegmentationEngine::new(
        EngineConfig::default(),
        Box::new(scorer),
        Box::new(StubTranscriber),
    )
    .expect("engine must start");

    let mut rx = engine.subscribe();
    for _ in 0..35 {
        engine.push_chunk(&vec![0.5; CHUNK]).expect("push");
    }

    let events = collect_events(&mut rx, |evs| transcript_count(evs) == 1).await;

    let start = position(&events, |e| matches!(e, EngineEvent::SpeechStart));
    let ready = position(&events, |e| matches!(e, EngineEvent::SpeechReady { .. }));
    let end = position(&events, |e| matches!(e, EngineEvent::SpeechEnd));
    assert!(start < ready && ready < end, "event order: {events:#?}");

    // Speech onset is also announced as a status message.
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::Status { kind: StatusKind::Info, message } if message == "speech detected"
    )));

    let (segment_id, duration_ms) = match &events[ready] {
        EngineEvent::SpeechReady { segment } => (segment.id.clone(), segment.duration_ms),
        _ => unreachable!(),
    };
    // 20 speech chunks at 16 kHz: 640 ms, trailing silence excluded.
    assert!((duration_ms - 640.0).abs() < 40.0, "duration {duration_ms}");

    match events.iter().find(|e| matches!(e, EngineEvent::Transcript { .. })) {
        Some(EngineEvent::Transcript { segment_id: tid, text }) => {
            assert_eq!(*tid, segment_id);
            assert!(text.starts_with("[stub:"), "text: {text}");
        }
        _ => unreachable!(),
    }

    // One Debug probability per chunk.
    let debug_count = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::Debug { .. }))
        .count();
    assert!(debug_count >= 21, "got {debug_count} debug events");

    assert!(state_ok.load(Ordering::SeqCst), "recurrent state broken");

    let snap = engine.diagnostics_snapshot();
    assert_eq!(snap.segments_ready, 1);
    assert_eq!(snap.transcripts, 1);
    assert!(!engine.is_recording());
}

#[tokio::test]
async fn too_short_utterance_is_dropped_without_transcript() {
    init_tracing();
    // 5 chunks = 160 ms of speech, below the 250 ms minimum.
    let (scorer, _, _) = ScriptedScorer::new(utterance(5, 20));
    let engine = SegmentationEngine::new(
        EngineConfig::default(),
        Box::new(scorer),
        Box::new(StubTranscriber),
    )
    .expect("engine must start");

    let mut rx = engine.subscribe();
    for _ in 0..25 {
        engine.push_chunk(&vec![0.5; CHUNK]).expect("push");
    }

    // Wait for every chunk's Debug event so the whole script has been seen.
    let events = collect_events(&mut rx, |evs| {
        evs.iter()
            .filter(|e| matches!(e, EngineEvent::Debug { .. }))
            .count()
            == 25
    })
    .await;

    assert!(events.iter().any(|e| matches!(e, EngineEvent::SpeechStart)));
    assert!(!events.iter().any(|e| matches!(e, EngineEvent::SpeechReady { .. })));
    assert!(!events.iter().any(|e| matches!(e, EngineEvent::SpeechEnd)));
    assert!(!events.iter().any(|e| matches!(e, EngineEvent::Transcript { .. })));

    let snap = engine.diagnostics_snapshot();
    assert_eq!(snap.segments_discarded, 1);
    assert_eq!(snap.segments_ready, 0);
}

#[tokio::test]
async fn scorer_failure_is_reported_and_stream_recovers() {
    init_tracing();
    // Three failing chunks, then a normal utterance.
    let mut script = vec![None, None, None];
    script.extend(utterance(20, 15));
    let (scorer, _, _) = ScriptedScorer::new(script);
    let engine = SegmentationEngine::new(
        EngineConfig::default(),
        Box::new(scorer),
        Box::new(StubTranscriber),
    )
    .expect("engine must start");

    let mut rx = engine.subscribe();
    for _ in 0..38 {
        engine.push_chunk(&vec![0.5; CHUNK]).expect("push never fails on scorer errors");
    }

    let events = collect_events(&mut rx, |evs| transcript_count(evs) == 1).await;

    let error_statuses = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::Status { kind: StatusKind::Error, .. }))
        .count();
    assert_eq!(error_statuses, 3);

    let snap = engine.diagnostics_snapshot();
    assert_eq!(snap.scorer_errors, 3);
    assert_eq!(snap.segments_ready, 1);
    assert_eq!(snap.transcripts, 1);
}

#[tokio::test]
async fn transcription_runs_serially_in_segment_order() {
    init_tracing();
    let mut script = utterance(20, 15);
    script.extend(utterance(20, 15));
    script.extend(utterance(20, 15));
    let (scorer, _, _) = ScriptedScorer::new(script);
    let (transcriber, max_in_flight) = SerialCheckTranscriber::new();
    let engine =
        SegmentationEngine::new(EngineConfig::default(), Box::new(scorer), Box::new(transcriber))
            .expect("engine must start");

    let mut rx = engine.subscribe();
    for _ in 0..105 {
        engine.push_chunk(&vec![0.5; CHUNK]).expect("push");
    }

    let events = collect_events(&mut rx, |evs| transcript_count(evs) == 3).await;

    let ids: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Transcript { segment_id, .. } => Some(segment_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(ids, ["seg-0", "seg-1", "seg-2"]);
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn misaligned_push_is_rejected_and_state_survives() {
    init_tracing();
    let (scorer, _, _) = ScriptedScorer::new(utterance(20, 15));
    let engine = SegmentationEngine::new(
        EngineConfig::default(),
        Box::new(scorer),
        Box::new(StubTranscriber),
    )
    .expect("engine must start");

    let err = engine.push_chunk(&vec![0.5; 100]).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidChunkSize { expected: 512, actual: 100 }
    ));

    // The stream is unaffected: a full utterance still goes through.
    let mut rx = engine.subscribe();
    for _ in 0..35 {
        engine.push_chunk(&vec![0.5; CHUNK]).expect("push");
    }
    let events = collect_events(&mut rx, |evs| transcript_count(evs) == 1).await;
    assert!(events.iter().any(|e| matches!(e, EngineEvent::SpeechReady { .. })));
}

#[tokio::test]
async fn shutdown_rejects_further_pushes_and_is_idempotent() {
    init_tracing();
    let (scorer, _, _) = ScriptedScorer::new(vec![Some(0.0); 4]);
    let engine = SegmentationEngine::new(
        EngineConfig::default(),
        Box::new(scorer),
        Box::new(StubTranscriber),
    )
    .expect("engine must start");

    engine.push_chunk(&vec![0.0; CHUNK]).expect("push");
    engine.shutdown();
    engine.shutdown();

    assert!(matches!(
        engine.push_chunk(&vec![0.0; CHUNK]),
        Err(EngineError::NotRunning)
    ));
    assert!(matches!(
        engine.update_config(ConfigPatch::default()),
        Err(EngineError::NotRunning)
    ));
}

#[tokio::test]
async fn full_queue_rejects_push_with_overrun_and_loses_nothing() {
    init_tracing();
    let (gate_tx, gate_rx) = std::sync::mpsc::channel();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let engine = SegmentationEngine::new(
        EngineConfig::default(),
        Box::new(GatedScorer {
            gate: gate_rx,
            released: false,
            seen: Arc::clone(&seen),
        }),
        Box::new(StubTranscriber),
    )
    .expect("engine must start");

    // With the scorer gated, pushes pile up in the bounded queue until the
    // engine pushes back. The chunk that overruns stays with the caller.
    let mut accepted = 0usize;
    let overrun = loop {
        let mut chunk = vec![0.0; CHUNK];
        chunk[0] = accepted as f32;
        match engine.push_chunk(&chunk) {
            Ok(()) => accepted += 1,
            Err(e) => break e,
        }
        assert!(accepted <= 600, "queue never filled");
    };
    assert!(matches!(overrun, EngineError::ChunkQueueOverrun));
    assert_eq!(engine.diagnostics_snapshot().overruns, 1);

    // Open the gate: every accepted chunk is scored, none twice, in order.
    gate_tx.send(()).expect("classification worker gone");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while seen.lock().unwrap().len() < accepted {
        assert!(
            tokio::time::Instant::now() < deadline,
            "scored {} of {accepted} chunks",
            seen.lock().unwrap().len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), accepted);
    for (i, &first_sample) in seen.iter().enumerate() {
        assert_eq!(first_sample, i as f32, "chunk {i} out of order");
    }
}

#[tokio::test]
async fn shutdown_after_push_still_delivers_queued_segment() {
    init_tracing();
    let (scorer, _, _) = ScriptedScorer::new(utterance(20, 15));
    let engine = SegmentationEngine::new(
        EngineConfig::default(),
        Box::new(scorer),
        Box::new(StubTranscriber),
    )
    .expect("engine must start");

    let mut rx = engine.subscribe();
    for _ in 0..35 {
        engine.push_chunk(&vec![0.5; CHUNK]).expect("push");
    }
    // The shutdown marker queues behind the chunks: everything accepted so
    // far still flows through to a transcript.
    engine.shutdown();
    assert!(matches!(
        engine.push_chunk(&vec![0.5; CHUNK]),
        Err(EngineError::NotRunning)
    ));

    let events = collect_events(&mut rx, |evs| transcript_count(evs) == 1).await;
    assert!(events.iter().any(|e| matches!(e, EngineEvent::SpeechReady { .. })));
    assert!(events.iter().any(|e| matches!(e, EngineEvent::SpeechEnd)));
}

#[tokio::test]
async fn invalid_patch_is_rejected_and_prior_config_kept() {
    init_tracing();
    let (scorer, _, _) = ScriptedScorer::new(vec![]);
    let engine = SegmentationEngine::new(
        EngineConfig::default(),
        Box::new(scorer),
        Box::new(StubTranscriber),
    )
    .expect("engine must start");

    let patch = ConfigPatch {
        exit_threshold: Some(0.9), // above speech_threshold
        ..ConfigPatch::default()
    };
    assert!(matches!(
        engine.update_config(patch),
        Err(EngineError::ConfigurationInvalid(_))
    ));
    assert_eq!(engine.config().exit_threshold, 0.1);
}

#[tokio::test]
async fn sample_rate_patch_reaches_the_scorer_in_order() {
    init_tracing();
    let (scorer, _, seen_sample_rate) = ScriptedScorer::new(vec![Some(0.0); 8]);
    let engine = SegmentationEngine::new(
        EngineConfig::default(),
        Box::new(scorer),
        Box::new(StubTranscriber),
    )
    .expect("engine must start");

    let mut rx = engine.subscribe();
    engine.push_chunk(&vec![0.0; CHUNK]).expect("push");

    engine
        .update_config(ConfigPatch {
            sample_rate: Some(8_000),
            chunk_size: Some(256),
            ..ConfigPatch::default()
        })
        .expect("patch");
    assert_eq!(engine.config().sample_rate, 8_000);

    // Old chunk size is rejected immediately after the patch.
    assert!(matches!(
        engine.push_chunk(&vec![0.0; CHUNK]),
        Err(EngineError::InvalidChunkSize { expected: 256, .. })
    ));
    engine.push_chunk(&vec![0.0; 256]).expect("push at new size");

    collect_events(&mut rx, |evs| {
        evs.iter()
            .filter(|e| matches!(e, EngineEvent::Debug { .. }))
            .count()
            == 2
    })
    .await;
    assert_eq!(seen_sample_rate.load(Ordering::SeqCst), 8_000);
}
