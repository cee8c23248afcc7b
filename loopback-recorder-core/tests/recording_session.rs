use std::fs;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;
use parking_lot::Mutex;

use loopback_recorder_core::{
    CaptureError, FormatTag, FrameSource, LoopbackCaptureEngine, NativeFormat, Packet, RecorderConfig,
    PacketStream, RecorderDelegate, Recording, RecordingSession, SessionState, SyntheticSource,
};

type Session = RecordingSession<LoopbackCaptureEngine<SyntheticSource>>;

#[derive(Default)]
struct EventLog {
    statuses: Mutex<Vec<String>>,
    recordings: Mutex<Vec<Recording>>,
    errors: Mutex<Vec<CaptureError>>,
}

impl EventLog {
    fn is_empty(&self) -> bool {
        self.statuses.lock().is_empty() && self.recordings.lock().is_empty() && self.errors.lock().is_empty()
    }
}

impl RecorderDelegate for EventLog {
    fn on_status_changed(&self, status: &str) {
        self.statuses.lock().push(status.to_string());
    }

    fn on_recording_complete(&self, recording: &Recording) {
        self.recordings.lock().push(recording.clone());
    }

    fn on_error(&self, error: &CaptureError) {
        self.errors.lock().push(error.clone());
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn stereo_48k() -> NativeFormat {
    NativeFormat::new(48000, 2, FormatTag::Float, 32)
}

fn session_with(dir: &Path, source: SyntheticSource) -> (Session, Arc<EventLog>) {
    init_logging();
    let session = RecordingSession::new(RecorderConfig::new(dir), LoopbackCaptureEngine::new(source)).unwrap();
    let events = Arc::new(EventLog::default());
    session.set_delegate(events.clone());
    (session, events)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn wav_files(dir: &Path) -> Vec<std::path::PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "wav"))
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn ten_thousand_frames_become_a_recording() {
    let dir = tempfile::tempdir().unwrap();
    let source = SyntheticSource::new(stereo_48k()).with_packets(vec![1000; 10]);
    let (session, events) = session_with(dir.path(), source);

    assert!(session.start());
    assert_eq!(session.state(), SessionState::Capturing);
    let uid = session.current_uid().unwrap();
    assert!(wait_until(Duration::from_secs(5), || session.frames_recorded() == 10_000));

    let recording = session.stop().expect("recording kept");

    assert_eq!(recording.uid, uid);
    assert_abs_diff_eq!(recording.duration_secs, 10_000.0 / 48_000.0, epsilon = 1e-9);
    assert_abs_diff_eq!(recording.duration_secs, 0.2083, epsilon = 1e-4);
    assert_eq!(recording.sample_rate, 48000.0);
    assert_eq!(recording.num_channels, 2);
    assert_eq!(recording.tags, vec!["Loopback", "Internal"]);
    assert!(recording.name.starts_with("Internal Audio "));
    assert_eq!(recording.file, dir.path().join(format!("{}.wav", uid)));

    let mut reader = hound::WavReader::open(&recording.file).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 48000);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.duration(), 10_000);
    assert_eq!(reader.samples::<i16>().count(), 20_000);

    assert_eq!(*events.recordings.lock(), vec![recording]);
    assert_eq!(
        *events.statuses.lock(),
        vec![format!("Recording started: {}", uid), "Recording stopped".to_string()]
    );
    assert!(events.errors.lock().is_empty());
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.frames_recorded(), 0);
    assert!(session.current_uid().is_none());
}

#[test]
fn short_recording_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let source = SyntheticSource::new(stereo_48k()).with_packets([100]);
    let (session, events) = session_with(dir.path(), source);

    assert!(session.start());
    assert!(wait_until(Duration::from_secs(5), || session.frames_recorded() == 100));
    assert_eq!(wav_files(dir.path()).len(), 1);

    assert!(session.stop().is_none());

    assert!(wav_files(dir.path()).is_empty());
    assert!(events.recordings.lock().is_empty());
    assert!(events.errors.lock().is_empty());
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn stop_while_idle_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (session, events) = session_with(dir.path(), SyntheticSource::new(stereo_48k()));

    assert!(session.stop().is_none());

    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.is_recording());
    assert!(events.is_empty());
    assert_eq!(session.device_info().id, "synthetic");
}

#[test]
fn second_start_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let source = SyntheticSource::new(stereo_48k()).looping([480]);
    let probe = source.clone();
    let (session, events) = session_with(dir.path(), source);

    assert!(session.start());
    let uid = session.current_uid();
    assert!(!session.start());
    assert_eq!(session.current_uid(), uid);
    assert_eq!(probe.open_count(), 1);

    assert!(wait_until(Duration::from_secs(5), || session.frames_recorded() >= 9_600));
    session.stop().expect("recording kept");

    assert_eq!(wav_files(dir.path()).len(), 1);
    assert_eq!(events.recordings.lock().len(), 1);
    assert_eq!(events.statuses.lock().len(), 2);
}

#[test]
fn engine_start_failure_stays_idle() {
    let dir = tempfile::tempdir().unwrap();
    let source = SyntheticSource::new(stereo_48k()).failing_open(CaptureError::DeviceNotAvailable);
    let probe = source.clone();
    let (session, events) = session_with(dir.path(), source);

    assert!(!session.start());

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(*events.errors.lock(), vec![CaptureError::DeviceNotAvailable]);
    assert!(events.statuses.lock().is_empty());
    assert_eq!(probe.live_streams(), 0);
    assert!(wav_files(dir.path()).is_empty());
    assert!(session.stop().is_none());
}

#[test]
fn writer_failure_is_reported_once_and_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"occupied").unwrap();
    let source = SyntheticSource::new(stereo_48k()).with_packets(vec![4800; 10]);
    let (session, events) = session_with(&blocker.join("recordings"), source);

    assert!(session.start());
    assert!(wait_until(Duration::from_secs(5), || {
        session.capture_diagnostics().frames_delivered == 48_000
    }));

    assert_eq!(session.state(), SessionState::Capturing);
    assert_eq!(session.frames_recorded(), 0);
    assert_eq!(events.errors.lock().len(), 1);
    assert!(matches!(events.errors.lock()[0], CaptureError::StorageError(_)));

    assert!(session.stop().is_none());
    assert!(events.recordings.lock().is_empty());
    assert_eq!(session.state(), SessionState::Idle);
    assert!(blocker.is_file());
    assert!(!blocker.join("recordings").exists());
}

#[test]
fn capture_without_frames_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let (session, events) = session_with(dir.path(), SyntheticSource::new(stereo_48k()));

    assert!(session.start());
    thread::sleep(Duration::from_millis(20));
    assert_eq!(session.capture_diagnostics().packets_delivered, 0);

    assert!(session.stop().is_none());

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    assert!(events.recordings.lock().is_empty());
    assert!(events.errors.lock().is_empty());
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn concurrent_stops_finalize_once() {
    let dir = tempfile::tempdir().unwrap();
    let source = SyntheticSource::new(stereo_48k()).looping([480]);
    let (session, events) = session_with(dir.path(), source);
    let session = Arc::new(session);

    assert!(session.start());
    assert!(wait_until(Duration::from_secs(5), || session.frames_recorded() >= 9_600));

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let session = Arc::clone(&session);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                session.stop()
            })
        })
        .collect();
    let results: Vec<Option<Recording>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
    assert_eq!(events.recordings.lock().len(), 1);
    assert_eq!(
        events.statuses.lock().iter().filter(|s| *s == "Recording stopped").count(),
        1
    );
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn stream_failure_keeps_capturing_until_finalized() {
    let dir = tempfile::tempdir().unwrap();
    let source = SyntheticSource::new(stereo_48k())
        .with_packets(vec![2400; 5])
        .failing_after_packets(5);
    let (session, events) = session_with(dir.path(), source);

    assert!(session.start());
    assert!(wait_until(Duration::from_secs(5), || {
        session.capture_diagnostics().packets_delivered == 5
    }));
    assert_eq!(session.state(), SessionState::Capturing);

    let mut recording = None;
    assert!(wait_until(Duration::from_secs(5), || {
        recording = session.finalize_if_capture_ended();
        recording.is_some()
    }));

    let recording = recording.unwrap();
    assert_abs_diff_eq!(recording.duration_secs, 0.25, epsilon = 1e-9);
    assert_eq!(events.recordings.lock().len(), 1);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.finalize_if_capture_ended().is_none());
}

#[test]
fn finalize_if_capture_ended_ignores_healthy_capture() {
    let dir = tempfile::tempdir().unwrap();
    let source = SyntheticSource::new(stereo_48k()).looping([480]);
    let (session, _events) = session_with(dir.path(), source);

    assert!(session.start());
    assert!(session.finalize_if_capture_ended().is_none());
    assert!(session.is_recording());
    assert!(session.elapsed_secs().is_some());

    session.stop();
}

#[test]
fn twenty_four_bit_source_is_written_at_sixteen_bits() {
    let dir = tempfile::tempdir().unwrap();
    let source = SyntheticSource::new(NativeFormat::new(44100, 1, FormatTag::Integer, 24))
        .with_packets(vec![4410; 4])
        .with_tone(441.0, 0.5);
    let (session, _events) = session_with(dir.path(), source);

    assert!(session.start());
    assert!(wait_until(Duration::from_secs(5), || session.frames_recorded() == 17_640));
    let recording = session.stop().expect("recording kept");

    assert_eq!(recording.num_channels, 1);
    assert_eq!(recording.sample_rate, 44100.0);
    let mut reader = hound::WavReader::open(&recording.file).unwrap();
    assert_eq!(reader.spec().bits_per_sample, 16);
    let peak = reader.samples::<i16>().map(|s| s.unwrap().unsigned_abs()).max().unwrap();
    assert!((16_000..=16_384).contains(&peak), "peak {}", peak);
}

#[test]
fn sixteen_bit_source_is_written_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let source = SyntheticSource::new(NativeFormat::new(48000, 2, FormatTag::Integer, 16))
        .with_packets(vec![4800; 2])
        .with_tone(997.0, 0.9);
    let reference = source.clone();
    let (session, _events) = session_with(dir.path(), source);

    assert!(session.start());
    assert!(wait_until(Duration::from_secs(5), || session.frames_recorded() == 9_600));
    let recording = session.stop().expect("recording kept");

    let mut native = Vec::new();
    let mut stream = reference.open().unwrap();
    while stream.next_packet_size().unwrap() > 0 {
        stream
            .read_packet(&mut |packet: Packet<'_>| {
                native.extend(packet.data.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])));
            })
            .unwrap();
    }

    let mut reader = hound::WavReader::open(&recording.file).unwrap();
    let written: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(native.len(), 19_200);
    assert_eq!(written, native);
}

#[test]
fn session_can_record_again_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    let source = SyntheticSource::new(stereo_48k()).looping([960]);
    let (session, events) = session_with(dir.path(), source);

    assert!(session.start());
    let first = session.current_uid().unwrap();
    assert!(wait_until(Duration::from_secs(5), || session.frames_recorded() >= 9_600));
    session.stop().expect("first recording kept");

    assert!(session.start());
    let second = session.current_uid().unwrap();
    assert_ne!(first, second);
    assert!(wait_until(Duration::from_secs(5), || session.frames_recorded() >= 9_600));
    session.stop().expect("second recording kept");

    assert_eq!(events.recordings.lock().len(), 2);
    assert_eq!(wav_files(dir.path()).len(), 2);
}

#[test]
fn dropping_an_active_session_finalizes_it() {
    let dir = tempfile::tempdir().unwrap();
    let source = SyntheticSource::new(stereo_48k()).with_packets(vec![4800; 2]);
    let (session, events) = session_with(dir.path(), source);

    assert!(session.start());
    assert!(wait_until(Duration::from_secs(5), || session.frames_recorded() == 9_600));
    drop(session);

    let recordings = events.recordings.lock();
    assert_eq!(recordings.len(), 1);
    assert!(recordings[0].file.is_file());
}
