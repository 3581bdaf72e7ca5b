use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use skycast_core::config::RecordingConfig;
use skycast_core::error::SkycastError;
use skycast_core::types::AudioBlob;

use crate::wav::{encode_wav, WAV_MIME};
use crate::{AudioBuffer, CaptureStream, Microphone, RecordingState};

/// Render a duration as `MM:SS`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

struct Inner {
    state: RecordingState,
    stream: Option<Box<dyn CaptureStream>>,
    started_at: Option<Instant>,
    /// Length of the recording once it stopped.
    recorded: Option<Duration>,
}

impl Inner {
    fn transition(&mut self, target: RecordingState) -> Result<(), SkycastError> {
        if !self.state.can_transition_to(&target) {
            return Err(SkycastError::Audio(format!(
                "Invalid recording transition: {} -> {}",
                self.state, target
            )));
        }
        debug!("Recording state: {} -> {}", self.state, target);
        self.state = target;
        Ok(())
    }

    fn reset(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
        self.state = RecordingState::Idle;
        self.started_at = None;
        self.recorded = None;
    }
}

/// Puts the controller back to `Idle` and releases the stream when dropped.
struct ResetOnDrop<'a> {
    inner: &'a Mutex<Inner>,
    armed: bool,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.state != RecordingState::Idle {
                debug!("Recording state: {} -> Idle", inner.state);
            }
            inner.reset();
        }
    }
}

/// Drives one microphone recording at a time.
pub struct RecordingController {
    microphone: Arc<dyn Microphone>,
    buffer: AudioBuffer,
    inner: Mutex<Inner>,
}

impl RecordingController {
    pub fn new(microphone: Arc<dyn Microphone>, config: &RecordingConfig) -> Self {
        let buffer = AudioBuffer::for_duration(microphone.sample_rate(), config.max_duration_secs);
        Self {
            microphone,
            buffer,
            inner: Mutex::new(Inner {
                state: RecordingState::Idle,
                stream: None,
                started_at: None,
                recorded: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RecordingState {
        self.lock().state
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Recording
    }

    /// Time since recording started, frozen once it stops.
    pub fn elapsed(&self) -> Duration {
        let inner = self.lock();
        match (inner.recorded, inner.started_at) {
            (Some(recorded), _) => recorded,
            (None, Some(started)) => started.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }

    /// [`Self::elapsed`] as `MM:SS`.
    pub fn format_elapsed(&self) -> String {
        format_elapsed(self.elapsed())
    }

    /// Open the microphone and start buffering.
    ///
    /// On failure the controller stays `Idle`.
    pub async fn start(&self) -> Result<(), SkycastError> {
        self.lock().transition(RecordingState::Recording)?;
        let mut guard = ResetOnDrop {
            inner: &self.inner,
            armed: true,
        };

        self.buffer.clear();
        let stream = match self.microphone.open(self.buffer.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Microphone unavailable");
                return Err(e);
            }
        };

        let mut inner = self.lock();
        inner.stream = Some(stream);
        inner.started_at = Some(Instant::now());
        guard.armed = false;
        info!("Recording started");
        Ok(())
    }

    /// Stop recording and hand the finished WAV blob to `handler`.
    ///
    /// The microphone is released before the handler runs and the controller
    /// returns to `Idle` on every path. A handler error is logged and
    /// returned unchanged.
    pub async fn stop<F, Fut, T, E>(&self, handler: F) -> Result<T, E>
    where
        F: FnOnce(AudioBlob) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SkycastError> + Display,
    {
        let stream = {
            let mut inner = self.lock();
            if inner.state == RecordingState::Recording && inner.stream.is_none() {
                return Err(SkycastError::Audio("microphone is still opening".into()).into());
            }
            inner.transition(RecordingState::Processing)?;
            inner.recorded = inner.started_at.map(|t| t.elapsed());
            inner.stream.take()
        };
        let _reset = ResetOnDrop {
            inner: &self.inner,
            armed: true,
        };
        if let Some(mut stream) = stream {
            stream.release();
        }

        let samples = self.buffer.take();
        let blob = AudioBlob::new(
            encode_wav(&samples, self.microphone.sample_rate(), 1),
            WAV_MIME,
        );
        info!(
            samples = samples.len(),
            bytes = blob.len(),
            elapsed = %self.format_elapsed(),
            "Recording stopped"
        );

        match handler(blob).await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(error = %e, "Recording handler failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for RecordingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingController")
            .field("state", &self.state())
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // -------------------------------------------------------------------------
    // Fake microphone
    // -------------------------------------------------------------------------

    struct FakeStream {
        released: Arc<AtomicUsize>,
        done: bool,
    }

    impl CaptureStream for FakeStream {
        fn release(&mut self) {
            if !self.done {
                self.done = true;
                self.released.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[derive(Default)]
    struct FakeMicrophone {
        samples: Vec<f32>,
        deny: bool,
        released: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Microphone for FakeMicrophone {
        async fn open(
            &self,
            buffer: AudioBuffer,
        ) -> Result<Box<dyn CaptureStream>, SkycastError> {
            if self.deny {
                return Err(SkycastError::Permission("denied".into()));
            }
            buffer.push(&self.samples);
            Ok(Box::new(FakeStream {
                released: Arc::clone(&self.released),
                done: false,
            }))
        }

        fn sample_rate(&self) -> u32 {
            16000
        }
    }

    fn controller(mic: FakeMicrophone) -> (RecordingController, Arc<AtomicUsize>) {
        let released = Arc::clone(&mic.released);
        (
            RecordingController::new(Arc::new(mic), &RecordingConfig::default()),
            released,
        )
    }

    fn with_samples(n: usize) -> FakeMicrophone {
        FakeMicrophone {
            samples: vec![0.25; n],
            ..FakeMicrophone::default()
        }
    }

    // -------------------------------------------------------------------------
    // start
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_start_enters_recording() {
        let (rec, _) = controller(with_samples(10));
        assert_eq!(rec.state(), RecordingState::Idle);
        rec.start().await.unwrap();
        assert_eq!(rec.state(), RecordingState::Recording);
        assert!(rec.is_recording());
    }

    #[tokio::test]
    async fn test_denied_permission_stays_idle() {
        let (rec, released) = controller(FakeMicrophone {
            deny: true,
            ..FakeMicrophone::default()
        });
        let err = rec.start().await.unwrap_err();
        assert!(matches!(err, SkycastError::Permission(_)));
        assert_eq!(rec.state(), RecordingState::Idle);
        assert_eq!(released.load(Ordering::SeqCst), 0);
        assert_eq!(rec.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (rec, _) = controller(with_samples(10));
        rec.start().await.unwrap();
        let err = rec.start().await.unwrap_err();
        assert!(matches!(err, SkycastError::Audio(_)));
        assert_eq!(rec.state(), RecordingState::Recording);
    }

    // -------------------------------------------------------------------------
    // stop
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_stop_hands_wav_blob_to_handler() {
        let (rec, released) = controller(with_samples(160));
        rec.start().await.unwrap();

        let blob = rec
            .stop(|blob| async move { Ok::<_, SkycastError>(blob) })
            .await
            .unwrap();

        assert_eq!(blob.mime, "audio/wav");
        assert_eq!(blob.len(), 44 + 160 * 2);
        assert_eq!(&blob.bytes[0..4], b"RIFF");
        assert_eq!(rec.state(), RecordingState::Idle);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_runs_while_processing() {
        let (rec, released) = controller(with_samples(1));
        let rec = Arc::new(rec);
        rec.start().await.unwrap();

        let observer = Arc::clone(&rec);
        let seen = rec
            .stop(move |_| async move {
                Ok::<_, SkycastError>((observer.state(), released.load(Ordering::SeqCst)))
            })
            .await
            .unwrap();
        assert_eq!(seen, (RecordingState::Processing, 1));
        assert_eq!(rec.state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn test_handler_failure_still_returns_to_idle() {
        let (rec, released) = controller(with_samples(10));
        rec.start().await.unwrap();

        let result: Result<(), SkycastError> = rec
            .stop(|_| async { Err(SkycastError::Provider("transcription failed".into())) })
            .await;

        assert!(matches!(result, Err(SkycastError::Provider(_))));
        assert_eq!(rec.state(), RecordingState::Idle);
        assert_eq!(released.load(Ordering::SeqCst), 1);

        // A new recording can start right away.
        rec.start().await.unwrap();
        assert!(rec.is_recording());
    }

    #[tokio::test]
    async fn test_stop_while_idle_is_rejected() {
        let (rec, _) = controller(with_samples(10));
        let result: Result<(), SkycastError> = rec.stop(|_| async { Ok(()) }).await;
        assert!(matches!(result, Err(SkycastError::Audio(_))));
        assert_eq!(rec.state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn test_recordings_do_not_share_samples() {
        let (rec, _) = controller(with_samples(8));
        for _ in 0..2 {
            rec.start().await.unwrap();
            let len = rec
                .stop(|blob| async move { Ok::<_, SkycastError>(blob.len()) })
                .await
                .unwrap();
            assert_eq!(len, 44 + 16);
        }
    }

    // -------------------------------------------------------------------------
    // elapsed
    // -------------------------------------------------------------------------

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00");
        assert_eq!(format_elapsed(Duration::from_millis(9_900)), "00:09");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "02:05");
    }

    #[tokio::test]
    async fn test_elapsed_resets_after_stop() {
        let (rec, _) = controller(with_samples(1));
        rec.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rec.elapsed() >= Duration::from_millis(20));

        rec.stop(|_| async { Ok::<_, SkycastError>(()) }).await.unwrap();
        assert_eq!(rec.elapsed(), Duration::ZERO);
        assert_eq!(rec.format_elapsed(), "00:00");
    }
}
