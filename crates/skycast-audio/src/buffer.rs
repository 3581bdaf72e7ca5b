use std::sync::{Arc, Mutex, PoisonError};

/// Thread-safe buffer of mono f32 samples.
///
/// Filled from the capture callback thread and drained once when the
/// recording stops. Samples past `max_samples` are discarded, which caps a
/// recording at its configured maximum duration.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Arc<Mutex<Vec<f32>>>,
    max_samples: usize,
}

impl AudioBuffer {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(Vec::new())),
            max_samples,
        }
    }

    /// Buffer sized for `secs` seconds of audio at `sample_rate`.
    pub fn for_duration(sample_rate: u32, secs: u32) -> Self {
        Self::new(sample_rate as usize * secs as usize)
    }

    /// Append samples, dropping whatever does not fit.
    pub fn push(&self, data: &[f32]) {
        let mut buf = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let room = self.max_samples.saturating_sub(buf.len());
        buf.extend_from_slice(&data[..data.len().min(room)]);
    }

    /// Take all buffered samples, leaving the buffer empty.
    pub fn take(&self) -> Vec<f32> {
        let mut buf = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *buf)
    }

    pub fn clear(&self) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the maximum duration has been reached.
    pub fn is_full(&self) -> bool {
        self.len() >= self.max_samples
    }
}
