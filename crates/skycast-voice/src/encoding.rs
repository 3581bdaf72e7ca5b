//! Ordered container labels tried when uploading a recording.

/// One way of labelling an upload: file name and MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingCandidate {
    pub file_name: String,
    pub mime: String,
}

impl EncodingCandidate {
    pub fn new(file_name: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: mime.into(),
        }
    }

    pub fn webm() -> Self {
        Self::new("recording.webm", "audio/webm")
    }

    pub fn wav() -> Self {
        Self::new("recording.wav", "audio/wav")
    }

    /// Label matching a MIME type, defaulting the extension to `bin`.
    pub fn for_mime(mime: &str) -> Self {
        let base = mime.split(';').next().unwrap_or(mime).trim();
        let ext = match base {
            "audio/webm" => "webm",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/mpeg" => "mp3",
            "audio/ogg" => "ogg",
            "audio/mp4" => "m4a",
            _ => "bin",
        };
        Self::new(format!("recording.{}", ext), base)
    }
}

/// Ordered list of upload labels.
///
/// The next candidate is tried only after the provider rejected the
/// previous one with a format-related client error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingStrategy {
    candidates: Vec<EncodingCandidate>,
}

impl EncodingStrategy {
    pub fn new(candidates: Vec<EncodingCandidate>) -> Self {
        Self { candidates }
    }

    /// Two attempts: the blob's own label, then the other common container.
    pub fn for_mime(mime: &str) -> Self {
        let primary = EncodingCandidate::for_mime(mime);
        let fallback = if primary.mime == EncodingCandidate::wav().mime {
            EncodingCandidate::webm()
        } else {
            EncodingCandidate::wav()
        };
        Self::new(vec![primary, fallback])
    }

    pub fn candidates(&self) -> &[EncodingCandidate] {
        &self.candidates
    }

    /// Whether `status` means the provider could not read the container.
    pub fn is_format_rejection(status: u16) -> bool {
        matches!(status, 400 | 415 | 422)
    }
}
