//! In-memory chunk buffer and one-shot artifact assembly.

use std::time::Duration;

use super::CaptureError;

/// The finalized, immutable result of one capture session.
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    /// Chunks concatenated in append order.
    pub bytes: Vec<u8>,
    /// Container identity, fixed at session start (e.g. "video/x-matroska").
    pub content_type: String,
    /// Active capture time, paused spans excluded.
    pub duration_hint: Duration,
}

impl RecordingArtifact {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// File extension matching the container tag.
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "video/x-matroska" => "mkv",
            "video/webm" => "webm",
            "audio/wav" => "wav",
            _ => "bin",
        }
    }
}

/// Buffers timed chunks during capture. Appends are strictly ordered (the
/// pump runs on one task); `finalize` consumes the sequence exactly once.
pub struct ChunkAccumulator {
    chunks: Option<Vec<Vec<u8>>>,
    total_bytes: u64,
    content_type: String,
}

impl ChunkAccumulator {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            chunks: Some(Vec::new()),
            total_bytes: 0,
            content_type: content_type.into(),
        }
    }

    /// Append one chunk. Zero-length chunks and appends after finalize are
    /// silently dropped; returns whether the chunk was kept.
    pub fn append(&mut self, chunk: Vec<u8>) -> bool {
        if chunk.is_empty() {
            return false;
        }
        match self.chunks.as_mut() {
            Some(chunks) => {
                self.total_bytes += chunk.len() as u64;
                chunks.push(chunk);
                true
            }
            None => false,
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.as_ref().map(|c| c.len()).unwrap_or(0)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Concatenate everything appended so far into the final artifact.
    ///
    /// Fails with `EmptyCapture` when no non-empty chunk was ever
    /// appended; a zero-byte artifact is never produced.
    pub fn finalize(&mut self, duration_hint: Duration) -> Result<RecordingArtifact, CaptureError> {
        let chunks = self.chunks.take().ok_or(CaptureError::EmptyCapture)?;

        if chunks.is_empty() {
            return Err(CaptureError::EmptyCapture);
        }

        let mut bytes = Vec::with_capacity(self.total_bytes as usize);
        for chunk in chunks {
            bytes.extend_from_slice(&chunk);
        }

        Ok(RecordingArtifact {
            bytes,
            content_type: self.content_type.clone(),
            duration_hint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concatenation_preserves_order_and_length() {
        let mut acc = ChunkAccumulator::new("video/x-matroska");
        assert!(acc.append(vec![1; 1000]));
        assert!(acc.append(vec![2; 1000]));
        assert!(acc.append(vec![3; 500]));

        let artifact = acc.finalize(Duration::from_secs(3)).unwrap();
        assert_eq!(artifact.size_bytes(), 2500);
        assert_eq!(artifact.bytes[0], 1);
        assert_eq!(artifact.bytes[999], 1);
        assert_eq!(artifact.bytes[1000], 2);
        assert_eq!(artifact.bytes[2000], 3);
        assert_eq!(artifact.content_type, "video/x-matroska");
    }

    #[test]
    fn test_empty_chunks_are_dropped() {
        let mut acc = ChunkAccumulator::new("video/x-matroska");
        assert!(!acc.append(Vec::new()));
        assert!(acc.append(vec![7; 10]));
        assert!(!acc.append(Vec::new()));

        assert_eq!(acc.chunk_count(), 1);
        let artifact = acc.finalize(Duration::from_secs(1)).unwrap();
        assert_eq!(artifact.size_bytes(), 10);
    }

    #[test]
    fn test_finalize_with_no_chunks_fails() {
        let mut acc = ChunkAccumulator::new("video/x-matroska");
        let result = acc.finalize(Duration::ZERO);
        assert!(matches!(result, Err(CaptureError::EmptyCapture)));
    }

    #[test]
    fn test_finalize_with_only_empty_chunks_fails() {
        let mut acc = ChunkAccumulator::new("video/x-matroska");
        acc.append(Vec::new());
        acc.append(Vec::new());
        let result = acc.finalize(Duration::ZERO);
        assert!(matches!(result, Err(CaptureError::EmptyCapture)));
    }

    #[test]
    fn test_finalize_is_one_shot() {
        let mut acc = ChunkAccumulator::new("video/x-matroska");
        acc.append(vec![1, 2, 3]);
        acc.finalize(Duration::ZERO).unwrap();

        // The sequence was consumed: later appends are dropped and a
        // second finalize cannot fabricate an artifact.
        assert!(!acc.append(vec![4, 5]));
        assert!(matches!(
            acc.finalize(Duration::ZERO),
            Err(CaptureError::EmptyCapture)
        ));
    }

    #[test]
    fn test_extension_follows_container() {
        let mut acc = ChunkAccumulator::new("video/webm");
        acc.append(vec![0; 4]);
        let artifact = acc.finalize(Duration::ZERO).unwrap();
        assert_eq!(artifact.extension(), "webm");
    }
}
