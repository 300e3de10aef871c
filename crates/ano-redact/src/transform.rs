//! Chunked redaction of byte streams
//!
//! Classification is settled on the first non-empty chunk and never
//! changes afterwards. Binary streams pass through untouched; text chunks
//! are decoded, redacted and re-encoded. Chunks that need no change are
//! emitted as the original bytes.
//!
//! Matches spanning a chunk boundary are not redacted. Only incomplete
//! UTF-8 sequences are carried over to the next chunk.

use crate::classifier::{Classification, TextClassifier};
use crate::redactor::ContentAnonymizer;
use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::task::{Context, Poll, ready};

const UNKNOWN: u8 = 0;
const TEXT: u8 = 1;
const BINARY: u8 = 2;

/// Observable state of a transform, shared with the consumer
#[derive(Debug, Default)]
pub struct TransformState {
    classification: AtomicU8,
    settled: AtomicBool,
    modified: AtomicBool,
}

impl TransformState {
    pub fn classification(&self) -> Classification {
        match self.classification.load(Ordering::Acquire) {
            TEXT => Classification::Text,
            BINARY => Classification::Binary,
            _ => Classification::Unknown,
        }
    }

    /// `None` until known
    pub fn is_text(&self) -> Option<bool> {
        let c = self.classification();
        c.is_known().then(|| c.is_text())
    }

    /// Whether any emitted chunk differs from its input
    pub fn was_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    /// Whether the first chunk has been seen
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    fn set_classification(&self, classification: Classification) {
        let value = match classification {
            Classification::Unknown => UNKNOWN,
            Classification::Text => TEXT,
            Classification::Binary => BINARY,
        };
        self.classification.store(value, Ordering::Release);
    }
}

/// Synchronous per-chunk transform
pub struct ChunkTransformer {
    path: String,
    classifier: Arc<TextClassifier>,
    anonymizer: Arc<ContentAnonymizer>,
    state: Arc<TransformState>,
    carry: BytesMut,
}

impl ChunkTransformer {
    /// Start a transform; the initial classification comes from the name.
    pub fn new(
        path: impl Into<String>,
        classifier: Arc<TextClassifier>,
        anonymizer: Arc<ContentAnonymizer>,
    ) -> Self {
        let path = path.into();
        let state = Arc::new(TransformState::default());
        state.set_classification(classifier.classify_name(&path));
        Self {
            path,
            classifier,
            anonymizer,
            state,
            carry: BytesMut::new(),
        }
    }

    pub fn state(&self) -> Arc<TransformState> {
        Arc::clone(&self.state)
    }

    /// Transform one chunk. May return an empty buffer while bytes of an
    /// incomplete character are held back.
    pub fn push(&mut self, chunk: Bytes) -> Bytes {
        if chunk.is_empty() {
            return chunk;
        }
        if !self.state.is_settled() {
            let classification = self.classifier.classify(&self.path, Some(&chunk));
            self.state.set_classification(classification);
            self.state.settled.store(true, Ordering::Release);
            tracing::trace!("{} classified as {:?}", self.path, classification);
        }
        if !self.state.classification().is_text() {
            return chunk;
        }

        let data = if self.carry.is_empty() {
            chunk
        } else {
            self.carry.extend_from_slice(&chunk);
            self.carry.split().freeze()
        };

        let split = complete_prefix_len(&data);
        let body = data.slice(..split);
        self.carry.extend_from_slice(&data[split..]);
        self.redact(body)
    }

    /// Flush bytes held back at the end of the stream.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.carry.is_empty() {
            None
        } else {
            Some(self.carry.split().freeze())
        }
    }

    fn redact(&self, body: Bytes) -> Bytes {
        if body.is_empty() {
            return body;
        }
        let text = String::from_utf8_lossy(&body);
        let redaction = self.anonymizer.anonymize(&text);
        if redaction.modified() {
            self.state.modified.store(true, Ordering::Release);
            Bytes::from(redaction.text.into_owned())
        } else {
            body
        }
    }
}

/// Length of `data` minus a trailing incomplete UTF-8 sequence.
///
/// Invalid bytes elsewhere are left in place and decoded lossily.
fn complete_prefix_len(data: &[u8]) -> usize {
    let tail_start = data.len().saturating_sub(3);
    for start in (tail_start..data.len()).rev() {
        let byte = data[start];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let needed = match byte {
            b if b & 0b1110_0000 == 0b1100_0000 => 2,
            b if b & 0b1111_0000 == 0b1110_0000 => 3,
            b if b & 0b1111_1000 == 0b1111_0000 => 4,
            _ => return data.len(),
        };
        return if data.len() - start < needed {
            start
        } else {
            data.len()
        };
    }
    data.len()
}

/// Stream adapter applying a [`ChunkTransformer`] to every chunk
pub struct AnonymizeStream<S> {
    inner: S,
    transformer: ChunkTransformer,
    done: bool,
}

impl<S> AnonymizeStream<S> {
    pub fn new(inner: S, transformer: ChunkTransformer) -> Self {
        Self {
            inner,
            transformer,
            done: false,
        }
    }

    pub fn state(&self) -> Arc<TransformState> {
        self.transformer.state()
    }
}

impl<S, E> Stream for AnonymizeStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.done {
                return Poll::Ready(None);
            }
            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(chunk)) => {
                    let out = this.transformer.push(chunk);
                    if !out.is_empty() {
                        return Poll::Ready(Some(Ok(out)));
                    }
                }
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.done = true;
                    return Poll::Ready(this.transformer.finish().map(Ok));
                }
            }
        }
    }
}
