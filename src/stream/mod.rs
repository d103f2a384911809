//! Incremental decoding of streamed response bodies into text fragments.
//!
//! A chunk boundary may fall in the middle of a multi-byte UTF-8 sequence, so the
//! decoder holds back an incomplete tail and prepends it to the next chunk. Invalid
//! sequences are replaced with U+FFFD rather than failing the read.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};

use crate::TransportError;

/// Stream of raw body chunks as delivered by the transport
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

const REPLACEMENT: char = '\u{FFFD}';

/// Stateful UTF-8 decoder that carries partial code points between chunks
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk, keeping any trailing incomplete sequence for the next call
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut pos = 0;

        while pos < self.pending.len() {
            match std::str::from_utf8(&self.pending[pos..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    pos = self.pending.len();
                }
                Err(e) => {
                    let valid_up_to = pos + e.valid_up_to();
                    // valid_up_to() guarantees this prefix is well-formed
                    out.push_str(&String::from_utf8_lossy(&self.pending[pos..valid_up_to]));

                    match e.error_len() {
                        Some(invalid) => {
                            out.push(REPLACEMENT);
                            pos = valid_up_to + invalid;
                        }
                        None => {
                            // Incomplete sequence at the end, wait for more bytes
                            pos = valid_up_to;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..pos);
        out
    }

    /// Flush the decoder at end of stream
    pub fn finish(self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            REPLACEMENT.to_string()
        }
    }

    /// Number of bytes held back waiting for the rest of a code point
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Reads a byte stream one chunk at a time and yields decoded text fragments
///
/// One fragment is produced per received chunk (possibly empty when the whole chunk
/// was an incomplete code point), followed by the flushed remainder if there is one.
/// After a transport error or the final flush, no further fragments are produced.
pub struct StreamReader<S> {
    inner: S,
    decoder: Option<Utf8Decoder>,
}

impl<S> StreamReader<S>
where
    S: Stream<Item = Result<Bytes, TransportError>> + Unpin,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: Some(Utf8Decoder::new()),
        }
    }

    /// Read the next fragment, or `None` once the stream has ended
    pub async fn next_fragment(&mut self) -> Option<Result<String, TransportError>> {
        let decoder = self.decoder.as_mut()?;

        match self.inner.next().await {
            Some(Ok(chunk)) => Some(Ok(decoder.decode(&chunk))),
            Some(Err(e)) => {
                // No terminal flush after a failed read
                self.decoder = None;
                Some(Err(e))
            }
            None => {
                let rest = self.decoder.take()?.finish();
                if rest.is_empty() {
                    None
                } else {
                    Some(Ok(rest))
                }
            }
        }
    }

    /// Whether the reader has produced its last fragment
    pub fn is_finished(&self) -> bool {
        self.decoder.is_none()
    }

    /// Turn the reader into a lazy stream of fragments
    pub fn into_stream(self) -> impl Stream<Item = Result<String, TransportError>>
    where
        S: Send + 'static,
    {
        stream::unfold(self, |mut reader| async move {
            let fragment = reader.next_fragment().await?;
            Some((fragment, reader))
        })
    }
}

/// Read an entire byte stream into a string
pub async fn read_to_string<S>(inner: S) -> Result<String, TransportError>
where
    S: Stream<Item = Result<Bytes, TransportError>> + Unpin,
{
    let mut reader = StreamReader::new(inner);
    let mut text = String::new();
    while let Some(fragment) = reader.next_fragment().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}

/// Build a byte stream from in-memory chunks
pub fn from_chunks<I>(chunks: I) -> ByteStream
where
    I: IntoIterator<Item = Result<Bytes, TransportError>>,
    I::IntoIter: Send + 'static,
{
    stream::iter(chunks).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunked(bytes: &[u8], sizes: &[usize]) -> ByteStream {
        let mut chunks = Vec::new();
        let mut rest = bytes;
        for &size in sizes {
            let size = size.min(rest.len());
            let (head, tail) = rest.split_at(size);
            chunks.push(Ok(Bytes::copy_from_slice(head)));
            rest = tail;
        }
        if !rest.is_empty() {
            chunks.push(Ok(Bytes::copy_from_slice(rest)));
        }
        from_chunks(chunks)
    }

    #[test]
    fn test_decoder_holds_back_split_code_point() {
        let mut decoder = Utf8Decoder::new();
        let text = "안녕".as_bytes();

        assert_eq!(decoder.decode(&text[..2]), "");
        assert_eq!(decoder.pending_len(), 2);
        assert_eq!(decoder.decode(&text[2..4]), "안");
        assert_eq!(decoder.decode(&text[4..]), "녕");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xFFb"), "a\u{FFFD}b");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_decoder_flushes_truncated_tail() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&"é".as_bytes()[..1]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[tokio::test]
    async fn test_decoded_text_is_invariant_to_chunking() {
        let text = "Hello, 세계! Ünïcödé 🎬 subtitles\n1\n00:00:01,000 --> 00:00:02,000\n번역";
        let bytes = text.as_bytes();

        let splits: [&[usize]; 5] = [&[], &[1; 200], &[3, 7, 2, 5], &[8, 1, 1, 13], &[bytes.len()]];
        for sizes in splits {
            let decoded = read_to_string(chunked(bytes, sizes)).await.unwrap();
            assert_eq!(decoded, text, "chunk sizes {:?}", sizes);
        }

        // Every possible two-way split, including every mid-code-point position
        for at in 0..=bytes.len() {
            let decoded = read_to_string(chunked(bytes, &[at])).await.unwrap();
            assert_eq!(decoded, text, "split at {}", at);
        }
    }

    #[tokio::test]
    async fn test_one_fragment_per_chunk_in_order() {
        let mut reader = StreamReader::new(from_chunks(vec![
            Ok(Bytes::from_static(b"one ")),
            Ok(Bytes::from_static(b"two ")),
            Ok(Bytes::from_static(b"three")),
        ]));

        let mut fragments = Vec::new();
        while let Some(fragment) = reader.next_fragment().await {
            fragments.push(fragment.unwrap());
        }

        assert_eq!(fragments, vec!["one ", "two ", "three"]);
        assert!(reader.is_finished());
        assert!(reader.next_fragment().await.is_none());
    }

    #[tokio::test]
    async fn test_error_terminates_without_flush() {
        let mut reader = StreamReader::new(from_chunks(vec![
            Ok(Bytes::copy_from_slice(&"é".as_bytes()[..1])),
            Err(TransportError::Stream("connection reset".to_string())),
            Ok(Bytes::from_static(b"never read")),
        ]));

        assert_eq!(reader.next_fragment().await.unwrap().unwrap(), "");
        assert!(matches!(
            reader.next_fragment().await,
            Some(Err(TransportError::Stream(_)))
        ));
        assert!(reader.next_fragment().await.is_none());
    }

    #[tokio::test]
    async fn test_into_stream_collects_fragments() {
        let reader = StreamReader::new(chunked("ab€".as_bytes(), &[1, 2, 1]));
        let fragments: Vec<_> = reader
            .into_stream()
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(fragments.concat(), "ab€");
        assert_eq!(fragments.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_stream_yields_nothing() {
        assert_eq!(read_to_string(from_chunks(Vec::new())).await.unwrap(), "");
    }
}
