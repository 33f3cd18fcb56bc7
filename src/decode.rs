use bytes::{Buf, Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{Deserializer, Value};
use crate::error::Error;

/// Incremental JSON decoder for one subscribed connection.
///
/// Chunks are buffered until a complete value is available, so payloads
/// may be split across chunk boundaries at any byte. A malformed unit is
/// reported and skipped up to the next newline; later units still decode.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: BytesMut,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Value, Error>> {
        self.buf.extend_from_slice(chunk);
        self.drain(false)
    }

    /// Decode whatever is left once the connection ends.
    pub fn finish(&mut self) -> Vec<Result<Value, Error>> {
        let items = self.drain(true);
        self.buf.clear();
        items
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn drain(&mut self, eof: bool) -> Vec<Result<Value, Error>> {
        let mut items = Vec::new();
        while let Some(item) = self.next_unit(eof) {
            items.push(item);
        }
        items
    }

    fn next_unit(&mut self, eof: bool) -> Option<Result<Value, Error>> {
        match self.buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(n) => self.buf.advance(n),
            None    => {
                self.buf.clear();
                return None;
            }
        }

        let (result, offset) = {
            let mut iter = Deserializer::from_slice(&self.buf).into_iter::<Value>();
            let result = iter.next()?;
            (result, iter.byte_offset())
        };

        match result {
            Ok(value) => {
                self.buf.advance(offset);
                Some(Ok(value))
            }
            Err(e) if e.is_eof() && !eof => None,
            Err(e) => {
                let n = match self.buf.iter().position(|&b| b == b'\n') {
                    Some(n)      => n + 1,
                    None if eof  => self.buf.len(),
                    None         => return None,
                };
                let unit = String::from_utf8_lossy(&self.buf[..n]).trim().to_owned();
                self.buf.advance(n);
                Some(Err(Error::Decode(format!("{}: {}", e, unit))))
            }
        }
    }
}

/// Lazily decode a stream of chunks into messages.
///
/// Transport errors pass through unchanged; anything still buffered when
/// the chunk stream ends is decoded as a final unit.
pub fn messages<S>(chunks: S) -> impl Stream<Item = Result<Value, Error>>
where
    S: Stream<Item = Result<Bytes, Error>>,
{
    let mut decoder = StreamDecoder::new();

    chunks.map(Some).chain(stream::once(async { None })).flat_map(move |chunk| {
        let items = match chunk {
            Some(Ok(bytes)) => decoder.push(&bytes),
            Some(Err(e))    => vec![Err(e)],
            None            => decoder.finish(),
        };
        stream::iter(items)
    })
}

#[cfg(test)]
mod tests {
    use futures::stream::{self, StreamExt};
    use serde_json::json;
    use super::*;

    fn values(items: Vec<Result<Value, Error>>) -> Vec<Value> {
        items.into_iter().map(Result::unwrap).collect()
    }

    #[test]
    fn unit_split_across_chunks() {
        let mut decoder = StreamDecoder::new();

        assert!(decoder.push(br#"{"status":"st"#).is_empty());
        assert!(decoder.push(br#"art","id":"#).is_empty());
        let items = values(decoder.push(b"\"c1\"}\n{\"id\""));

        assert_eq!(items, vec![json!({"status": "start", "id": "c1"})]);
        assert_eq!(decoder.pending(), 5);

        let items = values(decoder.push(b":\"c2\"}\n"));
        assert_eq!(items, vec![json!({"id": "c2"})]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn several_units_in_one_chunk() {
        let mut decoder = StreamDecoder::new();
        let items = values(decoder.push(b"{\"a\":1}\n{\"b\":2}{\"c\":3}\r\n"));
        assert_eq!(items, vec![json!({"a": 1}), json!({"b": 2}), json!({"c": 3})]);
    }

    #[test]
    fn multibyte_split() {
        let text = "{\"name\":\"caf\u{e9}\"}\n".as_bytes();
        let (a, b) = text.split_at(13);

        let mut decoder = StreamDecoder::new();
        assert!(decoder.push(a).is_empty());
        assert_eq!(values(decoder.push(b)), vec![json!({"name": "caf\u{e9}"})]);
    }

    #[test]
    fn malformed_unit_is_skipped() {
        let mut decoder = StreamDecoder::new();
        let items = decoder.push(b"{\"a\":1}\n{\"b\":,}\n{\"c\":3}\n");

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap(), &json!({"a": 1}));
        assert!(matches!(items[1], Err(Error::Decode(_))));
        assert_eq!(items[2].as_ref().unwrap(), &json!({"c": 3}));
    }

    #[test]
    fn malformed_unit_waits_for_delimiter() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.push(b"{\"b\":,").is_empty());

        let items = decoder.push(b"}\n{\"c\":3}\n");
        assert!(matches!(items[0], Err(Error::Decode(_))));
        assert_eq!(items[1].as_ref().unwrap(), &json!({"c": 3}));
    }

    #[test]
    fn truncated_tail_on_finish() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.push(b"{\"a\":1}\n{\"b\":").len(), 1);

        let items = decoder.finish();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::Decode(_))));
        assert_eq!(decoder.pending(), 0);
    }

    #[tokio::test]
    async fn stream_of_chunks() {
        let chunks = vec![
            Ok(Bytes::from_static(b"[{\"Id\":\"c1\"},")),
            Ok(Bytes::from_static(b"{\"Id\":\"c2\"}]")),
        ];

        let items = messages(stream::iter(chunks)).collect::<Vec<_>>().await;

        assert_eq!(values(items), vec![json!([{"Id": "c1"}, {"Id": "c2"}])]);
    }

    #[tokio::test]
    async fn transport_error_passes_through() {
        let chunks = vec![
            Ok(Bytes::from_static(b"{\"a\":1}\n")),
            Err(Error::transport("/events", "reset")),
            Ok(Bytes::from_static(b"{\"b\":2}\n")),
        ];

        let items = messages(stream::iter(chunks)).collect::<Vec<_>>().await;

        assert_eq!(items.len(), 3);
        assert!(matches!(items[1], Err(Error::Transport { .. })));
        assert_eq!(items[2].as_ref().unwrap(), &json!({"b": 2}));
    }
}
