use crate::error::{Error, Result};
use crate::session::{Processed, Translator};
use bytes::BytesMut;
use foundations::telemetry::log;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{AnyDelimiterCodec, Decoder};

pub const SHUTDOWN: &str = "shutdown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLine {
    Message(String),
    Shutdown,
    /// Over-long or not valid UTF-8.
    Discarded,
}

/// Splits the feed into trimmed, non-empty lines.
#[derive(Debug)]
pub struct FeedCodec {
    lines: AnyDelimiterCodec,
}

impl FeedCodec {
    pub fn new(max_line_length: usize) -> FeedCodec {
        FeedCodec {
            lines: AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), max_line_length),
        }
    }

    fn classify(chunk: &[u8]) -> Option<FeedLine> {
        let Ok(line) = std::str::from_utf8(chunk) else {
            return Some(FeedLine::Discarded);
        };
        match line.trim() {
            "" => None,
            SHUTDOWN => Some(FeedLine::Shutdown),
            line => Some(FeedLine::Message(line.to_owned())),
        }
    }

    fn next_line(
        &mut self,
        buf: &mut BytesMut,
        eof: bool,
    ) -> Result<Option<FeedLine>> {
        loop {
            let chunk = if eof {
                self.lines.decode_eof(buf)
            } else {
                self.lines.decode(buf)
            };
            let chunk = match chunk {
                Ok(Some(chunk)) => chunk,
                Ok(None) => return Ok(None),
                Err(e) => {
                    let e = Error::from(e);
                    if !e.is_line_too_long() {
                        return Err(e);
                    }
                    // The codec keeps discarding up to the next newline on its own.
                    log::warn!("Discarding over-long line"; "error" => %e);
                    return Ok(Some(FeedLine::Discarded));
                }
            };
            if let Some(line) = Self::classify(&chunk) {
                return Ok(Some(line));
            }
        }
    }
}

impl Decoder for FeedCodec {
    type Item = FeedLine;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<FeedLine>> {
        self.next_line(buf, false)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<FeedLine>> {
        self.next_line(buf, true)
    }
}

#[derive(Debug)]
pub struct FeedConn<R> {
    reader: R,
    buffer: BytesMut,
    codec: FeedCodec,
}

impl<R: AsyncRead + Unpin> FeedConn<R> {
    pub fn new(reader: R, max_line_length: usize) -> FeedConn<R> {
        FeedConn {
            reader,
            buffer: BytesMut::with_capacity(8192),
            codec: FeedCodec::new(max_line_length),
        }
    }

    /// Next line of the feed, `None` once the reader is exhausted.
    pub async fn read_line(&mut self) -> Result<Option<FeedLine>> {
        loop {
            if let Some(line) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(line));
            }
            if self.reader.read_buf(&mut self.buffer).await? == 0 {
                return self.codec.decode_eof(&mut self.buffer);
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    /// Non-empty lines read, the shutdown sentinel excluded.
    pub lines: u64,
    /// Lines that changed nothing: undecodable, unrecognized or rejected.
    pub dropped: u64,
    pub shutdown: bool,
}

/// Feeds every line of `reader` through `translator`, in order, until the
/// shutdown sentinel or end of stream.
pub async fn ingest<R: AsyncRead + Unpin>(reader: R, translator: &Translator) -> Result<IngestSummary> {
    let settings = translator.settings();
    let mut conn = FeedConn::new(reader, settings.max_line_length);
    let mut summary = IngestSummary::default();

    while let Some(line) = conn.read_line().await? {
        let text = match line {
            FeedLine::Shutdown => {
                log::info!("Shutdown command received");
                summary.shutdown = true;
                return Ok(summary);
            }
            FeedLine::Discarded => {
                summary.lines += 1;
                summary.dropped += 1;
                continue;
            }
            FeedLine::Message(text) => text,
        };

        summary.lines += 1;
        match translator.process_line(&text) {
            Ok(Processed::Ignored) => summary.dropped += 1,
            Ok(_) => {}
            Err(e) if e.is_malformed_prefix() && !settings.abort_on_malformed_prefix => {
                summary.dropped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    log::info!("EOF");
    Ok(summary)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::IngestSettings;
    use crate::registry::Registry;
    use std::sync::Arc;

    fn translator(settings: IngestSettings) -> Translator {
        Translator::new(Arc::new(Registry::new()), settings)
    }

    const STATE_UP: &str = r#"{"type":"state","neighbor":{"ip":"192.0.2.1","state":"up"}}"#;
    const ANNOUNCE: &str = r#"{"type":"update","neighbor":{"ip":"192.0.2.1","message":{"update":{"attribute":{"as-path":[65001,64500]},"announce":{"ipv4 unicast":{"192.0.2.254":{"10.0.0.0/8":{}}}}}}}}"#;
    const BAD_PREFIX: &str = r#"{"type":"update","neighbor":{"ip":"192.0.2.1","message":{"update":{"announce":{"ipv4 unicast":{"192.0.2.254":{"10.0.0/33":{}}}}}}}}"#;

    #[tokio::test]
    async fn feed_lines_are_trimmed_and_split() {
        let input = b"  first \r\n\n\nsecond\nshutdown\nlast";
        let mut conn = FeedConn::new(&input[..], 64);
        assert_eq!(
            conn.read_line().await.unwrap(),
            Some(FeedLine::Message("first".to_string()))
        );
        assert_eq!(
            conn.read_line().await.unwrap(),
            Some(FeedLine::Message("second".to_string()))
        );
        assert_eq!(conn.read_line().await.unwrap(), Some(FeedLine::Shutdown));
        assert_eq!(
            conn.read_line().await.unwrap(),
            Some(FeedLine::Message("last".to_string()))
        );
        assert_eq!(conn.read_line().await.unwrap(), None);
        assert_eq!(conn.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_and_invalid_lines_are_discarded() {
        let mut input = Vec::new();
        input.extend_from_slice(&[b'x'; 100]);
        input.push(b'\n');
        input.extend_from_slice(&[0xff, 0xfe, b'\n']);
        input.extend_from_slice(b"ok\n");

        let mut conn = FeedConn::new(&input[..], 32);
        assert_eq!(conn.read_line().await.unwrap(), Some(FeedLine::Discarded));
        assert_eq!(conn.read_line().await.unwrap(), Some(FeedLine::Discarded));
        assert_eq!(
            conn.read_line().await.unwrap(),
            Some(FeedLine::Message("ok".to_string()))
        );
        assert_eq!(conn.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn ingest_drops_over_long_lines_and_continues() {
        let t = translator(IngestSettings {
            max_line_length: ANNOUNCE.len(),
            ..IngestSettings::default()
        });
        let long = format!("{ANNOUNCE}{}", " ".repeat(ANNOUNCE.len()));
        let input = format!("{long}\n{ANNOUNCE}\n");

        let summary = ingest(input.as_bytes(), &t).await.unwrap();
        assert_eq!(
            summary,
            IngestSummary {
                lines: 2,
                dropped: 1,
                shutdown: false
            }
        );
        let neighbor = t.registry().get("192.0.2.1").unwrap();
        assert_eq!(neighbor.prefix_count(), 1);
        assert_eq!(neighbor.updates(), 1);
    }

    #[tokio::test]
    async fn ingest_stops_at_shutdown() {
        let t = translator(IngestSettings::default());
        let input = format!("{STATE_UP}\n{ANNOUNCE}\nshutdown\n{BAD_PREFIX}\n");

        let summary = ingest(input.as_bytes(), &t).await.unwrap();
        assert_eq!(
            summary,
            IngestSummary {
                lines: 2,
                dropped: 0,
                shutdown: true
            }
        );

        let neighbor = t.registry().get("192.0.2.1").unwrap();
        assert_eq!(neighbor.state(), "up");
        assert_eq!(neighbor.prefix_count(), 1);
        assert_eq!(neighbor.asn_count(), 1);
    }

    #[tokio::test]
    async fn ingest_skips_bad_lines_until_eof() {
        let t = translator(IngestSettings::default());
        let input = format!("garbage\n{BAD_PREFIX}\n{{\"type\":\"open\"}}\n{ANNOUNCE}\n");

        let summary = ingest(input.as_bytes(), &t).await.unwrap();
        assert_eq!(
            summary,
            IngestSummary {
                lines: 4,
                dropped: 3,
                shutdown: false
            }
        );
        assert_eq!(t.registry().get("192.0.2.1").unwrap().prefix_count(), 1);
    }

    #[tokio::test]
    async fn ingest_aborts_on_bad_prefix_when_configured() {
        let t = translator(IngestSettings {
            abort_on_malformed_prefix: true,
            ..IngestSettings::default()
        });
        let input = format!("{ANNOUNCE}\n{BAD_PREFIX}\n{STATE_UP}\n");

        let err = ingest(input.as_bytes(), &t).await.unwrap_err();
        assert!(err.is_malformed_prefix());

        // What was applied before the bad line stays.
        let neighbor = t.registry().get("192.0.2.1").unwrap();
        assert_eq!(neighbor.prefix_count(), 1);
        assert_eq!(neighbor.state(), "");
    }
}
