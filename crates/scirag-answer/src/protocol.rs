//! Event-stream framing for answer streams.
//!
//! Each event is one `data:` frame holding a JSON object:
//! `{"delta":"..."}` for text, and once at the end
//! `{"final":true,"sources":[...]}`. Comment frames (`: ping`) keep idle
//! connections open and carry no event.

use serde::Deserialize;
use serde_json::json;

use scirag_core::types::{SourceRef, StreamEvent};

pub const CONTENT_TYPE: &str = "text/event-stream";

#[derive(Debug, Deserialize)]
struct WireFrame {
    #[serde(default)]
    delta: Option<String>,
    #[serde(rename = "final", default)]
    is_final: bool,
    #[serde(default)]
    sources: Option<Vec<SourceRef>>,
}

pub fn encode(event: &StreamEvent) -> String {
    let payload = match event {
        StreamEvent::Delta(text) => json!({ "delta": text }),
        StreamEvent::Final { sources } => json!({ "final": true, "sources": sources }),
    };
    format!("data: {payload}\n\n")
}

pub fn encode_comment(text: &str) -> String { format!(": {text}\n\n") }

/// Incremental decoder for the client side of an answer stream.
///
/// Bytes may arrive split anywhere. Frames that are not valid UTF-8 or JSON,
/// or that carry neither a delta nor a final marker, are dropped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self { Self::default() }

    /// Feed raw bytes; returns every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buf.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
        let mut events = Vec::new();
        while let Some(pos) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let frame: Vec<u8> = self.buf.drain(..pos + 2).collect();
            if let Some(event) = decode_frame(&frame[..pos]) { events.push(event); }
        }
        events
    }

    /// Decode whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let rest = std::mem::take(&mut self.buf);
        decode_frame(&rest)
    }
}

fn decode_frame(frame: &[u8]) -> Option<StreamEvent> {
    let text = std::str::from_utf8(frame).ok()?;
    let data: Vec<&str> = text
        .lines()
        .filter(|l| !l.starts_with(':'))
        .filter_map(|l| l.strip_prefix("data:"))
        .map(|d| d.strip_prefix(' ').unwrap_or(d))
        .collect();
    if data.is_empty() { return None; }
    let wire: WireFrame = match serde_json::from_str(&data.join("\n")) {
        Ok(w) => w,
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed frame");
            return None;
        }
    };
    if wire.is_final {
        Some(StreamEvent::Final { sources: wire.sources.unwrap_or_default() })
    } else {
        wire.delta.map(StreamEvent::Delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceRef {
        SourceRef {
            citation: 1,
            id: 42,
            book_title: "Cell Biology".into(),
            section: "Full Text".into(),
            chunk_idx: 3,
            score: Some(0.75),
        }
    }

    #[test]
    fn frames_have_the_wire_shape() {
        assert_eq!(encode(&StreamEvent::Delta("Kinases".into())), "data: {\"delta\":\"Kinases\"}\n\n");
        let frame = encode(&StreamEvent::Final { sources: vec![source()] });
        assert!(frame.starts_with("data: {") && frame.ends_with("}\n\n"));
        let value: serde_json::Value = serde_json::from_str(frame.trim_start_matches("data: ").trim()).expect("json");
        assert_eq!(value["final"], true);
        assert_eq!(value["sources"][0]["book_title"], "Cell Biology");
        assert_eq!(value["sources"][0]["chunk_idx"], 3);
        assert_eq!(encode_comment("ping"), ": ping\n\n");
    }

    #[test]
    fn decodes_frames_split_at_any_byte() {
        let stream = [
            encode(&StreamEvent::Delta("Kinases are enzymes[".into())),
            encode_comment("ping"),
            encode(&StreamEvent::Delta("1].".into())),
            encode(&StreamEvent::Final { sources: vec![source()] }),
        ]
        .concat();
        let bytes = stream.as_bytes();
        for split in 1..bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut events = decoder.push(&bytes[..split]);
            events.extend(decoder.push(&bytes[split..]));
            assert_eq!(events.len(), 3, "split at {split}");
            assert_eq!(events[2], StreamEvent::Final { sources: vec![source()] });
        }
    }

    #[test]
    fn tolerates_crlf_and_multi_line_data() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"event: message\r\ndata: {\"delta\":\r\ndata: \"hi\"}\r\n\r\n");
        assert_eq!(events, vec![StreamEvent::Delta("hi".into())]);
    }

    #[test]
    fn malformed_frames_are_skipped() {
        let mut decoder = FrameDecoder::new();
        let mut input = b"data: {not json}\n\ndata: \xff\xfe\n\ndata: {\"other\":1}\n\n".to_vec();
        input.extend_from_slice(encode(&StreamEvent::Delta("ok".into())).as_bytes());
        assert_eq!(decoder.push(&input), vec![StreamEvent::Delta("ok".into())]);
    }

    #[test]
    fn final_wins_over_delta_and_trailing_frame_is_flushed() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"delta\":\"x\",\"final\":true}").is_empty());
        assert_eq!(decoder.finish(), Some(StreamEvent::Final { sources: Vec::new() }));
        assert_eq!(decoder.finish(), None);
    }
}
