// Stream relay - reassembles upstream frames and re-emits text deltas

use std::convert::Infallible;
use std::fmt::Display;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const RELAY_CHANNEL_CAPACITY: usize = 32;

/// Caller-facing body stream produced by a relay.
pub type RelayStream = BoxStream<'static, Result<Bytes, Infallible>>;

/// How logical frames are delimited in the upstream body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `data: {...}` lines
    Sse,
    /// A JSON array of objects delivered incrementally (`alt=json`)
    JsonArray,
}

/// Where the incremental text lives inside one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaSchema {
    /// `candidates[0].content.parts[*].text`
    GenerateContent,
    /// `choices[0].delta.content`
    ChatCompletion,
}

impl DeltaSchema {
    pub fn extract(&self, frame: &Value) -> Option<String> {
        match self {
            DeltaSchema::GenerateContent => {
                let parts = frame
                    .get("candidates")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("content"))
                    .and_then(|c| c.get("parts"))
                    .and_then(|p| p.as_array())?;

                let text: String = parts
                    .iter()
                    .filter(|p| !p.get("thought").and_then(|t| t.as_bool()).unwrap_or(false))
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect();
                Some(text)
            }
            DeltaSchema::ChatCompletion => frame
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("delta"))
                .and_then(|d| d.get("content"))
                .and_then(|c| c.as_str())
                .map(str::to_string),
        }
    }
}

/// Incremental decoder that turns arbitrary byte chunks into text deltas.
///
/// Bytes are buffered until a frame is complete, so a frame (or a multi-byte
/// character) split across chunks decodes the same as one delivered whole.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    schema: DeltaSchema,
    carry: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(framing: Framing, schema: DeltaSchema) -> Self {
        Self {
            framing,
            schema,
            carry: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);
        match self.framing {
            Framing::Sse => self.drain_lines(),
            Framing::JsonArray => self.drain_objects(),
        }
    }

    /// Flush whatever is left once the upstream has closed.
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.carry);
        if rest.iter().all(u8::is_ascii_whitespace) {
            return Vec::new();
        }
        match self.framing {
            Framing::Sse => self.decode_line(&rest).into_iter().collect(),
            Framing::JsonArray => {
                tracing::debug!("Dropping {} bytes of incomplete trailing JSON", rest.len());
                Vec::new()
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut deltas = Vec::new();
        while let Some(pos) = self.carry.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.carry.drain(..=pos).collect();
            if let Some(delta) = self.decode_line(&line[..pos]) {
                deltas.push(delta);
            }
        }
        deltas
    }

    fn decode_line(&self, raw: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');

        let data = line.strip_prefix("data:")?.trim();
        if data.is_empty() || data == "[DONE]" {
            return None;
        }
        self.decode_payload(data)
    }

    fn drain_objects(&mut self) -> Vec<String> {
        let mut deltas = Vec::new();
        loop {
            let Some(start) = self.carry.iter().position(|b| *b == b'{') else {
                // separators and array brackets only
                self.carry.clear();
                break;
            };
            let Some(end) = find_matching_brace(&self.carry, start) else {
                self.carry.drain(..start);
                break;
            };
            let object: Vec<u8> = self.carry.drain(..=end).skip(start).collect();
            let text = String::from_utf8_lossy(&object);
            if let Some(delta) = self.decode_payload(&text) {
                deltas.push(delta);
            }
        }
        deltas
    }

    fn decode_payload(&self, data: &str) -> Option<String> {
        let frame: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("Skipping malformed stream frame: {}", e);
                return None;
            }
        };
        if let Some(error) = frame.get("error") {
            tracing::warn!("Upstream reported an error inside the stream: {}", error);
            return None;
        }
        self.schema.extract(&frame).filter(|d| !d.is_empty())
    }
}

/// Index of the `}` closing the object that opens at `start`, skipping
/// braces inside string literals.
fn find_matching_brace(buf: &[u8], start: usize) -> Option<usize> {
    if buf.get(start) != Some(&b'{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;
    for (i, b) in buf.iter().enumerate().skip(start) {
        if escape_next {
            escape_next = false;
            continue;
        }
        match *b {
            b'\\' if in_string => escape_next = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

enum RelayMode {
    Text(FrameDecoder),
    Raw,
}

impl RelayMode {
    fn feed(&mut self, chunk: Bytes) -> Vec<Bytes> {
        match self {
            RelayMode::Text(decoder) => decoder.push(&chunk).into_iter().map(Bytes::from).collect(),
            RelayMode::Raw => vec![chunk],
        }
    }

    fn finish(&mut self) -> Vec<Bytes> {
        match self {
            RelayMode::Text(decoder) => decoder.finish().into_iter().map(Bytes::from).collect(),
            RelayMode::Raw => Vec::new(),
        }
    }
}

/// Relay extracted text deltas from `upstream` as they arrive.
///
/// Dropping the returned stream cancels `cancel`, which stops the read loop
/// and releases the upstream connection.
pub fn relay_text<S, E>(
    upstream: S,
    decoder: FrameDecoder,
    cancel: CancellationToken,
) -> RelayStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    spawn_relay(upstream, RelayMode::Text(decoder), cancel)
}

/// Relay upstream bytes untouched.
pub fn relay_raw<S, E>(
    upstream: S,
    cancel: CancellationToken,
) -> RelayStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    spawn_relay(upstream, RelayMode::Raw, cancel)
}

fn spawn_relay<S, E>(
    upstream: S,
    mut mode: RelayMode,
    cancel: CancellationToken,
) -> RelayStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Bytes>(RELAY_CHANNEL_CAPACITY);
    let read_cancel = cancel.clone();

    tokio::spawn(async move {
        let mut upstream = Box::pin(upstream);
        loop {
            let next = tokio::select! {
                _ = read_cancel.cancelled() => {
                    tracing::debug!("Caller went away, closing upstream stream");
                    return;
                }
                next = upstream.next() => next,
            };

            let out = match next {
                Some(Ok(chunk)) => mode.feed(chunk),
                Some(Err(e)) => {
                    tracing::warn!("Upstream stream error: {}", e);
                    break;
                }
                None => break,
            };
            for piece in out {
                if tx.send(piece).await.is_err() {
                    return;
                }
            }
        }
        for piece in mode.finish() {
            if tx.send(piece).await.is_err() {
                return;
            }
        }
    });

    Box::pin(async_stream::stream! {
        let _guard = cancel.drop_guard();
        while let Some(piece) = rx.recv().await {
            yield Ok(piece);
        }
    })
}
