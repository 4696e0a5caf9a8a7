// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Conversion between raw body bytes and decoded body elements.
//!
//! `Mono` bodies are a single JSON document. `Flux` bodies are either
//! newline-delimited JSON, decoded as the chunks arrive, or a JSON array
//! whose items become the elements.

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use serde_json::Value;

use super::{BodyStream, ByteStream, FeignError, ResultKind};

/// Content types that are decoded line by line.
const STREAMING_CONTENT_TYPES: [&str; 3] = [
    "application/x-ndjson",
    "application/stream+json",
    "application/jsonl",
];

/// Lower-cased media type of the `content-type` header, without parameters.
pub fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
}

/// Whether a body with this content type is newline-delimited.
pub fn is_streaming(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| STREAMING_CONTENT_TYPES.contains(&ct))
}

/// Decode a complete body into its elements.
pub fn decode_body(
    kind: ResultKind,
    content_type: Option<&str>,
    data: &[u8],
) -> Result<Vec<Value>, FeignError> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    match kind {
        ResultKind::Mono => Ok(vec![serde_json::from_slice(data)?]),
        ResultKind::Flux if is_streaming(content_type) => data
            .split(|b| *b == b'\n')
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
            .map(|line| serde_json::from_slice(line).map_err(FeignError::from))
            .collect(),
        ResultKind::Flux => match serde_json::from_slice(data)? {
            Value::Array(items) => Ok(items),
            other => Ok(vec![other]),
        },
    }
}

/// Encode elements back into bytes in the shape `decode_body` reads.
pub fn encode_elements(kind: ResultKind, elements: &[Value]) -> Result<Bytes, FeignError> {
    match kind {
        ResultKind::Mono => match elements.first() {
            Some(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
            None => Ok(Bytes::new()),
        },
        ResultKind::Flux => {
            let mut out = Vec::new();
            for element in elements {
                serde_json::to_writer(&mut out, element)?;
                out.push(b'\n');
            }
            Ok(Bytes::from(out))
        }
    }
}

struct LineState {
    chunks: ByteStream,
    buffer: Vec<u8>,
    exhausted: bool,
    finished: bool,
}

/// Decode newline-delimited JSON as chunks arrive.
///
/// An element is emitted as soon as its terminating newline is seen; a
/// trailing line without newline is emitted when the input ends. The stream
/// ends after the first error.
pub fn decode_lines(chunks: ByteStream) -> BodyStream {
    let state = LineState {
        chunks,
        buffer: Vec::new(),
        exhausted: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                let item: Result<Value, FeignError> =
                    serde_json::from_slice(&line).map_err(FeignError::from);
                state.finished = item.is_err();
                return Some((item, state));
            }

            if state.exhausted {
                if state.buffer.iter().all(u8::is_ascii_whitespace) {
                    return None;
                }
                let line = std::mem::take(&mut state.buffer);
                let item: Result<Value, FeignError> =
                    serde_json::from_slice(&line).map_err(FeignError::from);
                state.finished = true;
                return Some((item, state));
            }

            match state.chunks.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => state.exhausted = true,
            }
        }
    })
    .boxed()
}
