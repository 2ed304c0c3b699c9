// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Minimal server-sent events decoding for Streamable-HTTP responses.
//!
//! Only `data:` fields matter. Each blank-line-terminated event becomes one
//! JSON-RPC message; `event:`, `id:`, `retry:` and comment lines are ignored.

/// Split an SSE body into the data payload of each event.
pub fn decode_events(body: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut data_lines: Vec<&str> = Vec::new();

    for raw in body.split('\n') {
        let line = raw.trim_end_matches('\r');

        if line.is_empty() {
            flush(&mut data_lines, &mut events);
            continue;
        }
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    flush(&mut data_lines, &mut events);

    events
}

fn flush(data_lines: &mut Vec<&str>, events: &mut Vec<String>) {
    if data_lines.is_empty() {
        return;
    }
    let payload = data_lines.join("\n");
    data_lines.clear();
    if !payload.trim().is_empty() {
        events.push(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_event() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1}\n\n";
        assert_eq!(decode_events(body), vec!["{\"jsonrpc\":\"2.0\",\"id\":1}"]);
    }

    #[test]
    fn decodes_several_events_and_ignores_comments() {
        let body = ": keep-alive\r\ndata: {\"a\":1}\r\n\r\nid: 7\ndata: {\"b\":2}\n\n";
        assert_eq!(decode_events(body), vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn joins_multiline_data_and_flushes_trailing_event() {
        assert_eq!(decode_events("data: {\"a\":\ndata: 1}"), vec!["{\"a\":\n1}"]);
    }

    #[test]
    fn empty_data_is_dropped() {
        assert!(decode_events("data:\n\nevent: ping\n\n").is_empty());
    }
}
