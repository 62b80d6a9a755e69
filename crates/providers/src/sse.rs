//! Server-sent-events plumbing shared by streaming backends.
//!
//! A backend hands over its `reqwest::Response` and a parser for single
//! `data:` payloads; this module handles chunk buffering, event framing,
//! and the end-of-body flush.

use crate::util::from_reqwest;
use px_domain::error::Result;
use px_domain::stream::{BoxStream, StreamEvent};

/// Pull every complete `data:` payload out of `buffer`.
///
/// Events are separated by a blank line. CRLF framing is normalised first,
/// so `\r\n\r\n` works the same as `\n\n`. Anything after the last
/// separator stays in the buffer for the next chunk. `event:`, `id:` and
/// `retry:` lines are ignored.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    if buffer.contains('\r') {
        *buffer = buffer.replace("\r\n", "\n");
    }

    let mut payloads = Vec::new();
    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos + 2).collect();
        payloads.extend(
            block
                .lines()
                .filter_map(|line| line.trim().strip_prefix("data:"))
                .map(str::trim)
                .filter(|data| !data.is_empty())
                .map(String::from),
        );
    }
    payloads
}

/// Turn an SSE response into a [`BoxStream`] of backend events.
///
/// `parse_data` is `FnMut` so parsers can carry state across payloads
/// (tool-call argument assembly needs this). When the body closes the
/// trailing partial event is flushed, and a `Done` is synthesised if the
/// parser never produced one.
pub(crate) fn sse_response_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut saw_done = false;

        loop {
            let closed = match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    false
                }
                Ok(None) => {
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                    }
                    true
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    return;
                }
            };

            for data in drain_data_lines(&mut buffer) {
                for event in parse_data(&data) {
                    saw_done |= matches!(&event, Ok(StreamEvent::Done { .. }));
                    yield event;
                }
            }

            if closed {
                break;
            }
        }

        if !saw_done {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_complete_events_only() {
        let mut buf = String::from("data: first\n\nevent: x\ndata: second\n\ndata: part");
        assert_eq!(drain_data_lines(&mut buf), vec!["first", "second"]);
        assert_eq!(buf, "data: part");
    }

    #[test]
    fn incremental_chunks_join_up() {
        let mut buf = String::from("data: {\"a\":");
        assert!(drain_data_lines(&mut buf).is_empty());
        buf.push_str("1}\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["{\"a\":1}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn crlf_framing_is_accepted() {
        let mut buf = String::from("data: one\r\n\r\ndata: two\r\n\r\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["one", "two"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn blank_data_and_metadata_lines_are_skipped() {
        let mut buf = String::from("id: 7\nretry: 100\ndata:   \n\ndata: [DONE]\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["[DONE]"]);
    }
}
