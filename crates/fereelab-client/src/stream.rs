//! Reading a streamed completion body into text deltas.

use bytes::Bytes;
use fereelab_types::{SseEvent, SseParser};
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::error::ClientError;

/// Drive a streamed completion body to its end.
///
/// Every text delta is handed to `on_delta` as it arrives and the assembled
/// reply is returned. Reading stops at `data: [DONE]`; a body that ends
/// without the sentinel is accepted as complete. An error event inside the
/// stream aborts with [`ClientError::Stream`].
pub async fn consume_stream<S, E, F>(stream: S, mut on_delta: F) -> Result<String, ClientError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<ClientError>,
    F: FnMut(&str),
{
    let mut parser = SseParser::new();
    let mut text = String::new();
    futures::pin_mut!(stream);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Into::into)?;
        for event in parser.push(&chunk) {
            apply(event, &mut text, &mut on_delta)?;
        }
        if parser.is_done() {
            debug!(chars = text.len(), "stream finished");
            return Ok(text);
        }
    }

    for event in parser.finish() {
        apply(event, &mut text, &mut on_delta)?;
    }
    debug!(chars = text.len(), "stream closed without sentinel");
    Ok(text)
}

fn apply<F: FnMut(&str)>(event: SseEvent, text: &mut String, on_delta: &mut F) -> Result<(), ClientError> {
    match event {
        SseEvent::Delta(delta) => {
            on_delta(&delta);
            text.push_str(&delta);
            Ok(())
        }
        SseEvent::Error(message) => Err(ClientError::Stream(message)),
        SseEvent::Done => Ok(()),
    }
}
