// Paced replay of an already generated response.
//
// Providers return the full text in one call; this turns it into one chunk
// per character so callers can show a typing effect. The stream is lazy and
// driven by the consumer: nothing is emitted until polled, and dropping it
// stops emission.

use std::time::Duration;

use futures_util::stream::{self, Stream};
use serde::Serialize;

/// One increment of a replayed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Chunk {
    /// The newly revealed character.
    pub increment: String,
    /// Everything revealed so far, including `increment`.
    pub cumulative: String,
}

struct ReplayState {
    text: String,
    offset: usize,
    delay: Duration,
}

/// Replay `text` one `char` at a time with `delay` between chunks.
pub(crate) fn replay(text: String, delay: Duration) -> impl Stream<Item = Chunk> + Send {
    let state = ReplayState {
        text,
        offset: 0,
        delay,
    };

    stream::unfold(state, |mut state| async move {
        let ch = state.text[state.offset..].chars().next()?;
        if state.offset > 0 && !state.delay.is_zero() {
            tokio::time::sleep(state.delay).await;
        }
        let end = state.offset + ch.len_utf8();
        let chunk = Chunk {
            increment: ch.to_string(),
            cumulative: state.text[..end].to_string(),
        };
        state.offset = end;
        Some((chunk, state))
    })
}
