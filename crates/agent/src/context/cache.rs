//! Prefix-cache breakpoints on recent user turns.

use deskpilot_core::message::{CacheControl, Message, Role};

/// Breakpoints placed on user turns. One more is left for the system prompt
/// and tool list, which are shared across sessions.
pub const DEFAULT_CACHE_HINTS: usize = 3;

/// Mark the last content item of the `max_hints` most recent block-structured
/// user turns, and clear the marker from the next older one.
///
/// The loop adds at most one user turn per call, so clearing a single older
/// turn is enough to keep the number of live markers bounded.
pub fn place_cache_hints(messages: &mut [Message], max_hints: usize) {
    let mut remaining = max_hints;
    for message in messages.iter_mut().rev() {
        if message.role != Role::User {
            continue;
        }
        let Some(last) = message.blocks_mut().and_then(|blocks| blocks.last_mut()) else {
            continue;
        };
        if remaining > 0 {
            remaining -= 1;
            last.set_cache_control(Some(CacheControl::Ephemeral));
        } else {
            last.set_cache_control(None);
            break;
        }
    }
}
