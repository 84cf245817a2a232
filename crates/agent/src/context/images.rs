//! Sliding-window eviction of screenshot images.
//!
//! Only images nested inside tool results are candidates. Removal happens in
//! chunks so that the prefix the provider has cached stays stable for several
//! turns instead of shifting on every call.

use deskpilot_core::message::{ContentBlock, Message};

/// Remove the oldest tool-result images so that about `keep_n` remain.
///
/// The excess over `keep_n` is rounded down to a multiple of `min_chunk`
/// (no rounding when `min_chunk` is 0), so up to `min_chunk - 1` extra images
/// may survive. A `keep_n` of 0 disables pruning. Returns how many images were
/// removed.
pub fn prune_images(messages: &mut [Message], keep_n: usize, min_chunk: usize) -> usize {
    if keep_n == 0 {
        return 0;
    }

    let total = count_images(messages);
    let mut excess = total.saturating_sub(keep_n);
    if min_chunk > 0 {
        excess -= excess % min_chunk;
    }
    if excess == 0 {
        return 0;
    }

    let mut remaining = excess;
    for message in messages.iter_mut() {
        let Some(blocks) = message.blocks_mut() else {
            continue;
        };
        for block in blocks.iter_mut() {
            let ContentBlock::ToolResult(result) = block else {
                continue;
            };
            result.content.retain(|item| {
                if remaining > 0 && item.is_image() {
                    remaining -= 1;
                    false
                } else {
                    true
                }
            });
        }
        if remaining == 0 {
            break;
        }
    }

    tracing::debug!(total, removed = excess, "Pruned tool-result images");
    excess
}

fn count_images(messages: &[Message]) -> usize {
    messages
        .iter()
        .filter_map(Message::blocks)
        .flatten()
        .map(|block| match block {
            ContentBlock::ToolResult(result) => result.content.iter().filter(|c| c.is_image()).count(),
            _ => 0,
        })
        .sum()
}
