//! Update offset bookkeeping.
//!
//! The offset is the next update id the platform should return: one past the
//! highest id seen. It never moves backwards.

use opsrelay_common::types::InboxMessage;

/// Offset implied by a persisted batch; `0` for an empty one.
#[must_use]
pub fn offset_from_messages(messages: &[InboxMessage]) -> i64 {
    messages
        .iter()
        .map(|m| m.update_id)
        .max()
        .map_or(0, |max| max + 1)
}

/// Fold one observed update id into the current offset.
#[must_use]
pub fn advance(current: i64, update_id: i64) -> i64 {
    current.max(update_id + 1)
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, serde_json::Map};

    fn batch(ids: &[i64]) -> Vec<InboxMessage> {
        ids.iter()
            .map(|&id| InboxMessage::new(id, Map::new()))
            .collect()
    }

    #[rstest]
    #[case(&[], 0)]
    #[case(&[5], 6)]
    #[case(&[10, 5, 7], 11)]
    fn offset_is_max_plus_one(#[case] ids: &[i64], #[case] expected: i64) {
        assert_eq!(offset_from_messages(&batch(ids)), expected);
    }

    #[test]
    fn advance_is_monotonic() {
        let mut offset = 0;
        for id in [5, 10, 7, 12, 3] {
            let next = advance(offset, id);
            assert!(next >= offset);
            offset = next;
        }
        assert_eq!(offset, 13);
    }
}
