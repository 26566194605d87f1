//! Replicated event log types.

use serde::{Deserialize, Serialize};

/// A single client-submitted event.
///
/// `id` is the sequence number the event was appended at. It is unique
/// within one log but not across histories replaced by a full overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub value: String,
}

/// The replicated state: a sequence number and the ordered event log.
///
/// This is also the persisted file layout and the body of the
/// state-replacement and state-fetch messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedState {
    pub sequence_number: u64,
    pub event_log: Vec<Event>,
}

impl ReplicatedState {
    /// Append a value, assigning it the next sequence number
    pub fn append(&mut self, value: String) -> Event {
        self.sequence_number += 1;
        let event = Event {
            id: self.sequence_number,
            value,
        };
        self.event_log.push(event.clone());
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_sequence() {
        let mut state = ReplicatedState::default();
        let first = state.append("a".into());
        let second = state.append("b".into());

        assert_eq!(first, Event { id: 1, value: "a".into() });
        assert_eq!(second.id, 2);
        assert_eq!(state.sequence_number, 2);
        assert_eq!(state.event_log, vec![first, second]);
    }

    #[test]
    fn test_wire_layout() {
        let mut state = ReplicatedState::default();
        state.append("hello".into());

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sequence_number": 1,
                "event_log": [{ "id": 1, "value": "hello" }]
            })
        );
    }
}
