//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for live views. A client subscribes to topics; the server answers with a fresh
//! snapshot of the topic's view every time the underlying collection changes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use station_fit_core::domain::{Role, Tier};
use station_fit_core::live::QueryPlan;
use station_fit_core::views::RosterFilter;

//=========================================================================================
// Topics
//=========================================================================================

/// A live view a client can subscribe to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Topic {
    /// One tier of the standards catalog, in display order.
    Standards { tier: Tier },
    /// The announcement board, pinned first.
    Messages,
    WeeklyBoard { week_id: String },
    MonthlyBoard { month_id: String },
    Roster {
        #[serde(default)]
        role: Option<Role>,
        #[serde(default)]
        tier: Option<Tier>,
        #[serde(default)]
        shift: Option<String>,
    },
    /// The caller's own profile, so role changes show up without signing in again.
    Profile,
}

impl Topic {
    pub fn roster_filter(&self) -> Option<RosterFilter> {
        match self {
            Topic::Roster { role, tier, shift } => Some(RosterFilter {
                role: *role,
                tier: *tier,
                shift: shift.clone(),
            }),
            _ => None,
        }
    }
}

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start streaming a topic. Subscribing twice to the same topic is a no-op.
    Subscribe { topic: Topic },
    Unsubscribe { topic: Topic },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The topic's listener is open; snapshots follow.
    Subscribed { topic: Topic },

    Unsubscribed { topic: Topic },

    /// The current view of a topic. `view` keeps the last good value while `error`
    /// reports a failing listener.
    Snapshot {
        topic: Topic,
        view: Option<Value>,
        error: Option<String>,
        loading: bool,
        plan: QueryPlan,
        used_fallback: bool,
    },

    /// A message could not be handled. The connection stays open.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_parses_nested_topic() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"subscribe","topic":{"name":"weekly_board","week_id":"2024-W07"}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Subscribe { topic } => {
                assert_eq!(topic, Topic::WeeklyBoard { week_id: "2024-W07".to_string() })
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn roster_filter_fields_are_optional() {
        let topic: Topic = serde_json::from_str(r#"{"name":"roster","role":"mentor"}"#).unwrap();
        let filter = topic.roster_filter().unwrap();
        assert_eq!(filter.role, Some(Role::Mentor));
        assert!(filter.tier.is_none());
        assert!(filter.shift.is_none());
        assert!(Topic::Messages.roster_filter().is_none());
    }

    #[test]
    fn unknown_topic_is_rejected() {
        let parsed = serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe","topic":{"name":"payroll"}}"#);
        assert!(parsed.is_err());
    }
}
