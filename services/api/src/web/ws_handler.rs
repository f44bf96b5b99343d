//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! Each subscribed topic owns one live collection and one forwarding task; the
//! control loop only starts and cancels those tasks.

use crate::web::{
    protocol::{ClientMessage, ServerMessage, Topic},
    rules::Caller,
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use station_fit_core::domain::Identity;
use station_fit_core::live::{LiveCollection, ViewState};
use station_fit_core::ports::{DocumentStore, PortResult};
use station_fit_core::session::Session;
use station_fit_core::views;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Extension(identity): Extension<Identity>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, session, identity))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, session: Session, identity: Identity) {
    info!(uid = %session.uid(), "New WebSocket connection established");

    // The sender is shared by every forwarding task.
    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));
    let store = app_state.store_for(Caller::from(&session));
    let mut subscriptions: HashMap<Topic, CancellationToken> = HashMap::new();

    // --- Main Message Loop ---
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_text_message(
                    text.as_str(),
                    &app_state,
                    &store,
                    &identity,
                    &ws_sender,
                    &mut subscriptions,
                )
                .await;
            }
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive failed: {}", e);
                break;
            }
        }
    }

    // --- Cleanup ---
    for (_, token) in subscriptions.drain() {
        token.cancel();
    }
    info!(uid = %session.uid(), "WebSocket connection closed.");
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_text_message(
    text: &str,
    app_state: &Arc<AppState>,
    store: &Arc<dyn DocumentStore>,
    identity: &Identity,
    ws_sender: &WsSender,
    subscriptions: &mut HashMap<Topic, CancellationToken>,
) {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            send(ws_sender, &ServerMessage::Error { message: format!("Malformed message: {}", e) }).await;
            return;
        }
    };

    match client_msg {
        ClientMessage::Subscribe { topic } => {
            let running = subscriptions.get(&topic).map_or(false, |t| !t.is_cancelled());
            if running {
                debug!(?topic, "Already subscribed");
                return;
            }
            let token = CancellationToken::new();
            match open_topic(&topic, app_state, store, identity, ws_sender, token.clone()).await {
                Ok(()) => {
                    info!(?topic, "Subscribed");
                    subscriptions.insert(topic, token);
                }
                Err(e) => {
                    warn!(?topic, "Subscription failed: {}", e);
                    send(ws_sender, &ServerMessage::Error { message: e.to_string() }).await;
                }
            }
        }
        ClientMessage::Unsubscribe { topic } => {
            if let Some(token) = subscriptions.remove(&topic) {
                token.cancel();
            }
            send(ws_sender, &ServerMessage::Unsubscribed { topic }).await;
        }
    }
}

/// Opens the live collection behind `topic` and starts forwarding its snapshots.
async fn open_topic(
    topic: &Topic,
    app_state: &Arc<AppState>,
    store: &Arc<dyn DocumentStore>,
    identity: &Identity,
    ws_sender: &WsSender,
    token: CancellationToken,
) -> PortResult<()> {
    let store = store.clone();
    match topic {
        Topic::Standards { tier } => {
            let live = views::open_standards(store, *tier).await?;
            spawn_forwarder(topic.clone(), live, ws_sender.clone(), token).await;
        }
        Topic::Messages => {
            let live = views::open_messages(store).await?;
            spawn_forwarder(topic.clone(), live, ws_sender.clone(), token).await;
        }
        Topic::WeeklyBoard { week_id } => {
            let live = views::open_weekly_board(store, week_id).await?;
            spawn_forwarder(topic.clone(), live, ws_sender.clone(), token).await;
        }
        Topic::MonthlyBoard { month_id } => {
            let live = views::open_monthly_board(store, month_id).await?;
            spawn_forwarder(topic.clone(), live, ws_sender.clone(), token).await;
        }
        Topic::Roster { .. } => {
            let filter = topic.roster_filter().unwrap_or_default();
            let live = views::open_roster(store, filter).await?;
            spawn_forwarder(topic.clone(), live, ws_sender.clone(), token).await;
        }
        Topic::Profile => {
            let live = app_state.resolver_for(&identity.uid).watch(identity).await?;
            spawn_forwarder(topic.clone(), live, ws_sender.clone(), token).await;
        }
    }
    Ok(())
}

/// Acknowledges the subscription, then sends the current view and every later one
/// until the token is cancelled, the listener ends or the client goes away.
async fn spawn_forwarder<V>(topic: Topic, mut live: LiveCollection<V>, ws_sender: WsSender, token: CancellationToken)
where
    V: Serialize + Clone + Send + Sync + 'static,
{
    send(&ws_sender, &ServerMessage::Subscribed { topic: topic.clone() }).await;
    tokio::spawn(async move {
        let mut state = live.current();
        loop {
            if !send(&ws_sender, &snapshot(&topic, &state)).await {
                break;
            }
            tokio::select! {
                _ = token.cancelled() => break,
                next = live.changed() => match next {
                    Some(next) => state = next,
                    None => break,
                },
            }
        }
        // Lets a later subscribe to the same topic start afresh.
        token.cancel();
        debug!(?topic, "Forwarder stopped");
    });
}

fn snapshot<V: Serialize>(topic: &Topic, state: &ViewState<V>) -> ServerMessage {
    let (view, error) = match state.view.as_ref().map(serde_json::to_value).transpose() {
        Ok(view) => (view, state.error.clone()),
        Err(e) => (None, Some(format!("Failed to encode view: {}", e))),
    };
    ServerMessage::Snapshot {
        topic: topic.clone(),
        view,
        error,
        loading: state.loading,
        plan: state.plan,
        used_fallback: state.used_fallback,
    }
}

/// Sends one message. Returns false once the socket is gone.
async fn send(ws_sender: &WsSender, msg: &ServerMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return true;
        }
    };
    ws_sender.lock().await.send(Message::Text(json.into())).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use station_fit_core::live::QueryPlan;
    use station_fit_core::domain::Tier;

    #[test]
    fn snapshot_carries_the_view_and_its_plan() {
        let topic = Topic::Standards { tier: Tier::Elite };
        let state = ViewState {
            view: Some(vec!["Pull-ups".to_string()]),
            error: None,
            loading: false,
            plan: QueryPlan::ClientSorted,
            used_fallback: true,
        };
        let json = serde_json::to_value(snapshot(&topic, &state)).unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["topic"]["name"], "standards");
        assert_eq!(json["topic"]["tier"], "elite");
        assert_eq!(json["view"][0], "Pull-ups");
        assert_eq!(json["plan"], "client_sorted");
        assert_eq!(json["used_fallback"], true);
    }

    #[test]
    fn snapshot_keeps_the_last_view_next_to_an_error() {
        let state = ViewState {
            view: Some(3u32),
            error: Some("backend unavailable".to_string()),
            loading: false,
            plan: QueryPlan::Indexed,
            used_fallback: false,
        };
        let json = serde_json::to_value(snapshot(&Topic::Messages, &state)).unwrap();
        assert_eq!(json["view"], 3);
        assert_eq!(json["error"], "backend unavailable");
    }
}
