//! Server-Sent Events stream of the caller's change notifications

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use triage_common::events::{ChangeAction, ChangeType, DatabaseChange};

use crate::{ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    /// Comma-separated entity types, e.g. `customer,actionPlan`
    pub types: Option<String>,
    /// Comma-separated actions, e.g. `created,updated`
    pub actions: Option<String>,
}

/// GET /api/events - SSE stream of the org's database changes
///
/// The bus listener only enqueues onto an unbounded channel; the stream
/// task drains it into SSE frames with a 15 second heartbeat. Dropping
/// the stream drops the subscription, removing the listener.
pub async fn event_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<EventFilter>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let (org, _) = super::authenticate(&state, &headers).await?;
    info!(org = %org.guid, "New SSE client connected to change events");

    let types = parse_list(filter.types.as_deref(), ChangeType::parse);
    let actions = parse_list(filter.actions.as_deref(), ChangeAction::parse);

    let (tx, mut rx) = mpsc::unbounded_channel::<DatabaseChange>();
    let subscription = state.bus.subscribe_to_org(
        org.guid,
        Arc::new(move |change| {
            if let Some(types) = &types {
                if !types.contains(&change.change_type) {
                    return;
                }
            }
            if let Some(actions) = &actions {
                if !actions.contains(&change.action) {
                    return;
                }
            }
            // Receiver gone means the client disconnected; the listener
            // itself is removed when the stream drops the subscription.
            let _ = tx.send(change.clone());
        }),
    );

    let stream = async_stream::stream! {
        // Owned by the stream so client disconnect unsubscribes.
        let _subscription = subscription;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    let Some(change) = received else { break };
                    match serde_json::to_string(&change) {
                        Ok(json) => {
                            yield Ok(Event::default().event(change.key()).data(json));
                        }
                        Err(e) => {
                            warn!(key = %change.key(), "SSE: Failed to serialize change: {}", e);
                        }
                    }
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

/// Parse a comma-separated filter; `None` or empty means no filtering
fn parse_list<T>(raw: Option<&str>, parse: fn(&str) -> Option<T>) -> Option<Vec<T>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    Some(raw.split(',').filter_map(|item| parse(item.trim())).collect())
}

/// Build event stream routes
pub fn event_routes() -> Router<AppState> {
    Router::new().route("/api/events", get(event_stream))
}
