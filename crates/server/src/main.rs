//! Local development stand-in for the hosted table service.
//!
//! Serves the REST table surface (`/rest/v1/:table`) and the realtime
//! websocket (`/realtime/v1/websocket`) the board client talks to.

use std::{collections::HashSet, net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use server_api::{insert_messages, list_messages, ApiContext, SelectQuery};
use shared::{
    domain::{Message, NewMessage},
    error::{ApiError, ErrorCode},
    protocol::{RealtimeEvent, RealtimeFrame, ReplyStatus, PHOENIX_TOPIC},
};
use storage::Storage;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    anon_key: String,
    inserts: broadcast::Sender<Message>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InsertBody {
    Many(Vec<NewMessage>),
    One(NewMessage),
}

impl InsertBody {
    fn into_rows(self) -> Vec<NewMessage> {
        match self {
            Self::Many(rows) => rows,
            Self::One(row) => vec![row],
        }
    }
}

#[derive(Debug, Deserialize)]
struct RealtimeQuery {
    apikey: Option<String>,
}

type ApiRejection = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = ApiContext::new(
        storage,
        settings.table.clone(),
        settings.max_message_length,
        settings.insert_rate_limit_per_minute,
    );
    let (inserts, _) = broadcast::channel(256);

    let state = AppState {
        api,
        anon_key: settings.anon_key,
        inserts,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, table = %settings.table, "dev backend listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/rest/v1/:table", get(http_select).post(http_insert))
        .route("/realtime/v1/websocket", get(ws_handler))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, ApiRejection> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiError::new(ErrorCode::Internal, e.to_string())),
            )
        })?;
    Ok("ok")
}

async fn http_select(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Query(query): Query<SelectQuery>,
) -> Result<Json<Vec<Message>>, ApiRejection> {
    authorize(&state, &headers)?;
    let messages = list_messages(&state.api, &table, &query)
        .await
        .map_err(rejection)?;
    debug!(table = %table, count = messages.len(), "select served");
    Ok(Json(messages))
}

async fn http_insert(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(body): Json<InsertBody>,
) -> Result<Response, ApiRejection> {
    authorize(&state, &headers)?;
    let inserted = insert_messages(&state.api, &table, body.into_rows())
        .await
        .map_err(rejection)?;

    for message in &inserted {
        info!(id = message.id.0, table = %table, "row inserted");
        let _ = state.inserts.send(message.clone());
    }

    let wants_representation = headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("return=representation"));
    if wants_representation {
        Ok((StatusCode::CREATED, Json(inserted)).into_response())
    } else {
        Ok(StatusCode::CREATED.into_response())
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiRejection> {
    let apikey = headers.get("apikey").and_then(|v| v.to_str().ok());
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if apikey == Some(state.anon_key.as_str()) || bearer == Some(state.anon_key.as_str()) {
        return Ok(());
    }
    Err((
        StatusCode::UNAUTHORIZED,
        Json(ApiError::new(ErrorCode::Unauthorized, "invalid api key")),
    ))
}

fn rejection(err: ApiError) -> ApiRejection {
    let status = match err.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<RealtimeQuery>,
) -> Response {
    if q.apikey.as_deref() != Some(state.anon_key.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiError::new(ErrorCode::Unauthorized, "invalid api key")),
        )
            .into_response();
    }
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message as WsMessage;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut inserts_rx = state.inserts.subscribe();
    let mut joined_topics: HashSet<String> = HashSet::new();

    loop {
        let outbound = tokio::select! {
            incoming = receiver.next() => {
                let text = match incoming {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        warn!("realtime: receive failed: {err}");
                        break;
                    }
                };
                match serde_json::from_str::<RealtimeFrame>(&text) {
                    Ok(frame) => handle_client_frame(&state, &mut joined_topics, frame),
                    Err(err) => {
                        warn!("realtime: invalid frame: {err}");
                        continue;
                    }
                }
            }
            inserted = inserts_rx.recv() => {
                match inserted {
                    Ok(message) => insert_frames(&state, &joined_topics, &message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "realtime: subscriber lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        for frame in outbound {
            let text = match serde_json::to_string(&frame) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(WsMessage::Text(text)).await.is_err() {
                return;
            }
        }
    }
}

fn handle_client_frame(
    state: &AppState,
    joined_topics: &mut HashSet<String>,
    frame: RealtimeFrame,
) -> Vec<RealtimeFrame> {
    match frame.event {
        RealtimeEvent::Heartbeat if frame.topic == PHOENIX_TOPIC => vec![RealtimeFrame::reply(
            PHOENIX_TOPIC,
            frame.reference,
            ReplyStatus::Ok,
            serde_json::json!({}),
        )],
        RealtimeEvent::PhxJoin => {
            let filters = frame.join_filters();
            if filters.iter().any(|f| f.table != state.api.table) {
                return vec![RealtimeFrame::reply(
                    &frame.topic,
                    frame.reference,
                    ReplyStatus::Error,
                    serde_json::json!({ "reason": "unknown table in postgres_changes filter" }),
                )];
            }
            info!(topic = %frame.topic, "realtime: channel joined");
            joined_topics.insert(frame.topic.clone());
            vec![RealtimeFrame::reply(
                &frame.topic,
                frame.reference,
                ReplyStatus::Ok,
                serde_json::json!({ "postgres_changes": filters }),
            )]
        }
        RealtimeEvent::PhxLeave => {
            joined_topics.remove(&frame.topic);
            vec![RealtimeFrame::reply(
                &frame.topic,
                frame.reference,
                ReplyStatus::Ok,
                serde_json::json!({}),
            )]
        }
        _ => Vec::new(),
    }
}

fn insert_frames(
    state: &AppState,
    joined_topics: &HashSet<String>,
    message: &Message,
) -> Vec<RealtimeFrame> {
    let record = match serde_json::to_value(message) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    joined_topics
        .iter()
        .map(|topic| RealtimeFrame::postgres_insert(topic, &state.api.table, record.clone()))
        .collect()
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
