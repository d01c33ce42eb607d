//! HTTP API and WebSocket event stream for viewer sessions.

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::error::AlertError;
use crate::models::{Alert, AlertEvent, AlertStatus};
use crate::registry::ConnectionRegistry;
use crate::service::AlertService;

/// Application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: AlertService,
    pub registry: ConnectionRegistry,
}

/// Messages pushed to a viewer over the WebSocket, tagged by `type`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum WireMessage {
    Snapshot { alerts: Vec<Alert> },
    NewAlert { alert: Alert },
    UpdateAlert { alert: Alert },
    DeleteAlert { id: String },
}

/// Body of a status update request.
#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: String,
}

/// Wrapper mapping domain errors onto HTTP responses with `{"msg": ...}`
/// bodies, preserving the error taxonomy as distinct status codes.
pub struct ApiError(AlertError);

impl From<AlertError> for ApiError {
    fn from(err: AlertError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AlertError::Validation(_)
            | AlertError::InvalidTransition { .. }
            | AlertError::InvalidState(_) => StatusCode::BAD_REQUEST,
            AlertError::NotFound => StatusCode::NOT_FOUND,
            AlertError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "msg": self.0.to_string() }))).into_response()
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route(
            "/api/alerts",
            post(create_alert_handler).get(list_alerts_handler),
        )
        .route(
            "/api/alerts/:id",
            get(get_alert_handler)
                .put(update_status_handler)
                .delete(delete_alert_handler),
        )
        .route("/api/ws", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP server until ctrl-c.
pub async fn run_server(host: &str, port: u16, state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("SOS relay listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

async fn create_alert_handler(
    State(state): State<AppState>,
    Json(input): Json<crate::models::NewAlert>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state.service.submit(input).await?;
    Ok(Json(alert))
}

async fn list_alerts_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let alerts = state.service.list_all().await?;
    Ok(Json(alerts))
}

async fn get_alert_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state.service.get(&id).await?;
    Ok(Json(alert))
}

async fn update_status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Alert>, ApiError> {
    let requested = AlertStatus::from_str(&body.status)?;
    let alert = state.service.change_status(&id, requested).await?;
    Ok(Json(alert))
}

async fn delete_alert_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if uuid::Uuid::parse_str(&id).is_err() {
        return Err(AlertError::Validation("Invalid alert ID format".to_string()).into());
    }

    state.service.remove(&id).await?;
    Ok(Json(serde_json::json!({ "msg": "Alert deleted successfully" })))
}

/// WebSocket upgrade handler.
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// One viewer session: subscribe, snapshot, then stream deltas.
///
/// The subscription is taken out *before* the snapshot read, so an event
/// committed between the two cannot be lost; any delta the snapshot already
/// reflects is discarded by [`filter_event`] instead of delivered twice.
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (session_id, mut rx) = state.registry.register().await;

    let snapshot = match state.service.list_all().await {
        Ok(alerts) => alerts,
        Err(e) => {
            error!("Snapshot read failed for session {}: {}", session_id, e);
            state.registry.unregister(session_id).await;
            return;
        }
    };

    let mut known: HashMap<String, AlertStatus> = snapshot
        .iter()
        .map(|a| (a.id.clone(), a.status))
        .collect();

    if send_wire(&mut sender, &WireMessage::Snapshot { alerts: snapshot })
        .await
        .is_err()
    {
        state.registry.unregister(session_id).await;
        return;
    }

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Some(msg) = filter_event(&mut known, event) {
                            if send_wire(&mut sender, &msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // The client missed events; drop the connection so
                        // it reconnects and takes a fresh snapshot.
                        warn!("Session {} lagged by {} events, disconnecting", session_id, n);
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    state.registry.unregister(session_id).await;
}

async fn send_wire(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &WireMessage,
) -> Result<(), ()> {
    let text = serde_json::to_string(msg).map_err(|_| ())?;
    sender.send(Message::Text(text)).await.map_err(|_| ())
}

/// Decide whether an event still needs forwarding, given what the session
/// already holds: the snapshot it was sent plus every delta forwarded since.
/// Creates and deletes dedupe by id, updates by id + status.
fn filter_event(
    known: &mut HashMap<String, AlertStatus>,
    event: AlertEvent,
) -> Option<WireMessage> {
    match event {
        AlertEvent::Created(alert) => {
            if known.contains_key(&alert.id) {
                return None;
            }
            known.insert(alert.id.clone(), alert.status);
            Some(WireMessage::NewAlert { alert })
        }
        AlertEvent::Updated(alert) => {
            if known.get(&alert.id) == Some(&alert.status) {
                return None;
            }
            known.insert(alert.id.clone(), alert.status);
            Some(WireMessage::UpdateAlert { alert })
        }
        AlertEvent::Deleted(id) => {
            if known.remove(&id).is_none() {
                return None;
            }
            Some(WireMessage::DeleteAlert { id })
        }
    }
}

/// Admin dashboard: live alert list and map, served at `/`.
async fn index_handler() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

const DASHBOARD_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>SOS Relay — Admin Panel</title>
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, 'Segoe UI', Roboto, sans-serif;
            background: #14171c;
            color: #e8eaed;
            height: 100vh;
            display: flex;
            flex-direction: column;
        }
        header {
            display: flex;
            justify-content: space-between;
            align-items: center;
            padding: 12px 20px;
            background: #1c2128;
            border-bottom: 1px solid #2d333b;
        }
        h1 { font-size: 18px; color: #f85149; }
        .conn { font-size: 12px; display: flex; align-items: center; gap: 6px; }
        .dot { width: 8px; height: 8px; border-radius: 50%; background: #f85149; }
        .dot.live { background: #3fb950; }
        main { display: flex; flex: 1; min-height: 0; }
        #map { flex: 1; }
        aside {
            width: 380px;
            overflow-y: auto;
            background: #1c2128;
            border-left: 1px solid #2d333b;
            padding: 12px;
        }
        .alert-card {
            border: 1px solid #2d333b;
            border-left: 4px solid #f85149;
            border-radius: 6px;
            padding: 10px 12px;
            margin-bottom: 10px;
        }
        .alert-card.acknowledged { border-left-color: #d29922; }
        .alert-card.resolved { border-left-color: #3fb950; }
        .alert-card .who { font-weight: 600; }
        .alert-card .when { font-size: 11px; color: #8b949e; }
        .alert-card .msg { margin: 6px 0; font-size: 13px; }
        .alert-card .status { font-size: 11px; text-transform: uppercase; color: #8b949e; }
        .alert-card button {
            margin: 6px 6px 0 0;
            padding: 4px 10px;
            border: 1px solid #2d333b;
            border-radius: 4px;
            background: #22272e;
            color: #e8eaed;
            cursor: pointer;
            font-size: 12px;
        }
        .alert-card button:hover { background: #2d333b; }
        .empty { color: #8b949e; font-size: 13px; padding: 20px; text-align: center; }
    </style>
</head>
<body>
    <header>
        <h1>⚠ SOS Relay</h1>
        <div class="conn"><div class="dot" id="dot"></div><span id="conn-label">Connecting…</span></div>
    </header>
    <main>
        <div id="map"></div>
        <aside><div id="alerts"><div class="empty">Waiting for alerts…</div></div></aside>
    </main>

    <script>
        const alerts = new Map();
        const markers = new Map();
        const map = L.map('map').setView([20, 0], 2);
        L.tileLayer('https://tile.openstreetmap.org/{z}/{x}/{y}.png', {
            attribution: '&copy; OpenStreetMap contributors'
        }).addTo(map);

        function connect() {
            const proto = location.protocol === 'https:' ? 'wss:' : 'ws:';
            const ws = new WebSocket(`${proto}//${location.host}/api/ws`);

            ws.onopen = () => {
                document.getElementById('dot').className = 'dot live';
                document.getElementById('conn-label').textContent = 'Live';
            };
            ws.onclose = () => {
                document.getElementById('dot').className = 'dot';
                document.getElementById('conn-label').textContent = 'Reconnecting…';
                setTimeout(connect, 2000);
            };
            ws.onmessage = (event) => {
                const msg = JSON.parse(event.data);
                switch (msg.type) {
                    case 'snapshot':
                        alerts.clear();
                        msg.alerts.forEach(a => alerts.set(a.id, a));
                        break;
                    case 'new-alert':
                    case 'update-alert':
                        alerts.set(msg.alert.id, msg.alert);
                        break;
                    case 'delete-alert':
                        alerts.delete(msg.id);
                        break;
                }
                render();
            };
        }

        async function setStatus(id, status) {
            await fetch(`/api/alerts/${id}`, {
                method: 'PUT',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ status })
            });
        }

        async function removeAlert(id) {
            const res = await fetch(`/api/alerts/${id}`, { method: 'DELETE' });
            if (!res.ok) {
                const body = await res.json();
                window.alert(body.msg);
            }
        }

        function render() {
            const list = document.getElementById('alerts');
            const sorted = [...alerts.values()]
                .sort((a, b) => new Date(b.createdAt) - new Date(a.createdAt));

            for (const [id, marker] of markers) {
                if (!alerts.has(id)) { map.removeLayer(marker); markers.delete(id); }
            }
            sorted.forEach(a => {
                if (!markers.has(a.id)) {
                    const marker = L.marker([a.location.latitude, a.location.longitude]).addTo(map);
                    markers.set(a.id, marker);
                }
                markers.get(a.id).bindPopup(`<b>${a.userName}</b><br>${a.message}<br><i>${a.status}</i>`);
            });

            if (sorted.length === 0) {
                list.innerHTML = '<div class="empty">No active alerts</div>';
                return;
            }
            list.innerHTML = sorted.map(a => `
                <div class="alert-card ${a.status}">
                    <div class="who">${a.userName}</div>
                    <div class="when">${new Date(a.createdAt).toLocaleString()}</div>
                    <div class="msg">${a.message}</div>
                    <div class="status">${a.status}</div>
                    ${a.status === 'active' ? `<button onclick="setStatus('${a.id}','acknowledged')">Acknowledge</button>` : ''}
                    ${a.status !== 'resolved' ? `<button onclick="setStatus('${a.id}','resolved')">Resolve</button>` : ''}
                    ${a.status === 'resolved' ? `<button onclick="removeAlert('${a.id}')">Delete</button>` : ''}
                </div>
            `).join('');
        }

        connect();
    </script>
</body>
</html>
"#;
