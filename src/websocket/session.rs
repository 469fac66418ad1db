use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::connection::{Connection, ConnectionId, ConnectionState, Frame};
use super::dispatcher::BroadcastDispatcher;
use super::events::ClientMessage;
use crate::AppState;

/// Upgrade handler for the live-update endpoint.
///
/// The connection is registered by the session actor once it starts, so a
/// handshake that never completes leaves nothing behind.
pub async fn websocket_route(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> std::result::Result<HttpResponse, Error> {
    let peer_addr = req.peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    info!("WebSocket connection request from {}", peer_addr);

    let mut response = ws::handshake(&req)?;

    let realtime = &state.config.realtime;
    let (connection, outbound) = Connection::open(peer_addr.clone(), realtime.channel_capacity);

    let session = WebSocketSession {
        id: connection.id(),
        peer_addr,
        state: ConnectionState::Connecting,
        pending: Some(connection),
        outbound: Some(outbound),
        dispatcher: state.dispatcher.clone(),
        heartbeat_interval: realtime.heartbeat_interval(),
        client_timeout: realtime.client_timeout(),
        last_heartbeat: Instant::now(),
    };

    Ok(response.streaming(ws::WebsocketContext::create(session, stream)))
}

/// One actor per open socket. Drains the connection's outbound queue into
/// the socket and relays ephemeral client signals.
pub struct WebSocketSession {
    id: ConnectionId,
    peer_addr: String,
    state: ConnectionState,
    pending: Option<Connection>,
    outbound: Option<mpsc::Receiver<Frame>>,
    dispatcher: Arc<BroadcastDispatcher>,
    heartbeat_interval: Duration,
    client_timeout: Duration,
    last_heartbeat: Instant,
}

impl WebSocketSession {
    fn start_heartbeat(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!("Heartbeat timeout for connection {}", act.id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn handle_text(&mut self, text: &str) {
        match ClientMessage::parse(text) {
            Ok(message) => {
                let event = message.into_event();
                let dispatcher = self.dispatcher.clone();
                // Detached: the pass outlives this session.
                actix_rt::spawn(async move {
                    if let Err(e) = dispatcher.broadcast(&event).await {
                        error!("Failed to relay client signal: {}", e);
                    }
                });
            }
            Err(e) => {
                warn!("Ignoring malformed message from {} ({}): {}", self.peer_addr, self.id, e);
            }
        }
    }

    /// Open -> Closed. Safe to call more than once.
    fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;

        let registry = self.dispatcher.registry().clone();
        let id = self.id;
        actix_rt::spawn(async move {
            registry.unregister(id).await;
        });
    }
}

impl Actor for WebSocketSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        // Connecting -> Open. Nothing else is handled until the registry has it.
        if let Some(connection) = self.pending.take() {
            let registry = self.dispatcher.registry().clone();
            ctx.wait(
                async move { registry.register(connection).await }
                    .into_actor(self)
                    .map(|id, act, _ctx| {
                        act.state = ConnectionState::Open;
                        info!("WebSocket connection established with {} (id: {})", act.peer_addr, id);
                    }),
            );
        }

        if let Some(rx) = self.outbound.take() {
            let frames = futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|frame| (frame, rx))
            });
            ctx.add_stream(frames);
        }

        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.close();
        info!("WebSocket connection closed with {} (id: {})", self.peer_addr, self.id);
    }
}

/// Frames queued by the dispatcher. The stream ends once the registry has
/// dropped this connection, which stops the actor.
impl StreamHandler<Frame> for WebSocketSession {
    fn handle(&mut self, frame: Frame, ctx: &mut Self::Context) {
        ctx.text(frame);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        debug!("Outbound queue closed for connection {}", self.id);
        ctx.stop();
    }
}

impl StreamHandler<std::result::Result<ws::Message, ws::ProtocolError>> for WebSocketSession {
    fn handle(&mut self, msg: std::result::Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        self.last_heartbeat = Instant::now();
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => {
                debug!("Received message from {}: {}", self.peer_addr, text);
                self.handle_text(&text);
            }
            Ok(ws::Message::Binary(bin)) => {
                warn!("Ignoring {} byte binary message from {}", bin.len(), self.peer_addr);
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed from {}: {:?}", self.peer_addr, reason);
                self.close();
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error handling WebSocket message from {}: {}", self.peer_addr, e);
                ctx.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{configure_routes, AppState, Settings};
    use actix_web::{http::StatusCode, test, web, App};

    #[actix_web::test]
    async fn test_unpolled_upgrade_registers_nothing() {
        let state = web::Data::new(AppState::new(Settings::new_for_test().unwrap()).await.unwrap());
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure_routes)).await;

        let req = test::TestRequest::get()
            .uri("/api/v1/questions/ws")
            .insert_header(("upgrade", "websocket"))
            .insert_header(("connection", "Upgrade"))
            .insert_header(("sec-websocket-version", "13"))
            .insert_header(("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ=="))
            .to_request();
        let resp = test::call_service(&app, req).await;

        // Handshake accepted, but the session never ran.
        assert_eq!(resp.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(state.registry.connection_count().await, 0);
    }

    #[actix_web::test]
    async fn test_plain_get_is_not_upgraded() {
        let state = web::Data::new(AppState::new(Settings::new_for_test().unwrap()).await.unwrap());
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure_routes)).await;

        let req = test::TestRequest::get().uri("/api/v1/questions/ws").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.registry.connection_count().await, 0);
    }
}
