use crate::domain::{PlayerId, RoomError};
use crate::interface_adapters::protocol::{
    ClientMessage, GameStateDto, ServerMessage, sanitize_color, sanitize_pseudo,
};
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::ids::next_id;
use crate::use_cases::{
    JoinedRoom, Outbound, RaceSnapshot, RoomCommand, RoomEvent, RoomHandle, RoomRegistry,
    RoomSummary,
};

use axum::{
    Error,
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures_util::SinkExt;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::timeout;
use tracing::{Instrument, debug, error, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Failures of one connection; none of them affect the room.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    JoinRequired,
    ClosedBeforeJoin,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

pub async fn snapshot_serializer(
    mut snapshot_rx: broadcast::Receiver<RaceSnapshot>,
    snapshot_bytes_tx: broadcast::Sender<Utf8Bytes>,
    snapshot_latest_tx: watch::Sender<Utf8Bytes>,
) {
    // Serialize each snapshot once and broadcast the shared bytes.
    loop {
        match snapshot_rx.recv().await {
            Ok(snapshot) => {
                let msg = ServerMessage::GameState(GameStateDto::from(snapshot));
                let txt = match serde_json::to_string(&msg) {
                    Ok(txt) => txt,
                    Err(e) => {
                        error!(error = ?e, "failed to serialize race snapshot");
                        continue;
                    }
                };

                let bytes = Utf8Bytes::from(txt);
                // Store the latest bytes for lag recovery, even with no session subscribed yet.
                snapshot_latest_tx.send_replace(bytes.clone());
                let _ = snapshot_bytes_tx.send(bytes);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "snapshot serializer lagged; skipping to latest");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("snapshot channel closed; serializer exiting");
                break;
            }
        }
    }
}

pub fn spawn_room_serializer(room: &RoomHandle) {
    tokio::spawn(snapshot_serializer(
        room.snapshot_tx.subscribe(),
        room.snapshot_bytes_tx.clone(),
        room.snapshot_latest_tx.clone(),
    ));
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

async fn handle_socket(socket: WebSocket, registry: Arc<RoomRegistry>) {
    // Separate connection id for correlating logs; the player id is per connection too.
    let conn_id = next_id();
    let player_id = next_id();
    let span = info_span!("conn", conn_id, player_id);
    run_connection(socket, registry, player_id)
        .instrument(span)
        .await;
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)?;
    Ok(bytes)
}

struct ConnCtx {
    pub player_id: PlayerId,
    pub registry: Arc<RoomRegistry>,
    // Rooms entered over the lifetime of this connection.
    pub rooms_joined: u32,
    // Latest-snapshot resends after the client fell behind.
    pub lag_recovery_count: u64,

    pub msgs_in: u64,
    pub msgs_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,

    pub invalid_json: u32,

    pub last_command_full_log: Instant,
    pub last_snapshot_lag_log: Instant,
    pub last_invalid_input_log: Instant,

    pub close_frame: Option<CloseFrame>,
}

impl ConnCtx {
    fn new(player_id: PlayerId, registry: Arc<RoomRegistry>) -> Self {
        let now = Instant::now() - LOG_THROTTLE;
        Self {
            player_id,
            registry,
            rooms_joined: 0,
            lag_recovery_count: 0,
            msgs_in: 0,
            msgs_out: 0,
            bytes_in: 0,
            bytes_out: 0,
            invalid_json: 0,
            last_command_full_log: now,
            last_snapshot_lag_log: now,
            last_invalid_input_log: now,
            close_frame: None,
        }
    }
}

/// Channels for the room this connection is currently attached to.
struct RoomSession {
    handle: RoomHandle,
    events_rx: broadcast::Receiver<Outbound>,
    snapshot_bytes_rx: broadcast::Receiver<Utf8Bytes>,
    snapshot_latest_rx: watch::Receiver<Utf8Bytes>,
}

impl From<JoinedRoom> for RoomSession {
    fn from(joined: JoinedRoom) -> Self {
        Self {
            snapshot_bytes_rx: joined.handle.snapshot_bytes_tx.subscribe(),
            snapshot_latest_rx: joined.handle.snapshot_latest_tx.subscribe(),
            events_rx: joined.events_rx,
            handle: joined.handle,
        }
    }
}

enum RoomEntry {
    Public,
    CreatePrivate,
    ByCode(String),
}

/// A validated request to enter a room.
struct EntryRequest {
    entry: RoomEntry,
    pseudo: String,
    color: String,
}

impl EntryRequest {
    fn from_message(msg: ClientMessage) -> Option<Self> {
        let (entry, pseudo, color) = match msg {
            ClientMessage::Join { pseudo, color } => (RoomEntry::Public, pseudo, color),
            ClientMessage::CreatePrivateRoom { pseudo, color } => {
                (RoomEntry::CreatePrivate, pseudo, color)
            }
            ClientMessage::JoinByCode {
                code,
                pseudo,
                color,
            } => (RoomEntry::ByCode(code), pseudo, color),
            _ => return None,
        };
        Some(Self {
            entry,
            pseudo: sanitize_pseudo(&pseudo),
            color: sanitize_color(&color),
        })
    }
}

enum LoopControl {
    Continue,
    /// Leave the current room but keep the connection open.
    Detach,
    Disconnect,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const JOIN_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await
        .map_err(NetError::Ws)?;
    socket.close().await.map_err(NetError::Ws)
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

async fn run_connection(mut socket: WebSocket, registry: Arc<RoomRegistry>, player_id: PlayerId) {
    let mut ctx = ConnCtx::new(player_id, registry);

    // The first room request must arrive promptly; later ones may take as long as the menu does.
    let first = match timeout(
        JOIN_HANDSHAKE_TIMEOUT,
        read_room_entry(&mut socket, &mut ctx, true),
    )
    .await
    {
        Ok(Ok(request)) => request,
        Ok(Err(NetError::ClosedBeforeJoin)) => {
            info!("client disconnected before join handshake");
            return;
        }
        Ok(Err(e)) => {
            warn!(error = ?e, "join handshake failed");
            return;
        }
        Err(_) => {
            let _ = send_close_with_reason(&mut socket, close_code::POLICY, "join timeout").await;
            info!("join handshake timed out");
            return;
        }
    };
    info!("client connected");

    let mut pending = Some(first);
    loop {
        let request = match pending.take() {
            Some(request) => request,
            None => match read_room_entry(&mut socket, &mut ctx, false).await {
                Ok(request) => request,
                Err(NetError::ClosedBeforeJoin) => break,
                Err(e) => {
                    warn!(error = ?e, "failed to read room request");
                    break;
                }
            },
        };

        let session = match enter_room(&ctx.registry, player_id, request).await {
            Ok(session) => session,
            Err(err) => {
                info!(reason = err.reason(), "room entry rejected");
                let msg = ServerMessage::Error {
                    reason: err.reason(),
                };
                match send_message(&mut socket, &msg).await {
                    Ok(bytes) => {
                        ctx.msgs_out += 1;
                        ctx.bytes_out += bytes as u64;
                        continue;
                    }
                    Err(_) => break,
                }
            }
        };
        ctx.rooms_joined += 1;

        match run_room_loop(&mut socket, &mut ctx, session).await {
            Ok(LoopControl::Detach) | Ok(LoopControl::Continue) => continue,
            Ok(LoopControl::Disconnect) => break,
            Err(e) => {
                warn!(error = ?e, "client loop exited with error");
                break;
            }
        }
    }

    if let Some(frame) = ctx.close_frame.take() {
        let _ = socket.send(Message::Close(Some(frame))).await;
    }
    if let Err(err) = socket.close().await.map_err(NetError::Ws) {
        debug!(error = ?err, "socket close error");
    }

    debug!(
        msgs_in = ctx.msgs_in,
        msgs_out = ctx.msgs_out,
        bytes_in = ctx.bytes_in,
        bytes_out = ctx.bytes_out,
        invalid_json = ctx.invalid_json,
        lag_recovery_count = ctx.lag_recovery_count,
        rooms_joined = ctx.rooms_joined,
        "connection stats"
    );
    info!("client disconnected");
}

/// Waits for `Join`, `CreatePrivateRoom` or `JoinByCode`.
///
/// In `strict` mode (the opening handshake) anything else closes the connection. Between
/// rooms, stray room commands are dropped since they may have been in flight.
async fn read_room_entry(
    socket: &mut WebSocket,
    ctx: &mut ConnCtx,
    strict: bool,
) -> Result<EntryRequest, NetError> {
    loop {
        let Some(incoming) = socket.recv().await else {
            return Err(NetError::ClosedBeforeJoin);
        };

        let message = incoming.map_err(NetError::Ws)?;
        match message {
            Message::Text(text) => {
                ctx.msgs_in += 1;
                ctx.bytes_in += text.len() as u64;

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => {
                        if let Some(request) = EntryRequest::from_message(msg) {
                            return Ok(request);
                        }
                        if strict {
                            let _ = send_close_with_reason(socket, close_code::POLICY, "join required")
                                .await;
                            return Err(NetError::JoinRequired);
                        }
                        debug!("room command outside a room dropped");
                    }
                    Err(parse_err) if strict => {
                        debug!(error = %parse_err, "invalid join payload");
                        let _ =
                            send_close_with_reason(socket, close_code::POLICY, "invalid join payload")
                                .await;
                        return Err(NetError::JoinRequired);
                    }
                    Err(parse_err) => {
                        ctx.invalid_json += 1;
                        if should_log(&mut ctx.last_invalid_input_log) {
                            warn!(error = %parse_err, "failed to parse client message");
                        }
                        if ctx.invalid_json > MAX_INVALID_JSON {
                            let _ = send_close_with_reason(
                                socket,
                                close_code::POLICY,
                                "too many invalid messages",
                            )
                            .await;
                            return Err(NetError::JoinRequired);
                        }
                    }
                }
            }
            Message::Binary(_) => {
                let _ = send_close_with_reason(
                    socket,
                    close_code::UNSUPPORTED,
                    "binary messages not supported",
                )
                .await;
                return Err(NetError::JoinRequired);
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return Err(NetError::ClosedBeforeJoin),
        }
    }
}

async fn enter_room(
    registry: &Arc<RoomRegistry>,
    player_id: PlayerId,
    request: EntryRequest,
) -> Result<RoomSession, RoomError> {
    let EntryRequest {
        entry,
        pseudo,
        color,
    } = request;
    let joined = match entry {
        RoomEntry::Public => registry.join_public(player_id, &pseudo, &color).await?,
        RoomEntry::CreatePrivate => registry.create_private(player_id, &pseudo, &color).await?,
        RoomEntry::ByCode(code) => {
            registry
                .join_by_code(&code, player_id, &pseudo, &color)
                .await?
        }
    };

    if joined.created {
        // New rooms need a serializer before the first race and a reaper for teardown.
        spawn_room_serializer(&joined.handle);
        registry.clone().spawn_room_reaper(joined.handle.clone());
    }
    info!(room_id = %joined.handle.room_id, pseudo = %pseudo, "entered room");
    Ok(RoomSession::from(joined))
}

async fn run_room_loop(
    socket: &mut WebSocket,
    ctx: &mut ConnCtx,
    session: RoomSession,
) -> Result<LoopControl, NetError> {
    let RoomSession {
        handle,
        mut events_rx,
        mut snapshot_bytes_rx,
        snapshot_latest_rx,
    } = session;

    // Split borrows so `tokio::select!` can hold them concurrently.
    let ConnCtx {
        player_id,
        lag_recovery_count,
        msgs_in,
        msgs_out,
        bytes_in,
        bytes_out,
        invalid_json,
        last_command_full_log,
        last_snapshot_lag_log,
        last_invalid_input_log,
        close_frame,
        ..
    } = ctx;
    let player_id = *player_id;
    let command_tx = &handle.command_tx;

    let outcome = loop {
        let step: Result<LoopControl, NetError> = tokio::select! {
            // Incoming Message from Client
            incoming = socket.recv() => {
                handle_incoming_ws(
                    incoming,
                    player_id,
                    command_tx,
                    msgs_in,
                    bytes_in,
                    invalid_json,
                    last_command_full_log,
                    last_invalid_input_log,
                    close_frame,
                ).await
            }

            // Outgoing Room Event
            event = events_rx.recv() => {
                match event {
                    Ok(outbound) => Ok(forward_event(&outbound, player_id, socket, msgs_out, bytes_out).await),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "room events lagged");
                        Ok(after_event_lag(&handle.summary(), player_id))
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(room_id = %handle.room_id, "room closed under the player");
                        Ok(LoopControl::Detach)
                    }
                }
            }

            // Outgoing Race Snapshot
            snapshot = snapshot_bytes_rx.recv() => {
                match snapshot {
                    Ok(bytes) => Ok(forward_snapshot_bytes(bytes, socket, msgs_out, bytes_out).await),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        if should_log(last_snapshot_lag_log) {
                            warn!(missed = n, "snapshots lagged; sending latest");
                        }

                        // Resync strategy: send the latest snapshot.
                        let latest = snapshot_latest_rx.borrow().clone();
                        if latest.is_empty() {
                            Ok(LoopControl::Continue)
                        } else {
                            *lag_recovery_count += 1;
                            Ok(forward_snapshot_bytes(latest, socket, msgs_out, bytes_out).await)
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => Ok(LoopControl::Detach),
                }
            }
        };

        match step {
            Ok(LoopControl::Continue) => continue,
            other => break other,
        }
    };

    if matches!(outcome, Ok(LoopControl::Disconnect) | Err(_)) {
        // A dropped connection is an implicit leave.
        if handle
            .command_tx
            .send(RoomCommand::Leave { player_id })
            .await
            .is_err()
        {
            debug!(room_id = %handle.room_id, "room already gone on disconnect");
        }
    }
    outcome
}

#[allow(clippy::too_many_arguments)]
async fn handle_incoming_ws(
    incoming: Option<Result<Message, Error>>,
    player_id: PlayerId,
    command_tx: &mpsc::Sender<RoomCommand>,
    msgs_in: &mut u64,
    bytes_in: &mut u64,
    invalid_json: &mut u32,
    last_command_full_log: &mut Instant,
    last_invalid_input_log: &mut Instant,
    close_frame: &mut Option<CloseFrame>,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                *msgs_in += 1;
                *bytes_in += text.len() as u64;

                let msg = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => msg,
                    Err(parse_err) => {
                        *invalid_json += 1;
                        if should_log(last_invalid_input_log) {
                            warn!(
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse client message"
                            );
                        }

                        if *invalid_json > MAX_INVALID_JSON {
                            *close_frame = Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "too many invalid messages".into(),
                            });
                            return Ok(LoopControl::Disconnect);
                        }
                        return Ok(LoopControl::Continue);
                    }
                };

                let command = match msg {
                    ClientMessage::Join { .. }
                    | ClientMessage::CreatePrivateRoom { .. }
                    | ClientMessage::JoinByCode { .. } => {
                        if should_log(last_invalid_input_log) {
                            warn!("room request while already in a room ignored");
                        }
                        return Ok(LoopControl::Continue);
                    }
                    ClientMessage::Input(input) => {
                        // Inputs are latest-wins, so a full channel may drop them.
                        let command = RoomCommand::Input {
                            player_id,
                            input: input.into(),
                            use_item: input.use_item,
                        };
                        return match command_tx.try_send(command) {
                            Ok(()) => Ok(LoopControl::Continue),
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                if should_log(last_command_full_log) {
                                    warn!("room command channel full; dropping input");
                                }
                                Ok(LoopControl::Continue)
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => Ok(LoopControl::Detach),
                        };
                    }
                    ClientMessage::SetReady => RoomCommand::SetReady { player_id },
                    ClientMessage::HostStart => RoomCommand::HostStart { player_id },
                    ClientMessage::SelectMap { map_id } => RoomCommand::SelectMap { player_id, map_id },
                    ClientMessage::ChangeColor { color } => RoomCommand::ChangeColor {
                        player_id,
                        color: sanitize_color(&color),
                    },
                    ClientMessage::VoteRematch => RoomCommand::VoteRematch { player_id },
                    ClientMessage::LeaveResults => RoomCommand::LeaveResults { player_id },
                };

                let leaving = matches!(command, RoomCommand::LeaveResults { .. });
                if command_tx.send(command).await.is_err() {
                    return Ok(LoopControl::Detach);
                }
                if leaving {
                    info!("left room");
                    return Ok(LoopControl::Detach);
                }
                Ok(LoopControl::Continue)
            }
            Message::Binary(_) => {
                *close_frame = Some(CloseFrame {
                    code: close_code::UNSUPPORTED,
                    reason: "binary messages not supported".into(),
                });
                Ok(LoopControl::Disconnect)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(LoopControl::Continue),
            Message::Close(_) => Ok(LoopControl::Disconnect),
        },
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!("websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

/// Lost events may have included a kick or the room closing; the summary says which.
fn after_event_lag(summary: &RoomSummary, player_id: PlayerId) -> LoopControl {
    if summary.has_member(player_id) {
        LoopControl::Continue
    } else {
        info!(room_id = %summary.room_id, "no longer in room after lag; detaching");
        LoopControl::Detach
    }
}

/// Sends a room event if it is addressed to this player. Being kicked detaches the session.
async fn forward_event(
    outbound: &Outbound,
    player_id: PlayerId,
    socket: &mut WebSocket,
    msgs_out: &mut u64,
    bytes_out: &mut u64,
) -> LoopControl {
    if !outbound.audience.includes(player_id) {
        return LoopControl::Continue;
    }

    for msg in ServerMessage::from_event(&outbound.event) {
        match send_message(socket, &msg).await {
            Ok(bytes) => {
                *msgs_out += 1;
                *bytes_out += bytes as u64;
            }
            Err(err) => {
                warn!(error = ?err, "failed to send room event");
                return LoopControl::Disconnect;
            }
        }
    }

    if let RoomEvent::Kicked { reason } = outbound.event {
        info!(reason, "kicked from room");
        return LoopControl::Detach;
    }
    LoopControl::Continue
}

async fn forward_snapshot_bytes(
    snapshot: Utf8Bytes,
    socket: &mut WebSocket,
    msgs_out: &mut u64,
    bytes_out: &mut u64,
) -> LoopControl {
    let bytes_len = snapshot.len();
    match socket
        .send(Message::Text(snapshot))
        .await
        .map_err(NetError::Ws)
    {
        Ok(()) => {
            *msgs_out += 1;
            *bytes_out += bytes_len as u64;
            LoopControl::Continue
        }
        Err(err) => {
            warn!(error = ?err, "failed to send race snapshot");
            LoopControl::Disconnect
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::RoomPhase;

    fn summary(members: Vec<PlayerId>, closed: bool) -> RoomSummary {
        RoomSummary {
            room_id: Arc::from("ABC123"),
            private: false,
            phase: RoomPhase::Ended,
            players: members.len(),
            capacity: 8,
            members,
            closed,
        }
    }

    #[test]
    fn when_events_lag_and_player_was_kicked_then_session_detaches() {
        assert!(matches!(
            after_event_lag(&summary(vec![2, 3], false), 1),
            LoopControl::Detach
        ));
    }

    #[test]
    fn when_events_lag_and_room_closed_then_session_detaches() {
        assert!(matches!(
            after_event_lag(&summary(vec![1], true), 1),
            LoopControl::Detach
        ));
    }

    #[test]
    fn when_events_lag_and_player_is_still_in_room_then_session_continues() {
        assert!(matches!(
            after_event_lag(&summary(vec![1, 2], false), 1),
            LoopControl::Continue
        ));
    }
}
