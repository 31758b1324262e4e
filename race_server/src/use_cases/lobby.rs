// Room orchestration: spawning room tasks, public matchmaking and joining by code.

use crate::domain::{PlayerId, RoomError, TrackCatalog, Tuning};
use crate::use_cases::game::{RoomOutputs, room_task};
use crate::use_cases::room::Room;
use crate::use_cases::types::{Outbound, RaceSnapshot, RoomCommand, RoomSettings, RoomSummary};
use axum::extract::ws::Utf8Bytes;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock, broadcast, mpsc, oneshot, watch};
use tracing::{debug, info};

/// Alphabet for room codes.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const ROOM_CODE_LEN: usize = 6;

/// Per-room channels. Cloned into every session attached to the room.
#[derive(Clone)]
pub struct RoomHandle {
    /// Also the room code players join with.
    pub room_id: Arc<str>,
    pub private: bool,
    /// Commands into the room task.
    pub command_tx: mpsc::Sender<RoomCommand>,
    /// Addressed room events; sessions filter by audience.
    pub events_tx: broadcast::Sender<Outbound>,
    /// Broadcast sender for raw race snapshots.
    pub snapshot_tx: broadcast::Sender<RaceSnapshot>,
    /// Broadcast sender for serialized race snapshots.
    pub snapshot_bytes_tx: broadcast::Sender<Utf8Bytes>,
    /// Watch sender holding the latest serialized snapshot for lag recovery.
    pub snapshot_latest_tx: watch::Sender<Utf8Bytes>,
    /// Coarse room state for matchmaking and listings.
    pub summary_tx: watch::Sender<RoomSummary>,
    shutdown: Arc<Notify>,
}

impl RoomHandle {
    pub fn summary(&self) -> RoomSummary {
        self.summary_tx.borrow().clone()
    }
}

/// A successful join: the room, and a receiver subscribed before the join was applied.
#[derive(Debug)]
pub struct JoinedRoom {
    pub handle: RoomHandle,
    pub events_rx: broadcast::Receiver<Outbound>,
    /// The room was spawned for this join; the caller wires up its serializer.
    pub created: bool,
}

/// Thread-safe registry for active rooms.
#[derive(Debug)]
pub struct RoomRegistry {
    /// Settings applied to newly created rooms.
    settings: RoomSettings,
    tuning: Tuning,
    catalog: Arc<TrackCatalog>,
    /// Room id to active handle.
    rooms: RwLock<HashMap<String, RoomHandle>>,
}

impl std::fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandle")
            .field("room_id", &self.room_id)
            .field("private", &self.private)
            .finish_non_exhaustive()
    }
}

impl RoomRegistry {
    pub fn new(settings: RoomSettings, tuning: Tuning, catalog: Arc<TrackCatalog>) -> Self {
        Self {
            settings,
            tuning,
            catalog,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<TrackCatalog> {
        &self.catalog
    }

    /// Joins the first open public room with space, or opens a new one.
    pub async fn join_public(
        &self,
        player_id: PlayerId,
        pseudo: &str,
        color: &str,
    ) -> Result<JoinedRoom, RoomError> {
        for handle in self.joinable_public_rooms().await {
            match join_room(&handle, player_id, pseudo, color).await {
                Ok(events_rx) => {
                    return Ok(JoinedRoom {
                        handle,
                        events_rx,
                        created: false,
                    });
                }
                // Lost a race against another joiner or the room's own lifecycle.
                Err(RoomError::RoomFull | RoomError::AlreadyStarted | RoomError::RoomClosed) => {
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        let handle = self.create_room(false).await;
        let events_rx = join_room(&handle, player_id, pseudo, color).await?;
        Ok(JoinedRoom {
            handle,
            events_rx,
            created: true,
        })
    }

    /// Opens a private room under a fresh code and joins it as host.
    pub async fn create_private(
        &self,
        player_id: PlayerId,
        pseudo: &str,
        color: &str,
    ) -> Result<JoinedRoom, RoomError> {
        let handle = self.create_room(true).await;
        let events_rx = join_room(&handle, player_id, pseudo, color).await?;
        Ok(JoinedRoom {
            handle,
            events_rx,
            created: true,
        })
    }

    /// Joins a room by its code. Codes are case-insensitive.
    pub async fn join_by_code(
        &self,
        code: &str,
        player_id: PlayerId,
        pseudo: &str,
        color: &str,
    ) -> Result<JoinedRoom, RoomError> {
        let code = code.trim().to_ascii_uppercase();
        let handle = self.get_room(&code).await.ok_or(RoomError::RoomNotFound)?;
        let events_rx = join_room(&handle, player_id, pseudo, color).await?;
        Ok(JoinedRoom {
            handle,
            events_rx,
            created: false,
        })
    }

    /// Returns a room handle for the provided id, if it exists.
    pub async fn get_room(&self, room_id: &str) -> Option<RoomHandle> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).cloned()
    }

    /// Open public rooms in any phase, ordered by code.
    pub async fn list_public(&self) -> Vec<RoomSummary> {
        let rooms = self.rooms.read().await;
        let mut listed: Vec<RoomSummary> = rooms
            .values()
            .filter(|h| !h.private)
            .map(RoomHandle::summary)
            .filter(|s| !s.closed)
            .collect();
        listed.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        listed
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    async fn joinable_public_rooms(&self) -> Vec<RoomHandle> {
        let rooms = self.rooms.read().await;
        let mut open: Vec<(RoomSummary, RoomHandle)> = rooms
            .values()
            .filter(|h| !h.private)
            .map(|h| (h.summary(), h.clone()))
            .filter(|(s, _)| s.is_joinable())
            .collect();
        // Fill the fullest room first so players end up together.
        open.sort_by(|(a, _), (b, _)| b.players.cmp(&a.players).then(a.room_id.cmp(&b.room_id)));
        open.into_iter().map(|(_, h)| h).collect()
    }

    /// Creates a room and spawns its task. The room closes itself once its last player leaves.
    async fn create_room(&self, private: bool) -> RoomHandle {
        let mut rooms = self.rooms.write().await;
        let room_id = {
            let mut rng = rand::rng();
            loop {
                let candidate = room_code(&mut rng);
                if !rooms.contains_key(&candidate) {
                    break candidate;
                }
            }
        };

        let room = Room::new(
            room_id.as_str(),
            private,
            self.settings.clone(),
            self.tuning,
            self.catalog.clone(),
        );

        // Channel wiring for the room task.
        let (command_tx, command_rx) =
            mpsc::channel::<RoomCommand>(self.settings.command_channel_capacity);
        let (events_tx, _events_rx) =
            broadcast::channel::<Outbound>(self.settings.broadcast_capacity);
        let (snapshot_tx, _snapshot_rx) =
            broadcast::channel::<RaceSnapshot>(self.settings.broadcast_capacity);
        let (snapshot_bytes_tx, _snapshot_bytes_rx) =
            broadcast::channel::<Utf8Bytes>(self.settings.broadcast_capacity);
        let (snapshot_latest_tx, _snapshot_latest_rx) =
            watch::channel::<Utf8Bytes>(Utf8Bytes::from(""));
        let (summary_tx, _summary_rx) = watch::channel::<RoomSummary>(room.summary());
        let shutdown = Arc::new(Notify::new());

        tokio::spawn(room_task(
            room,
            command_rx,
            RoomOutputs {
                events_tx: events_tx.clone(),
                snapshot_tx: snapshot_tx.clone(),
                summary_tx: summary_tx.clone(),
            },
            self.settings.tick_interval,
            shutdown.clone(),
        ));

        let handle = RoomHandle {
            room_id: Arc::from(room_id.as_str()),
            private,
            command_tx,
            events_tx,
            snapshot_tx,
            snapshot_bytes_tx,
            snapshot_latest_tx,
            summary_tx,
            shutdown,
        };
        info!(room_id = %room_id, private, "room created");
        rooms.insert(room_id, handle.clone());
        handle
    }

    /// Drops the room from the registry once its task reports it closed.
    pub fn spawn_room_reaper(self: Arc<Self>, handle: RoomHandle) {
        let mut summary_rx = handle.summary_tx.subscribe();
        tokio::spawn(async move {
            // Sender dropped means the task is gone too.
            let _ = summary_rx.wait_for(|s| s.closed).await;
            self.remove_room(&handle).await;
        });
    }

    async fn remove_room(&self, handle: &RoomHandle) {
        let mut rooms = self.rooms.write().await;
        // Only remove the exact room this reaper was watching.
        let same_room = rooms
            .get(handle.room_id.as_ref())
            .is_some_and(|current| current.command_tx.same_channel(&handle.command_tx));
        if same_room {
            rooms.remove(handle.room_id.as_ref());
            debug!(room_id = %handle.room_id, "room removed from registry");
        }
    }

    /// Stops every room task; used on server shutdown.
    pub async fn shutdown_all(&self) {
        let rooms = self.rooms.read().await;
        for handle in rooms.values() {
            handle.shutdown.notify_one();
        }
    }
}

/// Subscribes to the room's events, then asks the room task to admit the player.
async fn join_room(
    handle: &RoomHandle,
    player_id: PlayerId,
    pseudo: &str,
    color: &str,
) -> Result<broadcast::Receiver<Outbound>, RoomError> {
    let events_rx = handle.events_tx.subscribe();
    let (reply, reply_rx) = oneshot::channel();
    handle
        .command_tx
        .send(RoomCommand::Join {
            player_id,
            pseudo: pseudo.to_string(),
            color: color.to_string(),
            reply,
        })
        .await
        .map_err(|_| RoomError::RoomClosed)?;
    reply_rx.await.map_err(|_| RoomError::RoomClosed)??;
    Ok(events_rx)
}

/// Generates a room code from `A-Z0-9`.
pub fn room_code<R: Rng>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}
