use crate::use_cases::RoomRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    // Owns every live room task and the track catalog they race on.
    pub registry: Arc<RoomRegistry>,
}
