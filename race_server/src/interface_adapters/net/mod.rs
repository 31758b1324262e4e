// Network adapter modules split by WebSocket sessions vs plain HTTP routes.

pub mod client;
pub mod internal;

pub use client::{spawn_room_serializer, ws_handler};
pub use internal::{list_maps_handler, list_rooms_handler, not_found_handler};
