//! Room occupancy DTOs.

use serde::Serialize;
use utoipa::ToSchema;

/// One open room and how many connections are in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoomSummaryDto {
    /// Room name as sent in `join`.
    pub room: String,
    /// Current member count. Always at least 1.
    pub members: usize,
}

/// Response body for `GET /api/v1/rooms`.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomListResponse {
    /// Open rooms sorted by name.
    pub rooms: Vec<RoomSummaryDto>,
    /// Number of open rooms.
    pub total: usize,
}

impl RoomListResponse {
    /// Builds the response from `(room, members)` pairs already in order.
    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (String, usize)>,
    {
        let rooms: Vec<RoomSummaryDto> = counts
            .into_iter()
            .map(|(room, members)| RoomSummaryDto { room, members })
            .collect();
        Self {
            total: rooms.len(),
            rooms,
        }
    }
}
