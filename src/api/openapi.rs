//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use super::dto::{RoomListResponse, RoomSummaryDto};
use super::handlers::{rooms, system};
use crate::error::{ErrorBody, ErrorResponse};

/// Generated OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "chat-relay", description = "Room occupancy and health endpoints."),
    paths(system::health_handler, rooms::list_rooms, rooms::get_room),
    components(schemas(
        system::HealthResponse,
        RoomListResponse,
        RoomSummaryDto,
        ErrorResponse,
        ErrorBody
    )),
    tags(
        (name = "System", description = "Liveness"),
        (name = "Rooms", description = "Open rooms and their member counts")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_rest_paths() {
        let doc = ApiDoc::openapi();
        for path in ["/health", "/api/v1/rooms", "/api/v1/rooms/{room}"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
