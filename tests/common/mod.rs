//! Wire fixtures shared by the integration tests.
#![allow(dead_code)]

use serde_json::{json, Value};

pub fn notification_json(id: i64, is_read: bool) -> Value {
    json!({
        "id": id,
        "isRead": is_read,
        "createdAt": format!("2024-05-01T12:{:02}:00Z", id % 60),
        "title": format!("notification {id}"),
        "type": "GENERATE_QUIZ_SUCCESS",
    })
}

pub fn page_json(ids: &[i64], current_page: u32, total_pages: u32) -> Value {
    json!({
        "items": ids.iter().map(|id| notification_json(*id, false)).collect::<Vec<_>>(),
        "meta": {
            "currentPage": current_page,
            "totalPages": total_pages,
            "totalItems": ids.len(),
            "itemCount": ids.len(),
        }
    })
}

pub fn sse_frame(event: &str, id: &str, data: &Value) -> String {
    format!("id: {id}\nevent: {event}\ndata: {data}\n\n")
}
