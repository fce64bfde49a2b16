// src/common/response.rs

use axum::{http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

// O lado "sucesso" do resultado discriminado {success, data}
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionOk<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<ActionOk<T>> {
    Json(ActionOk { success: true, data })
}

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<ActionOk<T>>) {
    (StatusCode::CREATED, ok(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_body_carries_data() {
        let Json(body) = ok(json!({ "id": 7 }));
        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value, json!({ "success": true, "data": { "id": 7 } }));
    }

    #[test]
    fn created_uses_201() {
        let (status, _) = created(());
        assert_eq!(status, StatusCode::CREATED);
    }
}
