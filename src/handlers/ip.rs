use axum::{Extension, Json, response::IntoResponse};

use crate::client_ip::ClientAddress;

// Echo the address the dispatcher resolved for this request
pub async fn ip_handler(Extension(client): Extension<ClientAddress>) -> impl IntoResponse {
    Json(serde_json::json!({ "ip": client }))
}
