//! Health check endpoint.

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::join::Manager;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    joins_enabled: bool,
}

async fn health(manager: web::Data<Manager>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        joins_enabled: manager.is_enabled(),
    })
}

pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}
