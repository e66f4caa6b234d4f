use actix_web::{http::header, HttpResponse};
use serde::Serialize;
use serde_json::json;

pub fn redirect(to: impl Into<String>) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, to.into()))
        .finish()
}

pub fn json_page<T: Serialize>(context: &T) -> HttpResponse {
    HttpResponse::Ok().json(context)
}

pub fn json_body(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/json")
        .body(body)
}

pub fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "title": "Page not found",
        "detail": "Sorry, this page could not be found.",
        "status_code": 404,
    }))
}

pub fn server_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({
        "title": "Server error",
        "status_code": 500,
    }))
}

pub async fn page_not_found() -> HttpResponse {
    not_found()
}
