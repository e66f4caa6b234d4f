use actix_web::{web, HttpResponse};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::storage;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/media/{path:.*}").route(web::get().to(serve_media)));
}

async fn serve_media(
    config: web::Data<AppConfig>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let relative = path.into_inner();
    let full = storage::resolve_media_path(&config.media_root, &relative)
        .ok_or(AppError::NotFound)?;
    let data = match tokio::fs::read(&full).await {
        Ok(data) => data,
        Err(_) => return Err(AppError::NotFound),
    };
    let mime = mime_guess::from_path(&full).first_or_octet_stream();
    Ok(HttpResponse::Ok()
        .content_type(mime.essence_str())
        .body(data))
}
