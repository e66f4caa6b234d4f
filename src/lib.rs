pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod forms;
pub mod mailer;
pub mod migration;
pub mod pagination;
pub mod response;
pub mod routes;
pub mod storage;

use actix_web::web;
use sea_orm::DatabaseConnection;

use crate::cache::PageCache;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::mailer::Mailer;

/// Wires shared state and every route group onto an actix app. The
/// server and the test harness both build the app through this.
pub fn configure_app(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    page_cache: web::Data<PageCache>,
    mailer: web::Data<Mailer>,
) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(db)
            .app_data(config)
            .app_data(page_cache)
            .app_data(mailer)
            // a path that matches a route pattern but fails extraction
            // (e.g. a post id too large for i32) is an unknown resource
            .app_data(
                web::PathConfig::default().error_handler(|_, _| AppError::NotFound.into()),
            )
            .service(web::scope("/auth").configure(routes::users::config))
            .default_service(web::route().to(response::page_not_found));
        routes::posts::config(cfg);
        routes::groups::config(cfg);
        routes::profiles::config(cfg);
        routes::media::config(cfg);
    }
}
