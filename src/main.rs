use actix_web::{middleware, web, App, HttpServer};
use log::info;

use penpost::cache::PageCache;
use penpost::config::AppConfig;
use penpost::configure_app;
use penpost::db::connect_db;
use penpost::mailer::Mailer;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let config = AppConfig::from_env();
    let db = connect_db(&config).await;
    let server_port = config.server_port;

    let db = web::Data::new(db);
    let mailer = web::Data::new(Mailer::from_config(&config));
    let page_cache = web::Data::new(PageCache::new());
    let config = web::Data::new(config);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .configure(configure_app(
                db.clone(),
                config.clone(),
                page_cache.clone(),
                mailer.clone(),
            ))
    })
    .bind(("0.0.0.0", server_port))?;
    info!("server started at http://0.0.0.0:{}", server_port);
    server.run().await
}
