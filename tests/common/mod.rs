use actix_web::cookie::Cookie;
use actix_web::web;
use bcrypt::hash;
use chrono::Utc;
use rand::Rng;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;

use penpost::auth;
use penpost::cache::PageCache;
use penpost::config::AppConfig;
use penpost::entity::{comment, group, post, user};
use penpost::mailer::Mailer;
use penpost::migration::Migrator;

pub const PASSWORD: &str = "correct-horse-battery";

pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
    0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
];

pub struct TestEnv {
    pub db: web::Data<DatabaseConnection>,
    pub config: web::Data<AppConfig>,
    pub page_cache: web::Data<PageCache>,
    pub mailer: web::Data<Mailer>,
}

impl TestEnv {
    pub fn configure(&self) -> impl FnOnce(&mut web::ServiceConfig) {
        penpost::configure_app(
            self.db.clone(),
            self.config.clone(),
            self.page_cache.clone(),
            self.mailer.clone(),
        )
    }
}

// A pooled in-memory sqlite would hand each connection its own empty
// database, so the pool is pinned to a single connection.
pub async fn test_env() -> TestEnv {
    let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
    options.max_connections(1);
    let db = Database::connect(options).await.expect("connect test db");
    Migrator::up(&db, None).await.expect("run migrations");

    let media_root = std::env::temp_dir().join(format!(
        "penpost-test-{}-{}",
        std::process::id(),
        rand::thread_rng().gen::<u32>()
    ));
    let config = AppConfig {
        server_port: 0,
        sqlite_path: String::new(),
        database_url: Some("sqlite::memory:".to_owned()),
        secret_key: "test-secret".to_owned(),
        session_cookie_name: "sessionid".to_owned(),
        media_root: media_root.to_string_lossy().into_owned(),
        public_url: "http://localhost:8000".to_owned(),
        smtp_host: None,
        smtp_username: String::new(),
        smtp_password: String::new(),
        email_from: "Penpost <no-reply@penpost.local>".to_owned(),
    };

    TestEnv {
        db: web::Data::new(db),
        config: web::Data::new(config),
        page_cache: web::Data::new(PageCache::new()),
        mailer: web::Data::new(Mailer::disabled("Penpost <no-reply@penpost.local>")),
    }
}

pub async fn create_user(db: &DatabaseConnection, username: &str) -> user::Model {
    let password_hash = hash(PASSWORD, 4).expect("hash test password");
    user::ActiveModel {
        username: Set(username.to_owned()),
        password_hash: Set(password_hash),
        email: Set(Some(format!("{}@example.com", username))),
        first_name: Set(None),
        last_name: Set(None),
        date_joined: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert user")
}

pub async fn create_group(db: &DatabaseConnection, title: &str, slug: &str) -> group::Model {
    group::ActiveModel {
        title: Set(title.to_owned()),
        slug: Set(slug.to_owned()),
        description: Set(format!("{} description", title)),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert group")
}

pub async fn create_post(
    db: &DatabaseConnection,
    author_id: i32,
    text: &str,
    group_id: Option<i32>,
) -> post::Model {
    post::ActiveModel {
        text: Set(text.to_owned()),
        pub_date: Set(Utc::now()),
        author_id: Set(author_id),
        group_id: Set(group_id),
        image: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert post")
}

pub async fn create_comment(
    db: &DatabaseConnection,
    post_id: i32,
    author_id: i32,
    text: &str,
) -> comment::Model {
    comment::ActiveModel {
        post_id: Set(post_id),
        author_id: Set(author_id),
        text: Set(text.to_owned()),
        created: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert comment")
}

pub async fn login_cookie(env: &TestEnv, user_id: i32) -> Cookie<'static> {
    let token = auth::start_session(env.db.get_ref(), user_id)
        .await
        .expect("start session");
    Cookie::new(env.config.session_cookie_name.clone(), token)
}

pub fn multipart_body(
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> (String, Vec<u8>) {
    const BOUNDARY: &str = "penpost-test-boundary";
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    if let Some((name, filename, bytes)) = file {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}
