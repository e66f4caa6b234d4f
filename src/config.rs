use std::env;

#[derive(Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub sqlite_path: String,
    pub database_url: Option<String>,
    pub secret_key: String,
    pub session_cookie_name: String,
    pub media_root: String,
    pub public_url: String,
    pub smtp_host: Option<String>,
    pub smtp_username: String,
    pub smtp_password: String,
    pub email_from: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8000);

        let sqlite_path =
            env::var("SQLITE_PATH").unwrap_or_else(|_| "data/penpost.sqlite".to_string());
        let database_url = env::var("DATABASE_URL").ok();

        let secret_key = env::var("SECRET_KEY")
            .unwrap_or_else(|_| "dev-only-insecure-secret".to_string());

        let session_cookie_name =
            env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| "sessionid".to_string());

        let media_root = env::var("MEDIA_ROOT").unwrap_or_else(|_| "media".to_string());
        let public_url =
            env::var("PUBLIC_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());

        let smtp_host = env::var("SMTP_HOST").ok().filter(|v| !v.trim().is_empty());
        let smtp_username = env::var("SMTP_USERNAME").unwrap_or_default();
        let smtp_password = env::var("SMTP_PASSWORD").unwrap_or_default();
        let email_from = env::var("EMAIL_FROM")
            .unwrap_or_else(|_| "Penpost <no-reply@penpost.local>".to_string());

        Self {
            server_port,
            sqlite_path,
            database_url,
            secret_key,
            session_cookie_name,
            media_root,
            public_url,
            smtp_host,
            smtp_username,
            smtp_password,
            email_from,
        }
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }

        let path = self.sqlite_path.trim();
        if path.starts_with("sqlite:") || path.starts_with("file:") {
            return path.to_string();
        }
        format!("sqlite://{}", path)
    }

    pub fn reset_url(&self, token: &str) -> String {
        format!(
            "{}/auth/reset/{}/",
            self.public_url.trim_end_matches('/'),
            token
        )
    }
}
