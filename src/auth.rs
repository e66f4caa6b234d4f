use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use md5::{Digest, Md5};
use rand::Rng;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::entity::{post, session, user};
use crate::error::AppError;

pub const SESSION_TTL_DAYS: i64 = 14;
const SESSION_TOKEN_LEN: usize = 64;
const RESET_TOKEN_TTL_SECS: i64 = 3600;
const RESET_SCOPE: &str = "password_reset";

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: i32,
    pub username: String,
    pub session_token: String,
}

#[derive(Clone, Debug)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let next = req.path().to_string();
        let db = match req.app_data::<web::Data<DatabaseConnection>>() {
            Some(db) => db.clone(),
            None => {
                return Box::pin(async {
                    Err(AppError::internal("database handle missing").into())
                });
            }
        };
        let config = match req.app_data::<web::Data<AppConfig>>() {
            Some(cfg) => cfg.clone(),
            None => {
                return Box::pin(async { Err(AppError::internal("config handle missing").into()) });
            }
        };
        let token = extract_session_token(req, &config);

        Box::pin(async move {
            let token = token.ok_or_else(|| AppError::login_required(next.clone()))?;
            let auth = authenticate_session(&db, &token)
                .await?
                .ok_or_else(|| AppError::login_required(next))?;
            Ok(auth)
        })
    }
}

impl FromRequest for OptionalAuthUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let db = match req.app_data::<web::Data<DatabaseConnection>>() {
            Some(db) => db.clone(),
            None => {
                return Box::pin(async { Ok(OptionalAuthUser(None)) });
            }
        };
        let config = match req.app_data::<web::Data<AppConfig>>() {
            Some(cfg) => cfg.clone(),
            None => {
                return Box::pin(async { Ok(OptionalAuthUser(None)) });
            }
        };
        let token = extract_session_token(req, &config);

        Box::pin(async move {
            if let Some(token) = token {
                let auth = authenticate_session(&db, &token).await.unwrap_or(None);
                return Ok(OptionalAuthUser(auth));
            }
            Ok(OptionalAuthUser(None))
        })
    }
}

fn extract_session_token(req: &HttpRequest, config: &AppConfig) -> Option<String> {
    req.cookie(&config.session_cookie_name)
        .map(|c| c.value().trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn authenticate_session(
    db: &DatabaseConnection,
    token: &str,
) -> Result<Option<AuthUser>, AppError> {
    let found = session::Entity::find_by_id(token.to_string()).one(db).await?;
    let sess = match found {
        Some(sess) => sess,
        None => return Ok(None),
    };
    if sess.expires <= Utc::now() {
        session::Entity::delete_by_id(sess.token).exec(db).await?;
        return Ok(None);
    }
    let account = user::Entity::find_by_id(sess.user_id).one(db).await?;
    Ok(account.map(|account| AuthUser {
        user_id: account.id,
        username: account.username,
        session_token: sess.token,
    }))
}

pub async fn start_session(db: &DatabaseConnection, user_id: i32) -> Result<String, AppError> {
    let token = generate_session_token();
    let now = Utc::now();
    session::ActiveModel {
        token: Set(token.clone()),
        user_id: Set(user_id),
        created: Set(now),
        expires: Set(now + Duration::days(SESSION_TTL_DAYS)),
    }
    .insert(db)
    .await?;
    Ok(token)
}

pub async fn end_session(db: &DatabaseConnection, token: &str) -> Result<(), AppError> {
    session::Entity::delete_by_id(token.to_string()).exec(db).await?;
    Ok(())
}

pub async fn end_other_sessions(
    db: &DatabaseConnection,
    user_id: i32,
    keep_token: &str,
) -> Result<(), AppError> {
    session::Entity::delete_many()
        .filter(session::Column::UserId.eq(user_id))
        .filter(session::Column::Token.ne(keep_token.to_string()))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn end_all_sessions(db: &DatabaseConnection, user_id: i32) -> Result<(), AppError> {
    session::Entity::delete_many()
        .filter(session::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    Ok(())
}

pub fn session_cookie(config: &AppConfig, token: String) -> Cookie<'static> {
    Cookie::build(config.session_cookie_name.clone(), token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::days(SESSION_TTL_DAYS))
        .finish()
}

pub fn removal_cookie(config: &AppConfig) -> Cookie<'static> {
    let mut cookie = Cookie::build(config.session_cookie_name.clone(), "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish();
    cookie.make_removal();
    cookie
}

pub fn authorize_post_author(post: &post::Model, actor: &AuthUser) -> Result<(), AppError> {
    if post.author_id != actor.user_id {
        return Err(AppError::not_author(post.id));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct ResetClaims {
    uid: i32,
    fp: String,
    scope: String,
    exp: usize,
}

/// Issues a one-hour reset token bound to the current password hash,
/// so changing the password invalidates every token issued before.
pub fn make_reset_token(config: &AppConfig, account: &user::Model) -> Result<String, AppError> {
    let exp = (Utc::now() + Duration::seconds(RESET_TOKEN_TTL_SECS)).timestamp() as usize;
    let claims = ResetClaims {
        uid: account.id,
        fp: password_fingerprint(&account.password_hash),
        scope: RESET_SCOPE.to_string(),
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret_key.as_bytes()),
    )
    .map_err(|e| AppError::internal(e.to_string()))
}

pub async fn verify_reset_token(
    db: &DatabaseConnection,
    config: &AppConfig,
    token: &str,
) -> Result<Option<user::Model>, AppError> {
    let key = DecodingKey::from_secret(config.secret_key.as_bytes());
    let validation = Validation::new(Algorithm::HS256);
    let claims = match decode::<ResetClaims>(token, &key, &validation) {
        Ok(data) => data.claims,
        Err(_) => return Ok(None),
    };
    if claims.scope != RESET_SCOPE {
        return Ok(None);
    }
    let account = match user::Entity::find_by_id(claims.uid).one(db).await? {
        Some(account) => account,
        None => return Ok(None),
    };
    if claims.fp != password_fingerprint(&account.password_hash) {
        return Ok(None);
    }
    Ok(Some(account))
}

fn password_fingerprint(password_hash: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(password_hash.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..10].to_string()
}

fn generate_session_token() -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..SESSION_TOKEN_LEN)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}
