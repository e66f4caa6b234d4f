use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::error;
use sea_orm::TransactionError;
use thiserror::Error;

use crate::response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("login required")]
    LoginRequired { next: String },
    #[error("user is not the author of post {post_id}")]
    NotAuthor { post_id: i32 },
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    BadUpload(String),
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn login_required(next: impl Into<String>) -> Self {
        Self::LoginRequired { next: next.into() }
    }

    pub fn not_author(post_id: i32) -> Self {
        Self::NotAuthor { post_id }
    }

    pub fn bad_upload(msg: impl Into<String>) -> Self {
        Self::BadUpload(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::LoginRequired { .. } | Self::NotAuthor { .. } => StatusCode::FOUND,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadUpload(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            Self::LoginRequired { next } => {
                response::redirect(format!("/auth/login/?next={}", urlencoding::encode(next)))
            }
            Self::NotAuthor { post_id } => response::redirect(format!("/posts/{}/", post_id)),
            Self::NotFound => response::not_found(),
            Self::BadUpload(msg) => {
                HttpResponse::BadRequest().json(serde_json::json!({ "detail": msg }))
            }
            Self::Database(err) => {
                error!("database error: {}", err);
                response::server_error()
            }
            Self::Internal(msg) => {
                error!("internal error: {}", msg);
                response::server_error()
            }
        }
    }
}

pub fn map_tx_error(err: TransactionError<AppError>) -> AppError {
    match err {
        TransactionError::Connection(err) => AppError::Database(err),
        TransactionError::Transaction(err) => err,
    }
}
