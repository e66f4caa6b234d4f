use std::collections::BTreeMap;

use actix_multipart::Multipart;
use email_address::EmailAddress;
use futures_util::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::entity::group;
use crate::error::AppError;

pub const NON_FIELD_ERRORS: &str = "__all__";
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;
const MAX_USERNAME_CHARS: usize = 150;
const MIN_PASSWORD_CHARS: usize = 8;

pub const REQUIRED_MSG: &str = "This field is required.";
const INVALID_CHOICE_MSG: &str =
    "Select a valid choice. That choice is not one of the available choices.";
const INVALID_IMAGE_MSG: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
const INVALID_USERNAME_MSG: &str =
    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
const USERNAME_TOO_LONG_MSG: &str = "Ensure this value has at most 150 characters.";
const INVALID_EMAIL_MSG: &str = "Enter a valid email address.";
const PASSWORD_MISMATCH_MSG: &str = "The two password fields didn't match.";
const PASSWORD_TOO_SHORT_MSG: &str =
    "This password is too short. It must contain at least 8 characters.";

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.@+-]+$").unwrap());

/// Per-field validation messages, keyed by field name. Errors that do
/// not belong to a single field go under `__all__`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.add(NON_FIELD_ERRORS, message);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(|m| m.as_slice())
    }
}

#[derive(Debug, Default)]
pub struct PostPayload {
    pub text: Option<String>,
    pub group: Option<String>,
    pub image: Option<UploadedImage>,
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct ValidPost {
    pub text: String,
    pub group_id: Option<i32>,
    pub image: Option<UploadedImage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentForm {
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SignupForm {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password1: Option<String>,
    pub password2: Option<String>,
}

#[derive(Debug)]
pub struct ValidSignup {
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
    pub next: Option<String>,
}

#[derive(Debug)]
pub struct ValidLogin {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PasswordChangeForm {
    pub old_password: Option<String>,
    pub new_password1: Option<String>,
    pub new_password2: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetRequestForm {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetConfirmForm {
    pub new_password1: Option<String>,
    pub new_password2: Option<String>,
}

/// Reads a post form submitted as multipart/form-data. Text fields are
/// capped at 64 KiB, the image at [`MAX_IMAGE_BYTES`]; anything larger
/// aborts the request instead of producing a field error.
pub async fn read_post_payload(mut payload: Multipart) -> Result<PostPayload, AppError> {
    let mut form = PostPayload::default();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::bad_upload(e.to_string()))?;
        let name = field
            .content_disposition()
            .get_name()
            .map(|s| s.to_string())
            .unwrap_or_default();

        match name.as_str() {
            "text" => form.text = Some(read_field_string(&mut field).await?),
            "group" => form.group = Some(read_field_string(&mut field).await?),
            "image" => {
                let filename = field
                    .content_disposition()
                    .get_filename()
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                let bytes = read_field_bytes(&mut field, MAX_IMAGE_BYTES).await?;
                if !filename.is_empty() && !bytes.is_empty() {
                    form.image = Some(UploadedImage { filename, bytes });
                }
            }
            _ => {
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| AppError::bad_upload(e.to_string()))?;
                }
            }
        }
    }

    Ok(form)
}

async fn read_field_bytes(
    field: &mut actix_multipart::Field,
    limit: usize,
) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(|e| AppError::bad_upload(e.to_string()))?;
        if bytes.len() + data.len() > limit {
            return Err(AppError::bad_upload("upload exceeds the size limit"));
        }
        bytes.extend_from_slice(&data);
    }
    Ok(bytes)
}

async fn read_field_string(field: &mut actix_multipart::Field) -> Result<String, AppError> {
    let bytes = read_field_bytes(field, MAX_TEXT_FIELD_BYTES).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn validate_post(
    payload: PostPayload,
    groups: &[group::Model],
) -> Result<ValidPost, FormErrors> {
    let mut errors = FormErrors::new();

    let text = payload.text.unwrap_or_default().trim().to_string();
    if text.is_empty() {
        errors.add("text", REQUIRED_MSG);
    }

    let mut group_id = None;
    if let Some(raw) = payload
        .group
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        match raw.parse::<i32>() {
            Ok(id) if groups.iter().any(|g| g.id == id) => group_id = Some(id),
            _ => errors.add("group", INVALID_CHOICE_MSG),
        }
    }

    if let Some(image) = &payload.image {
        if !infer::is_image(&image.bytes) {
            errors.add("image", INVALID_IMAGE_MSG);
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(ValidPost {
        text,
        group_id,
        image: payload.image,
    })
}

pub fn validate_comment(text: Option<&str>) -> Result<String, FormErrors> {
    let text = text.unwrap_or("").trim().to_string();
    if text.is_empty() {
        let mut errors = FormErrors::new();
        errors.add("text", REQUIRED_MSG);
        return Err(errors);
    }
    Ok(text)
}

pub fn validate_signup(form: &SignupForm) -> Result<ValidSignup, FormErrors> {
    let mut errors = FormErrors::new();

    let username = form.username.as_deref().unwrap_or("").trim().to_string();
    if username.is_empty() {
        errors.add("username", REQUIRED_MSG);
    } else if username.chars().count() > MAX_USERNAME_CHARS {
        errors.add("username", USERNAME_TOO_LONG_MSG);
    } else if !USERNAME_RE.is_match(&username) {
        errors.add("username", INVALID_USERNAME_MSG);
    }

    let email = form.email.as_deref().unwrap_or("").trim().to_string();
    let email = if email.is_empty() {
        None
    } else if EmailAddress::is_valid(&email) {
        Some(email)
    } else {
        errors.add("email", INVALID_EMAIL_MSG);
        None
    };

    let password = validate_password_pair(
        form.password1.as_deref(),
        form.password2.as_deref(),
        &mut errors,
        "password1",
        "password2",
    );

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(ValidSignup {
        username,
        first_name: clean_optional(form.first_name.as_deref()),
        last_name: clean_optional(form.last_name.as_deref()),
        email,
        password: password.unwrap_or_default(),
    })
}

pub fn validate_login(form: &LoginForm) -> Result<ValidLogin, FormErrors> {
    let mut errors = FormErrors::new();

    let username = form.username.as_deref().unwrap_or("").trim().to_string();
    if username.is_empty() {
        errors.add("username", REQUIRED_MSG);
    }
    let password = form.password.as_deref().unwrap_or("").to_string();
    if password.is_empty() {
        errors.add("password", REQUIRED_MSG);
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(ValidLogin { username, password })
}

/// Checks a new-password pair and returns the accepted password.
/// Failures land in `errors` under the given field names.
pub fn validate_password_pair(
    password1: Option<&str>,
    password2: Option<&str>,
    errors: &mut FormErrors,
    field1: &str,
    field2: &str,
) -> Option<String> {
    let password1 = password1.unwrap_or("");
    let password2 = password2.unwrap_or("");
    if password1.is_empty() {
        errors.add(field1, REQUIRED_MSG);
        return None;
    }
    if password2.is_empty() {
        errors.add(field2, REQUIRED_MSG);
        return None;
    }
    if password1 != password2 {
        errors.add(field2, PASSWORD_MISMATCH_MSG);
        return None;
    }
    if password1.chars().count() < MIN_PASSWORD_CHARS {
        errors.add(field2, PASSWORD_TOO_SHORT_MSG);
        return None;
    }
    Some(password1.to_string())
}

fn clean_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
