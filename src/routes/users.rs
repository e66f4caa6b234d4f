use actix_web::{web, HttpRequest, HttpResponse};
use bcrypt::{hash, verify};
use chrono::Utc;
use log::{debug, info};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};

use crate::auth::{self, AuthUser};
use crate::config::AppConfig;
use crate::entity::user;
use crate::error::AppError;
use crate::forms::{
    self, FormErrors, LoginForm, PasswordChangeForm, ResetConfirmForm, ResetRequestForm,
    SignupForm,
};
use crate::mailer::Mailer;
use crate::response;

const BCRYPT_COST: u32 = 10;
const USERNAME_TAKEN_MSG: &str = "A user with that username already exists.";
const BAD_CREDENTIALS_MSG: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";
const BAD_OLD_PASSWORD_MSG: &str =
    "Your old password was entered incorrectly. Please enter it again.";
const INVALID_RESET_LINK_MSG: &str =
    "The password reset link was invalid, possibly because it has already been used. \
     Please request a new password reset.";

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/signup/")
            .route(web::get().to(signup_form))
            .route(web::post().to(signup)),
    )
    .service(
        web::resource("/login/")
            .route(web::get().to(login_form))
            .route(web::post().to(login)),
    )
    .service(web::resource("/logout/").route(web::get().to(logout)))
    .service(
        web::resource("/password_change/")
            .route(web::get().to(password_change_form))
            .route(web::post().to(password_change)),
    )
    .service(web::resource("/password_reset/").route(web::post().to(password_reset)))
    .service(web::resource("/reset/{token}/").route(web::post().to(reset_confirm)));
}

#[derive(Deserialize)]
struct NextQuery {
    next: Option<String>,
}

#[derive(Serialize)]
struct SignupContext {
    form: SignupFormValues,
}

#[derive(Serialize)]
struct SignupFormValues {
    username: String,
    first_name: String,
    last_name: String,
    email: String,
    errors: FormErrors,
}

impl SignupFormValues {
    fn empty() -> Self {
        Self {
            username: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            errors: FormErrors::new(),
        }
    }
}

#[derive(Serialize)]
struct LoginContext {
    form: LoginFormValues,
    next: Option<String>,
}

#[derive(Serialize)]
struct LoginFormValues {
    username: String,
    errors: FormErrors,
}

#[derive(Serialize)]
struct PasswordFormContext {
    form: PasswordFormValues,
}

#[derive(Serialize)]
struct PasswordFormValues {
    errors: FormErrors,
}

async fn signup_form() -> HttpResponse {
    response::json_page(&SignupContext {
        form: SignupFormValues::empty(),
    })
}

async fn signup(
    db: web::Data<DatabaseConnection>,
    form: web::Form<SignupForm>,
) -> Result<HttpResponse, AppError> {
    let valid = match forms::validate_signup(&form) {
        Ok(valid) => valid,
        Err(errors) => return Ok(signup_errors(&form, errors)),
    };

    let taken = user::Entity::find()
        .filter(user::Column::Username.eq(valid.username.clone()))
        .one(db.get_ref())
        .await?
        .is_some();
    if taken {
        let mut errors = FormErrors::new();
        errors.add("username", USERNAME_TAKEN_MSG);
        return Ok(signup_errors(&form, errors));
    }

    let password_hash = hash(&valid.password, BCRYPT_COST)?;
    let inserted = user::ActiveModel {
        username: Set(valid.username.clone()),
        password_hash: Set(password_hash),
        email: Set(valid.email),
        first_name: Set(valid.first_name),
        last_name: Set(valid.last_name),
        date_joined: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db.get_ref())
    .await;

    if let Err(err) = inserted {
        let msg = err.to_string();
        if msg.contains("Duplicate") || msg.contains("UNIQUE") {
            let mut errors = FormErrors::new();
            errors.add("username", USERNAME_TAKEN_MSG);
            return Ok(signup_errors(&form, errors));
        }
        return Err(AppError::Database(err));
    }

    info!("user {} signed up", valid.username);
    Ok(response::redirect("/"))
}

async fn login_form(query: web::Query<NextQuery>) -> HttpResponse {
    response::json_page(&LoginContext {
        form: LoginFormValues {
            username: String::new(),
            errors: FormErrors::new(),
        },
        next: query.next.clone(),
    })
}

async fn login(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    query: web::Query<NextQuery>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, AppError> {
    let next = form.next.clone().or_else(|| query.next.clone());

    let valid = match forms::validate_login(&form) {
        Ok(valid) => valid,
        Err(errors) => return Ok(login_errors(&form, next, errors)),
    };

    let found = user::Entity::find()
        .filter(user::Column::Username.eq(valid.username.clone()))
        .one(db.get_ref())
        .await?;
    let authenticated = match found {
        Some(account) => {
            if verify(&valid.password, &account.password_hash)? {
                Some(account)
            } else {
                None
            }
        }
        None => None,
    };
    let account = match authenticated {
        Some(account) => account,
        None => {
            let mut errors = FormErrors::new();
            errors.add_non_field(BAD_CREDENTIALS_MSG);
            return Ok(login_errors(&form, next, errors));
        }
    };

    let token = auth::start_session(db.get_ref(), account.id).await?;
    info!("user {} logged in", account.username);

    let target = next
        .as_deref()
        .filter(|n| is_safe_next(n))
        .unwrap_or("/")
        .to_string();
    let mut resp = response::redirect(target);
    resp.add_cookie(&auth::session_cookie(&config, token))
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(resp)
}

async fn logout(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    if let Some(cookie) = req.cookie(&config.session_cookie_name) {
        auth::end_session(db.get_ref(), cookie.value()).await?;
    }
    let mut resp = response::redirect("/");
    resp.add_cookie(&auth::removal_cookie(&config))
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(resp)
}

async fn password_change_form(_auth: AuthUser) -> HttpResponse {
    response::json_page(&PasswordFormContext {
        form: PasswordFormValues {
            errors: FormErrors::new(),
        },
    })
}

async fn password_change(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    form: web::Form<PasswordChangeForm>,
) -> Result<HttpResponse, AppError> {
    let account = user::Entity::find_by_id(auth.user_id)
        .one(db.get_ref())
        .await?
        .ok_or(AppError::NotFound)?;

    let mut errors = FormErrors::new();
    let old_password = form.old_password.as_deref().unwrap_or("");
    if old_password.is_empty() {
        errors.add("old_password", forms::REQUIRED_MSG);
    } else if !verify(old_password, &account.password_hash)? {
        errors.add("old_password", BAD_OLD_PASSWORD_MSG);
    }

    let new_password = forms::validate_password_pair(
        form.new_password1.as_deref(),
        form.new_password2.as_deref(),
        &mut errors,
        "new_password1",
        "new_password2",
    );
    let new_password = match new_password {
        Some(password) if errors.is_empty() => password,
        _ => return Ok(password_form_errors(errors)),
    };

    update_password(db.get_ref(), account.id, &new_password).await?;
    auth::end_other_sessions(db.get_ref(), account.id, &auth.session_token).await?;
    debug!("password changed for user {}", account.username);

    Ok(response::redirect("/"))
}

async fn password_reset(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    mailer: web::Data<Mailer>,
    form: web::Form<ResetRequestForm>,
) -> Result<HttpResponse, AppError> {
    let email = form.email.as_deref().unwrap_or("").trim().to_string();
    if !email.is_empty() {
        let found = user::Entity::find()
            .filter(user::Column::Email.eq(email.clone()))
            .one(db.get_ref())
            .await?;
        if let Some(account) = found {
            let token = auth::make_reset_token(&config, &account)?;
            let link = config.reset_url(&token);
            let mailer = mailer.get_ref().clone();
            web::block(move || mailer.send_password_reset(&email, &link))
                .await
                .map_err(|e| AppError::internal(e.to_string()))??;
        }
    }

    // the same redirect whether or not the address is known
    Ok(response::redirect("/auth/login/"))
}

async fn reset_confirm(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    path: web::Path<String>,
    form: web::Form<ResetConfirmForm>,
) -> Result<HttpResponse, AppError> {
    let account = match auth::verify_reset_token(db.get_ref(), &config, path.as_str()).await? {
        Some(account) => account,
        None => {
            let mut errors = FormErrors::new();
            errors.add_non_field(INVALID_RESET_LINK_MSG);
            return Ok(password_form_errors(errors));
        }
    };

    let mut errors = FormErrors::new();
    let new_password = forms::validate_password_pair(
        form.new_password1.as_deref(),
        form.new_password2.as_deref(),
        &mut errors,
        "new_password1",
        "new_password2",
    );
    let new_password = match new_password {
        Some(password) if errors.is_empty() => password,
        _ => return Ok(password_form_errors(errors)),
    };

    update_password(db.get_ref(), account.id, &new_password).await?;
    auth::end_all_sessions(db.get_ref(), account.id).await?;
    info!("password reset completed for user {}", account.username);

    Ok(response::redirect("/auth/login/"))
}

async fn update_password(
    db: &DatabaseConnection,
    user_id: i32,
    new_password: &str,
) -> Result<(), AppError> {
    let password_hash = hash(new_password, BCRYPT_COST)?;
    user::Entity::update(user::ActiveModel {
        id: Set(user_id),
        password_hash: Set(password_hash),
        ..Default::default()
    })
    .exec(db)
    .await?;
    Ok(())
}

fn signup_errors(form: &SignupForm, errors: FormErrors) -> HttpResponse {
    response::json_page(&SignupContext {
        form: SignupFormValues {
            username: form.username.clone().unwrap_or_default(),
            first_name: form.first_name.clone().unwrap_or_default(),
            last_name: form.last_name.clone().unwrap_or_default(),
            email: form.email.clone().unwrap_or_default(),
            errors,
        },
    })
}

fn login_errors(form: &LoginForm, next: Option<String>, errors: FormErrors) -> HttpResponse {
    response::json_page(&LoginContext {
        form: LoginFormValues {
            username: form.username.clone().unwrap_or_default(),
            errors,
        },
        next,
    })
}

fn password_form_errors(errors: FormErrors) -> HttpResponse {
    response::json_page(&PasswordFormContext {
        form: PasswordFormValues { errors },
    })
}

fn is_safe_next(next: &str) -> bool {
    next.starts_with('/') && !next.starts_with("//") && !next.contains('\\')
}
