use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;

use crate::auth::{self, AuthUser};
use crate::cache::{self, PageCache, HOME_CACHE_TTL};
use crate::config::AppConfig;
use crate::entity::{comment, group, post, user};
use crate::error::{map_tx_error, AppError};
use crate::forms::{self, CommentForm, FormErrors};
use crate::pagination::{self, Page, PageQuery};
use crate::response;
use crate::storage;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(
            web::resource("/create/")
                .route(web::get().to(create_post_form))
                .route(web::post().to(create_post)),
        )
        .service(web::resource("/posts/{id:\\d+}/").route(web::get().to(post_detail)))
        .service(
            web::resource("/posts/{id:\\d+}/edit/")
                .route(web::get().to(edit_post_form))
                .route(web::post().to(edit_post)),
        )
        .service(web::resource("/posts/{id:\\d+}/comment/").route(web::post().to(add_comment)))
        .service(web::resource("/posts/{id:\\d+}/delete/").route(web::post().to(delete_post)));
}

#[derive(Serialize)]
pub struct PostDto {
    pub id: i32,
    pub text: String,
    pub pub_date: String,
    pub author: String,
    pub group: Option<GroupRef>,
    pub image: Option<String>,
}

#[derive(Serialize, Clone)]
pub struct GroupRef {
    pub title: String,
    pub slug: String,
}

#[derive(Serialize)]
struct CommentDto {
    id: i32,
    author: String,
    text: String,
    created: String,
}

#[derive(Serialize)]
struct IndexContext {
    page_obj: Page<PostDto>,
}

#[derive(Serialize)]
struct PostDetailContext {
    post: PostDto,
    post_count: u64,
    comments: Vec<CommentDto>,
    form: CommentFormContext,
}

#[derive(Serialize)]
struct CommentFormContext {
    text: String,
    errors: FormErrors,
}

impl CommentFormContext {
    fn empty() -> Self {
        Self {
            text: String::new(),
            errors: FormErrors::new(),
        }
    }
}

#[derive(Serialize)]
struct PostFormContext {
    form: PostFormValues,
    groups: Vec<GroupChoice>,
    is_edit: bool,
}

#[derive(Serialize)]
struct PostFormValues {
    text: String,
    group: Option<String>,
    errors: FormErrors,
}

impl PostFormValues {
    fn empty() -> Self {
        Self {
            text: String::new(),
            group: None,
            errors: FormErrors::new(),
        }
    }
}

#[derive(Serialize)]
struct GroupChoice {
    id: i32,
    title: String,
}

async fn index(
    req: HttpRequest,
    db: web::Data<DatabaseConnection>,
    page_cache: web::Data<PageCache>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let key = cache::cache_key(req.path(), req.query_string());
    if let Some(body) = page_cache.get(&key).await {
        return Ok(response::json_body(body));
    }

    let select = post::Entity::find()
        .order_by_desc(post::Column::PubDate)
        .order_by_desc(post::Column::Id);
    let page = pagination::paginate(db.get_ref(), select, query.page.as_deref()).await?;
    let page_obj = into_post_page(db.get_ref(), page).await?;

    let body = serde_json::to_string(&IndexContext { page_obj })?;
    page_cache.set(key, body.clone(), HOME_CACHE_TTL).await;
    Ok(response::json_body(body))
}

async fn post_detail(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let context = detail_context(db.get_ref(), *path, CommentFormContext::empty()).await?;
    Ok(response::json_page(&context))
}

async fn create_post_form(
    db: web::Data<DatabaseConnection>,
    _auth: AuthUser,
) -> Result<HttpResponse, AppError> {
    let groups = load_groups(db.get_ref()).await?;
    let context = PostFormContext {
        form: PostFormValues::empty(),
        groups: to_group_choices(groups),
        is_edit: false,
    };
    Ok(response::json_page(&context))
}

async fn create_post(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    auth: AuthUser,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let submitted = forms::read_post_payload(payload).await?;
    let groups = load_groups(db.get_ref()).await?;

    let echo_text = submitted.text.clone().unwrap_or_default();
    let echo_group = echo_group_value(submitted.group.as_deref());
    let valid = match forms::validate_post(submitted, &groups) {
        Ok(valid) => valid,
        Err(errors) => {
            let context = PostFormContext {
                form: PostFormValues {
                    text: echo_text,
                    group: echo_group,
                    errors,
                },
                groups: to_group_choices(groups),
                is_edit: false,
            };
            return Ok(response::json_page(&context));
        }
    };

    let mut image_path = None;
    if let Some(image) = &valid.image {
        let saved = storage::save_image(&config.media_root, &image.filename, &image.bytes).await?;
        image_path = Some(saved);
    }

    let inserted = post::ActiveModel {
        text: Set(valid.text),
        pub_date: Set(Utc::now()),
        author_id: Set(auth.user_id),
        group_id: Set(valid.group_id),
        image: Set(image_path),
        ..Default::default()
    }
    .insert(db.get_ref())
    .await?;
    debug!("post saved id={}", inserted.id);

    Ok(response::redirect(format!("/profile/{}/", auth.username)))
}

async fn edit_post_form(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let post_row = find_post(db.get_ref(), *path).await?;
    auth::authorize_post_author(&post_row, &auth)?;

    let groups = load_groups(db.get_ref()).await?;
    let context = PostFormContext {
        form: PostFormValues {
            text: post_row.text,
            group: post_row.group_id.map(|id| id.to_string()),
            errors: FormErrors::new(),
        },
        groups: to_group_choices(groups),
        is_edit: true,
    };
    Ok(response::json_page(&context))
}

async fn edit_post(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    auth: AuthUser,
    path: web::Path<i32>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let post_id = *path;
    let post_row = find_post(db.get_ref(), post_id).await?;
    auth::authorize_post_author(&post_row, &auth)?;

    let submitted = forms::read_post_payload(payload).await?;
    let groups = load_groups(db.get_ref()).await?;

    let echo_text = submitted.text.clone().unwrap_or_default();
    let echo_group = echo_group_value(submitted.group.as_deref());
    let valid = match forms::validate_post(submitted, &groups) {
        Ok(valid) => valid,
        Err(errors) => {
            let context = PostFormContext {
                form: PostFormValues {
                    text: echo_text,
                    group: echo_group,
                    errors,
                },
                groups: to_group_choices(groups),
                is_edit: true,
            };
            return Ok(response::json_page(&context));
        }
    };

    let mut active = post::ActiveModel {
        id: Set(post_id),
        text: Set(valid.text),
        group_id: Set(valid.group_id),
        ..Default::default()
    };
    if let Some(image) = &valid.image {
        let saved = storage::save_image(&config.media_root, &image.filename, &image.bytes).await?;
        active.image = Set(Some(saved));
    }
    post::Entity::update(active).exec(db.get_ref()).await?;
    debug!("post updated id={}", post_id);

    Ok(response::redirect(format!("/posts/{}/", post_id)))
}

async fn add_comment(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    path: web::Path<i32>,
    form: web::Form<CommentForm>,
) -> Result<HttpResponse, AppError> {
    let post_row = find_post(db.get_ref(), *path).await?;

    let text = match forms::validate_comment(form.text.as_deref()) {
        Ok(text) => text,
        Err(errors) => {
            let echo = form.text.clone().unwrap_or_default();
            let context = detail_context(
                db.get_ref(),
                post_row.id,
                CommentFormContext { text: echo, errors },
            )
            .await?;
            return Ok(response::json_page(&context));
        }
    };

    comment::ActiveModel {
        post_id: Set(post_row.id),
        author_id: Set(auth.user_id),
        text: Set(text),
        created: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db.get_ref())
    .await?;

    Ok(response::redirect(format!("/posts/{}/", post_row.id)))
}

async fn delete_post(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let post_row = find_post(db.get_ref(), *path).await?;
    auth::authorize_post_author(&post_row, &auth)?;

    let post_id = post_row.id;
    db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move {
            comment::Entity::delete_many()
                .filter(comment::Column::PostId.eq(post_id))
                .exec(txn)
                .await?;
            post::Entity::delete_by_id(post_id).exec(txn).await?;
            Ok(())
        })
    })
    .await
    .map_err(map_tx_error)?;
    debug!("post deleted id={}", post_id);

    Ok(response::redirect(format!("/profile/{}/", auth.username)))
}

async fn detail_context<C: ConnectionTrait>(
    db: &C,
    post_id: i32,
    form: CommentFormContext,
) -> Result<PostDetailContext, AppError> {
    let post_row = find_post(db, post_id).await?;
    let post_count = post::Entity::find()
        .filter(post::Column::AuthorId.eq(post_row.author_id))
        .count(db)
        .await?;
    let comment_rows = comment::Entity::find()
        .filter(comment::Column::PostId.eq(post_id))
        .order_by_asc(comment::Column::Created)
        .order_by_asc(comment::Column::Id)
        .all(db)
        .await?;
    let comments = build_comment_dtos(db, comment_rows).await?;
    let post_dto = build_post_dtos(db, std::slice::from_ref(&post_row))
        .await?
        .pop()
        .ok_or_else(|| AppError::internal("post dto missing"))?;

    Ok(PostDetailContext {
        post: post_dto,
        post_count,
        comments,
        form,
    })
}

async fn find_post<C: ConnectionTrait>(db: &C, id: i32) -> Result<post::Model, AppError> {
    post::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound)
}

async fn load_groups<C: ConnectionTrait>(db: &C) -> Result<Vec<group::Model>, AppError> {
    Ok(group::Entity::find()
        .order_by_asc(group::Column::Title)
        .all(db)
        .await?)
}

fn to_group_choices(groups: Vec<group::Model>) -> Vec<GroupChoice> {
    groups
        .into_iter()
        .map(|g| GroupChoice {
            id: g.id,
            title: g.title,
        })
        .collect()
}

fn echo_group_value(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) async fn into_post_page<C: ConnectionTrait>(
    db: &C,
    page: Page<post::Model>,
) -> Result<Page<PostDto>, AppError> {
    let items = build_post_dtos(db, &page.items).await?;
    Ok(page.with_items(items))
}

async fn build_post_dtos<C: ConnectionTrait>(
    db: &C,
    posts: &[post::Model],
) -> Result<Vec<PostDto>, AppError> {
    let mut author_ids: Vec<i32> = posts.iter().map(|p| p.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();
    let mut group_ids: Vec<i32> = posts.iter().filter_map(|p| p.group_id).collect();
    group_ids.sort_unstable();
    group_ids.dedup();

    let authors: HashMap<i32, String> = if author_ids.is_empty() {
        HashMap::new()
    } else {
        user::Entity::find()
            .filter(user::Column::Id.is_in(author_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect()
    };

    let groups: HashMap<i32, GroupRef> = if group_ids.is_empty() {
        HashMap::new()
    } else {
        group::Entity::find()
            .filter(group::Column::Id.is_in(group_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|g| {
                (
                    g.id,
                    GroupRef {
                        title: g.title,
                        slug: g.slug,
                    },
                )
            })
            .collect()
    };

    Ok(posts
        .iter()
        .map(|p| PostDto {
            id: p.id,
            text: p.text.clone(),
            pub_date: to_rfc3339(p.pub_date),
            author: authors.get(&p.author_id).cloned().unwrap_or_default(),
            group: p.group_id.and_then(|id| groups.get(&id).cloned()),
            image: p.image.clone(),
        })
        .collect())
}

async fn build_comment_dtos<C: ConnectionTrait>(
    db: &C,
    comments: Vec<comment::Model>,
) -> Result<Vec<CommentDto>, AppError> {
    let mut author_ids: Vec<i32> = comments.iter().map(|c| c.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let authors: HashMap<i32, String> = if author_ids.is_empty() {
        HashMap::new()
    } else {
        user::Entity::find()
            .filter(user::Column::Id.is_in(author_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect()
    };

    Ok(comments
        .into_iter()
        .map(|c| CommentDto {
            id: c.id,
            author: authors.get(&c.author_id).cloned().unwrap_or_default(),
            text: c.text,
            created: to_rfc3339(c.created),
        })
        .collect())
}

fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, false)
}
