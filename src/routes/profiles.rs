use actix_web::{web, HttpResponse};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;

use crate::auth::{AuthUser, OptionalAuthUser};
use crate::entity::{follow, post, user};
use crate::error::AppError;
use crate::pagination::{self, Page, PageQuery};
use crate::response;
use crate::routes::posts::{into_post_page, PostDto};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/follow/").route(web::get().to(follow_index)))
        .service(web::resource("/profile/{username}/").route(web::get().to(profile)))
        .service(web::resource("/profile/{username}/follow/").route(web::get().to(profile_follow)))
        .service(
            web::resource("/profile/{username}/unfollow/").route(web::get().to(profile_unfollow)),
        );
}

#[derive(Serialize)]
struct ProfileContext {
    author: AuthorDto,
    post_count: u64,
    following: bool,
    page_obj: Page<PostDto>,
}

#[derive(Serialize)]
struct AuthorDto {
    username: String,
    first_name: Option<String>,
    last_name: Option<String>,
}

#[derive(Serialize)]
struct FollowContext {
    page_obj: Page<PostDto>,
}

async fn profile(
    db: web::Data<DatabaseConnection>,
    viewer: OptionalAuthUser,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let author = find_author(db.get_ref(), path.as_str()).await?;

    let select = post::Entity::find()
        .filter(post::Column::AuthorId.eq(author.id))
        .order_by_desc(post::Column::PubDate)
        .order_by_desc(post::Column::Id);
    let page = pagination::paginate(db.get_ref(), select, query.page.as_deref()).await?;
    let page_obj = into_post_page(db.get_ref(), page).await?;

    let following = match &viewer.0 {
        Some(viewer) => is_following(db.get_ref(), viewer.user_id, author.id).await?,
        None => false,
    };

    let context = ProfileContext {
        author: AuthorDto {
            username: author.username,
            first_name: author.first_name,
            last_name: author.last_name,
        },
        post_count: page_obj.count,
        following,
        page_obj,
    };
    Ok(response::json_page(&context))
}

async fn profile_follow(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let author = find_author(db.get_ref(), path.as_str()).await?;

    // following yourself is a no-op, as is following twice
    if author.id != auth.user_id && !is_following(db.get_ref(), auth.user_id, author.id).await? {
        let inserted = follow::ActiveModel {
            user_id: Set(auth.user_id),
            author_id: Set(author.id),
            ..Default::default()
        }
        .insert(db.get_ref())
        .await;
        if let Err(err) = inserted {
            let msg = err.to_string();
            if !msg.contains("Duplicate") && !msg.contains("UNIQUE") {
                return Err(AppError::Database(err));
            }
        }
    }

    Ok(response::redirect(format!("/profile/{}/", author.username)))
}

async fn profile_unfollow(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let author = find_author(db.get_ref(), path.as_str()).await?;

    follow::Entity::delete_many()
        .filter(follow::Column::UserId.eq(auth.user_id))
        .filter(follow::Column::AuthorId.eq(author.id))
        .exec(db.get_ref())
        .await?;

    Ok(response::redirect(format!("/profile/{}/", author.username)))
}

async fn follow_index(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let followed: Vec<i32> = follow::Entity::find()
        .filter(follow::Column::UserId.eq(auth.user_id))
        .all(db.get_ref())
        .await?
        .into_iter()
        .map(|f| f.author_id)
        .collect();

    let page_obj = if followed.is_empty() {
        Page::empty()
    } else {
        let select = post::Entity::find()
            .filter(post::Column::AuthorId.is_in(followed))
            .order_by_desc(post::Column::PubDate)
            .order_by_desc(post::Column::Id);
        let page = pagination::paginate(db.get_ref(), select, query.page.as_deref()).await?;
        into_post_page(db.get_ref(), page).await?
    };

    Ok(response::json_page(&FollowContext { page_obj }))
}

async fn find_author<C: ConnectionTrait>(db: &C, username: &str) -> Result<user::Model, AppError> {
    user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?
        .ok_or(AppError::NotFound)
}

async fn is_following<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    author_id: i32,
) -> Result<bool, AppError> {
    let found = follow::Entity::find()
        .filter(follow::Column::UserId.eq(user_id))
        .filter(follow::Column::AuthorId.eq(author_id))
        .one(db)
        .await?;
    Ok(found.is_some())
}
