use actix_web::{web, HttpResponse};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;

use crate::entity::{group, post};
use crate::error::AppError;
use crate::pagination::{self, Page, PageQuery};
use crate::response;
use crate::routes::posts::{into_post_page, PostDto};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/group/{slug}/").route(web::get().to(group_posts)));
}

#[derive(Serialize)]
struct GroupContext {
    group: GroupDto,
    page_obj: Page<PostDto>,
}

#[derive(Serialize)]
struct GroupDto {
    title: String,
    slug: String,
    description: String,
}

async fn group_posts(
    db: web::Data<DatabaseConnection>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let slug = path.into_inner();
    let group_row = group::Entity::find()
        .filter(group::Column::Slug.eq(slug))
        .one(db.get_ref())
        .await?
        .ok_or(AppError::NotFound)?;

    let select = post::Entity::find()
        .filter(post::Column::GroupId.eq(group_row.id))
        .order_by_desc(post::Column::PubDate)
        .order_by_desc(post::Column::Id);
    let page = pagination::paginate(db.get_ref(), select, query.page.as_deref()).await?;
    let page_obj = into_post_page(db.get_ref(), page).await?;

    let context = GroupContext {
        group: GroupDto {
            title: group_row.title,
            slug: group_row.slug,
            description: group_row.description,
        },
        page_obj,
    };
    Ok(response::json_page(&context))
}
