use sea_orm::{
    ConnectionTrait, DbErr, EntityTrait, FromQueryResult, ItemsAndPagesNumber, PaginatorTrait,
    Select,
};
use serde::{Deserialize, Serialize};

pub const POSTS_PER_PAGE: u64 = 10;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            number: 1,
            num_pages: 1,
            count: 0,
            has_next: false,
            has_previous: false,
        }
    }

    pub fn with_items<U>(self, items: Vec<U>) -> Page<U> {
        Page {
            items,
            number: self.number,
            num_pages: self.num_pages,
            count: self.count,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}

pub async fn paginate<'db, C, E>(
    db: &'db C,
    select: Select<E>,
    requested: Option<&str>,
) -> Result<Page<E::Model>, DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
    E::Model: FromQueryResult + Send + Sync + 'db,
{
    let paginator = select.paginate(db, POSTS_PER_PAGE);
    let ItemsAndPagesNumber {
        number_of_items,
        number_of_pages,
    } = paginator.num_items_and_pages().await?;

    // an empty result set still yields one (empty) page
    let num_pages = number_of_pages.max(1);
    let number = resolve_page_number(requested, num_pages);
    let items = paginator.fetch_page(number - 1).await?;

    Ok(Page {
        items,
        number,
        num_pages,
        count: number_of_items,
        has_next: number < num_pages,
        has_previous: number > 1,
    })
}

/// Missing or malformed page parameters fall back to the first page,
/// out-of-range numbers to the last one.
pub fn resolve_page_number(requested: Option<&str>, num_pages: u64) -> u64 {
    let raw = match requested {
        Some(raw) => raw.trim(),
        None => return 1,
    };
    match raw.parse::<i64>() {
        Err(_) => 1,
        Ok(n) if n < 1 => num_pages,
        Ok(n) if n as u64 > num_pages => num_pages,
        Ok(n) => n as u64,
    }
}
