use askama::Template;
use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse},
    routing::get,
    Router,
};

use crate::auth::MaybeUser;
use crate::error::AppError;
use crate::models::{Entry, User};
use crate::AppState;

struct TagWithCount {
    name: String,
    count: i64,
}

#[derive(Template)]
#[template(path = "tags/list.html")]
struct TagListTemplate {
    tags: Vec<TagWithCount>,

    user: Option<User>,
}

#[derive(Template)]
#[template(path = "tags/detail.html")]
struct TagDetailTemplate {
    name: String,
    entries: Vec<Entry>,

    user: Option<User>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tags", get(list_tags))
        .route("/tags/{name}", get(show_tag))
}

async fn list_tags(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> Result<impl IntoResponse, AppError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT t.name, COUNT(et.entry_id) as count
        FROM tags t
        JOIN entry_tags et ON et.tag_id = t.id
        GROUP BY t.id
        ORDER BY t.name ASC
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    let tags = rows
        .into_iter()
        .map(|(name, count)| TagWithCount { name, count })
        .collect();

    let template = TagListTemplate { tags, user };
    Ok(Html(template.render()?))
}

async fn show_tag(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    // An unknown tag renders an empty list rather than a 404.
    let entries: Vec<Entry> = sqlx::query_as(
        r#"
        SELECT e.* FROM entries e
        JOIN entry_tags et ON et.entry_id = e.id
        JOIN tags t ON t.id = et.tag_id
        WHERE t.name = ?
        ORDER BY e.date DESC
        "#,
    )
    .bind(&name)
    .fetch_all(&state.db)
    .await?;

    let template = TagDetailTemplate { name, entries, user };
    Ok(Html(template.render()?))
}
