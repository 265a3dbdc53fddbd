use askama::Template;
use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
    Form, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use uuid::Uuid;

use crate::auth::{AuthUser, MaybeUser};
use crate::error::AppError;
use crate::models::user::is_unique_violation;
use crate::models::{Entry, User};
use crate::{slug, tags, AppState};

#[derive(Template)]
#[template(path = "entries/list.html")]
struct EntryListTemplate {
    entries: Vec<Entry>,

    user: Option<User>,
}

#[derive(Template)]
#[template(path = "entries/detail.html")]
struct EntryDetailTemplate {
    entry: Entry,
    tag_names: Vec<String>,

    user: Option<User>,
}

#[derive(Template)]
#[template(path = "entries/form.html")]
struct EntryFormTemplate {
    heading: String,
    action: String,
    title: String,
    date: String,
    time: String,
    learned: String,
    resources: String,
    tags_string: String,
    errors: HashMap<String, String>,

    user: Option<User>,
}

#[derive(Deserialize)]
pub struct EntryForm {
    title: String,
    date: String,
    time: String,
    learned: String,
    resources: String,
    tags: Option<String>,
}

fn validate_entry_form(form: &EntryForm) -> HashMap<String, String> {
    let mut errors = HashMap::new();

    if form.title.trim().is_empty() {
        errors.insert("title".to_string(), "Title is required".to_string());
    }

    if form.title.len() > 500 {
        errors.insert("title".to_string(), "Title must be under 500 characters".to_string());
    }

    if NaiveDate::parse_from_str(form.date.trim(), "%Y-%m-%d").is_err() {
        errors.insert("date".to_string(), "Date must be YYYY-MM-DD".to_string());
    }

    match form.time.trim().parse::<i64>() {
        Ok(minutes) if minutes >= 1 => {}
        _ => {
            errors.insert("time".to_string(), "Time must be at least 1 minute".to_string());
        }
    }

    if form.learned.trim().is_empty() {
        errors.insert("learned".to_string(), "What you learned is required".to_string());
    }

    if form.resources.trim().is_empty() {
        errors.insert("resources".to_string(), "Resources are required".to_string());
    }

    errors
}

impl EntryFormTemplate {
    fn blank(user: User) -> Self {
        Self {
            heading: "New entry".to_string(),
            action: "/entry".to_string(),
            title: String::new(),
            date: String::new(),
            time: String::new(),
            learned: String::new(),
            resources: String::new(),
            tags_string: String::new(),
            errors: HashMap::new(),
            user: Some(user),
        }
    }

    fn from_form(heading: &str, action: String, form: &EntryForm, errors: HashMap<String, String>, user: User) -> Self {
        Self {
            heading: heading.to_string(),
            action,
            title: form.title.clone(),
            date: form.date.clone(),
            time: form.time.clone(),
            learned: form.learned.clone(),
            resources: form.resources.clone(),
            tags_string: form.tags.as_deref().unwrap_or("").to_string(),
            errors,
            user: Some(user),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_entries))
        .route("/list", get(list_entries))
        .route("/entry", get(new_entry_form).post(create_entry))
        .route("/entry/{slug}", get(edit_entry_form).post(update_entry))
        .route("/entry/{slug}/delete", post(delete_entry))
        .route("/details/{slug}", get(entry_detail))
}

async fn entry_by_slug(
    conn: &mut SqliteConnection,
    slug: &str,
) -> Result<Option<Entry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM entries WHERE slug = ?")
        .bind(slug)
        .fetch_optional(conn)
        .await
}

async fn list_entries(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> Result<impl IntoResponse, AppError> {
    let entries: Vec<Entry> =
        sqlx::query_as("SELECT * FROM entries ORDER BY date DESC, created_at DESC")
            .fetch_all(&state.db)
            .await?;

    let template = EntryListTemplate { entries, user };
    Ok(Html(template.render()?))
}

async fn entry_detail(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(entry_slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.db.acquire().await?;

    let entry = entry_by_slug(&mut conn, &entry_slug)
        .await?
        .ok_or(AppError::NotFound)?;

    let tag_names = tags::names_for_entry(&mut conn, &entry.id).await?;

    let template = EntryDetailTemplate { entry, tag_names, user };
    Ok(Html(template.render()?))
}

async fn new_entry_form(AuthUser(user): AuthUser) -> Result<impl IntoResponse, AppError> {
    let template = EntryFormTemplate::blank(user);
    Ok(Html(template.render()?))
}

async fn insert_entry(
    conn: &mut SqliteConnection,
    entry: &Entry,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO entries (id, title, slug, date, time_spent, learned, resources, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.title)
    .bind(&entry.slug)
    .bind(&entry.date)
    .bind(entry.time_spent)
    .bind(&entry.learned)
    .bind(&entry.resources)
    .bind(&entry.created_at)
    .bind(&entry.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn create_entry(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<EntryForm>,
) -> Result<impl IntoResponse, AppError> {
    let errors = validate_entry_form(&form);
    if !errors.is_empty() {
        let template =
            EntryFormTemplate::from_form("New entry", "/entry".to_string(), &form, errors, user);
        return Ok(Html(template.render()?).into_response());
    }

    let now = Utc::now().to_rfc3339();
    let time_spent: i64 = form.time.trim().parse().unwrap_or_default();

    let mut tx = state.db.begin().await?;

    let mut entry = Entry {
        id: Uuid::new_v4().to_string(),
        title: form.title.trim().to_string(),
        slug: slug::unique_slug(&mut tx, form.title.trim(), None).await?,
        date: form.date.trim().to_string(),
        time_spent,
        learned: form.learned.clone(),
        resources: form.resources.clone(),
        created_at: now.clone(),
        updated_at: now,
    };

    match insert_entry(&mut tx, &entry).await {
        Ok(()) => {}
        Err(e) if is_unique_violation(&e) => {
            // Lost a slug race to a concurrent insert; resolve once more.
            entry.slug = slug::unique_slug(&mut tx, &entry.title, None).await?;
            insert_entry(&mut tx, &entry).await?;
        }
        Err(e) => return Err(e.into()),
    }

    tags::reconcile(&mut tx, &entry.id, form.tags.as_deref().unwrap_or("")).await?;

    tx.commit().await?;

    Ok(Redirect::to("/").into_response())
}

async fn edit_entry_form(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(entry_slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.db.acquire().await?;

    let entry = entry_by_slug(&mut conn, &entry_slug)
        .await?
        .ok_or(AppError::NotFound)?;

    let tags_string = tags::names_for_entry(&mut conn, &entry.id).await?.join(", ");

    let template = EntryFormTemplate {
        heading: "Edit entry".to_string(),
        action: format!("/entry/{}", entry.slug),
        title: entry.title,
        date: entry.date,
        time: entry.time_spent.to_string(),
        learned: entry.learned,
        resources: entry.resources,
        tags_string,
        errors: HashMap::new(),
        user: Some(user),
    };
    Ok(Html(template.render()?))
}

async fn update_entry_row(
    conn: &mut SqliteConnection,
    entry_id: &str,
    form: &EntryForm,
    new_slug: &str,
    now: &str,
) -> Result<(), sqlx::Error> {
    let time_spent: i64 = form.time.trim().parse().unwrap_or_default();

    sqlx::query(
        r#"
        UPDATE entries
        SET title = ?, slug = ?, date = ?, time_spent = ?, learned = ?, resources = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(form.title.trim())
    .bind(new_slug)
    .bind(form.date.trim())
    .bind(time_spent)
    .bind(&form.learned)
    .bind(&form.resources)
    .bind(now)
    .bind(entry_id)
    .execute(conn)
    .await?;
    Ok(())
}

async fn update_entry(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(entry_slug): Path<String>,
    Form(form): Form<EntryForm>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = state.db.begin().await?;

    let entry = entry_by_slug(&mut tx, &entry_slug)
        .await?
        .ok_or(AppError::NotFound)?;

    let errors = validate_entry_form(&form);
    if !errors.is_empty() {
        let template = EntryFormTemplate::from_form(
            "Edit entry",
            format!("/entry/{}", entry.slug),
            &form,
            errors,
            user,
        );
        return Ok(Html(template.render()?).into_response());
    }

    let now = Utc::now().to_rfc3339();
    let title = form.title.trim().to_string();

    // The entry's own row is excluded from the collision check, so an
    // unchanged title keeps its slug.
    let mut new_slug = slug::unique_slug(&mut tx, &title, Some(&entry.id)).await?;

    match update_entry_row(&mut tx, &entry.id, &form, &new_slug, &now).await {
        Ok(()) => {}
        Err(e) if is_unique_violation(&e) => {
            new_slug = slug::unique_slug(&mut tx, &title, Some(&entry.id)).await?;
            update_entry_row(&mut tx, &entry.id, &form, &new_slug, &now).await?;
        }
        Err(e) => return Err(e.into()),
    }

    tags::reconcile(&mut tx, &entry.id, form.tags.as_deref().unwrap_or("")).await?;

    tx.commit().await?;

    Ok(Redirect::to(&format!("/details/{}", new_slug)).into_response())
}

async fn delete_entry(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(entry_slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = state.db.begin().await?;

    let entry = entry_by_slug(&mut tx, &entry_slug)
        .await?
        .ok_or(AppError::NotFound)?;

    // Associations go first so garbage collection sees the entry's tags as
    // unreferenced before the entry row itself disappears.
    sqlx::query("DELETE FROM entry_tags WHERE entry_id = ?")
        .bind(&entry.id)
        .execute(&mut *tx)
        .await?;

    tags::collect_orphans(&mut tx).await?;

    sqlx::query("DELETE FROM entries WHERE id = ?")
        .bind(&entry.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Redirect::to("/"))
}
