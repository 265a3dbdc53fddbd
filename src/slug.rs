use sqlx::SqliteConnection;

/// Lowercase the title and collapse every run of non-word characters
/// (anything outside `[a-z0-9_]`) into a single hyphen.
pub fn normalize(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut in_run = false;

    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c);
            in_run = false;
        } else if !in_run {
            slug.push('-');
            in_run = true;
        }
    }

    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        // Entries must always carry a non-empty slug, even for all-symbol titles.
        "entry".to_string()
    } else {
        slug.to_string()
    }
}

/// Derive a slug from `title` that no other entry currently holds.
///
/// Collisions are resolved by appending `-1`, `-2`, ... until a free
/// candidate is found. When `exclude_entry_id` is given (editing an existing
/// entry), that entry's own row is ignored so an unchanged title keeps its
/// slug instead of colliding with itself.
pub async fn unique_slug(
    conn: &mut SqliteConnection,
    title: &str,
    exclude_entry_id: Option<&str>,
) -> Result<String, sqlx::Error> {
    let base = normalize(title);
    let mut counter: u32 = 0;

    loop {
        let candidate = if counter == 0 {
            base.clone()
        } else {
            format!("{}-{}", base, counter)
        };

        let taken: (i64,) = match exclude_entry_id {
            Some(id) => {
                sqlx::query_as("SELECT COUNT(*) FROM entries WHERE slug = ? AND id != ?")
                    .bind(&candidate)
                    .bind(id)
                    .fetch_one(&mut *conn)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM entries WHERE slug = ?")
                    .bind(&candidate)
                    .fetch_one(&mut *conn)
                    .await?
            }
        };

        if taken.0 == 0 {
            return Ok(candidate);
        }
        counter += 1;
    }
}
