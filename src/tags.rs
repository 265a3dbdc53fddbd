use sqlx::SqliteConnection;

use crate::models::{EntryTag, Tag};

/// Split a raw comma-separated tag string into the canonical name set.
///
/// Pieces are trimmed, empties dropped (a blank field yields zero tags), and
/// duplicates removed case-insensitively, keeping the first-typed form:
/// `"Go, go , Rust"` parses to `["Go", "Rust"]`.
pub fn parse_tag_names(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for piece in raw.split(',') {
        let name = piece.trim();
        if name.is_empty() {
            continue;
        }
        let dup = names.iter().any(|n| n.eq_ignore_ascii_case(name));
        if !dup {
            names.push(name.to_string());
        }
    }

    names
}

/// Replace an entry's tag associations with the set parsed from `raw`.
///
/// Existing associations are removed and orphaned tags collected before the
/// new set is linked. A tag that reappears in the new set may be deleted and
/// immediately recreated; tag identity carries no state beyond its name, so
/// this is harmless. Callers run this inside the same transaction as the
/// entry write.
pub async fn reconcile(
    conn: &mut SqliteConnection,
    entry_id: &str,
    raw: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM entry_tags WHERE entry_id = ?")
        .bind(entry_id)
        .execute(&mut *conn)
        .await?;

    collect_orphans(&mut *conn).await?;

    for name in parse_tag_names(raw) {
        let link = EntryTag {
            entry_id: entry_id.to_string(),
            tag_id: get_or_create_tag(&mut *conn, &name).await?,
        };

        sqlx::query("INSERT OR IGNORE INTO entry_tags (entry_id, tag_id) VALUES (?, ?)")
            .bind(&link.entry_id)
            .bind(&link.tag_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Atomic get-or-create keyed on the exact tag name. The insert races safely
/// against concurrent creators: ON CONFLICT turns the loser's insert into a
/// no-op and the follow-up select picks up whichever row won.
async fn get_or_create_tag(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<String, sqlx::Error> {
    let tag = Tag::new(name);

    sqlx::query("INSERT INTO tags (id, name, created_at) VALUES (?, ?, ?) ON CONFLICT(name) DO NOTHING")
        .bind(&tag.id)
        .bind(&tag.name)
        .bind(&tag.created_at)
        .execute(&mut *conn)
        .await?;

    let (tag_id,): (String,) = sqlx::query_as("SELECT id FROM tags WHERE name = ?")
        .bind(&tag.name)
        .fetch_one(&mut *conn)
        .await?;

    Ok(tag_id)
}

/// Delete every tag no entry references. Full scan of the tag table; fine at
/// journal scale.
pub async fn collect_orphans(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM tags WHERE id NOT IN (SELECT DISTINCT tag_id FROM entry_tags)")
        .execute(conn)
        .await?;
    Ok(())
}

/// Tag names associated with an entry, name-ordered. The edit form joins
/// these with ", " to rebuild the editable tag string.
pub async fn names_for_entry(
    conn: &mut SqliteConnection,
    entry_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT t.name FROM tags t JOIN entry_tags et ON et.tag_id = t.id WHERE et.entry_id = ? ORDER BY t.name",
    )
    .bind(entry_id)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(|(name,)| name).collect())
}
