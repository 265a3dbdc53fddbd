use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub struct TestApp {
    pub router: Router,
    pub db: SqlitePool,
}

impl TestApp {
    pub async fn new() -> Self {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .expect("Failed to create in-memory SQLite pool");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        let router = lernlog::build_app(pool.clone(), false).await;

        Self { router, db: pool }
    }

    /// Send a request through the app and return the response.
    pub async fn request(&self, req: Request<Body>) -> Response {
        tower::ServiceExt::oneshot(self.router.clone(), req)
            .await
            .unwrap()
    }

    /// Register a user through the registration form.
    pub async fn register(&self, email: &str, password: &str) {
        let body = format!(
            "email={}&password={}&password2={}",
            urlencode(email),
            urlencode(password),
            urlencode(password)
        );
        let resp = self.post_form("/register", &body, None).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }

    /// Log in as the given user and return the session cookie string.
    pub async fn login(&self, email: &str, password: &str) -> String {
        let body = format!("email={}&password={}", urlencode(email), urlencode(password));
        let resp = self.post_form("/login", &body, None).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        resp.headers()
            .get("set-cookie")
            .expect("Login should set a session cookie")
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string()
    }

    /// Register + login in one step, returning the session cookie.
    pub async fn signup(&self, email: &str) -> String {
        self.register(email, "hunter2").await;
        self.login(email, "hunter2").await
    }

    /// Create an entry through the form and return its slug from the database.
    pub async fn create_entry(&self, cookie: &str, title: &str, tags: &str) -> String {
        let body = format!(
            "title={}&date=2026-08-30&time=25&learned=Something+new&resources=A+book&tags={}",
            urlencode(title),
            urlencode(tags)
        );
        let resp = self.post_form("/entry", &body, Some(cookie)).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let (slug,): (String,) =
            sqlx::query_as("SELECT slug FROM entries WHERE title = ? ORDER BY created_at DESC")
                .bind(title)
                .fetch_one(&self.db)
                .await
                .expect("Entry should exist after creation");
        slug
    }

    /// Send a GET request with an optional session cookie.
    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let req = builder.body(Body::empty()).unwrap();
        self.request(req).await
    }

    /// Send a POST form request with an optional session cookie.
    pub async fn post_form(&self, uri: &str, body: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let req = builder.body(Body::from(body.to_string())).unwrap();
        self.request(req).await
    }

    pub async fn tag_count(&self, name: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&self.db)
            .await
            .unwrap();
        count
    }

    pub async fn tag_names_for_slug(&self, slug: &str) -> Vec<String> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT t.name FROM tags t
            JOIN entry_tags et ON et.tag_id = t.id
            JOIN entries e ON e.id = et.entry_id
            WHERE e.slug = ?
            ORDER BY t.name
            "#,
        )
        .bind(slug)
        .fetch_all(&self.db)
        .await
        .unwrap();
        rows.into_iter().map(|(name,)| name).collect()
    }
}

/// Percent-encode a form value. Only covers what the tests need.
pub fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => out.push(c),
            ' ' => out.push('+'),
            _ => {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{:02X}", b));
                }
            }
        }
    }
    out
}

/// Read the full response body as a String.
pub async fn body_string(resp: Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Assert that a response is a redirect to the given location.
pub fn assert_redirect(resp: &Response, expected_location: &str) {
    assert!(
        resp.status().is_redirection(),
        "Expected redirect, got {}",
        resp.status()
    );
    let location = resp
        .headers()
        .get("location")
        .expect("Redirect should have location header")
        .to_str()
        .unwrap();
    assert_eq!(location, expected_location);
}
