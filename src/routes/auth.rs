use askama::Template;
use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::auth::{login_user, logout_user};
use crate::error::AppError;
use crate::models::user::CreateUserError;
use crate::models::User;
use crate::AppState;

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    error: Option<String>,
    email: String,

    user: Option<User>,
}

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterTemplate {
    error: Option<String>,
    email: String,

    user: Option<User>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct RegisterForm {
    email: String,
    password: String,
    password2: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login_submit))
        .route("/register", get(register_page).post(register_submit))
        .route("/logout", post(logout))
}

async fn login_page() -> Result<impl IntoResponse, AppError> {
    let template = LoginTemplate {
        error: None,
        email: String::new(),

        user: None,
    };
    Ok(Html(template.render()?))
}

async fn login_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::by_email(&state.db, &form.email).await?;

    // Same message whether the email is unknown or the password is wrong.
    match user {
        Some(user) if user.verify_password(&form.password) => {
            login_user(&session, user).await?;
            Ok(Redirect::to("/").into_response())
        }
        _ => {
            let template = LoginTemplate {
                error: Some("Your email or password doesn't match!".to_string()),
                email: form.email,

                user: None,
            };
            Ok(Html(template.render()?).into_response())
        }
    }
}

fn validate_register_form(form: &RegisterForm) -> Option<String> {
    if form.email.trim().is_empty() || !form.email.contains('@') {
        return Some("A valid email address is required".to_string());
    }
    if form.password.is_empty() {
        return Some("Password is required".to_string());
    }
    if form.password != form.password2 {
        return Some("Passwords must match".to_string());
    }
    None
}

async fn register_page() -> Result<impl IntoResponse, AppError> {
    let template = RegisterTemplate {
        error: None,
        email: String::new(),

        user: None,
    };
    Ok(Html(template.render()?))
}

async fn register_submit(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(error) = validate_register_form(&form) {
        let template = RegisterTemplate {
            error: Some(error),
            email: form.email,

            user: None,
        };
        return Ok(Html(template.render()?).into_response());
    }

    match User::create(&state.db, &form.email, &form.password).await {
        Ok(_) => Ok(Redirect::to("/login").into_response()),
        Err(CreateUserError::EmailTaken) => {
            let template = RegisterTemplate {
                error: Some("That email address already has an associated account!".to_string()),
                email: form.email,

                user: None,
            };
            Ok(Html(template.render()?).into_response())
        }
        Err(CreateUserError::Database(e)) => Err(e.into()),
        Err(CreateUserError::Hash(e)) => Err(e.into()),
    }
}

async fn logout(session: Session) -> Result<impl IntoResponse, AppError> {
    logout_user(&session).await?;
    Ok(Redirect::to("/"))
}
