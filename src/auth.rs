//! Shared-password gate: session cookie checks, login and logout.

use axum::extract::{Extension, Form, Query, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use cookie::time::Duration as CookieDuration;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::AppState;
use crate::config::{LOGIN_ROUTE, LOGOUT_ROUTE, SESSION_COOKIE_NAME};
use crate::error::AppError;
use crate::html;

/// Gate in front of every route except login and logout. With no password
/// configured the tree is open; otherwise a request without a live session
/// gets the login form, remembering where it was headed.
pub async fn require_session(
    Extension(state): Extension<Arc<AppState>>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == LOGIN_ROUTE || path == LOGOUT_ROUTE {
        return next.run(req).await;
    }
    if state.password.is_none() {
        return next.run(req).await;
    }
    if let Some(cookie) = jar.get(SESSION_COOKIE_NAME)
        && state.sessions.validate(cookie.value()).await
    {
        return next.run(req).await;
    }

    let next = match req.uri().query() {
        Some(query) => format!("{}?{}", req.uri().path(), query),
        None => req.uri().path().to_string(),
    };
    AppError::Unauthorized { next }.into_response()
}

#[derive(Deserialize)]
pub(crate) struct NextQuery {
    next: Option<String>,
}

/// Renders the login form. Served with 401 so clients see the gate even on a
/// direct GET.
pub async fn login_form(Query(query): Query<NextQuery>) -> Response {
    let next = query.next.unwrap_or_else(|| "/".to_string());
    (
        StatusCode::UNAUTHORIZED,
        Html(html::login_page(&next, None)),
    )
        .into_response()
}

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    password: String,
    #[serde(default)]
    next: String,
}

/// Validates the shared password, mints a session, and sets the cookie.
pub async fn login_submit(
    Extension(state): Extension<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let Some(expected) = state.password.as_deref() else {
        return (StatusCode::NOT_FOUND, "No password is configured").into_response();
    };
    let next = if form.next.is_empty() {
        "/".to_string()
    } else {
        form.next
    };

    if form.password != expected {
        warn!("login rejected: wrong password");
        return (
            StatusCode::UNAUTHORIZED,
            Html(html::login_page(&next, Some("Wrong password, try again."))),
        )
            .into_response();
    }

    let token = state.sessions.create().await;
    info!("session created");
    let cookie = Cookie::build((SESSION_COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(
            state.sessions.ttl().as_secs() as i64
        ))
        .build();
    (jar.add(cookie), Redirect::to(&next)).into_response()
}

/// Drops the session server-side and clears the cookie (`Max-Age=0`).
pub async fn logout(Extension(state): Extension<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE_NAME) {
        state.sessions.invalidate(cookie.value()).await;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE_NAME).path("/").build());
    (jar, Redirect::to(LOGIN_ROUTE)).into_response()
}
