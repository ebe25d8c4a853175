//! Resolves the caller's owner id from the `User` cookie.

use crate::error::Result;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use snip_core::OwnerId;
use tracing::debug;

pub const COOKIE_NAME: &str = "User";

/// The owner of the current request, inserted by [`identify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner(pub OwnerId);

pub async fn identify(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let identified = state.identity().identify(presented_token(&jar))?;
    let owner = identified.owner();
    request.extensions_mut().insert(Owner(owner));

    let response = next.run(request).await;

    match identified.issued_token() {
        Some(token) => {
            debug!(%owner, "issued new identity");
            Ok((jar.add(identity_cookie(token.to_string())), response).into_response())
        }
        None => Ok(response),
    }
}

fn presented_token(jar: &CookieJar) -> Option<&str> {
    jar.get(COOKIE_NAME).map(|cookie| cookie.value_trimmed())
}

fn identity_cookie(token: String) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .build()
}
