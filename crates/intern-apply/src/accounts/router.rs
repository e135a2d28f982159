use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use super::session::{bearer_token, SessionError, SessionStore};
use super::store::{AccountError, AccountStore};

/// Shared handles for the account endpoints.
pub struct AccountState<S> {
    pub accounts: Arc<S>,
    pub sessions: Arc<SessionStore>,
}

impl<S> Clone for AccountState<S> {
    fn clone(&self) -> Self {
        Self {
            accounts: self.accounts.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Credentials {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Router builder exposing registration, login and logout.
pub fn account_router<S>(accounts: Arc<S>, sessions: Arc<SessionStore>) -> Router
where
    S: AccountStore + 'static,
{
    Router::new()
        .route("/api/register", post(register_handler::<S>))
        .route("/api/login", post(login_handler::<S>))
        .route("/api/logout", post(logout_handler::<S>))
        .route("/logout", post(logout_handler::<S>))
        .with_state(AccountState { accounts, sessions })
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({ "success": false, "message": message.into() });
    (status, Json(payload)).into_response()
}

fn internal(err: impl std::fmt::Display) -> Response {
    error!(error = %err, "account operation failed");
    let payload = json!({ "success": false, "message": "internal error" });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}

/// bcrypt is CPU bound, so credential work runs on the blocking pool.
async fn with_store<S, T, F>(accounts: Arc<S>, work: F) -> Result<Result<T, AccountError>, Response>
where
    S: AccountStore + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T, AccountError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&*accounts))
        .await
        .map_err(internal)
}

pub(crate) async fn register_handler<S>(
    State(state): State<AccountState<S>>,
    Json(credentials): Json<Credentials>,
) -> Response
where
    S: AccountStore + 'static,
{
    let (Some(username), Some(password)) = (credentials.username, credentials.password) else {
        return failure(StatusCode::BAD_REQUEST, "username and password are required");
    };

    let outcome = match with_store(state.accounts, move |store| {
        store.register(&username, &password)
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(response) => return response,
    };

    match outcome {
        Ok(_) => {
            let payload = json!({ "success": true, "message": "Registration successful!" });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err @ (AccountError::Conflict | AccountError::InvalidInput(_))) => {
            failure(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(other) => internal(other),
    }
}

pub(crate) async fn login_handler<S>(
    State(state): State<AccountState<S>>,
    Json(credentials): Json<Credentials>,
) -> Response
where
    S: AccountStore + 'static,
{
    let (Some(username), Some(password)) = (credentials.username, credentials.password) else {
        return failure(StatusCode::UNAUTHORIZED, "Invalid username or password");
    };

    let name = username.clone();
    let outcome = match with_store(state.accounts, move |store| {
        store.authenticate(&name, &password)
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(response) => return response,
    };

    match outcome {
        Ok(user_id) => match state.sessions.issue(user_id, &username) {
            Ok(token) => {
                info!(user_id = user_id.0, "login succeeded");
                let payload = json!({
                    "success": true,
                    "message": "Login successfully",
                    "token": token,
                });
                (StatusCode::OK, Json(payload)).into_response()
            }
            Err(err) => internal(err),
        },
        Err(AccountError::InvalidCredentials) => {
            failure(StatusCode::UNAUTHORIZED, "Invalid username or password")
        }
        Err(other) => internal(other),
    }
}

pub(crate) async fn logout_handler<S>(
    State(state): State<AccountState<S>>,
    headers: HeaderMap,
) -> Response
where
    S: AccountStore + 'static,
{
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
    {
        state.sessions.revoke(token);
    }

    let payload = json!({ "success": true, "message": "Logged out successfully!" });
    (StatusCode::OK, Json(payload)).into_response()
}

/// Middleware rejecting requests without a live bearer session.
///
/// The resolved [`super::SessionUser`] is stored in the request extensions.
pub async fn require_session(
    State(sessions): State<Arc<SessionStore>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token);

    let resolved = match token {
        Some(token) => sessions.resolve(token),
        None => Err(SessionError::Missing),
    };

    match resolved {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(SessionError::Poisoned) => internal(SessionError::Poisoned),
        Err(err) => failure(StatusCode::UNAUTHORIZED, err.to_string()),
    }
}
