// http surface: basic auth in front of the stores

use std::path::Path;

use axum::{
	async_trait,
	extract::{FromRequestParts, Path as UrlPath, State},
	http::{header, request::Parts, HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::get,
	Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use maud::{html, Markup, DOCTYPE};
use serde_json::{json, Value};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::credentials::CredentialStore;
use crate::demo::Demo;
use crate::error::StoreError;
use crate::library::LibraryStore;
use crate::sql::Database;
use crate::types::{Bid, Book, Shelf, Status};

pub const ADMIN: &str = "admin";

#[derive(Clone)]
pub struct AppState {
	pub db: Database,
	pub credentials: CredentialStore,
	pub library: LibraryStore,
}

impl AppState {
	pub fn new(db: Database, credentials: CredentialStore) -> Self {
		let library = LibraryStore::new(db.clone());
		AppState { db, credentials, library }
	}
}

pub fn router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
	Router::new()
		.route("/", get(display_shelf))
		.route("/reset", get(reset))
		.route("/book", get(fetch_books).post(add_book))
		.route("/book/:book_id", get(get_book).patch(edit_book).delete(delete_book))
		.nest_service("/static", ServeDir::new(static_dir))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

/// Store errors as `{"error": message}` with a matching status code.
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
	fn from(err: StoreError) -> Self {
		ApiError(err)
	}
}

fn status_for(err: &StoreError) -> StatusCode {
	match err {
		StoreError::NotFound => StatusCode::NOT_FOUND,
		StoreError::MissingField(_) | StoreError::InvalidStatus(_) | StoreError::UnknownField(_) => {
			StatusCode::BAD_REQUEST
		}
		StoreError::DuplicateUser(_) => StatusCode::CONFLICT,
		StoreError::UnknownUser(_) => StatusCode::UNAUTHORIZED,
		StoreError::CorruptRecord { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		StoreError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
	}
}

fn error_body(err: &StoreError) -> Value {
	json!({"error": err.to_string()})
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = status_for(&self.0);
		if status.is_server_error() {
			tracing::error!(kind = self.0.kind(), error = %self.0, "request failed");
		}
		(status, Json(error_body(&self.0))).into_response()
	}
}

fn unauthorized() -> Response {
	(
		StatusCode::UNAUTHORIZED,
		[(header::WWW_AUTHENTICATE, r#"Basic realm="private""#)],
		Json(json!({"error": "Authentication required."})),
	)
		.into_response()
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
	let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
	let encoded = value.strip_prefix("Basic ")?;
	let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
	let (user, pass) = decoded.split_once(':')?;
	Some((user.to_string(), pass.to_string()))
}

/// The authenticated username.
pub struct User(pub String);

#[async_trait]
impl FromRequestParts<AppState> for User {
	type Rejection = Response;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
		let Some((username, password)) = basic_credentials(&parts.headers) else {
			return Err(unauthorized());
		};
		match state.credentials.verify(&username, &password).await {
			Ok(true) => Ok(User(username)),
			Ok(false) => {
				tracing::info!(%username, "rejected credentials");
				Err(unauthorized())
			}
			Err(e) => Err(ApiError(e).into_response()),
		}
	}
}

async fn reset(State(stt): State<AppState>, User(user): User) -> Result<Response, ApiError> {
	if user != ADMIN {
		return Ok((StatusCode::FORBIDDEN, Json(json!({"error": "Permission Denied."}))).into_response());
	}
	Demo::new(&stt.db, &stt.credentials, &stt.library).start_fresh().await?;
	Ok(Json(json!({"success": "Database initialized."})).into_response())
}

async fn fetch_books(State(stt): State<AppState>, User(user): User) -> Result<Json<Shelf>, ApiError> {
	Ok(Json(stt.library.list_all(&user).await?))
}

async fn add_book(
	State(stt): State<AppState>,
	User(user): User,
	Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
	let book = stt.library.add_book(&user, &body).await?;
	Ok((StatusCode::CREATED, Json(book)))
}

async fn get_book(
	State(stt): State<AppState>,
	User(user): User,
	UrlPath(book_id): UrlPath<Bid>,
) -> Result<Json<Book>, ApiError> {
	Ok(Json(stt.library.fetch_one(&user, book_id).await?))
}

/// Takes a list of patches (a lone patch object counts as a list of one) and
/// reports every outcome, successful or not.
async fn edit_book(
	State(stt): State<AppState>,
	User(user): User,
	UrlPath(book_id): UrlPath<Bid>,
	Json(body): Json<Value>,
) -> Json<Value> {
	let patches = match body {
		Value::Array(patches) => patches,
		single => vec![single],
	};
	let updated: Vec<Value> = stt
		.library
		.apply_patches(&user, book_id, &patches)
		.await
		.into_iter()
		.map(|outcome| match outcome {
			Ok(book) => json!(book),
			Err(e) => error_body(&e),
		})
		.collect();
	Json(json!({"updated": updated}))
}

async fn delete_book(
	State(stt): State<AppState>,
	User(user): User,
	UrlPath(book_id): UrlPath<Bid>,
) -> Result<Json<Book>, ApiError> {
	Ok(Json(stt.library.delete_book(&user, book_id).await?))
}

fn book_label(book: &Book) -> String {
	let title = book.book.get("title").and_then(Value::as_str);
	let author = book.book.get("author").and_then(Value::as_str);
	match (title, author) {
		(Some(title), Some(author)) => format!("{title} by {author}"),
		(Some(title), None) => title.to_string(),
		_ => book.book.to_string(),
	}
}

fn status_select(current: Status) -> Markup {
	html! {
		select.status name="status" {
			@for status in Status::ALL {
				option value=(status.as_str()) selected[status == current] { (status.as_str()) }
			}
		}
	}
}

async fn display_shelf(State(stt): State<AppState>, User(user): User) -> Result<Markup, ApiError> {
	let shelf = stt.library.list_all(&user).await?;

	Ok(html! {
		(DOCTYPE)
		html {
			head {
				meta charset="utf-8";
				title { "Reading List" }
				link rel="stylesheet" href="/static/style.css";
				script src="/static/client.js" defer {}
			}
			body {
				h1 { "Hello, " (user) }
				form id="add-book" {
					input name="title" placeholder="Title" required;
					input name="author" placeholder="Author";
					(status_select(Status::Next))
					button type="submit" { "Add" }
				}
				@for status in Status::ALL {
					section id=(status.as_str()) {
						h2 { (status.as_str()) }
						ul {
							@for book in shelf.bucket(status) {
								li data-book-id=(book.book_id) {
									(book_label(book))
									(status_select(book.status))
									button.delete type="button" { "Delete" }
								}
							}
						}
					}
				}
			}
		}
	})
}
