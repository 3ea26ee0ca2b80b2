// per-user reading lists

use serde_json::Value;
use sqlx::AnyConnection;

use crate::credentials::resolve_account;
use crate::error::StoreResult;
use crate::sql::Database;
use crate::types::{normalize, Bid, Book, BookRow, NewBook, Patch, Shelf};

/// Book CRUD scoped to one account at a time.
///
/// Every statement filters on the caller's resolved `account_id` as well as
/// the `book_id`, so another account's book looks exactly like a missing one.
#[derive(Debug, Clone)]
pub struct LibraryStore {
	db: Database,
}

impl LibraryStore {
	pub fn new(db: Database) -> Self {
		LibraryStore { db }
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_all(&self, username: &str) -> StoreResult<Shelf> {
		let mut tx = self.db.begin().await?;
		let outcome = select_all(&mut tx, username).await;
		self.db.finish(tx, outcome).await
	}

	#[tracing::instrument(skip(self))]
	pub async fn fetch_one(&self, username: &str, book_id: Bid) -> StoreResult<Book> {
		let mut tx = self.db.begin().await?;
		let outcome = select_one(&mut tx, username, book_id).await;
		self.db.finish(tx, outcome).await
	}

	/// `body` needs `book` and `status`. Nothing is written unless both check out.
	#[tracing::instrument(skip(self, body))]
	pub async fn add_book(&self, username: &str, body: &Value) -> StoreResult<Book> {
		let mut tx = self.db.begin().await?;
		let outcome = insert(&mut tx, username, body).await;
		let book = self.db.finish(tx, outcome).await?;

		tracing::debug!(book_id = book.book_id, status = %book.status, "book added");
		Ok(book)
	}

	/// Applies one `{"op", "value"}` patch.
	#[tracing::instrument(skip(self, body))]
	pub async fn edit_book(&self, username: &str, book_id: Bid, body: &Value) -> StoreResult<Book> {
		let mut tx = self.db.begin().await?;
		let outcome = update(&mut tx, username, book_id, body).await;
		self.db.finish(tx, outcome).await
	}

	/// Runs every patch as its own `edit_book` call, in order. A failed patch
	/// doesn't stop the ones after it and earlier successes stay committed.
	pub async fn apply_patches(&self, username: &str, book_id: Bid, patches: &[Value]) -> Vec<StoreResult<Book>> {
		let mut outcomes = Vec::with_capacity(patches.len());
		for patch in patches {
			let outcome = self.edit_book(username, book_id, patch).await;
			if let Err(e) = &outcome {
				tracing::debug!(book_id, error = %e, "patch rejected");
			}
			outcomes.push(outcome);
		}
		outcomes
	}

	/// Returns the record as it was before deletion.
	#[tracing::instrument(skip(self))]
	pub async fn delete_book(&self, username: &str, book_id: Bid) -> StoreResult<Book> {
		let mut tx = self.db.begin().await?;
		let outcome = delete(&mut tx, username, book_id).await;
		self.db.finish(tx, outcome).await
	}
}

async fn select_all(conn: &mut AnyConnection, username: &str) -> StoreResult<Shelf> {
	let account = resolve_account(conn, username).await?;
	let rows = sqlx::query_as::<_, BookRow>(
		"SELECT book_id, book, status FROM library WHERE account_id = $1 ORDER BY book_id",
	)
	.bind(account.account_id)
	.fetch_all(&mut *conn)
	.await?;

	let books = rows
		.into_iter()
		.map(Book::try_from)
		.collect::<StoreResult<Vec<_>>>()?;
	Ok(Shelf::from_books(books))
}

async fn select_one(conn: &mut AnyConnection, username: &str, book_id: Bid) -> StoreResult<Book> {
	let account = resolve_account(conn, username).await?;
	let row = sqlx::query_as::<_, BookRow>(
		"SELECT book_id, book, status FROM library WHERE account_id = $1 AND book_id = $2",
	)
	.bind(account.account_id)
	.bind(book_id)
	.fetch_optional(&mut *conn)
	.await?;
	normalize(row)
}

async fn insert(conn: &mut AnyConnection, username: &str, body: &Value) -> StoreResult<Book> {
	let account = resolve_account(conn, username).await?;
	let new = NewBook::from_json(body)?;
	let row = sqlx::query_as::<_, BookRow>(
		"INSERT INTO library (account_id, book, status) VALUES ($1, $2, $3)
		RETURNING book_id, book, status",
	)
	.bind(account.account_id)
	.bind(new.book.to_string())
	.bind(new.status.as_str())
	.fetch_optional(&mut *conn)
	.await?;
	normalize(row)
}

async fn update(conn: &mut AnyConnection, username: &str, book_id: Bid, body: &Value) -> StoreResult<Book> {
	let account = resolve_account(conn, username).await?;
	let patch = Patch::from_json(body)?;
	// column comes from the allow-list in `Field`, never from the request
	let statement = format!(
		"UPDATE library SET {} = $1 WHERE account_id = $2 AND book_id = $3
		RETURNING book_id, book, status",
		patch.field().column()
	);
	let row = sqlx::query_as::<_, BookRow>(&statement)
		.bind(patch.column_value())
		.bind(account.account_id)
		.bind(book_id)
		.fetch_optional(&mut *conn)
		.await?;
	normalize(row)
}

async fn delete(conn: &mut AnyConnection, username: &str, book_id: Bid) -> StoreResult<Book> {
	let account = resolve_account(conn, username).await?;
	let row = sqlx::query_as::<_, BookRow>(
		"DELETE FROM library WHERE account_id = $1 AND book_id = $2
		RETURNING book_id, book, status",
	)
	.bind(account.account_id)
	.bind(book_id)
	.fetch_optional(&mut *conn)
	.await?;
	normalize(row)
}
