use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

pub type Bid = i64;
pub type Uid = i64;

/// Reading status, one bucket each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
	Now,
	Next,
	Done,
}

impl Status {
	pub const ALL: [Status; 3] = [Status::Now, Status::Next, Status::Done];

	pub fn as_str(self) -> &'static str {
		match self {
			Status::Now => "now",
			Status::Next => "next",
			Status::Done => "done",
		}
	}

	fn from_json(value: &Value) -> StoreResult<Self> {
		match value {
			Value::String(s) => s.parse(),
			other => Err(StoreError::InvalidStatus(other.to_string())),
		}
	}
}

impl FromStr for Status {
	type Err = StoreError;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(match s {
			"now" => Status::Now,
			"next" => Status::Next,
			"done" => Status::Done,
			_ => return Err(StoreError::InvalidStatus(s.to_string())),
		})
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A reading-list entry as handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
	pub book_id: Bid,
	pub book: Value,
	pub status: Status,
}

/// Raw `library` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookRow {
	pub book_id: Bid,
	pub book: String,
	pub status: String,
}

impl TryFrom<BookRow> for Book {
	type Error = StoreError;
	fn try_from(row: BookRow) -> Result<Self, Self::Error> {
		let book = serde_json::from_str(&row.book).map_err(|e| StoreError::CorruptRecord {
			book_id: row.book_id,
			reason: e.to_string(),
		})?;
		let status = row.status.parse().map_err(|_| StoreError::CorruptRecord {
			book_id: row.book_id,
			reason: format!("unknown status {:?}", row.status),
		})?;
		Ok(Book { book_id: row.book_id, book, status })
	}
}

/// Shapes a single-row result. No row is [`StoreError::NotFound`], never an empty record.
pub fn normalize(row: Option<BookRow>) -> StoreResult<Book> {
	row.ok_or(StoreError::NotFound)?.try_into()
}

/// All of one account's books, grouped by status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shelf {
	pub now: Vec<Book>,
	pub next: Vec<Book>,
	pub done: Vec<Book>,
}

impl Shelf {
	pub fn from_books(books: impl IntoIterator<Item = Book>) -> Self {
		let mut shelf = Shelf::default();
		for book in books {
			shelf.bucket_mut(book.status).push(book);
		}
		shelf
	}

	pub fn bucket(&self, status: Status) -> &[Book] {
		match status {
			Status::Now => &self.now,
			Status::Next => &self.next,
			Status::Done => &self.done,
		}
	}

	fn bucket_mut(&mut self, status: Status) -> &mut Vec<Book> {
		match status {
			Status::Now => &mut self.now,
			Status::Next => &mut self.next,
			Status::Done => &mut self.done,
		}
	}

	pub fn len(&self) -> usize {
		self.now.len() + self.next.len() + self.done.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

fn field<'a>(body: &'a Value, name: &'static str) -> StoreResult<&'a Value> {
	body.get(name).ok_or(StoreError::MissingField(name))
}

/// Validated body of an add request.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
	pub book: Value,
	pub status: Status,
}

impl NewBook {
	/// Requires `book` and `status`, checked in that order.
	pub fn from_json(body: &Value) -> StoreResult<Self> {
		let book = field(body, "book")?.clone();
		let status = Status::from_json(field(body, "status")?)?;
		Ok(NewBook { book, status })
	}
}

/// Columns a patch may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
	Book,
	Status,
}

impl Field {
	pub fn column(self) -> &'static str {
		match self {
			Field::Book => "book",
			Field::Status => "status",
		}
	}
}

impl FromStr for Field {
	type Err = StoreError;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"book" => Ok(Field::Book),
			"status" => Ok(Field::Status),
			_ => Err(StoreError::UnknownField(s.to_string())),
		}
	}
}

/// A single-field edit, `{"op": field, "value": json}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
	Book(Value),
	Status(Status),
}

impl Patch {
	pub fn from_json(body: &Value) -> StoreResult<Self> {
		let op = field(body, "op")?;
		let value = field(body, "value")?;
		let target = match op {
			Value::String(name) => name.parse()?,
			other => return Err(StoreError::UnknownField(other.to_string())),
		};
		Ok(match target {
			Field::Book => Patch::Book(value.clone()),
			Field::Status => Patch::Status(Status::from_json(value)?),
		})
	}

	pub fn field(&self) -> Field {
		match self {
			Patch::Book(_) => Field::Book,
			Patch::Status(_) => Field::Status,
		}
	}

	/// Column value as stored: books as JSON text, statuses as their name.
	pub fn column_value(&self) -> String {
		match self {
			Patch::Book(book) => book.to_string(),
			Patch::Status(status) => status.as_str().to_string(),
		}
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
	pub account_id: Uid,
	pub username: String,
	pub password_hash: String,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn row(book: &str, status: &str) -> BookRow {
		BookRow { book_id: 7, book: book.to_string(), status: status.to_string() }
	}

	#[test]
	fn test_status_parsing() {
		assert_eq!("next".parse::<Status>().unwrap(), Status::Next);
		assert!(matches!("Now".parse::<Status>(), Err(StoreError::InvalidStatus(_))));
		assert!(matches!(Status::from_json(&json!(1)), Err(StoreError::InvalidStatus(_))));
	}

	#[test]
	fn test_normalize_missing_row_is_not_found() {
		assert!(matches!(normalize(None), Err(StoreError::NotFound)));
	}

	#[test]
	fn test_normalize_row() {
		let book = normalize(Some(row(r#"{"title":"Dune"}"#, "done"))).unwrap();
		assert_eq!(book, Book { book_id: 7, book: json!({"title": "Dune"}), status: Status::Done });
	}

	#[test]
	fn test_normalize_rejects_corrupt_rows() {
		assert!(matches!(normalize(Some(row("{not json", "now"))), Err(StoreError::CorruptRecord { book_id: 7, .. })));
		assert!(matches!(normalize(Some(row("{}", "later"))), Err(StoreError::CorruptRecord { .. })));
	}

	#[test]
	fn test_book_serializes_flat() {
		let book = Book { book_id: 1, book: json!({"title": "Emma"}), status: Status::Now };
		assert_eq!(
			serde_json::to_value(&book).unwrap(),
			json!({"book_id": 1, "book": {"title": "Emma"}, "status": "now"})
		);
	}

	#[test]
	fn test_new_book_requires_fields_in_order() {
		assert!(matches!(NewBook::from_json(&json!({})), Err(StoreError::MissingField("book"))));
		assert!(matches!(
			NewBook::from_json(&json!({"book": {"title": "Emma"}})),
			Err(StoreError::MissingField("status"))
		));
		assert!(matches!(
			NewBook::from_json(&json!({"book": "Emma", "status": "someday"})),
			Err(StoreError::InvalidStatus(_))
		));
		let new = NewBook::from_json(&json!({"book": "Emma", "status": "next"})).unwrap();
		assert_eq!(new.status, Status::Next);
	}

	#[test]
	fn test_patch_allow_list() {
		assert!(matches!(
			Patch::from_json(&json!({"op": "account_id", "value": 2})),
			Err(StoreError::UnknownField(f)) if f == "account_id"
		));
		assert!(matches!(
			Patch::from_json(&json!({"op": "status = 'done'; --", "value": 2})),
			Err(StoreError::UnknownField(_))
		));
		assert!(matches!(Patch::from_json(&json!({"op": 3, "value": 2})), Err(StoreError::UnknownField(_))));
	}

	#[test]
	fn test_patch_missing_fields() {
		assert!(matches!(Patch::from_json(&json!({"value": 1})), Err(StoreError::MissingField("op"))));
		assert!(matches!(Patch::from_json(&json!({"op": "book"})), Err(StoreError::MissingField("value"))));
	}

	#[test]
	fn test_patch_column_values() {
		let patch = Patch::from_json(&json!({"op": "book", "value": {"title": "Emma"}})).unwrap();
		assert_eq!(patch.field(), Field::Book);
		assert_eq!(patch.column_value(), r#"{"title":"Emma"}"#);

		let patch = Patch::from_json(&json!({"op": "status", "value": "done"})).unwrap();
		assert_eq!(patch, Patch::Status(Status::Done));
		assert_eq!(patch.column_value(), "done");
	}

	#[test]
	fn test_shelf_keeps_every_bucket() {
		let shelf = Shelf::from_books(vec![Book { book_id: 1, book: json!(null), status: Status::Done }]);
		assert!(shelf.now.is_empty());
		assert!(shelf.next.is_empty());
		assert_eq!(shelf.bucket(Status::Done).len(), 1);
		assert_eq!(
			serde_json::to_value(&Shelf::default()).unwrap(),
			json!({"now": [], "next": [], "done": []})
		);
	}
}
