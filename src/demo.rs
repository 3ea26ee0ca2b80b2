// demo accounts and books, wipes everything first

use serde_json::{json, Value};

use crate::credentials::CredentialStore;
use crate::error::StoreResult;
use crate::library::LibraryStore;
use crate::sql::Database;
use crate::types::Status;

pub const DEMO_USERS: [(&str, &str); 2] = [("admin", "lifeuniverse"), ("guest", "sixtimesnine")];
pub const DEMO_READER: &str = "guest";

// Time Magazine's top novels
const DEMO_BOOKS: &[(Status, &str, &str)] = &[
	(Status::Now, "To Kill a Mockingbird", "Harper Lee"),
	(Status::Next, "1984", "George Orwell"),
	(Status::Next, "The Lord of the Rings", "J.R.R. Tolkien"),
	(Status::Next, "The Catcher in the Rye", "J.D. Salinger"),
	(Status::Done, "The Great Gatsby", "F. Scott Fitzgerald"),
	(Status::Done, "The Lion, the Witch, and the Wardrobe", "C.S. Lewis"),
	(Status::Done, "Lord of the Flies", "William Golding"),
	(Status::Done, "Animal Farm", "George Orwell"),
	(Status::Done, "Catch-22", "Joseph Heller"),
	(Status::Done, "The Grapes of Wrath", "John Steinbeck"),
];

pub struct Demo<'a> {
	db: &'a Database,
	credentials: &'a CredentialStore,
	library: &'a LibraryStore,
}

impl<'a> Demo<'a> {
	pub fn new(db: &'a Database, credentials: &'a CredentialStore, library: &'a LibraryStore) -> Self {
		Demo { db, credentials, library }
	}

	pub async fn start_fresh(&self) -> StoreResult<()> {
		tracing::info!("initializing database");
		self.db.initialize().await?;

		tracing::info!("creating users");
		for (username, password) in DEMO_USERS {
			self.credentials.create(username, password).await?;
		}

		tracing::info!("inserting books");
		for (status, title, author) in DEMO_BOOKS {
			let body: Value = json!({"book": {"title": title, "author": author}, "status": status});
			self.library.add_book(DEMO_READER, &body).await?;
		}
		tracing::info!(books = DEMO_BOOKS.len(), "demo data ready");
		Ok(())
	}
}
