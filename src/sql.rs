use std::time::Duration;

use sqlx::any::AnyPoolOptions;
use sqlx::{Any, AnyConnection, AnyPool, Transaction};

use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};

/// Which DDL to speak. Queries are shared, both drivers take `$n` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
	Postgres,
	Sqlite,
}

impl Dialect {
	fn schema(self) -> &'static [&'static str] {
		match self {
			Dialect::Postgres => PG_TABLE_SCHEMA,
			Dialect::Sqlite => SQLITE_TABLE_SCHEMA,
		}
	}
}

/// Pooled handle on the store. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct Database {
	pool: AnyPool,
	dialect: Dialect,
}

impl Database {
	pub async fn connect(config: &DatabaseConfig) -> Result<Database, sqlx::Error> {
		sqlx::any::install_default_drivers();

		let dialect = match config {
			DatabaseConfig::Postgres(_) => Dialect::Postgres,
			DatabaseConfig::Sqlite(_) => Dialect::Sqlite,
		};

		let pool = AnyPoolOptions::new()
			.max_connections(5)
			.acquire_timeout(Duration::from_secs(3))
			.connect(&config.url())
			.await?;

		tracing::debug!(?dialect, "connected to database");
		Ok(Database { pool, dialect })
	}

	pub fn dialect(&self) -> Dialect {
		self.dialect
	}

	/// One transaction per store operation; close it with [`Database::finish`].
	pub async fn begin(&self) -> StoreResult<Transaction<'static, Any>> {
		Ok(self.pool.begin().await?)
	}

	/// Commits on `Ok`, rolls back on `Err`. The rollback is awaited, not left
	/// to drop: SQLite holds a failed write's lock until it runs.
	pub async fn finish<T>(&self, tx: Transaction<'static, Any>, outcome: StoreResult<T>) -> StoreResult<T> {
		match outcome {
			Ok(value) => {
				tx.commit().await?;
				Ok(value)
			}
			Err(e) => {
				if let Err(rollback) = tx.rollback().await {
					tracing::warn!(error = %rollback, "rollback failed");
				}
				Err(e)
			}
		}
	}

	/// Creates missing tables, leaves existing data alone.
	pub async fn ensure_schema(&self) -> StoreResult<()> {
		let mut tx = self.begin().await?;
		let outcome = run_all(&mut tx, self.dialect.schema()).await;
		self.finish(tx, outcome).await
	}

	/// Drops both tables and recreates them. Destroys every account and book.
	pub async fn initialize(&self) -> StoreResult<()> {
		let mut tx = self.begin().await?;
		let outcome = match run_all(&mut tx, DROP_TABLES).await {
			Ok(()) => run_all(&mut tx, self.dialect.schema()).await,
			Err(e) => Err(e),
		};
		self.finish(tx, outcome).await?;
		tracing::info!("database initialized");
		Ok(())
	}

	pub async fn close(&self) {
		self.pool.close().await
	}
}

async fn run_all(conn: &mut AnyConnection, statements: &[&str]) -> Result<(), StoreError> {
	for statement in statements {
		sqlx::query(statement).execute(&mut *conn).await?;
	}
	Ok(())
}

// library goes first, it references accounts
const DROP_TABLES: &[&str] = &[
	"DROP TABLE IF EXISTS library",
	"DROP TABLE IF EXISTS accounts",
];

pub const PG_TABLE_SCHEMA: &[&str] = &[
	r#"
CREATE TABLE IF NOT EXISTS accounts (
	account_id BIGSERIAL PRIMARY KEY,
	username TEXT NOT NULL UNIQUE,
	password_hash TEXT NOT NULL
)"#,
	r#"
CREATE TABLE IF NOT EXISTS library (
	book_id BIGSERIAL PRIMARY KEY,
	account_id BIGINT NOT NULL REFERENCES accounts (account_id),
	book TEXT NOT NULL,
	status TEXT NOT NULL CHECK (status IN ('now', 'next', 'done'))
)"#,
	"CREATE INDEX IF NOT EXISTS library_account_idx ON library (account_id)",
];

pub const SQLITE_TABLE_SCHEMA: &[&str] = &[
	r#"
CREATE TABLE IF NOT EXISTS accounts (
	account_id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	username TEXT NOT NULL UNIQUE,
	password_hash TEXT NOT NULL
)"#,
	r#"
CREATE TABLE IF NOT EXISTS library (
	book_id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	account_id INTEGER NOT NULL,
	book TEXT NOT NULL,
	status TEXT NOT NULL CHECK (status IN ('now', 'next', 'done')),
	FOREIGN KEY(account_id) REFERENCES accounts(account_id)
)"#,
	"CREATE INDEX IF NOT EXISTS library_account_idx ON library (account_id)",
];

/// Throwaway SQLite database with the schema in place.
#[cfg(test)]
pub(crate) async fn scratch_database() -> (Database, tempfile::TempDir) {
	let dir = tempfile::tempdir().unwrap();
	let url = format!("sqlite://{}?mode=rwc", dir.path().join("readlist.db").display());
	let db = Database::connect(&DatabaseConfig::Sqlite(url)).await.unwrap();
	db.ensure_schema().await.unwrap();
	(db, dir)
}

#[cfg(test)]
mod tests {
	use super::*;
	use sqlx::Row;

	async fn table_count(db: &Database) -> i64 {
		let mut tx = db.begin().await.unwrap();
		let row = sqlx::query(
			"SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name IN ('accounts', 'library')",
		)
		.fetch_one(&mut *tx)
		.await
		.unwrap();
		row.try_get::<i64, _>("n").unwrap()
	}

	#[tokio::test]
	async fn test_schema_creates_both_tables() {
		let (db, _dir) = scratch_database().await;
		assert_eq!(db.dialect(), Dialect::Sqlite);
		assert_eq!(table_count(&db).await, 2);
		// idempotent
		db.ensure_schema().await.unwrap();
		assert_eq!(table_count(&db).await, 2);
	}

	#[tokio::test]
	async fn test_initialize_wipes_rows() {
		let (db, _dir) = scratch_database().await;
		let mut tx = db.begin().await.unwrap();
		sqlx::query("INSERT INTO accounts (username, password_hash) VALUES ($1, $2)")
			.bind("someone")
			.bind("x")
			.execute(&mut *tx)
			.await
			.unwrap();
		tx.commit().await.unwrap();

		db.initialize().await.unwrap();

		let mut tx = db.begin().await.unwrap();
		let row = sqlx::query("SELECT COUNT(*) AS n FROM accounts").fetch_one(&mut *tx).await.unwrap();
		assert_eq!(row.try_get::<i64, _>("n").unwrap(), 0);
	}

	#[tokio::test]
	async fn test_status_check_constraint() {
		let (db, _dir) = scratch_database().await;
		let mut tx = db.begin().await.unwrap();
		sqlx::query("INSERT INTO accounts (username, password_hash) VALUES ($1, $2)")
			.bind("someone")
			.bind("x")
			.execute(&mut *tx)
			.await
			.unwrap();
		let res = sqlx::query("INSERT INTO library (account_id, book, status) VALUES (1, '{}', 'later')")
			.execute(&mut *tx)
			.await;
		assert!(res.is_err());
	}

	#[tokio::test]
	async fn test_unreachable_store_fails_to_connect() {
		let dir = tempfile::tempdir().unwrap();
		// read-only mode on a missing file can't open
		let url = format!("sqlite://{}?mode=ro", dir.path().join("missing.db").display());
		assert!(Database::connect(&DatabaseConfig::Sqlite(url)).await.is_err());
	}
}
