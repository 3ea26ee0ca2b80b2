// account creation and password checks

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use sqlx::AnyConnection;
use tokio::sync::OnceCell;

use crate::error::{StoreError, StoreResult};
use crate::sql::Database;
use crate::types::Account;

/// Resolves a username inside an open transaction.
pub async fn find_account(conn: &mut AnyConnection, username: &str) -> StoreResult<Option<Account>> {
	let account = sqlx::query_as::<_, Account>(
		"SELECT account_id, username, password_hash FROM accounts WHERE username = $1",
	)
	.bind(username)
	.fetch_optional(conn)
	.await?;
	Ok(account)
}

/// Like [`find_account`], absence is [`StoreError::UnknownUser`].
pub async fn resolve_account(conn: &mut AnyConnection, username: &str) -> StoreResult<Account> {
	find_account(conn, username)
		.await?
		.ok_or_else(|| StoreError::UnknownUser(username.to_string()))
}

/// Argon2id hashing; the PHC string keeps salt and cost parameters next to the hash.
#[derive(Clone)]
pub struct CredentialStore {
	db: Database,
	hasher: Argon2<'static>,
	// checked against when the username is unknown, so both paths cost one hash
	decoy: Arc<OnceCell<String>>,
}

impl CredentialStore {
	pub fn new(db: Database) -> Self {
		Self::with_hasher(db, Argon2::default())
	}

	pub fn with_hasher(db: Database, hasher: Argon2<'static>) -> Self {
		CredentialStore { db, hasher, decoy: Arc::new(OnceCell::new()) }
	}

	/// Unknown users and wrong passwords both come back `Ok(false)`, after the
	/// same amount of hashing work.
	#[tracing::instrument(skip(self, password))]
	pub async fn verify(&self, username: &str, password: &str) -> StoreResult<bool> {
		let mut tx = self.db.begin().await?;
		let outcome = find_account(&mut tx, username).await;
		let account = self.db.finish(tx, outcome).await?;

		let known = account.is_some();
		let stored = match account {
			Some(account) => account.password_hash,
			None => {
				tracing::debug!("no such account");
				self.decoy_hash().await?.clone()
			}
		};

		let hasher = self.hasher.clone();
		let password = password.to_owned();
		let ok = tokio::task::spawn_blocking(move || check_hash(&hasher, &password, &stored))
			.await
			.map_err(|e| StoreError::StoreUnavailable(format!("password check failed: {e}")))?;
		Ok(known && ok)
	}

	async fn decoy_hash(&self) -> StoreResult<&String> {
		self.decoy
			.get_or_try_init(|| async {
				let hasher = self.hasher.clone();
				tokio::task::spawn_blocking(move || hash_password(&hasher, DECOY_PASSWORD))
					.await
					.map_err(|e| StoreError::StoreUnavailable(format!("password hashing failed: {e}")))?
			})
			.await
	}

	/// Adds an account with a freshly salted hash.
	#[tracing::instrument(skip(self, password))]
	pub async fn create(&self, username: &str, password: &str) -> StoreResult<Account> {
		let hasher = self.hasher.clone();
		let password = password.to_owned();
		let password_hash = tokio::task::spawn_blocking(move || hash_password(&hasher, &password))
			.await
			.map_err(|e| StoreError::StoreUnavailable(format!("password hashing failed: {e}")))??;

		let mut tx = self.db.begin().await?;
		let outcome = sqlx::query_as::<_, Account>(
			"INSERT INTO accounts (username, password_hash) VALUES ($1, $2)
			RETURNING account_id, username, password_hash",
		)
		.bind(username)
		.bind(&password_hash)
		.fetch_one(&mut *tx)
		.await
		.map_err(|err| match err {
			sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
				StoreError::DuplicateUser(username.to_string())
			}
			other => other.into(),
		});
		let account = self.db.finish(tx, outcome).await?;

		tracing::info!(account_id = account.account_id, "account created");
		Ok(account)
	}

	pub async fn lookup(&self, username: &str) -> StoreResult<Account> {
		let mut tx = self.db.begin().await?;
		let outcome = resolve_account(&mut tx, username).await;
		self.db.finish(tx, outcome).await
	}
}

const DECOY_PASSWORD: &str = "no account has this password";

fn hash_password(hasher: &Argon2<'_>, password: &str) -> StoreResult<String> {
	let salt = SaltString::generate(&mut OsRng);
	hasher
		.hash_password(password.as_bytes(), &salt)
		.map(|hash| hash.to_string())
		.map_err(|e| StoreError::StoreUnavailable(format!("password hashing failed: {e}")))
}

// cost parameters come from the stored hash, not from `hasher`
fn check_hash(hasher: &Argon2<'_>, password: &str, stored: &str) -> bool {
	match PasswordHash::new(stored) {
		Ok(parsed) => hasher.verify_password(password.as_bytes(), &parsed).is_ok(),
		Err(e) => {
			tracing::warn!(error = %e, "stored password hash is unreadable");
			false
		}
	}
}

/// Cheap Argon2id settings so tests don't spend seconds per hash.
#[cfg(test)]
pub(crate) fn fast_hasher() -> Argon2<'static> {
	use argon2::{Algorithm, Params, Version};
	let params = Params::new(1024, 1, 1, None).unwrap();
	Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}
