//! Password hashing, session tokens and the rules for account fields.

use argon2::{
	password_hash::{PasswordHasher, SaltString},
	Argon2, PasswordHash, PasswordVerifier,
};
use base58::ToBase58;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;


pub const USERNAME_MAX_LENGTH: usize = 150;
pub const PASSWORD_MIN_LENGTH: usize = 8;
const SESSION_TOKEN_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum Error {
	#[error("unable to hash password: {0}")]
	Hash(argon2::password_hash::Error),
	#[error("stored password hash is malformed: {0}")]
	MalformedHash(argon2::password_hash::Error),
}


/// Hashes a password with Argon2id and a random salt, returning the PHC
/// string to store.
pub fn hash_password(password: &str) -> Result<String, Error> {
	let salt = SaltString::generate(&mut OsRng);
	let hash = Argon2::default()
		.hash_password(password.as_bytes(), &salt)
		.map_err(Error::Hash)?;
	Ok(hash.to_string())
}

/// Checks a password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, Error> {
	let parsed = PasswordHash::new(hash).map_err(Error::MalformedHash)?;
	Ok(Argon2::default()
		.verify_password(password.as_bytes(), &parsed)
		.is_ok())
}

pub fn generate_session_token() -> String {
	let mut buffer = [0u8; SESSION_TOKEN_SIZE];
	OsRng.fill_bytes(&mut buffer);
	buffer.to_base58()
}

/// Returns a message describing what is wrong with the username, if
/// anything.
pub fn validate_username(username: &str) -> Option<&'static str> {
	if username.is_empty() {
		return Some("This field is required.");
	}
	if username.chars().count() > USERNAME_MAX_LENGTH {
		return Some("Ensure this value has at most 150 characters.");
	}
	let valid = username
		.chars()
		.all(|c| c.is_alphanumeric() || "@.+-_".contains(c));
	if !valid {
		return Some(
			"Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ \
			 characters.",
		);
	}
	None
}

pub fn validate_password(password: &str) -> Option<&'static str> {
	if password.is_empty() {
		return Some("This field is required.");
	}
	if password.chars().count() < PASSWORD_MIN_LENGTH {
		return Some("This password is too short. It must contain at least 8 characters.");
	}
	None
}
