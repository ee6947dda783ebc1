use std::{fs, io, path::Path};

use serde::*;
use thiserror::Error;


/// The file path of the configuration file, unless overridden by the
/// `BLOGROLL_CONFIG` environment variable.
pub const CONFIG_FILE_PATH: &str = "conf/default.toml";
pub const CONFIG_FILE_ENV: &str = "BLOGROLL_CONFIG";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
	pub database_path: String,

	pub bind_address: String,
	pub web_port: u16,

	pub templates_path: String,
	pub static_path: String,
	pub media_path: String,

	pub posts_per_page: u64,
	pub index_cache_seconds: u64,
	pub index_cache_capacity: usize,
	/// Marks the session cookie as `Secure`, for deployments behind TLS.
	pub secure_cookies: bool,

	/// Groups that are created at startup if no group with the same slug
	/// exists yet.
	pub groups: Vec<GroupConfig>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GroupConfig {
	pub title: String,
	pub slug: String,
	#[serde(default)]
	pub description: String,
}

#[derive(Debug, Error)]
pub enum Error {
	#[error("unable to read config file: {0}")]
	Io(#[from] io::Error),
	#[error("unable to parse config file: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("invalid config: {0}")]
	Invalid(String),
}


impl Config {
	pub fn load<P>(path: P) -> Result<Self, Error>
	where
		P: AsRef<Path>,
	{
		let content = fs::read_to_string(path)?;
		Self::parse(&content)
	}

	pub fn parse(content: &str) -> Result<Self, Error> {
		let config: Self = toml::from_str(content)?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<(), Error> {
		if self.posts_per_page == 0 {
			return Err(Error::Invalid("posts_per_page must be at least 1".into()));
		}
		if self.index_cache_capacity == 0 {
			return Err(Error::Invalid(
				"index_cache_capacity must be at least 1".into(),
			));
		}
		for group in &self.groups {
			if group.slug.is_empty() || group.slug.len() > 300 {
				return Err(Error::Invalid(format!(
					"group slug \"{}\" must be between 1 and 300 characters",
					group.slug
				)));
			}
			if group.title.chars().count() > 200 {
				return Err(Error::Invalid(format!(
					"title of group \"{}\" is longer than 200 characters",
					group.slug
				)));
			}
		}
		Ok(())
	}
}

impl Default for Config {
	fn default() -> Self {
		Self {
			database_path: "data/db.sqlite".into(),
			bind_address: "127.0.0.1".into(),
			web_port: 8000,
			templates_path: "templates".into(),
			static_path: "static".into(),
			media_path: "media".into(),
			posts_per_page: 10,
			index_cache_seconds: 20,
			index_cache_capacity: 256,
			secure_cookies: false,
			groups: Vec::new(),
		}
	}
}
