use log::*;
use sea_orm::{IntoActiveModel, NotSet, Set};
use thiserror::Error;

use crate::{
	account,
	db::{self, Database, PersistenceHandle, PostFilter, PostInfo},
	entity::*,
	media::{self, MediaStore},
	paginator::{Page, Paginator},
};


#[derive(Clone)]
pub struct Api {
	pub db: Database,
	pub media: MediaStore,
	pub posts_per_page: u64,
}

#[derive(Debug, Error)]
pub enum Error {
	#[error("database error: {0}")]
	Database(#[from] db::Error),
	#[error("{0}")]
	Media(#[from] media::Error),
	#[error("{0}")]
	Account(#[from] account::Error),
	#[error("A user with that username already exists.")]
	UsernameTaken,
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct NewAccount<'a> {
	pub username: &'a str,
	pub first_name: &'a str,
	pub last_name: &'a str,
	pub email: &'a str,
	pub password: &'a str,
}

/// What to do with the image of a post that is being edited.
#[derive(Debug, PartialEq)]
pub enum ImageChange {
	Keep,
	Replace(Vec<u8>),
	Clear,
}


impl From<sea_orm::DbErr> for Error {
	fn from(other: sea_orm::DbErr) -> Self { Self::Database(other.into()) }
}

impl Api {
	pub fn new(db: Database, media: MediaStore, posts_per_page: u64) -> Self {
		Self {
			db,
			media,
			posts_per_page,
		}
	}

	/// Creates a new user and opens a session for them, returning the
	/// session token.
	pub async fn sign_up(&self, details: NewAccount<'_>) -> Result<(user::Model, String)> {
		if self.db.find_user_by_username(details.username).await?.is_some() {
			return Err(Error::UsernameTaken);
		}
		let password_hash = account::hash_password(details.password)?;

		let tx = self.db.transaction().await?;
		let user = tx
			.store_user(user::ActiveModel {
				id: NotSet,
				username: Set(details.username.to_string()),
				first_name: Set(details.first_name.to_string()),
				last_name: Set(details.last_name.to_string()),
				email: Set(details.email.to_string()),
				password_hash: Set(password_hash),
				date_joined: Set(db::now()),
			})
			.await?;
		let token = account::generate_session_token();
		tx.store_session(user.id, &token).await?;
		tx.commit().await?;

		info!("Signed up user {}.", &user.username);
		Ok((user, token))
	}

	/// Checks the credentials and opens a session if they are correct.
	pub async fn log_in(&self, username: &str, password: &str) -> Result<Option<(user::Model, String)>> {
		let user = match self.db.find_user_by_username(username).await? {
			Some(u) => u,
			None => return Ok(None),
		};
		// Accounts without a usable password can't log in
		if !user.password_hash.starts_with('$') {
			return Ok(None);
		}
		if !account::verify_password(password, &user.password_hash)? {
			return Ok(None);
		}
		let token = self.open_session(user.id).await?;
		Ok(Some((user, token)))
	}

	pub async fn open_session(&self, user_id: i64) -> Result<String> {
		let removed = self.db.delete_expired_sessions().await?;
		if removed > 0 {
			debug!("Removed {} expired sessions.", removed);
		}
		let token = account::generate_session_token();
		self.db.store_session(user_id, &token).await?;
		Ok(token)
	}

	pub async fn log_out(&self, token: &str) -> Result<()> {
		self.db.delete_session(token).await?;
		Ok(())
	}

	/// Loads the requested page of the posts that match the filter.
	pub async fn load_feed(
		&self, filter: PostFilter, page_number: Option<&str>,
	) -> Result<(Page, Vec<PostInfo>)> {
		let count = self.db.count_posts(filter).await?;
		let page = Paginator::new(count, self.posts_per_page).get_page(page_number);
		let posts = self
			.db
			.load_posts(filter, page.limit(), page.offset())
			.await?;
		Ok((page, posts))
	}

	pub async fn create_post(
		&self, author: &user::Model, text: &str, group_id: Option<i64>, image: Option<&[u8]>,
	) -> Result<post::Model> {
		let image_path = match image {
			Some(data) => Some(self.media.store_post_image(data).await?),
			None => None,
		};
		let post = self
			.db
			.store_post(post::ActiveModel {
				id: NotSet,
				text: Set(text.to_string()),
				pub_date: Set(db::now()),
				author_id: Set(author.id),
				group_id: Set(group_id),
				image: Set(image_path),
			})
			.await?;
		debug!("User {} created post {}.", &author.username, post.id);
		Ok(post)
	}

	/// Changes the text, group and image of a post. The author and
	/// publication date stay the same.
	pub async fn update_post(
		&self, post: post::Model, text: &str, group_id: Option<i64>, image: ImageChange,
	) -> Result<post::Model> {
		let old_image = post.image.clone();
		let new_image = match image {
			ImageChange::Keep => old_image.clone(),
			ImageChange::Replace(data) => Some(self.media.store_post_image(&data).await?),
			ImageChange::Clear => None,
		};

		let mut record = post.into_active_model();
		record.text = Set(text.to_string());
		record.group_id = Set(group_id);
		record.image = Set(new_image.clone());
		let post = self.db.update_post(record).await?;

		if let Some(old) = old_image {
			if new_image.as_ref() != Some(&old) {
				if let Err(e) = self.media.remove(&old).await {
					warn!("Unable to remove replaced image {}: {}", &old, e);
				}
			}
		}
		Ok(post)
	}

	pub async fn add_comment(
		&self, post: &post::Model, author: &user::Model, text: &str,
	) -> Result<comment::Model> {
		Ok(self.db.store_comment(post.id, author.id, text).await?)
	}

	/// Lets the user follow the author. Following yourself or following
	/// someone twice does nothing. Returns whether a follow was added.
	pub async fn follow(&self, user: &user::Model, author: &user::Model) -> Result<bool> {
		if user.id == author.id {
			return Ok(false);
		}
		Ok(self.db.store_follow(user.id, author.id).await?)
	}

	pub async fn unfollow(&self, user: &user::Model, author: &user::Model) -> Result<bool> {
		Ok(self.db.delete_follow(user.id, author.id).await? > 0)
	}

	pub async fn count_posts_by(&self, author_id: i64) -> Result<u64> {
		Ok(self.db.count_posts(PostFilter::Author(author_id)).await?)
	}

	pub async fn find_user_by_session(&self, token: &str) -> Result<Option<user::Model>> {
		Ok(self.db.find_user_by_session(token).await?)
	}

	/// Looks up all groups, for the group choice on the post form.
	pub async fn groups(&self) -> Result<Vec<group::Model>> { Ok(self.db.load_groups().await?) }

	pub async fn find_user(&self, username: &str) -> Result<Option<user::Model>> {
		Ok(self.db.find_user_by_username(username).await?)
	}

	pub async fn find_group(&self, slug: &str) -> Result<Option<group::Model>> {
		Ok(self.db.find_group_by_slug(slug).await?)
	}

	pub async fn find_post(&self, id: i64) -> Result<Option<post::Model>> {
		Ok(self.db.find_post(id).await?)
	}

	pub async fn find_post_info(&self, id: i64) -> Result<Option<PostInfo>> {
		Ok(self.db.find_post_info(id).await?)
	}

	pub async fn load_comments(&self, post_id: i64) -> Result<Vec<(comment::Model, user::Model)>> {
		Ok(self.db.load_comments(post_id).await?)
	}

	pub async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool> {
		Ok(self.db.is_following(user_id, author_id).await?)
	}
}
