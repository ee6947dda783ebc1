use std::{collections::HashMap, io, path::PathBuf, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use log::*;
use sea_orm::{prelude::*, sea_query::*, *};
use thiserror::Error;

use crate::{config::GroupConfig, entity::*, migration::Migrations};


#[derive(Clone)]
pub struct Database {
	path: Option<PathBuf>,
	orm: DatabaseConnection,
}

pub struct Transaction(pub(crate) sea_orm::DatabaseTransaction);

#[derive(Debug, Error)]
pub enum Error {
	#[error("{0}")]
	OrmError(#[from] sea_orm::DbErr),
	#[error("io error: {0}")]
	Io(#[from] io::Error),
}

/// Which posts a feed consists of.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PostFilter {
	All,
	Group(i64),
	Author(i64),
	/// Posts by the authors that the given user follows.
	FollowedBy(i64),
}

/// A post together with the rows it refers to.
#[derive(Clone, Debug, PartialEq)]
pub struct PostInfo {
	pub post: post::Model,
	pub author: user::Model,
	pub group: Option<group::Model>,
}

pub type Result<T> = std::result::Result<T, self::Error>;


/// The current time as stored in timestamp columns.
pub fn now() -> i64 { Utc::now().timestamp_millis() }

/// How long a session stays valid after logging in, in milliseconds.
pub const SESSION_MAX_AGE: i64 = 14 * 24 * 60 * 60 * 1000;

#[async_trait]
pub trait PersistenceHandle: Sync {
	type Inner: ConnectionTrait;

	fn inner(&self) -> &Self::Inner;

	fn backend(&self) -> DatabaseBackend { self.inner().get_database_backend() }


	async fn find_user(&self, id: i64) -> Result<Option<user::Model>> {
		Ok(User::find_by_id(id).one(self.inner()).await?)
	}

	async fn find_user_by_username(&self, username: &str) -> Result<Option<user::Model>> {
		Ok(User::find()
			.filter(user::Column::Username.eq(username))
			.one(self.inner())
			.await?)
	}

	/// Finds the user that the session belongs to, as long as the session
	/// hasn't expired yet.
	async fn find_user_by_session(&self, token: &str) -> Result<Option<user::Model>> {
		let result = Session::find()
			.filter(session::Column::Token.eq(token))
			.filter(session::Column::Created.gt(now() - SESSION_MAX_AGE))
			.find_also_related(User)
			.one(self.inner())
			.await?;
		Ok(result.and_then(|(_, user)| user))
	}

	async fn store_user(&self, user: user::ActiveModel) -> Result<user::Model> {
		Ok(user.insert(self.inner()).await?)
	}

	async fn store_session(&self, user_id: i64, token: &str) -> Result<()> {
		let record = session::ActiveModel {
			id: NotSet,
			token: Set(token.to_string()),
			user_id: Set(user_id),
			created: Set(now()),
		};
		record.insert(self.inner()).await?;
		Ok(())
	}

	async fn delete_session(&self, token: &str) -> Result<()> {
		Session::delete_many()
			.filter(session::Column::Token.eq(token))
			.exec(self.inner())
			.await?;
		Ok(())
	}

	/// Returns how many expired sessions have been removed.
	async fn delete_expired_sessions(&self) -> Result<u64> {
		let result = Session::delete_many()
			.filter(session::Column::Created.lte(now() - SESSION_MAX_AGE))
			.exec(self.inner())
			.await?;
		Ok(result.rows_affected)
	}

	async fn find_group(&self, id: i64) -> Result<Option<group::Model>> {
		Ok(Group::find_by_id(id).one(self.inner()).await?)
	}

	async fn find_group_by_slug(&self, slug: &str) -> Result<Option<group::Model>> {
		Ok(Group::find()
			.filter(group::Column::Slug.eq(slug))
			.one(self.inner())
			.await?)
	}

	async fn load_groups(&self) -> Result<Vec<group::Model>> {
		Ok(Group::find()
			.order_by_asc(group::Column::Title)
			.order_by_asc(group::Column::Id)
			.all(self.inner())
			.await?)
	}

	/// Creates the group if no group with its slug exists yet. Returns
	/// whether it has been created.
	async fn ensure_group(&self, config: &GroupConfig) -> Result<bool> {
		if self.find_group_by_slug(&config.slug).await?.is_some() {
			return Ok(false);
		}
		let record = group::ActiveModel {
			id: NotSet,
			title: Set(config.title.clone()),
			slug: Set(config.slug.clone()),
			description: Set(config.description.clone()),
		};
		record.insert(self.inner()).await?;
		Ok(true)
	}

	async fn find_post(&self, id: i64) -> Result<Option<post::Model>> {
		Ok(Post::find_by_id(id).one(self.inner()).await?)
	}

	async fn find_post_info(&self, id: i64) -> Result<Option<PostInfo>> {
		match self.find_post(id).await? {
			None => Ok(None),
			Some(post) => Ok(self.complete_post_infos(vec![post]).await?.pop()),
		}
	}

	async fn count_posts(&self, filter: PostFilter) -> Result<u64> {
		Ok(filtered_posts(filter).count(self.inner()).await?)
	}

	/// Loads a slice of the posts matching the filter, newest first.
	async fn load_posts(&self, filter: PostFilter, limit: u64, offset: u64) -> Result<Vec<PostInfo>> {
		let posts = filtered_posts(filter)
			.order_by_desc(post::Column::PubDate)
			.order_by_desc(post::Column::Id)
			.limit(limit)
			.offset(offset)
			.all(self.inner())
			.await?;
		self.complete_post_infos(posts).await
	}

	/// Looks up the authors and groups of the given posts, keeping their
	/// order.
	async fn complete_post_infos(&self, posts: Vec<post::Model>) -> Result<Vec<PostInfo>> {
		let author_ids: Vec<i64> = posts.iter().map(|p| p.author_id).collect();
		let group_ids: Vec<i64> = posts.iter().filter_map(|p| p.group_id).collect();

		let authors: HashMap<i64, user::Model> = User::find()
			.filter(user::Column::Id.is_in(author_ids))
			.all(self.inner())
			.await?
			.into_iter()
			.map(|u| (u.id, u))
			.collect();
		let groups: HashMap<i64, group::Model> = if group_ids.is_empty() {
			HashMap::new()
		} else {
			Group::find()
				.filter(group::Column::Id.is_in(group_ids))
				.all(self.inner())
				.await?
				.into_iter()
				.map(|g| (g.id, g))
				.collect()
		};

		let mut infos = Vec::with_capacity(posts.len());
		for post in posts {
			let author = match authors.get(&post.author_id) {
				Some(a) => a.clone(),
				None => {
					// Can only happen if the author got deleted in between both queries
					warn!("Author {} of post {} is missing.", post.author_id, post.id);
					continue;
				}
			};
			let group = post.group_id.and_then(|id| groups.get(&id).cloned());
			infos.push(PostInfo {
				post,
				author,
				group,
			});
		}
		Ok(infos)
	}

	async fn store_post(&self, post: post::ActiveModel) -> Result<post::Model> {
		Ok(post.insert(self.inner()).await?)
	}

	async fn update_post(&self, post: post::ActiveModel) -> Result<post::Model> {
		Ok(post.update(self.inner()).await?)
	}

	/// Loads the comments on a post, oldest first, together with their authors.
	async fn load_comments(&self, post_id: i64) -> Result<Vec<(comment::Model, user::Model)>> {
		let results = Comment::find()
			.filter(comment::Column::PostId.eq(post_id))
			.find_also_related(User)
			.order_by_asc(comment::Column::Created)
			.order_by_asc(comment::Column::Id)
			.all(self.inner())
			.await?;
		Ok(results
			.into_iter()
			.filter_map(|(comment, author)| author.map(|a| (comment, a)))
			.collect())
	}

	async fn store_comment(&self, post_id: i64, author_id: i64, text: &str) -> Result<comment::Model> {
		let record = comment::ActiveModel {
			id: NotSet,
			post_id: Set(post_id),
			author_id: Set(author_id),
			text: Set(text.to_string()),
			created: Set(now()),
			active: Set(false),
		};
		Ok(record.insert(self.inner()).await?)
	}

	async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool> {
		let count = Follow::find()
			.filter(follow::Column::UserId.eq(user_id))
			.filter(follow::Column::AuthorId.eq(author_id))
			.count(self.inner())
			.await?;
		Ok(count > 0)
	}

	/// Returns whether a new follow has been stored. Following an author that
	/// is already followed leaves the existing row alone.
	async fn store_follow(&self, user_id: i64, author_id: i64) -> Result<bool> {
		let record = follow::ActiveModel {
			id: NotSet,
			user_id: Set(user_id),
			author_id: Set(author_id),
		};
		let inserted = Follow::insert(record)
			.on_conflict(
				OnConflict::columns([follow::Column::UserId, follow::Column::AuthorId])
					.do_nothing()
					.to_owned(),
			)
			.exec_without_returning(self.inner())
			.await?;
		Ok(inserted > 0)
	}

	/// Returns how many follow rows have been removed.
	async fn delete_follow(&self, user_id: i64, author_id: i64) -> Result<u64> {
		let result = Follow::delete_many()
			.filter(follow::Column::UserId.eq(user_id))
			.filter(follow::Column::AuthorId.eq(author_id))
			.exec(self.inner())
			.await?;
		Ok(result.rows_affected)
	}
}

fn filtered_posts(filter: PostFilter) -> Select<Post> {
	let query = Post::find();
	match filter {
		PostFilter::All => query,
		PostFilter::Group(group_id) => query.filter(post::Column::GroupId.eq(group_id)),
		PostFilter::Author(author_id) => query.filter(post::Column::AuthorId.eq(author_id)),
		PostFilter::FollowedBy(user_id) => query.filter(
			post::Column::AuthorId.in_subquery(
				Query::select()
					.column(follow::Column::AuthorId)
					.from(Follow)
					.and_where(follow::Column::UserId.eq(user_id))
					.to_owned(),
			),
		),
	}
}


impl Database {
	/// Opens the SQLite database at the given path, creating it if it doesn't
	/// exist yet, and migrates it to the latest version.
	pub async fn load(path: PathBuf) -> Result<Self> {
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				tokio::fs::create_dir_all(parent).await?;
			}
		}

		let mut opts = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
		opts.idle_timeout(Duration::from_secs(10));
		opts.acquire_timeout(Duration::from_secs(1));
		opts.sqlx_logging(false);
		let orm = sea_orm::Database::connect(opts).await?;

		let this = Self {
			path: Some(path),
			orm,
		};
		Migrations::load().run(&this.orm).await?;
		Ok(this)
	}

	pub fn path(&self) -> Option<&PathBuf> { self.path.as_ref() }

	pub async fn transaction(&self) -> Result<Transaction> {
		let tx = self.orm.begin().await?;
		Ok(Transaction(tx))
	}
}

impl PersistenceHandle for Database {
	type Inner = sea_orm::DatabaseConnection;

	fn inner(&self) -> &Self::Inner { &self.orm }
}

impl PersistenceHandle for Transaction {
	type Inner = sea_orm::DatabaseTransaction;

	fn inner(&self) -> &Self::Inner { &self.0 }
}

impl Transaction {
	pub async fn commit(self) -> Result<()> {
		self.0.commit().await?;
		Ok(())
	}
}
