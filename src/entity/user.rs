use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = true)]
	pub id: i64,
	#[sea_orm(unique)]
	pub username: String,
	pub first_name: String,
	pub last_name: String,
	pub email: String,
	#[serde(skip)]
	pub password_hash: String,
	/// Milliseconds since the unix epoch.
	pub date_joined: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(has_many = "super::post::Entity")]
	Post,
	#[sea_orm(has_many = "super::comment::Entity")]
	Comment,
	#[sea_orm(has_many = "super::session::Entity")]
	Session,
}

impl Related<super::post::Entity> for Entity {
	fn to() -> RelationDef { Relation::Post.def() }
}

impl Related<super::comment::Entity> for Entity {
	fn to() -> RelationDef { Relation::Comment.def() }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
	/// The name to show for this user: the full name if one was given,
	/// otherwise the username.
	pub fn display_name(&self) -> String {
		let full_name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
		let full_name = full_name.trim();
		if full_name.is_empty() {
			self.username.clone()
		} else {
			full_name.to_string()
		}
	}
}
