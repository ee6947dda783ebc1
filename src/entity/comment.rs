use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "comments")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = true)]
	pub id: i64,
	pub post_id: i64,
	pub author_id: i64,
	#[sea_orm(column_type = "Text")]
	pub text: String,
	/// Milliseconds since the unix epoch.
	pub created: i64,
	/// Moderation flag. Nothing reads it yet.
	#[sea_orm(default_value = false)]
	pub active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::post::Entity",
		from = "Column::PostId",
		to = "super::post::Column::Id",
		on_delete = "Cascade"
	)]
	Post,
	#[sea_orm(
		belongs_to = "super::user::Entity",
		from = "Column::AuthorId",
		to = "super::user::Column::Id",
		on_delete = "Cascade"
	)]
	Author,
}

impl Related<super::post::Entity> for Entity {
	fn to() -> RelationDef { Relation::Post.def() }
}

impl Related<super::user::Entity> for Entity {
	fn to() -> RelationDef { Relation::Author.def() }
}

impl ActiveModelBehavior for ActiveModel {}
