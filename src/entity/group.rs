use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize)]
#[sea_orm(table_name = "groups")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = true)]
	pub id: i64,
	pub title: String,
	#[sea_orm(unique)]
	pub slug: String,
	pub description: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(has_many = "super::post::Entity")]
	Post,
}

impl Related<super::post::Entity> for Entity {
	fn to() -> RelationDef { Relation::Post.def() }
}

impl ActiveModelBehavior for ActiveModel {}
