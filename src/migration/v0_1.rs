use async_trait::async_trait;
use sea_orm::{prelude::*, sea_query::*, ConnectionTrait, DatabaseTransaction, Schema};

use super::MigrationTrait;
use crate::entity::*;


pub struct Migration;


async fn create_table<E>(tx: &DatabaseTransaction, schema: &Schema, entity: E) -> Result<(), DbErr>
where
	E: EntityTrait,
{
	let stat = schema.create_table_from_entity(entity);
	tx.execute(tx.get_database_backend().build(&stat)).await?;
	Ok(())
}

async fn create_index(tx: &DatabaseTransaction, stat: IndexCreateStatement) -> Result<(), DbErr> {
	tx.execute(tx.get_database_backend().build(&stat)).await?;
	Ok(())
}


#[async_trait]
impl MigrationTrait for Migration {
	async fn run(&self, tx: &DatabaseTransaction) -> Result<(), DbErr> {
		let schema = Schema::new(tx.get_database_backend());

		// Referenced tables go first
		create_table(tx, &schema, User).await?;
		create_table(tx, &schema, Group).await?;
		create_table(tx, &schema, Post).await?;
		create_table(tx, &schema, Comment).await?;
		create_table(tx, &schema, Follow).await?;
		create_table(tx, &schema, Session).await?;

		// A user can follow an author only once
		create_index(
			tx,
			Index::create()
				.name("follow_unique")
				.table(Follow)
				.col(follow::Column::UserId)
				.col(follow::Column::AuthorId)
				.unique()
				.to_owned(),
		)
		.await?;

		create_index(
			tx,
			Index::create()
				.name("post_author_pub_date")
				.table(Post)
				.col(post::Column::AuthorId)
				.col(post::Column::PubDate)
				.to_owned(),
		)
		.await?;
		create_index(
			tx,
			Index::create()
				.name("post_group_pub_date")
				.table(Post)
				.col(post::Column::GroupId)
				.col(post::Column::PubDate)
				.to_owned(),
		)
		.await?;
		create_index(
			tx,
			Index::create()
				.name("comment_post_created")
				.table(Comment)
				.col(comment::Column::PostId)
				.col(comment::Column::Created)
				.to_owned(),
		)
		.await?;
		Ok(())
	}
}
