//! The module for migrating the database.
use std::fmt::Display;

use async_trait::async_trait;
use log::info;
use sea_orm::{
	prelude::*, sea_query::*, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
	TransactionTrait,
};

mod v0_1;


/// The latest database version.
pub const LATEST_VERSION: Version = Version { major: 0, minor: 1 };

const VERSION_TABLE: &str = "version";


#[derive(Clone, Debug)]
pub struct Version {
	major: u32,
	minor: u32,
}

pub struct Migrations {
	/// A list of available migrations, ordered at version
	list: Vec<(Version, Box<dyn MigrationTrait + Send + Sync>)>,
}

#[async_trait]
trait MigrationTrait {
	async fn run(&self, tx: &DatabaseTransaction) -> Result<(), DbErr>;
}


impl Migrations {
	pub fn load() -> Self {
		Self {
			list: vec![(Version::new(0, 1), Box::new(v0_1::Migration))],
		}
	}

	/// Creates the version table for a fresh database, starting out at v0.0.
	async fn install(&self, connection: &DatabaseConnection) -> Result<(), DbErr> {
		let backend = connection.get_database_backend();
		let stat = Table::create()
			.table(Alias::new(VERSION_TABLE))
			.if_not_exists()
			.col(sea_orm::sea_query::ColumnDef::new(Alias::new("major")).integer().not_null())
			.col(sea_orm::sea_query::ColumnDef::new(Alias::new("minor")).integer().not_null())
			.to_owned();
		connection.execute(backend.build(&stat)).await?;

		let count = connection
			.query_one(
				backend.build(
					&Query::select()
						.expr(Func::count(Expr::col(Alias::new("major"))))
						.from(Alias::new(VERSION_TABLE))
						.to_owned(),
				),
			)
			.await?
			.map(|row| row.try_get_by_index::<i64>(0))
			.transpose()?
			.unwrap_or(0);
		if count == 0 {
			let stat = Query::insert()
				.into_table(Alias::new(VERSION_TABLE))
				.columns([Alias::new("major"), Alias::new("minor")])
				.values_panic([0i32.into(), 0i32.into()])
				.to_owned();
			connection.execute(backend.build(&stat)).await?;
		}
		Ok(())
	}

	async fn load_version(&self, connection: &DatabaseConnection) -> Result<Version, DbErr> {
		let q = Query::select()
			.from(Alias::new(VERSION_TABLE))
			.column(Alias::new("major"))
			.column(Alias::new("minor"))
			.to_owned();
		let result = connection
			.query_one(connection.get_database_backend().build(&q))
			.await?
			.ok_or_else(|| DbErr::Custom("no version in the database".into()))?;
		let major: i32 = result.try_get_by_index(0)?;
		let minor: i32 = result.try_get_by_index(1)?;
		Ok(Version::new(major as u32, minor as u32))
	}

	async fn store_version(
		&self, tx: &DatabaseTransaction, version: &Version,
	) -> Result<(), DbErr> {
		let q = Query::update()
			.table(Alias::new(VERSION_TABLE))
			.values([
				(Alias::new("major"), version.major.into()),
				(Alias::new("minor"), version.minor.into()),
			])
			.to_owned();
		tx.execute(tx.get_database_backend().build(&q)).await?;
		Ok(())
	}

	pub async fn run(&self, connection: &DatabaseConnection) -> Result<(), DbErr> {
		self.install(connection).await?;
		let mut current_version = self.load_version(connection).await?;

		for (new_version, migration) in &self.list {
			if new_version > &current_version {
				let tx = connection.begin().await?;
				info!(
					"Running database migration from {} to {}...",
					current_version, new_version
				);
				migration.run(&tx).await?;
				self.store_version(&tx, new_version).await?;
				tx.commit().await?;
				info!("Migrated database to {}.", new_version);
				current_version = new_version.clone();
			}
		}

		if current_version != LATEST_VERSION {
			return Err(DbErr::Custom(format!(
				"database is at {}, which is newer than {}",
				current_version, LATEST_VERSION
			)));
		}
		Ok(())
	}
}

impl Version {
	pub fn new(major: u32, minor: u32) -> Self { Self { major, minor } }
}

impl Display for Version {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "v{}.{}", self.major, self.minor)
	}
}

impl PartialEq for Version {
	fn eq(&self, other: &Self) -> bool { self.major == other.major && self.minor == other.minor }
}

impl PartialOrd for Version {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		match self.major.partial_cmp(&other.major) {
			Some(core::cmp::Ordering::Equal) => {}
			ord => return ord,
		}
		self.minor.partial_cmp(&other.minor)
	}
}
