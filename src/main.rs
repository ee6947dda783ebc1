use std::{
	env,
	path::PathBuf,
	process,
	sync::{atomic::AtomicBool, Arc},
};

use blogrolld::{
	api::Api,
	config::{self, Config},
	db::{self, Database, PersistenceHandle},
	media::MediaStore,
	web,
};
use log::*;
use signal_hook::flag;


fn initialize_logging() {
	if let Some(filename) = env::var_os("SYSTEM_LOG_FILE").map(PathBuf::from) {
		if let Err(e) = simple_logging::log_to_file(&filename, LevelFilter::Debug) {
			eprintln!("Unable to log to {}: {}", filename.display(), e);
			process::exit(1);
		}
	} else {
		env_logger::init()
	}
}

fn config_path() -> PathBuf {
	env::var_os(config::CONFIG_FILE_ENV)
		.map(PathBuf::from)
		.unwrap_or_else(|| PathBuf::from(config::CONFIG_FILE_PATH))
}

/// Makes sure that the groups listed in the config exist.
async fn load_group_config(db: &Database, config: &Config) -> db::Result<()> {
	for group in &config.groups {
		if db.ensure_group(group).await? {
			info!("Created group {}.", &group.slug);
		}
	}
	Ok(())
}

#[tokio::main]
async fn main() {
	initialize_logging();

	let config_path = config_path();
	let config = match Config::load(&config_path) {
		Ok(c) => c,
		Err(e) => {
			error!("Unable to load config file {}: {}", config_path.display(), e);
			process::exit(1);
		}
	};

	// Catch signals
	let stop_flag = Arc::new(AtomicBool::new(false));
	for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
		if let Err(e) = flag::register(signal, stop_flag.clone()) {
			error!("Unable to register signal handler: {}", e);
			process::exit(1);
		}
	}

	// Load the database, migrating it if needed
	let db = match Database::load(PathBuf::from(&config.database_path)).await {
		Ok(db) => db,
		Err(e) => {
			error!("Unable to load database: {}", e);
			process::exit(1);
		}
	};
	if let Err(e) = load_group_config(&db, &config).await {
		error!("Unable to load configured groups: {}", e);
		process::exit(1);
	}

	let api = Api::new(
		db,
		MediaStore::new(&config.media_path),
		config.posts_per_page,
	);
	let global = match web::Global::load(config, api) {
		Ok(g) => Arc::new(g),
		Err(e) => {
			error!("Unable to load templates: {}", e);
			process::exit(1);
		}
	};

	if let Err(e) = web::serve(stop_flag, global).await {
		error!("Web server failed: {}", e);
		process::exit(1);
	}
	info!("Exiting blogrolld...");
}
