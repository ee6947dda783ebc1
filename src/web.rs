mod about;
mod accounts;
pub mod common;
mod forms;
mod posts;
mod profile;
pub mod session;

use std::{
	io,
	net::{IpAddr, SocketAddr},
	sync::{atomic::*, Arc},
	time::Duration,
};

use axum::{
	extract::{DefaultBodyLimit, Request, State},
	http::StatusCode,
	middleware::from_fn_with_state,
	response::{Html, IntoResponse, Response},
	Extension, Router,
};
use log::*;
use tera::{Context, Tera};
use tokio::time::sleep;
use tower_http::services::ServeDir;

use self::{common::*, session::Viewer};
use crate::{api::Api, config::Config, page_cache::PageCache};


/// Uploads larger than this are refused.
const BODY_LIMIT: usize = 10_000_000;

pub struct Global {
	pub config: Config,
	pub api: Api,
	pub template_engine: Tera,
	pub index_cache: PageCache,
}

/// Attached to every rendered response, naming the template that rendered it.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedTemplate(pub String);


impl Global {
	pub fn load(config: Config, api: Api) -> Result<Self, tera::Error> {
		let mut template_engine = Tera::new(&format!("{}/**/*.tera", &config.templates_path))?;
		template_engine.autoescape_on(vec![".html.tera"]);
		let index_cache = PageCache::new(
			Duration::from_secs(config.index_cache_seconds),
			config.index_cache_capacity,
		);
		Ok(Self {
			config,
			api,
			template_engine,
			index_cache,
		})
	}

	pub fn render(&self, template_name: &str, context: Context, viewer: &Viewer) -> Response {
		self.render_with_status(StatusCode::OK, template_name, context, viewer)
	}

	pub fn render_with_status(
		&self, status: StatusCode, template_name: &str, context: Context, viewer: &Viewer,
	) -> Response {
		let mut complete_context = Context::new();
		complete_context.insert("user", &viewer.view());
		complete_context.extend(context);

		match self
			.template_engine
			.render(template_name, &complete_context)
		{
			Err(e) => server_error_response(
				e,
				&format!("Unable to render template \"{}\"", template_name),
			),
			Ok(html) => {
				let mut response = (status, Html(html)).into_response();
				response
					.extensions_mut()
					.insert(RenderedTemplate(template_name.to_string()));
				response
			}
		}
	}

	/// The page shown for anything that can't be found.
	pub fn not_found(&self, viewer: &Viewer) -> Response {
		let mut context = Context::new();
		context.insert("title", "Page not found");
		self.render_with_status(
			StatusCode::NOT_FOUND,
			"core/404.html.tera",
			context,
			viewer,
		)
	}
}

pub fn router(g: Arc<Global>) -> Router {
	Router::new()
		.merge(posts::router(g.clone()))
		.merge(profile::router())
		.nest("/auth", accounts::router())
		.nest("/about", about::router())
		.nest_service("/static", ServeDir::new(&g.config.static_path))
		.nest_service("/media", ServeDir::new(g.api.media.root()))
		.fallback(fallback)
		.layer(from_fn_with_state(g.clone(), session::session_middleware))
		.layer(DefaultBodyLimit::max(BODY_LIMIT))
		.with_state(g)
}

async fn fallback(
	State(g): State<Arc<Global>>, viewer: Option<Extension<Viewer>>, request: Request,
) -> Response {
	debug!("No route for {} {}", request.method(), request.uri());
	let viewer = viewer.map(|Extension(v)| v).unwrap_or_default();
	g.not_found(&viewer)
}

pub async fn serve(stop_flag: Arc<AtomicBool>, g: Arc<Global>) -> io::Result<()> {
	let ip: IpAddr = g
		.config
		.bind_address
		.parse()
		.map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
	let addr = SocketAddr::new(ip, g.config.web_port);

	let app = router(g);
	let listener = tokio::net::TcpListener::bind(addr).await?;
	info!("Serving on http://{}", addr);
	axum::serve(listener, app)
		.with_graceful_shutdown(async move {
			while !stop_flag.load(Ordering::Relaxed) {
				sleep(Duration::from_secs(1)).await;
			}
			info!("Shutting down web server...");
		})
		.await
}
