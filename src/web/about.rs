use std::sync::Arc;

use axum::{extract::State, response::Response, routing::get, Extension, Router};
use tera::Context;

use super::{session::Viewer, Global};


pub fn router() -> Router<Arc<Global>> {
	Router::new()
		.route("/author/", get(author))
		.route("/tech/", get(tech))
}

async fn author(State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>) -> Response {
	let mut context = Context::new();
	context.insert("title", "About the author");
	g.render("about/author.html.tera", context, &viewer)
}

async fn tech(State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>) -> Response {
	let mut context = Context::new();
	context.insert("title", "Technologies");
	g.render("about/tech.html.tera", context, &viewer)
}
