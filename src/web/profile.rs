use std::sync::Arc;

use axum::{
	extract::{Path, Query, State},
	middleware::from_fn,
	response::Response,
	routing::get,
	Extension, Router,
};
use log::*;
use tera::Context;

use super::{
	common::*,
	posts::PageQuery,
	session::{login_required, Viewer},
	Global,
};
use crate::{db::PostFilter, entity::user};


pub fn router() -> Router<Arc<Global>> {
	let protected = Router::new()
		.route("/profile/:username/follow/", get(profile_follow))
		.route("/profile/:username/unfollow/", get(profile_unfollow))
		.route_layer(from_fn(login_required));

	Router::new()
		.route("/profile/:username/", get(profile))
		.merge(protected)
}

async fn load_author(g: &Global, username: &str, viewer: &Viewer) -> Result<user::Model, Response> {
	match g.api.find_user(username).await {
		Ok(Some(author)) => Ok(author),
		Ok(None) => Err(g.not_found(viewer)),
		Err(e) => Err(server_error_response(e, "Unable to load user")),
	}
}

async fn profile(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Path(username): Path<String>, Query(query): Query<PageQuery>,
) -> Response {
	let author = match load_author(&g, &username, &viewer).await {
		Ok(a) => a,
		Err(r) => return r,
	};
	let (page, posts) = match g
		.api
		.load_feed(PostFilter::Author(author.id), query.page.as_deref())
		.await
	{
		Ok(r) => r,
		Err(e) => return server_error_response(e, "Unable to load posts"),
	};
	let following = match &viewer.user {
		None => false,
		Some(user) => match g.api.is_following(user.id, author.id).await {
			Ok(f) => f,
			Err(e) => return server_error_response(e, "Unable to load follow"),
		},
	};

	let mut context = Context::new();
	context.insert("title", &format!("Profile of {}", &author.username));
	context.insert("post_number", &page.count);
	context.insert("page_obj", &PageView::new(page, posts));
	context.insert("author", &UserView::from(&author));
	context.insert("following", &following);
	g.render("posts/profile.html.tera", context, &viewer)
}

async fn profile_follow(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Extension(user): Extension<user::Model>, Path(username): Path<String>,
) -> Response {
	let author = match load_author(&g, &username, &viewer).await {
		Ok(a) => a,
		Err(r) => return r,
	};
	match g.api.follow(&user, &author).await {
		Ok(true) => debug!("{} now follows {}.", &user.username, &author.username),
		Ok(false) => {}
		Err(e) => return server_error_response(e, "Unable to follow user"),
	}
	redirect(&profile_url(&author.username))
}

async fn profile_unfollow(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Extension(user): Extension<user::Model>, Path(username): Path<String>,
) -> Response {
	let author = match load_author(&g, &username, &viewer).await {
		Ok(a) => a,
		Err(r) => return r,
	};
	if let Err(e) = g.api.unfollow(&user, &author).await {
		return server_error_response(e, "Unable to unfollow user");
	}
	redirect(&profile_url(&author.username))
}
