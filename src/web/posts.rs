use std::sync::Arc;

use axum::{
	body::{self, Body},
	extract::{Multipart, Path, Query, Request, State},
	http::{header, HeaderValue, StatusCode},
	middleware::{from_fn, from_fn_with_state, Next},
	response::Response,
	routing::get,
	Extension, Form, Router,
};
use log::*;
use serde::Deserialize;
use tera::Context;

use super::{
	common::*,
	forms::{CommentForm, PostForm},
	session::{login_required, Viewer},
	Global, RenderedTemplate,
};
use crate::{
	api::ImageChange,
	db::PostFilter,
	entity::{post, user},
	page_cache::CachedPage,
};


#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
	pub page: Option<String>,
}


pub fn router(g: Arc<Global>) -> Router<Arc<Global>> {
	let protected = Router::new()
		.route("/create/", get(post_create).post(post_create_post))
		.route("/posts/:post_id/edit/", get(post_edit).post(post_edit_post))
		.route(
			"/posts/:post_id/comment/",
			get(add_comment).post(add_comment_post),
		)
		.route("/follow/", get(follow_index))
		.route_layer(from_fn(login_required));

	Router::new()
		.route(
			"/",
			get(index).route_layer(from_fn_with_state(g, cache_index)),
		)
		.route("/group/:slug/", get(group_posts))
		.route("/posts/:post_id/", get(post_detail))
		.merge(protected)
}

/// Serves the page from the index cache if it is still fresh, and otherwise
/// stores the rendered page in it.
async fn cache_index(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, request: Request,
	next: Next,
) -> Response {
	let key = format!("{} {}", viewer.cache_key(), request.uri());
	if let Some(page) = g.index_cache.get(&key).await {
		trace!("Serving {} from the page cache.", &key);
		return cached_response(page);
	}

	let response = next.run(request).await;
	if response.status() != StatusCode::OK {
		return response;
	}
	let (parts, body) = response.into_parts();
	let bytes = match body::to_bytes(body, usize::MAX).await {
		Ok(b) => b,
		Err(e) => return server_error_response(e, "Unable to read rendered page"),
	};
	let page = CachedPage {
		content_type: parts
			.headers
			.get(header::CONTENT_TYPE)
			.and_then(|v| v.to_str().ok())
			.unwrap_or("text/html; charset=utf-8")
			.to_string(),
		body: bytes.clone(),
		template: parts
			.extensions
			.get::<RenderedTemplate>()
			.map(|t| t.0.clone()),
	};
	g.index_cache.insert(key, page).await;
	Response::from_parts(parts, Body::from(bytes))
}

fn cached_response(page: CachedPage) -> Response {
	let mut response = Response::new(Body::from(page.body));
	if let Ok(value) = HeaderValue::from_str(&page.content_type) {
		response.headers_mut().insert(header::CONTENT_TYPE, value);
	}
	if let Some(template) = page.template {
		response.extensions_mut().insert(RenderedTemplate(template));
	}
	response
}

/// Loads a page of the feed, ready for the templates.
async fn load_page(g: &Global, filter: PostFilter, query: &PageQuery) -> Result<PageView, Response> {
	match g.api.load_feed(filter, query.page.as_deref()).await {
		Ok((page, posts)) => Ok(PageView::new(page, posts)),
		Err(e) => Err(server_error_response(e, "Unable to load posts")),
	}
}

/// Post ids that aren't numbers don't match any post.
fn parse_post_id(post_id: &str) -> Option<i64> { post_id.parse().ok() }

/// Loads the post from the path, or gives the response to send instead.
async fn load_post(g: &Global, post_id: &str, viewer: &Viewer) -> Result<post::Model, Response> {
	let id = parse_post_id(post_id).ok_or_else(|| g.not_found(viewer))?;
	match g.api.find_post(id).await {
		Ok(Some(post)) => Ok(post),
		Ok(None) => Err(g.not_found(viewer)),
		Err(e) => Err(server_error_response(e, "Unable to load post")),
	}
}

async fn index(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Query(query): Query<PageQuery>,
) -> Response {
	let page_obj = match load_page(&g, PostFilter::All, &query).await {
		Ok(p) => p,
		Err(r) => return r,
	};

	let mut context = Context::new();
	context.insert("page_obj", &page_obj);
	context.insert("title", "Latest updates on the site");
	g.render("posts/index.html.tera", context, &viewer)
}

async fn group_posts(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, Path(slug): Path<String>,
	Query(query): Query<PageQuery>,
) -> Response {
	let group = match g.api.find_group(&slug).await {
		Ok(Some(g)) => g,
		Ok(None) => return g.not_found(&viewer),
		Err(e) => return server_error_response(e, "Unable to load group"),
	};
	let page_obj = match load_page(&g, PostFilter::Group(group.id), &query).await {
		Ok(p) => p,
		Err(r) => return r,
	};

	let mut context = Context::new();
	context.insert("title", &group.title);
	context.insert("group", &group);
	context.insert("page_obj", &page_obj);
	g.render("posts/group_list.html.tera", context, &viewer)
}

async fn post_detail(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Path(post_id): Path<String>,
) -> Response {
	let id = match parse_post_id(&post_id) {
		Some(id) => id,
		None => return g.not_found(&viewer),
	};
	let info = match g.api.find_post_info(id).await {
		Ok(Some(i)) => i,
		Ok(None) => return g.not_found(&viewer),
		Err(e) => return server_error_response(e, "Unable to load post"),
	};
	let posts_count = match g.api.count_posts_by(info.author.id).await {
		Ok(c) => c,
		Err(e) => return server_error_response(e, "Unable to count posts"),
	};
	let comments: Vec<CommentView> = match g.api.load_comments(id).await {
		Ok(c) => c.into_iter().map(CommentView::from).collect(),
		Err(e) => return server_error_response(e, "Unable to load comments"),
	};

	let post = PostView::from(info);
	let mut context = Context::new();
	context.insert("title", &format!("Post {}", &post.summary));
	context.insert("username", &post.author.username);
	context.insert("post", &post);
	context.insert("posts_count", &posts_count);
	context.insert("comments", &comments);
	context.insert("form", &CommentForm::default());
	context.insert("post_view", &true);
	g.render("posts/post_detail.html.tera", context, &viewer)
}

/// Renders the post form, for either a new or an existing post.
async fn render_post_form(
	g: &Global, viewer: &Viewer, form: &PostForm, post: Option<&post::Model>,
) -> Response {
	let groups = match g.api.groups().await {
		Ok(r) => r,
		Err(e) => return server_error_response(e, "Unable to load groups"),
	};

	let mut context = Context::new();
	context.insert("form", form);
	context.insert("groups", &groups);
	context.insert("is_edit", &post.is_some());
	context.insert(
		"image_url",
		&post
			.and_then(|p| p.image.as_ref())
			.map(|path| format!("/media/{}", path)),
	);
	if let Some(post) = post {
		context.insert("title", "Edit post");
		context.insert("post", post);
	} else {
		context.insert("title", "New post");
	}
	g.render("posts/create_post.html.tera", context, viewer)
}

async fn post_create(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
) -> Response {
	render_post_form(&g, &viewer, &PostForm::default(), None).await
}

async fn post_create_post(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Extension(user): Extension<user::Model>, multipart: Multipart,
) -> Response {
	let mut form = match PostForm::parse(multipart).await {
		Ok(f) => f,
		Err(e) => return bad_request_response(&format!("Malformed post form: {}", e)),
	};
	let groups = match g.api.groups().await {
		Ok(r) => r,
		Err(e) => return server_error_response(e, "Unable to load groups"),
	};
	let valid = match form.validate(&groups) {
		Some(v) => v,
		None => return render_post_form(&g, &viewer, &form, None).await,
	};

	let image = match &valid.image {
		ImageChange::Replace(data) => Some(data.as_slice()),
		_ => None,
	};
	match g
		.api
		.create_post(&user, &valid.text, valid.group_id, image)
		.await
	{
		Ok(_) => redirect(&profile_url(&user.username)),
		Err(e) => server_error_response(e, "Unable to create post"),
	}
}

async fn post_edit(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Extension(user): Extension<user::Model>, Path(post_id): Path<String>,
) -> Response {
	let post = match load_post(&g, &post_id, &viewer).await {
		Ok(p) => p,
		Err(r) => return r,
	};
	if post.author_id != user.id {
		return redirect(&post_url(post.id));
	}
	render_post_form(&g, &viewer, &PostForm::from_post(&post), Some(&post)).await
}

async fn post_edit_post(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Extension(user): Extension<user::Model>, Path(post_id): Path<String>, multipart: Multipart,
) -> Response {
	let post = match load_post(&g, &post_id, &viewer).await {
		Ok(p) => p,
		Err(r) => return r,
	};
	if post.author_id != user.id {
		return redirect(&post_url(post.id));
	}

	let mut form = match PostForm::parse(multipart).await {
		Ok(f) => f,
		Err(e) => return bad_request_response(&format!("Malformed post form: {}", e)),
	};
	let groups = match g.api.groups().await {
		Ok(r) => r,
		Err(e) => return server_error_response(e, "Unable to load groups"),
	};
	let valid = match form.validate(&groups) {
		Some(v) => v,
		None => return render_post_form(&g, &viewer, &form, Some(&post)).await,
	};

	let post_id = post.id;
	match g
		.api
		.update_post(post, &valid.text, valid.group_id, valid.image)
		.await
	{
		Ok(_) => redirect(&post_url(post_id)),
		Err(e) => server_error_response(e, "Unable to update post"),
	}
}

/// Nothing gets submitted with a plain visit, so it just leads back to the
/// post.
async fn add_comment(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Path(post_id): Path<String>,
) -> Response {
	match load_post(&g, &post_id, &viewer).await {
		Ok(post) => redirect(&post_url(post.id)),
		Err(r) => r,
	}
}

async fn add_comment_post(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Extension(user): Extension<user::Model>, Path(post_id): Path<String>,
	Form(form): Form<CommentForm>,
) -> Response {
	let post = match load_post(&g, &post_id, &viewer).await {
		Ok(p) => p,
		Err(r) => return r,
	};
	if let Some(text) = form.validate() {
		if let Err(e) = g.api.add_comment(&post, &user, text).await {
			return server_error_response(e, "Unable to store comment");
		}
	} else {
		debug!("Ignoring empty comment on post {}.", post.id);
	}
	redirect(&post_url(post.id))
}

async fn follow_index(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Extension(user): Extension<user::Model>, Query(query): Query<PageQuery>,
) -> Response {
	let page_obj = match load_page(&g, PostFilter::FollowedBy(user.id), &query).await {
		Ok(p) => p,
		Err(r) => return r,
	};

	let mut context = Context::new();
	context.insert("title", "Followed authors");
	context.insert("page_obj", &page_obj);
	g.render("posts/follow.html.tera", context, &viewer)
}
