//! Resolves the logged in user from the session cookie, and guards the pages
//! that need one.

use std::sync::Arc;

use axum::{
	extract::{Request, State},
	middleware::Next,
	response::Response,
	Extension,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;

use super::{common::*, Global};
use crate::entity::user;


pub const SESSION_COOKIE: &str = "sessionid";
pub const LOGIN_URL: &str = "/auth/login/";

/// Whoever is making the request.
#[derive(Clone, Debug, Default)]
pub struct Viewer {
	pub user: Option<user::Model>,
	pub session: Option<String>,
}

#[derive(Serialize)]
pub struct ViewerView {
	is_authenticated: bool,
	id: Option<i64>,
	username: Option<String>,
	display_name: Option<String>,
}


impl Viewer {
	pub fn is(&self, user_id: i64) -> bool { self.user.as_ref().map(|u| u.id) == Some(user_id) }

	/// Key that separates the cached pages of different viewers.
	pub fn cache_key(&self) -> String {
		match &self.user {
			None => "anonymous".to_string(),
			Some(user) => format!("user-{}", user.id),
		}
	}

	pub fn view(&self) -> ViewerView {
		ViewerView {
			is_authenticated: self.user.is_some(),
			id: self.user.as_ref().map(|u| u.id),
			username: self.user.as_ref().map(|u| u.username.clone()),
			display_name: self.user.as_ref().map(|u| u.display_name()),
		}
	}
}

pub async fn session_middleware(
	State(g): State<Arc<Global>>, cookies: CookieJar, mut request: Request, next: Next,
) -> Response {
	let mut viewer = Viewer::default();
	if let Some(cookie) = cookies.get(SESSION_COOKIE) {
		let token = cookie.value().to_string();
		match g.api.find_user_by_session(&token).await {
			Err(e) => return server_error_response(e, "Unable to load session"),
			Ok(Some(user)) => {
				viewer.user = Some(user);
				viewer.session = Some(token);
			}
			// Stale cookies are treated as anonymous
			Ok(None) => {}
		}
	}
	request.extensions_mut().insert(viewer);
	next.run(request).await
}

/// Redirects anonymous visitors to the login page. Logged in users get their
/// user model attached to the request.
pub async fn login_required(
	Extension(viewer): Extension<Viewer>, mut request: Request, next: Next,
) -> Response {
	match viewer.user {
		None => {
			let target = request
				.uri()
				.path_and_query()
				.map(|pq| pq.as_str().to_string())
				.unwrap_or_else(|| request.uri().path().to_string());
			redirect(&login_url(Some(&target)))
		}
		Some(user) => {
			request.extensions_mut().insert(user);
			next.run(request).await
		}
	}
}

pub fn login_url(next: Option<&str>) -> String {
	match next {
		None => LOGIN_URL.to_string(),
		Some(target) => format!("{}?next={}", LOGIN_URL, urlencoding::encode(target)),
	}
}

/// Only local paths are followed after logging in. Control characters can't
/// go into a location header.
pub fn is_safe_redirect(target: &str) -> bool {
	target.starts_with('/')
		&& !target.starts_with("//")
		&& !target.starts_with("/\\")
		&& !target.chars().any(|c| c.is_control())
}

pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
	Cookie::build((SESSION_COOKIE, token))
		.path("/")
		.http_only(true)
		.same_site(SameSite::Lax)
		.secure(secure)
		.build()
}

pub fn removal_cookie() -> Cookie<'static> { Cookie::build(SESSION_COOKIE).path("/").build() }
