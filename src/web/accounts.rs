//! Signing up, logging in and logging out.

use std::sync::Arc;

use axum::{
	extract::{Query, State},
	response::{IntoResponse, Response},
	routing::get,
	Extension, Form, Router,
};
use axum_extra::extract::cookie::CookieJar;
use log::*;
use serde::Deserialize;
use tera::Context;

use super::{
	common::*,
	forms::{FormErrors, LoginForm, SignupForm},
	session::{is_safe_redirect, removal_cookie, session_cookie, Viewer},
	Global,
};
use crate::api::{self, NewAccount};


#[derive(Debug, Default, Deserialize)]
struct NextQuery {
	next: Option<String>,
}


pub fn router() -> Router<Arc<Global>> {
	Router::new()
		.route("/signup/", get(signup).post(signup_post))
		.route("/login/", get(login).post(login_post))
		.route("/logout/", get(logout).post(logout))
}

fn render_signup(g: &Global, viewer: &Viewer, form: &SignupForm, errors: &FormErrors) -> Response {
	let mut context = Context::new();
	context.insert("title", "Sign up");
	context.insert("form", form);
	context.insert("errors", errors);
	g.render("users/signup.html.tera", context, viewer)
}

fn render_login(g: &Global, viewer: &Viewer, form: &LoginForm, errors: &FormErrors) -> Response {
	let mut context = Context::new();
	context.insert("title", "Log in");
	context.insert("form", form);
	context.insert("errors", errors);
	g.render("users/login.html.tera", context, viewer)
}

async fn signup(State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>) -> Response {
	render_signup(&g, &viewer, &SignupForm::default(), &FormErrors::default())
}

async fn signup_post(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, cookies: CookieJar,
	Form(form): Form<SignupForm>,
) -> Response {
	let mut errors = form.validate();
	if !errors.is_empty() {
		return render_signup(&g, &viewer, &form, &errors);
	}

	let result = g
		.api
		.sign_up(NewAccount {
			username: form.username.trim(),
			first_name: form.first_name.trim(),
			last_name: form.last_name.trim(),
			email: form.email.trim(),
			password: &form.password1,
		})
		.await;
	match result {
		Ok((_, token)) => {
			let cookies = cookies.add(session_cookie(token, g.config.secure_cookies));
			(cookies, redirect("/")).into_response()
		}
		Err(api::Error::UsernameTaken) => {
			errors.add("username", api::Error::UsernameTaken.to_string());
			render_signup(&g, &viewer, &form, &errors)
		}
		Err(e) => server_error_response(e, "Unable to sign up"),
	}
}

async fn login(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Query(query): Query<NextQuery>,
) -> Response {
	let form = LoginForm {
		next: query.next.unwrap_or_default(),
		..Default::default()
	};
	render_login(&g, &viewer, &form, &FormErrors::default())
}

async fn login_post(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, cookies: CookieJar,
	Form(form): Form<LoginForm>,
) -> Response {
	let mut errors = form.validate();
	if !errors.is_empty() {
		return render_login(&g, &viewer, &form, &errors);
	}

	match g.api.log_in(form.username.trim(), &form.password).await {
		Err(e) => server_error_response(e, "Unable to log in"),
		Ok(None) => {
			info!("Failed login attempt for {}.", form.username.trim());
			errors.add_non_field(
				"Please enter a correct username and password. Note that both fields may be \
				 case-sensitive.",
			);
			render_login(&g, &viewer, &form, &errors)
		}
		Ok(Some((_, token))) => {
			let target = if is_safe_redirect(&form.next) {
				form.next.as_str()
			} else {
				"/"
			};
			let cookies = cookies.add(session_cookie(token, g.config.secure_cookies));
			(cookies, redirect(target)).into_response()
		}
	}
}

async fn logout(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, cookies: CookieJar,
) -> Response {
	if let Some(token) = &viewer.session {
		if let Err(e) = g.api.log_out(token).await {
			return server_error_response(e, "Unable to log out");
		}
	}

	let mut context = Context::new();
	context.insert("title", "Logged out");
	let response = g.render("users/logged_out.html.tera", context, &Viewer::default());
	(cookies.remove(removal_cookie()), response).into_response()
}
