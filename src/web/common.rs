use std::fmt::{Debug, Display};

use axum::{
	http::{header, StatusCode},
	response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::*;
use serde::Serialize;

use crate::{
	db::PostInfo,
	entity::{comment, group, user},
	paginator::Page,
};


#[derive(Debug, Serialize)]
pub struct UserView {
	pub id: i64,
	pub username: String,
	pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct PostView {
	pub id: i64,
	pub text: String,
	pub summary: String,
	pub pub_date: String,
	pub time_ago: String,
	pub author: UserView,
	pub group: Option<group::Model>,
	pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommentView {
	pub id: i64,
	pub text: String,
	pub created: String,
	pub author: UserView,
}

/// A page of posts, as the paginator templates expect it.
#[derive(Debug, Serialize)]
pub struct PageView {
	#[serde(flatten)]
	pub page: Page,
	pub object_list: Vec<PostView>,
}


impl From<&user::Model> for UserView {
	fn from(user: &user::Model) -> Self {
		Self {
			id: user.id,
			username: user.username.clone(),
			display_name: user.display_name(),
		}
	}
}

impl From<PostInfo> for PostView {
	fn from(info: PostInfo) -> Self {
		let created = timestamp(info.post.pub_date);
		Self {
			id: info.post.id,
			summary: info.post.summary(),
			pub_date: format_date(&created),
			time_ago: human_readable_duration(&Utc::now().signed_duration_since(created)),
			author: UserView::from(&info.author),
			group: info.group,
			image_url: info.post.image.map(|path| format!("/media/{}", path)),
			text: info.post.text,
		}
	}
}

impl From<(comment::Model, user::Model)> for CommentView {
	fn from((comment, author): (comment::Model, user::Model)) -> Self {
		Self {
			id: comment.id,
			created: format_date(&timestamp(comment.created)),
			author: UserView::from(&author),
			text: comment.text,
		}
	}
}

impl PageView {
	pub fn new(page: Page, posts: Vec<PostInfo>) -> Self {
		Self {
			page,
			object_list: posts.into_iter().map(PostView::from).collect(),
		}
	}
}

fn timestamp(millis: i64) -> DateTime<Utc> {
	Utc.timestamp_millis_opt(millis)
		.single()
		.unwrap_or_default()
}

pub fn format_date(date: &DateTime<Utc>) -> String { date.format("%d %B %Y").to_string() }

pub fn human_readable_duration(duration: &Duration) -> String {
	let (amount, unit) = if duration.num_weeks() > 0 {
		(duration.num_weeks(), "week")
	} else if duration.num_days() > 0 {
		(duration.num_days(), "day")
	} else if duration.num_hours() > 0 {
		(duration.num_hours(), "hour")
	} else if duration.num_minutes() > 0 {
		(duration.num_minutes(), "minute")
	} else {
		(duration.num_seconds().max(0), "second")
	};
	if amount == 1 {
		format!("{} {}", amount, unit)
	} else {
		format!("{} {}s", amount, unit)
	}
}

pub fn error_response<S>(status_code: StatusCode, message: S) -> Response
where
	S: Into<String>,
{
	let string: String = message.into();
	if status_code.is_client_error() || status_code.is_server_error() {
		warn!("HTTP {} error: {}", status_code.as_u16(), &string);
	}
	(
		status_code,
		[(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
		string,
	)
		.into_response()
}

pub fn bad_request_response(message: &str) -> Response {
	error_response(StatusCode::BAD_REQUEST, message)
}

pub fn server_error_response<E>(e: E, message: &str) -> Response
where
	E: Debug + Display,
{
	error!("{}: {:?}", message, e);
	error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

/// A plain `302 Found` redirect.
pub fn redirect(location: &str) -> Response {
	(StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

pub fn profile_url(username: &str) -> String {
	format!("/profile/{}/", urlencoding::encode(username))
}

pub fn post_url(post_id: i64) -> String { format!("/posts/{}/", post_id) }


#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_human_readable_duration() {
		assert_eq!(human_readable_duration(&Duration::seconds(1)), "1 second");
		assert_eq!(human_readable_duration(&Duration::seconds(0)), "0 seconds");
		assert_eq!(human_readable_duration(&Duration::minutes(5)), "5 minutes");
		assert_eq!(human_readable_duration(&Duration::hours(25)), "1 day");
		assert_eq!(human_readable_duration(&Duration::days(15)), "2 weeks");
	}

	#[test]
	fn test_redirect() {
		let response = redirect("/posts/3/");
		assert_eq!(response.status(), StatusCode::FOUND);
		assert_eq!(response.headers()[header::LOCATION], "/posts/3/");
	}
}
