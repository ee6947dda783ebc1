use axum::{
	body::{self, Body},
	http::{header, Method, Request, StatusCode},
	response::Response,
	Router,
};
use blogrolld::{
	db::{PersistenceHandle, PostFilter},
	test::*,
	web::RenderedTemplate,
};
use tower::ServiceExt;


/// A 2x1 pixel GIF.
const SMALL_GIF: &[u8] = &[
	0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
	0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00,
	0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
];
const BOUNDARY: &str = "blogrolltestboundary";
const POST_CARD: &str = "<article class=\"post\">";


#[ctor::ctor]
fn initialize() { env_logger::init(); }

async fn send(router: &Router, request: Request<Body>) -> Response {
	router.clone().oneshot(request).await.unwrap()
}

fn request(method: Method, uri: &str, session: Option<&str>) -> axum::http::request::Builder {
	let builder = Request::builder().method(method).uri(uri);
	match session {
		Some(token) => builder.header(header::COOKIE, format!("sessionid={}", token)),
		None => builder,
	}
}

async fn get(router: &Router, uri: &str, session: Option<&str>) -> Response {
	let request = request(Method::GET, uri, session)
		.body(Body::empty())
		.unwrap();
	send(router, request).await
}

async fn post_form(router: &Router, uri: &str, session: Option<&str>, form: &str) -> Response {
	let request = request(Method::POST, uri, session)
		.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
		.body(Body::from(form.to_string()))
		.unwrap();
	send(router, request).await
}

/// Sends a multipart form, with an optional image upload in the `image`
/// field.
async fn post_multipart(
	router: &Router, uri: &str, session: Option<&str>, fields: &[(&str, &str)],
	image: Option<&[u8]>,
) -> Response {
	let mut data = Vec::new();
	for (name, value) in fields {
		data.extend_from_slice(
			format!(
				"--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
				BOUNDARY, name, value
			)
			.as_bytes(),
		);
	}
	if let Some(image) = image {
		data.extend_from_slice(
			format!(
				"--{}\r\nContent-Disposition: form-data; name=\"image\"; \
				 filename=\"small.gif\"\r\nContent-Type: image/gif\r\n\r\n",
				BOUNDARY
			)
			.as_bytes(),
		);
		data.extend_from_slice(image);
		data.extend_from_slice(b"\r\n");
	}
	data.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

	let request = request(Method::POST, uri, session)
		.header(
			header::CONTENT_TYPE,
			format!("multipart/form-data; boundary={}", BOUNDARY),
		)
		.body(Body::from(data))
		.unwrap();
	send(router, request).await
}

fn template(response: &Response) -> Option<&str> {
	response
		.extensions()
		.get::<RenderedTemplate>()
		.map(|t| t.0.as_str())
}

fn location(response: &Response) -> &str {
	response
		.headers()
		.get(header::LOCATION)
		.expect("no location header")
		.to_str()
		.unwrap()
}

fn session_from(response: &Response) -> Option<String> {
	response
		.headers()
		.get_all(header::SET_COOKIE)
		.iter()
		.filter_map(|v| v.to_str().ok())
		.filter_map(|v| v.split(';').next())
		.filter_map(|v| v.strip_prefix("sessionid="))
		.find(|v| !v.is_empty())
		.map(|v| v.to_string())
}

async fn body_string(response: Response) -> String {
	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.unwrap();
	String::from_utf8(bytes.to_vec()).unwrap()
}


#[tokio::test]
async fn test_pages_use_correct_templates() {
	let (g, router, _media) = load_app("web-templates").await;
	let db = &g.api.db;
	let author = create_user(db, "user_author").await;
	let group = create_group(db, "test-slug").await;
	let post = create_post(db, &author, Some(&group), "Post text").await;
	let session = log_in(db, &author).await;

	let pages = [
		("/".to_string(), "posts/index.html.tera"),
		("/group/test-slug/".to_string(), "posts/group_list.html.tera"),
		("/profile/user_author/".to_string(), "posts/profile.html.tera"),
		(format!("/posts/{}/", post.id), "posts/post_detail.html.tera"),
		(format!("/posts/{}/edit/", post.id), "posts/create_post.html.tera"),
		("/create/".to_string(), "posts/create_post.html.tera"),
		("/follow/".to_string(), "posts/follow.html.tera"),
		("/about/author/".to_string(), "about/author.html.tera"),
		("/about/tech/".to_string(), "about/tech.html.tera"),
		("/auth/login/".to_string(), "users/login.html.tera"),
		("/auth/signup/".to_string(), "users/signup.html.tera"),
	];
	for (uri, expected) in pages {
		let response = get(&router, &uri, Some(&session)).await;
		assert_eq!(response.status(), StatusCode::OK, "{}", uri);
		assert_eq!(template(&response), Some(expected), "{}", uri);
	}
}

#[tokio::test]
async fn test_public_pages_for_anonymous_visitors() {
	let (g, router, _media) = load_app("web-public").await;
	let db = &g.api.db;
	let author = create_user(db, "user_author").await;
	create_group(db, "test-slug").await;
	let post = create_post(db, &author, None, "Post text").await;

	for uri in [
		"/".to_string(),
		"/group/test-slug/".to_string(),
		"/profile/user_author/".to_string(),
		format!("/posts/{}/", post.id),
		"/about/author/".to_string(),
		"/about/tech/".to_string(),
	] {
		let response = get(&router, &uri, None).await;
		assert_eq!(response.status(), StatusCode::OK, "{}", uri);
	}
}

#[tokio::test]
async fn test_missing_pages() {
	let (g, router, _media) = load_app("web-missing").await;
	create_user(&g.api.db, "user_author").await;

	for uri in [
		"/nonexistent-page/",
		"/group/no-such-group/",
		"/profile/nobody/",
		"/posts/12345/",
		"/posts/not-a-number/",
	] {
		let response = get(&router, uri, None).await;
		assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
		assert_eq!(template(&response), Some("core/404.html.tera"), "{}", uri);
	}
}

#[tokio::test]
async fn test_anonymous_visitors_are_sent_to_login() {
	let (g, router, _media) = load_app("web-login-required").await;
	let db = &g.api.db;
	let author = create_user(db, "user_author").await;
	let post = create_post(db, &author, None, "Post text").await;

	let protected = [
		"/create/".to_string(),
		format!("/posts/{}/edit/", post.id),
		format!("/posts/{}/comment/", post.id),
		"/follow/".to_string(),
		"/profile/user_author/follow/".to_string(),
		"/profile/user_author/unfollow/".to_string(),
	];
	for uri in protected {
		let response = get(&router, &uri, None).await;
		assert_eq!(response.status(), StatusCode::FOUND, "{}", uri);
		assert_eq!(
			location(&response),
			format!("/auth/login/?next={}", urlencoding::encode(&uri)),
		);
	}

	// Stale session cookies count as anonymous
	let response = get(&router, "/create/", Some("no-such-session")).await;
	assert_eq!(location(&response), "/auth/login/?next=%2Fcreate%2F");
}

#[tokio::test]
async fn test_only_the_author_can_edit() {
	let (g, router, _media) = load_app("web-edit-rights").await;
	let db = &g.api.db;
	let author = create_user(db, "user_author").await;
	let other = create_user(db, "user_not_author").await;
	let post = create_post(db, &author, None, "Post text").await;
	let session = log_in(db, &other).await;

	let uri = format!("/posts/{}/edit/", post.id);
	let response = get(&router, &uri, Some(&session)).await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(location(&response), format!("/posts/{}/", post.id));

	let response = post_multipart(
		&router,
		&uri,
		Some(&session),
		&[("text", "Changed by someone else")],
		None,
	)
	.await;
	assert_eq!(location(&response), format!("/posts/{}/", post.id));
	let stored = db.find_post(post.id).await.unwrap().unwrap();
	assert_eq!(stored.text, "Post text");
}

#[tokio::test]
async fn test_create_post_with_image() {
	let (g, router, _media) = load_app("web-create").await;
	let db = &g.api.db;
	let author = create_user(db, "user_author").await;
	let group = create_group(db, "test-slug").await;
	let session = log_in(db, &author).await;

	let group_id = group.id.to_string();
	let response = post_multipart(
		&router,
		"/create/",
		Some(&session),
		&[("text", "A post with an image"), ("group", &group_id)],
		Some(SMALL_GIF),
	)
	.await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(location(&response), "/profile/user_author/");

	let posts = db.load_posts(PostFilter::All, 10, 0).await.unwrap();
	assert_eq!(posts.len(), 1);
	let created = &posts[0];
	assert_eq!(created.post.text, "A post with an image");
	assert_eq!(created.author.id, author.id);
	assert_eq!(created.group.as_ref().map(|g| g.id), Some(group.id));
	let image = created.post.image.clone().expect("image not stored");
	assert!(image.starts_with("posts/"));
	assert_eq!(
		g.api.media.size_of(&image).await.unwrap(),
		SMALL_GIF.len() as u64
	);

	// The image is shown on the post, its url escaped like any other value
	let response = get(&router, &format!("/posts/{}/", created.post.id), None).await;
	let body = body_string(response).await;
	let file_name = image.trim_start_matches("posts/");
	assert!(body.contains("<img class=\"post-image\""));
	assert!(body.contains(&format!("&#x2F;media&#x2F;posts&#x2F;{}", file_name)));
}

#[tokio::test]
async fn test_invalid_post_form_is_shown_again() {
	let (g, router, _media) = load_app("web-create-invalid").await;
	let db = &g.api.db;
	let author = create_user(db, "user_author").await;
	let session = log_in(db, &author).await;

	let response = post_multipart(
		&router,
		"/create/",
		Some(&session),
		&[("text", "")],
		Some(&b"not a gif"[..]),
	)
	.await;
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(template(&response), Some("posts/create_post.html.tera"));
	let body = body_string(response).await;
	assert!(body.contains("This field is required."));
	assert!(body.contains("Upload a valid image."));
	assert_eq!(db.count_posts(PostFilter::All).await.unwrap(), 0);
}

#[tokio::test]
async fn test_edit_post() {
	let (g, router, _media) = load_app("web-edit").await;
	let db = &g.api.db;
	let author = create_user(db, "user_author").await;
	let group = create_group(db, "test-slug").await;
	let post = create_post(db, &author, Some(&group), "Post text").await;
	let session = log_in(db, &author).await;

	let uri = format!("/posts/{}/edit/", post.id);
	let response = get(&router, &uri, Some(&session)).await;
	let body = body_string(response).await;
	assert!(body.contains("Post text"));
	assert!(body.contains("Save"));

	let response = post_multipart(
		&router,
		&uri,
		Some(&session),
		&[("text", "Edited text"), ("group", "")],
		Some(SMALL_GIF),
	)
	.await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(location(&response), format!("/posts/{}/", post.id));

	let edited = db.find_post(post.id).await.unwrap().unwrap();
	assert_eq!(edited.text, "Edited text");
	assert_eq!(edited.group_id, None);
	assert_eq!(edited.pub_date, post.pub_date);
	assert_eq!(edited.author_id, author.id);
	assert!(edited.image.is_some());

	post_multipart(
		&router,
		&uri,
		Some(&session),
		&[("text", "Edited text"), ("image-clear", "on")],
		None,
	)
	.await;
	let edited = db.find_post(post.id).await.unwrap().unwrap();
	assert_eq!(edited.image, None);
}

#[tokio::test]
async fn test_comments() {
	let (g, router, _media) = load_app("web-comments").await;
	let db = &g.api.db;
	let author = create_user(db, "user_author").await;
	let commenter = create_user(db, "commenter").await;
	let post = create_post(db, &author, None, "Post text").await;
	let session = log_in(db, &commenter).await;

	let uri = format!("/posts/{}/comment/", post.id);
	let response = post_form(&router, &uri, None, "text=Anonymous+comment").await;
	assert!(location(&response).starts_with("/auth/login/"));
	assert!(db.load_comments(post.id).await.unwrap().is_empty());

	let response = post_form(&router, &uri, Some(&session), "text=Nice+post").await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(location(&response), format!("/posts/{}/", post.id));

	// An empty comment is dropped, but still leads back to the post
	let response = post_form(&router, &uri, Some(&session), "text=").await;
	assert_eq!(location(&response), format!("/posts/{}/", post.id));

	let comments = db.load_comments(post.id).await.unwrap();
	assert_eq!(comments.len(), 1);
	assert_eq!(comments[0].0.text, "Nice post");
	assert_eq!(comments[0].1.id, commenter.id);

	let response = get(&router, &format!("/posts/{}/", post.id), None).await;
	assert!(body_string(response).await.contains("Nice post"));

	let response = post_form(&router, "/posts/999/comment/", Some(&session), "text=Hi").await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_follow_and_unfollow() {
	let (g, router, _media) = load_app("web-follow").await;
	let db = &g.api.db;
	let author = create_user(db, "user_author").await;
	let follower = create_user(db, "follower").await;
	let bystander = create_user(db, "bystander").await;
	create_post(db, &author, None, "Followed post").await;
	let session = log_in(db, &follower).await;
	let bystander_session = log_in(db, &bystander).await;

	let response = get(&router, "/profile/user_author/follow/", Some(&session)).await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(location(&response), "/profile/user_author/");
	assert!(db.is_following(follower.id, author.id).await.unwrap());

	// Following twice doesn't fail
	let response = get(&router, "/profile/user_author/follow/", Some(&session)).await;
	assert_eq!(response.status(), StatusCode::FOUND);

	let response = get(&router, "/follow/", Some(&session)).await;
	let body = body_string(response).await;
	assert_eq!(body.matches(POST_CARD).count(), 1);
	assert!(body.contains("Followed post"));

	let response = get(&router, "/follow/", Some(&bystander_session)).await;
	let body = body_string(response).await;
	assert_eq!(body.matches(POST_CARD).count(), 0);

	let response = get(&router, "/profile/user_author/", Some(&session)).await;
	assert!(body_string(response).await.contains("Unfollow"));

	let response = get(&router, "/profile/user_author/unfollow/", Some(&session)).await;
	assert_eq!(location(&response), "/profile/user_author/");
	assert!(!db.is_following(follower.id, author.id).await.unwrap());
	let response = get(&router, "/follow/", Some(&session)).await;
	assert_eq!(body_string(response).await.matches(POST_CARD).count(), 0);
}

#[tokio::test]
async fn test_following_yourself_does_nothing() {
	let (g, router, _media) = load_app("web-follow-self").await;
	let db = &g.api.db;
	let author = create_user(db, "user_author").await;
	let session = log_in(db, &author).await;

	let response = get(&router, "/profile/user_author/follow/", Some(&session)).await;
	assert_eq!(location(&response), "/profile/user_author/");
	assert!(!db.is_following(author.id, author.id).await.unwrap());

	let response = get(&router, "/profile/nobody/follow/", Some(&session)).await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pagination() {
	let (g, router, _media) = load_app("web-pagination").await;
	let db = &g.api.db;
	let author = create_user(db, "user_author").await;
	let group = create_group(db, "test-slug").await;
	for i in 0..13 {
		create_post(db, &author, Some(&group), &format!("Post number {}", i)).await;
	}

	for uri in ["/", "/group/test-slug/", "/profile/user_author/"] {
		let response = get(&router, uri, None).await;
		assert_eq!(body_string(response).await.matches(POST_CARD).count(), 10);

		let response = get(&router, &format!("{}?page=2", uri), None).await;
		assert_eq!(body_string(response).await.matches(POST_CARD).count(), 3);
	}

	// Out of range pages show the last page
	let response = get(&router, "/group/test-slug/?page=99", None).await;
	assert_eq!(body_string(response).await.matches(POST_CARD).count(), 3);
}

#[tokio::test]
async fn test_index_is_cached() {
	let (g, router, _media) = load_app("web-cache").await;
	let db = &g.api.db;
	let author = create_user(db, "user_author").await;
	create_post(db, &author, None, "First post").await;

	let first = body_string(get(&router, "/", None).await).await;
	create_post(db, &author, None, "Second post").await;

	let response = get(&router, "/", None).await;
	assert_eq!(template(&response), Some("posts/index.html.tera"));
	let second = body_string(response).await;
	assert_eq!(first, second);
	assert!(!second.contains("Second post"));

	g.index_cache.clear().await;
	let third = body_string(get(&router, "/", None).await).await;
	assert_ne!(first, third);
	assert!(third.contains("Second post"));
}

#[tokio::test]
async fn test_post_text_is_escaped() {
	let (g, router, _media) = load_app("web-escape").await;
	let db = &g.api.db;
	let author = create_user(db, "user_author").await;
	let post = create_post(db, &author, None, "<script>alert(1)</script>\nsecond line").await;

	let body = body_string(get(&router, &format!("/posts/{}/", post.id), None).await).await;
	assert!(!body.contains("<script>"));
	assert!(body.contains("&lt;script&gt;"));
	assert!(body.contains("<br>"));
}

#[tokio::test]
async fn test_sign_up_log_in_and_out() {
	let (g, router, _media) = load_app("web-accounts").await;

	let response = post_form(
		&router,
		"/auth/signup/",
		None,
		"first_name=Leo&last_name=Tolstoy&username=leo&email=leo%40example.com&password1=war+and+\
		 peace&password2=war+and+peace",
	)
	.await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(location(&response), "/");
	let session = session_from(&response).expect("no session cookie");
	let response = get(&router, "/follow/", Some(&session)).await;
	assert_eq!(response.status(), StatusCode::OK);

	// The username is taken now
	let response = post_form(
		&router,
		"/auth/signup/",
		None,
		"username=leo&password1=anna+karenina&password2=anna+karenina",
	)
	.await;
	assert_eq!(template(&response), Some("users/signup.html.tera"));
	assert!(body_string(response).await.contains("already exists"));

	let response = get(&router, "/auth/logout/", Some(&session)).await;
	assert_eq!(template(&response), Some("users/logged_out.html.tera"));
	let response = get(&router, "/follow/", Some(&session)).await;
	assert_eq!(response.status(), StatusCode::FOUND);

	let response = post_form(
		&router,
		"/auth/login/",
		None,
		"username=leo&password=wrong+password&next=%2Ffollow%2F",
	)
	.await;
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(template(&response), Some("users/login.html.tera"));

	let response = post_form(
		&router,
		"/auth/login/",
		None,
		"username=leo&password=war+and+peace&next=%2Ffollow%2F",
	)
	.await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(location(&response), "/follow/");
	assert!(session_from(&response).is_some());

	// Only local redirects are followed
	let response = post_form(
		&router,
		"/auth/login/",
		None,
		"username=leo&password=war+and+peace&next=https%3A%2F%2Fexample.com%2F",
	)
	.await;
	assert_eq!(location(&response), "/");

	// A line break can't sneak into the location header
	let response = post_form(
		&router,
		"/auth/login/",
		None,
		"username=leo&password=war+and+peace&next=%2Ffollow%2F%0D%0ASet-Cookie%3A+x%3Dy",
	)
	.await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(location(&response), "/");
	assert!(g.api.find_user("leo").await.unwrap().is_some());
}
