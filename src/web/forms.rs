//! Parsing and validation of the submitted forms.

use std::collections::BTreeMap;

use axum::extract::{multipart::MultipartError, Multipart};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
	account,
	api::ImageChange,
	entity::{group, post},
	media,
};


pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
	"Select a valid choice. That choice is not one of the available choices.";
pub const CLEAR_AND_UPLOAD: &str =
	"Please either submit a file or check the clear checkbox, not both.";

#[derive(Debug, Default, Serialize)]
pub struct FormErrors {
	pub fields: BTreeMap<String, Vec<String>>,
	pub non_field: Vec<String>,
}

/// The post form, as submitted for both creating and editing a post.
#[derive(Debug, Default, Serialize)]
pub struct PostForm {
	pub text: String,
	/// The id of the chosen group, or an empty string for none.
	pub group: String,
	#[serde(skip)]
	pub image: Option<Vec<u8>>,
	#[serde(skip)]
	pub clear_image: bool,
	pub errors: FormErrors,
}

/// A post form that passed validation.
#[derive(Debug)]
pub struct ValidPost {
	pub text: String,
	pub group_id: Option<i64>,
	pub image: ImageChange,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CommentForm {
	pub text: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginForm {
	pub username: String,
	#[serde(skip_serializing)]
	pub password: String,
	pub next: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SignupForm {
	pub first_name: String,
	pub last_name: String,
	pub username: String,
	pub email: String,
	#[serde(skip_serializing)]
	pub password1: String,
	#[serde(skip_serializing)]
	pub password2: String,
}


impl FormErrors {
	pub fn add(&mut self, field: &str, message: impl Into<String>) {
		self.fields
			.entry(field.to_string())
			.or_default()
			.push(message.into());
	}

	pub fn add_non_field(&mut self, message: impl Into<String>) {
		self.non_field.push(message.into());
	}

	pub fn is_empty(&self) -> bool { self.fields.is_empty() && self.non_field.is_empty() }
}

impl PostForm {
	/// Prefills the form with the current state of the post.
	pub fn from_post(post: &post::Model) -> Self {
		Self {
			text: post.text.clone(),
			group: post.group_id.map(|id| id.to_string()).unwrap_or_default(),
			..Default::default()
		}
	}

	pub async fn parse(mut multipart: Multipart) -> Result<Self, MultipartError> {
		let mut form = Self::default();
		while let Some(field) = multipart.next_field().await? {
			let name = field.name().unwrap_or_default().to_string();
			match name.as_str() {
				"text" => form.text = field.text().await?,
				"group" => form.group = field.text().await?,
				"image" => {
					let data = field.bytes().await?;
					// An empty file input is submitted as an empty part
					if data.len() > 0 {
						form.image = Some(data.to_vec());
					}
				}
				"image-clear" => form.clear_image = field.text().await?.len() > 0,
				// The submit button and friends
				other => debug!("Ignoring post form field {}.", other),
			}
		}
		Ok(form)
	}

	/// Checks the fields against the available groups. The errors are kept on
	/// the form when it isn't valid.
	pub fn validate(&mut self, groups: &[group::Model]) -> Option<ValidPost> {
		let text = self.text.trim().to_string();
		if text.is_empty() {
			self.errors.add("text", REQUIRED);
		}

		let group_choice = self.group.trim();
		let group_id = if group_choice.is_empty() {
			None
		} else {
			match group_choice.parse::<i64>() {
				Ok(id) if groups.iter().any(|g| g.id == id) => Some(id),
				_ => {
					self.errors.add("group", INVALID_CHOICE);
					None
				}
			}
		};

		let image = match self.image.take() {
			Some(_) if self.clear_image => {
				self.errors.add("image", CLEAR_AND_UPLOAD);
				ImageChange::Keep
			}
			Some(data) => match media::validate_image(&data) {
				Ok(_) => ImageChange::Replace(data),
				Err(e) => {
					self.errors.add("image", e.to_string());
					ImageChange::Keep
				}
			},
			None if self.clear_image => ImageChange::Clear,
			None => ImageChange::Keep,
		};

		if !self.errors.is_empty() {
			return None;
		}
		Some(ValidPost {
			text,
			group_id,
			image,
		})
	}
}

impl CommentForm {
	/// Returns the text to store, if there is any.
	pub fn validate(&self) -> Option<&str> {
		let text = self.text.trim();
		if text.is_empty() {
			None
		} else {
			Some(text)
		}
	}
}

impl LoginForm {
	pub fn validate(&self) -> FormErrors {
		let mut errors = FormErrors::default();
		if self.username.trim().is_empty() {
			errors.add("username", REQUIRED);
		}
		if self.password.is_empty() {
			errors.add("password", REQUIRED);
		}
		errors
	}
}

impl SignupForm {
	/// Validates everything except whether the username is still available.
	pub fn validate(&self) -> FormErrors {
		let mut errors = FormErrors::default();
		if let Some(message) = account::validate_username(self.username.trim()) {
			errors.add("username", message);
		}
		if let Some(message) = account::validate_password(&self.password1) {
			errors.add("password1", message);
		}
		if self.password2.is_empty() {
			errors.add("password2", REQUIRED);
		} else if self.password1 != self.password2 {
			errors.add("password2", "The two password fields didn't match.");
		}
		errors
	}
}
