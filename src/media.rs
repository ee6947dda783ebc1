//! Storage of images uploaded along with posts.

use std::{
	io,
	path::{Path, PathBuf},
};

use image::ImageFormat;
use log::*;
use thiserror::Error;
use uuid::Uuid;


/// The folder inside the media root that post images are stored in.
pub const POST_IMAGE_FOLDER: &str = "posts";
const ACCEPTED_FORMATS: [ImageFormat; 5] = [
	ImageFormat::Png,
	ImageFormat::Jpeg,
	ImageFormat::Gif,
	ImageFormat::WebP,
	ImageFormat::Bmp,
];

#[derive(Debug, Error)]
pub enum Error {
	#[error(
		"Upload a valid image. The file you uploaded was either not an image or a corrupted image."
	)]
	InvalidImage,
	#[error("unable to store image: {0}")]
	Io(#[from] io::Error),
}

#[derive(Clone)]
pub struct MediaStore {
	root: PathBuf,
}


/// Checks that the bytes form a complete image in one of the accepted formats.
pub fn validate_image(data: &[u8]) -> Result<ImageFormat, Error> {
	let format = image::guess_format(data).map_err(|_| Error::InvalidImage)?;
	if !ACCEPTED_FORMATS.contains(&format) {
		return Err(Error::InvalidImage);
	}
	if let Err(e) = image::load_from_memory_with_format(data, format) {
		debug!("Rejecting uploaded {:?} image: {}", format, e);
		return Err(Error::InvalidImage);
	}
	Ok(format)
}

impl MediaStore {
	pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

	pub fn root(&self) -> &Path { &self.root }

	/// Validates and stores a post image under a random name. Returns the path
	/// relative to the media root.
	pub async fn store_post_image(&self, data: &[u8]) -> Result<String, Error> {
		let format = validate_image(data)?;
		let extension = format.extensions_str().first().copied().unwrap_or("img");

		let folder = self.root.join(POST_IMAGE_FOLDER);
		tokio::fs::create_dir_all(&folder).await?;
		let file_name = format!("{}.{}", Uuid::new_v4().simple(), extension);
		tokio::fs::write(folder.join(&file_name), data).await?;
		Ok(format!("{}/{}", POST_IMAGE_FOLDER, file_name))
	}

	/// Removes a previously stored image. A file that is already gone is not
	/// an error.
	pub async fn remove(&self, relative_path: &str) -> Result<(), Error> {
		match tokio::fs::remove_file(self.root.join(relative_path)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	pub async fn size_of(&self, relative_path: &str) -> Result<u64, Error> {
		Ok(tokio::fs::metadata(self.root.join(relative_path)).await?.len())
	}
}


#[cfg(test)]
pub(crate) mod tests {
	use super::*;

	/// A 2x1 pixel GIF.
	pub const SMALL_GIF: &[u8] = &[
		0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
		0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
		0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
	];

	#[test]
	fn test_validate_image() {
		assert_eq!(validate_image(SMALL_GIF).unwrap(), ImageFormat::Gif);
		assert!(matches!(
			validate_image(b"just some text"),
			Err(Error::InvalidImage)
		));
		// A truncated image isn't accepted either
		assert!(validate_image(&SMALL_GIF[..12]).is_err());
	}

	#[tokio::test]
	async fn test_store_and_remove() {
		let dir = tempfile::tempdir().unwrap();
		let store = MediaStore::new(dir.path());
		let path = store.store_post_image(SMALL_GIF).await.unwrap();
		assert!(path.starts_with("posts/"));
		assert!(path.ends_with(".gif"));
		assert_eq!(store.size_of(&path).await.unwrap(), SMALL_GIF.len() as u64);

		store.remove(&path).await.unwrap();
		assert!(store.size_of(&path).await.is_err());
		store.remove(&path).await.unwrap();
	}
}
