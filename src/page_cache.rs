//! A bounded store of rendered pages that expire after a fixed time.

use std::{
	collections::VecDeque,
	time::{Duration, Instant},
};

use axum::body::Bytes;
use tokio::sync::Mutex;


/// A map that holds at most `limit` entries, dropping the oldest entry to make
/// room for a new one.
pub struct LimitedMap<K, V> {
	store: VecDeque<(K, V)>,
	limit: usize,
}

#[derive(Clone, Debug)]
pub struct CachedPage {
	pub content_type: String,
	pub body: Bytes,
	/// The name of the template that rendered the page.
	pub template: Option<String>,
}

pub struct PageCache {
	ttl: Duration,
	store: Mutex<LimitedMap<String, (Instant, CachedPage)>>,
}


impl<K, V> LimitedMap<K, V>
where
	K: PartialEq,
{
	pub fn new(limit: usize) -> Self {
		debug_assert!(limit > 0, "Can't use a limit smaller than 1");
		Self {
			store: VecDeque::new(),
			limit: limit.max(1),
		}
	}

	pub fn clear(&mut self) { self.store.clear(); }

	pub fn find(&self, key: &K) -> Option<&V> {
		self.store.iter().find(|(k, _)| k == key).map(|(_, v)| v)
	}

	fn index_of(&self, key: &K) -> Option<usize> { self.store.iter().position(|(k, _)| k == key) }

	/// Sets the value for the key and moves it to the front, removing entries
	/// from the back to stay within the limit.
	pub fn insert(&mut self, key: K, value: V) {
		// An existing key is simply moved forward
		if let Some(index) = self.index_of(&key) {
			self.store.remove(index);
			self.store.push_front((key, value));
			return;
		}
		while self.store.len() >= self.limit {
			self.store.pop_back();
		}
		self.store.push_front((key, value));
	}

	pub fn len(&self) -> usize { self.store.len() }

	pub fn remove(&mut self, key: &K) -> Option<V> {
		let index = self.index_of(key)?;
		self.store.remove(index).map(|(_, v)| v)
	}
}

impl PageCache {
	pub fn new(ttl: Duration, capacity: usize) -> Self {
		Self {
			ttl,
			store: Mutex::new(LimitedMap::new(capacity)),
		}
	}

	/// Returns the page stored under the key, as long as it hasn't expired.
	pub async fn get(&self, key: &str) -> Option<CachedPage> {
		let mut store = self.store.lock().await;
		let key = key.to_string();
		if let Some((stored, page)) = store.find(&key) {
			if stored.elapsed() < self.ttl {
				return Some(page.clone());
			}
		} else {
			return None;
		}
		store.remove(&key);
		None
	}

	pub async fn insert(&self, key: String, page: CachedPage) {
		if self.ttl.is_zero() {
			return;
		}
		self.store.lock().await.insert(key, (Instant::now(), page));
	}

	pub async fn clear(&self) { self.store.lock().await.clear(); }

	pub async fn len(&self) -> usize { self.store.lock().await.len() }
}
