//! Page number based pagination.

use serde::Serialize;


#[derive(Clone, Copy, Debug)]
pub struct Paginator {
	count: u64,
	per_page: u64,
}

/// The position of a single page within the whole list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page {
	pub number: u64,
	pub num_pages: u64,
	pub count: u64,
	pub per_page: u64,
	pub has_previous: bool,
	pub has_next: bool,
	pub previous_page_number: Option<u64>,
	pub next_page_number: Option<u64>,
	/// 1-based index of the first object on this page, 0 on an empty list.
	pub start_index: u64,
	/// 1-based index of the last object on this page.
	pub end_index: u64,
}


impl Paginator {
	pub fn new(count: u64, per_page: u64) -> Self {
		debug_assert!(per_page > 0, "page size must be at least 1");
		Self {
			count,
			per_page: per_page.max(1),
		}
	}

	/// An empty list still has one page.
	pub fn num_pages(&self) -> u64 {
		if self.count == 0 {
			1
		} else {
			(self.count + self.per_page - 1) / self.per_page
		}
	}

	/// Returns the requested page, falling back to the first page for
	/// missing or malformed numbers and to the last page for numbers that are
	/// out of range on either side.
	pub fn get_page(&self, number: Option<&str>) -> Page {
		let num_pages = self.num_pages();
		let number = match number.map(|n| n.trim().parse::<i64>()) {
			Some(Ok(n)) if n >= 1 && n <= num_pages as i64 => n as u64,
			Some(Ok(_)) => num_pages,
			_ => 1,
		};
		self.page(number)
	}

	fn page(&self, number: u64) -> Page {
		let num_pages = self.num_pages();
		let offset = (number - 1) * self.per_page;
		let (start_index, end_index) = if self.count == 0 {
			(0, 0)
		} else {
			(offset + 1, (offset + self.per_page).min(self.count))
		};
		Page {
			number,
			num_pages,
			count: self.count,
			per_page: self.per_page,
			has_previous: number > 1,
			has_next: number < num_pages,
			previous_page_number: if number > 1 { Some(number - 1) } else { None },
			next_page_number: if number < num_pages {
				Some(number + 1)
			} else {
				None
			},
			start_index,
			end_index,
		}
	}
}

impl Page {
	/// The number of objects to skip to arrive at this page.
	pub fn offset(&self) -> u64 { (self.number - 1) * self.per_page }

	pub fn limit(&self) -> u64 { self.per_page }
}
