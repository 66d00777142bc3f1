//! Progress reporting for long running operations.
//!
//! Two capabilities exist:
//! - [`OpProgress`] for building the cache and initializing a [`DepCache`](crate::DepCache).
//! - [`AcquireProgress`] for fetching index files, which can also cancel the fetch by returning
//! `false` from [`AcquireProgress::pulse()`].
//!
//! Callbacks are always invoked on the thread that started the operation.

/// Receives percentage updates from an operation.
pub trait OpProgress {
	/// `percent` is within `0.0..=100.0` and never decreases during one operation.
	fn update(&mut self, percent: f32);
	/// Called once when the operation finished successfully.
	fn done(&mut self);
}

/// Outcome of a single item of a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatusCode {
	/// Item is waiting to be fetched.
	Queued,
	/// Item was fetched and stored.
	Done,
	/// Item was fetched and is identical to the stored copy.
	Hit,
	Failed,
	/// Item failed but isn't required, e.g. the uncompressed fallback exists.
	Ignored,
}

/// Snapshot of a running fetch passed to [`AcquireProgress::pulse()`].
#[derive(Debug, Clone, Default)]
pub struct AcquireStatus {
	pub current_bytes: u64,
	/// Zero when the server didn't report a size.
	pub total_bytes: u64,
	/// Bytes per second over the current item.
	pub current_cps: f64,
	pub current_items: usize,
	pub total_items: usize,
}

/// Receives status updates from a fetch.
pub trait AcquireProgress {
	fn start(&mut self) {}

	fn update_status(&mut self, uri: &str, description: &str, short_description: &str, status: FetchStatusCode);

	/// Called periodically while data arrives.
	///
	/// Returning `false` cancels the fetch, the running item is discarded and the fetch returns
	/// [`CancelledFetch`](crate::Error::CancelledFetch).
	fn pulse(&mut self, status: &AcquireStatus) -> bool;

	/// Called once when the fetch ends, including after a cancellation.
	fn stop(&mut self) {}
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl OpProgress for NoProgress {
	fn update(&mut self, _percent: f32) {}
	fn done(&mut self) {}
}

impl AcquireProgress for NoProgress {
	fn update_status(&mut self, _uri: &str, _description: &str, _short_description: &str, _status: FetchStatusCode) {}
	fn pulse(&mut self, _status: &AcquireStatus) -> bool { true }
}

/// Writes progress to the `log` facade.
///
/// Percentages are only logged when they pass the next multiple of `step`.
#[derive(Debug, Clone)]
pub struct LogProgress {
	label: String,
	step: f32,
	next: f32,
}

impl LogProgress {
	pub fn new(label: impl Into<String>) -> Self {
		Self { label: label.into(), step: 25.0, next: 0.0 }
	}
}

impl OpProgress for LogProgress {
	fn update(&mut self, percent: f32) {
		if percent >= self.next {
			log::info!("{}... {:.0}%", self.label, percent);
			while self.next <= percent {
				self.next += self.step;
			}
		}
	}

	fn done(&mut self) {
		log::info!("{}... done", self.label);
		self.next = 0.0;
	}
}

impl AcquireProgress for LogProgress {
	fn start(&mut self) {
		log::info!("{}", self.label);
	}

	fn update_status(&mut self, uri: &str, description: &str, _short_description: &str, status: FetchStatusCode) {
		match status {
			FetchStatusCode::Queued => log::debug!("queued {}", uri),
			FetchStatusCode::Done => log::info!("Get: {}", description),
			FetchStatusCode::Hit => log::info!("Hit: {}", description),
			FetchStatusCode::Failed => log::warn!("Err: {}", description),
			FetchStatusCode::Ignored => log::info!("Ign: {}", description),
		}
	}

	fn pulse(&mut self, status: &AcquireStatus) -> bool {
		log::trace!("{}/{} bytes, item {}/{}", status.current_bytes, status.total_bytes, status.current_items, status.total_items);
		true
	}
}

/// Adapts a closure into an [`OpProgress`].
///
/// The closure receives `Some(percent)` for updates and `None` when done.
pub struct FnProgress<F: FnMut(Option<f32>)>(pub F);

impl<F: FnMut(Option<f32>)> OpProgress for FnProgress<F> {
	fn update(&mut self, percent: f32) {
		(self.0)(Some(percent))
	}
	fn done(&mut self) {
		(self.0)(None)
	}
}

/// Wraps an [`OpProgress`] so an operation can't break its contract.
///
/// Values are clamped to `0..=100`, never go backwards and `done()` is forwarded once.
pub(crate) struct ProgressTracker<'p> {
	inner: &'p mut dyn OpProgress,
	last: f32,
	finished: bool,
}

impl<'p> ProgressTracker<'p> {
	pub fn new(inner: &'p mut dyn OpProgress) -> Self {
		Self { inner, last: 0.0, finished: false }
	}

	pub fn update(&mut self, percent: f32) {
		let percent = percent.clamp(self.last, 100.0);
		/* Avoid flooding callers with identical values */
		if percent > self.last || self.last == 0.0 {
			self.last = percent;
			self.inner.update(percent);
		}
	}

	/// Reports `done` out of `total` work units.
	pub fn step(&mut self, done: usize, total: usize) {
		if total == 0 {
			self.update(100.0);
		} else {
			self.update(done as f32 * 100.0 / total as f32);
		}
	}

	pub fn done(&mut self) {
		if !self.finished {
			self.update(100.0);
			self.finished = true;
			self.inner.done();
		}
	}
}
