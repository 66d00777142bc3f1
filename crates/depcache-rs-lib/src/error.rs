//! Library error type.

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("bincode error: {0}")]
	Bincode(#[from] bincode::Error),
	#[error("parsing error: {0}")]
	Parse(String),
	/// The package cache could not be built, the instance must not be used.
	#[error("failed to load package cache: {0}")]
	Load(String),
	#[error("failed to fetch {uri}: {reason}")]
	Fetch {
		uri: String,
		reason: String,
	},
	/// An [`AcquireProgress`](crate::progress::AcquireProgress) asked for the fetch to stop.
	#[error("fetch cancelled")]
	CancelledFetch,
	#[error("library used before `depcache_rs::init()`")]
	NotInitialized,
	#[error("already initialized")]
	AlreadyInitialized,
}
