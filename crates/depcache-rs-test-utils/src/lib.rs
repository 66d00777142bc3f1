//! Various helper functions for testing
//!
//! Everything here returns results rather than panicking so failures show up in the calling test.

use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("library error: {0}")]
	Lib(#[from] depcache_rs::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Name of the list file [`TestRoot::index()`] writes.
pub fn list_name(suite: &str) -> String {
	format!("test.example.org_debian_dists_{}_main_binary-amd64_Packages", suite)
}

/// A throwaway system root holding a status file, indexes and apt configuration.
///
/// The directory is removed when the value is dropped.
pub struct TestRoot {
	dir: tempfile::TempDir,
	config: depcache_rs::Config,
}

impl TestRoot {
	/// An empty root with an empty status file, architecture `amd64`.
	pub fn new() -> Result<Self> {
		let dir = tempfile::tempdir()?;
		let mut config = depcache_rs::Config::with_root(dir.path());
		config.set_architecture("amd64");
		let root = Self { dir, config };
		root.write(root.config.status_file(), "")?;
		std::fs::create_dir_all(root.config.lists_dir())?;
		Ok(root)
	}

	pub fn path(&self) -> &Path {
		self.dir.path()
	}

	pub fn config(&self) -> &depcache_rs::Config {
		&self.config
	}

	pub fn config_mut(&mut self) -> &mut depcache_rs::Config {
		&mut self.config
	}

	/// Replaces the dpkg status file.
	pub fn status(&self, text: &str) -> Result<&Self> {
		self.write(self.config.status_file(), text)?;
		Ok(self)
	}

	/// Writes a `Packages` index for `suite` into the lists directory.
	pub fn index(&self, suite: &str, text: &str) -> Result<&Self> {
		self.write(&self.config.lists_dir().join(list_name(suite)), text)?;
		Ok(self)
	}

	pub fn preferences(&self, text: &str) -> Result<&Self> {
		self.write(self.config.preferences(), text)?;
		Ok(self)
	}

	pub fn extended_states(&self, text: &str) -> Result<&Self> {
		self.write(self.config.extended_states(), text)?;
		Ok(self)
	}

	pub fn sources(&self, text: &str) -> Result<&Self> {
		self.write(self.config.sources_list(), text)?;
		Ok(self)
	}

	/// Writes `text` gzip compressed to `path` below the root, returning the full path.
	pub fn write_gz(&self, path: impl AsRef<Path>, text: &str) -> Result<PathBuf> {
		let path = self.dir.path().join(path);
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let file = std::fs::File::create(&path)?;
		let mut gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
		gz.write_all(text.as_bytes())?;
		gz.finish()?;
		Ok(path)
	}

	/// Builds the cache for this root.
	pub fn cache(&self) -> Result<depcache_rs::Cache> {
		Ok(depcache_rs::Cache::build(&self.config, &mut depcache_rs::progress::NoProgress)?)
	}

	fn write(&self, path: &Path, text: &str) -> Result<()> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(path, text)?;
		Ok(())
	}
}

/// A status file entry for an installed package.
///
/// `extra` holds further fields, one per line.
pub fn installed(name: &str, version: &str, extra: &str) -> String {
	stanza(format!("Package: {}\nStatus: install ok installed\nVersion: {}\nArchitecture: amd64\nInstalled-Size: 10\n", name, version), extra)
}

/// A `Packages` index entry.
pub fn available(name: &str, version: &str, extra: &str) -> String {
	stanza(format!("Package: {}\nVersion: {}\nArchitecture: amd64\nInstalled-Size: 10\nSize: 1000\nFilename: pool/main/{}_{}_amd64.deb\n", name, version, name, version), extra)
}

fn stanza(mut fields: String, extra: &str) -> String {
	for line in extra.lines().map(str::trim).filter(|l| !l.is_empty()) {
		fields.push_str(line);
		fields.push('\n');
	}
	fields.push('\n');
	fields
}

/// Logging for tests, safe to call from every test.
pub fn init_logging() {
	let _ = env_logger::builder().is_test(true).try_init();
}
