//! Process configuration.
//!
//! Every path the library reads or writes comes from a [`Config`]. The process wide instance
//! is installed by [`init()`](crate::init) and used by [`Cache::load()`](crate::Cache::load),
//! everything else takes a `&Config` explicitly.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use serde::{Serialize, Deserialize};

static GLOBAL: OnceLock<Config> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	status_file: PathBuf,
	extended_states: PathBuf,
	lists_dir: PathBuf,
	sources_list: PathBuf,
	preferences: PathBuf,
	cache_file: PathBuf,
	architecture: String,
	install_recommends: bool,
	ignore_hold: bool,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			status_file: PathBuf::from("/var/lib/dpkg/status"),
			extended_states: PathBuf::from("/var/lib/apt/extended_states"),
			lists_dir: PathBuf::from("/var/lib/apt/lists"),
			sources_list: PathBuf::from("/etc/apt/sources.list"),
			preferences: PathBuf::from("/etc/apt/preferences"),
			cache_file: {
				let path = if let Ok(e) = std::env::var("XDG_CACHE_HOME") {
					PathBuf::from(e)
				} else if let Ok(home) = std::env::var("HOME") {
					PathBuf::from(home).join(".cache")
				} else {
					PathBuf::from("/var/cache")
				};
				path.join("depcache-rs").join("pkgcache.bin")
			},
			architecture: native_architecture().to_string(),
			install_recommends: false,
			ignore_hold: false,
		}
	}
}

/// Debian name of the architecture this binary was built for.
fn native_architecture() -> &'static str {
	match std::env::consts::ARCH {
		"x86_64" => "amd64",
		"x86" => "i386",
		"aarch64" => "arm64",
		"arm" => "armhf",
		"powerpc64" => "ppc64el",
		"riscv64" => "riscv64",
		"s390x" => "s390x",
		other => other,
	}
}

impl Config {
	/// Default configuration with every path moved below `root`.
	///
	/// Mostly useful for working on a chroot or a test directory.
	pub fn with_root(root: impl AsRef<Path>) -> Self {
		let mut config = Self::default();
		config.rebase(root);
		config
	}

	/// Moves every absolute path below `root`, relative paths are joined as is.
	pub fn rebase(&mut self, root: impl AsRef<Path>) {
		let root = root.as_ref();
		let rebased = |p: &Path| root.join(p.strip_prefix("/").unwrap_or(p));
		self.status_file = rebased(&self.status_file);
		self.extended_states = rebased(&self.extended_states);
		self.lists_dir = rebased(&self.lists_dir);
		self.sources_list = rebased(&self.sources_list);
		self.preferences = rebased(&self.preferences);
		self.cache_file = root.join("var/cache/depcache-rs/pkgcache.bin");
	}

	/// Location of the user's config file.
	pub fn default_path() -> PathBuf {
		let path = if let Ok(e) = std::env::var("XDG_CONFIG_HOME") {
			PathBuf::from(e)
		} else if let Ok(home) = std::env::var("HOME") {
			PathBuf::from(home).join(".config")
		} else {
			PathBuf::from("/etc")
		};
		path.join("depcache-rs").join("config.json")
	}

	/// Reads a config from a JSON file, missing fields keep their default value.
	///
	/// # Errors
	/// - [`IO`](crate::Error::IO) when opening or reading from the file.
	/// - [`SerdeJSON`](crate::Error::SerdeJSON) when the file isn't a valid config.
	pub fn load_from_disk(path: impl AsRef<Path>) -> crate::Result<Self> {
		let file = std::fs::File::open(path)?;
		Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
	}

	pub fn save_to_disk(&self, path: impl AsRef<Path>) -> crate::Result<()> {
		let path = path.as_ref();
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let file = std::fs::File::create(path)?;
		serde_json::to_writer_pretty(file, self)?;
		Ok(())
	}

	pub fn status_file(&self) -> &Path {
		&self.status_file
	}
	pub fn set_status_file(&mut self, path: PathBuf) {
		self.status_file = path;
	}

	/// File recording which packages were installed automatically.
	pub fn extended_states(&self) -> &Path {
		&self.extended_states
	}
	pub fn set_extended_states(&mut self, path: PathBuf) {
		self.extended_states = path;
	}

	/// Directory holding the downloaded `Packages` indexes.
	pub fn lists_dir(&self) -> &Path {
		&self.lists_dir
	}
	pub fn set_lists_dir(&mut self, path: PathBuf) {
		self.lists_dir = path;
	}

	pub fn sources_list(&self) -> &Path {
		&self.sources_list
	}
	pub fn set_sources_list(&mut self, path: PathBuf) {
		self.sources_list = path;
	}

	/// The pin file.
	pub fn preferences(&self) -> &Path {
		&self.preferences
	}
	pub fn set_preferences(&mut self, path: PathBuf) {
		self.preferences = path;
	}

	pub fn cache_file(&self) -> &Path {
		&self.cache_file
	}
	pub fn set_cache_file(&mut self, path: PathBuf) {
		self.cache_file = path;
	}

	pub fn architecture(&self) -> &str {
		&self.architecture
	}
	pub fn set_architecture(&mut self, architecture: impl Into<String>) {
		self.architecture = architecture.into();
	}

	/// When set `Recommends` are installed along with hard dependencies.
	pub fn install_recommends(&self) -> bool {
		self.install_recommends
	}
	pub fn set_install_recommends(&mut self, install_recommends: bool) {
		self.install_recommends = install_recommends;
	}

	/// When set held packages are upgraded like any other.
	pub fn ignore_hold(&self) -> bool {
		self.ignore_hold
	}
	pub fn set_ignore_hold(&mut self, ignore_hold: bool) {
		self.ignore_hold = ignore_hold;
	}
}

/// Sets up process wide state from the user's config file.
///
/// A missing config file leaves the defaults in place. Calling this again after a successful
/// call does nothing.
pub fn init() -> crate::Result<()> {
	if GLOBAL.get().is_some() {
		log::debug!("init called more than once");
		return Ok(());
	}
	let path = Config::default_path();
	let config = match Config::load_from_disk(&path) {
		Ok(c) => c,
		Err(crate::Error::IO(e)) if e.kind() == std::io::ErrorKind::NotFound => {
			log::debug!("no config at {}, using defaults", path.display());
			Config::default()
		},
		Err(e) => return Err(e),
	};
	init_with(config)
}

/// Sets up process wide state with an explicit config.
///
/// # Errors
/// - [`AlreadyInitialized`](crate::Error::AlreadyInitialized) if a config is already installed.
pub fn init_with(config: Config) -> crate::Result<()> {
	GLOBAL.set(config).map_err(|_| crate::Error::AlreadyInitialized)
}

/// The config installed by [`init()`].
pub fn config() -> crate::Result<&'static Config> {
	GLOBAL.get().ok_or(crate::Error::NotInitialized)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn with_root_moves_every_path() {
		let config = Config::with_root("/tmp/root");
		assert_eq!(config.status_file(), Path::new("/tmp/root/var/lib/dpkg/status"));
		assert_eq!(config.lists_dir(), Path::new("/tmp/root/var/lib/apt/lists"));
		assert_eq!(config.preferences(), Path::new("/tmp/root/etc/apt/preferences"));
		assert!(config.cache_file().starts_with("/tmp/root"));
	}

	#[test]
	fn partial_json_keeps_defaults() {
		let config: Config = serde_json::from_str(r#"{ "architecture": "riscv64", "install_recommends": true }"#).unwrap();
		assert_eq!(config.architecture(), "riscv64");
		assert!(config.install_recommends());
		assert_eq!(config.status_file(), Config::default().status_file());
	}
}
