use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

use super::*;
use super::control::Stanza;
use crate::Error::Parse;

/// Bumped whenever the serialized layout of [`Cache`] changes.
const CACHE_FORMAT: u32 = 1;

/// A file versions were read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFile {
	pub file_name: PathBuf,
	/// Suite of the repository, e.g. `bookworm`.
	pub archive: String,
	pub component: String,
	/// Host serving the repository, empty for local files.
	pub site: String,
	pub architecture: String,
	/// The dpkg status file.
	pub is_status: bool,
}

impl PackageFile {
	pub fn status(path: impl Into<PathBuf>) -> Self {
		Self { file_name: path.into(), is_status: true, ..Default::default() }
	}

	/// Describes an index from its name in the lists directory.
	///
	/// Names are the fetched URI with the scheme dropped and `/` replaced by `_`, e.g.
	/// `deb.debian.org_debian_dists_bookworm_main_binary-amd64_Packages`.
	pub fn from_list_path(path: impl Into<PathBuf>) -> Self {
		let file_name = path.into();
		let name = file_name.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_default();
		let name = name.strip_suffix("_Packages").unwrap_or(&name);

		let mut out = Self { file_name: file_name.clone(), ..Default::default() };
		match name.split_once("_dists_") {
			Some((site_path, dist)) => {
				out.site = site_path.split('_').next().unwrap_or_default().to_string();
				let parts: Vec<&str> = dist.split('_').collect();
				if let Some((suite, rest)) = parts.split_first() {
					out.archive = suite.to_string();
					let binary = rest.iter().position(|p| p.starts_with("binary-"));
					if let Some(b) = binary {
						out.component = rest[..b].join("/");
						out.architecture = rest[b].trim_start_matches("binary-").to_string();
					} else {
						out.component = rest.join("/");
					}
				}
			},
			None => {
				/* Flat repository */
				out.site = name.split('_').next().unwrap_or_default().to_string();
			},
		}
		out
	}
}

/// Incrementally builds a [`Cache`] from control file text.
pub struct CacheBuilder {
	graph: DependencyGraph,
	files: Vec<PackageFile>,
	architecture: String,
}

impl CacheBuilder {
	/// The status file is always package file `0`.
	pub fn new(architecture: impl Into<String>, status_path: impl Into<PathBuf>) -> Self {
		Self {
			graph: DependencyGraph::default(),
			files: vec![PackageFile::status(status_path)],
			architecture: architecture.into(),
		}
	}

	/// Adds the contents of a dpkg status file.
	///
	/// # Errors
	/// - [`Parse`](crate::Error::Parse) when the file isn't a control file at all.
	/// Individual bad entries are skipped with a warning.
	pub fn add_status(&mut self, text: &str) -> crate::Result<()> {
		for stanza in control::parse_stanzas(text)? {
			if let Err(e) = self.add_stanza(&stanza, 0) {
				log::warn!("Skipping status entry at line {}: {}", stanza.line(), e);
			}
		}
		Ok(())
	}

	/// Adds a repository `Packages` index.
	pub fn add_index(&mut self, file: PackageFile, text: &str) -> crate::Result<()> {
		let stanzas = control::parse_stanzas(text)?;
		let file_index = self.files.len();
		let name = file.file_name.display().to_string();
		self.files.push(file);
		for stanza in stanzas {
			if let Err(e) = self.add_stanza(&stanza, file_index) {
				log::warn!("Skipping entry at {}:{}: {}", name, stanza.line(), e);
			}
		}
		Ok(())
	}

	fn add_stanza(&mut self, stanza: &Stanza, file_index: usize) -> crate::Result<()> {
		let name = stanza.get("Package").ok_or_else(|| Parse("missing Package field".to_string()))?;
		let ver_str = stanza.get("Version").ok_or_else(|| Parse(format!("{} has no Version field", name)))?;
		let version = PackageVersion::new(ver_str)?;
		let installed_size = parse_size(stanza.get("Installed-Size"))?
			.checked_mul(1024)
			.ok_or_else(|| Parse(format!("installed size of {} {} is too large", name, ver_str)))?;
		let download_size = parse_size(stanza.get("Size"))?;
		let arch = match stanza.get("Architecture") {
			None | Some("all") => self.architecture.clone(),
			Some(a) => a.to_string(),
		};

		let status = match (file_index, stanza.get("Status")) {
			(0, Some(s)) => Some(parse_status(s)?),
			(0, None) => return Err(Parse(format!("{} has no Status field", name))),
			_ => None,
		};

		let pkg = self.graph.get_or_add_package(name, &arch);

		if let Some((selection, state)) = status {
			let p = self.graph.package_mut(pkg);
			p.selection = selection;
			p.current_state = state;
			if !state.has_files() {
				/* Nothing on disk, the version is only kept for its config files */
				return Ok(());
			}
		}

		let ver = match self.graph.find_version(pkg, &version) {
			Some(existing) => {
				let v = self.graph.version_mut(existing);
				if !v.files.contains(&file_index) {
					v.files.push(file_index);
				}
				if v.filename.is_none() {
					v.filename = stanza.get("Filename").map(str::to_string);
					v.download_size = download_size;
				}
				existing
			},
			None => {
				let ver = self.graph.add_version(VersionData {
					version,
					ver_str: ver_str.to_string(),
					package: pkg,
					installed_size,
					download_size,
					section: stanza.get("Section").map(str::to_string),
					priority: stanza.get("Priority").map(str::to_string),
					filename: stanza.get("Filename").map(str::to_string),
					files: vec![file_index],
					essential: stanza.get("Essential").map(|e| e.eq_ignore_ascii_case("yes")).unwrap_or(false),
				});
				self.add_relationships(ver, stanza, &arch)?;
				ver
			},
		};

		if let Some((_, state)) = status {
			if state.has_files() {
				self.graph.package_mut(pkg).current_version = Some(ver);
			}
		}
		Ok(())
	}

	fn add_relationships(&mut self, ver: NodeIndex, stanza: &Stanza, arch: &str) -> crate::Result<()> {
		let mut ordinal = 0;
		for kind in DepKind::ALL {
			let Some(field) = stanza.get(kind.field()) else { continue };
			for r in parse_relationships(field)? {
				if kind.is_negative() {
					/* Alternatives don't make sense for negative relationships, each is its own entry */
					for d in r.as_vec() {
						self.graph.add_relationship(ver, kind, ordinal, &Relationship::One(d.clone()), arch);
						ordinal += 1;
					}
				} else {
					self.graph.add_relationship(ver, kind, ordinal, &r, arch);
					ordinal += 1;
				}
			}
		}
		if let Some(field) = stanza.get("Provides") {
			for (name, version) in parse_provides(field)? {
				self.graph.add_provides(ver, &name, arch, version);
			}
		}
		Ok(())
	}

	pub fn finish(self, config: &crate::Config, fingerprint: String) -> Cache {
		Cache {
			graph: self.graph,
			files: self.files,
			architecture: self.architecture,
			fingerprint,
			config: config.clone(),
		}
	}
}

fn parse_size(field: Option<&str>) -> crate::Result<u64> {
	match field {
		None => Ok(0),
		Some(s) => s.trim().parse::<u64>().map_err(|_| Parse(format!("invalid size \"{}\"", s))),
	}
}

/// Parses `Status: <selection> <flag> <state>`.
fn parse_status(s: &str) -> crate::Result<(Selection, CurrentState)> {
	let words: Vec<&str> = s.split_whitespace().collect();
	let [selection, _flag, state] = words.as_slice() else {
		return Err(Parse(format!("malformed Status \"{}\"", s)));
	};
	let selection = match *selection {
		"unknown" => Selection::Unknown,
		"install" => Selection::Install,
		"hold" => Selection::Hold,
		"deinstall" => Selection::DeInstall,
		"purge" => Selection::Purge,
		other => return Err(Parse(format!("unknown selection \"{}\"", other))),
	};
	let state = match *state {
		"not-installed" => CurrentState::NotInstalled,
		"config-files" => CurrentState::ConfigFiles,
		"half-installed" => CurrentState::HalfInstalled,
		"unpacked" => CurrentState::Unpacked,
		"half-configured" => CurrentState::HalfConfigured,
		"triggers-awaited" => CurrentState::TriggersAwaited,
		"triggers-pending" => CurrentState::TriggersPending,
		"installed" => CurrentState::Installed,
		other => return Err(Parse(format!("unknown package state \"{}\"", other))),
	};
	Ok((selection, state))
}

/// Index files in the lists directory, sorted by name.
pub(crate) fn list_files(lists_dir: &Path) -> Vec<PathBuf> {
	if !lists_dir.is_dir() {
		log::info!("Lists directory {} does not exist", lists_dir.display());
		return Vec::new();
	}
	let mut out: Vec<PathBuf> = walkdir::WalkDir::new(lists_dir)
		.max_depth(1)
		.into_iter()
		.filter_map(|e| e.ok())
		.filter(|e| e.file_type().is_file())
		.filter(|e| e.file_name().to_string_lossy().ends_with("_Packages"))
		.map(|e| e.into_path())
		.collect();
	out.sort();
	out
}

/// Hash over every input of a cache, changes whenever any of them is modified.
pub(crate) fn fingerprint(config: &crate::Config, lists: &[PathBuf]) -> String {
	let mut description = format!("format {}\narch {}\n", CACHE_FORMAT, config.architecture());
	let sources = [config.status_file(), config.sources_list(), config.preferences()];
	for path in sources.into_iter().chain(lists.iter().map(|p| p.as_path())) {
		description.push_str(&path.display().to_string());
		match std::fs::metadata(path) {
			Ok(m) => {
				let mtime = m.modified().ok()
					.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
					.map(|d| d.as_nanos())
					.unwrap_or_default();
				description.push_str(&format!(" {} {}\n", m.len(), mtime));
			},
			Err(_) => description.push_str(" missing\n"),
		}
	}
	sha256::digest(description.as_bytes())
}

impl Cache {
	/// Builds the cache described by `config`.
	///
	/// A previously saved cache is reused when none of its inputs changed, otherwise the cache is
	/// rebuilt from the status file and the lists directory and saved for next time.
	///
	/// # Errors
	/// - [`Load`](crate::Error::Load) when the status file is missing or any index is unreadable.
	pub fn build(config: &crate::Config, progress: &mut dyn crate::progress::OpProgress) -> crate::Result<Cache> {
		let mut tracker = crate::progress::ProgressTracker::new(progress);
		tracker.update(0.0);

		let lists = list_files(config.lists_dir());
		let fingerprint = fingerprint(config, &lists);

		if let Some(mut cache) = Self::load_from_disk(config.cache_file()) {
			if cache.fingerprint == fingerprint && cache.architecture == config.architecture() {
				log::debug!("Reusing package cache at {}", config.cache_file().display());
				cache.config = config.clone();
				tracker.done();
				return Ok(cache);
			}
			log::info!("Package cache is out of date, rebuilding");
		}

		let status = std::fs::read_to_string(config.status_file())
			.map_err(|e| crate::Error::Load(format!("reading {}: {}", config.status_file().display(), e)))?;

		let mut builder = CacheBuilder::new(config.architecture(), config.status_file());
		builder.add_status(&status)
			.map_err(|e| crate::Error::Load(format!("{}: {}", config.status_file().display(), e)))?;
		tracker.step(1, lists.len() + 1);

		for (i, path) in lists.iter().enumerate() {
			let text = std::fs::read_to_string(path)
				.map_err(|e| crate::Error::Load(format!("reading {}: {}", path.display(), e)))?;
			builder.add_index(PackageFile::from_list_path(path), &text)
				.map_err(|e| crate::Error::Load(format!("{}: {}", path.display(), e)))?;
			tracker.step(i + 2, lists.len() + 1);
		}

		let cache = builder.finish(config, fingerprint);
		log::info!("Built package cache with {} packages from {} indexes", cache.package_count(), lists.len());

		if let Err(e) = cache.save_to_disk(config.cache_file()) {
			log::warn!("Failed to save package cache to {}: {}", config.cache_file().display(), e);
		}

		tracker.done();
		Ok(cache)
	}

	/// Reads a serialized cache, any failure is treated as there being no cache.
	fn load_from_disk(path: &Path) -> Option<Cache> {
		let file = std::fs::File::open(path).ok()?;
		match bincode::deserialize_from(std::io::BufReader::new(file)) {
			Ok(c) => Some(c),
			Err(e) => {
				log::debug!("Ignoring unreadable package cache {}: {}", path.display(), e);
				None
			},
		}
	}

	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when creating the file or it's parent directories.
	/// - [`Bincode`](crate::error::Error::Bincode) when serializing.
	pub fn save_to_disk(&self, path: &Path) -> crate::Result<()> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let file = std::fs::File::create(path)?;
		bincode::serialize_into(std::io::BufWriter::new(file), self)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn list_name_is_decoded() {
		let f = PackageFile::from_list_path("/var/lib/apt/lists/deb.debian.org_debian_dists_bookworm-updates_main_binary-amd64_Packages");
		assert_eq!(f.site, "deb.debian.org");
		assert_eq!(f.archive, "bookworm-updates");
		assert_eq!(f.component, "main");
		assert_eq!(f.architecture, "amd64");
		assert!(!f.is_status);
	}

	#[test]
	fn flat_list_name_is_decoded() {
		let f = PackageFile::from_list_path("/lists/repo.example.org_pool_._Packages");
		assert_eq!(f.site, "repo.example.org");
		assert_eq!(f.archive, "");
	}

	#[test]
	fn status_parsing() {
		assert_eq!(parse_status("hold ok installed").unwrap(), (Selection::Hold, CurrentState::Installed));
		assert_eq!(parse_status("deinstall ok config-files").unwrap(), (Selection::DeInstall, CurrentState::ConfigFiles));
		assert!(parse_status("install ok").is_err());
	}

	#[test]
	fn duplicate_versions_are_merged() {
		let mut b = CacheBuilder::new("amd64", "status");
		b.add_status("Package: foo\nStatus: install ok installed\nVersion: 1.0\nInstalled-Size: 4\n").unwrap();
		b.add_index(PackageFile::from_list_path("x_dists_stable_main_binary-amd64_Packages"), "Package: foo\nVersion: 1.0\nSize: 100\nFilename: pool/foo.deb\n\nPackage: foo\nVersion: 2.0\nArchitecture: all\n").unwrap();
		let cache = b.finish(&crate::Config::default(), String::new());

		let foo = cache.lookup("foo").unwrap();
		let versions: Vec<_> = foo.versions().map(|v| v.ver_str().to_string()).collect();
		assert_eq!(versions, vec!["2.0", "1.0"]);
		let current = foo.current_version().unwrap();
		assert_eq!(current.ver_str(), "1.0");
		assert_eq!(current.installed_size(), 4096);
		assert_eq!(current.download_size(), 100);
		assert!(current.is_downloadable());
	}

	#[test]
	fn config_files_have_no_current_version() {
		let mut b = CacheBuilder::new("amd64", "status");
		b.add_status("Package: gone\nStatus: deinstall ok config-files\nVersion: 1.0\n").unwrap();
		let cache = b.finish(&crate::Config::default(), String::new());
		let gone = cache.lookup("gone").unwrap();
		assert!(gone.current_version().is_none());
		assert_eq!(gone.current_state(), CurrentState::ConfigFiles);
	}
}
