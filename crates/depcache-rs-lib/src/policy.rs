//! Version priorities and candidate selection.
//!
//! Every version gets a priority, either from a pin in the pin file or from the files it was
//! read from (500 for repositories, 100 for the status file). The candidate of a package is the
//! version with the highest priority, preferring higher versions on ties.
//!
//! Pin file stanzas look like:
//! ```text
//! Package: foo bar* /^lib.*-dev$/
//! Pin: version 1.2*
//! Pin-Priority: 1001
//! ```
//! `Package: *` makes a pin apply to every package.

use std::path::Path;

use regex::Regex;

use crate::cache::{Cache, Package, PackageFile, Version};

pub const DEFAULT_PRIORITY: i32 = 500;
pub const STATUS_PRIORITY: i32 = 100;
/// Priority needed for a version lower than the installed one to be a candidate.
pub const DOWNGRADE_PRIORITY: i32 = 1000;

/// What a pin matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinKind {
	/// Glob over the version string, e.g. `1.2*`.
	Version,
	/// Comma separated `key=value` conditions on the package files, e.g. `a=stable, c=main`.
	Release,
	/// Host a package file was fetched from.
	Origin,
}

#[derive(Debug, Clone)]
enum Pattern {
	Exact(String),
	Regex(Regex),
}

impl Pattern {
	/// `/regex/`, a glob containing `*` or `?`, or an exact string.
	fn new(s: &str) -> crate::Result<Self> {
		if s.len() >= 2 && s.starts_with('/') && s.ends_with('/') {
			let re = Regex::new(&s[1..s.len() - 1]).map_err(|e| crate::Error::Parse(format!("invalid pin regex \"{}\": {}", s, e)))?;
			Ok(Pattern::Regex(re))
		} else if s.contains(['*', '?']) {
			let mut re = String::from("^");
			for c in s.chars() {
				match c {
					'*' => re.push_str(".*"),
					'?' => re.push('.'),
					c => re.push_str(&regex::escape(&c.to_string())),
				}
			}
			re.push('$');
			let re = Regex::new(&re).map_err(|e| crate::Error::Parse(format!("invalid pin glob \"{}\": {}", s, e)))?;
			Ok(Pattern::Regex(re))
		} else {
			Ok(Pattern::Exact(s.to_string()))
		}
	}

	fn is_match(&self, s: &str) -> bool {
		match self {
			Pattern::Exact(e) => e == s,
			Pattern::Regex(r) => r.is_match(s),
		}
	}
}

#[derive(Debug, Clone)]
enum PinTarget {
	Version(Pattern),
	Release(Vec<(String, Pattern)>),
	Origin(Pattern),
}

impl PinTarget {
	fn new(kind: PinKind, data: &str) -> crate::Result<Self> {
		let data = data.trim();
		match kind {
			PinKind::Version => Ok(PinTarget::Version(Pattern::new(data)?)),
			PinKind::Origin => Ok(PinTarget::Origin(Pattern::new(data.trim_matches('"'))?)),
			PinKind::Release => {
				let mut conditions = Vec::new();
				for part in data.split(',').map(str::trim).filter(|p| !p.is_empty()) {
					let (key, value) = match part.split_once('=') {
						Some((k, v)) => (k.trim().to_string(), v.trim()),
						None => ("a".to_string(), part),
					};
					if !matches!(key.as_str(), "a" | "n" | "c" | "b" | "o" | "l" | "v") {
						return Err(crate::Error::Parse(format!("unknown release pin key \"{}\"", key)));
					}
					conditions.push((key, Pattern::new(value)?));
				}
				Ok(PinTarget::Release(conditions))
			},
		}
	}

	fn matches_file(&self, file: &PackageFile) -> bool {
		match self {
			PinTarget::Version(_) => false,
			PinTarget::Origin(p) => !file.is_status && p.is_match(&file.site),
			PinTarget::Release(conditions) => !file.is_status && conditions.iter().all(|(key, p)| match key.as_str() {
				"a" | "n" => p.is_match(&file.archive),
				"c" => p.is_match(&file.component),
				"b" => p.is_match(&file.architecture),
				/* Origin, label and version come from Release files which aren't tracked */
				_ => false,
			}),
		}
	}

	fn matches_version(&self, ver: &Version) -> bool {
		match self {
			PinTarget::Version(p) => p.is_match(ver.ver_str()),
			_ => ver.files().any(|f| self.matches_file(f)),
		}
	}
}

#[derive(Debug, Clone)]
struct Pin {
	/// `None` applies to every package.
	packages: Option<Vec<Pattern>>,
	target: PinTarget,
	priority: i32,
}

impl Pin {
	fn matches_package(&self, name: &str) -> bool {
		match &self.packages {
			None => true,
			Some(v) => v.iter().any(|p| p.is_match(name)),
		}
	}
}

/// Priorities of versions, see the module docs.
#[derive(Debug, Clone, Default)]
pub struct Policy {
	pins: Vec<Pin>,
}

impl Policy {
	/// A policy with only the default priorities.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds pins from a pin file.
	///
	/// A missing file is not an error. Stanzas that can't be understood are skipped with a
	/// warning, in which case `false` is returned.
	pub fn read_pin_file(&mut self, path: impl AsRef<Path>) -> bool {
		let path = path.as_ref();
		let text = match std::fs::read_to_string(path) {
			Ok(t) => t,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				log::debug!("No pin file at {}", path.display());
				return true;
			},
			Err(e) => {
				log::warn!("Failed to read pin file {}: {}", path.display(), e);
				return false;
			},
		};

		let stanzas = match crate::cache::control::parse_stanzas(&text) {
			Ok(s) => s,
			Err(e) => {
				log::warn!("Ignoring malformed pin file {}: {}", path.display(), e);
				return false;
			},
		};

		let mut ok = true;
		for stanza in stanzas {
			if let Err(e) = self.add_stanza(&stanza) {
				log::warn!("Ignoring pin at {}:{}: {}", path.display(), stanza.line(), e);
				ok = false;
			}
		}
		ok
	}

	fn add_stanza(&mut self, stanza: &crate::cache::control::Stanza) -> crate::Result<()> {
		let package = stanza.get("Package").ok_or_else(|| crate::Error::Parse("missing Package field".to_string()))?;
		let pin = stanza.get("Pin").ok_or_else(|| crate::Error::Parse("missing Pin field".to_string()))?;
		let priority = stanza.get("Pin-Priority")
			.ok_or_else(|| crate::Error::Parse("missing Pin-Priority field".to_string()))?
			.trim()
			.parse::<i32>()
			.map_err(|_| crate::Error::Parse("Pin-Priority is not a number".to_string()))?;
		let (kind, data) = pin.trim().split_once(char::is_whitespace)
			.ok_or_else(|| crate::Error::Parse(format!("malformed Pin \"{}\"", pin)))?;
		let kind = match kind {
			"version" => PinKind::Version,
			"release" => PinKind::Release,
			"origin" => PinKind::Origin,
			other => return Err(crate::Error::Parse(format!("unknown pin type \"{}\"", other))),
		};
		self.create_pin(kind, package, data, priority)
	}

	/// Adds a pin, `package` is a space separated list of names, globs or `/regex/` or `*` for all.
	pub fn create_pin(&mut self, kind: PinKind, package: &str, data: &str, priority: i32) -> crate::Result<()> {
		let packages = if package.trim() == "*" {
			None
		} else {
			Some(package.split_whitespace().map(Pattern::new).collect::<crate::Result<Vec<_>>>()?)
		};
		if packages.as_ref().is_some_and(|p| p.is_empty()) {
			return Err(crate::Error::Parse("pin names no packages".to_string()));
		}
		if kind == PinKind::Version && packages.is_none() {
			log::debug!("version pin \"{}\" applies to every package", data);
		}
		self.pins.push(Pin { packages, target: PinTarget::new(kind, data)?, priority });
		Ok(())
	}

	/// Priority of a package file when no specific pin applies.
	pub fn file_priority(&self, file: &PackageFile) -> i32 {
		self.pins.iter()
			.filter(|p| p.packages.is_none())
			.find(|p| p.target.matches_file(file))
			.map(|p| p.priority)
			.unwrap_or(if file.is_status { STATUS_PRIORITY } else { DEFAULT_PRIORITY })
	}

	/// The first pin naming `pkg` that matches `ver`.
	fn specific_pin(&self, pkg: &Package, ver: &Version) -> Option<&Pin> {
		self.pins.iter()
			.filter(|p| p.packages.is_some() && p.matches_package(pkg.name()))
			.find(|p| p.target.matches_version(ver))
	}

	pub fn priority(&self, ver: Version) -> i32 {
		let pkg = ver.package();
		if let Some(pin) = self.specific_pin(&pkg, &ver) {
			return pin.priority;
		}
		if let Some(pin) = self.pins.iter().find(|p| p.packages.is_none() && matches!(p.target, PinTarget::Version(_)) && p.target.matches_version(&ver)) {
			return pin.priority;
		}
		ver.files()
			.map(|f| self.file_priority(f))
			.max()
			.unwrap_or(DEFAULT_PRIORITY)
	}

	/// The highest version matched by a pin naming `pkg`.
	pub fn get_match<'c>(&self, pkg: Package<'c>) -> Option<Version<'c>> {
		pkg.versions().find(|v| self.specific_pin(&pkg, v).is_some())
	}

	/// Priority of the pin naming `pkg`, `0` if there is none.
	pub fn package_priority(&self, pkg: Package) -> i32 {
		self.get_match(pkg)
			.and_then(|v| self.specific_pin(&pkg, &v).map(|p| p.priority))
			.unwrap_or(0)
	}

	/// Selects the version of `pkg` to install.
	///
	/// - Versions with a negative priority are never selected.
	/// - Versions lower than the installed one need at least [`DOWNGRADE_PRIORITY`].
	/// - Versions only listed in the status file can only be selected when installed.
	/// - Between equal priorities the higher version wins.
	pub fn candidate_version<'c>(&self, pkg: Package<'c>) -> Option<Version<'c>> {
		let current = pkg.current_version();
		let mut best: Option<(Version<'c>, i32)> = None;

		for ver in pkg.versions() {
			let is_current = current.as_ref().is_some_and(|c| *c == ver);
			if !is_current && !ver.is_downloadable() {
				continue;
			}
			let priority = self.priority(ver);
			if priority < 0 {
				continue;
			}
			if let Some(c) = &current {
				if ver.version() < c.version() && priority < DOWNGRADE_PRIORITY {
					continue;
				}
			}
			if best.as_ref().map_or(true, |(_, p)| priority > *p) {
				best = Some((ver, priority));
			}
		}
		best.map(|(v, _)| v)
	}

	/// Candidates of every package indexed by [`PackageId`](crate::cache::PackageId).
	pub(crate) fn candidates(&self, cache: &Cache) -> Vec<Option<crate::cache::VersionId>> {
		cache.packages().map(|p| self.candidate_version(p).map(|v| v.id())).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::CacheBuilder;

	fn cache() -> Cache {
		let mut b = CacheBuilder::new("amd64", "status");
		b.add_status("Package: foo\nStatus: install ok installed\nVersion: 2.0\n").unwrap();
		b.add_index(
			PackageFile::from_list_path("deb.example.org_debian_dists_stable_main_binary-amd64_Packages"),
			"Package: foo\nVersion: 2.0\n\nPackage: foo\nVersion: 1.0\n\nPackage: bar\nVersion: 1.0\n",
		).unwrap();
		b.add_index(
			PackageFile::from_list_path("deb.example.org_debian_dists_unstable_main_binary-amd64_Packages"),
			"Package: foo\nVersion: 3.0\n\nPackage: bar\nVersion: 2.0\n",
		).unwrap();
		b.finish(&crate::Config::default(), String::new())
	}

	fn ver<'c>(cache: &'c Cache, name: &str, v: &str) -> Version<'c> {
		cache.lookup(name).unwrap().versions().find(|x| x.ver_str() == v).unwrap()
	}

	#[test]
	fn default_candidate_is_highest() {
		let cache = cache();
		let policy = Policy::new();
		assert_eq!(policy.candidate_version(cache.lookup("foo").unwrap()).unwrap().ver_str(), "3.0");
		assert_eq!(policy.priority(ver(&cache, "foo", "2.0")), DEFAULT_PRIORITY);
	}

	#[test]
	fn release_pin_lowers_unstable() {
		let cache = cache();
		let mut policy = Policy::new();
		policy.create_pin(PinKind::Release, "*", "a=unstable", 50).unwrap();
		assert_eq!(policy.candidate_version(cache.lookup("foo").unwrap()).unwrap().ver_str(), "2.0");
		assert_eq!(policy.candidate_version(cache.lookup("bar").unwrap()).unwrap().ver_str(), "1.0");
	}

	#[test]
	fn downgrade_needs_high_priority() {
		let cache = cache();
		let mut policy = Policy::new();
		policy.create_pin(PinKind::Version, "foo", "1.*", 990).unwrap();
		assert_eq!(policy.candidate_version(cache.lookup("foo").unwrap()).unwrap().ver_str(), "3.0");

		let mut policy = Policy::new();
		policy.create_pin(PinKind::Version, "foo", "1.*", 1001).unwrap();
		assert_eq!(policy.candidate_version(cache.lookup("foo").unwrap()).unwrap().ver_str(), "1.0");
		assert_eq!(policy.package_priority(cache.lookup("foo").unwrap()), 1001);
		assert_eq!(policy.get_match(cache.lookup("foo").unwrap()).unwrap().ver_str(), "1.0");
	}

	#[test]
	fn negative_priority_is_never_candidate() {
		let cache = cache();
		let mut policy = Policy::new();
		policy.create_pin(PinKind::Origin, "/^ba/", "deb.example.org", -1).unwrap();
		assert!(policy.candidate_version(cache.lookup("bar").unwrap()).is_none());
	}

	#[test]
	fn missing_pin_file_is_fine() {
		let mut policy = Policy::new();
		assert!(policy.read_pin_file("/nonexistent/preferences"));
	}

	#[test]
	fn glob_pattern() {
		assert!(Pattern::new("lib*-dev").unwrap().is_match("libfoo-dev"));
		assert!(!Pattern::new("lib*-dev").unwrap().is_match("libfoo-dev2"));
		assert!(Pattern::new("a.b").unwrap().is_match("a.b"));
	}
}
