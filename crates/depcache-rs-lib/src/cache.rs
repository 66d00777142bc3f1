//! # Package cache
//!
//! An immutable index of every package and version known to the system, built from the dpkg
//! status file and the repository `Packages` indexes in the lists directory.
//!
//! Building is slow for real systems so the result is serialized with bincode and reused until
//! any of its inputs change. See [`Cache::build()`].

use petgraph::prelude::*;
use serde::{Serialize, Deserialize};

mod package_version;
pub use package_version::PackageVersion;

mod version_bounds;
pub use version_bounds::VersionBounds;

mod relationship;
pub use relationship::DepKind;
pub use relationship::PackageDescriptor;
pub use relationship::Relationship;
pub use relationship::parse_relationships;
pub use relationship::parse_provides;

pub mod control;

mod dependency_graph;
pub use dependency_graph::Selection;
pub use dependency_graph::CurrentState;
pub(crate) use dependency_graph::*;

mod generation;
pub use generation::CacheBuilder;
pub use generation::PackageFile;
pub(crate) use generation::list_files;

pub mod iterator;

/// Handle to a package, only meaningful for the cache that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(pub(crate) usize);

impl PackageId {
	/// Dense index in `0..package_count()`.
	pub fn index(&self) -> usize {
		self.0
	}
}

/// Handle to a version, only meaningful for the cache that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionId(pub(crate) NodeIndex);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cache {
	graph: DependencyGraph,
	files: Vec<PackageFile>,
	architecture: String,
	fingerprint: String,
	#[serde(skip)]
	config: crate::Config,
}

impl Cache {
	/// Builds the cache using the process config installed by [`init()`](crate::init).
	///
	/// # Errors
	/// - [`NotInitialized`](crate::Error::NotInitialized) when `init()` wasn't called.
	/// - See [`Cache::build()`].
	pub fn load(progress: &mut dyn crate::progress::OpProgress) -> crate::Result<Cache> {
		Self::build(crate::config()?, progress)
	}

	/// The config this cache was built with.
	pub fn config(&self) -> &crate::Config {
		&self.config
	}

	/// Native architecture.
	pub fn architecture(&self) -> &str {
		&self.architecture
	}

	pub fn package_count(&self) -> usize {
		self.graph.package_count()
	}

	pub fn version_count(&self) -> usize {
		self.graph.graph.node_weights().filter(|n| matches!(n, NodeData::Version(_))).count()
	}

	/// Finds a package by `name` or `name:arch`.
	///
	/// Without a qualifier the native architecture is preferred.
	pub fn lookup(&self, name: &str) -> Option<Package<'_>> {
		if let Some((name, arch)) = name.split_once(':') {
			return self.lookup_arch(name, arch);
		}
		self.lookup_arch(name, &self.architecture)
			.or_else(|| {
				let node = *self.graph.find_packages(name).first()?;
				Some(self.package_at(node))
			})
	}

	pub fn lookup_arch(&self, name: &str, arch: &str) -> Option<Package<'_>> {
		let arch = match arch {
			"all" | "any" | "native" => self.architecture.as_str(),
			a => a,
		};
		self.graph.find_package(name, arch).map(|n| self.package_at(n))
	}

	/// # Panics
	/// - If `id` comes from a different cache with more packages.
	pub fn package(&self, id: PackageId) -> Package<'_> {
		Package { cache: self, node: self.graph.package_node(id.0) }
	}

	pub fn version(&self, id: VersionId) -> Version<'_> {
		Version { cache: self, node: id.0 }
	}

	pub fn packages(&self) -> impl Iterator<Item = Package<'_>> + '_ {
		self.graph.package_nodes().iter().map(move |&n| Package { cache: self, node: n })
	}

	/// Files versions were read from, the status file first.
	pub fn files(&self) -> &[PackageFile] {
		&self.files
	}

	pub(crate) fn graph(&self) -> &DependencyGraph {
		&self.graph
	}

	fn package_at(&self, node: NodeIndex) -> Package<'_> {
		Package { cache: self, node }
	}
}

/// A package of a [`Cache`].
#[derive(Clone, Copy)]
pub struct Package<'c> {
	cache: &'c Cache,
	node: NodeIndex,
}

impl<'c> Package<'c> {
	fn data(&self) -> &'c PackageData {
		self.cache.graph.package(self.node)
	}

	pub fn id(&self) -> PackageId {
		PackageId(self.data().index)
	}

	pub fn name(&self) -> &'c str {
		&self.data().name
	}

	pub fn architecture(&self) -> &'c str {
		&self.data().arch
	}

	/// `name:arch`
	pub fn full_name(&self) -> String {
		format!("{}:{}", self.name(), self.architecture())
	}

	pub fn current_version(&self) -> Option<Version<'c>> {
		self.data().current_version.map(|n| Version { cache: self.cache, node: n })
	}

	/// Every known version, highest first.
	pub fn versions(&self) -> impl Iterator<Item = Version<'c>> + 'c {
		let cache = self.cache;
		self.data().versions.iter().map(move |&n| Version { cache, node: n })
	}

	/// A package only known through other packages' relationships or provides.
	pub fn is_virtual(&self) -> bool {
		self.data().versions.is_empty()
	}

	pub fn essential(&self) -> bool {
		self.data().essential
	}

	pub fn selection(&self) -> Selection {
		self.data().selection
	}

	pub fn current_state(&self) -> CurrentState {
		self.data().current_state
	}

	/// Held packages aren't changed by upgrades.
	pub fn is_held(&self) -> bool {
		self.data().selection == Selection::Hold
	}

	/// Versions providing this package together with the version they provide.
	pub fn provides_list(&self) -> Vec<(Version<'c>, Option<&'c PackageVersion>)> {
		self.cache.graph.providers(self.node).into_iter()
			.map(|(v, pv)| (Version { cache: self.cache, node: v }, pv))
			.collect()
	}

	/// Relationships of other versions naming this package.
	pub fn reverse_dependencies(&self) -> Vec<Dependency<'c>> {
		self.cache.graph.reverse_groups(self.node).into_iter()
			.map(|g| Dependency { cache: self.cache, group: g })
			.collect()
	}
}

impl std::fmt::Debug for Package<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Package({})", self.full_name())
	}
}

impl PartialEq for Package<'_> {
	fn eq(&self, other: &Self) -> bool {
		std::ptr::eq(self.cache, other.cache) && self.node == other.node
	}
}

/// A version of a [`Package`].
#[derive(Clone, Copy)]
pub struct Version<'c> {
	cache: &'c Cache,
	node: NodeIndex,
}

impl<'c> Version<'c> {
	fn data(&self) -> &'c VersionData {
		self.cache.graph.version(self.node)
	}

	pub fn id(&self) -> VersionId {
		VersionId(self.node)
	}

	pub fn package(&self) -> Package<'c> {
		Package { cache: self.cache, node: self.data().package }
	}

	pub fn version(&self) -> &'c PackageVersion {
		&self.data().version
	}

	/// The version exactly as written in the metadata.
	pub fn ver_str(&self) -> &'c str {
		&self.data().ver_str
	}

	/// Bytes used once unpacked.
	pub fn installed_size(&self) -> u64 {
		self.data().installed_size
	}

	/// Size of the `.deb`.
	pub fn download_size(&self) -> u64 {
		self.data().download_size
	}

	pub fn section(&self) -> Option<&'c str> {
		self.data().section.as_deref()
	}

	pub fn priority(&self) -> Option<&'c str> {
		self.data().priority.as_deref()
	}

	/// Path of the `.deb` relative to the repository root.
	pub fn filename(&self) -> Option<&'c str> {
		self.data().filename.as_deref()
	}

	pub fn essential(&self) -> bool {
		self.data().essential
	}

	pub fn files(&self) -> impl Iterator<Item = &'c PackageFile> + 'c {
		let files = &self.cache.files;
		self.data().files.iter().map(move |&i| &files[i])
	}

	/// Available from a repository, not only listed in the status file.
	pub fn is_downloadable(&self) -> bool {
		self.files().any(|f| !f.is_status)
	}

	/// All relationship entries in field order.
	pub fn dependencies(&self) -> Vec<Dependency<'c>> {
		self.cache.graph.groups(self.node).into_iter()
			.map(|(g, _)| Dependency { cache: self.cache, group: g })
			.collect()
	}

	pub fn dependencies_of_kind(&self, kind: DepKind) -> Vec<Dependency<'c>> {
		self.cache.graph.groups(self.node).into_iter()
			.filter(|(_, k)| *k == kind)
			.map(|(g, _)| Dependency { cache: self.cache, group: g })
			.collect()
	}

	/// Packages this version provides.
	pub fn provides(&self) -> Vec<(Package<'c>, Option<&'c PackageVersion>)> {
		self.cache.graph.provides(self.node).into_iter()
			.map(|(p, v)| (Package { cache: self.cache, node: p }, v))
			.collect()
	}
}

impl std::fmt::Debug for Version<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Version({} {})", self.package().full_name(), self.ver_str())
	}
}

impl PartialEq for Version<'_> {
	fn eq(&self, other: &Self) -> bool {
		std::ptr::eq(self.cache, other.cache) && self.node == other.node
	}
}

/// One entry of a relationship field, satisfied by any of its targets.
#[derive(Clone, Copy)]
pub struct Dependency<'c> {
	cache: &'c Cache,
	group: NodeIndex,
}

/// A single alternative of a [`Dependency`].
#[derive(Debug, Clone, Copy)]
pub struct Target<'c> {
	pub package: Package<'c>,
	pub bounds: &'c VersionBounds,
}

impl<'c> Dependency<'c> {
	pub fn kind(&self) -> DepKind {
		self.cache.graph.group_kind(self.group)
	}

	/// The version declaring this relationship.
	pub fn owner(&self) -> Version<'c> {
		Version { cache: self.cache, node: self.cache.graph.group_owner(self.group) }
	}

	pub fn targets(&self) -> Vec<Target<'c>> {
		self.cache.graph.alternatives(self.group).into_iter()
			.map(|(p, bounds)| Target { package: Package { cache: self.cache, node: p }, bounds })
			.collect()
	}
}

impl std::fmt::Display for Dependency<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let targets = self.targets();
		for (i, t) in targets.iter().enumerate() {
			if i > 0 {
				write!(f, " | ")?;
			}
			write!(f, "{}", t.package.name())?;
			if !t.bounds.is_any() {
				write!(f, " {}", t.bounds)?;
			}
		}
		Ok(())
	}
}

impl std::fmt::Debug for Dependency<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}: {}", self.kind(), self)
	}
}
