//! Storage of packages, versions and their relationships.
//!
//! Layout of the graph:
//! - `Package` nodes own their versions by index, they have no outgoing edges.
//! - `Version` nodes have a `Relation` edge to a `Group` node for every entry of their relationship fields,
//! and a `Provides` edge to each package they provide.
//! - `Group` nodes have an `Alternative` edge to every package named in the entry.
//!
//! petgraph iterates edges newest first so every ordered edge carries an ordinal.

use std::collections::HashMap;

use petgraph::prelude::*;
use serde::{Serialize, Deserialize};

use super::*;

/// dpkg's wanted state of a package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
	#[default] Unknown,
	Install,
	Hold,
	DeInstall,
	Purge,
}

/// dpkg's view of what is on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentState {
	#[default] NotInstalled,
	ConfigFiles,
	HalfInstalled,
	Unpacked,
	HalfConfigured,
	TriggersAwaited,
	TriggersPending,
	Installed,
}

impl CurrentState {
	/// States where the package files are present, i.e. the package has a current version.
	pub fn has_files(&self) -> bool {
		!matches!(self, CurrentState::NotInstalled | CurrentState::ConfigFiles)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageData {
	pub name: String,
	pub arch: String,
	/// Dense index used by [`PackageId`].
	pub index: usize,
	pub current_version: Option<NodeIndex>,
	/// Highest version first.
	pub versions: Vec<NodeIndex>,
	pub selection: Selection,
	pub current_state: CurrentState,
	pub essential: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionData {
	pub version: PackageVersion,
	/// The string as written in the metadata.
	pub ver_str: String,
	pub package: NodeIndex,
	/// Bytes.
	pub installed_size: u64,
	pub download_size: u64,
	pub section: Option<String>,
	pub priority: Option<String>,
	pub filename: Option<String>,
	/// Indexes into the cache's package files.
	pub files: Vec<usize>,
	pub essential: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeData {
	Package(PackageData),
	Version(VersionData),
	/// A single comma separated entry of a relationship field.
	Group(DepKind),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EdgeData {
	/// Version to `Group`.
	Relation { ordinal: usize },
	/// `Group` to any package that can satisfy it.
	Alternative { ordinal: usize, bounds: VersionBounds },
	/// Version to the package it provides.
	Provides(Option<PackageVersion>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
	pub graph: DiGraph<NodeData, EdgeData>,
	by_name: HashMap<String, Vec<NodeIndex>>,
	package_nodes: Vec<NodeIndex>,
}

impl DependencyGraph {
	pub fn package_count(&self) -> usize {
		self.package_nodes.len()
	}

	pub fn package_node(&self, index: usize) -> NodeIndex {
		self.package_nodes[index]
	}

	pub fn package_nodes(&self) -> &[NodeIndex] {
		&self.package_nodes
	}

	pub fn find_package(&self, name: &str, arch: &str) -> Option<NodeIndex> {
		self.by_name.get(name)?
			.iter()
			.copied()
			.find(|&i| self.package(i).arch == arch)
	}

	/// All architectures of `name`.
	pub fn find_packages(&self, name: &str) -> &[NodeIndex] {
		self.by_name.get(name).map(|v| v.as_slice()).unwrap_or(&[])
	}

	/// Returns the index of the existing package or a new package without versions.
	pub fn get_or_add_package(&mut self, name: &str, arch: &str) -> NodeIndex {
		if let Some(i) = self.find_package(name, arch) {
			return i;
		}
		let index = self.package_nodes.len();
		let node = self.graph.add_node(NodeData::Package(PackageData {
			name: name.to_string(),
			arch: arch.to_string(),
			index,
			current_version: None,
			versions: Vec::new(),
			selection: Selection::Unknown,
			current_state: CurrentState::NotInstalled,
			essential: false,
		}));
		self.package_nodes.push(node);
		self.by_name.entry(name.to_string()).or_default().push(node);
		node
	}

	/// Adds a version to `data.package` keeping the version list sorted.
	pub fn add_version(&mut self, data: VersionData) -> NodeIndex {
		let pkg = data.package;
		let essential = data.essential;
		let node = self.graph.add_node(NodeData::Version(data));

		let position = {
			let new = &self.version(node).version;
			self.package(pkg).versions.iter()
				.position(|&v| self.version(v).version < *new)
		};
		let package = self.package_mut(pkg);
		match position {
			Some(p) => package.versions.insert(p, node),
			None => package.versions.push(node),
		}
		package.essential |= essential;
		node
	}

	/// Finds the version of `pkg` equal to `version`.
	pub fn find_version(&self, pkg: NodeIndex, version: &PackageVersion) -> Option<NodeIndex> {
		self.package(pkg).versions.iter()
			.copied()
			.find(|&v| self.version(v).version == *version)
	}

	/// Adds one relationship entry of `kind` to `ver`.
	///
	/// `default_arch` is used for targets without an architecture qualifier.
	pub fn add_relationship(&mut self, ver: NodeIndex, kind: DepKind, ordinal: usize, relationship: &Relationship, default_arch: &str) {
		let group = self.graph.add_node(NodeData::Group(kind));
		self.graph.add_edge(ver, group, EdgeData::Relation { ordinal });
		for (i, d) in relationship.as_vec().into_iter().enumerate() {
			let target = self.get_or_add_package(&d.name, d.arch.as_deref().unwrap_or(default_arch));
			self.graph.add_edge(group, target, EdgeData::Alternative { ordinal: i, bounds: d.version.clone() });
		}
	}

	pub fn add_provides(&mut self, ver: NodeIndex, name: &str, arch: &str, version: Option<PackageVersion>) {
		let target = self.get_or_add_package(name, arch);
		self.graph.add_edge(ver, target, EdgeData::Provides(version));
	}

	pub fn package(&self, i: NodeIndex) -> &PackageData {
		match &self.graph[i] {
			NodeData::Package(p) => p,
			_ => unreachable!("node {:?} is not a package", i),
		}
	}

	pub fn package_mut(&mut self, i: NodeIndex) -> &mut PackageData {
		match &mut self.graph[i] {
			NodeData::Package(p) => p,
			_ => unreachable!("node {:?} is not a package", i),
		}
	}

	pub fn version(&self, i: NodeIndex) -> &VersionData {
		match &self.graph[i] {
			NodeData::Version(v) => v,
			_ => unreachable!("node {:?} is not a version", i),
		}
	}

	pub fn version_mut(&mut self, i: NodeIndex) -> &mut VersionData {
		match &mut self.graph[i] {
			NodeData::Version(v) => v,
			_ => unreachable!("node {:?} is not a version", i),
		}
	}

	pub fn group_kind(&self, i: NodeIndex) -> DepKind {
		match &self.graph[i] {
			NodeData::Group(k) => *k,
			_ => unreachable!("node {:?} is not a relationship group", i),
		}
	}

	/// Relationship groups of `ver` in field order.
	pub fn groups(&self, ver: NodeIndex) -> Vec<(NodeIndex, DepKind)> {
		let mut v: Vec<_> = self.graph.edges_directed(ver, Outgoing)
			.filter_map(|e| match e.weight() {
				EdgeData::Relation { ordinal } => Some((*ordinal, e.target())),
				_ => None,
			})
			.collect();
		v.sort_by_key(|(o, _)| *o);
		v.into_iter().map(|(_, g)| (g, self.group_kind(g))).collect()
	}

	/// Target packages of a group in the order they were written.
	pub fn alternatives(&self, group: NodeIndex) -> Vec<(NodeIndex, &VersionBounds)> {
		let mut v: Vec<_> = self.graph.edges_directed(group, Outgoing)
			.filter_map(|e| match e.weight() {
				EdgeData::Alternative { ordinal, bounds } => Some((*ordinal, e.target(), bounds)),
				_ => None,
			})
			.collect();
		v.sort_by_key(|(o, _, _)| *o);
		v.into_iter().map(|(_, t, b)| (t, b)).collect()
	}

	/// The version declaring `group`.
	pub fn group_owner(&self, group: NodeIndex) -> NodeIndex {
		self.graph.edges_directed(group, Incoming)
			.next()
			.map(|e| e.source())
			.unwrap_or_else(|| unreachable!("relationship group {:?} without owner", group))
	}

	/// Groups naming `pkg` as an alternative.
	pub fn reverse_groups(&self, pkg: NodeIndex) -> Vec<NodeIndex> {
		self.graph.edges_directed(pkg, Incoming)
			.filter(|e| matches!(e.weight(), EdgeData::Alternative { .. }))
			.map(|e| e.source())
			.collect()
	}

	/// Packages provided by `ver`.
	pub fn provides(&self, ver: NodeIndex) -> Vec<(NodeIndex, Option<&PackageVersion>)> {
		let mut v: Vec<_> = self.graph.edges_directed(ver, Outgoing)
			.filter_map(|e| match e.weight() {
				EdgeData::Provides(pv) => Some((e.target(), pv.as_ref())),
				_ => None,
			})
			.collect();
		v.reverse();
		v
	}

	/// Versions providing `pkg`, oldest edge first.
	pub fn providers(&self, pkg: NodeIndex) -> Vec<(NodeIndex, Option<&PackageVersion>)> {
		let mut v: Vec<_> = self.graph.edges_directed(pkg, Incoming)
			.filter_map(|e| match e.weight() {
				EdgeData::Provides(pv) => Some((e.source(), pv.as_ref())),
				_ => None,
			})
			.collect();
		v.reverse();
		v
	}
}
