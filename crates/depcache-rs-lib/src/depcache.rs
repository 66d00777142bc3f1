//! # Dependency cache
//!
//! A mutable overlay on a [`Cache`] recording what should happen to every package. Each package
//! has exactly one [`Marking`] and the overlay keeps derived state (broken packages, garbage,
//! counts and sizes) up to date after every public mutation. Inside an [`ActionGroup`] the
//! derived state is only refreshed when the group is dropped.
//!
//! Marking operations never fail. A request that can't be satisfied leaves packages broken,
//! visible through [`DepCache::broken_count()`], until [`DepCache::fix_broken()`] repairs it.

use std::collections::{HashSet, VecDeque};
use std::path::Path;

use crate::cache::*;
use crate::policy::Policy;
use crate::progress::{OpProgress, ProgressTracker};

mod marking;

mod action_group;
pub use action_group::ActionGroup;

/// Desired state of a package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
	/// Stay at the current version, or stay not installed.
	#[default] Keep,
	Install,
	Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marking {
	pub mode: Mode,
	/// Installed only to satisfy other packages.
	pub auto: bool,
}

/// Derived totals over all packages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
	/// New installs.
	pub install: usize,
	/// Installed packages changing version.
	pub upgrade: usize,
	pub delete: usize,
	/// Installed packages kept back from a different candidate.
	pub keep: usize,
	pub broken: usize,
	/// Change in disk usage in bytes.
	pub usr_size: i64,
	/// Bytes to download.
	pub deb_size: u64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StateCache {
	pub mode: Mode,
	/// Version the package ends up with, `None` for not installed.
	pub install_version: Option<VersionId>,
	pub candidate: Option<VersionId>,
	pub auto: bool,
	/// Last marked by an explicit request rather than by propagation.
	pub from_user: bool,
	pub purge: bool,
	pub reinstall: bool,
	pub now_broken: bool,
	pub inst_broken: bool,
	pub garbage: bool,
}

/// Which version of each package to evaluate relationships against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum View {
	/// What is installed right now.
	Now,
	/// What is installed once the markings are applied.
	Future,
}

pub struct DepCache<'c> {
	cache: &'c Cache,
	policy: Policy,
	pub(crate) states: Vec<StateCache>,
	counts: Counts,
	pub(crate) group_level: usize,
}

impl<'c> DepCache<'c> {
	/// Creates the overlay, reading the configured pin file and running [`DepCache::init()`].
	pub fn attach(cache: &'c Cache, progress: &mut dyn OpProgress) -> Self {
		let mut policy = Policy::new();
		policy.read_pin_file(cache.config().preferences());
		let mut depcache = Self {
			cache,
			policy,
			states: Vec::new(),
			counts: Counts::default(),
			group_level: 0,
		};
		depcache.init(progress);
		depcache
	}

	pub fn cache(&self) -> &'c Cache {
		self.cache
	}

	pub fn policy(&self) -> &Policy {
		&self.policy
	}

	/// Resets every marking to the installed state and recomputes derived state.
	///
	/// Candidates are recomputed from the policy, any override from
	/// [`DepCache::set_candidate_version()`] is lost.
	pub fn init(&mut self, progress: &mut dyn OpProgress) {
		let mut tracker = ProgressTracker::new(progress);
		tracker.update(0.0);

		let cache = self.cache;
		let auto = read_extended_states(cache);
		let candidates = self.policy.candidates(cache);
		let total = cache.package_count();

		self.states = cache.packages()
			.zip(candidates)
			.enumerate()
			.map(|(i, (p, candidate))| {
				if i % 256 == 0 {
					tracker.step(i, total);
				}
				let current = p.current_version().map(|v| v.id());
				StateCache {
					mode: Mode::Keep,
					install_version: current,
					candidate,
					auto: current.is_some() && auto.contains(&(p.name().to_string(), p.architecture().to_string())),
					..Default::default()
				}
			})
			.collect();

		self.refresh();
		tracker.done();
	}

	/// Re-reads the configured pin file from scratch and recomputes candidates.
	///
	/// Markings are left as they are. Returns `false` if some pin couldn't be understood.
	pub fn read_pin_file(&mut self) -> bool {
		let mut policy = Policy::new();
		let ok = policy.read_pin_file(self.cache.config().preferences());
		self.policy = policy;
		self.recompute_candidates();
		ok
	}

	/// Adds the pins of another pin file and recomputes candidates.
	pub fn read_pin_file_from(&mut self, path: impl AsRef<Path>) -> bool {
		let ok = self.policy.read_pin_file(path);
		self.recompute_candidates();
		ok
	}

	/// Adds a single pin, see [`Policy::create_pin()`].
	pub fn create_pin(&mut self, kind: crate::policy::PinKind, package: &str, data: &str, priority: i32) -> crate::Result<()> {
		self.policy.create_pin(kind, package, data, priority)?;
		self.recompute_candidates();
		Ok(())
	}

	fn recompute_candidates(&mut self) {
		for (state, candidate) in self.states.iter_mut().zip(self.policy.candidates(self.cache)) {
			state.candidate = candidate;
		}
		self.update();
	}

	/* Queries */

	pub fn candidate_version(&self, pkg: PackageId) -> Option<Version<'c>> {
		self.states[pkg.0].candidate.map(|v| self.cache.version(v))
	}

	/// The version `pkg` has once markings are applied.
	pub fn install_version(&self, pkg: PackageId) -> Option<Version<'c>> {
		self.states[pkg.0].install_version.map(|v| self.cache.version(v))
	}

	pub fn marking(&self, pkg: PackageId) -> Marking {
		let s = &self.states[pkg.0];
		Marking { mode: s.mode, auto: s.auto }
	}

	/// Installed and the candidate is newer than both the installed version and the marked one.
	pub fn is_upgradable(&self, pkg: PackageId) -> bool {
		let s = &self.states[pkg.0];
		let (Some(current), Some(candidate)) = (self.cache.package(pkg).current_version(), self.candidate_version(pkg)) else {
			return false;
		};
		candidate.version() > current.version()
			&& !(s.mode == Mode::Install && s.install_version == Some(candidate.id()))
	}

	fn has_current(&self, pkg: PackageId) -> bool {
		self.cache.package(pkg).current_version().is_some()
	}

	/// New install of a package that isn't installed.
	pub fn marked_install(&self, pkg: PackageId) -> bool {
		self.states[pkg.0].mode == Mode::Install && !self.has_current(pkg)
	}

	/// Installed package changing version, this includes downgrades.
	pub fn marked_upgrade(&self, pkg: PackageId) -> bool {
		self.states[pkg.0].mode == Mode::Install && self.has_current(pkg)
	}

	pub fn marked_delete(&self, pkg: PackageId) -> bool {
		self.states[pkg.0].mode == Mode::Delete
	}

	pub fn marked_keep(&self, pkg: PackageId) -> bool {
		self.states[pkg.0].mode == Mode::Keep
	}

	/// Marked for an older version than the installed one.
	pub fn marked_downgrade(&self, pkg: PackageId) -> bool {
		let (Some(current), Some(target)) = (self.cache.package(pkg).current_version(), self.install_version(pkg)) else {
			return false;
		};
		self.states[pkg.0].mode == Mode::Install && target.version() < current.version()
	}

	pub fn marked_reinstall(&self, pkg: PackageId) -> bool {
		let s = &self.states[pkg.0];
		s.reinstall && s.mode != Mode::Delete
	}

	pub fn marked_purge(&self, pkg: PackageId) -> bool {
		let s = &self.states[pkg.0];
		s.purge && s.mode == Mode::Delete
	}

	/// Broken with the installed versions.
	pub fn is_now_broken(&self, pkg: PackageId) -> bool {
		self.states[pkg.0].now_broken
	}

	/// Broken once markings are applied.
	pub fn is_inst_broken(&self, pkg: PackageId) -> bool {
		self.states[pkg.0].inst_broken
	}

	/// Installed automatically and no longer needed by a manually installed package.
	pub fn is_garbage(&self, pkg: PackageId) -> bool {
		self.states[pkg.0].garbage
	}

	pub fn is_auto_installed(&self, pkg: PackageId) -> bool {
		self.states[pkg.0].auto
	}

	pub fn counts(&self) -> Counts {
		self.counts
	}

	pub fn inst_count(&self) -> usize {
		self.counts.install
	}

	pub fn upgrade_count(&self) -> usize {
		self.counts.upgrade
	}

	pub fn del_count(&self) -> usize {
		self.counts.delete
	}

	pub fn keep_count(&self) -> usize {
		self.counts.keep
	}

	pub fn broken_count(&self) -> usize {
		self.counts.broken
	}

	pub fn usr_size(&self) -> i64 {
		self.counts.usr_size
	}

	pub fn deb_size(&self) -> u64 {
		self.counts.deb_size
	}

	/// Defers derived state updates until the returned guard is dropped.
	pub fn action_group(&mut self) -> ActionGroup<'_, 'c> {
		ActionGroup::new(self)
	}

	/* Derived state */

	/// Refreshes derived state unless an action group is active.
	pub(crate) fn update(&mut self) {
		if self.group_level == 0 {
			self.refresh();
		}
	}

	pub(crate) fn refresh(&mut self) {
		let n = self.states.len();
		for i in 0..n {
			let pkg = PackageId(i);
			let now_broken = self.package_broken(pkg, View::Now);
			let inst_broken = self.package_broken(pkg, View::Future);
			let s = &mut self.states[i];
			s.now_broken = now_broken;
			s.inst_broken = inst_broken;
		}

		let reachable = self.mark_reachable();
		for (s, reachable) in self.states.iter_mut().zip(reachable) {
			s.garbage = s.install_version.is_some() && s.auto && !reachable;
		}

		let mut counts = Counts::default();
		for i in 0..n {
			let pkg = PackageId(i);
			let s = &self.states[i];
			let current = self.cache.package(pkg).current_version();
			let target = self.install_version(pkg);
			let current_size = current.map(|v| signed_size(v.installed_size())).unwrap_or(0);

			match s.mode {
				Mode::Install => {
					if current.is_some() {
						counts.upgrade += 1;
					} else {
						counts.install += 1;
					}
					if let Some(t) = target {
						counts.usr_size = counts.usr_size.saturating_add(signed_size(t.installed_size()).saturating_sub(current_size));
						counts.deb_size = counts.deb_size.saturating_add(t.download_size());
					}
				},
				Mode::Delete => {
					counts.delete += 1;
					counts.usr_size = counts.usr_size.saturating_sub(current_size);
				},
				Mode::Keep => {
					if current.is_some() && s.candidate.is_some() && s.candidate != current.map(|v| v.id()) {
						counts.keep += 1;
					}
					if s.reinstall {
						counts.deb_size = counts.deb_size.saturating_add(current.map(|v| v.download_size()).unwrap_or(0));
					}
				},
			}
			if s.inst_broken {
				counts.broken += 1;
			}
		}
		self.counts = counts;
	}

	/// Mark phase of garbage detection, walks from manually installed and essential packages.
	fn mark_reachable(&self) -> Vec<bool> {
		let graph = self.cache.graph();
		let mut reachable = vec![false; self.states.len()];
		let mut queue = VecDeque::<PackageId>::new();

		for (i, s) in self.states.iter().enumerate() {
			if s.install_version.is_some() && (!s.auto || self.cache.package(PackageId(i)).essential()) {
				reachable[i] = true;
				queue.push_back(PackageId(i));
			}
		}

		while let Some(pkg) = queue.pop_front() {
			let Some(ver) = self.states[pkg.0].install_version else { continue };
			for (group, kind) in graph.groups(ver.0) {
				if kind.is_negative() {
					continue;
				}
				for (target, bounds) in graph.alternatives(group) {
					let tid = PackageId(graph.package(target).index);
					if let Some(tv) = self.states[tid.0].install_version {
						if bounds.is_version_within(&graph.version(tv.0).version) && !reachable[tid.0] {
							reachable[tid.0] = true;
							queue.push_back(tid);
						}
					}
					for (pver, provided) in graph.providers(target) {
						let owner = self.owner_of(VersionId(pver));
						if self.states[owner.0].install_version == Some(VersionId(pver)) && bounds.is_provide_within(provided) && !reachable[owner.0] {
							reachable[owner.0] = true;
							queue.push_back(owner);
						}
					}
				}
			}
		}
		reachable
	}

	/* Relationship evaluation */

	pub(crate) fn owner_of(&self, ver: VersionId) -> PackageId {
		let graph = self.cache.graph();
		PackageId(graph.package(graph.version(ver.0).package).index)
	}

	pub(crate) fn version_in(&self, pkg: PackageId, view: View) -> Option<VersionId> {
		match view {
			View::Now => self.cache.package(pkg).current_version().map(|v| v.id()),
			View::Future => self.states[pkg.0].install_version,
		}
	}

	/// Whether any alternative of a positive relationship is met.
	pub(crate) fn group_satisfied(&self, group: petgraph::graph::NodeIndex, view: View) -> bool {
		let graph = self.cache.graph();
		for (target, bounds) in graph.alternatives(group) {
			let tid = PackageId(graph.package(target).index);
			if let Some(v) = self.version_in(tid, view) {
				if bounds.is_version_within(&graph.version(v.0).version) {
					return true;
				}
			}
			for (pver, provided) in graph.providers(target) {
				let owner = self.owner_of(VersionId(pver));
				if self.version_in(owner, view) == Some(VersionId(pver)) && bounds.is_provide_within(provided) {
					return true;
				}
			}
		}
		false
	}

	/// Packages violating a negative relationship declared by `owner`.
	pub(crate) fn conflict_victims(&self, group: petgraph::graph::NodeIndex, owner: PackageId, view: View) -> Vec<PackageId> {
		let graph = self.cache.graph();
		let mut out = Vec::new();
		for (target, bounds) in graph.alternatives(group) {
			let tid = PackageId(graph.package(target).index);
			if tid != owner {
				if let Some(v) = self.version_in(tid, view) {
					if bounds.is_version_within(&graph.version(v.0).version) {
						out.push(tid);
					}
				}
			}
			for (pver, provided) in graph.providers(target) {
				let p = self.owner_of(VersionId(pver));
				if p != owner && self.version_in(p, view) == Some(VersionId(pver)) && bounds.is_provide_within(provided) && !out.contains(&p) {
					out.push(p);
				}
			}
		}
		out
	}

	/// A package is broken when a hard dependency is unmet or a conflict is violated.
	pub(crate) fn package_broken(&self, pkg: PackageId, view: View) -> bool {
		let Some(ver) = self.version_in(pkg, view) else {
			return false;
		};
		self.cache.graph().groups(ver.0).into_iter().any(|(group, kind)| {
			(kind.is_hard() && !self.group_satisfied(group, view))
				|| (kind.is_negative() && !self.conflict_victims(group, pkg, view).is_empty())
		})
	}

	/// Packages whose installed-to-be version has a relationship on `pkg` or something it provides.
	pub(crate) fn dependents_of(&self, pkg: PackageId) -> Vec<PackageId> {
		let graph = self.cache.graph();
		let package = self.cache.package(pkg);
		let mut names = vec![graph.package_node(pkg.0)];
		for ver in package.versions() {
			names.extend(graph.provides(ver.id().0).into_iter().map(|(p, _)| p));
		}

		let mut out = HashSet::new();
		for node in names {
			for group in graph.reverse_groups(node) {
				let owner_ver = VersionId(graph.group_owner(group));
				let owner = self.owner_of(owner_ver);
				if self.states[owner.0].install_version == Some(owner_ver) {
					out.insert(owner);
				}
			}
		}
		out.into_iter().collect()
	}

	pub(crate) fn is_held(&self, pkg: PackageId) -> bool {
		self.cache.package(pkg).is_held() && !self.cache.config().ignore_hold()
	}
}

fn signed_size(size: u64) -> i64 {
	i64::try_from(size).unwrap_or(i64::MAX)
}

/// Packages flagged `Auto-Installed: 1` in the extended states file.
fn read_extended_states(cache: &Cache) -> HashSet<(String, String)> {
	let path = cache.config().extended_states();
	let text = match std::fs::read_to_string(path) {
		Ok(t) => t,
		Err(e) => {
			if e.kind() != std::io::ErrorKind::NotFound {
				log::warn!("Failed to read {}: {}", path.display(), e);
			}
			return HashSet::new();
		},
	};
	let stanzas = match control::parse_stanzas(&text) {
		Ok(s) => s,
		Err(e) => {
			log::warn!("Ignoring malformed {}: {}", path.display(), e);
			return HashSet::new();
		},
	};
	stanzas.iter()
		.filter(|s| s.get("Auto-Installed").map(str::trim) == Some("1"))
		.filter_map(|s| {
			let name = s.get("Package")?;
			let arch = match s.get("Architecture") {
				None | Some("all") => cache.architecture(),
				Some(a) => a,
			};
			Some((name.to_string(), arch.to_string()))
		})
		.collect()
}
