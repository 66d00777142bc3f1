//! Marking operations and their propagation.

use petgraph::graph::NodeIndex;

use super::*;
use crate::policy::DOWNGRADE_PRIORITY;

/// Recursion limit for dependency chains pulled in by one request.
const MAX_MARK_DEPTH: usize = 128;

impl<'c> DepCache<'c> {
	/// Marks the candidate of `pkg` for installation and pulls in what it needs.
	///
	/// Same as `mark_install_with(pkg, true, true)`.
	pub fn mark_install(&mut self, pkg: PackageId) {
		self.mark_install_with(pkg, true, true);
	}

	/// Marks the candidate of `pkg` for installation.
	///
	/// # Arguments
	/// - `auto_inst`: also mark unmet hard dependencies for installation and remove conflicting packages.
	/// - `from_user`: the request comes from the user, a newly installed package is then manual.
	pub fn mark_install_with(&mut self, pkg: PackageId, auto_inst: bool, from_user: bool) {
		self.mark_install_inner(pkg, auto_inst, from_user, 0);
		self.update();
	}

	/// Marks an installed package for removal, dependents are left broken.
	pub fn mark_delete(&mut self, pkg: PackageId) {
		self.mark_delete_with(pkg, false);
	}

	/// Marks an installed package for removal, `purge` also removes its configuration.
	pub fn mark_delete_with(&mut self, pkg: PackageId, purge: bool) {
		self.mark_delete_inner(pkg, purge, true);
		self.update();
	}

	/// Drops any pending change of `pkg`, other packages are not touched.
	pub fn mark_keep(&mut self, pkg: PackageId) {
		self.mark_keep_inner(pkg, true);
		self.update();
	}

	/// Requests the installed version to be installed again.
	///
	/// Ignored for packages that aren't installed or can't be downloaded.
	pub fn set_reinstall(&mut self, pkg: PackageId, reinstall: bool) {
		let downloadable = self.cache.package(pkg).current_version().is_some_and(|v| v.is_downloadable());
		if reinstall && !downloadable {
			log::debug!("{} can't be reinstalled", self.cache.package(pkg).full_name());
			return;
		}
		self.states[pkg.0].reinstall = reinstall;
		self.update();
	}

	pub fn mark_auto(&mut self, pkg: PackageId, auto: bool) {
		self.states[pkg.0].auto = auto;
		self.update();
	}

	/// Overrides the candidate of the version's package.
	///
	/// A pending install of the package is moved to the new candidate, or dropped when the new
	/// candidate is the installed version.
	pub fn set_candidate_version(&mut self, ver: VersionId) {
		let pkg = self.owner_of(ver);
		let current = self.cache.package(pkg).current_version().map(|v| v.id());
		self.states[pkg.0].candidate = Some(ver);
		if self.states[pkg.0].mode == Mode::Install {
			if current == Some(ver) {
				self.mark_keep_inner(pkg, false);
			} else {
				self.states[pkg.0].install_version = Some(ver);
			}
		}
		self.update();
	}

	pub(crate) fn mark_install_inner(&mut self, pkg: PackageId, auto_inst: bool, from_user: bool, depth: usize) {
		let package = self.cache.package(pkg);
		if depth > MAX_MARK_DEPTH {
			log::warn!("Giving up on installing {}, dependency chain too deep", package.full_name());
			return;
		}

		let Some(candidate) = self.states[pkg.0].candidate else {
			log::debug!("{} has no installable candidate", package.full_name());
			return;
		};
		let current = package.current_version().map(|v| v.id());

		if !from_user && current.is_some() && current != Some(candidate) && self.is_held(pkg) {
			log::debug!("{} is held, not changing it", package.full_name());
			return;
		}

		let already = self.states[pkg.0].install_version == Some(candidate);
		{
			let s = &mut self.states[pkg.0];
			if current == Some(candidate) {
				s.mode = Mode::Keep;
			} else {
				s.mode = Mode::Install;
			}
			s.install_version = Some(candidate);
			s.purge = false;
			if from_user {
				s.from_user = true;
			}
			if current.is_none() {
				if from_user {
					s.auto = false;
				} else if !already {
					s.auto = true;
				}
			}
		}
		log::trace!("{:indent$}install {}", "", package.full_name(), indent = depth);

		if auto_inst {
			self.satisfy_dependencies(pkg, depth);
			self.remove_conflicts(pkg, depth);
		}
	}

	pub(crate) fn mark_delete_inner(&mut self, pkg: PackageId, purge: bool, from_user: bool) {
		let has_current = self.cache.package(pkg).current_version().is_some();
		let s = &mut self.states[pkg.0];
		if has_current {
			s.mode = Mode::Delete;
			s.install_version = None;
			s.purge = purge;
		} else {
			s.mode = Mode::Keep;
			s.install_version = None;
			s.purge = false;
		}
		s.reinstall = false;
		if from_user {
			s.from_user = true;
		}
		log::trace!("delete {}", self.cache.package(pkg).full_name());
	}

	pub(crate) fn mark_keep_inner(&mut self, pkg: PackageId, from_user: bool) {
		let current = self.cache.package(pkg).current_version().map(|v| v.id());
		let s = &mut self.states[pkg.0];
		s.mode = Mode::Keep;
		s.install_version = current;
		s.purge = false;
		s.reinstall = false;
		if from_user {
			s.from_user = true;
		}
		log::trace!("keep {}", self.cache.package(pkg).full_name());
	}

	/// Marks an alternative of every unmet dependency of `pkg`'s target version.
	fn satisfy_dependencies(&mut self, pkg: PackageId, depth: usize) {
		let Some(ver) = self.states[pkg.0].install_version else { return };
		let cache = self.cache;
		let new_install = cache.package(pkg).current_version().is_none();
		let recommends = cache.config().install_recommends() && new_install;

		for (group, kind) in cache.graph().groups(ver.0) {
			let wanted = kind.is_hard() || (kind == DepKind::Recommends && recommends);
			if !wanted || self.group_satisfied(group, View::Future) {
				continue;
			}
			match self.choose_alternative(group, &|_| false) {
				Some(target) => self.mark_install_inner(target, true, false, depth + 1),
				None => log::debug!("Unable to satisfy {} of {}", kind, cache.package(pkg).full_name()),
			}
		}
	}

	/// Removes packages violating the negative relationships of `pkg`'s target version.
	///
	/// `Breaks` are first fixed by upgrading the broken package.
	fn remove_conflicts(&mut self, pkg: PackageId, depth: usize) {
		let Some(ver) = self.states[pkg.0].install_version else { return };
		let cache = self.cache;

		for (group, kind) in cache.graph().groups(ver.0) {
			if !kind.is_negative() {
				continue;
			}
			for victim in self.conflict_victims(group, pkg, View::Future) {
				if self.is_protected_from_removal(victim) {
					log::debug!("{} {} {} which can't be removed", cache.package(pkg).full_name(), kind, cache.package(victim).full_name());
					continue;
				}
				if kind == DepKind::Breaks {
					let candidate = self.states[victim.0].candidate;
					if candidate.is_some() && candidate != self.states[victim.0].install_version {
						self.mark_install_inner(victim, true, false, depth + 1);
						if !self.conflict_victims(group, pkg, View::Future).contains(&victim) {
							continue;
						}
					}
				}
				self.mark_delete_inner(victim, false, false);
			}
		}
	}

	/// Picks the package to install for a relationship entry.
	///
	/// Alternatives are tried in order. A real package is used when its candidate is within the
	/// bounds, otherwise the best provider of that name is used: highest priority, then highest
	/// version, then the first one seen. `skip` excludes packages from consideration.
	pub(crate) fn choose_alternative(&self, group: NodeIndex, skip: &dyn Fn(PackageId) -> bool) -> Option<PackageId> {
		let cache = self.cache;
		let graph = cache.graph();

		for (target, bounds) in graph.alternatives(group) {
			let tid = PackageId(graph.package(target).index);
			if !skip(tid) && self.can_install(tid) {
				if let Some(c) = self.states[tid.0].candidate {
					if bounds.is_version_within(&graph.version(c.0).version) {
						return Some(tid);
					}
				}
			}

			let mut best: Option<(PackageId, i32, &PackageVersion)> = None;
			for (pver, provided) in graph.providers(target) {
				let pver = VersionId(pver);
				let owner = self.owner_of(pver);
				if !bounds.is_provide_within(provided) || skip(owner) || !self.can_install(owner) {
					continue;
				}
				if self.states[owner.0].candidate != Some(pver) {
					continue;
				}
				let priority = self.policy.priority(cache.version(pver));
				let version = &graph.version(pver.0).version;
				let better = match &best {
					None => true,
					Some((_, p, v)) => priority > *p || (priority == *p && version > *v),
				};
				if better {
					best = Some((owner, priority, version));
				}
			}
			if let Some((owner, _, _)) = best {
				return Some(owner);
			}
		}
		None
	}

	/// Whether propagation may mark `pkg` for installation.
	fn can_install(&self, pkg: PackageId) -> bool {
		let s = &self.states[pkg.0];
		if s.mode == Mode::Delete && s.from_user {
			return false;
		}
		let current = self.cache.package(pkg).current_version().map(|v| v.id());
		!(current.is_some() && s.candidate != current && self.is_held(pkg))
	}

	/// Packages propagation must never remove.
	pub(crate) fn is_protected_from_removal(&self, pkg: PackageId) -> bool {
		let package = self.cache.package(pkg);
		let s = &self.states[pkg.0];
		package.essential()
			|| self.is_held(pkg)
			|| (s.from_user && s.mode != Mode::Delete)
			|| package.current_version().is_some_and(|v| self.policy.priority(v) >= DOWNGRADE_PRIORITY)
	}
}
