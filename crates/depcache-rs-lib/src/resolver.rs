//! Repairing broken states and bulk upgrades.
//!
//! [`ProblemResolver`] works in passes over the broken packages of a [`DepCache`]. For each
//! broken package it first tries to satisfy unmet dependencies through another alternative or
//! provider, then pushes aside packages it conflicts with. When neither works the package
//! itself gives way: a pending upgrade is kept back, a pending install is cancelled and an
//! installed package is removed. Protected packages are never changed, essential and held
//! packages are never removed.

use std::collections::HashSet;

use petgraph::graph::NodeIndex;

use crate::cache::PackageId;
use crate::depcache::{DepCache, Mode, View};

/// Upper bound on resolver passes, every pass changes at least one package.
const MAX_RESOLVE_PASSES: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
	protected: bool,
	to_remove: bool,
	/// The resolver removed or cancelled this package, don't pull it back in.
	given_up: bool,
}

pub struct ProblemResolver<'d, 'c> {
	depcache: &'d mut DepCache<'c>,
	flags: Vec<Flags>,
	/// Dependencies already retried through an alternative.
	attempted: HashSet<(PackageId, NodeIndex)>,
	/// Installed packages conflicting with an upgrade are removed rather than keeping the upgrade back.
	favour_upgrades: bool,
}

impl<'d, 'c> ProblemResolver<'d, 'c> {
	/// Packages explicitly marked by the user start out protected.
	pub fn new(depcache: &'d mut DepCache<'c>) -> Self {
		let flags = depcache.states.iter()
			.map(|s| Flags { protected: s.from_user, ..Default::default() })
			.collect();
		Self { depcache, flags, attempted: HashSet::new(), favour_upgrades: false }
	}

	/// The resolver will not change `pkg`.
	pub fn protect(&mut self, pkg: PackageId) {
		let f = &mut self.flags[pkg.0];
		f.protected = true;
		f.to_remove = false;
	}

	/// The resolver removes `pkg` before resolving.
	pub fn remove(&mut self, pkg: PackageId) {
		let f = &mut self.flags[pkg.0];
		f.to_remove = true;
		f.protected = false;
	}

	pub fn clear(&mut self, pkg: PackageId) {
		self.flags[pkg.0] = Flags::default();
	}

	/// Re-applies the markings of protected packages, pulling in their dependencies.
	pub fn install_protect(&mut self) {
		for i in 0..self.flags.len() {
			if !self.flags[i].protected {
				continue;
			}
			let pkg = PackageId(i);
			match self.depcache.states[i].mode {
				Mode::Delete => {
					let purge = self.depcache.states[i].purge;
					self.depcache.mark_delete_inner(pkg, purge, false);
				},
				Mode::Install => self.depcache.mark_install_inner(pkg, true, false, 0),
				Mode::Keep => {},
			}
		}
		self.depcache.update();
	}

	/// Tries to leave no package broken, removing packages where needed.
	///
	/// With `broken_fix` packages that are already broken on the system are repaired too,
	/// otherwise only breakage caused by pending changes is handled.
	pub fn resolve(&mut self, broken_fix: bool) -> bool {
		log::debug!("Resolving broken packages");

		for i in 0..self.flags.len() {
			if self.flags[i].to_remove {
				self.depcache.mark_delete_inner(PackageId(i), false, false);
				self.flags[i].given_up = true;
			}
		}

		for pass in 0..MAX_RESOLVE_PASSES {
			let broken = self.broken_packages(broken_fix);
			if broken.is_empty() {
				break;
			}
			log::trace!("resolver pass {} with {} broken packages", pass, broken.len());

			let mut changed = false;
			for pkg in broken {
				if self.depcache.package_broken(pkg, View::Future) {
					changed |= self.fix_package(pkg);
				}
			}
			if !changed {
				break;
			}
		}

		self.finish(broken_fix)
	}

	/// Like [`ProblemResolver::resolve()`] but only ever keeps packages back, nothing is removed.
	pub fn resolve_by_keep(&mut self) -> bool {
		log::debug!("Resolving broken packages by keeping back");

		for _ in 0..MAX_RESOLVE_PASSES {
			let broken = self.broken_packages(false);
			if broken.is_empty() {
				break;
			}

			let mut changed = false;
			for pkg in broken {
				if !self.depcache.package_broken(pkg, View::Future) {
					continue;
				}
				if self.depcache.states[pkg.0].mode == Mode::Install && !self.flags[pkg.0].protected {
					self.depcache.mark_keep_inner(pkg, false);
					changed = true;
					continue;
				}
				changed |= self.keep_blockers(pkg);
			}
			if !changed {
				break;
			}
		}

		self.finish(false)
	}

	fn finish(&mut self, broken_fix: bool) -> bool {
		self.depcache.update();
		let remaining = self.broken_packages(broken_fix);
		for pkg in &remaining {
			log::info!("Unable to fix {}", self.depcache.cache().package(*pkg).full_name());
		}
		remaining.is_empty()
	}

	fn broken_packages(&self, broken_fix: bool) -> Vec<PackageId> {
		(0..self.flags.len())
			.map(PackageId)
			.filter(|&p| self.depcache.package_broken(p, View::Future))
			.filter(|&p| {
				broken_fix
					|| self.depcache.states[p.0].mode != Mode::Keep
					|| !self.depcache.package_broken(p, View::Now)
			})
			.collect()
	}

	fn fix_package(&mut self, pkg: PackageId) -> bool {
		let Some(ver) = self.depcache.states[pkg.0].install_version else {
			return false;
		};
		let cache = self.depcache.cache();
		let mut changed = false;

		for (group, kind) in cache.graph().groups(ver.0) {
			if kind.is_negative() {
				for victim in self.depcache.conflict_victims(group, pkg, View::Future) {
					if self.favour_upgrades && self.is_pending_upgrade(victim) && self.can_remove(pkg)
						&& self.depcache.states[pkg.0].mode == Mode::Keep
					{
						log::debug!("Removing {} to upgrade {}", cache.package(pkg).full_name(), cache.package(victim).full_name());
						return self.give_up(pkg) || changed;
					}
					if self.can_change(victim) && self.push_aside(victim) {
						changed = true;
					} else {
						return self.give_up(pkg) || changed;
					}
				}
			} else if kind.is_hard() && !self.depcache.group_satisfied(group, View::Future) {
				if self.attempted.insert((pkg, group)) {
					let flags = &self.flags;
					let skip = |p: PackageId| flags[p.0].given_up || flags[p.0].to_remove;
					if let Some(target) = self.depcache.choose_alternative(group, &skip) {
						log::debug!("{} needs {}, installing {}", cache.package(pkg).full_name(), kind, cache.package(target).full_name());
						self.depcache.mark_install_inner(target, true, false, 0);
						if self.depcache.group_satisfied(group, View::Future) {
							changed = true;
							continue;
						}
					}
				}
				return self.give_up(pkg) || changed;
			}
		}
		changed
	}

	/// Undoes the change to a package blocking another one.
	fn push_aside(&mut self, victim: PackageId) -> bool {
		let has_current = self.depcache.cache().package(victim).current_version().is_some();
		match self.depcache.states[victim.0].mode {
			Mode::Install => {
				self.depcache.mark_keep_inner(victim, false);
				if !has_current {
					self.flags[victim.0].given_up = true;
				}
				true
			},
			Mode::Keep if has_current && self.can_remove(victim) => {
				self.depcache.mark_delete_inner(victim, false, false);
				self.flags[victim.0].given_up = true;
				true
			},
			_ => false,
		}
	}

	/// Makes a broken package give way, see the module docs.
	fn give_up(&mut self, pkg: PackageId) -> bool {
		if !self.can_change(pkg) {
			return false;
		}
		let name = self.depcache.cache().package(pkg).full_name();
		let has_current = self.depcache.cache().package(pkg).current_version().is_some();
		match self.depcache.states[pkg.0].mode {
			Mode::Install => {
				log::debug!("Keeping back {}", name);
				self.depcache.mark_keep_inner(pkg, false);
				if !has_current {
					self.flags[pkg.0].given_up = true;
				}
				true
			},
			Mode::Keep if has_current && self.can_remove(pkg) => {
				log::debug!("Removing broken {}", name);
				self.depcache.mark_delete_inner(pkg, false, false);
				self.flags[pkg.0].given_up = true;
				true
			},
			_ => false,
		}
	}

	/// Keeps back changes to the packages `pkg` depends or conflicts with.
	fn keep_blockers(&mut self, pkg: PackageId) -> bool {
		let Some(ver) = self.depcache.states[pkg.0].install_version else {
			return false;
		};
		let cache = self.depcache.cache();
		let mut changed = false;

		for (group, kind) in cache.graph().groups(ver.0) {
			let blockers: Vec<PackageId> = if kind.is_negative() {
				self.depcache.conflict_victims(group, pkg, View::Future)
			} else if kind.is_hard() && !self.depcache.group_satisfied(group, View::Future) {
				cache.graph().alternatives(group).into_iter()
					.map(|(t, _)| PackageId(cache.graph().package(t).index))
					.collect()
			} else {
				continue;
			};

			for b in blockers {
				if self.flags[b.0].protected || self.depcache.states[b.0].mode == Mode::Keep {
					continue;
				}
				self.depcache.mark_keep_inner(b, false);
				changed = true;
			}
		}
		changed
	}

	fn is_pending_upgrade(&self, pkg: PackageId) -> bool {
		self.depcache.states[pkg.0].mode == Mode::Install
			&& self.depcache.cache().package(pkg).current_version().is_some()
	}

	fn can_change(&self, pkg: PackageId) -> bool {
		!self.flags[pkg.0].protected
	}

	fn can_remove(&self, pkg: PackageId) -> bool {
		let package = self.depcache.cache().package(pkg);
		!self.flags[pkg.0].protected && !package.essential() && !self.depcache.is_held(pkg)
	}
}

impl<'c> DepCache<'c> {
	/// Repairs broken packages then keeps back upgrades nobody needs.
	///
	/// Returns `false` if some package stays broken.
	pub fn fix_broken(&mut self) -> bool {
		let fixed = ProblemResolver::new(self).resolve(true);
		fixed && self.minimize_upgrade()
	}

	/// Marks every upgradable package, see [`DepCache::all_upgrade()`] and [`DepCache::dist_upgrade()`].
	pub fn upgrade(&mut self, dist_upgrade: bool) -> bool {
		if dist_upgrade {
			self.dist_upgrade()
		} else {
			self.all_upgrade()
		}
	}

	/// Upgrades installed packages without installing or removing anything.
	///
	/// Upgrades that would need either are kept back. Fails without changes if the cache is
	/// already broken.
	pub fn all_upgrade(&mut self) -> bool {
		self.refresh();
		if self.broken_count() != 0 {
			log::info!("Not upgrading, {} packages are broken", self.broken_count());
			return false;
		}

		for i in 0..self.states.len() {
			let pkg = PackageId(i);
			if self.is_upgradable(pkg) && !self.is_held(pkg) {
				self.mark_install_inner(pkg, false, false, 0);
			}
		}

		ProblemResolver::new(self).resolve_by_keep()
	}

	/// Upgrades installed packages, installing new dependencies and removing packages in the way.
	///
	/// Missing essential packages are installed as well.
	pub fn dist_upgrade(&mut self) -> bool {
		let cache = self.cache();
		for i in 0..self.states.len() {
			let pkg = PackageId(i);
			let package = cache.package(pkg);
			if let Some(current) = package.current_version() {
				let s = &self.states[i];
				let changes = s.candidate.is_some_and(|c| c != current.id());
				if changes && s.mode != Mode::Delete && !self.is_held(pkg) {
					self.mark_install_inner(pkg, true, false, 0);
				}
			} else if package.essential() && self.states[i].candidate.is_some() {
				log::debug!("Installing missing essential package {}", package.full_name());
				self.mark_install_inner(pkg, true, false, 0);
			}
		}

		let mut resolver = ProblemResolver::new(self);
		resolver.favour_upgrades = true;
		resolver.resolve(true)
	}

	/// Keeps back pending upgrades that no other change depends on.
	///
	/// Upgrades requested explicitly are left alone. Fails without changes when something is broken.
	pub fn minimize_upgrade(&mut self) -> bool {
		self.refresh();
		if self.broken_count() != 0 {
			return false;
		}

		for _ in 0..10 {
			let mut changed = false;
			for i in 0..self.states.len() {
				let pkg = PackageId(i);
				let s = &self.states[i];
				if s.mode != Mode::Install || s.from_user || self.cache().package(pkg).current_version().is_none() {
					continue;
				}

				let saved = self.states[i].clone();
				self.mark_keep_inner(pkg, false);
				let breaks = std::iter::once(pkg)
					.chain(self.dependents_of(pkg))
					.any(|p| self.package_broken(p, View::Future));
				if breaks {
					self.states[i] = saved;
				} else {
					changed = true;
				}
			}
			if !changed {
				break;
			}
		}
		self.update();
		true
	}
}
