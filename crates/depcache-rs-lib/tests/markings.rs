use depcache_rs::{Cache, DepCache, PackageId};
use depcache_rs::progress::NoProgress;
use depcache_rs_test_utils::*;

fn id(cache: &Cache, name: &str) -> PackageId {
	cache.lookup(name).unwrap().id()
}

fn root(status: &str, index: &str) -> TestRoot {
	init_logging();
	let root = TestRoot::new().unwrap();
	root.status(status).unwrap();
	root.index("stable", index).unwrap();
	root
}

#[test]
fn upgrade_marking() {
	let root = root(&installed("foo", "1.0", ""), &(available("foo", "1.0", "") + &available("foo", "2.0", "")));
	let cache = root.cache().unwrap();
	let mut depcache = DepCache::attach(&cache, &mut NoProgress);
	let foo = id(&cache, "foo");

	assert!(depcache.is_upgradable(foo));
	assert_eq!(depcache.candidate_version(foo).unwrap().ver_str(), "2.0");
	assert_eq!(depcache.keep_count(), 1);

	depcache.mark_install(foo);
	assert!(depcache.marked_upgrade(foo));
	assert!(!depcache.marked_install(foo));
	assert!(!depcache.marked_downgrade(foo));
	assert!(!depcache.is_upgradable(foo));
	assert_eq!(depcache.install_version(foo).unwrap().ver_str(), "2.0");
	assert_eq!(depcache.upgrade_count(), 1);
	assert_eq!(depcache.inst_count(), 0);
	assert_eq!(depcache.keep_count(), 0);
	assert_eq!(depcache.usr_size(), 0);
	assert_eq!(depcache.deb_size(), 1000);
}

#[test]
fn keep_undoes_install() {
	let root = root(&installed("foo", "1.0", ""), &available("baz", "1.0", ""));
	let cache = root.cache().unwrap();
	let mut depcache = DepCache::attach(&cache, &mut NoProgress);
	let baz = id(&cache, "baz");
	let before = depcache.counts();

	depcache.mark_install(baz);
	assert!(depcache.marked_install(baz));
	assert!(!depcache.is_auto_installed(baz));
	assert_eq!(depcache.inst_count(), 1);
	assert_eq!(depcache.usr_size(), 10 * 1024);
	assert_eq!(depcache.deb_size(), 1000);
	assert_eq!(depcache_rs::size_to_string(depcache.usr_size() as f64), "10.2 kB");

	depcache.mark_keep(baz);
	assert!(depcache.marked_keep(baz));
	assert_eq!(depcache.counts(), before);
}

#[test]
fn markings_are_exclusive() {
	let root = root(
		&(installed("foo", "1.0", "") + &installed("gone", "1.0", "")),
		&(available("foo", "2.0", "") + &available("baz", "1.0", "Depends: qux") + &available("qux", "1.0", "")),
	);
	let cache = root.cache().unwrap();
	let mut depcache = DepCache::attach(&cache, &mut NoProgress);
	depcache.mark_install(id(&cache, "foo"));
	depcache.mark_install(id(&cache, "baz"));
	depcache.mark_delete(id(&cache, "gone"));

	for p in cache.packages() {
		let p = p.id();
		let states = [depcache.marked_install(p), depcache.marked_upgrade(p), depcache.marked_delete(p), depcache.marked_keep(p)];
		assert_eq!(states.iter().filter(|s| **s).count(), 1, "{:?}", cache.package(p));
	}
	assert_eq!(depcache.inst_count(), 2);
	assert_eq!(depcache.upgrade_count(), 1);
	assert_eq!(depcache.del_count(), 1);
}

#[test]
fn install_pulls_dependencies() {
	let root = root(
		&installed("lib", "0.9", ""),
		&(available("app", "1.0", "Depends: lib (>= 1.0), helper | other") + &available("lib", "1.0", "") + &available("helper", "1.0", "") + &available("other", "1.0", "")),
	);
	let cache = root.cache().unwrap();
	let mut depcache = DepCache::attach(&cache, &mut NoProgress);
	let (app, lib, helper, other) = (id(&cache, "app"), id(&cache, "lib"), id(&cache, "helper"), id(&cache, "other"));

	depcache.mark_install(app);
	assert!(depcache.marked_install(app));
	assert!(depcache.marked_upgrade(lib));
	assert!(depcache.marked_install(helper));
	assert!(depcache.is_auto_installed(helper));
	assert!(depcache.marked_keep(other));
	assert_eq!(depcache.broken_count(), 0);
}

#[test]
fn install_without_auto_inst_leaves_broken() {
	let root = root("", &(available("app", "1.0", "Depends: lib") + &available("lib", "1.0", "")));
	let cache = root.cache().unwrap();
	let mut depcache = DepCache::attach(&cache, &mut NoProgress);
	let app = id(&cache, "app");

	depcache.mark_install_with(app, false, true);
	assert!(depcache.is_inst_broken(app));
	assert!(!depcache.is_now_broken(app));
	assert_eq!(depcache.broken_count(), 1);
}

#[test]
fn virtual_dependency_uses_provider() {
	let root = root("", &(available("app", "1.0", "Depends: mail-transport-agent") + &available("postfix", "3.0", "Provides: mail-transport-agent")));
	let cache = root.cache().unwrap();
	let mut depcache = DepCache::attach(&cache, &mut NoProgress);

	depcache.mark_install(id(&cache, "app"));
	assert!(depcache.marked_install(id(&cache, "postfix")));
	assert_eq!(depcache.broken_count(), 0);
}

#[test]
fn install_removes_conflicting() {
	let root = root(&installed("old-mta", "1.0", ""), &available("new-mta", "1.0", "Conflicts: old-mta"));
	let cache = root.cache().unwrap();
	let mut depcache = DepCache::attach(&cache, &mut NoProgress);

	depcache.mark_install(id(&cache, "new-mta"));
	assert!(depcache.marked_delete(id(&cache, "old-mta")));
	assert_eq!(depcache.broken_count(), 0);
	assert_eq!(depcache.usr_size(), 0);
}

#[test]
fn essential_conflict_is_left_broken() {
	let root = root(&installed("old-mta", "1.0", "Essential: yes"), &available("new-mta", "1.0", "Conflicts: old-mta"));
	let cache = root.cache().unwrap();
	let mut depcache = DepCache::attach(&cache, &mut NoProgress);
	let new = id(&cache, "new-mta");

	depcache.mark_install(new);
	assert!(depcache.marked_keep(id(&cache, "old-mta")));
	assert!(depcache.is_inst_broken(new));
}

#[test]
fn garbage_detection() {
	let root = root(
		&(installed("app", "1.0", "Depends: lib") + &installed("lib", "1.0", "") + &installed("orphan", "1.0", "")),
		"",
	);
	root.extended_states("Package: lib\nArchitecture: amd64\nAuto-Installed: 1\n\nPackage: orphan\nArchitecture: amd64\nAuto-Installed: 1\n").unwrap();
	let cache = root.cache().unwrap();
	let mut depcache = DepCache::attach(&cache, &mut NoProgress);
	let (app, lib, orphan) = (id(&cache, "app"), id(&cache, "lib"), id(&cache, "orphan"));

	assert!(depcache.is_auto_installed(lib));
	assert!(!depcache.is_garbage(app));
	assert!(!depcache.is_garbage(lib));
	assert!(depcache.is_garbage(orphan));

	depcache.mark_delete(app);
	assert!(depcache.is_garbage(lib));

	depcache.mark_keep(app);
	depcache.mark_auto(orphan, false);
	assert!(!depcache.is_garbage(lib));
	assert!(!depcache.is_garbage(orphan));
}

#[test]
fn action_group_defers_counts() {
	let root = root("", &(available("a", "1.0", "") + &available("b", "1.0", "")));
	let cache = root.cache().unwrap();
	let mut depcache = DepCache::attach(&cache, &mut NoProgress);
	let (a, b) = (id(&cache, "a"), id(&cache, "b"));

	{
		let mut group = depcache.action_group();
		group.mark_install(a);
		group.mark_install(b);
		assert!(group.marked_install(a));
		assert_eq!(group.inst_count(), 0);
	}
	assert_eq!(depcache.inst_count(), 2);

	let group = depcache.action_group();
	group.release();
	assert_eq!(depcache.inst_count(), 2);
}

#[test]
fn candidate_override() {
	let root = root(&installed("foo", "1.0", ""), &(available("foo", "1.5", "") + &available("foo", "2.0", "")));
	let cache = root.cache().unwrap();
	let mut depcache = DepCache::attach(&cache, &mut NoProgress);
	let foo = id(&cache, "foo");
	let older = cache.package(foo).versions().find(|v| v.ver_str() == "1.5").unwrap().id();

	depcache.mark_install(foo);
	depcache.set_candidate_version(older);
	assert_eq!(depcache.candidate_version(foo).unwrap().ver_str(), "1.5");
	assert_eq!(depcache.install_version(foo).unwrap().ver_str(), "1.5");
	assert!(depcache.marked_upgrade(foo));
	assert!(!depcache.is_upgradable(foo));

	depcache.init(&mut NoProgress);
	assert!(depcache.marked_keep(foo));
	assert_eq!(depcache.candidate_version(foo).unwrap().ver_str(), "2.0");
}

#[test]
fn candidate_set_to_installed_version_cancels_upgrade() {
	let root = root(&installed("foo", "1.0", ""), &(available("foo", "1.0", "") + &available("foo", "2.0", "")));
	let cache = root.cache().unwrap();
	let mut depcache = DepCache::attach(&cache, &mut NoProgress);
	let foo = id(&cache, "foo");
	let current = cache.package(foo).current_version().unwrap().id();

	depcache.mark_install(foo);
	assert_eq!(depcache.upgrade_count(), 1);

	depcache.set_candidate_version(current);
	assert!(depcache.marked_keep(foo));
	assert!(!depcache.marked_upgrade(foo));
	assert_eq!(depcache.install_version(foo).unwrap().ver_str(), "1.0");
	assert_eq!(depcache.upgrade_count(), 0);
	assert_eq!(depcache.keep_count(), 0);
}

#[test]
fn reinstall_and_purge() {
	let root = root(&(installed("foo", "1.0", "") + &installed("local", "1.0", "")), &available("foo", "1.0", ""));
	let cache = root.cache().unwrap();
	let mut depcache = DepCache::attach(&cache, &mut NoProgress);
	let (foo, local) = (id(&cache, "foo"), id(&cache, "local"));

	depcache.set_reinstall(foo, true);
	assert!(depcache.marked_reinstall(foo));
	assert_eq!(depcache.deb_size(), 1000);

	/* Not available from any repository */
	depcache.set_reinstall(local, true);
	assert!(!depcache.marked_reinstall(local));

	depcache.mark_delete_with(foo, true);
	assert!(depcache.marked_purge(foo));
	assert!(!depcache.marked_reinstall(foo));
	assert_eq!(depcache.usr_size(), -10 * 1024);
}

#[test]
fn init_is_idempotent() {
	let root = root(
		&(installed("foo", "1.0", "") + &installed("bar", "1.0", "Depends: missing")),
		&(available("foo", "2.0", "") + &available("baz", "1.0", "")),
	);
	let cache = root.cache().unwrap();
	let mut depcache = DepCache::attach(&cache, &mut NoProgress);
	depcache.mark_install(id(&cache, "baz"));
	depcache.mark_delete(id(&cache, "foo"));

	depcache.init(&mut NoProgress);
	let counts = depcache.counts();
	let markings: Vec<_> = cache.packages().map(|p| depcache.marking(p.id())).collect();

	depcache.init(&mut NoProgress);
	assert_eq!(depcache.counts(), counts);
	assert_eq!(cache.packages().map(|p| depcache.marking(p.id())).collect::<Vec<_>>(), markings);
	assert_eq!(depcache.broken_count(), 1);
	assert_eq!(depcache.inst_count(), 0);
}

#[test]
fn init_reports_progress() {
	let root = root(&installed("foo", "1.0", ""), "");
	let cache = root.cache().unwrap();
	let mut seen = Vec::new();
	let mut done = 0;
	{
		let mut progress = depcache_rs::progress::FnProgress(|p: Option<f32>| match p {
			Some(p) => seen.push(p),
			None => done += 1,
		});
		DepCache::attach(&cache, &mut progress);
	}
	assert_eq!(done, 1);
	assert!(seen.windows(2).all(|w| w[0] <= w[1]));
	assert!(seen.iter().all(|p| (0.0..=100.0).contains(p)));
}
