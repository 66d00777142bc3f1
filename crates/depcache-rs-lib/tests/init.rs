use depcache_rs_test_utils::*;

/* The process config can only be installed once, so this is a single test */
#[test]
fn init_once() {
	init_logging();
	let root = TestRoot::new().unwrap();
	root.status(&installed("foo", "1.0", "")).unwrap();

	assert!(matches!(depcache_rs::Cache::load(&mut depcache_rs::progress::NoProgress), Err(depcache_rs::Error::NotInitialized)));

	depcache_rs::init_with(root.config().clone()).unwrap();
	assert!(matches!(depcache_rs::init_with(root.config().clone()), Err(depcache_rs::Error::AlreadyInitialized)));
	depcache_rs::init().unwrap();
	depcache_rs::init().unwrap();
	assert_eq!(depcache_rs::config().unwrap(), root.config());

	let cache = depcache_rs::Cache::load(&mut depcache_rs::progress::NoProgress).unwrap();
	assert!(cache.lookup("foo").is_some());
}
