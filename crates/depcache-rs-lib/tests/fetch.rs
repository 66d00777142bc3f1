use depcache_rs::acquire::{update_lists, uri_to_list_name};
use depcache_rs::progress::{AcquireProgress, AcquireStatus, FetchStatusCode};
use depcache_rs_test_utils::*;

#[derive(Default)]
struct Recorder {
	statuses: Vec<(String, FetchStatusCode)>,
	pulses: usize,
	/// Cancel once this many pulses were seen.
	cancel_after: Option<usize>,
	started: bool,
	stopped: bool,
}

impl AcquireProgress for Recorder {
	fn start(&mut self) {
		self.started = true;
	}

	fn update_status(&mut self, uri: &str, _description: &str, _short_description: &str, status: FetchStatusCode) {
		self.statuses.push((uri.to_string(), status));
	}

	fn pulse(&mut self, status: &AcquireStatus) -> bool {
		assert!(status.total_bytes == 0 || status.current_bytes <= status.total_bytes);
		self.pulses += 1;
		self.cancel_after.map_or(true, |n| self.pulses <= n)
	}

	fn stop(&mut self) {
		self.stopped = true;
	}
}

fn repo_uri(root: &TestRoot) -> String {
	format!("file://{}/repo", root.path().display())
}

fn index_uri(root: &TestRoot) -> String {
	format!("{}/dists/stable/main/binary-amd64/Packages", repo_uri(root))
}

#[test]
fn fetch_compressed_index() {
	init_logging();
	let root = TestRoot::new().unwrap();
	root.write_gz("repo/dists/stable/main/binary-amd64/Packages.gz", &available("remote", "1.0", "")).unwrap();
	root.sources(&format!("deb {} stable main\n", repo_uri(&root))).unwrap();

	let mut progress = Recorder::default();
	let summary = update_lists(root.config(), &mut progress).unwrap();
	assert_eq!(summary.fetched, 1);
	assert_eq!(summary.hits, 0);
	assert!(summary.failed.is_empty());
	assert!(progress.started && progress.stopped);
	assert!(progress.pulses > 0);
	assert_eq!(progress.statuses.first(), Some(&(index_uri(&root), FetchStatusCode::Queued)));
	assert_eq!(progress.statuses.last(), Some(&(index_uri(&root), FetchStatusCode::Done)));

	let list = root.config().lists_dir().join(uri_to_list_name(&index_uri(&root)));
	assert!(list.exists());
	let cache = root.cache().unwrap();
	assert!(cache.lookup("remote").unwrap().versions().next().unwrap().is_downloadable());

	let mut progress = Recorder::default();
	let summary = update_lists(root.config(), &mut progress).unwrap();
	assert_eq!(summary.fetched, 0);
	assert_eq!(summary.hits, 1);
	assert_eq!(progress.statuses.last(), Some(&(index_uri(&root), FetchStatusCode::Hit)));
}

#[test]
fn uncompressed_fallback() {
	init_logging();
	let root = TestRoot::new().unwrap();
	std::fs::create_dir_all(root.path().join("repo")).unwrap();
	std::fs::write(root.path().join("repo/Packages"), available("flat", "1.0", "")).unwrap();
	root.sources(&format!("deb {} ./\n", repo_uri(&root))).unwrap();

	let mut progress = Recorder::default();
	let summary = update_lists(root.config(), &mut progress).unwrap();
	assert_eq!(summary.fetched, 1);

	let uri = format!("{}/Packages", repo_uri(&root));
	let codes: Vec<FetchStatusCode> = progress.statuses.iter().map(|(_, c)| *c).collect();
	assert_eq!(codes, vec![FetchStatusCode::Queued, FetchStatusCode::Ignored, FetchStatusCode::Done]);
	assert_eq!(progress.statuses[1].0, format!("{}.gz", uri));
	assert!(root.cache().unwrap().lookup("flat").is_some());
}

#[test]
fn cancelled_fetch_keeps_old_lists() {
	init_logging();
	let root = TestRoot::new().unwrap();
	root.write_gz("repo/dists/stable/main/binary-amd64/Packages.gz", &available("remote", "2.0", "")).unwrap();
	root.sources(&format!("deb {} stable main\n", repo_uri(&root))).unwrap();

	let list = root.config().lists_dir().join(uri_to_list_name(&index_uri(&root)));
	let old = available("remote", "1.0", "");
	std::fs::write(&list, &old).unwrap();

	let mut progress = Recorder { cancel_after: Some(0), ..Default::default() };
	assert!(matches!(update_lists(root.config(), &mut progress), Err(depcache_rs::Error::CancelledFetch)));
	assert!(progress.stopped);
	assert_eq!(std::fs::read_to_string(&list).unwrap(), old);
}

#[test]
fn unreachable_repository() {
	init_logging();
	let root = TestRoot::new().unwrap();
	root.sources(&format!("deb {} stable main\n", repo_uri(&root))).unwrap();

	let mut progress = Recorder::default();
	let summary = update_lists(root.config(), &mut progress).unwrap();
	assert_eq!(summary.fetched, 0);
	assert_eq!(summary.failed.len(), 1);
	assert_eq!(summary.failed[0].0, index_uri(&root));
	assert_eq!(progress.statuses.last(), Some(&(index_uri(&root), FetchStatusCode::Failed)));
}

#[test]
fn corrupt_compressed_index_falls_back() {
	init_logging();
	let root = TestRoot::new().unwrap();
	let dir = root.path().join("repo/dists/stable/main/binary-amd64");
	std::fs::create_dir_all(&dir).unwrap();
	std::fs::write(dir.join("Packages.gz"), b"this is not gzip").unwrap();
	std::fs::write(dir.join("Packages"), available("plain", "1.0", "")).unwrap();
	root.sources(&format!("deb {} stable main\n", repo_uri(&root))).unwrap();

	let mut progress = Recorder::default();
	let summary = update_lists(root.config(), &mut progress).unwrap();
	assert_eq!(summary.fetched, 1);
	assert!(summary.failed.is_empty());
	let codes: Vec<FetchStatusCode> = progress.statuses.iter().map(|(_, c)| *c).collect();
	assert_eq!(codes, vec![FetchStatusCode::Queued, FetchStatusCode::Ignored, FetchStatusCode::Done]);
	assert!(root.cache().unwrap().lookup("plain").is_some());
}

#[test]
fn removed_source_lists_are_deleted() {
	init_logging();
	let root = TestRoot::new().unwrap();
	root.write_gz("a/dists/stable/main/binary-amd64/Packages.gz", &available("froma", "1.0", "")).unwrap();
	root.write_gz("b/dists/stable/main/binary-amd64/Packages.gz", &available("fromb", "1.0", "")).unwrap();
	let source = |name: &str| format!("deb file://{}/{} stable main\n", root.path().display(), name);

	root.sources(&(source("a") + &source("b"))).unwrap();
	let summary = update_lists(root.config(), &mut Recorder::default()).unwrap();
	assert_eq!(summary.fetched, 2);
	assert!(root.cache().unwrap().lookup("fromb").is_some());

	root.sources(&source("a")).unwrap();
	let summary = update_lists(root.config(), &mut Recorder::default()).unwrap();
	assert_eq!(summary.hits, 1);
	let b_list = format!("file://{}/b/dists/stable/main/binary-amd64/Packages", root.path().display());
	assert!(!root.config().lists_dir().join(uri_to_list_name(&b_list)).exists());

	let cache = root.cache().unwrap();
	assert!(cache.lookup("froma").is_some());
	assert!(cache.lookup("fromb").is_none());
}

#[test]
fn oversized_content_length_fails_cleanly() {
	use std::io::{Read, Write};

	init_logging();
	let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
	let port = listener.local_addr().unwrap().port();
	std::thread::spawn(move || {
		/* Packages.gz then the uncompressed fallback */
		for stream in listener.incoming().take(2) {
			let Ok(mut stream) = stream else { continue };
			let mut request = [0u8; 4096];
			let _ = stream.read(&mut request);
			let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000000000000000000\r\nConnection: close\r\n\r\nPackage: x\n");
		}
	});

	let root = TestRoot::new().unwrap();
	root.sources(&format!("deb http://127.0.0.1:{}/debian stable main\n", port)).unwrap();

	let mut progress = Recorder::default();
	let summary = update_lists(root.config(), &mut progress).unwrap();
	assert_eq!(summary.fetched, 0);
	assert_eq!(summary.failed.len(), 1);
	assert_eq!(progress.statuses.last().map(|(_, c)| *c), Some(FetchStatusCode::Failed));
}
