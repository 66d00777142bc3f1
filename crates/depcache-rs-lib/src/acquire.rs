//! Fetching repository indexes named by the sources list into the lists directory.
//!
//! Only binary `Packages` indexes are fetched, `Packages.gz` first with a fallback to the
//! uncompressed file. Indexes are written to `lists/partial` and moved into place once complete,
//! so a failed or cancelled fetch never leaves a truncated index behind.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use crate::progress::{AcquireProgress, AcquireStatus, FetchStatusCode};

const CHUNK_SIZE: usize = 16 * 1024;
/// Upper bound on the buffer reserved from a reported content length.
const MAX_PREALLOCATION: u64 = CHUNK_SIZE as u64 * 16;

/// One `deb` line of a sources list.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEntry {
	pub uri: String,
	/// Ends in `/` for flat repositories.
	pub suite: String,
	pub components: Vec<String>,
	/// From the `arch=` option, `None` for the native architecture.
	pub architectures: Option<Vec<String>>,
}

/// An index file to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexTarget {
	/// URI of the uncompressed index.
	pub uri: String,
	/// File name inside the lists directory.
	pub list_name: String,
	pub description: String,
	pub short_description: String,
}

/// Results of [`update_lists()`].
#[derive(Debug, Clone, Default)]
pub struct AcquireSummary {
	pub fetched: usize,
	/// Indexes that were already up to date.
	pub hits: usize,
	/// URI and reason of every index that couldn't be fetched.
	pub failed: Vec<(String, String)>,
}

/// Parses `deb [options] uri suite [component...]` lines, other line types are ignored.
pub fn parse_sources_list(text: &str) -> crate::Result<Vec<SourceEntry>> {
	let mut out = Vec::new();
	for (i, line) in text.lines().enumerate() {
		let line = line.split('#').next().unwrap_or_default().trim();
		if line.is_empty() {
			continue;
		}

		let (kind, mut rest) = line.split_once(char::is_whitespace)
			.ok_or_else(|| crate::Error::Parse(format!("sources line {}: missing URI", i + 1)))?;
		match kind {
			"deb" => {},
			"deb-src" => continue,
			other => return Err(crate::Error::Parse(format!("sources line {}: unknown type \"{}\"", i + 1, other))),
		}

		let mut architectures = None;
		rest = rest.trim_start();
		if let Some(options) = rest.strip_prefix('[') {
			let (options, after) = options.split_once(']')
				.ok_or_else(|| crate::Error::Parse(format!("sources line {}: unterminated options", i + 1)))?;
			for option in options.split_whitespace() {
				if let Some(archs) = option.strip_prefix("arch=") {
					architectures = Some(archs.split(',').map(str::to_string).collect());
				}
			}
			rest = after;
		}

		let mut words = rest.split_whitespace();
		let (Some(uri), Some(suite)) = (words.next(), words.next()) else {
			return Err(crate::Error::Parse(format!("sources line {}: expected URI and suite", i + 1)));
		};
		let components: Vec<String> = words.map(str::to_string).collect();
		if suite.ends_with('/') != components.is_empty() {
			return Err(crate::Error::Parse(format!("sources line {}: flat repositories take no components, others need one", i + 1)));
		}

		out.push(SourceEntry {
			uri: uri.trim_end_matches('/').to_string(),
			suite: suite.to_string(),
			components,
			architectures,
		});
	}
	Ok(out)
}

/// apt's list file naming, the URI without scheme and with `/` replaced by `_`.
pub fn uri_to_list_name(uri: &str) -> String {
	let without_scheme = match uri.split_once("://") {
		Some((_, r)) => r,
		None => uri.split_once(':').map(|(_, r)| r).unwrap_or(uri),
	};
	/* Drop any credentials */
	let without_user = match without_scheme.split_once('@') {
		Some((user, r)) if !user.contains('/') => r,
		_ => without_scheme,
	};
	without_user.replace('/', "_")
}

impl SourceEntry {
	pub fn index_targets(&self, native_arch: &str) -> Vec<IndexTarget> {
		let archs: Vec<&str> = match &self.architectures {
			Some(a) => a.iter().map(|s| s.as_str()).collect(),
			None => vec![native_arch],
		};

		if self.components.is_empty() {
			let dir = self.suite.trim_end_matches('/').trim_start_matches("./");
			let uri = if dir.is_empty() || dir == "." {
				format!("{}/Packages", self.uri)
			} else {
				format!("{}/{}/Packages", self.uri, dir)
			};
			return vec![IndexTarget {
				list_name: uri_to_list_name(&uri),
				description: format!("{} {} Packages", self.uri, self.suite),
				short_description: "Packages".to_string(),
				uri,
			}];
		}

		let mut out = Vec::new();
		for component in &self.components {
			for arch in &archs {
				let uri = format!("{}/dists/{}/{}/binary-{}/Packages", self.uri, self.suite, component, arch);
				out.push(IndexTarget {
					list_name: uri_to_list_name(&uri),
					description: format!("{} {}/{} {} Packages", self.uri, self.suite, component, arch),
					short_description: "Packages".to_string(),
					uri,
				});
			}
		}
		out
	}
}

/// Fetches every index of the configured sources list.
///
/// Failing to fetch an index is recorded in the summary and doesn't stop the others.
///
/// # Errors
/// - [`CancelledFetch`](crate::Error::CancelledFetch) when `progress` asks to stop. Indexes completed
/// before that are kept, the one in progress is discarded.
/// - [`IO`](crate::Error::IO) when reading the sources list or writing the lists directory fails.
/// - [`Parse`](crate::Error::Parse) for a malformed sources list.
pub fn update_lists(config: &crate::Config, progress: &mut dyn AcquireProgress) -> crate::Result<AcquireSummary> {
	let text = std::fs::read_to_string(config.sources_list())?;
	let targets: Vec<IndexTarget> = parse_sources_list(&text)?
		.iter()
		.flat_map(|s| s.index_targets(config.architecture()))
		.collect();

	let lists = config.lists_dir();
	std::fs::create_dir_all(lists.join("partial"))?;

	progress.start();
	for t in &targets {
		progress.update_status(&t.uri, &t.description, &t.short_description, FetchStatusCode::Queued);
	}

	let mut summary = AcquireSummary::default();
	let mut status = AcquireStatus { total_items: targets.len(), ..Default::default() };

	for (i, target) in targets.iter().enumerate() {
		status.current_items = i;
		match fetch_target(target, lists, &mut status, progress) {
			Ok(FetchStatusCode::Hit) => summary.hits += 1,
			Ok(_) => summary.fetched += 1,
			Err(crate::Error::CancelledFetch) => {
				log::info!("Fetch cancelled at {}", target.uri);
				progress.stop();
				return Err(crate::Error::CancelledFetch);
			},
			Err(e) => {
				progress.update_status(&target.uri, &target.description, &target.short_description, FetchStatusCode::Failed);
				summary.failed.push((target.uri.clone(), e.to_string()));
			},
		}
	}
	remove_stale_lists(lists, &targets);
	status.current_items = targets.len();
	progress.pulse(&status);
	progress.stop();
	Ok(summary)
}

fn fetch_target(target: &IndexTarget, lists: &Path, status: &mut AcquireStatus, progress: &mut dyn AcquireProgress) -> crate::Result<FetchStatusCode> {
	let compressed = format!("{}.gz", target.uri);
	let content = match download(&compressed, status, progress).and_then(|data| gunzip(&compressed, &data)) {
		Ok(data) => data,
		Err(crate::Error::CancelledFetch) => return Err(crate::Error::CancelledFetch),
		Err(e) => {
			log::debug!("{} unavailable ({}), trying uncompressed", compressed, e);
			progress.update_status(&compressed, &target.description, &target.short_description, FetchStatusCode::Ignored);
			download(&target.uri, status, progress)?
		},
	};

	let destination = lists.join(&target.list_name);
	if let Ok(existing) = std::fs::read(&destination) {
		if sha256::digest(existing.as_slice()) == sha256::digest(content.as_slice()) {
			progress.update_status(&target.uri, &target.description, &target.short_description, FetchStatusCode::Hit);
			return Ok(FetchStatusCode::Hit);
		}
	}

	let partial = lists.join("partial").join(&target.list_name);
	std::fs::write(&partial, &content)?;
	std::fs::rename(&partial, &destination)?;
	progress.update_status(&target.uri, &target.description, &target.short_description, FetchStatusCode::Done);
	Ok(FetchStatusCode::Done)
}

fn gunzip(uri: &str, data: &[u8]) -> crate::Result<Vec<u8>> {
	let mut out = Vec::new();
	flate2::read::GzDecoder::new(data).read_to_end(&mut out)
		.map_err(|e| crate::Error::Fetch { uri: uri.to_string(), reason: format!("bad gzip data: {}", e) })?;
	Ok(out)
}

/// Deletes index files no longer produced by any source.
fn remove_stale_lists(lists: &Path, targets: &[IndexTarget]) {
	let wanted: HashSet<&str> = targets.iter().map(|t| t.list_name.as_str()).collect();
	for path in crate::cache::list_files(lists) {
		let stale = path.file_name()
			.and_then(|n| n.to_str())
			.is_some_and(|n| !wanted.contains(n));
		if !stale {
			continue;
		}
		log::info!("Removing stale index {}", path.display());
		if let Err(e) = std::fs::remove_file(&path) {
			log::warn!("Failed to remove {}: {}", path.display(), e);
		}
	}
}

/// Reads `uri` into memory, pulsing after every chunk.
fn download(uri: &str, status: &mut AcquireStatus, progress: &mut dyn AcquireProgress) -> crate::Result<Vec<u8>> {
	let (mut reader, total): (Box<dyn Read>, u64) = if let Some(path) = uri.strip_prefix("file://").or_else(|| uri.strip_prefix("file:")) {
		let file = std::fs::File::open(path)?;
		let len = file.metadata()?.len();
		(Box::new(file), len)
	} else if uri.starts_with("http://") || uri.starts_with("https://") {
		let response = reqwest::blocking::get(uri)?.error_for_status()?;
		let len = response.content_length().unwrap_or(0);
		(Box::new(response), len)
	} else {
		return Err(crate::Error::Fetch { uri: uri.to_string(), reason: "unsupported URI scheme".to_string() });
	};

	status.current_bytes = 0;
	status.total_bytes = total;
	status.current_cps = 0.0;
	if !progress.pulse(status) {
		return Err(crate::Error::CancelledFetch);
	}

	let started = std::time::Instant::now();
	let mut data = Vec::with_capacity(total.min(MAX_PREALLOCATION) as usize);
	let mut buf = vec![0u8; CHUNK_SIZE];
	loop {
		let n = reader.read(&mut buf)?;
		if n == 0 {
			break;
		}
		data.extend_from_slice(&buf[..n]);
		status.current_bytes += n as u64;
		let elapsed = started.elapsed().as_secs_f64();
		if elapsed > 0.0 {
			status.current_cps = status.current_bytes as f64 / elapsed;
		}
		if !progress.pulse(status) {
			return Err(crate::Error::CancelledFetch);
		}
	}
	Ok(data)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sources_list_parsing() {
		let text = "# comment\ndeb [arch=amd64 trusted=yes] http://deb.debian.org/debian bookworm main contrib\ndeb-src http://deb.debian.org/debian bookworm main\ndeb file:///srv/repo ./\n";
		let s = parse_sources_list(text).unwrap();
		assert_eq!(s.len(), 2);
		assert_eq!(s[0].components, vec!["main", "contrib"]);
		assert_eq!(s[0].architectures, Some(vec!["amd64".to_string()]));
		assert_eq!(s[1].suite, "./");
	}

	#[test]
	fn flat_repository_needs_no_components() {
		assert!(parse_sources_list("deb http://example.org/repo stable/ main\n").is_err());
		assert!(parse_sources_list("deb http://example.org/repo stable\n").is_err());
	}

	#[test]
	fn targets_use_apt_list_names() {
		let s = &parse_sources_list("deb http://deb.debian.org/debian bookworm main\n").unwrap()[0];
		let t = s.index_targets("arm64");
		assert_eq!(t[0].uri, "http://deb.debian.org/debian/dists/bookworm/main/binary-arm64/Packages");
		assert_eq!(t[0].list_name, "deb.debian.org_debian_dists_bookworm_main_binary-arm64_Packages");
	}

	#[test]
	fn flat_target() {
		let s = &parse_sources_list("deb file:///srv/repo ./\n").unwrap()[0];
		let t = s.index_targets("amd64");
		assert_eq!(t[0].uri, "file:///srv/repo/Packages");
		assert_eq!(t[0].list_name, "_srv_repo_Packages");
	}

	#[test]
	fn credentials_are_dropped() {
		assert_eq!(uri_to_list_name("https://user:pw@example.org/a"), "example.org_a");
	}
}
