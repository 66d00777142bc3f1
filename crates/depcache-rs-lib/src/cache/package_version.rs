use serde::{Serialize, Deserialize};

/// A Debian version string `[epoch:]upstream[-revision]`.
///
/// Ordering follows dpkg: epochs compare numerically, then upstream and revision are compared
/// with alternating non-digit and digit runs where `~` sorts before everything, even the end
/// of the string, and letters sort before other characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageVersion {
	epoch: u32,
	upstream: String,
	revision: String,
}

impl PackageVersion {
	pub fn new(version: &str) -> crate::Result<Self> {
		let version = version.trim();
		if version.is_empty() {
			return Err(crate::Error::Parse("empty version string".to_string()));
		}

		let (epoch, rest) = match version.split_once(':') {
			Some((e, rest)) => {
				let epoch = e.parse::<u32>().map_err(|_| crate::Error::Parse(format!("invalid epoch in version \"{}\"", version)))?;
				(epoch, rest)
			},
			None => (0, version),
		};

		let (upstream, revision) = match rest.rsplit_once('-') {
			Some((u, r)) => (u, r),
			None => (rest, ""),
		};

		if upstream.is_empty() {
			return Err(crate::Error::Parse(format!("version \"{}\" has no upstream part", version)));
		}
		if !upstream.starts_with(|c: char| c.is_ascii_digit()) {
			/* dpkg only warns about this so we do too */
			log::trace!("version \"{}\" does not start with a digit", version);
		}

		Ok(PackageVersion {
			epoch,
			upstream: upstream.to_string(),
			revision: revision.to_string(),
		})
	}

	pub fn epoch(&self) -> u32 {
		self.epoch
	}

	pub fn upstream(&self) -> &str {
		&self.upstream
	}

	pub fn revision(&self) -> &str {
		&self.revision
	}
}

impl std::str::FromStr for PackageVersion {
	type Err = crate::Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> { Self::new(s) }
}

/// Weight of a single character in a non-digit run.
fn order(c: Option<u8>) -> i32 {
	match c {
		None => 0,
		Some(c) if c.is_ascii_digit() => 0,
		Some(c) if c.is_ascii_alphabetic() => c as i32,
		Some(b'~') => -1,
		Some(c) => c as i32 + 256,
	}
}

fn compare_fragment(a: &str, b: &str) -> std::cmp::Ordering {
	let a = a.as_bytes();
	let b = b.as_bytes();
	let (mut i, mut j) = (0, 0);

	while i < a.len() || j < b.len() {
		while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
			let ac = order(a.get(i).copied());
			let bc = order(b.get(j).copied());
			if ac != bc {
				return ac.cmp(&bc);
			}
			i += 1;
			j += 1;
		}

		while i < a.len() && a[i] == b'0' { i += 1; }
		while j < b.len() && b[j] == b'0' { j += 1; }

		let mut first_diff = std::cmp::Ordering::Equal;
		while i < a.len() && a[i].is_ascii_digit() && j < b.len() && b[j].is_ascii_digit() {
			if first_diff == std::cmp::Ordering::Equal {
				first_diff = a[i].cmp(&b[j]);
			}
			i += 1;
			j += 1;
		}

		if i < a.len() && a[i].is_ascii_digit() {
			return std::cmp::Ordering::Greater;
		}
		if j < b.len() && b[j].is_ascii_digit() {
			return std::cmp::Ordering::Less;
		}
		if first_diff != std::cmp::Ordering::Equal {
			return first_diff;
		}
	}
	std::cmp::Ordering::Equal
}

impl Ord for PackageVersion {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.epoch.cmp(&other.epoch)
			.then_with(|| compare_fragment(&self.upstream, &other.upstream))
			.then_with(|| compare_fragment(&self.revision, &other.revision))
	}
}

impl PartialOrd for PackageVersion {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

/* Equality is dpkg equality so "1.0" == "1.00" == "0:1.0" */
impl PartialEq for PackageVersion {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == std::cmp::Ordering::Equal
	}
}

impl Eq for PackageVersion {}

impl std::fmt::Display for PackageVersion {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.epoch != 0 {
			write!(f, "{}:", self.epoch)?;
		}
		write!(f, "{}", self.upstream)?;
		if !self.revision.is_empty() {
			write!(f, "-{}", self.revision)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn v(s: &str) -> PackageVersion { PackageVersion::new(s).unwrap() }

	#[test] fn version_are_not_compared_lexically() { assert!(v("1.2.4") < v("1.2.10")) }
	#[test] fn version_short_version_is_lt() { assert!(v("1.2") < v("1.2.3")) }
	#[test] fn version_identical_are_eq() { assert!(v("1.2.3-1") == v("1.2.3-1")) }
	#[test] fn version_leading_zeros_are_eq() { assert!(v("1.002") == v("1.2")) }
	#[test] fn version_zero_epoch_is_implicit() { assert!(v("0:1.0") == v("1.0")) }
	#[test] fn version_epoch_is_respected() { assert!(v("9.9") < v("1:0.1")) }
	#[test] fn version_tilde_sorts_before_release() { assert!(v("1.0~rc1") < v("1.0")) }
	#[test] fn version_tilde_sorts_before_tilde_tilde() { assert!(v("1.0~~") < v("1.0~")) }
	#[test] fn version_letters_before_symbols() { assert!(v("1.0a") < v("1.0+")) }
	#[test] fn version_revision_is_compared() { assert!(v("1.0-1") < v("1.0-2")) }
	#[test] fn version_revision_numeric() { assert!(v("1.0-9") < v("1.0-10")) }
	#[test] fn version_hyphen_in_upstream() { assert_eq!(v("1.0-beta-2").upstream(), "1.0-beta") }
	#[test] fn version_display_round_trips() { assert_eq!(v("2:1.0~rc1-3").to_string(), "2:1.0~rc1-3") }
	#[test] fn version_bad_epoch_is_error() { assert!(PackageVersion::new("x:1.0").is_err()) }
	#[test] fn version_empty_is_error() { assert!(PackageVersion::new("").is_err()) }
}
