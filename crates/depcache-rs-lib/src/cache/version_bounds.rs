use serde::{Serialize, Deserialize};

use super::PackageVersion;

/// Version restriction attached to a relationship, e.g. the `(>= 1.2)` in `libc6 (>= 1.2)`.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub enum VersionBounds {
	#[default] Any,
	/// `=`
	Explicit(PackageVersion),
	/// `>=`
	MinOnly(PackageVersion),
	/// `<=`
	MaxOnly(PackageVersion),
	/// `>>`
	Above(PackageVersion),
	/// `<<`
	Below(PackageVersion),
}

impl VersionBounds {
	/// Builds bounds from a relation operator and version.
	///
	/// The obsolete `<` and `>` operators mean `<=` and `>=`.
	pub fn new(operator: &str, version: &str) -> crate::Result<VersionBounds> {
		let version = PackageVersion::new(version)?;
		match operator {
			"=" => Ok(VersionBounds::Explicit(version)),
			">=" | ">" => Ok(VersionBounds::MinOnly(version)),
			"<=" | "<" => Ok(VersionBounds::MaxOnly(version)),
			">>" => Ok(VersionBounds::Above(version)),
			"<<" => Ok(VersionBounds::Below(version)),
			_ => Err(crate::Error::Parse(format!("unknown version operator \"{}\"", operator))),
		}
	}

	pub fn is_version_within(&self, other: &PackageVersion) -> bool {
		match self {
			VersionBounds::Any => true,
			VersionBounds::Explicit(v) => other == v,
			VersionBounds::MinOnly(min) => other >= min,
			VersionBounds::MaxOnly(max) => other <= max,
			VersionBounds::Above(min) => other > min,
			VersionBounds::Below(max) => other < max,
		}
	}

	/// Checks a provided version against the bounds.
	///
	/// Unversioned provides only satisfy unversioned requirements.
	pub fn is_provide_within(&self, provided: Option<&PackageVersion>) -> bool {
		match (self, provided) {
			(VersionBounds::Any, _) => true,
			(_, None) => false,
			(b, Some(v)) => b.is_version_within(v),
		}
	}

	pub fn is_any(&self) -> bool {
		matches!(self, VersionBounds::Any)
	}
}

impl std::fmt::Display for VersionBounds {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			VersionBounds::Any => Ok(()),
			VersionBounds::Explicit(v) => write!(f, "(= {})", v),
			VersionBounds::MinOnly(v) => write!(f, "(>= {})", v),
			VersionBounds::MaxOnly(v) => write!(f, "(<= {})", v),
			VersionBounds::Above(v) => write!(f, "(>> {})", v),
			VersionBounds::Below(v) => write!(f, "(<< {})", v),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn v(s: &str) -> PackageVersion { PackageVersion::new(s).unwrap() }

	#[test] fn strictly_above_excludes_bound() { assert!(!VersionBounds::new(">>", "1.0").unwrap().is_version_within(&v("1.0"))) }
	#[test] fn min_includes_bound() { assert!(VersionBounds::new(">=", "1.0").unwrap().is_version_within(&v("1.0"))) }
	#[test] fn legacy_less_is_less_equal() { assert_eq!(VersionBounds::new("<", "2").unwrap(), VersionBounds::MaxOnly(v("2"))) }
	#[test] fn below_respects_tilde() { assert!(VersionBounds::new("<<", "2.0").unwrap().is_version_within(&v("2.0~beta"))) }
	#[test] fn unversioned_provide_fails_versioned_bound() { assert!(!VersionBounds::new("=", "1").unwrap().is_provide_within(None)) }
	#[test] fn unknown_operator_is_error() { assert!(VersionBounds::new("!=", "1").is_err()) }
}
