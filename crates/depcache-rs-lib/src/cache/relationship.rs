use serde::{Serialize, Deserialize};
use super::*;

/// The kinds of relationship a version can have on other packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepKind {
	PreDepends,
	Depends,
	Recommends,
	Suggests,
	Conflicts,
	Breaks,
}

impl DepKind {
	pub const ALL: [DepKind; 6] = [DepKind::PreDepends, DepKind::Depends, DepKind::Recommends, DepKind::Suggests, DepKind::Conflicts, DepKind::Breaks];

	/// The control field this kind is read from.
	pub fn field(&self) -> &'static str {
		match self {
			DepKind::PreDepends => "Pre-Depends",
			DepKind::Depends => "Depends",
			DepKind::Recommends => "Recommends",
			DepKind::Suggests => "Suggests",
			DepKind::Conflicts => "Conflicts",
			DepKind::Breaks => "Breaks",
		}
	}

	/// Relationships that must *not* be satisfied.
	pub fn is_negative(&self) -> bool {
		matches!(self, DepKind::Conflicts | DepKind::Breaks)
	}

	/// Hard dependencies which have to be installed.
	pub fn is_hard(&self) -> bool {
		matches!(self, DepKind::PreDepends | DepKind::Depends)
	}
}

impl std::fmt::Display for DepKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.field())
	}
}

/// Describes a package using a name and version requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
	pub name: String,
	/// Explicit architecture qualifier, `None` for the native architecture or `:any`.
	pub arch: Option<String>,
	pub version: VersionBounds,
}

impl PackageDescriptor {
	pub fn new(name: String, version: VersionBounds) -> Self {
		Self { name, arch: None, version }
	}

	/// Parses `name[:arch] [(op version)] [[arch list]] [<profiles>]`.
	///
	/// Architecture lists and build profiles only restrict source packages and are dropped.
	pub fn parse(s: &str) -> crate::Result<Self> {
		let stripped = strip_restrictions(s);
		let (name_part, constraint) = match stripped.split_once('(') {
			Some((n, c)) => {
				let c = c.trim_end().strip_suffix(')')
					.ok_or_else(|| crate::Error::Parse(format!("unterminated version constraint in \"{}\"", s)))?;
				(n.trim(), Some(c.trim()))
			},
			None => (stripped.trim(), None),
		};

		if name_part.is_empty() || name_part.contains(char::is_whitespace) {
			return Err(crate::Error::Parse(format!("invalid package name in relationship \"{}\"", s)));
		}

		let (name, arch) = match name_part.split_once(':') {
			Some((n, "any" | "native")) => (n, None),
			Some((n, a)) => (n, Some(a.to_string())),
			None => (name_part, None),
		};

		let version = match constraint {
			None => VersionBounds::Any,
			Some(c) => {
				let split = c.find(|ch: char| !matches!(ch, '<' | '>' | '=')).unwrap_or(c.len());
				let (op, ver) = c.split_at(split);
				if op.is_empty() {
					return Err(crate::Error::Parse(format!("missing operator in \"{}\"", s)));
				}
				VersionBounds::new(op, ver.trim())?
			},
		};

		Ok(Self { name: name.to_string(), arch, version })
	}
}

impl std::fmt::Display for PackageDescriptor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name)?;
		if let Some(arch) = &self.arch {
			write!(f, ":{}", arch)?;
		}
		if !self.version.is_any() {
			write!(f, " {}", self.version)?;
		}
		Ok(())
	}
}

fn strip_restrictions(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	let mut skip_until: Option<char> = None;
	let mut in_constraint = false;
	for c in s.chars() {
		if let Some(end) = skip_until {
			if c == end { skip_until = None; }
			continue;
		}
		match c {
			'(' => { in_constraint = true; out.push(c) },
			')' => { in_constraint = false; out.push(c) },
			/* '<' inside a constraint is an operator */
			'[' if !in_constraint => skip_until = Some(']'),
			'<' if !in_constraint => skip_until = Some('>'),
			_ => out.push(c),
		}
	}
	out
}

/// A single comma separated entry of a relationship field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Relationship {
	/// At least one of the descriptors must match to fulfill the relationship.
	AnyOf(Vec<PackageDescriptor>),
	/// This single descriptor requirement must be met.
	One(PackageDescriptor),
}

impl Relationship {
	/// Convienience function to collapse this relationship into a vector
	pub fn as_vec(&self) -> Vec<&PackageDescriptor> {
		match self {
			Relationship::AnyOf(v) => v.iter().collect::<Vec<_>>(),
			Relationship::One(r) => vec![r],
		}
	}
}

/// Parses a whole relationship field such as `Depends`.
pub fn parse_relationships(field: &str) -> crate::Result<Vec<Relationship>> {
	let mut out = Vec::new();
	for entry in field.split(',') {
		let entry = entry.trim();
		if entry.is_empty() {
			continue;
		}
		let mut alternatives = entry.split('|')
			.map(PackageDescriptor::parse)
			.collect::<crate::Result<Vec<_>>>()?;
		if alternatives.len() == 1 {
			out.push(Relationship::One(alternatives.remove(0)));
		} else {
			out.push(Relationship::AnyOf(alternatives));
		}
	}
	Ok(out)
}

/// Parses a `Provides` field, provided versions must be exact.
pub fn parse_provides(field: &str) -> crate::Result<Vec<(String, Option<PackageVersion>)>> {
	let mut out = Vec::new();
	for entry in field.split(',') {
		let entry = entry.trim();
		if entry.is_empty() {
			continue;
		}
		let d = PackageDescriptor::parse(entry)?;
		let version = match d.version {
			VersionBounds::Any => None,
			VersionBounds::Explicit(v) => Some(v),
			_ => return Err(crate::Error::Parse(format!("provides \"{}\" must use '='", entry))),
		};
		out.push((d.name, version));
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_alternatives_with_restrictions() {
		let r = parse_relationships("a (>= 1.0) | b:any [amd64 i386] <!nocheck>, c:i386, d (<< 2)").unwrap();
		assert_eq!(r.len(), 3);
		match &r[0] {
			Relationship::AnyOf(v) => {
				assert_eq!(v[0].name, "a");
				assert_eq!(v[0].version, VersionBounds::MinOnly(PackageVersion::new("1.0").unwrap()));
				assert_eq!(v[1].name, "b");
				assert_eq!(v[1].arch, None);
				assert!(v[1].version.is_any());
			},
			_ => panic!("expected alternatives"),
		}
		assert_eq!(r[1].as_vec()[0].arch.as_deref(), Some("i386"));
		assert_eq!(r[2].as_vec()[0].version, VersionBounds::Below(PackageVersion::new("2").unwrap()));
	}

	#[test]
	fn parse_empty_field() {
		assert!(parse_relationships("  ").unwrap().is_empty());
	}

	#[test]
	fn parse_unterminated_constraint_is_error() {
		assert!(parse_relationships("a (>= 1.0").is_err());
	}

	#[test]
	fn parse_versioned_provides() {
		let p = parse_provides("mail-transport-agent, libfoo (= 2.1)").unwrap();
		assert_eq!(p[0], ("mail-transport-agent".to_string(), None));
		assert_eq!(p[1].1, Some(PackageVersion::new("2.1").unwrap()));
	}
}
