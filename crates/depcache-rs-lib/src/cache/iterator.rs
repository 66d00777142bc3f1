//! Iterator adaptors over cache views.

use super::*;

pub struct Installed<I> {
	underlying: I,
}

impl<'c, I> Iterator for Installed<I>
where
	I: Iterator<Item = Package<'c>>,
{
	type Item = I::Item;

	fn next(&mut self) -> Option<Self::Item> {
		self.underlying.by_ref().find(|p| p.current_version().is_some())
	}
}

pub trait InstalledExt<'c>: Iterator<Item = Package<'c>>
{
	/// Filters the iterator to packages with a current version.
	fn installed(self) -> Installed<Self>
	where
		Self: Sized,
	{
		Installed { underlying: self }
	}
}

impl<'c, I: Iterator<Item = Package<'c>>> InstalledExt<'c> for I {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn filters_installed() {
		let mut b = CacheBuilder::new("amd64", "status");
		b.add_status("Package: a\nStatus: install ok installed\nVersion: 1\n\nPackage: c\nStatus: deinstall ok config-files\nVersion: 1\n").unwrap();
		b.add_index(PackageFile::default(), "Package: a\nVersion: 2\n\nPackage: b\nVersion: 1\n").unwrap();
		let cache = b.finish(&crate::Config::default(), String::new());

		let installed: Vec<_> = cache.packages().installed().map(|p| p.name()).collect();
		assert_eq!(installed, vec!["a"]);
	}
}
