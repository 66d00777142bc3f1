use super::*;

/// Batches mutations of a [`DepCache`].
///
/// While any group is alive counts, broken and garbage flags are not recomputed, so queries of
/// derived state may be stale. Dropping the last group refreshes them.
pub struct ActionGroup<'d, 'c> {
	depcache: &'d mut DepCache<'c>,
}

impl<'d, 'c> ActionGroup<'d, 'c> {
	pub(crate) fn new(depcache: &'d mut DepCache<'c>) -> Self {
		depcache.group_level += 1;
		Self { depcache }
	}

	/// Ends the group, same as dropping it.
	pub fn release(self) {}
}

impl<'c> std::ops::Deref for ActionGroup<'_, 'c> {
	type Target = DepCache<'c>;

	fn deref(&self) -> &Self::Target {
		self.depcache
	}
}

impl std::ops::DerefMut for ActionGroup<'_, '_> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		self.depcache
	}
}

impl Drop for ActionGroup<'_, '_> {
	fn drop(&mut self) {
		self.depcache.group_level -= 1;
		if self.depcache.group_level == 0 {
			self.depcache.refresh();
		}
	}
}
