//! Live-bound values that are read when a render walks past them, not when the tree is built.

use core::fmt::{self, Debug, Display};
use parking_lot::RwLock;
use std::sync::Arc;

/// Render-time read access to a shared value.
pub trait Observe: Send + Sync {
	/// Canonical string form of the current value.
	fn read(&self) -> String;
}

/// A shared, reference-counted box holding a value.
///
/// Clones share the value. The pipeline keeps a handle for as long as a live tree references the cell, so the value is
/// released once neither the emitting component nor any reachable render refers to it.
pub struct Cell<T> {
	inner: Arc<Inner<T>>,
}

struct Inner<T> {
	value: RwLock<T>,
}

impl<T> Clone for Cell<T> {
	fn clone(&self) -> Self {
		Self { inner: Arc::clone(&self.inner) }
	}
}

impl<T: Default> Default for Cell<T> {
	fn default() -> Self {
		Self::new(T::default())
	}
}

impl<T> Cell<T> {
	pub fn new(value: T) -> Self {
		Self {
			inner: Arc::new(Inner { value: RwLock::new(value) }),
		}
	}

	pub fn get(&self) -> T
	where
		T: Clone,
	{
		self.inner.value.read().clone()
	}

	pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
		f(&self.inner.value.read())
	}

	pub fn set(&self, value: T) {
		*self.inner.value.write() = value;
	}

	/// Mutates the value in place and returns whatever `f` returns.
	pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
		f(&mut self.inner.value.write())
	}

	/// Whether both handles share the same value.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// Number of live handles, including this one.
	pub fn handle_count(&self) -> usize {
		Arc::strong_count(&self.inner)
	}
}

impl<T: Display + Send + Sync> Observe for Cell<T> {
	fn read(&self) -> String {
		self.inner.value.read().to_string()
	}
}

impl<T: Debug> Debug for Cell<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Cell").field(&*self.inner.value.read()).finish()
	}
}
