//! Attribute plugins: client-side behaviour that needs its script installed into the page before first use.

use crate::node::Node;

/// Implemented by attribute plugins such as focus or scroll helpers.
///
/// A page initializes each plugin (by [`name`](`AttributePlugin::name`)) at most once. The node returned by
/// [`initialize`](`AttributePlugin::initialize`) is appended to the end of the document body.
pub trait AttributePlugin: Send + Sync {
	fn name(&self) -> &'static str;

	fn initialize(&self) -> Node;
}
