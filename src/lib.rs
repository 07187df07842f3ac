#![doc(html_root_url = "https://docs.rs/live-dom/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate, clippy::missing_panics_doc)]
//! Keeps a server-held UI tree in sync with a browser document.
//!
//! A [`Page`] renders its live [`Node`] tree through a [`Pipeline`] into a snapshot, and every later state change
//! into a list of addressed [`Diff`]s against the previous snapshot. [`Session`]s tie a page to one connection at a
//! time, and a [`LiveServer`] routes requests and upgrades onto a [`SessionRegistry`].

pub mod cell;
pub mod component;
pub mod config;
pub mod diff;
pub mod error;
pub mod node;
pub mod page;
pub mod pipeline;
pub mod plugin;
pub mod protocol;
mod rc_hash_map;
pub mod registry;
pub mod server;
pub mod session;
pub mod snapshot;
pub mod stages;
pub mod tracker;

pub use cell::Cell;
pub use component::{BindingId, Component, ComponentId, ComponentList, EventBinding, EventContext};
pub use config::Config;
pub use diff::{Diff, DiffKind, Differ, Payload, Selector};
pub use error::Error;
pub use node::{Attribute, Node, Tag};
pub use page::Page;
pub use pipeline::{Pipeline, Stage, StageHooks};
pub use plugin::AttributePlugin;
pub use protocol::{Event, Frame};
pub use registry::SessionRegistry;
pub use server::LiveServer;
pub use session::{Session, SessionId};
pub use snapshot::{Snap, SnapTag};
