//! Error types.
//!
//! Nothing in this crate terminates the process on bad input. Errors at the model level are caller bugs and surface at
//! construction time, everything else is logged by the session that encountered it and at worst closes that session.

use crate::{component::ComponentId, session::SessionId};
use thiserror::Error;

/// A malformed value was used in a node or attribute position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
	#[error("invalid element: {kind} name {name:?} {reason}")]
	InvalidElement { kind: &'static str, name: String, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
	#[error("no pipeline stage named {0:?}")]
	UnknownStage(String),
	#[error("a pipeline stage named {0:?} already exists")]
	DuplicateStage(String),
	#[error("render restarted more than {0} time(s)")]
	RestartLimit(usize),
	#[error("tree nests deeper than {0} levels")]
	DepthLimit(usize),
	#[error("stage {stage:?} failed: {message}")]
	Stage { stage: String, message: String },
}

/// Internal render/diff failures. A cycle that produces one of these sends no patch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
	#[error("depth limit reached")]
	DepthLimit,
	#[error("component {0} not found in the previous snapshot")]
	MissingComponent(ComponentId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
	#[error("malformed inbound frame: {0}")]
	Malformed(String),
	#[error("binary frame without a binding id header")]
	MissingUploadHeader,
	#[error("unknown binding id {0:?}")]
	UnknownBinding(String),
}

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Model(#[from] ModelError),
	#[error(transparent)]
	Pipeline(#[from] PipelineError),
	#[error(transparent)]
	Diff(#[from] DiffError),
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
	#[error("session capacity of {0} reached")]
	Capacity(usize),
	#[error("session {0} is closed")]
	SessionClosed(SessionId),
	#[error("invalid configuration: {0}")]
	Config(#[from] toml::de::Error),
}
