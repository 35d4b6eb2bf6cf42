//! # Hookaudit detector interface
//!
//! This crate defines the stable interface that detector implementations are written
//! against: an [`InstructionKind`] closed enum describing every normalized instruction a
//! hook contract's control-flow graph can contain, and a [`Detector`] trait that is invoked
//! once per visited instruction during a path-sensitive traversal of that graph.
//!
//! A struct implementing [`Detector`] observes the traversal through [`TraversalState`],
//! which exposes taint, call-stack, and protection-status queries without exposing the
//! traversal engine's internals.
//!
//! Detectors compose: `()` is the no-op detector, and any tuple `(A, B)` of two detectors
//! is itself a detector that runs both in sequence. This lets the CLI build up the active
//! detector set as a right-nested tuple without a trait object per detector.

pub use self::{detector_trait::*, instruction_kind::*, state_interface::*};

mod detector_trait;
mod instruction_kind;
mod state_interface;
