//! `webkin-kinematics` – the forward-kinematics core.
//!
//! Keeps the world pose of every link of an articulated mechanism in sync
//! with its joint coordinates. Pure, synchronous and I/O free; callers own
//! the locking.
//!
//! # Modules
//!
//! - [`math`] – [`Vec3`], [`Quat`] and [`Pose`] value types.
//! - [`node`] – [`KinematicNode`]: one frame, its calibration and its joint
//!   transform.
//! - [`tree`] – [`KinematicTree`]: arena of nodes, joint registry, pose
//!   recomputation, scene flattening and calibration overrides.

pub mod math;
pub mod node;
pub mod tree;

pub use math::{Pose, Quat, Vec3};
pub use node::{AxisParams, JointKind, KinematicNode, NodeId};
pub use tree::{
    JointInfo, KinematicTree, Preorder, SceneNode, SceneSnapshot, find_original_axis_params,
};
