//! A single rigid-body frame of the mechanism.
//!
//! [`KinematicNode`]s live in the arena owned by
//! [`KinematicTree`][crate::tree::KinematicTree] and refer to each other
//! through [`NodeId`]s, so a node never owns its parent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use webkin_types::{CalibrationOverride, WebkinError};

use crate::math::{Pose, Quat, Vec3};

/// Index of a node inside its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// What kind of motion a node's single scalar coordinate drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JointKind {
    /// Fixed frame, no degree of freedom.
    #[default]
    Transform,
    /// Revolute joint; `coord` is in radians.
    Rotator,
    /// Prismatic joint; `coord` is a linear distance.
    Actuator,
}

impl JointKind {
    /// Parse a description `type` tag. Returns `None` for unknown tags.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "transform" => Some(Self::Transform),
            "rotator" => Some(Self::Rotator),
            "actuator" => Some(Self::Actuator),
            _ => None,
        }
    }

    /// `true` for kinds that carry a degree of freedom.
    pub fn is_joint(self) -> bool {
        !matches!(self, Self::Transform)
    }

    /// UI slider range used when a description does not author one.
    pub fn default_slider_range(self) -> (f64, f64) {
        match self {
            Self::Transform | Self::Rotator => (-180.0, 180.0),
            Self::Actuator => (-1000.0, 1000.0),
        }
    }
}

/// Calibration parameters of a joint axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisParams {
    pub axis_offset: f64,
    pub axis_scale: f64,
    pub slider_min: f64,
    pub slider_max: f64,
}

impl AxisParams {
    /// Read the authored parameters from a description node, substituting
    /// defaults for missing or non-numeric fields.
    pub fn from_description(obj: &Map<String, Value>, kind: JointKind) -> Self {
        let (default_min, default_max) = kind.default_slider_range();
        Self {
            axis_offset: number_field(obj, "axis_offset").unwrap_or(0.0),
            axis_scale: number_field(obj, "axis_scale").unwrap_or(1.0),
            slider_min: number_field(obj, "slider_min").unwrap_or(default_min),
            slider_max: number_field(obj, "slider_max").unwrap_or(default_max),
        }
    }
}

/// One link/frame of the kinematic chain.
#[derive(Debug, Clone)]
pub struct KinematicNode {
    pub name: String,
    kind: JointKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Static offset applied before the joint's own motion.
    pub local_pose: Pose,
    pub axis: Vec3,
    pub axis_offset: f64,
    pub axis_scale: f64,
    /// UI metadata; never used in pose computation.
    pub slider_min: f64,
    pub slider_max: f64,
    pub coord: f64,
    /// Opaque payload forwarded verbatim to the scene snapshot.
    pub model: Value,
    pub(crate) global_pose: Pose,
}

impl KinematicNode {
    /// Build a node from one description object, without its children.
    ///
    /// `path` locates the value for error reporting. Only a non-object value
    /// is an error; every missing or mistyped field falls back to its default.
    pub fn from_description(
        data: &Value,
        path: &str,
        parent: Option<NodeId>,
    ) -> Result<Self, WebkinError> {
        let obj = data
            .as_object()
            .ok_or_else(|| WebkinError::invalid(path, "expected a node object"))?;

        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unnamed")
            .to_string();

        let kind = match obj.get("type").and_then(Value::as_str) {
            None => JointKind::Transform,
            Some(tag) => JointKind::from_tag(tag).unwrap_or_else(|| {
                warn!(node = %name, tag, path, "unknown node type, treating as transform");
                JointKind::Transform
            }),
        };

        let local_pose = match obj.get("pose").and_then(Value::as_object) {
            Some(pose) => Pose::new(
                pose.get("position").and_then(vec3_from).unwrap_or_default(),
                pose.get("orientation").and_then(quat_from).unwrap_or_default(),
            ),
            None => Pose::identity(),
        };

        let axis = obj.get("axis").and_then(vec3_from).unwrap_or_else(Vec3::unit_z);
        let params = AxisParams::from_description(obj, kind);

        Ok(Self {
            name,
            kind,
            parent,
            children: Vec::new(),
            local_pose,
            axis,
            axis_offset: params.axis_offset,
            axis_scale: params.axis_scale,
            slider_min: params.slider_min,
            slider_max: params.slider_max,
            coord: 0.0,
            model: obj.get("model").cloned().unwrap_or(Value::Null),
            global_pose: Pose::identity(),
        })
    }

    pub fn kind(&self) -> JointKind {
        self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Pose computed by the last recompute.
    pub fn global_pose(&self) -> Pose {
        self.global_pose
    }

    /// `(coord + axis_offset) * axis_scale`
    pub fn effective_coord(&self) -> f64 {
        (self.coord + self.axis_offset) * self.axis_scale
    }

    /// Motion contributed by the joint at its current coordinate.
    pub fn joint_transform(&self) -> Pose {
        match self.kind {
            JointKind::Transform => Pose::identity(),
            JointKind::Rotator => {
                Pose::from_orientation(Quat::from_axis_angle(self.axis, self.effective_coord()))
            }
            JointKind::Actuator => Pose::from_position(self.axis * self.effective_coord()),
        }
    }

    /// `parent_global ∘ local_pose ∘ joint_transform()`, memoised on the node.
    pub(crate) fn recompute(&mut self, parent_global: Pose) -> Pose {
        self.global_pose = parent_global
            .compose(self.local_pose)
            .compose(self.joint_transform());
        self.global_pose
    }

    pub fn axis_params(&self) -> AxisParams {
        AxisParams {
            axis_offset: self.axis_offset,
            axis_scale: self.axis_scale,
            slider_min: self.slider_min,
            slider_max: self.slider_max,
        }
    }

    pub fn set_axis_params(&mut self, params: AxisParams) {
        self.axis_offset = params.axis_offset;
        self.axis_scale = params.axis_scale;
        self.slider_min = params.slider_min;
        self.slider_max = params.slider_max;
    }

    /// Overwrite the fields present in `o`; absent fields stay as they are.
    pub fn apply_override(&mut self, o: &CalibrationOverride) {
        if let Some(v) = o.axis_offset {
            self.axis_offset = v;
        }
        if let Some(v) = o.axis_scale {
            self.axis_scale = v;
        }
        if let Some(v) = o.slider_min {
            self.slider_min = v;
        }
        if let Some(v) = o.slider_max {
            self.slider_max = v;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Description field helpers
// ────────────────────────────────────────────────────────────────────────────

fn number_field(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    obj.get(key).and_then(Value::as_f64)
}

fn vec3_from(value: &Value) -> Option<Vec3> {
    match value.as_array()?.as_slice() {
        [x, y, z, ..] => Some(Vec3::new(
            x.as_f64().unwrap_or(0.0),
            y.as_f64().unwrap_or(0.0),
            z.as_f64().unwrap_or(0.0),
        )),
        _ => None,
    }
}

fn quat_from(value: &Value) -> Option<Quat> {
    match value.as_array()?.as_slice() {
        [x, y, z, w, ..] => Some(Quat::new(
            x.as_f64().unwrap_or(0.0),
            y.as_f64().unwrap_or(0.0),
            z.as_f64().unwrap_or(0.0),
            w.as_f64().unwrap_or(1.0),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::f64::consts::FRAC_PI_2;

    fn node(value: Value) -> KinematicNode {
        KinematicNode::from_description(&value, "$", None).unwrap()
    }

    #[test]
    fn empty_object_gets_documented_defaults() {
        let n = node(json!({}));
        assert_eq!(n.name, "unnamed");
        assert_eq!(n.kind(), JointKind::Transform);
        assert_eq!(n.local_pose, Pose::identity());
        assert_eq!(n.axis, Vec3::unit_z());
        assert_eq!(n.axis_offset, 0.0);
        assert_eq!(n.axis_scale, 1.0);
        assert_eq!((n.slider_min, n.slider_max), (-180.0, 180.0));
        assert_eq!(n.coord, 0.0);
        assert!(n.model.is_null());
        assert!(n.parent().is_none());
    }

    #[test]
    fn actuator_slider_defaults_are_wider() {
        let n = node(json!({"type": "actuator"}));
        assert_eq!((n.slider_min, n.slider_max), (-1000.0, 1000.0));
    }

    #[test]
    fn authored_fields_are_read() {
        let n = node(json!({
            "name": "elbow",
            "type": "rotator",
            "pose": {"position": [1, 2, 3], "orientation": [0, 0, 0, 1]},
            "axis": [1, 0, 0],
            "axis_offset": 0.5,
            "axis_scale": -1,
            "slider_min": -90,
            "slider_max": 45,
            "model": {"type": "stl", "path": "/k3d/models/elbow.stl"}
        }));
        assert_eq!(n.name, "elbow");
        assert_eq!(n.kind(), JointKind::Rotator);
        assert_eq!(n.local_pose.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(n.axis, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(n.axis_offset, 0.5);
        assert_eq!(n.axis_scale, -1.0);
        assert_eq!((n.slider_min, n.slider_max), (-90.0, 45.0));
        assert_eq!(n.model["path"], "/k3d/models/elbow.stl");
    }

    #[test]
    fn mistyped_fields_fall_back_to_defaults() {
        let n = node(json!({
            "name": 42,
            "pose": {"position": [1, 2], "orientation": "nope"},
            "axis": "z",
            "axis_scale": "2"
        }));
        assert_eq!(n.name, "unnamed");
        assert_eq!(n.local_pose, Pose::identity());
        assert_eq!(n.axis, Vec3::unit_z());
        assert_eq!(n.axis_scale, 1.0);
    }

    #[test]
    fn unknown_type_loads_as_transform() {
        let n = node(json!({"type": "gripper"}));
        assert_eq!(n.kind(), JointKind::Transform);
        assert_eq!(n.joint_transform(), Pose::identity());
    }

    #[test]
    fn non_object_is_rejected_with_path() {
        let err = KinematicNode::from_description(&json!([1, 2]), "$.children[3]", None)
            .unwrap_err();
        match err {
            WebkinError::InvalidDescription { path, .. } => assert_eq!(path, "$.children[3]"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn joint_transform_per_kind() {
        let mut t = node(json!({"type": "transform"}));
        t.coord = 3.0;
        assert_eq!(t.joint_transform(), Pose::identity());

        let mut r = node(json!({"type": "rotator", "axis": [0, 0, 1]}));
        r.coord = FRAC_PI_2;
        let q = r.joint_transform().orientation;
        assert!((q.z - (FRAC_PI_2 / 2.0).sin()).abs() < 1e-12);
        assert_eq!(r.joint_transform().position, Vec3::zero());

        let mut a = node(json!({"type": "actuator", "axis": [0, 1, 0], "axis_scale": 2}));
        a.coord = 1.5;
        assert_eq!(a.joint_transform().position, Vec3::new(0.0, 3.0, 0.0));
        assert_eq!(a.joint_transform().orientation, Quat::identity());
    }

    #[test]
    fn zero_coordinate_contributes_nothing() {
        for kind in ["transform", "rotator", "actuator"] {
            let n = node(json!({"type": kind, "axis": [0.6, 0.8, 0]}));
            assert_eq!(n.joint_transform(), Pose::identity(), "kind {kind}");
        }
    }

    #[test]
    fn offset_equal_to_minus_coord_zeroes_the_joint() {
        let mut r = node(json!({"type": "rotator"}));
        r.coord = 0.8;
        r.axis_offset = -0.8;
        assert_eq!(r.effective_coord(), 0.0);
        assert_eq!(r.joint_transform(), Pose::identity());
    }

    #[test]
    fn partial_override_leaves_other_fields() {
        let mut n = node(json!({"type": "rotator", "axis_scale": 3, "slider_max": 10}));
        n.apply_override(&CalibrationOverride {
            axis_offset: Some(0.25),
            ..Default::default()
        });
        assert_eq!(n.axis_offset, 0.25);
        assert_eq!(n.axis_scale, 3.0);
        assert_eq!(n.slider_max, 10.0);
    }
}
