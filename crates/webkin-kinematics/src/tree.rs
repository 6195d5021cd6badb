//! [`KinematicTree`] – the forward-kinematics engine.
//!
//! The tree owns every [`KinematicNode`] in a flat arena stored in pre-order
//! (a parent always precedes its children, siblings keep their authored
//! order), plus a name → [`NodeId`] registry of the joint-bearing nodes.
//!
//! The engine is not internally synchronised. Callers that share a tree
//! across threads must wrap it in a single lock and treat
//! mutate → [`KinematicTree::update`] → [`KinematicTree::scene_snapshot`] as
//! one critical section.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use webkin_kinematics::KinematicTree;
//!
//! let mut tree = KinematicTree::new();
//! tree.load(&json!({
//!     "name": "base",
//!     "children": [{"name": "slide", "type": "actuator", "axis": [1, 0, 0]}]
//! })).unwrap();
//!
//! tree.set_coords([("slide", 0.25)]);
//! tree.update();
//!
//! let scene = tree.scene_snapshot();
//! assert!((scene["slide"].pose.position.x - 0.25).abs() < 1e-12);
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use webkin_types::{CalibrationOverrides, WebkinError};

use crate::math::Pose;
use crate::node::{AxisParams, JointKind, KinematicNode, NodeId};

/// One entry of the flattened scene: world pose plus the opaque model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneNode {
    pub pose: Pose,
    pub model: Value,
}

/// Flat node name → [`SceneNode`] map sent to visualisation clients.
pub type SceneSnapshot = BTreeMap<String, SceneNode>;

/// Live calibration and coordinate state of one registered joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JointInfo {
    pub kind: JointKind,
    pub coord: f64,
    pub axis_offset: f64,
    pub axis_scale: f64,
    pub slider_min: f64,
    pub slider_max: f64,
}

/// Arena-backed kinematic tree with a joint registry.
#[derive(Debug, Default)]
pub struct KinematicTree {
    /// Pre-order arena; index 0 is the root when non-empty.
    nodes: Vec<KinematicNode>,
    joints: BTreeMap<String, NodeId>,
}

impl KinematicTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Replace the whole tree with one built from `description`.
    ///
    /// On error the previous tree and registry are left untouched. On success
    /// the registry is rebuilt from the new nodes and poses are recomputed.
    ///
    /// Joint names are expected to be unique. When two joints share a name
    /// the one visited last in pre-order owns the registry entry; both stay
    /// in the tree.
    ///
    /// # Errors
    ///
    /// Returns [`WebkinError::InvalidDescription`] when a node is not a JSON
    /// object or a `children` field is not an array.
    pub fn load(&mut self, description: &Value) -> Result<(), WebkinError> {
        let mut nodes = Vec::new();
        build_subtree(&mut nodes, description, "$".to_string(), None)?;

        let mut joints = BTreeMap::new();
        let mut duplicates = Vec::new();
        for (index, node) in nodes.iter().enumerate() {
            if node.kind().is_joint()
                && joints.insert(node.name.clone(), NodeId(index)).is_some()
            {
                duplicates.push(node.name.clone());
            }
        }
        if !duplicates.is_empty() {
            warn!(
                names = ?duplicates,
                "duplicate joint names; the last node in pre-order wins the registry entry"
            );
        }

        self.nodes = nodes;
        self.joints = joints;
        self.update();

        info!(
            root = %self.nodes[0].name,
            nodes = self.nodes.len(),
            joints = self.joints.len(),
            "kinematic tree loaded"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    pub fn root(&self) -> Option<NodeId> {
        (!self.nodes.is_empty()).then_some(NodeId(0))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&KinematicNode> {
        self.nodes.get(id.0)
    }

    /// Depth-first pre-order walk of the subtree rooted at `from`.
    pub fn preorder(&self, from: NodeId) -> Preorder<'_> {
        let stack = if from.0 < self.nodes.len() { vec![from] } else { Vec::new() };
        Preorder { tree: self, stack }
    }

    /// First node named `name` in pre-order, searching the subtree at `from`.
    pub fn find_by_name_from(&self, from: NodeId, name: &str) -> Option<NodeId> {
        self.preorder(from).find(|id| self.nodes[id.0].name == name)
    }

    /// First node named `name` in pre-order over the whole tree.
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.root().and_then(|root| self.find_by_name_from(root, name))
    }

    pub fn node_by_name(&self, name: &str) -> Option<&KinematicNode> {
        self.find_by_name(name).and_then(|id| self.node(id))
    }

    /// Append every rotator/actuator in the subtree at `from` to `out`, in
    /// pre-order.
    pub fn collect_joints(&self, from: NodeId, out: &mut Vec<NodeId>) {
        out.extend(
            self.preorder(from)
                .filter(|id| self.nodes[id.0].kind().is_joint()),
        );
    }

    /// Registered joint, as resolved by the registry.
    pub fn joint(&self, name: &str) -> Option<&KinematicNode> {
        self.joints.get(name).map(|id| &self.nodes[id.0])
    }

    fn joint_mut(&mut self, name: &str) -> Option<&mut KinematicNode> {
        let id = *self.joints.get(name)?;
        self.nodes.get_mut(id.0)
    }

    /// Registered joint names in alphabetical order.
    pub fn joint_names(&self) -> Vec<String> {
        self.joints.keys().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Coordinates and poses
    // -----------------------------------------------------------------------

    /// Set one joint coordinate. Returns `false` for an unknown name.
    ///
    /// Poses are not recomputed; call [`KinematicTree::update`].
    pub fn set_coord(&mut self, name: &str, value: f64) -> bool {
        match self.joint_mut(name) {
            Some(node) => {
                node.coord = value;
                true
            }
            None => false,
        }
    }

    /// Set several joint coordinates; unknown names are ignored.
    ///
    /// Poses are not recomputed, so a batch pays for a single
    /// [`KinematicTree::update`].
    pub fn set_coords<K, I>(&mut self, coords: I)
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, f64)>,
    {
        for (name, value) in coords {
            if !self.set_coord(name.as_ref(), value) {
                debug!(joint = name.as_ref(), "ignoring coordinate for unknown joint");
            }
        }
    }

    /// Recompute every global pose from the root. No-op on an empty tree.
    pub fn update(&mut self) {
        if let Some(root) = self.root() {
            self.recompute_from(root, Pose::identity());
        }
    }

    /// Recompute the subtree at `from`, using `parent_global` as its parent's
    /// world pose.
    pub fn recompute_from(&mut self, from: NodeId, parent_global: Pose) {
        let order: Vec<NodeId> = self.preorder(from).collect();
        for id in order {
            let parent_pose = match self.nodes[id.0].parent {
                Some(parent) if id != from => self.nodes[parent.0].global_pose,
                _ => parent_global,
            };
            self.nodes[id.0].recompute(parent_pose);
        }
    }

    /// World pose of the first node named `name`, as of the last update.
    pub fn global_pose(&self, name: &str) -> Option<Pose> {
        self.node_by_name(name).map(KinematicNode::global_pose)
    }

    /// Flatten the tree into name → pose/model.
    ///
    /// Nodes are inserted in pre-order, so when names collide the node visited
    /// last wins.
    pub fn scene_snapshot(&self) -> SceneSnapshot {
        let mut scene = SceneSnapshot::new();
        if let Some(root) = self.root() {
            for id in self.preorder(root) {
                let node = &self.nodes[id.0];
                scene.insert(
                    node.name.clone(),
                    SceneNode {
                        pose: node.global_pose(),
                        model: node.model.clone(),
                    },
                );
            }
        }
        scene
    }

    /// Coordinate and calibration state of every registered joint.
    pub fn joints_info(&self) -> BTreeMap<String, JointInfo> {
        self.joints
            .iter()
            .map(|(name, id)| {
                let node = &self.nodes[id.0];
                (
                    name.clone(),
                    JointInfo {
                        kind: node.kind(),
                        coord: node.coord,
                        axis_offset: node.axis_offset,
                        axis_scale: node.axis_scale,
                        slider_min: node.slider_min,
                        slider_max: node.slider_max,
                    },
                )
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Calibration
    // -----------------------------------------------------------------------

    /// Layer `overrides` onto the registered joints. Names without a joint are
    /// ignored. Poses are not recomputed.
    pub fn apply_calibration(&mut self, overrides: &CalibrationOverrides) {
        for (name, calibration) in overrides {
            match self.joint_mut(name) {
                Some(node) => node.apply_override(calibration),
                None => debug!(joint = %name, "calibration override for unknown joint"),
            }
        }
    }

    /// Reset a joint's axis parameters to the values authored in
    /// `original_description`.
    ///
    /// Returns `false`, leaving the joint untouched, when the joint is not
    /// registered or the description has no node of that name.
    pub fn restore_original(&mut self, joint_name: &str, original_description: &Value) -> bool {
        let Some(params) = find_original_axis_params(original_description, joint_name) else {
            return false;
        };
        match self.joint_mut(joint_name) {
            Some(node) => {
                node.set_axis_params(params);
                true
            }
            None => false,
        }
    }
}

/// Pre-order iterator over a subtree, produced by [`KinematicTree::preorder`].
pub struct Preorder<'a> {
    tree: &'a KinematicTree,
    stack: Vec<NodeId>,
}

impl Iterator for Preorder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.nodes[id.0].children.iter().rev().copied());
        Some(id)
    }
}

/// Search a raw tree description in pre-order for the first node named
/// `joint_name` and return its authored axis parameters, with kind-dependent
/// slider defaults.
pub fn find_original_axis_params(description: &Value, joint_name: &str) -> Option<AxisParams> {
    let obj = description.as_object()?;
    let name = obj.get("name").and_then(Value::as_str).unwrap_or("unnamed");
    if name == joint_name {
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .and_then(JointKind::from_tag)
            .unwrap_or_default();
        return Some(AxisParams::from_description(obj, kind));
    }
    obj.get("children")?
        .as_array()?
        .iter()
        .find_map(|child| find_original_axis_params(child, joint_name))
}

fn build_subtree(
    nodes: &mut Vec<KinematicNode>,
    data: &Value,
    path: String,
    parent: Option<NodeId>,
) -> Result<NodeId, WebkinError> {
    let id = NodeId(nodes.len());
    nodes.push(KinematicNode::from_description(data, &path, parent)?);

    match data.get("children") {
        None | Some(Value::Null) => {}
        Some(Value::Array(children)) => {
            for (index, child) in children.iter().enumerate() {
                let child_id =
                    build_subtree(nodes, child, format!("{path}.children[{index}]"), Some(id))?;
                nodes[id.0].children.push(child_id);
            }
        }
        Some(_) => {
            return Err(WebkinError::invalid(
                format!("{path}.children"),
                "expected an array of nodes",
            ));
        }
    }
    Ok(id)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Quat, Vec3};
    use serde_json::json;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
    use webkin_types::CalibrationOverride;

    const EPS: f64 = 1e-9;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < EPS, "{a} vs {b}");
    }

    fn assert_pose_close(a: Pose, b: Pose) {
        for (l, r) in a.position.to_array().iter().zip(b.position.to_array()) {
            assert_close(*l, r);
        }
        for (l, r) in a.orientation.to_array().iter().zip(b.orientation.to_array()) {
            assert_close(*l, r);
        }
    }

    fn arm_tree(kind: &str) -> Value {
        json!({
            "name": "base",
            "type": "transform",
            "children": [{"name": "arm", "type": kind, "axis": [0, 0, 1], "children": []}]
        })
    }

    fn chain() -> Value {
        json!({
            "name": "base",
            "pose": {"position": [0, 0, 1]},
            "children": [{
                "name": "shoulder",
                "type": "rotator",
                "axis": [0, 0, 1],
                "pose": {"position": [0, 0, 0.5]},
                "children": [{
                    "name": "forearm",
                    "pose": {"position": [1, 0, 0]},
                    "children": [{
                        "name": "slide",
                        "type": "actuator",
                        "axis": [1, 0, 0],
                        "axis_offset": 0.1
                    }]
                }]
            }, {
                "name": "camera",
                "pose": {"position": [0, 1, 0], "orientation": [0, 0, 0, 1]},
                "model": {"type": "none"}
            }]
        })
    }

    // ── Loading ─────────────────────────────────────────────────────────────

    #[test]
    fn empty_tree_is_inert() {
        let mut tree = KinematicTree::new();
        tree.update();
        tree.set_coords([("arm", 1.0)]);
        assert!(tree.is_empty());
        assert!(tree.scene_snapshot().is_empty());
        assert!(tree.joint_names().is_empty());
    }

    #[test]
    fn load_builds_arena_in_preorder() {
        let mut tree = KinematicTree::new();
        tree.load(&chain()).unwrap();

        let names: Vec<&str> = (0..tree.len())
            .map(|i| tree.node(NodeId(i)).unwrap().name.as_str())
            .collect();
        assert_eq!(names, ["base", "shoulder", "forearm", "slide", "camera"]);

        let root = tree.root().unwrap();
        let walked: Vec<NodeId> = tree.preorder(root).collect();
        assert_eq!(walked, (0..5).map(NodeId).collect::<Vec<_>>());

        let slide = tree.node_by_name("slide").unwrap();
        let forearm = tree.find_by_name("forearm").unwrap();
        assert_eq!(slide.parent(), Some(forearm));
        assert_eq!(tree.node(root).unwrap().children().len(), 2);
    }

    #[test]
    fn load_registers_only_joints_alphabetically() {
        let mut tree = KinematicTree::new();
        tree.load(&chain()).unwrap();
        assert_eq!(tree.joint_names(), ["shoulder", "slide"]);
    }

    #[test]
    fn collect_joints_is_preorder_within_subtree() {
        let mut tree = KinematicTree::new();
        tree.load(&chain()).unwrap();
        let mut out = Vec::new();
        tree.collect_joints(tree.find_by_name("forearm").unwrap(), &mut out);
        assert_eq!(out, [tree.find_by_name("slide").unwrap()]);

        out.clear();
        tree.collect_joints(tree.root().unwrap(), &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(tree.node(out[0]).unwrap().name, "shoulder");
    }

    #[test]
    fn failed_load_keeps_previous_tree() {
        let mut tree = KinematicTree::new();
        tree.load(&arm_tree("rotator")).unwrap();
        tree.set_coords([("arm", 0.5)]);

        let bad = json!({"name": "other", "children": [{"name": "ok"}, "not a node"]});
        let err = tree.load(&bad).unwrap_err();
        assert_eq!(
            err,
            WebkinError::invalid("$.children[1]", "expected a node object")
        );

        assert_eq!(tree.joint_names(), ["arm"]);
        assert_close(tree.joint("arm").unwrap().coord, 0.5);
    }

    #[test]
    fn children_must_be_an_array() {
        let mut tree = KinematicTree::new();
        let err = tree
            .load(&json!({"name": "root", "children": [{"children": {"name": "x"}}]}))
            .unwrap_err();
        match err {
            WebkinError::InvalidDescription { path, .. } => {
                assert_eq!(path, "$.children[0].children");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn null_children_mean_leaf() {
        let mut tree = KinematicTree::new();
        tree.load(&json!({"name": "solo", "children": null})).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn reload_replaces_registry() {
        let mut tree = KinematicTree::new();
        tree.load(&chain()).unwrap();
        tree.load(&arm_tree("actuator")).unwrap();
        assert_eq!(tree.joint_names(), ["arm"]);
        assert!(tree.joint("shoulder").is_none());
        assert!(!tree.set_coord("shoulder", 1.0));
    }

    // ── Poses ───────────────────────────────────────────────────────────────

    #[test]
    fn zero_coordinates_compose_local_poses_only() {
        let mut tree = KinematicTree::new();
        tree.load(&chain()).unwrap();

        // base (0,0,1) → shoulder +(0,0,0.5) → forearm +(1,0,0) → slide offset 0.1 along x
        assert_pose_close(
            tree.global_pose("forearm").unwrap(),
            Pose::from_position(Vec3::new(1.0, 0.0, 1.5)),
        );
        assert_pose_close(
            tree.global_pose("camera").unwrap(),
            Pose::from_position(Vec3::new(0.0, 1.0, 1.0)),
        );
        // axis_offset alone moves an actuator even at coord 0.
        assert_pose_close(
            tree.global_pose("slide").unwrap(),
            Pose::from_position(Vec3::new(1.1, 0.0, 1.5)),
        );
    }

    #[test]
    fn rotator_carries_descendants() {
        let mut tree = KinematicTree::new();
        tree.load(&chain()).unwrap();
        tree.set_coords([("shoulder", FRAC_PI_2)]);
        tree.update();

        let forearm = tree.global_pose("forearm").unwrap();
        assert_close(forearm.position.x, 0.0);
        assert_close(forearm.position.y, 1.0);
        assert_close(forearm.position.z, 1.5);

        // The sibling branch is unaffected.
        assert_pose_close(
            tree.global_pose("camera").unwrap(),
            Pose::from_position(Vec3::new(0.0, 1.0, 1.0)),
        );
    }

    #[test]
    fn set_coords_does_not_recompute() {
        let mut tree = KinematicTree::new();
        tree.load(&arm_tree("actuator")).unwrap();
        tree.set_coords([("arm", 2.0)]);
        assert_eq!(tree.global_pose("arm").unwrap(), Pose::identity());
        tree.update();
        assert_close(tree.global_pose("arm").unwrap().position.z, 2.0);
    }

    #[test]
    fn end_to_end_rotator_scenario() {
        let mut tree = KinematicTree::new();
        tree.load(&arm_tree("rotator")).unwrap();
        tree.set_coords([("arm", FRAC_PI_2)]);
        tree.update();

        let scene = tree.scene_snapshot();
        let pose = scene["arm"].pose;
        assert_pose_close(
            pose,
            Pose::new(
                Vec3::zero(),
                Quat::new(0.0, 0.0, FRAC_PI_4.sin(), FRAC_PI_4.cos()),
            ),
        );
    }

    #[test]
    fn actuator_scenario() {
        let mut tree = KinematicTree::new();
        tree.load(&json!({
            "name": "base",
            "type": "transform",
            "children": [{"name": "arm", "type": "actuator", "axis": [1, 0, 0], "axis_scale": 2}]
        }))
        .unwrap();
        tree.set_coords([("arm", 3.0)]);
        tree.update();

        let pose = tree.scene_snapshot()["arm"].pose;
        assert_pose_close(pose, Pose::from_position(Vec3::new(6.0, 0.0, 0.0)));
    }

    #[test]
    fn unknown_names_are_ignored() {
        let mut tree = KinematicTree::new();
        tree.load(&chain()).unwrap();
        tree.set_coords([("shoulder", 0.3)]);
        tree.update();
        let before = tree.scene_snapshot();
        let coords_before = tree.joints_info();

        tree.set_coords([("nonexistent", 5.0)]);
        tree.update();

        assert_eq!(tree.scene_snapshot(), before);
        assert_eq!(tree.joints_info(), coords_before);
    }

    #[test]
    fn recompute_from_subtree_uses_given_parent_pose() {
        let mut tree = KinematicTree::new();
        tree.load(&chain()).unwrap();
        let forearm = tree.find_by_name("forearm").unwrap();
        tree.recompute_from(forearm, Pose::from_position(Vec3::new(10.0, 0.0, 0.0)));
        assert_close(tree.global_pose("forearm").unwrap().position.x, 11.0);
        assert_close(tree.global_pose("slide").unwrap().position.x, 11.1);
    }

    // ── Snapshot ────────────────────────────────────────────────────────────

    #[test]
    fn snapshot_is_flat_and_carries_models() {
        let mut tree = KinematicTree::new();
        tree.load(&chain()).unwrap();
        let scene = tree.scene_snapshot();
        assert_eq!(scene.len(), 5);
        assert_eq!(scene["camera"].model, json!({"type": "none"}));
        assert!(scene["base"].model.is_null());

        let wire = serde_json::to_value(&scene).unwrap();
        assert_eq!(wire["base"]["pose"]["position"], json!([0.0, 0.0, 1.0]));
        assert_eq!(wire["camera"]["model"]["type"], "none");
    }

    #[test]
    fn duplicate_names_resolve_to_last_in_preorder() {
        let mut tree = KinematicTree::new();
        tree.load(&json!({
            "name": "root",
            "children": [
                {"name": "j", "type": "rotator", "pose": {"position": [1, 0, 0]}},
                {"name": "j", "type": "actuator", "pose": {"position": [2, 0, 0]}}
            ]
        }))
        .unwrap();

        assert_eq!(tree.joint_names(), ["j"]);
        assert_eq!(tree.joint("j").unwrap().kind(), JointKind::Actuator);
        assert_eq!(tree.len(), 3);

        let scene = tree.scene_snapshot();
        assert_eq!(scene.len(), 2);
        assert_close(scene["j"].pose.position.x, 2.0);

        // Name lookup in the tree structure stays first-match.
        assert_eq!(tree.node_by_name("j").unwrap().kind(), JointKind::Rotator);
    }

    #[test]
    fn duplicates_across_branches_follow_preorder() {
        let deep_branch = json!({
            "name": "arm",
            "pose": {"position": [1, 0, 0]},
            "children": [{
                "name": "elbow",
                "pose": {"position": [0, 1, 0]},
                "children": [{"name": "j", "type": "rotator", "pose": {"position": [0, 0, 1]}}]
            }]
        });
        let shallow = json!({"name": "j", "type": "actuator", "pose": {"position": [5, 0, 0]}});

        // Deep descendant of the first child, then the second child: the
        // shallow sibling comes later in pre-order and wins.
        let mut tree = KinematicTree::new();
        tree.load(&json!({"name": "root", "children": [deep_branch.clone(), shallow.clone()]}))
            .unwrap();
        assert_eq!(tree.joint_names(), ["j"]);
        assert_eq!(tree.joint("j").unwrap().kind(), JointKind::Actuator);
        let scene = tree.scene_snapshot();
        assert_eq!(scene.len(), 4);
        assert_pose_close(
            scene["j"].pose,
            Pose::new(Vec3::new(5.0, 0.0, 0.0), Quat::identity()),
        );

        // Swapped: the deep node is visited after the shallow one and wins.
        let mut tree = KinematicTree::new();
        tree.load(&json!({"name": "root", "children": [shallow, deep_branch]}))
            .unwrap();
        assert_eq!(tree.joint("j").unwrap().kind(), JointKind::Rotator);
        let scene = tree.scene_snapshot();
        assert_eq!(scene.len(), 4);
        assert_pose_close(
            scene["j"].pose,
            Pose::new(Vec3::new(1.0, 1.0, 1.0), Quat::identity()),
        );

        // Coordinates reach only the registered node.
        assert!(tree.set_coord("j", FRAC_PI_2));
        tree.update();
        assert_close(tree.joint("j").unwrap().coord, FRAC_PI_2);
        assert_close(tree.node_by_name("j").unwrap().coord, 0.0);
    }

    // ── Calibration ─────────────────────────────────────────────────────────

    #[test]
    fn doubling_scale_doubles_rotation_angle() {
        let mut tree = KinematicTree::new();
        tree.load(&arm_tree("rotator")).unwrap();
        tree.set_coords([("arm", 0.4)]);
        tree.update();
        let single = tree.global_pose("arm").unwrap().orientation;

        let mut overrides = CalibrationOverrides::new();
        overrides.insert(
            "arm".to_string(),
            CalibrationOverride {
                axis_scale: Some(2.0),
                ..Default::default()
            },
        );
        tree.apply_calibration(&overrides);
        tree.update();
        let doubled = tree.global_pose("arm").unwrap().orientation;

        let angle = |q: Quat| 2.0 * q.z.atan2(q.w);
        assert_close(angle(single), 0.4);
        assert_close(angle(doubled), 0.8);
    }

    #[test]
    fn offset_of_minus_coord_is_zero_operation() {
        let mut tree = KinematicTree::new();
        tree.load(&arm_tree("rotator")).unwrap();
        tree.set_coords([("arm", 1.3)]);

        let mut overrides = CalibrationOverrides::new();
        overrides.insert(
            "arm".to_string(),
            CalibrationOverride {
                axis_offset: Some(-1.3),
                ..Default::default()
            },
        );
        tree.apply_calibration(&overrides);
        tree.update();

        assert_eq!(tree.joint("arm").unwrap().joint_transform(), Pose::identity());
        assert_pose_close(tree.global_pose("arm").unwrap(), Pose::identity());
    }

    #[test]
    fn apply_calibration_does_not_recompute_and_ignores_unknown() {
        let mut tree = KinematicTree::new();
        tree.load(&arm_tree("actuator")).unwrap();

        let mut overrides = CalibrationOverrides::new();
        overrides.insert(
            "arm".to_string(),
            CalibrationOverride {
                axis_offset: Some(4.0),
                slider_max: Some(50.0),
                ..Default::default()
            },
        );
        overrides.insert(
            "ghost".to_string(),
            CalibrationOverride {
                axis_offset: Some(1.0),
                ..Default::default()
            },
        );
        tree.apply_calibration(&overrides);

        let info = tree.joints_info()["arm"];
        assert_close(info.axis_offset, 4.0);
        assert_close(info.axis_scale, 1.0);
        assert_close(info.slider_min, -1000.0);
        assert_close(info.slider_max, 50.0);
        assert_eq!(tree.global_pose("arm").unwrap(), Pose::identity());
    }

    #[test]
    fn restore_original_reproduces_pre_override_pose() {
        let original = arm_tree("rotator");
        let mut tree = KinematicTree::new();
        tree.load(&original).unwrap();
        tree.set_coords([("arm", 0.7)]);
        tree.update();
        let before = tree.global_pose("arm").unwrap();

        let mut overrides = CalibrationOverrides::new();
        overrides.insert(
            "arm".to_string(),
            CalibrationOverride {
                axis_offset: Some(10.0),
                slider_min: Some(-5.0),
                ..Default::default()
            },
        );
        tree.apply_calibration(&overrides);
        tree.update();
        assert_ne!(tree.global_pose("arm").unwrap(), before);

        assert!(tree.restore_original("arm", &original));
        tree.update();

        let info = tree.joints_info()["arm"];
        assert_close(info.axis_offset, 0.0);
        assert_close(info.slider_min, -180.0);
        assert_pose_close(tree.global_pose("arm").unwrap(), before);
    }

    #[test]
    fn restore_original_without_match_is_noop() {
        let mut tree = KinematicTree::new();
        tree.load(&arm_tree("rotator")).unwrap();
        let mut overrides = CalibrationOverrides::new();
        overrides.insert(
            "arm".to_string(),
            CalibrationOverride {
                axis_offset: Some(2.0),
                ..Default::default()
            },
        );
        tree.apply_calibration(&overrides);

        assert!(!tree.restore_original("arm", &json!({"name": "unrelated"})));
        assert_close(tree.joint("arm").unwrap().axis_offset, 2.0);
    }

    #[test]
    fn original_axis_params_use_kind_defaults() {
        let description = json!({
            "name": "root",
            "children": [
                {"name": "lift", "type": "actuator", "axis_scale": 0.001},
                {"name": "lift", "type": "rotator", "axis_scale": 5}
            ]
        });
        let params = find_original_axis_params(&description, "lift").unwrap();
        assert_close(params.axis_offset, 0.0);
        assert_close(params.axis_scale, 0.001);
        assert_close(params.slider_min, -1000.0);
        assert_close(params.slider_max, 1000.0);

        let root = find_original_axis_params(&description, "root").unwrap();
        assert_close(root.slider_max, 180.0);

        assert!(find_original_axis_params(&description, "missing").is_none());
    }
}
