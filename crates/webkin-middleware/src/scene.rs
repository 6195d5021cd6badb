//! [`SceneHub`] – the shared engine context.
//!
//! One [`Mutex`] guards the tree, the description it was built from and the
//! calibration store. Every mutation runs mutate → update → snapshot inside
//! the critical section; the resulting message is published after the lock
//! is released so a slow bus never holds up the engine.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, info};
use webkin_kinematics::{JointInfo, KinematicTree, SceneSnapshot};
use webkin_store::CalibrationStore;
use webkin_types::{CalibrationOverrides, WebkinError};

use crate::bus::{EventBus, SceneEvent, SceneSubscriber};
use crate::protocol::SceneMessage;

struct SceneState {
    tree: KinematicTree,
    /// Description of the loaded tree, before any calibration override.
    description: Option<Value>,
    calibration: CalibrationStore,
    /// Viewer camera suggested by the loaded export.
    camera_pose: Option<Value>,
}

impl SceneState {
    fn init_message(&self, z_up: bool) -> SceneMessage {
        SceneMessage::SceneInit {
            nodes: self.tree.scene_snapshot(),
            joints: self.tree.joint_names(),
            z_up,
            camera_pose: self.camera_pose.clone(),
        }
    }

    fn update_message(&self) -> SceneMessage {
        SceneMessage::SceneUpdate {
            nodes: self.tree.scene_snapshot(),
        }
    }
}

/// Engine context shared by the HTTP layer and the transports.
pub struct SceneHub {
    state: Mutex<SceneState>,
    bus: EventBus,
    z_up: bool,
}

impl SceneHub {
    pub fn new(calibration: CalibrationStore, bus: EventBus, z_up: bool) -> Self {
        Self {
            state: Mutex::new(SceneState {
                tree: KinematicTree::new(),
                description: None,
                calibration,
                camera_pose: None,
            }),
            bus,
            z_up,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SceneState> {
        // A panic mid-update leaves the tree consistent enough to keep serving.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn broadcast(&self, source: &str, message: SceneMessage) {
        let delivered = self.bus.publish(SceneEvent::new(source, message));
        debug!(source, delivered, "scene broadcast");
    }

    pub fn z_up(&self) -> bool {
        self.z_up
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> SceneSubscriber {
        self.bus.subscribe()
    }

    // ── Mutations ──────────────────────────────────────────────────────────

    /// Replace the tree, re-apply stored calibration and broadcast a
    /// `scene_init`. Returns the registered joint names.
    ///
    /// # Errors
    ///
    /// Propagates [`WebkinError::InvalidDescription`]; the previous tree stays
    /// live in that case.
    pub fn load_tree(&self, description: Value) -> Result<Vec<String>, WebkinError> {
        let (joints, message) = {
            let mut state = self.lock();
            state.tree.load(&description)?;
            let overrides = state.calibration.overrides().clone();
            state.tree.apply_calibration(&overrides);
            state.tree.update();
            state.description = Some(description);
            (state.tree.joint_names(), state.init_message(self.z_up))
        };
        info!(joints = joints.len(), "scene tree replaced");
        self.broadcast("scene::load_tree", message);
        Ok(joints)
    }

    /// Set joint coordinates, recompute and broadcast a `scene_update`.
    ///
    /// Unknown names are ignored. Returns how many joints were updated.
    pub fn set_joints(&self, joints: &BTreeMap<String, f64>) -> usize {
        let (applied, message) = {
            let mut state = self.lock();
            let applied = joints
                .iter()
                .filter(|(name, value)| state.tree.set_coord(name, **value))
                .count();
            state.tree.update();
            (applied, state.update_message())
        };
        debug!(requested = joints.len(), applied, "joint coordinates set");
        self.broadcast("scene::set_joints", message);
        applied
    }

    /// Merge `overrides` into the store, apply them to the live tree,
    /// recompute and broadcast. Returns the full stored override map.
    ///
    /// Overrides for joints that are not loaded are still persisted and take
    /// effect on the next load. When the store cannot be written neither the
    /// stored map nor the live tree changes.
    pub fn set_calibration(
        &self,
        overrides: &CalibrationOverrides,
    ) -> Result<CalibrationOverrides, WebkinError> {
        let (stored, message) = {
            let mut state = self.lock();
            let merged = state.calibration.upsert_many(overrides)?;
            state.tree.apply_calibration(&merged);
            state.tree.update();
            (state.calibration.overrides().clone(), state.update_message())
        };
        info!(joints = ?overrides.keys().collect::<Vec<_>>(), "calibration updated");
        self.broadcast("scene::set_calibration", message);
        Ok(stored)
    }

    /// Drop the stored override for `joint` and reset the live joint to its
    /// authored axis parameters. Returns whether an override existed.
    pub fn reset_calibration(&self, joint: &str) -> Result<bool, WebkinError> {
        let (existed, message) = {
            let mut state = self.lock();
            let existed = state.calibration.remove(joint)?;
            let SceneState {
                tree, description, ..
            } = &mut *state;
            if let Some(description) = description.as_ref()
                && !tree.restore_original(joint, description)
            {
                debug!(joint, "no authored node to restore");
            }
            tree.update();
            (existed, state.update_message())
        };
        info!(joint, existed, "calibration reset");
        self.broadcast("scene::reset_calibration", message);
        Ok(existed)
    }

    /// Camera pose sent to viewers in `scene_init`. Takes effect for viewers
    /// that connect afterwards.
    pub fn set_camera_pose(&self, pose: Option<Value>) {
        self.lock().camera_pose = pose;
    }

    // ── Reads ──────────────────────────────────────────────────────────────

    pub fn scene_init_message(&self) -> SceneMessage {
        self.lock().init_message(self.z_up)
    }

    pub fn scene_snapshot(&self) -> SceneSnapshot {
        self.lock().tree.scene_snapshot()
    }

    pub fn joint_names(&self) -> Vec<String> {
        self.lock().tree.joint_names()
    }

    pub fn joints_info(&self) -> BTreeMap<String, JointInfo> {
        self.lock().tree.joints_info()
    }

    /// Description of the loaded tree, `None` before the first load.
    pub fn tree_description(&self) -> Option<Value> {
        self.lock().description.clone()
    }

    pub fn calibration(&self) -> CalibrationOverrides {
        self.lock().calibration.overrides().clone()
    }

    pub fn camera_pose(&self) -> Option<Value> {
        self.lock().camera_pose.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::f64::consts::FRAC_PI_2;
    use webkin_types::CalibrationOverride;

    fn arm() -> Value {
        json!({
            "name": "base",
            "children": [{
                "name": "shoulder",
                "type": "rotator",
                "axis": [0, 0, 1],
                "children": [{
                    "name": "tip",
                    "pose": {"position": [1, 0, 0]}
                }]
            }, {
                "name": "lift",
                "type": "actuator",
                "axis": [0, 0, 1],
                "axis_offset": 0.5
            }]
        })
    }

    fn hub() -> SceneHub {
        SceneHub::new(CalibrationStore::in_memory(), EventBus::default(), false)
    }

    fn offset(v: f64) -> CalibrationOverride {
        CalibrationOverride {
            axis_offset: Some(v),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn load_tree_broadcasts_scene_init() {
        let hub = hub();
        let mut rx = hub.subscribe();

        let joints = hub.load_tree(arm()).expect("load");
        assert_eq!(joints, vec!["lift".to_string(), "shoulder".to_string()]);

        let event = rx.recv().await.expect("event");
        match event.message {
            SceneMessage::SceneInit {
                nodes,
                joints,
                z_up,
                camera_pose,
            } => {
                assert_eq!(nodes.len(), 4);
                assert_eq!(joints.len(), 2);
                assert!(!z_up);
                assert!(camera_pose.is_none());
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(hub.tree_description(), Some(arm()));
    }

    #[test]
    fn failed_load_keeps_previous_scene() {
        let hub = hub();
        hub.load_tree(arm()).expect("load");
        let err = hub.load_tree(json!({"name": "x", "children": 3})).unwrap_err();
        assert!(matches!(err, WebkinError::InvalidDescription { .. }));
        assert_eq!(hub.joint_names().len(), 2);
        assert_eq!(hub.tree_description(), Some(arm()));
    }

    #[tokio::test]
    async fn set_joints_updates_poses_and_broadcasts() {
        let hub = hub();
        hub.load_tree(arm()).expect("load");
        let mut rx = hub.subscribe();

        let joints = BTreeMap::from([("shoulder".to_string(), FRAC_PI_2), ("ghost".to_string(), 1.0)]);
        assert_eq!(hub.set_joints(&joints), 1);

        let event = rx.recv().await.expect("event");
        assert!(matches!(event.message, SceneMessage::SceneUpdate { .. }));
        let tip = &event.message.nodes()["tip"].pose.position;
        assert!(tip.x.abs() < 1e-9);
        assert!((tip.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn stored_calibration_is_applied_on_load() {
        let mut store = CalibrationStore::in_memory();
        store.upsert("lift", &offset(2.0)).expect("upsert");
        let hub = SceneHub::new(store, EventBus::default(), true);

        hub.load_tree(arm()).expect("load");
        let info = hub.joints_info();
        assert_eq!(info["lift"].axis_offset, 2.0);
        assert!((hub.scene_snapshot()["lift"].pose.position.z - 2.0).abs() < 1e-9);
        assert!(matches!(
            hub.scene_init_message(),
            SceneMessage::SceneInit { z_up: true, .. }
        ));
    }

    #[test]
    fn set_then_reset_calibration_restores_authored_values() {
        let hub = hub();
        hub.load_tree(arm()).expect("load");
        let before = hub.scene_snapshot();

        let stored = hub
            .set_calibration(&BTreeMap::from([("lift".to_string(), offset(10.0))]))
            .expect("set");
        assert_eq!(stored["lift"].axis_offset, Some(10.0));
        assert!((hub.scene_snapshot()["lift"].pose.position.z - 10.0).abs() < 1e-9);

        assert!(hub.reset_calibration("lift").expect("reset"));
        assert_eq!(hub.joints_info()["lift"].axis_offset, 0.5);
        assert_eq!(hub.scene_snapshot(), before);
        assert!(hub.calibration().is_empty());

        assert!(!hub.reset_calibration("lift").expect("reset again"));
    }

    #[test]
    fn calibration_for_unloaded_joint_waits_for_next_load() {
        let hub = hub();
        hub.set_calibration(&BTreeMap::from([("shoulder".to_string(), offset(FRAC_PI_2))]))
            .expect("set");
        hub.load_tree(arm()).expect("load");
        let tip = hub.scene_snapshot()["tip"].pose.position;
        assert!((tip.y - 1.0).abs() < 1e-9);
    }

    /// Store whose next write fails because its directory was replaced by a
    /// regular file.
    fn blocked_store(dir: &std::path::Path) -> CalibrationStore {
        let blocker = dir.join("blocker");
        std::fs::write(&blocker, "not a directory").expect("write");
        CalibrationStore::open(blocker.join("calibration.json")).expect("open")
    }

    #[test]
    fn failed_calibration_write_changes_nothing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let hub = SceneHub::new(blocked_store(dir.path()), EventBus::default(), false);
        hub.load_tree(arm()).expect("load");
        let before = hub.scene_snapshot();

        let err = hub
            .set_calibration(&BTreeMap::from([("lift".to_string(), offset(10.0))]))
            .unwrap_err();
        assert!(matches!(err, WebkinError::Store(_)));
        assert!(hub.calibration().is_empty());
        assert_eq!(hub.joints_info()["lift"].axis_offset, 0.5);
        assert_eq!(hub.scene_snapshot(), before);

        // A later load must not pick up the rejected override either.
        hub.load_tree(arm()).expect("reload");
        assert_eq!(hub.joints_info()["lift"].axis_offset, 0.5);
    }

    #[test]
    fn failed_calibration_reset_keeps_override_applied() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let sub = dir.path().join("cal");
        let store = CalibrationStore::open(sub.join("calibration.json")).expect("open");
        let hub = SceneHub::new(store, EventBus::default(), false);
        hub.load_tree(arm()).expect("load");
        hub.set_calibration(&BTreeMap::from([("lift".to_string(), offset(10.0))]))
            .expect("set");

        std::fs::remove_dir_all(&sub).expect("remove dir");
        std::fs::write(&sub, "not a directory").expect("write");

        assert!(hub.reset_calibration("lift").is_err());
        assert_eq!(hub.calibration()["lift"].axis_offset, Some(10.0));
        assert_eq!(hub.joints_info()["lift"].axis_offset, 10.0);
    }

    #[test]
    fn camera_pose_travels_in_scene_init() {
        let hub = hub();
        hub.set_camera_pose(Some(json!({"position": [2, 2, 1]})));
        hub.load_tree(arm()).expect("load");
        assert_eq!(hub.camera_pose(), Some(json!({"position": [2, 2, 1]})));
        match hub.scene_init_message() {
            SceneMessage::SceneInit { camera_pose, .. } => {
                assert_eq!(camera_pose, Some(json!({"position": [2, 2, 1]})));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn reads_before_any_load_are_empty() {
        let hub = hub();
        assert!(hub.scene_snapshot().is_empty());
        assert!(hub.joint_names().is_empty());
        assert!(hub.tree_description().is_none());
        assert_eq!(hub.set_joints(&BTreeMap::new()), 0);
    }
}
