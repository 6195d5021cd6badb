//! `webkin-loader` – turns K3D exports into WebKin tree descriptions.
//!
//! A K3D export is a `k3d.json` document (tree under the `k3d` key, plus an
//! optional `scaleDict` and `cameraPose`) next to the STL files it references,
//! either zipped into a `.k3d` archive or extracted into a directory.
//! [`K3dLoader`] converts the document into the generic tree-description
//! schema consumed by `webkin-kinematics` and remembers where the models live
//! so the HTTP layer can serve them.
//!
//! # Example
//!
//! ```rust,no_run
//! use webkin_loader::K3dLoader;
//!
//! let mut loader = K3dLoader::new();
//! let description = loader.load_path("~/robots/arm").expect("load k3d");
//! println!("root: {}", description["name"]);
//! ```

pub mod k3d;

pub use k3d::{K3dLoader, expand_home, parse_number, resolve_model_path};
