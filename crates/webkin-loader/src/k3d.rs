//! [`K3dLoader`] – K3D document conversion and model lookup.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value, json};
use tempfile::TempDir;
use tracing::{debug, info};
use webkin_types::WebkinError;
use zip::ZipArchive;

/// URL prefix under which the HTTP layer serves model files.
pub const MODELS_URL_PREFIX: &str = "/k3d/models/";

/// Name of the document inside a K3D export.
pub const K3D_DOCUMENT: &str = "k3d.json";

/// Optional per-joint calibration fields carried through the conversion.
const AXIS_FIELDS: [&str; 4] = ["axis_offset", "axis_scale", "slider_min", "slider_max"];

/// Loader for K3D exports: a zipped `.k3d` archive, an extracted directory
/// or a bare `k3d.json`.
#[derive(Debug, Default)]
pub struct K3dLoader {
    models_dir: Option<PathBuf>,
    camera_pose: Option<Value>,
    scale_dict: Map<String, Value>,
    /// Extraction directory of the last archive; removed on drop or reload.
    extracted: Option<TempDir>,
}

impl K3dLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load whatever `path` points at. `~` is expanded.
    ///
    /// * `.k3d` / `.zip` archive → extracted to a temporary directory owned
    ///   by the loader, models served from there
    /// * directory → `<dir>/k3d.json`, models served from `<dir>`
    /// * any other file → the JSON document itself, models served from its
    ///   directory
    ///
    /// # Errors
    ///
    /// Returns [`WebkinError::Loader`] when the path does not exist, the
    /// archive has no `k3d.json`, or the document cannot be read or converted.
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> Result<Value, WebkinError> {
        let path = expand_home(path.as_ref());
        if !path.exists() {
            return Err(WebkinError::Loader(format!(
                "K3D path not found: {}",
                path.display()
            )));
        }
        if path.is_dir() {
            return self.load_directory(&path);
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("k3d") || ext.eq_ignore_ascii_case("zip") => {
                self.load_archive(&path)
            }
            _ => self.load_json_file(&path),
        }
    }

    /// Extract a zipped K3D export and load it.
    ///
    /// `k3d.json` is read from wherever it sits in the archive; STL files are
    /// written under `<tmp>/models` keeping their archive paths. Other entries
    /// and entries whose names escape the extraction directory are skipped.
    pub fn load_archive(&mut self, archive_path: &Path) -> Result<Value, WebkinError> {
        let file = File::open(archive_path).map_err(|e| {
            WebkinError::Loader(format!("failed to open {}: {e}", archive_path.display()))
        })?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| {
            WebkinError::Loader(format!("invalid K3D archive {}: {e}", archive_path.display()))
        })?;

        let extracted = tempfile::Builder::new()
            .prefix("webkin_k3d_")
            .tempdir()
            .map_err(|e| WebkinError::Loader(format!("failed to create temp directory: {e}")))?;
        let models_dir = extracted.path().join("models");
        fs::create_dir_all(&models_dir).map_err(|e| loader_io("create models directory", e))?;

        let mut document = None;
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| WebkinError::Loader(format!("failed to read archive entry: {e}")))?;
            if entry.is_dir() {
                continue;
            }
            let Some(relative) = entry.enclosed_name() else {
                debug!(name = entry.name(), "skipping archive entry outside the export");
                continue;
            };
            let relative = relative.to_path_buf();
            let file_name = relative
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if file_name == K3D_DOCUMENT {
                let mut raw = String::new();
                entry
                    .read_to_string(&mut raw)
                    .map_err(|e| loader_io("read k3d.json from archive", e))?;
                document = Some(raw);
            } else if is_stl(&relative) {
                let target = models_dir.join(&relative);
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| loader_io("create model directory", e))?;
                }
                let mut out = File::create(&target).map_err(|e| loader_io("create model file", e))?;
                io::copy(&mut entry, &mut out).map_err(|e| loader_io("extract model", e))?;
                debug!(model = %relative.display(), "extracted model");
            }
        }

        let raw = document.ok_or_else(|| {
            WebkinError::Loader(format!(
                "{K3D_DOCUMENT} not found in archive {}",
                archive_path.display()
            ))
        })?;
        let raw: Value = serde_json::from_str(&raw).map_err(|e| {
            WebkinError::Loader(format!("failed to parse {K3D_DOCUMENT}: {e}"))
        })?;
        let tree = self.parse_document(&raw)?;

        // Replacing the previous extraction deletes it.
        self.models_dir = Some(models_dir);
        self.extracted = Some(extracted);
        info!(archive = %archive_path.display(), root = %tree["name"], "loaded K3D archive");
        Ok(tree)
    }

    /// Load an extracted K3D directory containing `k3d.json` and its models.
    pub fn load_directory(&mut self, dir: &Path) -> Result<Value, WebkinError> {
        let document = dir.join(K3D_DOCUMENT);
        if !document.exists() {
            return Err(WebkinError::Loader(format!(
                "{K3D_DOCUMENT} not found in {}",
                dir.display()
            )));
        }
        let raw = read_json(&document)?;
        let tree = self.parse_document(&raw)?;
        self.models_dir = Some(dir.to_path_buf());
        self.extracted = None;
        info!(dir = %dir.display(), root = %tree["name"], "loaded K3D directory");
        Ok(tree)
    }

    /// Load a single K3D (or already-converted) JSON document.
    pub fn load_json_file(&mut self, file: &Path) -> Result<Value, WebkinError> {
        let raw = read_json(file)?;
        let tree = self.parse_document(&raw)?;
        self.models_dir = file.parent().map(Path::to_path_buf);
        self.extracted = None;
        info!(file = %file.display(), root = %tree["name"], "loaded K3D document");
        Ok(tree)
    }

    /// Convert a raw K3D document into a tree description.
    ///
    /// The tree is read from the `k3d` key when present, otherwise from the
    /// document itself.
    pub fn parse_document(&mut self, raw: &Value) -> Result<Value, WebkinError> {
        self.scale_dict = raw
            .get("scaleDict")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        self.camera_pose = raw.get("cameraPose").filter(|v| !v.is_null()).cloned();

        let tree = raw.get("k3d").filter(|v| !v.is_null()).unwrap_or(raw);
        self.convert_node(tree, "$")
    }

    pub fn models_dir(&self) -> Option<&Path> {
        self.models_dir.as_deref()
    }

    pub fn has_models(&self) -> bool {
        self.models_dir.is_some()
    }

    /// `cameraPose` from the last loaded document.
    pub fn camera_pose(&self) -> Option<&Value> {
        self.camera_pose.as_ref()
    }

    fn convert_node(&self, node: &Value, path: &str) -> Result<Value, WebkinError> {
        let Some(obj) = node.as_object() else {
            // Leave structural problems for the engine to report.
            return Ok(node.clone());
        };

        let mut out = Map::new();
        out.insert(
            "name".into(),
            json!(obj.get("name").and_then(Value::as_str).unwrap_or("unnamed")),
        );
        out.insert(
            "type".into(),
            json!(obj.get("type").and_then(Value::as_str).unwrap_or("transform")),
        );

        if let Some(pose) = obj.get("pose").filter(|v| !v.is_null()) {
            out.insert(
                "pose".into(),
                json!({
                    "position": convert_numbers(pose.get("position"), &[0.0, 0.0, 0.0])?,
                    "orientation": convert_numbers(pose.get("orientation"), &[0.0, 0.0, 0.0, 1.0])?,
                }),
            );
        }

        if let Some(axis) = obj.get("axis").filter(|v| !v.is_null()) {
            out.insert("axis".into(), convert_numbers(Some(axis), &[0.0, 0.0, 0.0])?);
        }

        for field in AXIS_FIELDS {
            if let Some(value) = obj.get(field).filter(|v| !v.is_null()) {
                out.insert(field.into(), json!(parse_number(value)?));
            }
        }

        if let Some(model) = obj.get("model").filter(|v| !v.is_null()) {
            out.insert("model".into(), self.convert_model(model));
        }

        let mut children = Vec::new();
        if let Some(list) = obj.get("children").and_then(Value::as_array) {
            for (index, child) in list.iter().enumerate() {
                children.push(self.convert_node(child, &format!("{path}.children[{index}]"))?);
            }
        }
        out.insert("children".into(), Value::Array(children));

        debug!(path, name = %out["name"], "converted K3D node");
        Ok(Value::Object(out))
    }

    fn convert_model(&self, model: &Value) -> Value {
        match model.get("type").and_then(Value::as_str).unwrap_or("none") {
            "file" => {
                let stl_path = model.get("path").and_then(Value::as_str).unwrap_or("");
                let scale = self
                    .scale_dict
                    .get(stl_path)
                    .and_then(Value::as_f64)
                    .unwrap_or(1.0);
                json!({
                    "type": "stl",
                    "path": format!("{MODELS_URL_PREFIX}{stl_path}"),
                    "scale": scale,
                })
            }
            "none" => json!({"type": "none"}),
            _ => model.clone(),
        }
    }
}

/// Parse a number that may be a string using a comma decimal separator.
///
/// Non-numeric, non-string values read as `0.0`.
///
/// # Errors
///
/// Returns [`WebkinError::Loader`] for a string that is not a number.
pub fn parse_number(value: &Value) -> Result<f64, WebkinError> {
    match value {
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => s
            .trim()
            .replace(',', ".")
            .parse::<f64>()
            .map_err(|e| WebkinError::Loader(format!("invalid number {s:?}: {e}"))),
        _ => Ok(0.0),
    }
}

/// Convert a numeric list, falling back to `default` when the value is missing
/// or too short.
fn convert_numbers(value: Option<&Value>, default: &[f64]) -> Result<Value, WebkinError> {
    let Some(list) = value.and_then(Value::as_array).filter(|l| l.len() >= default.len()) else {
        return Ok(json!(default));
    };
    let numbers = list[..default.len()]
        .iter()
        .map(parse_number)
        .collect::<Result<Vec<f64>, _>>()?;
    Ok(json!(numbers))
}

/// Resolve `filename` inside `models_dir`, rejecting absolute paths and `..`
/// components. Returns `None` when the file does not exist.
pub fn resolve_model_path(models_dir: &Path, filename: &str) -> Option<PathBuf> {
    let relative = Path::new(filename);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    let candidate = models_dir.join(relative);
    candidate.is_file().then_some(candidate)
}

/// Expand a leading `~` to `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        Ok(home) => PathBuf::from(home).join(rest),
        Err(_) => path.to_path_buf(),
    }
}

fn is_stl(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("stl"))
}

fn loader_io(action: &str, e: io::Error) -> WebkinError {
    WebkinError::Loader(format!("failed to {action}: {e}"))
}

fn read_json(path: &Path) -> Result<Value, WebkinError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| WebkinError::Loader(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| WebkinError::Loader(format!("failed to parse {}: {e}", path.display())))
}
