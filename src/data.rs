use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::DynamicImage;
use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Geometry kind of a single annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeType {
    Polygon,
    Line,
    Linestrip,
    Point,
    Rectangle,
}

impl ShapeType {
    /// Parse the `shape_type` string of an annotation file. Returns `None`
    /// for anything outside the known set, which downstream treats as a
    /// blank (no-op) rasterization.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "polygon" => Some(ShapeType::Polygon),
            "line" => Some(ShapeType::Line),
            "linestrip" => Some(ShapeType::Linestrip),
            "point" => Some(ShapeType::Point),
            "rectangle" => Some(ShapeType::Rectangle),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShapeType::Polygon => "polygon",
            ShapeType::Line => "line",
            ShapeType::Linestrip => "linestrip",
            ShapeType::Point => "point",
            ShapeType::Rectangle => "rectangle",
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One hand-drawn annotation inside a view file.
///
/// Flag maps keep file order: the working flag list is built in
/// first-seen order, so an unordered map would reshuffle the output.
#[derive(Debug, Clone, Deserialize)]
pub struct Shape {
    pub label: String,
    pub shape_type: String,
    #[serde(default)]
    pub points: Vec<(f64, f64)>,
    #[serde(default)]
    pub flags: IndexMap<String, bool>,
    pub description: Option<String>,
    #[serde(default)]
    pub group_id: Option<serde_json::Value>,
}

/// One annotation file: a single physical view of the case.
#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationRecord {
    #[serde(rename = "imageData")]
    pub image_data: Option<String>,
    #[serde(rename = "imageWidth")]
    pub image_width: u32,
    #[serde(rename = "imageHeight")]
    pub image_height: u32,
    #[serde(default)]
    pub flags: IndexMap<String, bool>,
    #[serde(default)]
    pub shapes: Vec<Shape>,
}

/// A parsed annotation file together with its file name, which doubles as
/// the view identifier throughout the pipeline.
#[derive(Debug, Clone)]
pub struct ViewFile {
    pub name: String,
    pub record: AnnotationRecord,
}

/// Read and parse every `.json` file directly inside a case directory,
/// sorted by file name so rebuilds are deterministic.
///
/// I/O and JSON syntax errors propagate; the caller treats the case as
/// unloadable. Everything semantically wrong inside a parsed file is the
/// sequence builder's job to log.
pub fn load_case_dir(dir: &Path) -> Result<Vec<ViewFile>> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read case directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".json"))
        .collect();
    names.sort();

    let mut views = Vec::with_capacity(names.len());
    for name in names {
        let path = dir.join(&name);
        let file =
            File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
        let record: AnnotationRecord = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse {}", path.display()))?;
        views.push(ViewFile { name, record });
    }
    Ok(views)
}

/// Decode an embedded `imageData` blob into a raster.
pub fn decode_image(data: &str) -> Result<DynamicImage> {
    let bytes = BASE64
        .decode(data.trim())
        .context("imageData is not valid base64")?;
    image::load_from_memory(&bytes).context("imageData did not decode to an image")
}

/// List the case directories under a review root.
///
/// Cases are named `p{patient}-s{study}`; they sort numerically by patient
/// then study. Directories that do not match the pattern are kept, sorted
/// by name after the conforming ones.
pub fn list_case_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<(Option<(u64, u64)>, String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !name.starts_with('p') {
            continue;
        }
        dirs.push((case_sort_key(name), name.to_string(), entry.into_path()));
    }
    dirs.sort_by(|a, b| {
        let rank = |key: &Option<(u64, u64)>| key.unwrap_or((u64::MAX, u64::MAX));
        rank(&a.0).cmp(&rank(&b.0)).then_with(|| a.1.cmp(&b.1))
    });
    Ok(dirs.into_iter().map(|(_, _, path)| path).collect())
}

fn case_sort_key(name: &str) -> Option<(u64, u64)> {
    let (patient, study) = name.split_once('-')?;
    let patient = patient.strip_prefix('p')?.parse().ok()?;
    let study = study.strip_prefix('s')?.parse().ok()?;
    Some((patient, study))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_type_round_trips_known_names() {
        for name in ["polygon", "line", "linestrip", "point", "rectangle"] {
            let ty = ShapeType::from_name(name).unwrap();
            assert_eq!(ty.name(), name);
        }
        assert_eq!(ShapeType::from_name("circle"), None);
    }

    #[test]
    fn case_dirs_sort_by_patient_then_study() {
        let temp = tempfile::tempdir().expect("create temp dir");
        for name in ["p10-s2", "p2-s10", "p2-s3", "pX", "notacase"] {
            std::fs::create_dir(temp.path().join(name)).unwrap();
        }

        let dirs = list_case_dirs(temp.path()).unwrap();
        let names: Vec<_> = dirs
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        // "notacase" is filtered out, "pX" sorts after the numeric cases.
        assert_eq!(names, ["p2-s3", "p2-s10", "p10-s2", "pX"]);
    }

    #[test]
    fn load_case_dir_keeps_file_name_order() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let record = r#"{"imageData": null, "imageWidth": 4, "imageHeight": 4,
                         "flags": {}, "shapes": []}"#;
        for name in ["b_lateral.json", "a_frontal.json", "readme.txt"] {
            std::fs::write(temp.path().join(name), record).unwrap();
        }

        let views = load_case_dir(temp.path()).unwrap();
        let names: Vec<_> = views.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["a_frontal.json", "b_lateral.json"]);
    }

    #[test]
    fn shape_flags_preserve_file_order() {
        let json = r#"{"label": "nodule", "shape_type": "polygon",
                       "points": [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]],
                       "flags": {"zebra": true, "alpha": false, "mid": true},
                       "description": "text"}"#;
        let shape: Shape = serde_json::from_str(json).unwrap();
        let keys: Vec<_> = shape.flags.keys().map(String::as_str).collect();
        assert_eq!(keys, ["zebra", "alpha", "mid"]);
    }
}
