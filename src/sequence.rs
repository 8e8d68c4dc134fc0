//! Rebuilds the ordered report step sequence of one annotation case.
//!
//! A case directory holds one labelme-style JSON file per physical view.
//! The builder turns those files into a leading originals group followed by
//! one group per finding flag, each group holding a per-view list of
//! (cumulative mask, description) steps. Every data-quality problem found
//! on the way lands in the case log instead of aborting the build.

use anyhow::Result;
use image::{DynamicImage, GrayImage};
use std::path::Path;

use crate::data::{self, ShapeType, ViewFile};
use crate::labels;
use crate::raster;

pub const ORIGINALS_CAPTION: &str = "Original chest x-ray images obtained";

/// One emitted report step: a cumulative binary mask plus the finding text
/// it illustrates.
#[derive(Debug, Clone)]
pub struct Step {
    pub mask: GrayImage,
    pub description: String,
}

/// The steps of one view under one flag, in narration order.
#[derive(Debug, Clone)]
pub struct ViewSteps {
    pub file: String,
    pub steps: Vec<Step>,
}

/// All views of the case for one finding flag, plus the synthesized
/// caption line.
#[derive(Debug, Clone)]
pub struct FindingGroup {
    pub flag: String,
    pub views: Vec<ViewSteps>,
    pub caption: String,
}

/// A decoded original view image, keyed by its annotation file name.
#[derive(Debug, Clone)]
pub struct OriginalImage {
    pub file: String,
    pub image: DynamicImage,
}

/// The full rebuilt sequence: originals first, then one group per flag in
/// working-list order.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub originals: Vec<OriginalImage>,
    pub originals_caption: String,
    pub groups: Vec<FindingGroup>,
}

/// Append-only warning log for one build. Duplicates are kept as appended
/// and removed only for display.
#[derive(Debug, Clone, Default)]
pub struct CaseLog {
    entries: Vec<String>,
}

impl CaseLog {
    pub fn warn(&mut self, message: impl Into<String>) {
        self.entries.push(message.into());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Warnings with duplicates removed, first occurrence order preserved.
    pub fn deduped(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.entries
            .iter()
            .filter(|entry| seen.insert(entry.as_str()))
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub sequence: Sequence,
    pub log: CaseLog,
}

/// Flag names are compared after stripping surrounding spaces, tabs,
/// newlines and periods, which annotators routinely leave behind when
/// hand-editing them.
pub fn normalize_flag(name: &str) -> String {
    name.trim_matches(|c| c == ' ' || c == '\t' || c == '\n' || c == '.')
        .to_string()
}

/// Strip exactly one trailing '.' or newline from a description before it
/// is compared or displayed.
fn trim_description(description: &str) -> &str {
    description
        .strip_suffix('.')
        .or_else(|| description.strip_suffix('\n'))
        .unwrap_or(description)
}

/// Rebuild the report step sequence for one case directory.
///
/// Returns `None` when the directory holds no annotation files. Structural
/// failures (unreadable directory, unparsable JSON) propagate; every
/// data-quality problem inside a parsed file is logged and worked around.
pub fn build_case(dir: &Path) -> Result<Option<BuildOutput>> {
    let views = data::load_case_dir(dir)?;
    if views.is_empty() {
        return Ok(None);
    }
    Ok(Some(build_views(&views)))
}

/// The builder proper, on already parsed views. Pure: same input, same
/// sequence and same log.
pub fn build_views(views: &[ViewFile]) -> BuildOutput {
    let mut log = CaseLog::default();

    // Pass 1: decode embedded images and collect the reference flag list
    // from report-level flags, first-seen order. A file without a usable
    // image contributes neither an original nor reference flags.
    let mut originals = Vec::new();
    let mut reference_flags: Vec<String> = Vec::new();
    for view in views {
        let Some(blob) = view.record.image_data.as_deref() else {
            log.warn(format!("{} has empty imageData", view.name));
            continue;
        };
        match data::decode_image(blob) {
            Ok(image) => originals.push(OriginalImage {
                file: view.name.clone(),
                image,
            }),
            Err(err) => {
                log.warn(format!("{}: failed to decode imageData: {err}", view.name));
                continue;
            }
        }
        for name in view.record.flags.keys() {
            let name = normalize_flag(name);
            if !reference_flags.contains(&name) {
                reference_flags.push(name);
            }
        }
    }

    // Pass 2: the working flag list. It is seeded with the first reference
    // flag whether or not any shape marks it true (longstanding behavior
    // the reviewers rely on), then extended with every flag some shape
    // marks true, in discovery order.
    let mut working_flags: Vec<String> = Vec::new();
    if let Some(first) = reference_flags.first() {
        working_flags.push(first.clone());
    }
    for view in views {
        for shape in &view.record.shapes {
            for (name, &value) in &shape.flags {
                let name = normalize_flag(name);
                if value && !working_flags.contains(&name) {
                    working_flags.push(name);
                }
            }
        }
    }

    for reference in &reference_flags {
        if !working_flags.contains(reference) {
            log.warn(format!(
                "reference flag {reference} not annotated, ignore if this is due to a report edit"
            ));
        }
    }

    // Pass 3: one finding group per working flag, one step list per view.
    let mut groups = Vec::with_capacity(working_flags.len());
    for flag in &working_flags {
        let group_views: Vec<ViewSteps> = views
            .iter()
            .map(|view| build_view_steps(view, flag, &mut log))
            .collect();
        groups.push(FindingGroup {
            flag: flag.clone(),
            views: group_views,
            caption: format!("Findings: {flag}"),
        });
    }

    BuildOutput {
        sequence: Sequence {
            originals,
            originals_caption: ORIGINALS_CAPTION.to_string(),
            groups,
        },
        log,
    }
}

/// How an accepted shape lands in the growing step list.
enum StepUpdate {
    AppendNew,
    MergeIntoLast,
}

impl ViewSteps {
    fn new(file: &str) -> Self {
        ViewSteps {
            file: file.to_string(),
            steps: Vec::new(),
        }
    }

    /// Decide whether the next shape merges into the last step or opens a
    /// new one, and hand back the mask the rasterization merges onto:
    /// the previous cumulative mask when the description repeats, a blank
    /// canvas otherwise.
    fn begin(&self, description: &str, width: u32, height: u32) -> (StepUpdate, GrayImage) {
        match self.steps.last() {
            Some(last) if last.description == description => {
                (StepUpdate::MergeIntoLast, last.mask.clone())
            }
            _ => (StepUpdate::AppendNew, GrayImage::new(width, height)),
        }
    }

    fn apply(&mut self, update: StepUpdate, mask: GrayImage, description: &str) {
        match update {
            StepUpdate::MergeIntoLast => {
                if let Some(last) = self.steps.last_mut() {
                    last.mask = mask;
                }
            }
            StepUpdate::AppendNew => self.steps.push(Step {
                mask,
                description: description.to_string(),
            }),
        }
    }
}

fn build_view_steps(view: &ViewFile, flag: &str, log: &mut CaseLog) -> ViewSteps {
    let record = &view.record;
    let (width, height) = (record.image_width, record.image_height);
    let mut steps = ViewSteps::new(&view.name);

    for shape in &record.shapes {
        let label = shape.label.as_str();
        let Some(expected) = labels::expected_shape_type(label) else {
            log.warn(format!("unknown label: {label}"));
            continue;
        };
        let shape_type = ShapeType::from_name(&shape.shape_type);
        if shape_type != Some(expected) {
            log.warn(format!(
                "{label} is annotated as {}, expected {expected}",
                shape.shape_type
            ));
        }
        let marked = shape
            .flags
            .iter()
            .any(|(name, &value)| value && normalize_flag(name) == flag);
        if !marked {
            continue;
        }
        let Some(description) = shape.description.as_deref() else {
            log.warn(format!("{label} has an empty description, please fill it in"));
            continue;
        };
        let description = trim_description(description);
        if shape.points.len() <= 1 && shape_type != Some(ShapeType::Point) {
            log.warn(format!(
                "{label} is not a point annotation but has fewer than two points"
            ));
            continue;
        }

        let (update, base) = steps.begin(description, width, height);
        let fresh = match raster::rasterize(shape_type, &shape.points, width, height) {
            Ok(canvas) => canvas,
            Err(err) => {
                log.warn(format!("failed to rasterize {label}: {err}"));
                continue;
            }
        };
        let merged = raster::merge_masks(&base, &fresh);
        steps.apply(update, merged, description);
    }
    steps
}
