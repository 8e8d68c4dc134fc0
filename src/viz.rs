//! Renders rebuilt sequences to PNG files: the decoded originals plus one
//! overlay frame per step, with the step mask blended over the view image.

use anyhow::{Context, Result};
use image::{GrayImage, RgbaImage};
use std::path::Path;

use crate::sequence::Sequence;

/// Overlay colors, cycled per step within a view. Fixed so two runs over
/// the same case produce identical frames.
const PALETTE: [[u8; 3]; 6] = [
    [230, 57, 70],
    [42, 157, 143],
    [38, 70, 83],
    [244, 162, 97],
    [106, 76, 147],
    [233, 196, 106],
];

/// Blend a binary mask over a frame: masked pixels keep 70% of the
/// underlying value and take 30% of the overlay color.
pub fn overlay_mask(base: &RgbaImage, mask: &GrayImage, color: [u8; 3]) -> RgbaImage {
    let mut out = base.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if x >= mask.width() || y >= mask.height() {
            continue;
        }
        if mask.get_pixel(x, y)[0] > 250 {
            for channel in 0..3 {
                pixel[channel] =
                    (pixel[channel] as f32 * 0.7 + color[channel] as f32 * 0.3) as u8;
            }
        }
    }
    out
}

/// Write the originals and every step overlay of a case into `out_dir`.
///
/// Overlays accumulate within a view, so the frame for step N shows steps
/// 0..=N, matching how a reviewer scrolls through the narration. Views
/// whose file had no decodable image are skipped; masks whose size
/// disagrees with the decoded image are skipped too (the JSON dimensions
/// lied, which the warning log already covers).
pub fn export_case_overlays(sequence: &Sequence, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    for original in &sequence.originals {
        let path = out_dir.join(format!("{}.png", file_stem(&original.file)));
        original
            .image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    for (group_idx, group) in sequence.groups.iter().enumerate() {
        for view in &group.views {
            let Some(original) = sequence
                .originals
                .iter()
                .find(|original| original.file == view.file)
            else {
                continue;
            };
            let mut frame = original.image.to_rgba8();
            for (step_idx, step) in view.steps.iter().enumerate() {
                if step.mask.dimensions() != frame.dimensions() {
                    continue;
                }
                frame = overlay_mask(&frame, &step.mask, PALETTE[step_idx % PALETTE.len()]);
                let path = out_dir.join(format!(
                    "{}_group{group_idx}_step{step_idx}.png",
                    file_stem(&view.file)
                ));
                frame
                    .save(&path)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
        }
    }
    Ok(())
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name)
        .to_string()
}
