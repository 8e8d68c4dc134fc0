use anyhow::{bail, Result};
use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_polygon_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;

use crate::data::ShapeType;

pub const FILL: Luma<u8> = Luma([255u8]);

/// Stroke width for line and linestrip annotations, in pixels.
const LINE_WIDTH: f64 = 13.0;
/// Radius of the disk drawn for each point annotation, in pixels.
const POINT_RADIUS: i32 = 15;

/// Draw one shape onto a blank single-channel canvas of the view's size.
///
/// An unrecognized shape type leaves the canvas blank; the caller has
/// already warned about the label/type disagreement. Malformed geometry
/// (non-finite coordinates, degenerate polygons, out-of-order rectangle
/// corners) returns an error for the caller to log, never a panic.
pub fn rasterize(
    shape_type: Option<ShapeType>,
    points: &[(f64, f64)],
    width: u32,
    height: u32,
) -> Result<GrayImage> {
    for &(x, y) in points {
        if !x.is_finite() || !y.is_finite() {
            bail!("non-finite coordinate ({x}, {y})");
        }
    }

    let mut canvas = GrayImage::new(width, height);
    match shape_type {
        Some(ShapeType::Polygon) => fill_polygon(&mut canvas, points)?,
        Some(ShapeType::Line) | Some(ShapeType::Linestrip) => {
            for pair in points.windows(2) {
                thick_line(&mut canvas, pair[0], pair[1]);
            }
        }
        Some(ShapeType::Point) => {
            for &(x, y) in points {
                let center = (x.round() as i32, y.round() as i32);
                draw_filled_circle_mut(&mut canvas, center, POINT_RADIUS, FILL);
            }
        }
        Some(ShapeType::Rectangle) => fill_rectangle(&mut canvas, points)?,
        None => {}
    }
    Ok(canvas)
}

/// Pixel-wise sum of two equally sized masks with the binary saturation
/// rule: any sum above 250 clamps to 255, so unions of binary masks stay
/// binary instead of overflowing.
pub fn merge_masks(base: &GrayImage, fresh: &GrayImage) -> GrayImage {
    let mut merged = base.clone();
    for (dst, src) in merged.pixels_mut().zip(fresh.pixels()) {
        let sum = dst[0].saturating_add(src[0]);
        dst[0] = if sum > 250 { 255 } else { sum };
    }
    merged
}

fn fill_polygon(canvas: &mut GrayImage, points: &[(f64, f64)]) -> Result<()> {
    let mut poly: Vec<Point<i32>> = points
        .iter()
        .map(|&(x, y)| Point::new(x.round() as i32, y.round() as i32))
        .collect();
    // draw_polygon_mut expects an open contour.
    while poly.len() > 1 && poly.last() == poly.first() {
        poly.pop();
    }
    if poly.len() < 3 {
        bail!("polygon needs at least three distinct vertices, got {}", poly.len());
    }
    draw_polygon_mut(canvas, &poly, FILL);
    Ok(())
}

/// One thick segment, drawn as the filled quad running LINE_WIDTH/2 to
/// either side of the center line. Zero-length segments draw nothing.
fn thick_line(canvas: &mut GrayImage, a: (f64, f64), b: (f64, f64)) {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let length = (dx * dx + dy * dy).sqrt();
    if length == 0.0 {
        return;
    }
    let half = LINE_WIDTH / 2.0;
    let (nx, ny) = (-dy / length * half, dx / length * half);
    let quad = [
        (a.0 + nx, a.1 + ny),
        (b.0 + nx, b.1 + ny),
        (b.0 - nx, b.1 - ny),
        (a.0 - nx, a.1 - ny),
    ];
    let mut poly: Vec<Point<i32>> = quad
        .iter()
        .map(|&(x, y)| Point::new(x.round() as i32, y.round() as i32))
        .collect();
    poly.dedup();
    while poly.len() > 1 && poly.last() == poly.first() {
        poly.pop();
    }
    if poly.len() >= 3 {
        draw_polygon_mut(canvas, &poly, FILL);
    }
}

fn fill_rectangle(canvas: &mut GrayImage, points: &[(f64, f64)]) -> Result<()> {
    if points.len() < 2 {
        bail!("rectangle needs two corner points, got {}", points.len());
    }
    // Corner coordinates are coerced to integers by truncation.
    let (x0, y0) = (points[0].0.trunc() as i32, points[0].1.trunc() as i32);
    let (x1, y1) = (points[1].0.trunc() as i32, points[1].1.trunc() as i32);
    if x1 < x0 || y1 < y0 {
        bail!("rectangle corners out of order: ({x0}, {y0}) to ({x1}, {y1})");
    }
    let rect = Rect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
    draw_filled_rect_mut(canvas, rect, FILL);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit_pixels(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p[0] > 250).count()
    }

    #[test]
    fn rectangle_coordinates_truncate_to_integers() {
        let fractional = rasterize(
            Some(ShapeType::Rectangle),
            &[(10.7, 10.2), (50.9, 50.1)],
            64,
            64,
        )
        .unwrap();
        let integral = rasterize(
            Some(ShapeType::Rectangle),
            &[(10.0, 10.0), (50.0, 50.0)],
            64,
            64,
        )
        .unwrap();
        assert_eq!(fractional.as_raw(), integral.as_raw());
        assert_eq!(lit_pixels(&integral), 41 * 41);
    }

    #[test]
    fn rectangle_rejects_reversed_corners() {
        let err = rasterize(
            Some(ShapeType::Rectangle),
            &[(50.0, 50.0), (10.0, 10.0)],
            64,
            64,
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of order"));
    }

    #[test]
    fn polygon_fills_its_interior() {
        let mask = rasterize(
            Some(ShapeType::Polygon),
            &[(2.0, 2.0), (20.0, 2.0), (20.0, 20.0), (2.0, 20.0)],
            32,
            32,
        )
        .unwrap();
        assert!(mask.get_pixel(10, 10)[0] > 250);
        assert_eq!(mask.get_pixel(30, 30)[0], 0);
    }

    #[test]
    fn degenerate_polygon_is_an_error() {
        let err = rasterize(Some(ShapeType::Polygon), &[(5.0, 5.0), (5.0, 5.0)], 32, 32)
            .unwrap_err();
        assert!(err.to_string().contains("polygon"));
    }

    #[test]
    fn non_finite_coordinates_are_an_error() {
        let err = rasterize(
            Some(ShapeType::Polygon),
            &[(f64::NAN, 1.0), (2.0, 2.0), (3.0, 1.0)],
            32,
            32,
        )
        .unwrap_err();
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn point_draws_a_disk_per_coordinate() {
        let mask = rasterize(Some(ShapeType::Point), &[(40.0, 40.0)], 80, 80).unwrap();
        assert!(mask.get_pixel(40, 40)[0] > 250);
        assert!(mask.get_pixel(40 + 14, 40)[0] > 250);
        assert_eq!(mask.get_pixel(40 + 20, 40)[0], 0);
    }

    #[test]
    fn line_stroke_has_width() {
        let mask = rasterize(
            Some(ShapeType::Line),
            &[(10.0, 20.0), (60.0, 20.0)],
            80,
            40,
        )
        .unwrap();
        // 13 px wide stroke covers several rows either side of the center.
        assert!(mask.get_pixel(30, 20)[0] > 250);
        assert!(mask.get_pixel(30, 15)[0] > 250);
        assert!(mask.get_pixel(30, 25)[0] > 250);
        assert_eq!(mask.get_pixel(30, 2)[0], 0);
    }

    #[test]
    fn unknown_shape_type_leaves_canvas_blank() {
        let mask = rasterize(None, &[(1.0, 1.0), (2.0, 2.0)], 16, 16).unwrap();
        assert_eq!(lit_pixels(&mask), 0);
    }

    #[test]
    fn merge_saturates_overlap_and_keeps_masks_binary() {
        let a = rasterize(
            Some(ShapeType::Rectangle),
            &[(0.0, 0.0), (7.0, 7.0)],
            16,
            16,
        )
        .unwrap();
        let b = rasterize(
            Some(ShapeType::Rectangle),
            &[(4.0, 4.0), (11.0, 11.0)],
            16,
            16,
        )
        .unwrap();
        let merged = merge_masks(&a, &b);
        for pixel in merged.pixels() {
            assert!(pixel[0] == 0 || pixel[0] == 255);
        }
        // Overlap stays saturated, union covers both rectangles.
        assert_eq!(merged.get_pixel(5, 5)[0], 255);
        assert_eq!(merged.get_pixel(1, 1)[0], 255);
        assert_eq!(merged.get_pixel(10, 10)[0], 255);
        assert_eq!(merged.get_pixel(14, 14)[0], 0);
    }
}
