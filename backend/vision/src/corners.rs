//! Document corners pointed out by the vision model, and the perspective
//! warp that turns the photographed quadrilateral into an upright page.

use bilbot_core::{BilboError, ImagePayload, VisionModel};
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::enhance::sample_bilinear;
use crate::prepare::{decode, downscale, encode_jpeg};

pub const CORNERS_PROMPT: &str = "Find the four corners of the document visible in this image.

The corners should be given in this order: top-left, top-right, bottom-right, bottom-left.

Use pixel coordinates of this image and answer with JSON only, in exactly this structure:
{\"top_left\": {\"x\": 0, \"y\": 0}, \"top_right\": {\"x\": 0, \"y\": 0}, \"bottom_right\": {\"x\": 0, \"y\": 0}, \"bottom_left\": {\"x\": 0, \"y\": 0}}";

/// Corners closer than this, in pixels, do not outline a document.
const MIN_CORNER_DISTANCE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentCorners {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl DocumentCorners {
    /// Label four points by position, whatever order they came in.
    ///
    /// Top-left has the smallest `x + y`, bottom-right the largest;
    /// top-right has the smallest `y - x`, bottom-left the largest.
    pub fn from_points(points: [Point; 4]) -> Self {
        let sum = |p: &Point| p.x + p.y;
        let diff = |p: &Point| p.y - p.x;
        Self {
            top_left: extreme(&points, sum, false),
            top_right: extreme(&points, diff, false),
            bottom_right: extreme(&points, sum, true),
            bottom_left: extreme(&points, diff, true),
        }
    }

    pub fn points(&self) -> [Point; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }

    /// Width and height of the upright page: the longer of each pair of opposite edges.
    pub fn output_size(&self) -> (u32, u32) {
        let width = self.top_left.distance(&self.top_right).max(self.bottom_left.distance(&self.bottom_right));
        let height = self.top_left.distance(&self.bottom_left).max(self.top_right.distance(&self.bottom_right));
        (width as u32, height as u32)
    }

    /// Shoelace area of the quadrilateral.
    fn area(&self) -> f32 {
        let pts = self.points();
        let twice: f32 = (0..4)
            .map(|i| {
                let (a, b) = (pts[i], pts[(i + 1) % 4]);
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice.abs() / 2.0
    }

    /// All four corners lie inside a `width`×`height` image and span a real page.
    pub fn is_usable(&self, width: u32, height: u32) -> bool {
        let pts = self.points();
        let inside = pts.iter().all(|p| {
            p.x.is_finite()
                && p.y.is_finite()
                && (-1.0..=width as f32 + 1.0).contains(&p.x)
                && (-1.0..=height as f32 + 1.0).contains(&p.y)
        });
        let spread = (0..4).all(|i| ((i + 1)..4).all(|j| pts[i].distance(&pts[j]) >= MIN_CORNER_DISTANCE));
        inside && spread && self.area() >= MIN_CORNER_DISTANCE * MIN_CORNER_DISTANCE
    }
}

fn extreme(points: &[Point; 4], key: impl Fn(&Point) -> f32, largest: bool) -> Point {
    let mut best = points[0];
    for p in &points[1..] {
        let better = if largest { key(p) > key(&best) } else { key(p) < key(&best) };
        if better {
            best = *p;
        }
    }
    best
}

/// Read corners from a model answer. Surrounding prose and code fences are ignored.
pub fn parse_corners(text: &str) -> Option<DocumentCorners> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let raw: DocumentCorners = serde_json::from_str(&text[start..=end]).ok()?;
    Some(DocumentCorners::from_points(raw.points()))
}

/// Homography taking output pixel `(u, v)` to source `(x, y)`, from four point pairs.
fn homography(from: [Point; 4], to: [Point; 4]) -> Option<[f64; 8]> {
    let mut rows = [[0f64; 9]; 8];
    for (i, (f, t)) in from.iter().zip(to.iter()).enumerate() {
        let (u, v, x, y) = (f64::from(f.x), f64::from(f.y), f64::from(t.x), f64::from(t.y));
        rows[2 * i] = [u, v, 1.0, 0.0, 0.0, 0.0, -u * x, -v * x, x];
        rows[2 * i + 1] = [0.0, 0.0, 0.0, u, v, 1.0, -u * y, -v * y, y];
    }
    solve(rows)
}

/// Gaussian elimination with partial pivoting on an augmented 8×9 system.
fn solve(mut rows: [[f64; 9]; 8]) -> Option<[f64; 8]> {
    for col in 0..8 {
        let pivot = (col..8).max_by(|&a, &b| rows[a][col].abs().total_cmp(&rows[b][col].abs()))?;
        if rows[pivot][col].abs() < 1e-9 {
            return None;
        }
        rows.swap(col, pivot);
        for row in 0..8 {
            if row != col {
                let factor = rows[row][col] / rows[col][col];
                for k in col..9 {
                    rows[row][k] -= factor * rows[col][k];
                }
            }
        }
    }
    let mut h = [0f64; 8];
    for (i, value) in h.iter_mut().enumerate() {
        *value = rows[i][8] / rows[i][i];
    }
    Some(h)
}

/// Cut the page outlined by `corners` out of `src` and straighten it.
///
/// `None` when the corners do not define a perspective transform.
pub fn four_point_warp(src: &RgbImage, corners: &DocumentCorners) -> Option<RgbImage> {
    let (width, height) = corners.output_size();
    if width < 2 || height < 2 || src.width() == 0 || src.height() == 0 {
        return None;
    }
    let (w, h) = ((width - 1) as f32, (height - 1) as f32);
    let page = [Point::new(0.0, 0.0), Point::new(w, 0.0), Point::new(w, h), Point::new(0.0, h)];
    let m = homography(page, corners.points())?;

    Some(RgbImage::from_fn(width, height, |u, v| {
        let (u, v) = (f64::from(u), f64::from(v));
        let denom = m[6] * u + m[7] * v + 1.0;
        let x = (m[0] * u + m[1] * v + m[2]) / denom;
        let y = (m[3] * u + m[4] * v + m[5]) / denom;
        sample_bilinear(src, x as f32, y as f32)
    }))
}

/// Ask `model` where the document's corners are in `image`.
pub async fn detect_corners(model: &dyn VisionModel, image: &ImagePayload) -> Result<DocumentCorners, BilboError> {
    let answer = model
        .generate(image, CORNERS_PROMPT)
        .await
        .map_err(|e| BilboError::Model { provider: model.name().to_string(), message: format!("{e:#}") })?;
    debug!(chars = answer.len(), "Corner detection answered");
    parse_corners(&answer)
        .ok_or_else(|| BilboError::Image("model answer did not contain four document corners".to_string()))
}

/// A page cut out and straightened by [`straighten_document`].
#[derive(Debug, Clone)]
pub struct StraightenedDocument {
    pub corners: DocumentCorners,
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

/// Downscale to `max_dimension`, ask the model for the page corners on that
/// copy, then warp the page upright.
pub async fn straighten_document(
    model: &dyn VisionModel,
    bytes: Vec<u8>,
    max_dimension: u32,
) -> Result<StraightenedDocument, BilboError> {
    let (rgb, sent) = tokio::task::spawn_blocking(move || {
        let rgb = downscale(decode(&bytes)?, max_dimension).to_rgb8();
        let sent = encode_jpeg(&DynamicImage::ImageRgb8(rgb.clone()))?;
        Ok::<_, BilboError>((rgb, sent))
    })
    .await
    .map_err(|e| BilboError::Image(format!("image task failed: {e}")))??;

    let corners = detect_corners(model, &ImagePayload::jpeg(sent)).await?;
    if !corners.is_usable(rgb.width(), rgb.height()) {
        return Err(BilboError::Image(format!(
            "corners {:?} do not outline a document in a {}x{} image",
            corners.points(),
            rgb.width(),
            rgb.height()
        )));
    }

    let warped = tokio::task::spawn_blocking(move || {
        let page = four_point_warp(&rgb, &corners)
            .ok_or_else(|| BilboError::Image("corners do not define a perspective transform".to_string()))?;
        let (width, height) = page.dimensions();
        encode_jpeg(&DynamicImage::ImageRgb8(page)).map(|jpeg| (width, height, jpeg))
    })
    .await
    .map_err(|e| BilboError::Image(format!("warp task failed: {e}")))?;
    let (width, height, jpeg) = warped?;

    info!(width, height, "Document straightened");
    Ok(StraightenedDocument { corners, width, height, jpeg })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use image::{GenericImageView, ImageOutputFormat, Rgb};
    use std::io::Cursor;

    struct CornerModel(&'static str);

    #[async_trait]
    impl VisionModel for CornerModel {
        fn name(&self) -> &str {
            "corners"
        }

        fn model(&self) -> &str {
            "corners-1"
        }

        async fn generate(&self, _image: &ImagePayload, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn coordinate_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 0]))
    }

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> DocumentCorners {
        DocumentCorners {
            top_left: Point::new(x0, y0),
            top_right: Point::new(x1, y0),
            bottom_right: Point::new(x1, y1),
            bottom_left: Point::new(x0, y1),
        }
    }

    #[test]
    fn points_are_labelled_by_position() {
        let shuffled = [
            Point::new(110.0, 70.0),
            Point::new(10.0, 20.0),
            Point::new(10.0, 70.0),
            Point::new(110.0, 20.0),
        ];
        assert_eq!(DocumentCorners::from_points(shuffled), rect(10.0, 20.0, 110.0, 70.0));
    }

    #[test]
    fn parses_fenced_answer() {
        let text = "Here you go:\n```json\n{\"top_left\": {\"x\": 12, \"y\": 8}, \"top_right\": {\"x\": 190, \"y\": 10}, \
                    \"bottom_right\": {\"x\": 188, \"y\": 95}, \"bottom_left\": {\"x\": 14, \"y\": 92}}\n```";
        let corners = parse_corners(text).unwrap();
        assert_eq!(corners.top_left, Point::new(12.0, 8.0));
        assert_eq!(corners.bottom_left, Point::new(14.0, 92.0));
        assert!(parse_corners("no corners here").is_none());
    }

    #[test]
    fn collapsed_corners_are_unusable() {
        assert!(rect(10.0, 20.0, 110.0, 70.0).is_usable(200, 100));
        assert!(!rect(10.0, 20.0, 14.0, 22.0).is_usable(200, 100));
        assert!(!rect(10.0, 20.0, 310.0, 70.0).is_usable(200, 100));
    }

    #[test]
    fn rectangle_warp_is_a_crop() {
        let src = coordinate_image(200, 100);
        let page = four_point_warp(&src, &rect(10.0, 20.0, 110.0, 70.0)).unwrap();
        assert_eq!(page.dimensions(), (100, 50));
        assert_eq!(*page.get_pixel(0, 0), Rgb([10, 20, 0]));
        assert_eq!(*page.get_pixel(99, 49), Rgb([110, 70, 0]));
    }

    #[test]
    fn tilted_page_is_straightened() {
        let src = coordinate_image(200, 200);
        let corners = DocumentCorners::from_points([
            Point::new(50.0, 20.0),
            Point::new(150.0, 40.0),
            Point::new(130.0, 140.0),
            Point::new(30.0, 120.0),
        ]);
        let page = four_point_warp(&src, &corners).unwrap();
        assert_eq!(*page.get_pixel(0, 0), Rgb([50, 20, 0]));
        let (w, h) = page.dimensions();
        assert_eq!(*page.get_pixel(w - 1, h - 1), Rgb([130, 140, 0]));
    }

    #[tokio::test]
    async fn straightens_with_model_corners() {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(coordinate_image(200, 100))
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        let model = CornerModel(
            r#"{"top_left": {"x": 20, "y": 10}, "top_right": {"x": 180, "y": 10}, "bottom_right": {"x": 180, "y": 90}, "bottom_left": {"x": 20, "y": 90}}"#,
        );

        let out = straighten_document(&model, cursor.into_inner(), 1200).await.unwrap();
        assert_eq!((out.width, out.height), (160, 80));
        assert_eq!(image::load_from_memory(&out.jpeg).unwrap().dimensions(), (160, 80));
        assert_eq!(out.corners.top_left, Point::new(20.0, 10.0));
    }

    #[tokio::test]
    async fn unreadable_answer_is_an_image_error() {
        let model = CornerModel("I can't see a document.");
        let err = detect_corners(&model, &ImagePayload::jpeg(vec![0xFF, 0xD8])).await.unwrap_err();
        assert!(matches!(err, BilboError::Image(_)));
    }
}
