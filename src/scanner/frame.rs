//! Captured frames and the decoded-region overlay

use std::io::Cursor;
use std::time::Instant;

use axum::body::Bytes;
use image::{codecs::jpeg::JpegEncoder, imageops, ImageError, Rgb, RgbImage};

const OVERLAY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const OVERLAY_THICKNESS: i64 = 2;
const BANNER_HEIGHT: u32 = 24;
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const TEXT_SCALE: u32 = 3;
const TEXT_MARGIN: u32 = 4;

/// 3x5 bitmaps for the characters an ISBN can contain, one row per byte
const GLYPHS: [(char, [u8; 5]); 12] = [
    ('0', [0b111, 0b101, 0b101, 0b101, 0b111]),
    ('1', [0b010, 0b110, 0b010, 0b010, 0b111]),
    ('2', [0b111, 0b001, 0b111, 0b100, 0b111]),
    ('3', [0b111, 0b001, 0b111, 0b001, 0b111]),
    ('4', [0b101, 0b101, 0b111, 0b001, 0b001]),
    ('5', [0b111, 0b100, 0b111, 0b001, 0b111]),
    ('6', [0b111, 0b100, 0b111, 0b101, 0b111]),
    ('7', [0b111, 0b001, 0b001, 0b001, 0b001]),
    ('8', [0b111, 0b101, 0b111, 0b101, 0b111]),
    ('9', [0b111, 0b101, 0b111, 0b001, 0b111]),
    ('X', [0b101, 0b101, 0b010, 0b101, 0b101]),
    ('-', [0b000, 0b000, 0b111, 0b000, 0b000]),
];

/// A point on the frame, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Outline of a decoded symbol on the frame
pub type Polygon = Vec<Point>;

/// One image from the capture device
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Monotonic per device start, first frame is 0
    pub sequence: u64,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn rotated_180(mut self) -> Self {
        imageops::rotate180_in_place(&mut self.image);
        self
    }

    /// Copy of the frame with `polygons` outlined.
    ///
    /// `found` adds a result banner carrying the decoded identifier.
    pub fn with_overlay(&self, polygons: &[Polygon], found: Option<&str>) -> Self {
        let mut image = self.image.clone();
        for polygon in polygons {
            draw_polygon(&mut image, polygon);
        }
        if let Some(identifier) = found {
            draw_banner(&mut image);
            draw_text(&mut image, identifier, TEXT_MARGIN, TEXT_MARGIN);
        }
        Self {
            image,
            sequence: self.sequence,
            captured_at: self.captured_at,
        }
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Bytes, ImageError> {
        let mut buf = Cursor::new(Vec::with_capacity(64 * 1024));
        let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        self.image.write_with_encoder(encoder)?;
        Ok(Bytes::from(buf.into_inner()))
    }
}

fn draw_polygon(image: &mut RgbImage, polygon: &[Point]) {
    if polygon.len() < 2 {
        return;
    }
    for (idx, from) in polygon.iter().enumerate() {
        let to = polygon[(idx + 1) % polygon.len()];
        draw_line(image, *from, to);
    }
}

// Bresenham, stamped with a square brush
fn draw_line(image: &mut RgbImage, from: Point, to: Point) {
    let (mut x, mut y) = (i64::from(from.x), i64::from(from.y));
    let (x1, y1) = (i64::from(to.x), i64::from(to.y));
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        stamp(image, x, y);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn stamp(image: &mut RgbImage, x: i64, y: i64) {
    let (width, height) = (i64::from(image.width()), i64::from(image.height()));
    for oy in 0..OVERLAY_THICKNESS {
        for ox in 0..OVERLAY_THICKNESS {
            let (px, py) = (x + ox, y + oy);
            if (0..width).contains(&px) && (0..height).contains(&py) {
                image.put_pixel(px as u32, py as u32, OVERLAY_COLOR);
            }
        }
    }
}

fn draw_banner(image: &mut RgbImage) {
    let height = BANNER_HEIGHT.min(image.height());
    for y in 0..height {
        for x in 0..image.width() {
            image.put_pixel(x, y, OVERLAY_COLOR);
        }
    }
}

// Characters without a glyph leave a blank cell
fn draw_text(image: &mut RgbImage, text: &str, left: u32, top: u32) {
    let advance = 4 * TEXT_SCALE;
    for (idx, ch) in text.chars().enumerate() {
        let Some((_, rows)) = GLYPHS.iter().find(|(glyph, _)| *glyph == ch.to_ascii_uppercase()) else {
            continue;
        };
        let origin_x = left + idx as u32 * advance;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..3u32 {
                if bits & (0b100 >> col) != 0 {
                    fill_cell(image, origin_x + col * TEXT_SCALE, top + row as u32 * TEXT_SCALE);
                }
            }
        }
    }
}

fn fill_cell(image: &mut RgbImage, x: u32, y: u32) {
    for py in y..(y + TEXT_SCALE).min(image.height()) {
        for px in x..(x + TEXT_SCALE).min(image.width()) {
            image.put_pixel(px, py, TEXT_COLOR);
        }
    }
}
