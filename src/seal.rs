//! The controlled-document stamp, drawn rather than uploaded.
use crate::error::Result;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

pub const SEAL_WIDTH: u32 = 320;
pub const SEAL_HEIGHT: u32 = 160;
const BORDER: u32 = 12;
const INK: Rgba<u8> = Rgba([200, 0, 0, 255]);
const GLYPH_SIZE: u32 = 16;
const GLYPH_SCALE: u32 = 5;
const GLYPH_GAP: u32 = 20;

/// 受
const SHOU: [&str; 16] = [
    "..........####..",
    "..#########.....",
    "...#...#....#...",
    "....#...#..#....",
    "....#...#.#.....",
    ".##############.",
    ".#............#.",
    ".#............#.",
    "...##########...",
    "....#......#....",
    ".....#....#.....",
    "......#..#......",
    ".......##.......",
    "......#..#......",
    "....##....##....",
    "..##........###.",
];

/// 控
const KONG: [&str; 16] = [
    "..#.......#.....",
    "..#...##########",
    "..#...#........#",
    "..#......#..#...",
    "#####...#....#..",
    "..#....#......#.",
    "..#.............",
    "..#.............",
    "..#....#######..",
    "..##......#.....",
    "###.......#.....",
    "..#.......#.....",
    "..#.......#.....",
    "..#.......#.....",
    "..#...##########",
    ".##.............",
];

fn fill(img: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32) {
    for py in y..(y + h).min(img.height()) {
        for px in x..(x + w).min(img.width()) {
            img.put_pixel(px, py, INK);
        }
    }
}

fn draw_glyph(img: &mut RgbaImage, glyph: &[&str; 16], x0: u32, y0: u32) {
    for (row, line) in glyph.iter().enumerate() {
        for (col, bit) in line.bytes().enumerate() {
            if bit == b'#' {
                fill(
                    img,
                    x0 + col as u32 * GLYPH_SCALE,
                    y0 + row as u32 * GLYPH_SCALE,
                    GLYPH_SCALE,
                    GLYPH_SCALE,
                );
            }
        }
    }
}

/// Red border on a transparent background with "受控" centred inside.
pub fn draw_controlled_seal() -> RgbaImage {
    let mut img = RgbaImage::from_pixel(SEAL_WIDTH, SEAL_HEIGHT, Rgba([0, 0, 0, 0]));
    fill(&mut img, 0, 0, SEAL_WIDTH, BORDER);
    fill(&mut img, 0, SEAL_HEIGHT - BORDER, SEAL_WIDTH, BORDER);
    fill(&mut img, 0, 0, BORDER, SEAL_HEIGHT);
    fill(&mut img, SEAL_WIDTH - BORDER, 0, BORDER, SEAL_HEIGHT);

    let glyph_px = GLYPH_SIZE * GLYPH_SCALE;
    let text_width = glyph_px * 2 + GLYPH_GAP;
    let x0 = (SEAL_WIDTH - text_width) / 2;
    let y0 = (SEAL_HEIGHT - glyph_px) / 2;
    draw_glyph(&mut img, &SHOU, x0, y0);
    draw_glyph(&mut img, &KONG, x0 + glyph_px + GLYPH_GAP, y0);
    img
}

pub fn encode_png(img: RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

pub fn controlled_seal_png() -> Result<Vec<u8>> {
    encode_png(draw_controlled_seal())
}
