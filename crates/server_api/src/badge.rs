//! Printable badges: the scan payload as a QR code PNG, and a zip of every
//! team's badge.

use std::{
    collections::HashSet,
    io::{Cursor, Write},
};

use anyhow::Context;
use image::{imageops, DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::QrCode;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

pub const MODULE_PIXELS: u32 = 16;
pub const BORDER_MODULES: u32 = 6;
pub const EXPORT_FILE_NAME: &str = "All_QRs.zip";

pub fn render_png(payload: &str) -> anyhow::Result<Vec<u8>> {
    let code = QrCode::new(payload.as_bytes()).context("payload does not fit in a QR code")?;
    let modules = code
        .render::<Luma<u8>>()
        .module_dimensions(MODULE_PIXELS, MODULE_PIXELS)
        .quiet_zone(false)
        .build();

    let border = BORDER_MODULES * MODULE_PIXELS;
    let mut canvas = GrayImage::from_pixel(
        modules.width() + 2 * border,
        modules.height() + 2 * border,
        Luma([255]),
    );
    imageops::overlay(&mut canvas, &modules, i64::from(border), i64::from(border));

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(canvas)
        .write_to(&mut out, ImageFormat::Png)
        .context("failed to encode badge png")?;
    Ok(out.into_inner())
}

/// `badges` are `(team_id, team_name, png)`. Entries are stored uncompressed;
/// PNG data is already deflated.
pub fn zip_badges(badges: &[(String, String, Vec<u8>)]) -> anyhow::Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut taken = HashSet::new();

    for (team_id, team_name, png) in badges {
        let mut name = format!("{}.png", file_stem(team_name, team_id));
        if !taken.insert(name.clone()) {
            name = format!("{} ({team_id}).png", file_stem(team_name, team_id));
            taken.insert(name.clone());
        }
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("failed to add badge for team {team_id}"))?;
        zip.write_all(png)?;
    }

    Ok(zip.finish().context("failed to finish badge archive")?.into_inner())
}

fn file_stem(team_name: &str, team_id: &str) -> String {
    let stem: String = team_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        team_id.to_string()
    } else {
        stem
    }
}
