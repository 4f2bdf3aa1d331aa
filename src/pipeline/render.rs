//! Batch previews: render a group of PDF pages into one labelled grid image.
//!
//! Each page is rasterised at 0.85 scale, shrunk to fit a 600×800 white
//! cell, and laid out two cells per row. Every cell gets a black border and
//! a red page number (absolute, 1-indexed) in a white box at its
//! bottom-right corner, which is what the batch prompt tells the model to
//! read. The grid is sent as base64 JPEG.
//!
//! ## Blocking work
//!
//! pdfium is synchronous and not async-safe, so opening the document and
//! rendering every batch happens inside `tokio::task::spawn_blocking` in
//! [`render_batches`].

use crate::error::ClassifyError;
use crate::pipeline::dispatch::{partition, Batch, BatchRenderer};
use crate::pipeline::encode::{encode_jpeg_base64, JPEG_QUALITY};
use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const RENDER_SCALE: f32 = 0.85;
pub const CELL_WIDTH: u32 = 600;
pub const CELL_HEIGHT: u32 = 800;
pub const GRID_COLUMNS: u32 = 2;

const BORDER_WIDTH: u32 = 2;
const LABEL_BOX: u32 = 85;
const LABEL_INSET: u32 = 10;
const LABEL_FONT_PX: f32 = 70.0;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);

/// Set to a `.ttf` path to override the label font search.
pub const LABEL_FONT_ENV: &str = "MINUTEBOOK_LABEL_FONT";

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Loaded once per process; `None` when no usable font exists.
static LABEL_FONT: Lazy<Option<FontVec>> = Lazy::new(load_label_font);

fn load_label_font() -> Option<FontVec> {
    let override_path = std::env::var(LABEL_FONT_ENV).ok().map(PathBuf::from);
    let candidates = override_path
        .into_iter()
        .chain(FONT_CANDIDATES.iter().map(PathBuf::from));

    for path in candidates {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                debug!("Label font: {}", path.display());
                return Some(font);
            }
            Err(e) => debug!("Unusable font {}: {}", path.display(), e),
        }
    }
    warn!("No label font found; page labels will be drawn without numbers");
    None
}

/// Shrink `img` to fit one cell (aspect ratio kept, never enlarged) and
/// paste it at the top-left of a white cell.
pub fn fit_into_cell(img: &DynamicImage) -> RgbImage {
    let mut cell = RgbImage::from_pixel(CELL_WIDTH, CELL_HEIGHT, WHITE);
    let page = if img.width() > CELL_WIDTH || img.height() > CELL_HEIGHT {
        img.resize(CELL_WIDTH, CELL_HEIGHT, FilterType::Lanczos3)
    } else {
        img.clone()
    };
    imageops::overlay(&mut cell, &page.to_rgb8(), 0, 0);
    cell
}

/// A blank cell, used when a single page fails to render.
pub fn blank_cell() -> RgbImage {
    RgbImage::from_pixel(CELL_WIDTH, CELL_HEIGHT, WHITE)
}

/// Lay out `(page_number, cell)` pairs in a two-column grid, labelling and
/// bordering each cell. `page_number` is the 1-indexed label drawn.
pub fn compose_grid(cells: &[(usize, RgbImage)]) -> RgbImage {
    let count = cells.len() as u32;
    let rows = count.div_ceil(GRID_COLUMNS).max(1);
    let mut grid = RgbImage::from_pixel(CELL_WIDTH * GRID_COLUMNS, CELL_HEIGHT * rows, WHITE);

    for (i, (page_number, cell)) in cells.iter().enumerate() {
        let i = i as u32;
        let x = (i % GRID_COLUMNS) * CELL_WIDTH;
        let y = (i / GRID_COLUMNS) * CELL_HEIGHT;
        imageops::overlay(&mut grid, cell, x as i64, y as i64);

        let label_x = x + CELL_WIDTH - LABEL_BOX;
        let label_y = y + CELL_HEIGHT - LABEL_BOX;
        draw_filled_rect_mut(
            &mut grid,
            Rect::at(label_x as i32, label_y as i32).of_size(LABEL_BOX, LABEL_BOX),
            WHITE,
        );
        if let Some(font) = LABEL_FONT.as_ref() {
            draw_text_mut(
                &mut grid,
                RED,
                (label_x + LABEL_INSET) as i32,
                (label_y + LABEL_INSET) as i32,
                PxScale::from(LABEL_FONT_PX),
                font,
                &page_number.to_string(),
            );
        }

        for t in 0..BORDER_WIDTH {
            draw_hollow_rect_mut(
                &mut grid,
                Rect::at((x + t) as i32, (y + t) as i32)
                    .of_size(CELL_WIDTH - 2 * t, CELL_HEIGHT - 2 * t),
                BLACK,
            );
        }
    }
    grid
}

/// [`BatchRenderer`] over an open pdfium document.
pub struct PdfGridRenderer<'a, 'd> {
    document: &'a PdfDocument<'d>,
    render_config: PdfRenderConfig,
}

impl<'a, 'd> PdfGridRenderer<'a, 'd> {
    pub fn new(document: &'a PdfDocument<'d>) -> Self {
        Self {
            document,
            render_config: PdfRenderConfig::new().scale_page_by_factor(RENDER_SCALE),
        }
    }

    pub fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn render_cell(&self, idx: usize) -> RgbImage {
        match self.try_render_cell(idx) {
            Ok(cell) => cell,
            Err(e) => {
                warn!("Page {} failed to render, using blank cell: {:?}", idx + 1, e);
                blank_cell()
            }
        }
    }

    fn try_render_cell(&self, idx: usize) -> Result<RgbImage, PdfiumError> {
        let page = self.document.pages().get(idx as u16)?;
        let bitmap = page.render_with_config(&self.render_config)?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        Ok(fit_into_cell(&image))
    }
}

impl BatchRenderer for PdfGridRenderer<'_, '_> {
    fn render_batch(&self, page_indices: &[usize]) -> Option<String> {
        if page_indices.is_empty() {
            return None;
        }
        let cells: Vec<(usize, RgbImage)> = page_indices
            .iter()
            .map(|&idx| (idx + 1, self.render_cell(idx)))
            .collect();

        let grid = compose_grid(&cells);
        match encode_jpeg_base64(&grid, JPEG_QUALITY) {
            Ok(b64) => Some(b64),
            Err(e) => {
                warn!("Grid encoding failed for {} pages: {}", page_indices.len(), e);
                None
            }
        }
    }
}

/// Bind pdfium: `PDFIUM_LIB_PATH` directory, then the working directory,
/// then the system library.
pub fn bind_pdfium() -> Result<Pdfium, ClassifyError> {
    let mut dirs: Vec<String> = Vec::new();
    if let Ok(dir) = std::env::var("PDFIUM_LIB_PATH") {
        dirs.push(dir);
    }
    dirs.push("./".to_string());

    for dir in &dirs {
        let lib = Pdfium::pdfium_platform_library_name_at_path(dir);
        if let Ok(bindings) = Pdfium::bind_to_library(&lib) {
            debug!("Bound pdfium from {}", lib.display());
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| ClassifyError::PdfiumBindingFailed(format!("{:?}", e)))
}

/// Open `pdf_path`, split it into batches of `batch_size` and render each
/// batch's grid. Returns the document's page count with the batches.
pub async fn render_batches(
    pdf_path: &Path,
    batch_size: usize,
) -> Result<(usize, Vec<Batch>), ClassifyError> {
    let path = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || render_batches_blocking(&path, batch_size))
        .await
        .map_err(|e| ClassifyError::Internal(format!("Render task panicked: {}", e)))?
}

fn render_batches_blocking(
    pdf_path: &Path,
    batch_size: usize,
) -> Result<(usize, Vec<Batch>), ClassifyError> {
    let pdfium = bind_pdfium()?;
    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| ClassifyError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

    let renderer = PdfGridRenderer::new(&document);
    let total_pages = renderer.page_count();
    info!("PDF loaded: {} pages", total_pages);

    let batches = partition(&renderer, total_pages, batch_size);
    Ok((total_pages, batches))
}
