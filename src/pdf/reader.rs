//! Layout-aware text extraction through PDFium

use crate::error::ExtractionError;
use pdfium_render::prelude::*;

/// A positioned glyph collected from a page
#[derive(Debug, Clone, Copy)]
pub struct Glyph {
    pub ch: char,
    /// Left edge
    pub x: f32,
    /// Top edge (PDF coordinates, grows upwards)
    pub y: f32,
    pub width: f32,
    /// Glyph height, used as a font size proxy
    pub height: f32,
}

/// Glyphs that share a baseline
#[derive(Debug, Clone)]
struct TextLine {
    glyphs: Vec<Glyph>,
    y: f32,
    avg_height: f32,
    min_x: f32,
    max_x: f32,
}

impl TextLine {
    fn new(glyphs: Vec<Glyph>) -> Self {
        let avg_height = if glyphs.is_empty() {
            0.0
        } else {
            glyphs.iter().map(|g| g.height).sum::<f32>() / glyphs.len() as f32
        };
        let min_x = glyphs.iter().map(|g| g.x).fold(f32::MAX, f32::min);
        let max_x = glyphs.iter().map(|g| g.x + g.width).fold(f32::MIN, f32::max);
        let y = glyphs.first().map(|g| g.y).unwrap_or(0.0);

        Self {
            glyphs,
            y,
            avg_height,
            min_x,
            max_x,
        }
    }

    fn center(&self) -> f32 {
        (self.min_x + self.max_x) / 2.0
    }
}

/// Tuning for line grouping and paragraph detection
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    /// A line gap larger than this multiple of the line height starts a paragraph
    pub paragraph_threshold: f32,
    /// Drop short, oversized, centred lines ("DRAFT", "CONFIDENTIAL")
    pub filter_watermarks: bool,
    /// Fallback tolerances when glyph heights are unusable
    pub fallback_y_tolerance: f32,
    pub fallback_space_threshold: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            paragraph_threshold: 1.5,
            filter_watermarks: true,
            fallback_y_tolerance: 5.0,
            fallback_space_threshold: 10.0,
        }
    }
}

/// Bind PDFium from the working directory, `/opt/pdfium/lib`, or the system
/// library path.
///
/// PDFium is not thread-safe, so each extraction binds its own instance.
pub fn bind_pdfium() -> Result<Pdfium, ExtractionError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ExtractionError::Backend {
            backend: "pdfium",
            reason: format!("Failed to bind PDFium: {}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Extract the text of every page, in page order.
///
/// `data` must already be decrypted (see [`crate::pdf::QpdfWrapper::unlock`]).
pub fn extract_pages_pdfium(
    pdfium: &Pdfium,
    data: &[u8],
    config: &LayoutConfig,
) -> Result<Vec<String>, ExtractionError> {
    let document = pdfium
        .load_pdf_from_byte_slice(data, None)
        .map_err(map_pdfium_error)?;

    let pages = document.pages();
    let mut texts = Vec::with_capacity(pages.len() as usize);

    for (index, page) in pages.iter().enumerate() {
        let glyphs = collect_glyphs(&page);
        let text = layout_page_text(glyphs, page.width().value, config);
        tracing::debug!(page = index + 1, chars = text.len(), "pdfium page extracted");
        texts.push(text);
    }

    Ok(texts)
}

fn collect_glyphs(page: &PdfPage) -> Vec<Glyph> {
    let text = match page.text() {
        Ok(t) => t,
        Err(_) => return Vec::new(),
    };

    let mut glyphs = Vec::new();
    for segment in text.segments().iter() {
        let Ok(chars) = segment.chars() else {
            continue;
        };
        for ch in chars.iter() {
            let (Some(c), Ok(bounds)) = (ch.unicode_char(), ch.loose_bounds()) else {
                continue;
            };
            glyphs.push(Glyph {
                ch: c,
                x: bounds.left().value,
                y: bounds.top().value,
                width: bounds.width().value,
                height: bounds.height().value,
            });
        }
    }
    glyphs
}

fn map_pdfium_error(err: PdfiumError) -> ExtractionError {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            ExtractionError::PasswordRequired
        }
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError) => {
            ExtractionError::InvalidPdf {
                reason: err.to_string(),
            }
        }
        _ => ExtractionError::Backend {
            backend: "pdfium",
            reason: err.to_string(),
        },
    }
}

/// Turn positioned glyphs into reading-order text.
///
/// Lines are grouped top to bottom, glyphs left to right; a space is inserted
/// where the horizontal gap exceeds the space threshold and a blank line where
/// the vertical gap exceeds `paragraph_threshold` line heights.
pub fn layout_page_text(glyphs: Vec<Glyph>, page_width: f32, config: &LayoutConfig) -> String {
    if glyphs.is_empty() {
        return String::new();
    }

    let (y_tolerance, space_threshold) = dynamic_thresholds(&glyphs, config);
    let mut lines = group_into_lines(glyphs, y_tolerance);
    if config.filter_watermarks {
        lines = drop_watermarks(lines, page_width);
    }

    let mut out = String::new();
    let mut prev: Option<(f32, f32)> = None;

    for line in &lines {
        if let Some((prev_y, prev_height)) = prev {
            let gap = prev_y - line.y;
            if gap > prev_height.max(line.avg_height) * config.paragraph_threshold {
                out.push('\n');
            }
        }

        let mut glyphs = line.glyphs.clone();
        glyphs.sort_by(|a, b| a.x.total_cmp(&b.x));

        let mut prev_right: Option<f32> = None;
        for g in glyphs {
            if let Some(right) = prev_right {
                if g.x - right > space_threshold && g.ch != ' ' && !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            out.push(g.ch);
            prev_right = Some(g.x + g.width);
        }
        out.push('\n');
        prev = Some((line.y, line.avg_height));
    }

    out.trim_end().to_string()
}

/// Line tolerance and word gap derived from the median glyph height
fn dynamic_thresholds(glyphs: &[Glyph], config: &LayoutConfig) -> (f32, f32) {
    let mut heights: Vec<f32> = glyphs
        .iter()
        .map(|g| g.height)
        .filter(|h| *h > 0.0)
        .collect();
    if heights.is_empty() {
        return (config.fallback_y_tolerance, config.fallback_space_threshold);
    }

    heights.sort_by(f32::total_cmp);
    let median = heights[heights.len() / 2];
    ((median * 0.4).max(2.0), (median * 0.3).max(3.0))
}

fn group_into_lines(mut glyphs: Vec<Glyph>, y_tolerance: f32) -> Vec<TextLine> {
    glyphs.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut lines = Vec::new();
    let mut current: Vec<Glyph> = Vec::new();
    let mut current_y: Option<f32> = None;

    for g in glyphs {
        match current_y {
            Some(y) if (y - g.y).abs() <= y_tolerance => current.push(g),
            _ => {
                if !current.is_empty() {
                    lines.push(TextLine::new(std::mem::take(&mut current)));
                }
                current_y = Some(g.y);
                current.push(g);
            }
        }
    }
    if !current.is_empty() {
        lines.push(TextLine::new(current));
    }
    lines
}

fn drop_watermarks(lines: Vec<TextLine>, page_width: f32) -> Vec<TextLine> {
    if page_width <= 0.0 || lines.len() < 2 {
        return lines;
    }

    let avg_height = lines.iter().map(|l| l.avg_height).sum::<f32>() / lines.len() as f32;
    let page_center = page_width / 2.0;
    let center_tolerance = page_width * 0.2;

    lines
        .into_iter()
        .filter(|line| {
            let centred = (line.center() - page_center).abs() < center_tolerance;
            let oversized = line.avg_height > avg_height * 1.5;
            let short = line.glyphs.len() < 30;
            !(centred && oversized && short)
        })
        .collect()
}
