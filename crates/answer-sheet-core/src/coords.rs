//! Coordinate transformation between PDF point space and the rendered page image
//!
//! Template fields are authored in PDF points (bottom-left origin, y up). The
//! page image is laid out by the browser at whatever size the viewport allows,
//! so every overlay position is derived from the image's displayed pixels at
//! render time and never cached across layouts.

use serde::{Deserialize, Serialize};

/// Field rectangle in PDF points, origin bottom-left
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Rectangle in displayed pixels, origin top-left
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Declared size of a page in PDF points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width_pts: f64,
    pub height_pts: f64,
}

impl PageSize {
    pub fn new(width_pts: f64, height_pts: f64) -> Self {
        Self {
            width_pts,
            height_pts,
        }
    }

    fn is_usable(&self) -> bool {
        self.width_pts > 0.0 && self.height_pts > 0.0
    }
}

/// Pick the page size used for mapping.
///
/// Declared page geometry wins, then the template-wide size, then the natural
/// pixel size of the loaded image (pixels treated as points).
pub fn resolve_page_size(
    declared: Option<PageSize>,
    template_size: Option<PageSize>,
    natural_width: f64,
    natural_height: f64,
) -> PageSize {
    declared
        .filter(PageSize::is_usable)
        .or_else(|| template_size.filter(PageSize::is_usable))
        .unwrap_or_else(|| PageSize::new(natural_width, natural_height))
}

/// A laid-out page image together with the page size it represents.
///
/// Construction fails while the image has no stable layout (zero or negative
/// dimensions), so geometry can only be computed after the image has loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    displayed_width: f64,
    displayed_height: f64,
    page: PageSize,
}

impl PageLayout {
    pub fn new(displayed_width: f64, displayed_height: f64, page: PageSize) -> Option<Self> {
        let finite = [displayed_width, displayed_height, page.width_pts, page.height_pts]
            .iter()
            .all(|v| v.is_finite());
        if !finite || displayed_width <= 0.0 || displayed_height <= 0.0 || !page.is_usable() {
            return None;
        }
        Some(Self {
            displayed_width,
            displayed_height,
            page,
        })
    }

    pub fn scale_x(&self) -> f64 {
        self.displayed_width / self.page.width_pts
    }

    pub fn scale_y(&self) -> f64 {
        self.displayed_height / self.page.height_pts
    }

    pub fn page(&self) -> PageSize {
        self.page
    }

    /// Point on the page (points, y up) to displayed pixels (y down)
    pub fn to_screen(&self, x_pts: f64, y_pts: f64) -> (f64, f64) {
        (
            x_pts * self.scale_x(),
            (self.page.height_pts - y_pts) * self.scale_y(),
        )
    }

    /// Displayed pixel position back to page points
    pub fn to_points(&self, left: f64, top: f64) -> (f64, f64) {
        (
            left / self.scale_x(),
            self.page.height_pts - top / self.scale_y(),
        )
    }
}

/// Map a field rectangle from PDF points onto the displayed page image
pub fn pdf_rect_to_screen(rect: &PdfRect, layout: &PageLayout) -> ScreenRect {
    // The field's top edge is its upper y in point space
    let (left, top) = layout.to_screen(rect.x, rect.y + rect.h);
    ScreenRect {
        left,
        top,
        width: rect.w * layout.scale_x(),
        height: rect.h * layout.scale_y(),
    }
}

/// Inverse of [`pdf_rect_to_screen`]
pub fn screen_rect_to_pdf(rect: &ScreenRect, layout: &PageLayout) -> PdfRect {
    let (x, top) = layout.to_points(rect.left, rect.top);
    let w = rect.width / layout.scale_x();
    let h = rect.height / layout.scale_y();
    PdfRect { x, y: top - h, w, h }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter(displayed_w: f64, displayed_h: f64) -> PageLayout {
        PageLayout::new(displayed_w, displayed_h, PageSize::new(612.0, 792.0)).unwrap()
    }

    #[test]
    fn test_screen_center_is_page_center() {
        let (x, y) = letter(600.0, 792.0).to_points(300.0, 396.0);
        assert!((x - 306.0).abs() < 0.1);
        assert!((y - 396.0).abs() < 0.1);
    }

    #[test]
    fn test_y_axis_flip() {
        let (_, top) = letter(612.0, 792.0).to_screen(0.0, 100.0);
        assert_eq!(top, 692.0);
    }

    #[test]
    fn test_field_rect_at_unit_scale() {
        let rect = PdfRect {
            x: 100.0,
            y: 700.0,
            w: 50.0,
            h: 20.0,
        };
        let screen = pdf_rect_to_screen(&rect, &letter(612.0, 792.0));
        assert_eq!(
            screen,
            ScreenRect {
                left: 100.0,
                top: 72.0,
                width: 50.0,
                height: 20.0
            }
        );
    }

    #[test]
    fn test_field_rect_half_scale() {
        let rect = PdfRect {
            x: 100.0,
            y: 0.0,
            w: 60.0,
            h: 40.0,
        };
        let screen = pdf_rect_to_screen(&rect, &letter(306.0, 396.0));
        assert_eq!(screen.left, 50.0);
        assert_eq!(screen.top, 376.0);
        assert_eq!(screen.width, 30.0);
        assert_eq!(screen.height, 20.0);
    }

    #[test]
    fn test_layout_rejects_unloaded_image() {
        let page = PageSize::new(612.0, 792.0);
        assert!(PageLayout::new(0.0, 0.0, page).is_none());
        assert!(PageLayout::new(600.0, 0.0, page).is_none());
        assert!(PageLayout::new(600.0, 800.0, PageSize::new(0.0, 792.0)).is_none());
        assert!(PageLayout::new(f64::NAN, 800.0, page).is_none());
    }

    #[test]
    fn test_resolve_prefers_declared_geometry() {
        let size = resolve_page_size(
            Some(PageSize::new(595.0, 842.0)),
            Some(PageSize::new(1000.0, 1400.0)),
            1654.0,
            2339.0,
        );
        assert_eq!(size, PageSize::new(595.0, 842.0));
    }

    #[test]
    fn test_resolve_skips_zero_sizes() {
        let size = resolve_page_size(
            Some(PageSize::new(0.0, 0.0)),
            Some(PageSize::new(1000.0, 1400.0)),
            1654.0,
            2339.0,
        );
        assert_eq!(size, PageSize::new(1000.0, 1400.0));
    }

    #[test]
    fn test_resolve_falls_back_to_natural_pixels() {
        let size = resolve_page_size(None, None, 1654.0, 2339.0);
        assert_eq!(size, PageSize::new(1654.0, 2339.0));

        // Pixels as points keeps the flip: a field at the bottom edge maps to the bottom
        let layout = PageLayout::new(827.0, 1169.5, size).unwrap();
        let rect = PdfRect {
            x: 0.0,
            y: 0.0,
            w: 100.0,
            h: 39.0,
        };
        let screen = pdf_rect_to_screen(&rect, &layout);
        assert!((screen.top + screen.height - 1169.5).abs() < 1e-9);
    }
}
