//! Test template as served by `GET /load_template/{id}`

use crate::coords::{PageSize, PdfRect};
use crate::error::TemplateError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Str(String),
    Int(i64),
    Float(f64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Str(s) => s,
            RawId::Int(n) => n.to_string(),
            RawId::Float(n) => n.to_string(),
        }
    }
}

/// Accept identifiers sent either as JSON strings or numbers
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

/// Like [`string_or_number`], with `null` read as an empty string
fn nullable_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    opt_string_or_number(deserializer).map(Option::unwrap_or_default)
}

pub(crate) fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawId>::deserialize(deserializer).map(|raw| raw.map(String::from))
}

/// An answer region anchored to one page, in PDF points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub page: usize,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Field {
    pub fn rect(&self) -> PdfRect {
        PdfRect {
            x: self.x,
            y: self.y,
            w: self.w,
            h: self.h,
        }
    }
}

/// Per-page geometry recorded when the source PDF was rasterized
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    #[serde(default)]
    pub page_width: Option<f64>,
    #[serde(default)]
    pub page_height: Option<f64>,
    #[serde(default)]
    pub zoom: Option<f64>,
}

impl PageGeometry {
    fn size(&self) -> Option<PageSize> {
        match (self.page_width, self.page_height) {
            (Some(w), Some(h)) => Some(PageSize::new(w, h)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Empty when the stored template never recorded its id
    #[serde(default, rename = "template_id", deserialize_with = "nullable_string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub sheet_url: Option<String>,
    #[serde(default)]
    pub images_data: Vec<PageGeometry>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

impl Template {
    /// Decode a `/load_template` body
    pub fn from_json(value: serde_json::Value) -> Result<Self, TemplateError> {
        serde_json::from_value(value).map_err(|e| TemplateError::Decode(e.to_string()))
    }

    /// Check authoring invariants: at least one page, every field on an
    /// existing page, unique field ids.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.files.is_empty() {
            return Err(TemplateError::NoPages);
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.page >= self.files.len() {
                return Err(TemplateError::FieldPageOutOfRange {
                    field_id: field.id.clone(),
                    page: field.page,
                    page_count: self.files.len(),
                });
            }
            if !seen.insert(field.id.as_str()) {
                return Err(TemplateError::DuplicateFieldId(field.id.clone()));
            }
        }
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.files.len()
    }

    pub fn total_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn fields_on_page(&self, page: usize) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(move |f| f.page == page)
    }

    /// Declared PDF size of a page, if the template recorded one
    pub fn page_size(&self, page: usize) -> Option<PageSize> {
        self.images_data.get(page).and_then(PageGeometry::size)
    }

    /// Template-wide size used when a page has no geometry of its own
    pub fn fallback_size(&self) -> Option<PageSize> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(PageSize::new(w, h)),
            _ => None,
        }
    }

    /// URL of a page image under the uploads prefix
    pub fn image_url(&self, uploads_prefix: &str, page: usize) -> Option<String> {
        self.files
            .get(page)
            .map(|file| format!("{}{}", uploads_prefix, file))
    }
}

/// Entry of a template listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSummary {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl TemplateSummary {
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Template {
        Template::from_json(json!({
            "template_id": "tpl_1a2b3c4d",
            "name": "Fractions",
            "files": ["p0.png", "p1.png"],
            "fields": [
                {"id": "f1", "page": 0, "x": 10.0, "y": 20.0, "w": 30.0, "h": 10.0},
                {"id": 7, "page": 1, "x": 10.0, "y": 20.0, "w": 30.0, "h": 10.0}
            ],
            "classes": ["7А", "7Б"],
            "sheet_url": "https://sheets.example/abc",
            "images_data": [
                {"page_width": 595.0, "page_height": 842.0, "zoom": 2.0},
                {"page_width": null, "page_height": null}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_decode_accepts_numeric_ids() {
        let template = sample();
        assert_eq!(template.id, "tpl_1a2b3c4d");
        assert_eq!(template.fields[1].id, "7");
        assert!(template.validate().is_ok());
    }

    #[test]
    fn test_null_template_id_decodes_as_empty() {
        let template = Template::from_json(json!({
            "template_id": null,
            "files": ["p0.png"],
            "fields": []
        }))
        .unwrap();
        assert_eq!(template.id, "");

        let numeric =
            Template::from_json(json!({"template_id": 12, "files": ["p0.png"]})).unwrap();
        assert_eq!(numeric.id, "12");
    }

    #[test]
    fn test_fields_on_page() {
        let template = sample();
        let ids: Vec<_> = template.fields_on_page(1).map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["7"]);
    }

    #[test]
    fn test_page_size_lookup() {
        let template = sample();
        assert_eq!(template.page_size(0), Some(PageSize::new(595.0, 842.0)));
        assert_eq!(template.page_size(1), None);
        assert_eq!(template.page_size(5), None);
    }

    #[test]
    fn test_out_of_range_page_is_reported() {
        let mut template = sample();
        template.fields[1].page = 2;
        assert_eq!(
            template.validate(),
            Err(TemplateError::FieldPageOutOfRange {
                field_id: "7".to_string(),
                page: 2,
                page_count: 2
            })
        );
    }

    #[test]
    fn test_duplicate_field_id_is_reported() {
        let mut template = sample();
        template.fields[1].id = "f1".to_string();
        assert_eq!(
            template.validate(),
            Err(TemplateError::DuplicateFieldId("f1".to_string()))
        );
    }

    #[test]
    fn test_template_without_pages() {
        let template = Template::from_json(json!({"files": [], "fields": []})).unwrap();
        assert_eq!(template.validate(), Err(TemplateError::NoPages));
    }

    #[test]
    fn test_image_url() {
        let template = sample();
        assert_eq!(
            template.image_url("/uploads/", 1).as_deref(),
            Some("/uploads/p1.png")
        );
        assert_eq!(template.image_url("/uploads/", 2), None);
    }

    #[test]
    fn test_summary_display_name_falls_back_to_id() {
        let named: TemplateSummary =
            serde_json::from_value(json!({"id": "t1", "name": "Algebra"})).unwrap();
        let unnamed: TemplateSummary = serde_json::from_value(json!({"id": "t2"})).unwrap();
        assert_eq!(named.display_name(), "Algebra");
        assert_eq!(unnamed.display_name(), "t2");
    }
}
