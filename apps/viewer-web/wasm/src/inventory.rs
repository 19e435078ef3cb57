//! Byte-level inventory of the fetched document.
//!
//! The actual rasterization is delegated to the pdf.js bridge; this module
//! validates that the bytes decode as a paginated document before any
//! render state is touched, and reports page dimensions for layout.

use docgate_core::FetchError;

/// US Letter, the fallback when a page carries no MediaBox.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

#[derive(Debug)]
pub struct PageInventory {
    doc: lopdf::Document,
}

impl PageInventory {
    pub fn decode(bytes: &[u8]) -> Result<PageInventory, FetchError> {
        let doc =
            lopdf::Document::load_mem(bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
        if doc.get_pages().is_empty() {
            return Err(FetchError::Decode("document has no pages".to_string()));
        }
        Ok(PageInventory { doc })
    }

    pub fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    /// `[x, y, width, height]` for a 1-indexed page, falling back to the
    /// parent node's MediaBox and finally to US Letter.
    pub fn media_box(&self, page_num: u32) -> [f64; 4] {
        self.page_dict_media_box(page_num)
            .unwrap_or(DEFAULT_MEDIA_BOX)
    }

    fn page_dict_media_box(&self, page_num: u32) -> Option<[f64; 4]> {
        let page_id = self.doc.get_pages().get(&page_num).copied()?;
        let dict = self.doc.get_object(page_id).ok()?.as_dict().ok()?;

        if let Ok(rect) = dict.get(b"MediaBox") {
            return self.rect_values(rect);
        }
        let parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
        let parent = self.doc.get_object(parent_id).ok()?.as_dict().ok()?;
        self.rect_values(parent.get(b"MediaBox").ok()?)
    }

    fn rect_values(&self, rect: &lopdf::Object) -> Option<[f64; 4]> {
        let rect = self.resolve(rect)?;
        let arr = rect.as_array().ok()?;
        if arr.len() != 4 {
            return None;
        }
        let mut corners = [0.0f64; 4];
        for (slot, value) in corners.iter_mut().zip(arr.iter()) {
            *slot = self.number(value)?;
        }
        // [x1, y1, x2, y2] -> [x, y, width, height]
        Some([
            corners[0],
            corners[1],
            corners[2] - corners[0],
            corners[3] - corners[1],
        ])
    }

    fn resolve<'a>(&'a self, obj: &'a lopdf::Object) -> Option<&'a lopdf::Object> {
        match obj {
            lopdf::Object::Reference(id) => self.doc.get_object(*id).ok(),
            other => Some(other),
        }
    }

    fn number(&self, obj: &lopdf::Object) -> Option<f64> {
        match self.resolve(obj)? {
            lopdf::Object::Integer(i) => Some(*i as f64),
            lopdf::Object::Real(r) => Some(*r as f64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn pdf_with_sizes(sizes: &[(i64, i64)]) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids = Vec::new();
        for (w, h) in sizes {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), (*w).into(), (*h).into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            lopdf::Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_decode_and_count() {
        let bytes = pdf_with_sizes(&[(612, 792), (595, 842)]);
        let inventory = PageInventory::decode(&bytes).unwrap();
        assert_eq!(inventory.page_count(), 2);
    }

    #[test]
    fn test_media_boxes() {
        let bytes = pdf_with_sizes(&[(612, 792), (595, 842)]);
        let inventory = PageInventory::decode(&bytes).unwrap();
        assert_eq!(inventory.media_box(1), [0.0, 0.0, 612.0, 792.0]);
        assert_eq!(inventory.media_box(2), [0.0, 0.0, 595.0, 842.0]);
        // Out-of-range pages report the fallback, not a panic.
        assert_eq!(inventory.media_box(99), DEFAULT_MEDIA_BOX);
    }

    #[test]
    fn test_garbage_bytes_are_a_decode_error() {
        let err = PageInventory::decode(b"not a pdf at all").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }
}
