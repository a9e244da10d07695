use anyhow::{anyhow, Result};
use lopdf::{dictionary, Document, Object, ObjectId};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_ATTRIBUTES: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Collects rendered PDFs and joins their pages into one document.
pub struct PdfMerger {
    documents: Vec<(String, Document)>,
}

impl PdfMerger {
    pub fn new() -> Self {
        Self {
            documents: Vec::new(),
        }
    }

    pub fn add_bytes(&mut self, label: &str, data: &[u8]) -> Result<()> {
        let document = Document::load_mem(data)
            .map_err(|e| anyhow!("Failed to parse PDF for {}: {}", label, e))?;

        debug!("Loaded PDF with {} pages from {}", document.get_pages().len(), label);
        self.documents.push((label.to_string(), document));

        Ok(())
    }

    pub async fn add_pdf(&mut self, path: &Path) -> Result<()> {
        let data = fs::read(path)
            .await
            .map_err(|e| anyhow!("Failed to read PDF file {}: {}", path.display(), e))?;

        self.add_bytes(&path.display().to_string(), &data)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn page_count(&self) -> usize {
        self.documents.iter().map(|(_, doc)| doc.get_pages().len()).sum()
    }

    /// Builds the merged document and serializes it.
    ///
    /// Pages keep the order in which their documents were added.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.documents.is_empty() {
            return Err(anyhow!("No PDFs added to merge"));
        }

        info!("Starting PDF merge process with {} documents", self.documents.len());

        let mut merged = Document::with_version("1.5");
        let pages_id = merged.new_object_id();
        let mut kids: Vec<Object> = Vec::new();

        for (label, document) in &self.documents {
            let mut doc_copy = document.clone();

            // Renumber objects to avoid conflicts
            doc_copy.renumber_objects_with(merged.max_id + 1);

            let page_ids: Vec<ObjectId> = doc_copy.get_pages().into_values().collect();
            debug!("Processing {} with {} pages", label, page_ids.len());

            for page_id in &page_ids {
                flatten_page(&mut doc_copy, *page_id, pages_id);
            }

            let copy_max_id = doc_copy.max_id;

            // The source page tree and catalog are replaced by ours.
            for (object_id, object) in doc_copy.objects {
                if !is_tree_root(&object) {
                    merged.objects.insert(object_id, object);
                }
            }

            merged.max_id = merged.max_id.max(copy_max_id);
            kids.extend(page_ids.into_iter().map(Object::Reference));
        }

        let page_count = kids.len();
        merged.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => page_count as i64,
                "Kids" => kids,
            }),
        );

        let catalog_id = merged.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        merged.trailer.set("Root", catalog_id);

        merged.prune_objects();
        merged.renumber_objects();
        merged.compress();

        info!("Finalizing merged PDF with {} total pages", page_count);

        let mut data = Vec::new();
        merged
            .save_to(&mut data)
            .map_err(|e| anyhow!("Failed to serialize merged PDF: {}", e))?;

        Ok(data)
    }

    pub async fn save(&self, output_path: &Path) -> Result<()> {
        let data = self.to_bytes()?;

        fs::write(output_path, data)
            .await
            .map_err(|e| anyhow!("Failed to write merged PDF to {}: {}", output_path.display(), e))?;

        info!("Successfully merged {} PDFs into {}", self.documents.len(), output_path.display());
        Ok(())
    }
}

impl Default for PdfMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies inherited attributes onto the page and points it at the new page tree.
fn flatten_page(doc: &mut Document, page_id: ObjectId, new_parent: ObjectId) {
    let inherited: Vec<(&[u8], Object)> = INHERITABLE_ATTRIBUTES
        .iter()
        .filter_map(|key| inherited_attribute(doc, page_id, key).map(|value| (*key, value)))
        .collect();

    if let Ok(page) = doc.get_dictionary_mut(page_id) {
        for (key, value) in inherited {
            page.set(key, value);
        }
        page.set("Parent", new_parent);
    }
}

/// Finds `key` on the nearest ancestor when the page itself lacks it.
fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    if current.has(key) {
        return None;
    }

    // Bounded walk: malformed files can contain parent cycles.
    for _ in 0..64 {
        let parent_id = current.get(b"Parent").and_then(|p| p.as_reference()).ok()?;
        let parent = doc.get_dictionary(parent_id).ok()?;
        if let Ok(value) = parent.get(key) {
            return Some(value.clone());
        }
        current = parent;
    }

    None
}

fn is_tree_root(object: &Object) -> bool {
    object
        .as_dict()
        .and_then(|dict| dict.get(b"Type"))
        .and_then(|kind| kind.as_name())
        .map(|name| name == b"Catalog" || name == b"Pages")
        .unwrap_or(false)
}
