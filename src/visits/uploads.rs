//! Image uploads attached to a visit.

use tracing::{debug, info, instrument};

use crate::error::{Result, VisitError};
use crate::store::{
    sniff_image_extension, unique_file_name, DocType, Document, DocumentStore, FileStore,
};

/// An uploaded image that passed type detection.
struct CheckedImage<'a> {
    bytes: &'a [u8],
    extension: &'static str,
}

fn check_image(bytes: &[u8]) -> Result<CheckedImage<'_>> {
    if bytes.is_empty() {
        return Err(VisitError::MissingImage.into());
    }
    let extension = sniff_image_extension(bytes).ok_or(VisitError::InvalidImage)?;
    Ok(CheckedImage { bytes, extension })
}

/// Save the image and record a File row attached to the visit.
fn store_image(
    store: &dyn DocumentStore,
    files: &dyn FileStore,
    visit_name: &str,
    image: &CheckedImage<'_>,
) -> Result<String> {
    let file_name = unique_file_name(image.extension);
    let url = files.save(image.bytes, &file_name)?;
    store.insert(
        Document::new(DocType::File)
            .with("file_name", file_name.as_str())
            .with("file_url", url.as_str())
            .with("attached_to_doctype", DocType::MaintenanceVisit.to_string())
            .with("attached_to_name", visit_name)
            .with("is_private", 0),
    )?;
    crate::metrics::record_upload(image.extension);
    debug!(file = %file_name, size = image.bytes.len(), "Stored image");
    Ok(url)
}

/// Attach an image to a visit, returning its URL.
#[instrument(skip(store, files, bytes), fields(size = bytes.len()))]
pub fn add_attachment(
    store: &dyn DocumentStore,
    files: &dyn FileStore,
    visit_name: &str,
    bytes: &[u8],
) -> Result<String> {
    store.get(DocType::MaintenanceVisit, visit_name)?;
    let image = check_image(bytes)?;
    let url = store_image(store, files, visit_name, &image)?;

    store.insert(
        Document::new(DocType::Attachment)
            .with("parent", visit_name)
            .with("parenttype", DocType::MaintenanceVisit.to_string())
            .with("parentfield", "attachments")
            .with("maintenance_visit", visit_name)
            .with("image", url.as_str()),
    )?;

    info!(url = %url, "Attachment added");
    Ok(url)
}

/// One reported symptom with its proposed resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymptomInput {
    pub symptom_code: String,
    pub resolution: String,
    pub image: Option<Vec<u8>>,
}

/// Record symptom requests for an item on a visit.
///
/// Every image is checked before anything is written, so a bad upload
/// leaves no partial rows behind. Returns the created record names.
#[instrument(skip(store, files, symptoms), fields(count = symptoms.len()))]
pub fn add_symptom_requests(
    store: &dyn DocumentStore,
    files: &dyn FileStore,
    visit_name: &str,
    item_code: &str,
    symptoms: &[SymptomInput],
) -> Result<Vec<String>> {
    store.get(DocType::MaintenanceVisit, visit_name)?;

    let images = symptoms
        .iter()
        .map(|s| s.image.as_deref().map(check_image).transpose())
        .collect::<Result<Vec<_>>>()?;

    let mut created = Vec::with_capacity(symptoms.len());
    for (symptom, image) in symptoms.iter().zip(&images) {
        let image_url = match image {
            Some(image) => Some(store_image(store, files, visit_name, image)?),
            None => None,
        };
        let record = store.insert(
            Document::new(DocType::SymptomRequest)
                .with("item_code", item_code)
                .with("maintenance_visit", visit_name)
                .with("symptom_code", symptom.symptom_code.as_str())
                .with("resolution", symptom.resolution.as_str())
                .with("image", image_url)
                .with("parent", visit_name)
                .with("parenttype", DocType::MaintenanceVisit.to_string())
                .with("parentfield", "symptoms_requests"),
        )?;
        created.push(record.name);
    }

    info!(created = created.len(), "Symptom requests added");
    Ok(created)
}
