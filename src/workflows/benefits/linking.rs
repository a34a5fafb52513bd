use std::sync::Arc;

use tracing::{debug, info};

use super::domain::{InvoiceReference, RequestId};
use super::invoices::{InvoiceFile, PendingInvoice};
use super::repository::{RepositoryError, RequestRepository};
use super::storage::{ObjectStorage, UploadError, UploadGateway};

/// Uploads queued invoices under a request's prefix and records them on the request.
pub struct InvoiceLinker<R, S> {
    repository: Arc<R>,
    gateway: Arc<UploadGateway<S>>,
}

impl<R, S> Clone for InvoiceLinker<R, S> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            gateway: self.gateway.clone(),
        }
    }
}

impl<R, S> InvoiceLinker<R, S>
where
    R: RequestRepository + 'static,
    S: ObjectStorage + 'static,
{
    pub fn new(repository: Arc<R>, gateway: Arc<UploadGateway<S>>) -> Self {
        Self {
            repository,
            gateway,
        }
    }

    /// Link every entry carrying a file; metadata-only entries are ignored.
    ///
    /// `stored` holds references already uploaded for this request by an earlier
    /// attempt. A queued file whose name and size match an entry there is reused
    /// rather than uploaded again, and every file stored by this call is appended
    /// to it, including the ones stored before an upload failure.
    pub async fn link(
        &self,
        request_id: &RequestId,
        entries: &[PendingInvoice],
        stored: &mut Vec<InvoiceReference>,
    ) -> Result<Vec<InvoiceReference>, LinkError> {
        let queued: Vec<(&InvoiceFile, Option<String>)> = entries
            .iter()
            .filter_map(|entry| {
                entry
                    .file
                    .as_ref()
                    .map(|file| (file, entry.metadata.description.clone()))
            })
            .collect();
        if queued.is_empty() {
            return Ok(Vec::new());
        }

        let mut reusable = stored.clone();
        let mut slots: Vec<Option<InvoiceReference>> = Vec::with_capacity(queued.len());
        let mut missing: Vec<InvoiceFile> = Vec::new();
        for (file, description) in &queued {
            let size_bytes = file.size_bytes();
            let matched = reusable.iter().position(|reference| {
                reference.file_name == file.name && reference.size_bytes == size_bytes
            });
            match matched {
                Some(index) => {
                    let mut reference = reusable.remove(index);
                    reference.description = description.clone();
                    slots.push(Some(reference));
                }
                None => {
                    missing.push((*file).clone());
                    slots.push(None);
                }
            }
        }
        if missing.len() < queued.len() {
            debug!(
                request_id = %request_id,
                reused = queued.len() - missing.len(),
                "reusing invoices stored by an earlier attempt"
            );
        }

        let paths = match self.gateway.upload(&request_id.0, &missing).await {
            Ok(paths) => paths,
            Err(err) => {
                stored.extend(
                    missing
                        .iter()
                        .zip(&err.uploaded)
                        .map(|(file, path)| reference_for(file, None, path.0.clone())),
                );
                return Err(err.into());
            }
        };
        let mut fresh = paths.into_iter();

        let mut references = Vec::with_capacity(queued.len());
        for ((file, description), slot) in queued.into_iter().zip(slots) {
            let reference = match slot {
                Some(reference) => reference,
                None => {
                    let Some(path) = fresh.next() else {
                        break;
                    };
                    let reference = reference_for(file, description, path.0);
                    stored.push(reference.clone());
                    reference
                }
            };
            references.push(reference);
        }

        self.repository
            .attach_invoices(request_id, references.clone())
            .await?;

        info!(
            request_id = %request_id,
            invoices = references.len(),
            "invoices linked to request"
        );
        Ok(references)
    }
}

fn reference_for(
    file: &InvoiceFile,
    description: Option<String>,
    storage_path: String,
) -> InvoiceReference {
    InvoiceReference {
        file_name: file.name.clone(),
        storage_path,
        description,
        size_bytes: file.size_bytes(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("invoices uploaded but not recorded on the request: {0}")]
    Record(#[from] RepositoryError),
}
