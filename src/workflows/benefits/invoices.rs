use bytes::Bytes;

use super::domain::InvoiceMetadata;

/// Raw invoice file waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceFile {
    pub name: String,
    pub content_type: String,
    pub content: Bytes,
}

impl InvoiceFile {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            content: content.into(),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Collector entry; entries without a file are metadata-only or already linked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingInvoice {
    pub file: Option<InvoiceFile>,
    pub metadata: InvoiceMetadata,
}

impl PendingInvoice {
    pub fn with_file(file: InvoiceFile, description: Option<String>) -> Self {
        let metadata = InvoiceMetadata {
            file_name: file.name.clone(),
            description,
            storage_path: None,
        };
        Self {
            file: Some(file),
            metadata,
        }
    }
}

/// Ordered invoice entries handed to the workflow as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceAttachmentCollector {
    entries: Vec<PendingInvoice>,
}

impl InvoiceAttachmentCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: PendingInvoice) {
        self.entries.push(entry);
    }

    /// Replace the whole collection with the state reported by an attachment editor.
    pub fn replace_all(&mut self, entries: Vec<PendingInvoice>) {
        self.entries = entries;
    }

    pub fn entries(&self) -> &[PendingInvoice] {
        &self.entries
    }

    /// Metadata for every entry, in order.
    pub fn metadata(&self) -> Vec<InvoiceMetadata> {
        self.entries
            .iter()
            .map(|entry| entry.metadata.clone())
            .collect()
    }

    /// Entries carrying a raw file, in order.
    pub fn with_files(&self) -> Vec<PendingInvoice> {
        self.entries
            .iter()
            .filter(|entry| entry.file.is_some())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
