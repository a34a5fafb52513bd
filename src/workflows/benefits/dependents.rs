use super::domain::DependentDraft;

/// Field of a dependent row targeted by [`DependentListEditor::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependentField {
    Name,
    Relationship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EditorError {
    #[error("no dependent at position {index} (list holds {len})")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Ordered, unvalidated dependent rows edited before submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependentListEditor {
    entries: Vec<DependentDraft>,
}

impl DependentListEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from rows reported in one piece (e.g. a decoded HTTP payload).
    pub fn from_drafts(entries: Vec<DependentDraft>) -> Self {
        Self { entries }
    }

    /// Append an empty row, returning its index.
    pub fn add(&mut self) -> usize {
        self.entries.push(DependentDraft::default());
        self.entries.len() - 1
    }

    pub fn update(
        &mut self,
        index: usize,
        field: DependentField,
        value: impl Into<String>,
    ) -> Result<(), EditorError> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(EditorError::IndexOutOfBounds { index, len })?;

        match field {
            DependentField::Name => entry.name = value.into(),
            DependentField::Relationship => entry.relationship = value.into(),
        }
        Ok(())
    }

    /// Remove a row, keeping the relative order of the others.
    pub fn remove(&mut self, index: usize) -> Result<DependentDraft, EditorError> {
        if index >= self.entries.len() {
            return Err(EditorError::IndexOutOfBounds {
                index,
                len: self.entries.len(),
            });
        }
        Ok(self.entries.remove(index))
    }

    pub fn entries(&self) -> &[DependentDraft] {
        &self.entries
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
