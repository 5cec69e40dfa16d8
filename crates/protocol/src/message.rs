//! Batch - an ordered sequence of parts
//!
//! Zero-length batches are valid and traverse the pipeline like any other;
//! components must not treat emptiness as an error.

use crate::part::Part;

/// An ordered sequence of parts traveling together
#[derive(Debug, Clone, Default)]
pub struct Batch {
    parts: Vec<Part>,
}

impl Batch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a batch from existing parts
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    /// Build a single-part batch from raw bytes
    pub fn from_bytes(data: impl Into<bytes::Bytes>) -> Self {
        Self {
            parts: vec![Part::new(data)],
        }
    }

    /// Number of parts
    #[inline]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the batch holds no parts
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Get a part by index
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Part> {
        self.parts.get(index)
    }

    /// Get a mutable part by index
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Part> {
        self.parts.get_mut(index)
    }

    /// Append a part
    pub fn push(&mut self, part: Part) {
        self.parts.push(part);
    }

    /// Iterate parts in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Part> {
        self.parts.iter()
    }

    /// Iterate parts mutably in insertion order
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Part> {
        self.parts.iter_mut()
    }

    /// Total payload bytes across all parts
    pub fn total_bytes(&self) -> usize {
        self.parts.iter().map(|p| p.data().len()).sum()
    }

    /// Copy the batch and every part so the copy mutates independently
    pub fn deep_copy(&self) -> Self {
        Self {
            parts: self.parts.iter().map(Part::deep_copy).collect(),
        }
    }

    /// Copy the container while sharing the parts' underlying buffers
    pub fn shallow_copy(&self) -> Self {
        Self {
            parts: self.parts.clone(),
        }
    }

    /// Consume the batch, yielding its parts
    pub fn into_parts(self) -> Vec<Part> {
        self.parts
    }
}

impl IntoIterator for Batch {
    type Item = Part;
    type IntoIter = std::vec::IntoIter<Part>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.into_iter()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Part;
    type IntoIter = std::slice::Iter<'a, Part>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}

impl FromIterator<Part> for Batch {
    fn from_iter<T: IntoIterator<Item = Part>>(iter: T) -> Self {
        Self {
            parts: iter.into_iter().collect(),
        }
    }
}
