//! Class-heap iteration interface used by the collector's heap walking.
//!
//! A [`ClassHeapIterator`] walks the classes resident in one class memory
//! segment. The sequence is lazy, finite, single-pass, and non-restartable;
//! each call to [`ClassHeapIterator::next_class`] advances the internal
//! cursor.

use crate::classloader::ClassIndex;
use crate::context::VmContext;

/// Descriptor of one class memory segment.
#[derive(Debug, Default, Clone)]
pub struct ClassSegment {
    pub classes: Vec<ClassIndex>,
}

/// Single-pass iterator over the classes in one segment.
pub struct ClassHeapIterator<'a> {
    cursor: std::slice::Iter<'a, ClassIndex>,
}

impl<'a> ClassHeapIterator<'a> {
    /// Construct from a VM handle and a memory-segment descriptor.
    pub fn new(_vm: &'a VmContext, segment: &'a ClassSegment) -> Self {
        Self {
            cursor: segment.classes.iter(),
        }
    }

    /// The next resident class, or `None` once the segment is exhausted.
    pub fn next_class(&mut self) -> Option<ClassIndex> {
        self.cursor.next().copied()
    }
}

impl Iterator for ClassHeapIterator<'_> {
    type Item = ClassIndex;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_class()
    }
}
