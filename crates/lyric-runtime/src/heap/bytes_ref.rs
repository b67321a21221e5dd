//! Byte buffer refs.

use std::any::Any;
use std::hash::{Hash, Hasher};

use crate::heap::string_ref::copy_raw;
use crate::heap::AbstractRef;

#[derive(Debug, Clone)]
pub struct BytesRef {
    value: Vec<u8>,
    reachable: bool,
}

impl BytesRef {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self { value: value.into(), reachable: false }
    }

    #[inline]
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl AbstractRef for BytesRef {
    fn describe(&self) -> String {
        format!("<bytes len={}>", self.value.len())
    }

    fn equals(&self, other: &dyn AbstractRef) -> bool {
        other.as_any().downcast_ref::<BytesRef>().is_some_and(|o| o.value == self.value)
    }

    fn hash_value(&self) -> Option<u64> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.value.hash(&mut hasher);
        Some(hasher.finish())
    }

    fn raw_size(&self) -> usize {
        self.value.len()
    }

    fn raw_copy(&self, offset: usize, dst: &mut [u8]) -> usize {
        copy_raw(&self.value, offset, dst)
    }

    fn bytes_value(&self) -> Option<&[u8]> {
        Some(&self.value)
    }

    fn is_reachable(&self) -> bool {
        self.reachable
    }

    fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
