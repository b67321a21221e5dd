//! String and url refs.

use std::any::Any;
use std::hash::{Hash, Hasher};

use crate::heap::AbstractRef;

fn hash_str(s: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

fn copy_from(src: &[u8], offset: usize, dst: &mut [u8]) -> usize {
    if offset >= src.len() {
        return 0;
    }
    let n = dst.len().min(src.len() - offset);
    dst[..n].copy_from_slice(&src[offset..offset + n]);
    n
}

#[derive(Debug, Clone)]
pub struct StringRef {
    value: String,
    reachable: bool,
}

impl StringRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into(), reachable: false }
    }

    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl AbstractRef for StringRef {
    fn describe(&self) -> String {
        format!("<string {:?}>", self.value)
    }

    fn equals(&self, other: &dyn AbstractRef) -> bool {
        other.as_any().downcast_ref::<StringRef>().is_some_and(|o| o.value == self.value)
    }

    fn hash_value(&self) -> Option<u64> {
        Some(hash_str(&self.value))
    }

    fn raw_size(&self) -> usize {
        self.value.len()
    }

    fn raw_copy(&self, offset: usize, dst: &mut [u8]) -> usize {
        copy_from(self.value.as_bytes(), offset, dst)
    }

    fn utf8_value(&self) -> Option<&str> {
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

#[derive(Debug, Clone)]
pub struct UrlRef {
    value: String,
    reachable: bool,
}

impl UrlRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into(), reachable: false }
    }

    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl AbstractRef for UrlRef {
    fn describe(&self) -> String {
        format!("<url {}>", self.value)
    }

    fn equals(&self, other: &dyn AbstractRef) -> bool {
        other.as_any().downcast_ref::<UrlRef>().is_some_and(|o| o.value == self.value)
    }

    fn hash_value(&self) -> Option<u64> {
        Some(hash_str(&self.value))
    }

    fn raw_size(&self) -> usize {
        self.value.len()
    }

    fn raw_copy(&self, offset: usize, dst: &mut [u8]) -> usize {
        copy_from(self.value.as_bytes(), offset, dst)
    }

    fn uri_value(&self) -> Option<&str> {
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

pub(crate) fn copy_raw(src: &[u8], offset: usize, dst: &mut [u8]) -> usize {
    copy_from(src, offset, dst)
}
