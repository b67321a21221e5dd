//! Status refs carry a status code and message as a first-class value.

use std::any::Any;
use std::sync::Arc;

use crate::error::StatusCode;
use crate::heap::AbstractRef;
use crate::virtual_table::VirtualTable;

#[derive(Debug, Clone)]
pub struct StatusRef {
    code: StatusCode,
    message: String,
    vtable: Option<Arc<VirtualTable>>,
    reachable: bool,
}

impl StatusRef {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), vtable: None, reachable: false }
    }

    /// A status bound to one of the prelude's status classes.
    pub fn with_table(code: StatusCode, message: impl Into<String>, vtable: Arc<VirtualTable>) -> Self {
        Self { code, message: message.into(), vtable: Some(vtable), reachable: false }
    }

    #[inline]
    pub fn code(&self) -> StatusCode {
        self.code
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl AbstractRef for StatusRef {
    fn describe(&self) -> String {
        format!("<status {:?}: {}>", self.code, self.message)
    }

    fn virtual_table(&self) -> Option<&Arc<VirtualTable>> {
        self.vtable.as_ref()
    }

    fn equals(&self, other: &dyn AbstractRef) -> bool {
        other
            .as_any()
            .downcast_ref::<StatusRef>()
            .is_some_and(|o| o.code == self.code && o.message == self.message)
    }

    fn utf8_value(&self) -> Option<&str> {
        Some(&self.message)
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
