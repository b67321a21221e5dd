//! Intrinsic types and type comparison.

use hashbrown::HashMap;
use lyric_object::{IntrinsicType, LinkageSection, INVALID_ADDRESS_U32};

use crate::data_cell::DataCell;
use crate::error::{InterpreterError, Result};
use crate::heap::AbstractHeap;
use crate::segment_manager::SegmentManager;

/// Relation of `lhs` to `rhs` as reported by `TYPE_CMP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeComparison {
    Equal,
    /// `lhs` is a subtype of `rhs`.
    Extends,
    /// `lhs` is a supertype of `rhs`.
    Super,
    Disjoint,
}

impl TypeComparison {
    /// Value pushed by `TYPE_CMP`.
    pub fn as_i64(self) -> i64 {
        match self {
            TypeComparison::Extends => -1,
            TypeComparison::Equal => 0,
            TypeComparison::Super | TypeComparison::Disjoint => 1,
        }
    }
}

/// Maps builtin cells to the type cells the prelude binds them to.
#[derive(Debug, Default, Clone)]
pub struct TypeManager {
    intrinsics: HashMap<IntrinsicType, DataCell>,
}

impl TypeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect intrinsic bindings from the existentials of the prelude segment.
    pub fn from_prelude(segments: &mut SegmentManager, prelude: u32) -> Result<Self> {
        let bindings: Vec<(IntrinsicType, u32)> = segments
            .segment(prelude)?
            .object()
            .existentials
            .iter()
            .filter_map(|e| e.intrinsic.map(|i| (i, e.existential_type)))
            .collect();

        let mut manager = Self::new();
        for (intrinsic, type_address) in bindings {
            let type_cell = segments
                .resolve_descriptor(prelude, LinkageSection::Type, type_address)
                .map_err(|_| InterpreterError::invariant("invalid intrinsic mapping detected"))?;
            manager.bind(intrinsic, type_cell)?;
        }
        log::debug!("bound {} intrinsic types", manager.intrinsics.len());
        Ok(manager)
    }

    pub fn bind(&mut self, intrinsic: IntrinsicType, type_cell: DataCell) -> Result<()> {
        if !matches!(type_cell, DataCell::Type(_)) {
            return Err(InterpreterError::invariant("invalid intrinsic mapping detected"));
        }
        if self.intrinsics.insert(intrinsic, type_cell).is_some() {
            return Err(InterpreterError::invariant("duplicate intrinsic mapping detected"));
        }
        Ok(())
    }

    pub fn intrinsic_type(&self, intrinsic: IntrinsicType) -> Option<DataCell> {
        self.intrinsics.get(&intrinsic).copied()
    }

    /// Type cell of `value`, or `Invalid` when no type is bound for it.
    pub fn type_of(&self, value: &DataCell, heap: &AbstractHeap) -> Result<DataCell> {
        let intrinsic = match value {
            DataCell::Invalid => return Err(InterpreterError::invariant("invalid data cell has no type")),
            DataCell::Nil => IntrinsicType::Nil,
            DataCell::Undef => IntrinsicType::Undef,
            DataCell::Bool(_) => IntrinsicType::Bool,
            DataCell::I64(_) => IntrinsicType::Int,
            DataCell::Dbl(_) => IntrinsicType::Float,
            DataCell::Chr(_) => IntrinsicType::Char,
            DataCell::Class(_) => IntrinsicType::Class,
            DataCell::Struct(_) => IntrinsicType::Struct,
            DataCell::Instance(_) => IntrinsicType::Instance,
            DataCell::Concept(_) => IntrinsicType::Concept,
            DataCell::Enum(_) => IntrinsicType::Enum,
            DataCell::Call(_) => IntrinsicType::Call,
            DataCell::Field(_) => IntrinsicType::Field,
            DataCell::Action(_) => IntrinsicType::Action,
            DataCell::Type(_) => IntrinsicType::Type,
            DataCell::Existential(_) => IntrinsicType::Existential,
            DataCell::Namespace(_) => IntrinsicType::Namespace,
            DataCell::String(_) => IntrinsicType::String,
            DataCell::Url(_) => IntrinsicType::Url,
            DataCell::Bytes(_) => IntrinsicType::Bytes,
            DataCell::Rest(_) => IntrinsicType::Rest,
            DataCell::Ref(handle) => {
                return Ok(heap
                    .get(*handle)?
                    .virtual_table()
                    .map(|t| t.type_cell())
                    .unwrap_or(DataCell::Invalid));
            }
            DataCell::Status(handle) => {
                if let Some(table) = heap.get(*handle)?.virtual_table() {
                    return Ok(table.type_cell());
                }
                IntrinsicType::Status
            }
        };
        Ok(self.intrinsic_type(intrinsic).unwrap_or(DataCell::Invalid))
    }

    /// Compare two type cells by walking each one's super type chain.
    pub fn compare_types(&self, lhs: &DataCell, rhs: &DataCell, segments: &mut SegmentManager) -> Result<TypeComparison> {
        if !matches!(lhs, DataCell::Type(_)) || !matches!(rhs, DataCell::Type(_)) {
            return Err(InterpreterError::invariant("type comparison requires type operands"));
        }
        if lhs == rhs {
            return Ok(TypeComparison::Equal);
        }
        if is_ancestor(segments, lhs, rhs)? {
            return Ok(TypeComparison::Extends);
        }
        if is_ancestor(segments, rhs, lhs)? {
            return Ok(TypeComparison::Super);
        }
        Ok(TypeComparison::Disjoint)
    }
}

/// True when `ancestor` appears in the super type chain of `start`.
fn is_ancestor(segments: &mut SegmentManager, start: &DataCell, ancestor: &DataCell) -> Result<bool> {
    let mut curr = *start;
    for _ in 0..segments.max_table_depth {
        let Some(d) = curr.descriptor() else {
            return Ok(false);
        };
        let super_type = segments
            .segment(d.segment)?
            .object()
            .get_type(d.index)
            .ok_or_else(|| InterpreterError::invariant(format!("missing type {}", curr)))?
            .super_type;
        if super_type == INVALID_ADDRESS_U32 {
            return Ok(false);
        }
        curr = segments.resolve_descriptor(d.segment, LinkageSection::Type, super_type)?;
        if &curr == ancestor {
            return Ok(true);
        }
    }
    Err(InterpreterError::invariant("type hierarchy exceeds maximum depth"))
}
