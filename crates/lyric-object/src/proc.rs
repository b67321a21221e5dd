//! Proc headers.
//!
//! A proc is laid out in the bytecode blob as:
//! `u32 proc_size | u16 num_arguments | u16 num_locals | u16 num_lexicals |
//! lexical table | code`, where `proc_size` counts every byte after itself
//! and each lexical entry is `u32 activation_call | u32 target_offset | u8 target`.

use crate::error::{ObjectError, Result};

pub const PROC_HEADER_SIZE: u32 = 10;
pub const LEXICAL_ENTRY_SIZE: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexicalEntry {
    /// Call index of the activation that owns the captured slot.
    pub activation_call: u32,
    pub target_offset: u32,
    /// One of `LEXICAL_ARGUMENT` / `LEXICAL_LOCAL`.
    pub target: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcHeader {
    pub proc_offset: u32,
    pub proc_size: u32,
    pub num_arguments: u16,
    pub num_locals: u16,
    pub lexicals: Vec<LexicalEntry>,
    /// Absolute offset of the first instruction.
    pub code_offset: u32,
    pub code_size: u32,
}

impl ProcHeader {
    pub fn read(bytecode: &[u8], proc_offset: u32) -> Result<Self> {
        let invalid = |reason| ObjectError::InvalidProc { offset: proc_offset, reason };
        let base = proc_offset as usize;
        let header = bytecode
            .get(base..base + PROC_HEADER_SIZE as usize)
            .ok_or_else(|| invalid("header out of range"))?;
        let proc_size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let num_arguments = u16::from_be_bytes([header[4], header[5]]);
        let num_locals = u16::from_be_bytes([header[6], header[7]]);
        let num_lexicals = u16::from_be_bytes([header[8], header[9]]);

        let table_size = LEXICAL_ENTRY_SIZE * num_lexicals as u32;
        if proc_size < 6 + table_size {
            return Err(invalid("proc size smaller than header"));
        }
        let end = base as u64 + 4 + proc_size as u64;
        if end > bytecode.len() as u64 {
            return Err(invalid("proc extends past end of bytecode"));
        }

        let mut lexicals = Vec::with_capacity(num_lexicals as usize);
        let mut pos = base + PROC_HEADER_SIZE as usize;
        for _ in 0..num_lexicals {
            let e = &bytecode[pos..pos + LEXICAL_ENTRY_SIZE as usize];
            lexicals.push(LexicalEntry {
                activation_call: u32::from_be_bytes([e[0], e[1], e[2], e[3]]),
                target_offset: u32::from_be_bytes([e[4], e[5], e[6], e[7]]),
                target: e[8],
            });
            pos += LEXICAL_ENTRY_SIZE as usize;
        }

        Ok(Self {
            proc_offset,
            proc_size,
            num_arguments,
            num_locals,
            lexicals,
            code_offset: pos as u32,
            code_size: proc_size - 6 - table_size,
        })
    }

    #[inline]
    pub fn num_lexicals(&self) -> u16 {
        self.lexicals.len() as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::LEXICAL_LOCAL;

    #[test]
    fn test_read_header_with_lexical() {
        let mut code = vec![0xAA, 0xBB];
        code.extend_from_slice(&(6u32 + 9 + 1).to_be_bytes());
        code.extend_from_slice(&2u16.to_be_bytes());
        code.extend_from_slice(&1u16.to_be_bytes());
        code.extend_from_slice(&1u16.to_be_bytes());
        code.extend_from_slice(&5u32.to_be_bytes());
        code.extend_from_slice(&0u32.to_be_bytes());
        code.push(LEXICAL_LOCAL);
        code.push(0x00);

        let header = ProcHeader::read(&code, 2).unwrap();
        assert_eq!(header.num_arguments, 2);
        assert_eq!(header.num_locals, 1);
        assert_eq!(header.lexicals, vec![LexicalEntry { activation_call: 5, target_offset: 0, target: LEXICAL_LOCAL }]);
        assert_eq!(header.code_offset, 2 + 10 + 9);
        assert_eq!(header.code_size, 1);
    }

    #[test]
    fn test_read_header_out_of_range() {
        let code = [0u8; 6];
        assert!(matches!(ProcHeader::read(&code, 0), Err(ObjectError::InvalidProc { .. })));
        let mut code = 100u32.to_be_bytes().to_vec();
        code.extend_from_slice(&[0; 6]);
        assert!(ProcHeader::read(&code, 0).is_err());
    }
}
