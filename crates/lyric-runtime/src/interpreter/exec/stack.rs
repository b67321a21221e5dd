//! Data stack instructions: POP, DUP, PICK, DROP, RPICK, RDROP

use lyric_object::{OpCell, Opcode};

use super::offset;
use crate::coroutine::StackfulCoroutine;
use crate::error::{InterpreterError, Result};

pub fn exec_stack(coro: &mut StackfulCoroutine, op: &OpCell) -> Result<()> {
    match op.opcode {
        Opcode::Pop => {
            coro.pop_data()?;
        }
        Opcode::Dup => {
            let value = coro.peek_data()?;
            coro.push_data(value);
        }
        // PICK and DROP count from the bottom, RPICK and RDROP from the top.
        Opcode::Pick => {
            let value = coro.peek_data_at(offset(op)? as isize)?;
            coro.push_data(value);
        }
        Opcode::Drop => coro.drop_data(offset(op)? as isize)?,
        Opcode::RPick => {
            let value = coro.peek_data_at(-1 - offset(op)? as isize)?;
            coro.push_data(value);
        }
        Opcode::RDrop => coro.drop_data(-1 - offset(op)? as isize)?,
        other => return Err(InterpreterError::invariant(format!("{} is not a stack instruction", other))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_cell::DataCell;
    use lyric_object::Operands;

    fn op(opcode: Opcode, operands: Operands) -> OpCell {
        OpCell { opcode, operands, offset: 0 }
    }

    fn coro_with(values: &[i64]) -> StackfulCoroutine {
        let mut coro = StackfulCoroutine::new();
        for v in values {
            coro.push_data(DataCell::I64(*v));
        }
        coro
    }

    #[test]
    fn test_pick_counts_from_bottom_and_rpick_from_top() {
        let mut coro = coro_with(&[10, 20, 30]);
        exec_stack(&mut coro, &op(Opcode::Pick, Operands::Offset(0))).unwrap();
        assert_eq!(coro.pop_data().unwrap(), DataCell::I64(10));
        exec_stack(&mut coro, &op(Opcode::RPick, Operands::Offset(1))).unwrap();
        assert_eq!(coro.pop_data().unwrap(), DataCell::I64(20));
    }

    #[test]
    fn test_drop_and_rdrop() {
        let mut coro = coro_with(&[10, 20, 30, 40]);
        exec_stack(&mut coro, &op(Opcode::Drop, Operands::Offset(1))).unwrap();
        exec_stack(&mut coro, &op(Opcode::RDrop, Operands::Offset(0))).unwrap();
        let rest: Vec<DataCell> = coro.data().copied().collect();
        assert_eq!(rest, vec![DataCell::I64(30), DataCell::I64(10)]);
    }

    #[test]
    fn test_pop_empty_stack_fails() {
        let mut coro = StackfulCoroutine::new();
        assert!(exec_stack(&mut coro, &op(Opcode::Pop, Operands::None)).is_err());
        assert!(exec_stack(&mut coro, &op(Opcode::Pick, Operands::Jump(1))).is_err());
    }
}
