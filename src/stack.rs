//! Data and alternate stacks used by the engine.

use crate::{
    error::ScriptError,
    num::{cast_to_bool, ScriptNum, DEFAULT_SCRIPT_NUM_LEN},
};

/// Maximum size in bytes of a single stack element.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;
/// Maximum combined depth of the data and alternate stacks.
pub const MAX_STACK_SIZE: usize = 1000;

/// LIFO stack of byte strings.
///
/// Index `0` in the `peek`/`pick`/`nip` family always refers to the top item.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScriptStack {
    items: Vec<Vec<u8>>,
    verify_minimal_data: bool,
}

impl ScriptStack {
    pub fn new(verify_minimal_data: bool) -> Self {
        Self {
            items: Vec::new(),
            verify_minimal_data,
        }
    }

    pub fn from_items(items: Vec<Vec<u8>>, verify_minimal_data: bool) -> Self {
        Self {
            items,
            verify_minimal_data,
        }
    }

    pub fn depth(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items from bottom to top.
    pub fn items(&self) -> &[Vec<u8>] {
        &self.items
    }

    pub fn set_items(&mut self, items: Vec<Vec<u8>>) {
        self.items = items;
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn push(&mut self, data: Vec<u8>) -> Result<(), ScriptError> {
        if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ScriptError::ElementSize);
        }
        self.items.push(data);
        Ok(())
    }

    pub fn push_bool(&mut self, value: bool) -> Result<(), ScriptError> {
        self.push(if value { vec![1] } else { Vec::new() })
    }

    pub fn push_num(&mut self, value: ScriptNum) -> Result<(), ScriptError> {
        self.push(value.to_bytes())
    }

    pub fn pop(&mut self) -> Result<Vec<u8>, ScriptError> {
        self.items.pop().ok_or(ScriptError::StackUnderflow)
    }

    pub fn pop_bool(&mut self) -> Result<bool, ScriptError> {
        self.pop().map(|item| cast_to_bool(&item))
    }

    /// Pops an arithmetic operand limited to four encoded bytes.
    pub fn pop_num(&mut self) -> Result<ScriptNum, ScriptError> {
        let item = self.pop()?;
        ScriptNum::from_bytes(&item, self.verify_minimal_data, DEFAULT_SCRIPT_NUM_LEN)
    }

    pub fn peek(&self, idx: usize) -> Result<&[u8], ScriptError> {
        let depth = self.items.len();
        if idx >= depth {
            return Err(ScriptError::StackUnderflow);
        }
        Ok(&self.items[depth - 1 - idx])
    }

    pub fn peek_bool(&self, idx: usize) -> Result<bool, ScriptError> {
        self.peek(idx).map(cast_to_bool)
    }

    /// Reads the item at `idx` as a number without removing it.
    pub fn peek_num(&self, idx: usize, max_len: usize) -> Result<ScriptNum, ScriptError> {
        let item = self.peek(idx)?;
        ScriptNum::from_bytes(item, self.verify_minimal_data, max_len)
    }

    fn require(&self, count: usize) -> Result<(), ScriptError> {
        if self.items.len() < count {
            Err(ScriptError::StackUnderflow)
        } else {
            Ok(())
        }
    }

    /// Removes and returns the item at `idx`.
    pub fn nip_n(&mut self, idx: usize) -> Result<Vec<u8>, ScriptError> {
        self.require(idx + 1)?;
        let pos = self.items.len() - 1 - idx;
        Ok(self.items.remove(pos))
    }

    /// Copies the top item below the second one: `[x1 x2] -> [x2 x1 x2]`.
    pub fn tuck(&mut self) -> Result<(), ScriptError> {
        self.require(2)?;
        let top = self.items[self.items.len() - 1].clone();
        let pos = self.items.len() - 2;
        self.items.insert(pos, top);
        Ok(())
    }

    pub fn drop_n(&mut self, n: usize) -> Result<(), ScriptError> {
        self.require(n)?;
        let len = self.items.len();
        self.items.truncate(len - n);
        Ok(())
    }

    /// Duplicates the top `n` items in order.
    pub fn dup_n(&mut self, n: usize) -> Result<(), ScriptError> {
        if n == 0 {
            return Err(ScriptError::InvalidStackOperation);
        }
        self.require(n)?;
        let start = self.items.len() - n;
        self.items.extend_from_within(start..);
        Ok(())
    }

    /// Rotates the top `3n` items left by `n`: `[x1 x2 x3] -> [x2 x3 x1]`.
    pub fn rot_n(&mut self, n: usize) -> Result<(), ScriptError> {
        if n == 0 {
            return Err(ScriptError::InvalidStackOperation);
        }
        self.require(3 * n)?;
        let start = self.items.len() - 3 * n;
        self.items[start..].rotate_left(n);
        Ok(())
    }

    /// Swaps the top `n` items with the `n` below them.
    pub fn swap_n(&mut self, n: usize) -> Result<(), ScriptError> {
        if n == 0 {
            return Err(ScriptError::InvalidStackOperation);
        }
        self.require(2 * n)?;
        let start = self.items.len() - 2 * n;
        self.items[start..].rotate_left(n);
        Ok(())
    }

    /// Copies the `n` items sitting below the top `n` onto the top.
    pub fn over_n(&mut self, n: usize) -> Result<(), ScriptError> {
        if n == 0 {
            return Err(ScriptError::InvalidStackOperation);
        }
        self.require(2 * n)?;
        let start = self.items.len() - 2 * n;
        self.items.extend_from_within(start..start + n);
        Ok(())
    }

    /// Copies the item at depth `n` onto the top. `n` comes from the script
    /// itself so a bad index is an invalid operation rather than an underflow.
    pub fn pick_n(&mut self, n: i32) -> Result<(), ScriptError> {
        let idx = self.script_index(n)?;
        let item = self.items[self.items.len() - 1 - idx].clone();
        self.push(item)
    }

    /// Moves the item at depth `n` to the top.
    pub fn roll_n(&mut self, n: i32) -> Result<(), ScriptError> {
        let idx = self.script_index(n)?;
        let item = self.items.remove(self.items.len() - 1 - idx);
        self.items.push(item);
        Ok(())
    }

    fn script_index(&self, n: i32) -> Result<usize, ScriptError> {
        usize::try_from(n)
            .ok()
            .filter(|&idx| idx < self.items.len())
            .ok_or(ScriptError::InvalidStackOperation)
    }
}
