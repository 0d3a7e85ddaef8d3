//! Control-flow stacks
//!
//! Every nested construct saves some mask state on entry and restores it
//! on exit. The stacks are bounded; exceeding the nesting limit is an
//! error rather than silent corruption.

use sq_core::ExecError;

/// Maximum nesting depth of any control-flow stack
pub const MAX_NESTING: usize = 32;

/// Fixed-capacity stack used for all control-flow bookkeeping
#[derive(Debug, Clone)]
pub struct BoundedStack<T: Copy + Default> {
    name: &'static str,
    items: [T; MAX_NESTING],
    top: usize,
}

impl<T: Copy + Default> BoundedStack<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            items: [T::default(); MAX_NESTING],
            top: 0,
        }
    }

    pub fn push(&mut self, value: T) -> Result<(), ExecError> {
        if self.top >= MAX_NESTING {
            return Err(ExecError::StackOverflow {
                stack: self.name,
                capacity: MAX_NESTING,
            });
        }
        self.items[self.top] = value;
        self.top += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<T, ExecError> {
        if self.top == 0 {
            return Err(ExecError::StackUnderflow { stack: self.name });
        }
        self.top -= 1;
        Ok(self.items[self.top])
    }

    /// Value most recently pushed
    pub fn top(&self) -> Result<T, ExecError> {
        if self.top == 0 {
            return Err(ExecError::StackUnderflow { stack: self.name });
        }
        Ok(self.items[self.top - 1])
    }

    pub fn depth(&self) -> usize {
        self.top
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    /// Unwind to `depth` and return the value that was pushed at that depth.
    ///
    /// This is how RET/ENDSUB recover the state saved by the matching CAL:
    /// the CAL records the depth and then pushes, so the slot at `depth`
    /// holds the caller's value.
    pub fn restore(&mut self, depth: usize) -> Result<T, ExecError> {
        if depth >= self.top {
            return Err(ExecError::StackUnderflow { stack: self.name });
        }
        self.top = depth;
        Ok(self.items[depth])
    }

    /// Drop everything above `depth` without reading it
    pub fn truncate(&mut self, depth: usize) {
        self.top = self.top.min(depth);
    }

    pub fn clear(&mut self) {
        self.top = 0;
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// State of the innermost SWITCH
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitchRecord {
    /// Lanes currently executing inside the switch
    pub mask: u32,
    /// Per-lane selector value
    pub selector: [u32; 4],
    /// Lanes matched by any CASE so far
    pub default_mask: u32,
}

/// Which construct a BRK applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakType {
    #[default]
    Loop,
    Switch,
}

/// Stack depths and return address saved by CAL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallRecord {
    pub cond: usize,
    pub loop_: usize,
    pub cont: usize,
    pub loop_label: usize,
    pub switch: usize,
    pub brk: usize,
    pub return_pc: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_order() {
        let mut stack = BoundedStack::<u32>::new("cond");
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        assert_eq!(stack.top().unwrap(), 2);
        assert_eq!(stack.pop().unwrap(), 2);
        assert_eq!(stack.pop().unwrap(), 1);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_overflow_is_error() {
        let mut stack = BoundedStack::<u32>::new("loop");
        for i in 0..MAX_NESTING as u32 {
            stack.push(i).unwrap();
        }
        assert_eq!(
            stack.push(99),
            Err(ExecError::StackOverflow {
                stack: "loop",
                capacity: MAX_NESTING
            })
        );
    }

    #[test]
    fn test_underflow_is_error() {
        let mut stack = BoundedStack::<u32>::new("cont");
        assert!(matches!(
            stack.pop(),
            Err(ExecError::StackUnderflow { stack: "cont" })
        ));
    }

    #[test]
    fn test_restore_returns_saved_slot() {
        let mut stack = BoundedStack::<u32>::new("cond");
        stack.push(0xF).unwrap();
        let depth = stack.depth();
        stack.push(0x3).unwrap();
        stack.push(0x1).unwrap();
        assert_eq!(stack.restore(depth).unwrap(), 0x3);
        assert_eq!(stack.depth(), 1);
    }
}
