use cranelift::codegen::ir;
use cranelift::prelude::{types, Block, InstBuilder, IntCC, Variable};

use super::function::FunctionEmitter;
use crate::error::EmitError;

/// Advisory loop annotations. Recorded on the loop; the backend is free
/// to ignore them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopHints {
    pub unroll: bool,
    pub parallel: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopKind {
    For,
    While,
}

/// Blocks making up one structured loop.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoopBlocks {
    pub initialization: Block,
    pub condition: Block,
    pub body: Block,
    /// Only counted loops have a separate increment block.
    pub increment: Option<Block>,
    pub after: Block,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopRecord {
    pub kind: LoopKind,
    pub blocks: LoopBlocks,
    pub hints: LoopHints,
}

/// An open counted loop. The emitter is positioned in the body block until
/// [`ForLoop::end`] consumes the handle.
#[must_use = "an open loop must be closed with ForLoop::end"]
pub struct ForLoop {
    counter: Variable,
    index: ir::Value,
    step: ir::Value,
    increment: Block,
    blocks: LoopBlocks,
}

impl ForLoop {
    /// Value of the iteration variable inside the body.
    pub fn index(&self) -> ir::Value {
        self.index
    }

    pub fn blocks(&self) -> &LoopBlocks {
        &self.blocks
    }

    /// Closes the body, emits the increment and moves to the block after the loop.
    pub fn end(self, f: &mut FunctionEmitter<'_>) {
        f.builder.ins().jump(self.increment, &[]);

        f.builder.switch_to_block(self.increment);
        let current = f.builder.use_var(self.counter);
        let next = f.builder.ins().iadd(current, self.step);
        f.builder.def_var(self.counter, next);
        f.builder.ins().jump(self.blocks.condition, &[]);

        f.builder.switch_to_block(self.blocks.after);
    }
}

impl<'a> FunctionEmitter<'a> {
    /// Opens `for (i = start; i < end; i += step)` over 64-bit integers.
    ///
    /// The loop counts down with `i > end` when `descending` is set.
    pub fn begin_for(
        &mut self,
        start: ir::Value,
        end: ir::Value,
        step: ir::Value,
        descending: bool,
        hints: LoopHints,
    ) -> ForLoop {
        let increment = self.builder.create_block();
        let blocks = LoopBlocks {
            initialization: self.builder.create_block(),
            condition: self.builder.create_block(),
            body: self.builder.create_block(),
            increment: Some(increment),
            after: self.builder.create_block(),
        };

        self.builder.ins().jump(blocks.initialization, &[]);

        self.builder.switch_to_block(blocks.initialization);
        let counter = self.declare_variable(types::I64, start);
        self.builder.ins().jump(blocks.condition, &[]);

        self.builder.switch_to_block(blocks.condition);
        let current = self.builder.use_var(counter);
        let cond = if descending {
            IntCC::SignedGreaterThan
        } else {
            IntCC::SignedLessThan
        };
        let keep_going = self.builder.ins().icmp(cond, current, end);
        self.builder
            .ins()
            .brif(keep_going, blocks.body, &[], blocks.after, &[]);

        self.builder.switch_to_block(blocks.body);
        let index = self.builder.use_var(counter);

        self.loops.push(LoopRecord {
            kind: LoopKind::For,
            blocks,
            hints,
        });

        ForLoop {
            counter,
            index,
            step,
            increment,
            blocks,
        }
    }

    /// Counted loop over literal bounds; `body` receives the iteration value.
    pub fn for_range<E>(
        &mut self,
        start: i64,
        end: i64,
        step: i64,
        body: impl FnOnce(&mut Self, ir::Value) -> Result<(), E>,
    ) -> Result<(), E>
    where
        E: From<EmitError>,
    {
        self.for_range_with_hints(start, end, step, LoopHints::default(), body)
    }

    pub fn for_range_with_hints<E>(
        &mut self,
        start: i64,
        end: i64,
        step: i64,
        hints: LoopHints,
        body: impl FnOnce(&mut Self, ir::Value) -> Result<(), E>,
    ) -> Result<(), E>
    where
        E: From<EmitError>,
    {
        if step == 0 {
            return Err(EmitError::InvalidLoopStep.into());
        }
        let start = self.builder.ins().iconst(types::I64, start);
        let end = self.builder.ins().iconst(types::I64, end);
        let step_value = self.builder.ins().iconst(types::I64, step);
        let handle = self.begin_for(start, end, step_value, step < 0, hints);
        body(self, handle.index())?;
        handle.end(self);
        Ok(())
    }

    /// `for i in 0..count`
    pub fn for_count<E>(
        &mut self,
        count: usize,
        body: impl FnOnce(&mut Self, ir::Value) -> Result<(), E>,
    ) -> Result<(), E>
    where
        E: From<EmitError>,
    {
        self.for_range(0, count as i64, 1, body)
    }

    /// Runs `body` while `condition` yields a non-zero value. The condition
    /// is evaluated before the first iteration and again after each one.
    pub fn while_loop<E>(
        &mut self,
        condition: impl FnOnce(&mut Self) -> Result<ir::Value, E>,
        body: impl FnOnce(&mut Self) -> Result<(), E>,
    ) -> Result<(), E> {
        let blocks = LoopBlocks {
            initialization: self.builder.create_block(),
            condition: self.builder.create_block(),
            body: self.builder.create_block(),
            increment: None,
            after: self.builder.create_block(),
        };
        self.loops.push(LoopRecord {
            kind: LoopKind::While,
            blocks,
            hints: LoopHints::default(),
        });

        self.builder.ins().jump(blocks.initialization, &[]);
        self.builder.switch_to_block(blocks.initialization);
        self.builder.ins().jump(blocks.condition, &[]);

        self.builder.switch_to_block(blocks.condition);
        let keep_going = condition(self)?;
        self.builder
            .ins()
            .brif(keep_going, blocks.body, &[], blocks.after, &[]);

        self.builder.switch_to_block(blocks.body);
        body(self)?;
        self.builder.ins().jump(blocks.condition, &[]);

        self.builder.switch_to_block(blocks.after);
        Ok(())
    }
}
