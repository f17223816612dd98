use std::collections::HashSet;
use std::sync::mpsc::{Receiver, Sender};

use crate::instruction::Instruction;
use crate::pass::CarriagePass;

/// How the debugger decides when to pause.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum StepMode {
    Step,
    StepCarriagePass,
    Continue,
}

/// Explicit hook interface the executer calls into, replacing the source's decorator
/// wrapping of execute calls (see the decorated-execution design note). `Send` so a
/// `Box<dyn DebugHook>` can be handed to a worker thread running the executer while a
/// driver loop on another thread answers its pause events (see `knitout-cli`'s
/// `--step`/`--step-pass`).
pub trait DebugHook: Send {
    fn on_instruction(&mut self, instruction: &Instruction);
    fn on_pass_end(&mut self, pass: &CarriagePass);
    fn on_error(&mut self, instruction: &Instruction) {
        let _ = instruction;
    }
}

/// A named predicate over `(debugger, instruction)`, flagged as firing per-instruction
/// or at pass end.
pub struct StepCondition {
    pub name: String,
    pub per_pass_end: bool,
    pub predicate: Box<dyn Fn(&Instruction) -> bool + Send>,
}

/// Reference `DebugHook` implementation that blocks on an `mpsc` channel for an
/// external resume signal whenever a pause condition fires. There is no bundled UI;
/// a caller drives the `Sender` half from another thread, a test, or the CLI.
pub struct ChannelDebugger {
    mode: StepMode,
    breakpoints: HashSet<u32>,
    conditions: Vec<StepCondition>,
    resume_rx: Receiver<()>,
    event_tx: Sender<DebugEvent>,
}

/// An event sent out to whatever is driving the debugger, so it knows when to send a
/// resume signal back.
pub enum DebugEvent {
    PausedBeforeInstruction(u64),
    PausedAfterPass(u64),
    Error(u64),
}

impl ChannelDebugger {
    pub fn new(
        mode: StepMode,
        resume_rx: Receiver<()>,
        event_tx: Sender<DebugEvent>,
    ) -> ChannelDebugger {
        ChannelDebugger {
            mode,
            breakpoints: HashSet::new(),
            conditions: Vec::new(),
            resume_rx,
            event_tx,
        }
    }

    pub fn add_breakpoint(&mut self, original_line: u32) {
        self.breakpoints.insert(original_line);
    }

    pub fn remove_breakpoint(&mut self, original_line: u32) {
        self.breakpoints.remove(&original_line);
    }

    pub fn add_condition(&mut self, condition: StepCondition) {
        self.conditions.push(condition);
    }

    fn wait_for_resume(&self) {
        let _ = self.resume_rx.recv();
    }

    fn should_pause_before(&self, instruction: &Instruction) -> bool {
        if self.mode == StepMode::Step {
            return true;
        }
        if let Some(line) = instruction.meta().original_line_number() {
            if self.breakpoints.contains(&line) {
                return true;
            }
        }
        self.conditions
            .iter()
            .filter(|c| !c.per_pass_end)
            .any(|c| (c.predicate)(instruction))
    }
}

impl DebugHook for ChannelDebugger {
    fn on_instruction(&mut self, instruction: &Instruction) {
        if self.should_pause_before(instruction) {
            let _ = self
                .event_tx
                .send(DebugEvent::PausedBeforeInstruction(instruction.id()));
            self.wait_for_resume();
        }
    }

    fn on_pass_end(&mut self, pass: &CarriagePass) {
        if self.mode == StepMode::StepCarriagePass {
            let _ = self.event_tx.send(DebugEvent::PausedAfterPass(pass.id()));
            self.wait_for_resume();
        }
    }

    fn on_error(&mut self, instruction: &Instruction) {
        let _ = self.event_tx.send(DebugEvent::Error(instruction.id()));
    }
}
