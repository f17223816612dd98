use std::collections::HashMap;

use thiserror::Error;

use crate::debug::DebugHook;
use crate::header::Header;
use crate::instruction::{Instruction, InstructionId, InstructionMeta};
use crate::machine::{MachineError, MachineModel, MachineSnapshot, ViolationPolicy};
use crate::needle::{decompose_rack, Direction};
use crate::pass::CarriagePass;
use crate::program::Program;

/// An error raised while executing a program, with the offending instruction and
/// current line attached as context, per the execution-context-capture design.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("machine error at line {line:?} ({instruction}): {cause}")]
    Machine {
        instruction_id: InstructionId,
        instruction: String,
        line: Option<u32>,
        #[source]
        cause: MachineError,
    },
    #[error("invariant violation: {0}")]
    InvariantViolation(&'static str),
}

/// Orchestrates parse → header extraction → per-instruction dispatch → carriage-pass
/// assembly → machine execution → re-emission, per the executer sequence.
pub struct Executer {
    machine: MachineModel,
    header: Header,
    executed: Program,
    current_pass: Option<CarriagePass>,
    passes: Vec<CarriagePass>,
    leftmost: Option<i64>,
    rightmost: Option<i64>,
    snapshot_lines: Vec<u32>,
    snapshots: HashMap<u32, MachineSnapshot>,
    debugger: Option<Box<dyn DebugHook>>,
}

impl Executer {
    pub fn new(header: Header) -> Executer {
        let spec = header.to_machine_spec();
        Executer::with_machine(header, MachineModel::new(&spec))
    }

    pub fn with_machine(header: Header, machine: MachineModel) -> Executer {
        Executer {
            machine,
            header,
            executed: Program::new(),
            current_pass: None,
            passes: Vec::new(),
            leftmost: None,
            rightmost: None,
            snapshot_lines: Vec::new(),
            snapshots: HashMap::new(),
            debugger: None,
        }
    }

    pub fn with_policy(mut self, policy: ViolationPolicy) -> Executer {
        self.machine = self.machine.with_policy(policy);
        self
    }

    pub fn with_debugger(mut self, debugger: Box<dyn DebugHook>) -> Executer {
        self.debugger = Some(debugger);
        self
    }

    pub fn enable_snapshot(&mut self, line: u32) {
        if let Some(max_current) = self.executed.lines().iter().filter_map(|i| i.meta().current_line_number()).max() {
            if line <= max_current {
                log::warn!("enabling snapshot at already-passed line {}", line);
            }
        }
        if !self.snapshot_lines.contains(&line) {
            self.snapshot_lines.push(line);
        }
    }

    pub fn disable_snapshot(&mut self, line: u32, discard_existing: bool) {
        self.snapshot_lines.retain(|l| *l != line);
        if discard_existing {
            self.snapshots.remove(&line);
        }
    }

    pub fn snapshots(&self) -> &HashMap<u32, MachineSnapshot> {
        &self.snapshots
    }

    pub fn machine(&self) -> &MachineModel {
        &self.machine
    }

    pub fn executed_program(&self) -> &Program {
        &self.executed
    }

    pub fn passes_extrema(&self) -> (Option<i64>, Option<i64>) {
        (self.leftmost, self.rightmost)
    }

    /// Every carriage pass closed so far, in execution order, per the "record the pass
    /// in the engine's pass list" step of closing a pass.
    pub fn passes(&self) -> &[CarriagePass] {
        &self.passes
    }

    /// Runs §4.5's sequence over `program`'s body after extracting headers into this
    /// executer's `Header`.
    pub fn run(&mut self, program: &Program) -> Result<(), ExecutionError> {
        self.header.extract_from(program);
        for header_instr in self.header.to_instructions() {
            self.append_executed(header_instr);
        }
        for instruction in program.body() {
            self.dispatch(instruction.clone())?;
        }
        self.close_current_pass()?;
        Ok(())
    }

    fn maybe_snapshot(&mut self, instruction: &Instruction) {
        if let Some(line) = instruction.meta().original_line_number() {
            if self.snapshot_lines.contains(&line) {
                self.snapshots.insert(line, self.machine.snapshot());
            }
        }
    }

    fn append_executed(&mut self, instruction: Instruction) {
        self.executed.append(instruction.clone());
        self.maybe_snapshot(&instruction);
    }

    fn wrap_error(&mut self, instruction: &Instruction, cause: MachineError) -> ExecutionError {
        if let Some(line) = instruction.meta().original_line_number() {
            self.snapshots.insert(line, self.machine.snapshot());
        }
        if let Some(debugger) = &mut self.debugger {
            debugger.on_error(instruction);
        }
        ExecutionError::Machine {
            instruction_id: instruction.id(),
            instruction: instruction.to_string(),
            line: instruction.meta().original_line_number(),
            cause,
        }
    }

    fn dispatch(&mut self, instruction: Instruction) -> Result<(), ExecutionError> {
        if instruction.is_comment() || instruction.is_pause() || instruction.is_breakpoint() {
            if let Some(debugger) = &mut self.debugger {
                debugger.on_instruction(&instruction);
            }
            self.append_executed(instruction);
            return Ok(());
        }
        if instruction.is_needle_instruction() {
            self.route_to_assembler(instruction)?;
            return Ok(());
        }
        self.close_current_pass()?;
        self.execute_directly(instruction)
    }

    fn execute_directly(&mut self, instruction: Instruction) -> Result<(), ExecutionError> {
        if let Some(debugger) = &mut self.debugger {
            debugger.on_instruction(&instruction);
        }
        let effected = self
            .run_non_needle(&instruction)
            .map_err(|e| self.wrap_error(&instruction, e))?;
        self.emit_executed_or_no_op(instruction, effected);
        Ok(())
    }

    fn run_non_needle(&mut self, instruction: &Instruction) -> Result<bool, MachineError> {
        match instruction {
            Instruction::Rack { value, .. } => {
                let (rack, all_needle) = decompose_rack(*value);
                Ok(self.machine.rack_to(rack, all_needle))
            }
            Instruction::In { carrier, .. } => {
                self.machine.bring_in(*carrier)?;
                Ok(true)
            }
            Instruction::Inhook { carrier, .. } => {
                self.machine.in_hook(*carrier)?;
                Ok(true)
            }
            Instruction::Out { carrier, .. } => {
                self.machine.out(*carrier)?;
                Ok(true)
            }
            Instruction::Outhook { carrier, .. } => {
                self.machine.out_hook(*carrier)?;
                Ok(true)
            }
            Instruction::Releasehook { carrier, .. } => {
                self.machine.release_hook(*carrier)?;
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    fn emit_executed_or_no_op(&mut self, instruction: Instruction, effected: bool) {
        if effected {
            self.append_executed(instruction);
        } else if instruction.meta().original_line_number().is_some() {
            let mut meta = InstructionMeta::new();
            meta.set_comment(instruction.meta().comment().map(str::to_string));
            let no_op = Instruction::NoOp {
                meta,
                wrapped: Box::new(instruction),
                note: None,
            };
            self.append_executed(no_op);
        }
    }

    fn route_to_assembler(&mut self, instruction: Instruction) -> Result<(), ExecutionError> {
        let (rack, all_needle) = self.machine.rack();
        let joins_current = self
            .current_pass
            .as_ref()
            .map(|pass| pass.can_add(&instruction, rack, all_needle))
            .unwrap_or(false);
        if !joins_current {
            self.close_current_pass()?;
            self.current_pass = Some(CarriagePass::start(instruction, rack, all_needle));
        } else if let Some(pass) = &mut self.current_pass {
            pass.add(instruction);
        }
        Ok(())
    }

    fn close_current_pass(&mut self) -> Result<(), ExecutionError> {
        let mut pass = match self.current_pass.take() {
            Some(p) => p,
            None => return Ok(()),
        };

        if pass.class() == crate::instruction::PassClass::Xfer && pass.direction().is_none() {
            pass.set_direction(Direction::Rightward);
        }

        let (rack, all_needle) = (pass.rack(), pass.all_needle());
        let rack_changed = self.machine.rack_to(rack, all_needle);
        if rack_changed {
            let rack_instr = Instruction::Rack {
                meta: InstructionMeta::new(),
                value: num::rational::Ratio::from_integer(rack),
            };
            self.append_executed(rack_instr);
        }

        let mut course_loops = Vec::new();
        for instr in pass.instructions().to_vec() {
            if let Some(debugger) = &mut self.debugger {
                debugger.on_instruction(&instr);
            }
            let before = self.machine.loops().len();
            let effected = self
                .execute_needle_instruction(&instr)
                .map_err(|e| self.wrap_error(&instr, e))?;
            let after = self.machine.loops().len();
            if after > before {
                course_loops.push((after - 1) as crate::loopgraph::LoopId);
            }
            self.emit_executed_or_no_op(instr, effected);
        }
        // Loops formed by consecutive needle-instructions in the same carriage pass
        // share a yarn segment; record that adjacency as course edges.
        for pair in course_loops.windows(2) {
            self.machine.knit_graph_mut().add_course_edge(pair[0], pair[1]);
        }

        let (left, right) = pass.slot_extrema();
        self.leftmost = Some(self.leftmost.map_or(left, |l| l.min(left)));
        self.rightmost = Some(self.rightmost.map_or(right, |r| r.max(right)));

        if let Some(debugger) = &mut self.debugger {
            debugger.on_pass_end(&pass);
        }
        self.passes.push(pass);
        Ok(())
    }

    /// Executes a single needle instruction against the machine, returning whether it
    /// effected state (made/moved/dropped loops, or carrier movement).
    fn execute_needle_instruction(&mut self, instr: &Instruction) -> Result<bool, MachineError> {
        match instr {
            Instruction::Miss {
                carriers,
                needle,
                direction,
                ..
            } => {
                self.machine.miss(carriers, *needle, *direction)?;
                Ok(true)
            }
            Instruction::Tuck {
                carriers, needle, ..
            } => {
                let made = self.machine.tuck(carriers, *needle)?;
                for loop_id in &made {
                    self.machine.loops_mut().set_source(*loop_id, instr.id());
                }
                Ok(!made.is_empty())
            }
            Instruction::Kick {
                carriers,
                needle,
                direction,
                ..
            } => {
                self.machine.miss(carriers, *needle, *direction)?;
                Ok(true)
            }
            Instruction::Knit {
                carriers, needle, ..
            } => {
                let (dropped, made) = self.machine.knit(carriers, *needle)?;
                for loop_id in &made {
                    self.machine.loops_mut().set_source(*loop_id, instr.id());
                }
                for loop_id in &dropped {
                    self.machine.loops_mut().drop_from_bed(*loop_id, instr.id());
                }
                Ok(!made.is_empty() || !dropped.is_empty())
            }
            Instruction::Split {
                carriers,
                needle,
                needle_2,
                ..
            } => {
                let (made, moved) = self.machine.split(carriers, *needle, *needle_2)?;
                for loop_id in &made {
                    self.machine.loops_mut().set_source(*loop_id, instr.id());
                }
                for loop_id in &moved {
                    self.machine.loops_mut().add_transfer(*loop_id, instr.id());
                }
                Ok(!made.is_empty() || !moved.is_empty())
            }
            Instruction::Xfer { needle, needle_2, .. } => {
                let moved = self.machine.xfer(*needle, *needle_2)?;
                for loop_id in &moved {
                    self.machine.loops_mut().add_transfer(*loop_id, instr.id());
                }
                Ok(!moved.is_empty())
            }
            Instruction::Drop { needle, .. } => {
                let dropped = self.machine.drop(*needle)?;
                for loop_id in &dropped {
                    self.machine.loops_mut().drop_from_bed(*loop_id, instr.id());
                }
                Ok(!dropped.is_empty())
            }
            _ => Ok(true),
        }
    }
}
