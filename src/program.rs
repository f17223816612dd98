use crate::instruction::{HeaderKind, Instruction};

/// An ordered sequence of instructions with stable original-line numbers and
/// current-index bookkeeping. The sole owner of its line list.
#[derive(Clone, Debug, Default)]
pub struct Program {
    lines: Vec<Instruction>,
}

impl Program {
    pub fn new() -> Program {
        Program { lines: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[Instruction] {
        &self.lines
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.lines.get(index)
    }

    /// Renumbers `current_line_number` to match list index for every line from
    /// `from` onward. Original line numbers are never touched here.
    fn renumber_from(&mut self, from: usize) {
        for (index, line) in self.lines.iter_mut().enumerate().skip(from) {
            line.meta_mut().set_current_line_number(index as u32);
        }
    }

    /// Appends `line`, assigning its current index and, if unset, its original line
    /// number to the same value.
    pub fn append(&mut self, mut line: Instruction) {
        let index = self.lines.len() as u32;
        line.meta_mut().set_original_line_number_once(index);
        line.meta_mut().set_current_line_number(index);
        self.lines.push(line);
    }

    pub fn insert(&mut self, index: usize, line: Instruction) {
        self.insert_many(index, vec![line]);
    }

    pub fn insert_many(&mut self, index: usize, lines: Vec<Instruction>) {
        for (offset, mut line) in lines.into_iter().enumerate() {
            let insert_at = index + offset;
            line.meta_mut()
                .set_original_line_number_once(insert_at as u32);
            self.lines.insert(insert_at, line);
        }
        self.renumber_from(index);
    }

    pub fn remove(&mut self, index: usize) -> Instruction {
        let removed = self.lines.remove(index);
        self.renumber_from(index);
        removed
    }

    pub fn remove_range(&mut self, from: usize, to: usize) -> Vec<Instruction> {
        let removed: Vec<Instruction> = self.lines.splice(from..to, std::iter::empty()).collect();
        self.renumber_from(from);
        removed
    }

    /// Replaces the line at `index` with `new`. If `new` already has an original line
    /// number or source name, those are kept; otherwise it inherits the replaced
    /// line's.
    pub fn swap(&mut self, index: usize, mut new: Instruction) -> Instruction {
        let old = &self.lines[index];
        if new.meta().original_line_number().is_none() {
            if let Some(line) = old.meta().original_line_number() {
                new.meta_mut().set_original_line_number_once(line);
            }
        }
        if new.meta().source_name().is_none() {
            new.meta_mut()
                .set_source_name(old.meta().source_name().map(str::to_string));
        }
        new.meta_mut().set_current_line_number(index as u32);
        std::mem::replace(&mut self.lines[index], new)
    }

    /// Returns a new program whose needle instructions are all translated by `delta`
    /// slots; a no-op copy if `delta == 0`.
    pub fn shift_needle_positions(&self, delta: i64) -> Program {
        let mut out = Program::new();
        for line in &self.lines {
            if line.is_needle_instruction() {
                out.append(line.shifted(delta));
            } else {
                out.append(line.fresh_clone());
            }
        }
        out
    }

    /// Reassembles into canonical order: version line, then remaining headers, then
    /// body, dropping the requested categories, and renumbers.
    pub fn organize(
        &self,
        drop_comments: bool,
        drop_no_ops: bool,
        drop_pauses: bool,
        drop_breakpoints: bool,
    ) -> Program {
        let mut out = Program::new();
        let headers = self.headers();
        let version = headers
            .iter()
            .find(|i| i.header_kind() == Some(HeaderKind::Version));
        if let Some(v) = version {
            out.append((*v).clone());
        }
        for h in headers.iter().filter(|i| i.header_kind() != Some(HeaderKind::Version)) {
            out.append((*h).clone());
        }
        for line in &self.lines {
            if line.is_header() {
                continue;
            }
            if drop_comments && line.is_comment() {
                continue;
            }
            if drop_no_ops && line.is_no_op() {
                continue;
            }
            if drop_pauses && line.is_pause() {
                continue;
            }
            if drop_breakpoints && line.is_breakpoint() {
                continue;
            }
            out.append(line.clone());
        }
        out
    }

    /// Clones only the version and header lines into a new program.
    pub fn new_header_program(&self) -> Program {
        let mut out = Program::new();
        for h in self.headers() {
            out.append(h.clone());
        }
        out
    }

    pub fn headers(&self) -> Vec<&Instruction> {
        self.lines.iter().filter(|i| i.is_header()).collect()
    }

    pub fn body(&self) -> impl Iterator<Item = &Instruction> {
        self.lines.iter().filter(|i| !i.is_header())
    }

    pub fn comments(&self) -> impl Iterator<Item = &Instruction> {
        self.lines
            .iter()
            .filter(|i| i.is_comment() && !i.is_breakpoint())
    }

    pub fn loop_making(&self) -> impl Iterator<Item = &Instruction> {
        self.lines.iter().filter(|i| {
            matches!(
                i,
                Instruction::Knit { .. } | Instruction::Tuck { .. } | Instruction::Split { .. }
            )
        })
    }

    /// The index of the next loop-making instruction strictly after `after`, if any.
    pub fn next_loop_making_after(&self, after: usize) -> Option<usize> {
        self.lines
            .iter()
            .enumerate()
            .skip(after + 1)
            .find(|(_, i)| {
                matches!(
                    i,
                    Instruction::Knit { .. } | Instruction::Tuck { .. } | Instruction::Split { .. }
                )
            })
            .map(|(index, _)| index)
    }
}
