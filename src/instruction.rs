use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use num::rational::Ratio;

use crate::carrier::{CarrierId, CarrierSet};
use crate::needle::{Direction, Needle};

pub type InstructionId = u64;

static NEXT_INSTRUCTION_ID: AtomicU64 = AtomicU64::new(0);

fn next_instruction_id() -> InstructionId {
    NEXT_INSTRUCTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Which header kind a header-line instruction carries. Used to enforce "at most one
/// header line per kind" in a `Program`.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum HeaderKind {
    Version,
    Machine,
    Gauge,
    Position,
    Carriers,
}

/// The compatibility class a needle instruction belongs to for carriage-pass grouping.
/// Knit/Tuck/Kick share a class; every other kind is compatible only with itself.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum PassClass {
    KnitPass,
    Split,
    Xfer,
    Drop,
    Miss,
}

/// Metadata shared by every instruction: line bookkeeping, provenance, and a stable
/// creation-order id. A fresh clone (see `Instruction::fresh_clone`) must not carry
/// forward the line numbers or source name of the instruction it was cloned from.
#[derive(Clone, Debug)]
pub struct InstructionMeta {
    id: InstructionId,
    original_line_number: Option<u32>,
    current_line_number: Option<u32>,
    source_name: Option<String>,
    comment: Option<String>,
}

impl InstructionMeta {
    pub fn new() -> InstructionMeta {
        InstructionMeta {
            id: next_instruction_id(),
            original_line_number: None,
            current_line_number: None,
            source_name: None,
            comment: None,
        }
    }

    pub fn id(&self) -> InstructionId {
        self.id
    }

    pub fn original_line_number(&self) -> Option<u32> {
        self.original_line_number
    }

    /// Sets the original line number. No-op once already set: original line numbers
    /// are assigned exactly once at parse time.
    pub fn set_original_line_number_once(&mut self, line: u32) {
        if self.original_line_number.is_none() {
            self.original_line_number = Some(line);
        }
    }

    pub fn current_line_number(&self) -> Option<u32> {
        self.current_line_number
    }

    pub fn set_current_line_number(&mut self, line: u32) {
        self.current_line_number = Some(line);
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment;
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    pub fn set_source_name(&mut self, name: Option<String>) {
        self.source_name = name;
    }

    fn comment_suffix(&self) -> String {
        match &self.comment {
            Some(c) => format!("; {}", c),
            None => String::new(),
        }
    }
}

impl Default for InstructionMeta {
    fn default() -> Self {
        InstructionMeta::new()
    }
}

/// Every distinguishable knitout line, as a single tagged variant. Collapsing the
/// source's directed/loop-making/two-needle/dropping class hierarchy into one enum
/// follows the tagged-variants-over-inheritance design note: pass-compatibility and
/// every other capability check becomes a pure function of the variant tag.
#[derive(Clone, Debug)]
pub enum Instruction {
    Version {
        meta: InstructionMeta,
        version: u32,
    },
    Machine {
        meta: InstructionMeta,
        machine: String,
    },
    Gauge {
        meta: InstructionMeta,
        gauge: u32,
    },
    Position {
        meta: InstructionMeta,
        position: String,
    },
    Carriers {
        meta: InstructionMeta,
        count: u32,
    },
    /// A `;;Key: value` header line whose key is not one of the five typed kinds
    /// (e.g. `Yarn-1`). Preserved verbatim rather than being dropped.
    HeaderExtra {
        meta: InstructionMeta,
        key: String,
        value: String,
    },
    Comment {
        meta: InstructionMeta,
        text: String,
    },
    NoOp {
        meta: InstructionMeta,
        wrapped: Box<Instruction>,
        note: Option<String>,
    },
    Breakpoint {
        meta: InstructionMeta,
        text: Option<String>,
    },
    Pause {
        meta: InstructionMeta,
    },
    Rack {
        meta: InstructionMeta,
        value: Ratio<i64>,
    },
    In {
        meta: InstructionMeta,
        carrier: CarrierId,
    },
    Inhook {
        meta: InstructionMeta,
        carrier: CarrierId,
    },
    Out {
        meta: InstructionMeta,
        carrier: CarrierId,
    },
    Outhook {
        meta: InstructionMeta,
        carrier: CarrierId,
    },
    Releasehook {
        meta: InstructionMeta,
        carrier: CarrierId,
    },
    Knit {
        meta: InstructionMeta,
        needle: Needle,
        direction: Direction,
        carriers: CarrierSet,
    },
    Tuck {
        meta: InstructionMeta,
        needle: Needle,
        direction: Direction,
        carriers: CarrierSet,
    },
    Miss {
        meta: InstructionMeta,
        needle: Needle,
        direction: Direction,
        carriers: CarrierSet,
    },
    Kick {
        meta: InstructionMeta,
        needle: Needle,
        direction: Direction,
        carriers: CarrierSet,
    },
    Split {
        meta: InstructionMeta,
        needle: Needle,
        direction: Direction,
        needle_2: Needle,
        carriers: CarrierSet,
    },
    Xfer {
        meta: InstructionMeta,
        needle: Needle,
        needle_2: Needle,
    },
    Drop {
        meta: InstructionMeta,
        needle: Needle,
    },
}

impl Instruction {
    pub fn meta(&self) -> &InstructionMeta {
        match self {
            Instruction::Version { meta, .. }
            | Instruction::Machine { meta, .. }
            | Instruction::Gauge { meta, .. }
            | Instruction::Position { meta, .. }
            | Instruction::Carriers { meta, .. }
            | Instruction::HeaderExtra { meta, .. }
            | Instruction::Comment { meta, .. }
            | Instruction::NoOp { meta, .. }
            | Instruction::Breakpoint { meta, .. }
            | Instruction::Pause { meta }
            | Instruction::Rack { meta, .. }
            | Instruction::In { meta, .. }
            | Instruction::Inhook { meta, .. }
            | Instruction::Out { meta, .. }
            | Instruction::Outhook { meta, .. }
            | Instruction::Releasehook { meta, .. }
            | Instruction::Knit { meta, .. }
            | Instruction::Tuck { meta, .. }
            | Instruction::Miss { meta, .. }
            | Instruction::Kick { meta, .. }
            | Instruction::Split { meta, .. }
            | Instruction::Xfer { meta, .. }
            | Instruction::Drop { meta, .. } => meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut InstructionMeta {
        match self {
            Instruction::Version { meta, .. }
            | Instruction::Machine { meta, .. }
            | Instruction::Gauge { meta, .. }
            | Instruction::Position { meta, .. }
            | Instruction::Carriers { meta, .. }
            | Instruction::HeaderExtra { meta, .. }
            | Instruction::Comment { meta, .. }
            | Instruction::NoOp { meta, .. }
            | Instruction::Breakpoint { meta, .. }
            | Instruction::Pause { meta }
            | Instruction::Rack { meta, .. }
            | Instruction::In { meta, .. }
            | Instruction::Inhook { meta, .. }
            | Instruction::Out { meta, .. }
            | Instruction::Outhook { meta, .. }
            | Instruction::Releasehook { meta, .. }
            | Instruction::Knit { meta, .. }
            | Instruction::Tuck { meta, .. }
            | Instruction::Miss { meta, .. }
            | Instruction::Kick { meta, .. }
            | Instruction::Split { meta, .. }
            | Instruction::Xfer { meta, .. }
            | Instruction::Drop { meta, .. } => meta,
        }
    }

    pub fn id(&self) -> InstructionId {
        self.meta().id()
    }

    pub fn header_kind(&self) -> Option<HeaderKind> {
        match self {
            Instruction::Version { .. } => Some(HeaderKind::Version),
            Instruction::Machine { .. } => Some(HeaderKind::Machine),
            Instruction::Gauge { .. } => Some(HeaderKind::Gauge),
            Instruction::Position { .. } => Some(HeaderKind::Position),
            Instruction::Carriers { .. } => Some(HeaderKind::Carriers),
            _ => None,
        }
    }

    pub fn is_header(&self) -> bool {
        self.header_kind().is_some() || matches!(self, Instruction::HeaderExtra { .. })
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, Instruction::Comment { .. })
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self, Instruction::NoOp { .. })
    }

    pub fn is_breakpoint(&self) -> bool {
        matches!(self, Instruction::Breakpoint { .. })
    }

    pub fn is_pause(&self) -> bool {
        matches!(self, Instruction::Pause { .. })
    }

    /// True for instructions that run through the carriage-pass assembler rather than
    /// executing immediately against the machine.
    pub fn pass_class(&self) -> Option<PassClass> {
        match self {
            Instruction::Knit { .. } | Instruction::Tuck { .. } | Instruction::Kick { .. } => {
                Some(PassClass::KnitPass)
            }
            Instruction::Split { .. } => Some(PassClass::Split),
            Instruction::Xfer { .. } => Some(PassClass::Xfer),
            Instruction::Drop { .. } => Some(PassClass::Drop),
            Instruction::Miss { .. } => Some(PassClass::Miss),
            _ => None,
        }
    }

    pub fn is_needle_instruction(&self) -> bool {
        self.pass_class().is_some()
    }

    /// True for instructions whose carriage pass has a direction (knit-pass, split,
    /// miss); xfer and drop passes are undirected.
    pub fn is_directed(&self) -> bool {
        matches!(
            self.pass_class(),
            Some(PassClass::KnitPass) | Some(PassClass::Split) | Some(PassClass::Miss)
        )
    }

    pub fn needle(&self) -> Option<Needle> {
        match self {
            Instruction::Knit { needle, .. }
            | Instruction::Tuck { needle, .. }
            | Instruction::Miss { needle, .. }
            | Instruction::Kick { needle, .. }
            | Instruction::Split { needle, .. }
            | Instruction::Xfer { needle, .. }
            | Instruction::Drop { needle, .. } => Some(*needle),
            _ => None,
        }
    }

    pub fn needle_2(&self) -> Option<Needle> {
        match self {
            Instruction::Split { needle_2, .. } | Instruction::Xfer { needle_2, .. } => {
                Some(*needle_2)
            }
            _ => None,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            Instruction::Knit { direction, .. }
            | Instruction::Tuck { direction, .. }
            | Instruction::Miss { direction, .. }
            | Instruction::Kick { direction, .. }
            | Instruction::Split { direction, .. } => Some(*direction),
            _ => None,
        }
    }

    pub fn set_direction(&mut self, new_direction: Direction) {
        match self {
            Instruction::Knit { direction, .. }
            | Instruction::Tuck { direction, .. }
            | Instruction::Miss { direction, .. }
            | Instruction::Kick { direction, .. }
            | Instruction::Split { direction, .. } => *direction = new_direction,
            _ => {}
        }
    }

    pub fn carrier_set(&self) -> Option<&CarrierSet> {
        match self {
            Instruction::Knit { carriers, .. }
            | Instruction::Tuck { carriers, .. }
            | Instruction::Miss { carriers, .. }
            | Instruction::Kick { carriers, .. }
            | Instruction::Split { carriers, .. } => Some(carriers),
            _ => None,
        }
    }

    /// Two needle instructions are compatible in the same carriage pass iff they share
    /// a pass class: Knit/Tuck/Kick are mutually compatible with each other, every
    /// other kind is only compatible with its own kind.
    pub fn compatible_in_carriage_pass(&self, other: &Instruction) -> bool {
        match (self.pass_class(), other.pass_class()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Builds a fresh clone for program transformations: the new instruction has a new
    /// creation id and carries neither line numbers nor source name, per the deep-copy
    /// reset design note.
    pub fn fresh_clone(&self) -> Instruction {
        let mut clone = self.clone();
        let id = next_instruction_id();
        let meta = clone.meta_mut();
        meta.id = id;
        meta.original_line_number = None;
        meta.current_line_number = None;
        meta.source_name = None;
        clone
    }

    /// Returns a copy of this instruction with every needle slot shifted by `delta`.
    /// Non-needle instructions are returned unchanged (besides the fresh-clone reset).
    pub fn shifted(&self, delta: i64) -> Instruction {
        let mut clone = self.fresh_clone();
        if delta == 0 {
            return clone;
        }
        match &mut clone {
            Instruction::Knit { needle, .. }
            | Instruction::Tuck { needle, .. }
            | Instruction::Miss { needle, .. }
            | Instruction::Kick { needle, .. }
            | Instruction::Drop { needle, .. } => {
                needle.slot += delta;
            }
            Instruction::Split {
                needle, needle_2, ..
            }
            | Instruction::Xfer {
                needle, needle_2, ..
            } => {
                needle.slot += delta;
                needle_2.slot += delta;
            }
            _ => {}
        }
        clone
    }
}

fn fmt_needle_instr(
    f: &mut fmt::Formatter,
    keyword: &str,
    dir: Option<Direction>,
    needle: Needle,
    needle_2: Option<Needle>,
    carriers: Option<&CarrierSet>,
    meta: &InstructionMeta,
) -> fmt::Result {
    write!(f, "{}", keyword)?;
    if let Some(d) = dir {
        write!(f, " {}", d)?;
    }
    write!(f, " {}", needle)?;
    if let Some(n2) = needle_2 {
        write!(f, " {}", n2)?;
    }
    if let Some(cs) = carriers {
        write!(f, " {}", cs)?;
    }
    write!(f, "{}", meta.comment_suffix())
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::Version { meta, version } => {
                write!(f, ";!knitout-{}{}", version, meta.comment_suffix())
            }
            Instruction::Machine { meta, machine } => {
                write!(f, ";;Machine: {}{}", machine, meta.comment_suffix())
            }
            Instruction::Gauge { meta, gauge } => {
                write!(f, ";;Gauge: {}{}", gauge, meta.comment_suffix())
            }
            Instruction::Position { meta, position } => {
                write!(f, ";;Position: {}{}", position, meta.comment_suffix())
            }
            Instruction::Carriers { meta, count } => {
                write!(f, ";;Carriers: {}{}", count, meta.comment_suffix())
            }
            Instruction::HeaderExtra { meta, key, value } => {
                write!(f, ";;{}: {}{}", key, value, meta.comment_suffix())
            }
            Instruction::Comment { meta, text } => write!(f, ";{}{}", text, meta.comment_suffix()),
            Instruction::NoOp { meta, wrapped, note } => match note {
                Some(n) => write!(f, ";No-Op: {} ({}){}", wrapped, n, meta.comment_suffix()),
                None => write!(f, ";No-Op: {}{}", wrapped, meta.comment_suffix()),
            },
            Instruction::Breakpoint { meta, text } => match text {
                Some(t) => write!(f, ";BreakPoint: {}{}", t, meta.comment_suffix()),
                None => write!(f, ";BreakPoint{}", meta.comment_suffix()),
            },
            Instruction::Pause { meta } => write!(f, "pause{}", meta.comment_suffix()),
            Instruction::Rack { meta, value } => {
                write!(f, "rack {}{}", value, meta.comment_suffix())
            }
            Instruction::In { meta, carrier } => write!(f, "in {}{}", carrier, meta.comment_suffix()),
            Instruction::Inhook { meta, carrier } => {
                write!(f, "inhook {}{}", carrier, meta.comment_suffix())
            }
            Instruction::Out { meta, carrier } => {
                write!(f, "out {}{}", carrier, meta.comment_suffix())
            }
            Instruction::Outhook { meta, carrier } => {
                write!(f, "outhook {}{}", carrier, meta.comment_suffix())
            }
            Instruction::Releasehook { meta, carrier } => {
                write!(f, "releasehook {}{}", carrier, meta.comment_suffix())
            }
            Instruction::Knit {
                meta,
                needle,
                direction,
                carriers,
            } => fmt_needle_instr(f, "knit", Some(*direction), *needle, None, Some(carriers), meta),
            Instruction::Tuck {
                meta,
                needle,
                direction,
                carriers,
            } => fmt_needle_instr(f, "tuck", Some(*direction), *needle, None, Some(carriers), meta),
            Instruction::Miss {
                meta,
                needle,
                direction,
                carriers,
            } => fmt_needle_instr(f, "miss", Some(*direction), *needle, None, Some(carriers), meta),
            Instruction::Kick {
                meta,
                needle,
                direction,
                carriers,
            } => fmt_needle_instr(f, "miss", Some(*direction), *needle, None, Some(carriers), meta),
            Instruction::Split {
                meta,
                needle,
                direction,
                needle_2,
                carriers,
            } => fmt_needle_instr(
                f,
                "split",
                Some(*direction),
                *needle,
                Some(*needle_2),
                Some(carriers),
                meta,
            ),
            Instruction::Xfer {
                meta,
                needle,
                needle_2,
            } => fmt_needle_instr(f, "xfer", None, *needle, Some(*needle_2), None, meta),
            Instruction::Drop { meta, needle } => {
                fmt_needle_instr(f, "drop", None, *needle, None, None, meta)
            }
        }
    }
}
