use std::fmt;

use knitout_derive::EnumFromStr;

use crate::instruction::{HeaderKind, Instruction, InstructionMeta};
use crate::program::Program;

/// Closed set of machine type presets the original knitout corpus emits, with an
/// escape hatch for names this crate does not special-case.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum MachineType {
    SWGN2,
    SWG091N2,
    Other(String),
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MachineType::SWGN2 => write!(f, "SWG_N2"),
            MachineType::SWG091N2 => write!(f, "SWG091N2"),
            MachineType::Other(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for MachineType {
    fn from(s: &str) -> Self {
        match s {
            "SWG_N2" => MachineType::SWGN2,
            "SWG091N2" => MachineType::SWG091N2,
            other => MachineType::Other(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, EnumFromStr)]
pub enum Position {
    Left,
    Center,
    Right,
    Keep,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Position::Left => write!(f, "Left"),
            Position::Center => write!(f, "Center"),
            Position::Right => write!(f, "Right"),
            Position::Keep => write!(f, "Keep"),
        }
    }
}

/// The machine specification a `Header` projects to, used to construct a `MachineModel`.
#[derive(Clone, Debug)]
pub struct MachineSpec {
    pub machine: Option<MachineType>,
    pub gauge: Option<u32>,
    pub position: Option<Position>,
    pub carrier_count: u32,
}

impl Default for MachineSpec {
    fn default() -> Self {
        MachineSpec {
            machine: None,
            gauge: None,
            position: None,
            carrier_count: 10,
        }
    }
}

/// One entry per header kind: version, machine, gauge, position, carrier count, plus
/// any unrecognized `;;Key: value` lines (e.g. `Yarn-N`) preserved verbatim.
#[derive(Clone, Debug, Default)]
pub struct Header {
    pub version: Option<u32>,
    pub machine: Option<MachineType>,
    pub gauge: Option<u32>,
    pub position: Option<Position>,
    pub carrier_count: Option<u32>,
    extra: Vec<(String, String)>,
}

impl Header {
    pub fn new() -> Header {
        Header::default()
    }

    pub fn extra(&self) -> &[(String, String)] {
        &self.extra
    }

    pub fn set_extra(&mut self, key: String, value: String) {
        if let Some(entry) = self.extra.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.extra.push((key, value));
        }
    }

    /// Iterates `program`'s header-kind lines in order, replacing this header's entry
    /// for a kind whenever the incoming value differs. Returns whether anything changed.
    pub fn extract_from(&mut self, program: &Program) -> bool {
        let mut changed = false;
        for instruction in program.headers() {
            match instruction {
                Instruction::Version { version, .. } => {
                    if self.version != Some(*version) {
                        self.version = Some(*version);
                        changed = true;
                    }
                }
                Instruction::Machine { machine, .. } => {
                    let mt = MachineType::from(machine.as_str());
                    if self.machine.as_ref() != Some(&mt) {
                        self.machine = Some(mt);
                        changed = true;
                    }
                }
                Instruction::Gauge { gauge, .. } => {
                    if self.gauge != Some(*gauge) {
                        self.gauge = Some(*gauge);
                        changed = true;
                    }
                }
                Instruction::Position { position, .. } => {
                    if let Ok(p) = position.parse::<Position>() {
                        if self.position != Some(p) {
                            self.position = Some(p);
                            changed = true;
                        }
                    }
                }
                Instruction::Carriers { count, .. } => {
                    if self.carrier_count != Some(*count) {
                        self.carrier_count = Some(*count);
                        changed = true;
                    }
                }
                Instruction::HeaderExtra { key, value, .. } => {
                    let differs = self
                        .extra
                        .iter()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v != value)
                        .unwrap_or(true);
                    if differs {
                        self.set_extra(key.clone(), value.clone());
                        changed = true;
                    }
                }
                _ => {}
            }
        }
        changed
    }

    pub fn header_kind_is_set(&self, kind: HeaderKind) -> bool {
        match kind {
            HeaderKind::Version => self.version.is_some(),
            HeaderKind::Machine => self.machine.is_some(),
            HeaderKind::Gauge => self.gauge.is_some(),
            HeaderKind::Position => self.position.is_some(),
            HeaderKind::Carriers => self.carrier_count.is_some(),
        }
    }

    pub fn to_machine_spec(&self) -> MachineSpec {
        MachineSpec {
            machine: self.machine.clone(),
            gauge: self.gauge,
            position: self.position,
            carrier_count: self.carrier_count.unwrap_or(10),
        }
    }

    /// Re-emits this header as instructions in canonical order: Version, Machine,
    /// Gauge, Position, Carriers.
    pub fn to_instructions(&self) -> Vec<Instruction> {
        let mut out = Vec::new();
        if let Some(v) = self.version {
            out.push(Instruction::Version {
                meta: InstructionMeta::new(),
                version: v,
            });
        }
        if let Some(m) = &self.machine {
            out.push(Instruction::Machine {
                meta: InstructionMeta::new(),
                machine: m.to_string(),
            });
        }
        if let Some(g) = self.gauge {
            out.push(Instruction::Gauge {
                meta: InstructionMeta::new(),
                gauge: g,
            });
        }
        if let Some(p) = self.position {
            out.push(Instruction::Position {
                meta: InstructionMeta::new(),
                position: p.to_string(),
            });
        }
        if let Some(c) = self.carrier_count {
            out.push(Instruction::Carriers {
                meta: InstructionMeta::new(),
                count: c,
            });
        }
        for (key, value) in &self.extra {
            out.push(Instruction::HeaderExtra {
                meta: InstructionMeta::new(),
                key: key.clone(),
                value: value.clone(),
            });
        }
        out
    }
}
