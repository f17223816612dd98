use std::sync::atomic::{AtomicU64, Ordering};

use crate::carrier::CarrierSet;
use crate::instruction::{Instruction, PassClass};
use crate::needle::{Direction, Needle};

pub type CarriagePassId = u64;

static NEXT_PASS_ID: AtomicU64 = AtomicU64::new(0);

fn next_pass_id() -> CarriagePassId {
    NEXT_PASS_ID.fetch_add(1, Ordering::Relaxed)
}

/// An incrementally-built group of compatible needle instructions that the carriage
/// can execute in one physical traversal.
#[derive(Clone, Debug)]
pub struct CarriagePass {
    id: CarriagePassId,
    class: PassClass,
    rack: i64,
    all_needle: bool,
    direction: Option<Direction>,
    carriers: Option<CarrierSet>,
    instructions: Vec<Instruction>,
}

impl CarriagePass {
    /// Starts a new pass, fixing its class, racking, all-needle flag, and — if the
    /// first instruction is directed — its direction and carrier set.
    pub fn start(first: Instruction, rack: i64, all_needle: bool) -> CarriagePass {
        let class = first
            .pass_class()
            .expect("carriage pass must start from a needle instruction");
        let direction = first.direction();
        let carriers = first.carrier_set().cloned();
        CarriagePass {
            id: next_pass_id(),
            class,
            rack,
            all_needle,
            direction,
            carriers,
            instructions: vec![first],
        }
    }

    pub fn id(&self) -> CarriagePassId {
        self.id
    }

    pub fn class(&self) -> PassClass {
        self.class
    }

    pub fn rack(&self) -> i64 {
        self.rack
    }

    pub fn all_needle(&self) -> bool {
        self.all_needle
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn is_directed(&self) -> bool {
        matches!(
            self.class,
            PassClass::KnitPass | PassClass::Split | PassClass::Miss
        )
    }

    fn last_needle(&self) -> Needle {
        self.instructions
            .last()
            .and_then(Instruction::needle)
            .expect("a started pass always has at least one instruction")
    }

    pub fn first_needle(&self) -> Needle {
        self.instructions[0]
            .needle()
            .expect("a started pass always has at least one instruction")
    }

    /// The minimum and maximum effective column (slot under racking) among the first
    /// and last instructions' needles (not a scan of the whole pass, matching the
    /// original's leftmost/rightmost definition).
    pub fn slot_extrema(&self) -> (i64, i64) {
        let first = self.first_needle().effective_column(self.rack);
        let last = self.last_needle().effective_column(self.rack);
        (first.min(last), first.max(last))
    }

    fn contains_needle(&self, needle: Needle) -> bool {
        self.instructions
            .iter()
            .any(|i| i.needle() == Some(needle))
    }

    /// True iff `candidate` can be appended to this pass under the carriage-pass
    /// compatibility rules.
    pub fn can_add(&self, candidate: &Instruction, candidate_rack: i64, candidate_all_needle: bool) -> bool {
        if candidate_rack != self.rack || candidate_all_needle != self.all_needle {
            return false;
        }
        let needle = match candidate.needle() {
            Some(n) => n,
            None => return false,
        };
        if self.contains_needle(needle) {
            return false;
        }
        if !self.instructions[0].compatible_in_carriage_pass(candidate) {
            return false;
        }
        if self.is_directed() {
            if candidate.direction() != self.direction {
                return false;
            }
            if candidate.carrier_set() != self.carriers.as_ref() {
                return false;
            }
            let last = self.last_needle();
            let same_column_opposite_bed =
                self.all_needle && last.bed != needle.bed && last.effective_column(self.rack) == needle.effective_column(self.rack);
            if !same_column_opposite_bed {
                let direction = self
                    .direction
                    .expect("directed pass class always carries a direction");
                if !direction.is_ordered(last.effective_column(self.rack), needle.effective_column(self.rack)) {
                    return false;
                }
            }
        }
        true
    }

    /// Appends `candidate` without re-checking `can_add`; callers must have already
    /// verified eligibility.
    pub fn add(&mut self, candidate: Instruction) {
        self.instructions.push(candidate);
    }

    /// True iff `other`'s instructions could all have been added to `self` in order,
    /// making the two passes mergeable.
    pub fn mergeable_with(&self, other: &CarriagePass) -> bool {
        let mut probe = self.clone();
        for instr in &other.instructions {
            if !probe.can_add(instr, other.rack, other.all_needle) {
                return false;
            }
            probe.add(instr.clone());
        }
        true
    }

    pub fn merge(&mut self, other: CarriagePass) {
        for instr in other.instructions {
            self.instructions.push(instr);
        }
    }

    /// If this is a knit-pass class pass and no direction was ever set for it, a pass
    /// stays undirected; xfer-direction defaulting is handled by the executer at
    /// close time, matching the original's behavior of mutating direction outside
    /// `Carriage_Pass` itself.
    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = Some(direction);
    }

    /// Adds a kick to a knit-pass class pass sharing `carriers`, if its slot is not
    /// already occupied, then re-sorts by the pass's direction.
    pub fn add_kick(&mut self, kick: Instruction) -> bool {
        if self.class != PassClass::KnitPass {
            return false;
        }
        if kick.carrier_set() != self.carriers.as_ref() {
            return false;
        }
        let slot = match kick.needle() {
            Some(n) => n.slot,
            None => return false,
        };
        if self
            .instructions
            .iter()
            .any(|i| i.needle().map(|n| n.slot) == Some(slot))
        {
            return false;
        }
        self.instructions.push(kick);
        if let Some(direction) = self.direction {
            let rack = self.rack;
            self.instructions.sort_by_key(|i| {
                let column = i.needle().map(|n| n.effective_column(rack)).unwrap_or(0);
                match direction {
                    Direction::Rightward => column,
                    Direction::Leftward => -column,
                }
            });
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::carrier::CarrierSet;
    use crate::instruction::InstructionMeta;
    use crate::needle::Bed;

    fn knit(bed: Bed, slot: i64, dir: Direction) -> Instruction {
        Instruction::Knit {
            meta: InstructionMeta::new(),
            needle: Needle::new(bed, slot, false),
            direction: dir,
            carriers: CarrierSet::single(1),
        }
    }

    #[test]
    fn rightward_pass_rejects_out_of_order_needle() {
        let pass = CarriagePass::start(knit(Bed::Front, 1, Direction::Rightward), 0, false);
        assert!(!pass.can_add(&knit(Bed::Front, 0, Direction::Rightward), 0, false));
        assert!(pass.can_add(&knit(Bed::Front, 2, Direction::Rightward), 0, false));
    }

    #[test]
    fn all_needle_exception_allows_same_column_opposite_bed() {
        let pass = CarriagePass::start(knit(Bed::Front, 3, Direction::Rightward), 2, true);
        let candidate = knit(Bed::Back, 1, Direction::Rightward);
        assert!(pass.can_add(&candidate, 2, true));
    }

    #[test]
    fn different_racking_is_never_compatible() {
        let pass = CarriagePass::start(knit(Bed::Front, 1, Direction::Rightward), 0, false);
        assert!(!pass.can_add(&knit(Bed::Front, 2, Direction::Rightward), 1, false));
    }

    #[test]
    fn adjacent_passes_merge_when_second_would_have_joined_first() {
        let mut first = CarriagePass::start(knit(Bed::Front, 1, Direction::Rightward), 0, false);
        first.add(knit(Bed::Front, 2, Direction::Rightward));
        let second = CarriagePass::start(knit(Bed::Front, 3, Direction::Rightward), 0, false);

        assert!(first.mergeable_with(&second));
        first.merge(second);
        assert_eq!(first.instructions().len(), 3);
    }

    #[test]
    fn passes_with_incompatible_ordering_do_not_merge() {
        let first = CarriagePass::start(knit(Bed::Front, 3, Direction::Rightward), 0, false);
        let second = CarriagePass::start(knit(Bed::Front, 1, Direction::Rightward), 0, false);
        assert!(!first.mergeable_with(&second));
    }

    #[test]
    fn kick_fills_an_unoccupied_slot_and_resorts_by_direction() {
        let mut pass = CarriagePass::start(knit(Bed::Front, 1, Direction::Rightward), 0, false);
        pass.add(knit(Bed::Front, 3, Direction::Rightward));
        let kick = Instruction::Kick {
            meta: InstructionMeta::new(),
            needle: Needle::new(Bed::Front, 2, false),
            direction: Direction::Rightward,
            carriers: CarrierSet::single(1),
        };

        assert!(pass.add_kick(kick));
        let slots: Vec<i64> = pass.instructions().iter().filter_map(|i| i.needle().map(|n| n.slot)).collect();
        assert_eq!(slots, vec![1, 2, 3]);
    }

    #[test]
    fn kick_rejects_an_occupied_slot() {
        let mut pass = CarriagePass::start(knit(Bed::Front, 1, Direction::Rightward), 0, false);
        let kick = Instruction::Kick {
            meta: InstructionMeta::new(),
            needle: Needle::new(Bed::Front, 1, false),
            direction: Direction::Rightward,
            carriers: CarrierSet::single(1),
        };
        assert!(!pass.add_kick(kick));
    }
}
