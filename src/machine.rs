use std::collections::HashMap;

use knitout_derive::EnumFromStr;
use thiserror::Error;

use crate::carrier::{CarrierId, CarrierSet, CarrierState};
use crate::header::MachineSpec;
use crate::loopgraph::{KnitGraph, LoopArena, LoopId};
use crate::needle::{Bed, Direction, Needle};

/// A violation the machine model can raise while executing an instruction.
#[derive(Error, Clone, Debug)]
pub enum MachineError {
    #[error("carrier {0} is not active")]
    InactiveCarrier(CarrierId),
    #[error("carrier {0} is already active")]
    CarrierAlreadyActive(CarrierId),
    #[error("cannot transfer from {0} to {1} under rack {2}")]
    MisalignedTransfer(Needle, Needle, i64),
    #[error("no needle is aligned with {0} under rack {1}")]
    NoAlignedNeedle(Needle, i64),
    #[error("releasehook {0}: inserting hook does not hold this carrier")]
    UnhookedRelease(CarrierId),
    #[error("needle {0} has no loop to drop")]
    EmptyNeedle(Needle),
    #[error("needle slot {0} is out of range")]
    NeedleOutOfRange(i64),
}

/// How a given violation kind should be handled when raised during execution.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum PolicyAction {
    Raise,
    Warn,
    Ignore,
}

/// Which violation kind a `ViolationPolicy` entry governs. Mirrors the variants of
/// `MachineError` without carrying their payloads.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash, EnumFromStr)]
pub enum ViolationKind {
    InactiveCarrier,
    CarrierAlreadyActive,
    MisalignedTransfer,
    NoAlignedNeedle,
    UnhookedRelease,
    EmptyNeedle,
    NeedleOutOfRange,
}

impl MachineError {
    pub fn kind(&self) -> ViolationKind {
        match self {
            MachineError::InactiveCarrier(_) => ViolationKind::InactiveCarrier,
            MachineError::CarrierAlreadyActive(_) => ViolationKind::CarrierAlreadyActive,
            MachineError::MisalignedTransfer(..) => ViolationKind::MisalignedTransfer,
            MachineError::NoAlignedNeedle(..) => ViolationKind::NoAlignedNeedle,
            MachineError::UnhookedRelease(_) => ViolationKind::UnhookedRelease,
            MachineError::EmptyNeedle(_) => ViolationKind::EmptyNeedle,
            MachineError::NeedleOutOfRange(_) => ViolationKind::NeedleOutOfRange,
        }
    }
}

/// Per-violation-kind policy, built with `strict()` then relaxed as needed.
#[derive(Clone, Debug)]
pub struct ViolationPolicy {
    actions: HashMap<ViolationKind, PolicyAction>,
}

impl ViolationPolicy {
    /// Every violation raises by default.
    pub fn strict() -> ViolationPolicy {
        ViolationPolicy {
            actions: HashMap::new(),
        }
    }

    pub fn relax(mut self, kind: ViolationKind, action: PolicyAction) -> ViolationPolicy {
        self.actions.insert(kind, action);
        self
    }

    pub fn action_for(&self, kind: ViolationKind) -> PolicyAction {
        self.actions
            .get(&kind)
            .copied()
            .unwrap_or(PolicyAction::Raise)
    }
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        ViolationPolicy::strict()
    }
}

/// An immutable snapshot of machine state, suitable for debugger inspection.
#[derive(Clone, Debug)]
pub struct MachineSnapshot {
    pub rack: i64,
    pub all_needle: bool,
    pub carriers: Vec<CarrierState>,
    pub bed: HashMap<(Bed, i64, bool), Vec<LoopId>>,
}

/// The concrete implementation of the machine contract the engine depends on: bed
/// state, carrier table, rack, a loop arena, and a minimal knit graph.
#[derive(Clone, Debug)]
pub struct MachineModel {
    rack: i64,
    all_needle: bool,
    bed: HashMap<(Bed, i64, bool), Vec<LoopId>>,
    carriers: HashMap<CarrierId, CarrierState>,
    hooked_carrier: Option<CarrierId>,
    loops: LoopArena,
    knit_graph: KnitGraph,
    policy: ViolationPolicy,
}

impl MachineModel {
    pub fn new(spec: &MachineSpec) -> MachineModel {
        let mut carriers = HashMap::new();
        for id in 1..=spec.carrier_count {
            carriers.insert(id, CarrierState::new(id));
        }
        MachineModel {
            rack: 0,
            all_needle: false,
            bed: HashMap::new(),
            carriers,
            hooked_carrier: None,
            loops: LoopArena::new(),
            knit_graph: KnitGraph::new(),
            policy: ViolationPolicy::strict(),
        }
    }

    pub fn with_policy(mut self, policy: ViolationPolicy) -> MachineModel {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &ViolationPolicy {
        &self.policy
    }

    pub fn rack(&self) -> (i64, bool) {
        (self.rack, self.all_needle)
    }

    pub fn loops(&self) -> &LoopArena {
        &self.loops
    }

    pub fn loops_mut(&mut self) -> &mut LoopArena {
        &mut self.loops
    }

    pub fn knit_graph(&self) -> &KnitGraph {
        &self.knit_graph
    }

    pub fn knit_graph_mut(&mut self) -> &mut KnitGraph {
        &mut self.knit_graph
    }

    fn key(needle: Needle) -> (Bed, i64, bool) {
        (needle.bed, needle.slot, needle.is_slider)
    }

    fn loops_on(&self, needle: Needle) -> &[LoopId] {
        self.bed
            .get(&Self::key(needle))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn apply(&self, error: MachineError) -> Result<(), MachineError> {
        match self.policy.action_for(error.kind()) {
            PolicyAction::Raise => Err(error),
            PolicyAction::Warn => {
                log::warn!("{}", error);
                Ok(())
            }
            PolicyAction::Ignore => Ok(()),
        }
    }

    /// Sets racking. Returns true iff the stored rack or all-needle flag changed.
    pub fn rack_to(&mut self, rack: i64, all_needle: bool) -> bool {
        let changed = self.rack != rack || self.all_needle != all_needle;
        self.rack = rack;
        self.all_needle = all_needle;
        changed
    }

    /// The opposite-bed needle currently aligned under the active racking.
    pub fn get_aligned_needle(
        &self,
        needle: Needle,
        aligned_slider: bool,
    ) -> Result<Needle, MachineError> {
        let opposite = match needle.bed {
            Bed::Front => Bed::Back,
            Bed::Back => Bed::Front,
        };
        let column = needle.effective_column(self.rack);
        let slot = match opposite {
            Bed::Front => column,
            Bed::Back => column - self.rack,
        };
        Ok(Needle::new(opposite, slot, aligned_slider))
    }

    fn require_active_carriers(&self, carriers: &CarrierSet) -> Result<(), MachineError> {
        for id in carriers.ids() {
            let active = self.carriers.get(id).map(|c| c.active).unwrap_or(false);
            if !active {
                self.apply(MachineError::InactiveCarrier(*id))?;
            }
        }
        Ok(())
    }

    fn move_carriers(&mut self, carriers: &CarrierSet, needle: Needle) {
        for id in carriers.ids() {
            if let Some(c) = self.carriers.get_mut(id) {
                c.position = Some(needle);
            }
        }
    }

    pub fn bring_in(&mut self, carrier: CarrierId) -> Result<(), MachineError> {
        if let Some(c) = self.carriers.get_mut(&carrier) {
            if c.active {
                return self.apply(MachineError::CarrierAlreadyActive(carrier));
            }
            c.active = true;
        }
        Ok(())
    }

    pub fn in_hook(&mut self, carrier: CarrierId) -> Result<(), MachineError> {
        self.bring_in(carrier)?;
        if let Some(c) = self.carriers.get_mut(&carrier) {
            c.hooked = true;
        }
        self.hooked_carrier = Some(carrier);
        Ok(())
    }

    pub fn out(&mut self, carrier: CarrierId) -> Result<(), MachineError> {
        if let Some(c) = self.carriers.get_mut(&carrier) {
            c.active = false;
            c.position = None;
        }
        Ok(())
    }

    pub fn out_hook(&mut self, carrier: CarrierId) -> Result<(), MachineError> {
        self.out(carrier)
    }

    pub fn release_hook(&mut self, carrier: CarrierId) -> Result<(), MachineError> {
        if self.hooked_carrier != Some(carrier) {
            self.apply(MachineError::UnhookedRelease(carrier))?;
        }
        if let Some(c) = self.carriers.get_mut(&carrier) {
            c.hooked = false;
        }
        self.hooked_carrier = None;
        Ok(())
    }

    pub fn miss(
        &mut self,
        carriers: &CarrierSet,
        needle: Needle,
        _direction: Direction,
    ) -> Result<(), MachineError> {
        self.require_active_carriers(carriers)?;
        self.move_carriers(carriers, needle);
        Ok(())
    }

    pub fn tuck(
        &mut self,
        carriers: &CarrierSet,
        needle: Needle,
    ) -> Result<Vec<LoopId>, MachineError> {
        self.require_active_carriers(carriers)?;
        self.move_carriers(carriers, needle);
        let made = vec![self.loops.make_loop(needle)];
        let entry = self.bed.entry(Self::key(needle)).or_default();
        entry.extend(&made);
        Ok(made)
    }

    /// Knits: drops whatever loops were already on the needle, then forms a new one.
    pub fn knit(
        &mut self,
        carriers: &CarrierSet,
        needle: Needle,
    ) -> Result<(Vec<LoopId>, Vec<LoopId>), MachineError> {
        self.require_active_carriers(carriers)?;
        self.move_carriers(carriers, needle);
        let dropped = self
            .bed
            .insert(Self::key(needle), Vec::new())
            .unwrap_or_default();
        let new_loop = self.loops.make_loop(needle);
        for &under in &dropped {
            self.knit_graph.add_stitch(new_loop, under);
        }
        self.bed.get_mut(&Self::key(needle)).unwrap().push(new_loop);
        Ok((dropped, vec![new_loop]))
    }

    pub fn drop(&mut self, needle: Needle) -> Result<Vec<LoopId>, MachineError> {
        let dropped = self.bed.remove(&Self::key(needle)).unwrap_or_default();
        if dropped.is_empty() {
            self.apply(MachineError::EmptyNeedle(needle))?;
        }
        Ok(dropped)
    }

    pub fn xfer(&mut self, from: Needle, to: Needle) -> Result<Vec<LoopId>, MachineError> {
        let aligned = self.get_aligned_needle(from, to.is_slider)?;
        if aligned.bed != to.bed || aligned.slot != to.slot {
            return self.apply(MachineError::MisalignedTransfer(from, to, self.rack))
                .map(|_| Vec::new());
        }
        let moved = self.bed.remove(&Self::key(from)).unwrap_or_default();
        self.bed.entry(Self::key(to)).or_default().extend(&moved);
        Ok(moved)
    }

    pub fn split(
        &mut self,
        carriers: &CarrierSet,
        from: Needle,
        to: Needle,
    ) -> Result<(Vec<LoopId>, Vec<LoopId>), MachineError> {
        self.require_active_carriers(carriers)?;
        self.move_carriers(carriers, from);
        let aligned = self.get_aligned_needle(from, to.is_slider)?;
        if aligned.bed != to.bed || aligned.slot != to.slot {
            return self
                .apply(MachineError::MisalignedTransfer(from, to, self.rack))
                .map(|_| (Vec::new(), Vec::new()));
        }
        let moved = self.bed.remove(&Self::key(from)).unwrap_or_default();
        self.bed.entry(Self::key(to)).or_default().extend(&moved);
        let new_loop = self.loops.make_loop(from);
        self.bed.entry(Self::key(from)).or_default().push(new_loop);
        Ok((vec![new_loop], moved))
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            rack: self.rack,
            all_needle: self.all_needle,
            carriers: self.carriers.values().cloned().collect(),
            bed: self.bed.clone(),
        }
    }

    pub fn active_loops_on(&self, needle: Needle) -> &[LoopId] {
        self.loops_on(needle)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn spec() -> MachineSpec {
        MachineSpec {
            machine: None,
            gauge: None,
            position: None,
            carrier_count: 4,
        }
    }

    #[test]
    fn knit_on_inactive_carrier_is_raised_by_default() {
        let mut machine = MachineModel::new(&spec());
        let carriers = CarrierSet::single(1);
        let needle = Needle::new(Bed::Front, 0, false);
        let err = machine.knit(&carriers, needle).unwrap_err();
        assert_eq!(err.kind(), ViolationKind::InactiveCarrier);
    }

    #[test]
    fn warn_policy_lets_execution_continue() {
        let policy = ViolationPolicy::strict().relax(ViolationKind::InactiveCarrier, PolicyAction::Warn);
        let mut machine = MachineModel::new(&spec()).with_policy(policy);
        let carriers = CarrierSet::single(1);
        let needle = Needle::new(Bed::Front, 0, false);
        assert!(machine.knit(&carriers, needle).is_ok());
    }

    #[test]
    fn xfer_requires_alignment() {
        let mut machine = MachineModel::new(&spec());
        machine.bring_in(1).unwrap();
        let carriers = CarrierSet::single(1);
        let from = Needle::new(Bed::Front, 2, false);
        machine.tuck(&carriers, from).unwrap();
        let misaligned = Needle::new(Bed::Back, 9, false);
        let err = machine.xfer(from, misaligned).unwrap_err();
        assert_eq!(err.kind(), ViolationKind::MisalignedTransfer);
    }
}
