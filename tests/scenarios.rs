use std::sync::mpsc;

use matches::matches;

use knitout::carrier::CarrierSet;
use knitout::debug::{ChannelDebugger, StepMode};
use knitout::header::{Header, MachineType, Position};
use knitout::instruction::{Instruction, InstructionMeta};
use knitout::needle::{Bed, Direction, Needle};
use knitout::program::Program;
use knitout::Executer;

fn knit_instr(bed: Bed, slot: i64, direction: Direction, carrier: u32) -> Instruction {
    Instruction::Knit {
        meta: InstructionMeta::new(),
        needle: Needle::new(bed, slot, false),
        direction,
        carriers: CarrierSet::single(carrier),
    }
}

fn tuck_instr(bed: Bed, slot: i64, direction: Direction, carrier: u32) -> Instruction {
    Instruction::Tuck {
        meta: InstructionMeta::new(),
        needle: Needle::new(bed, slot, false),
        direction,
        carriers: CarrierSet::single(carrier),
    }
}

fn miss_instr(bed: Bed, slot: i64, direction: Direction, carrier: u32) -> Instruction {
    Instruction::Miss {
        meta: InstructionMeta::new(),
        needle: Needle::new(bed, slot, false),
        direction,
        carriers: CarrierSet::single(carrier),
    }
}

fn in_hook(carrier: u32) -> Instruction {
    Instruction::Inhook {
        meta: InstructionMeta::new(),
        carrier,
    }
}

fn release_hook(carrier: u32) -> Instruction {
    Instruction::Releasehook {
        meta: InstructionMeta::new(),
        carrier,
    }
}

fn out_hook(carrier: u32) -> Instruction {
    Instruction::Outhook {
        meta: InstructionMeta::new(),
        carrier,
    }
}

#[test]
fn s1_single_knit_forms_one_loop() {
    let mut program = Program::new();
    program.append(in_hook(1));
    program.append(tuck_instr(Bed::Front, 1, Direction::Rightward, 1));
    program.append(release_hook(1));
    program.append(knit_instr(Bed::Front, 1, Direction::Leftward, 1));
    program.append(out_hook(1));

    let mut header = Header::new();
    header.machine = Some(MachineType::SWGN2);
    header.gauge = Some(15);
    header.position = Some(Position::Keep);
    header.carrier_count = Some(4);

    let mut executer = Executer::new(header);
    executer.run(&program).expect("program should execute");

    assert_eq!(executer.executed_program().len(), 9);
    assert!(!executer.machine().loops().is_empty());
    let loops: Vec<_> = executer.machine().loops().iter().collect();
    assert!(loops.iter().all(|l| l.source_instruction().is_some()));
}

#[test]
fn s7_pause_is_not_foldable() {
    let mut program = Program::new();
    program.append(knit_instr(Bed::Front, 1, Direction::Rightward, 1));
    program.append(Instruction::Pause {
        meta: InstructionMeta::new(),
    });
    program.append(knit_instr(Bed::Front, 2, Direction::Rightward, 1));

    let mut executer = Executer::new(Header::new());
    executer.run(&program).expect("program should execute");

    let body: Vec<_> = executer.executed_program().body().collect();
    assert!(body.iter().any(|i| i.is_pause()));
}

#[test]
fn s8_rack_parsing() {
    use knitout::needle::decompose_rack;
    use num::rational::Ratio;

    assert_eq!(decompose_rack(Ratio::new(1, 4)), (0, true));
    assert_eq!(decompose_rack(Ratio::new(-3, 4)), (-1, true));
    assert_eq!(decompose_rack(Ratio::new(-19, 4)), (-5, true));
    assert_eq!(decompose_rack(Ratio::from_integer(1)), (1, false));
}

#[test]
fn shift_needle_positions_round_trips() {
    let mut program = Program::new();
    program.append(knit_instr(Bed::Front, 1, Direction::Rightward, 1));
    program.append(miss_instr(Bed::Back, 3, Direction::Leftward, 2));

    let shifted = program.shift_needle_positions(5);
    let back = shifted.shift_needle_positions(-5);

    let original_slots: Vec<i64> = program.lines().iter().filter_map(|i| i.needle()).map(|n| n.slot).collect();
    let back_slots: Vec<i64> = back.lines().iter().filter_map(|i| i.needle()).map(|n| n.slot).collect();
    assert_eq!(original_slots, back_slots);
}

#[test]
fn s2_multi_miss_breaks_into_four_passes() {
    let mut program = Program::new();
    program.append(in_hook(1));
    // Three knit passes, alternating direction so none can merge with the last.
    program.append(knit_instr(Bed::Front, 1, Direction::Rightward, 1));
    program.append(knit_instr(Bed::Front, 2, Direction::Leftward, 1));
    program.append(knit_instr(Bed::Front, 3, Direction::Rightward, 1));
    // A miss is a different pass class entirely, so it cannot join the third pass
    // regardless of direction and must start its own fourth pass.
    program.append(miss_instr(Bed::Front, 4, Direction::Rightward, 1));

    let mut executer = Executer::new(Header::new());
    executer.run(&program).expect("program should execute");

    assert_eq!(executer.passes().len(), 4);
    let fourth = &executer.passes()[3];
    assert!(matches!(fourth.instructions()[0], Instruction::Miss { .. }));
}

#[test]
fn s3_tube_keeps_front_and_back_loops_independent() {
    let mut program = Program::new();
    program.append(in_hook(1));
    program.append(tuck_instr(Bed::Front, 1, Direction::Rightward, 1));
    program.append(tuck_instr(Bed::Front, 2, Direction::Rightward, 1));
    program.append(tuck_instr(Bed::Back, 2, Direction::Leftward, 1));
    program.append(tuck_instr(Bed::Back, 1, Direction::Leftward, 1));
    program.append(release_hook(1));
    program.append(knit_instr(Bed::Front, 1, Direction::Rightward, 1));
    program.append(knit_instr(Bed::Front, 2, Direction::Rightward, 1));
    program.append(knit_instr(Bed::Back, 2, Direction::Leftward, 1));
    program.append(knit_instr(Bed::Back, 1, Direction::Leftward, 1));

    let mut executer = Executer::new(Header::new());
    executer.run(&program).expect("program should execute");

    let front_loops = executer
        .machine()
        .active_loops_on(Needle::new(Bed::Front, 1, false))
        .len()
        + executer
            .machine()
            .active_loops_on(Needle::new(Bed::Front, 2, false))
            .len();
    let back_loops = executer
        .machine()
        .active_loops_on(Needle::new(Bed::Back, 1, false))
        .len()
        + executer
            .machine()
            .active_loops_on(Needle::new(Bed::Back, 2, false))
            .len();
    assert_eq!(front_loops, 2);
    assert_eq!(back_loops, 2);
}

#[test]
fn s4_rib_alternates_beds_within_one_course() {
    let mut program = Program::new();
    program.append(in_hook(1));
    program.append(tuck_instr(Bed::Front, 1, Direction::Rightward, 1));
    program.append(tuck_instr(Bed::Back, 2, Direction::Rightward, 1));
    program.append(tuck_instr(Bed::Front, 3, Direction::Rightward, 1));
    program.append(release_hook(1));
    program.append(knit_instr(Bed::Front, 1, Direction::Rightward, 1));
    program.append(knit_instr(Bed::Back, 2, Direction::Rightward, 1));

    let mut executer = Executer::new(Header::new());
    executer.run(&program).expect("program should execute");

    assert_eq!(
        executer
            .machine()
            .active_loops_on(Needle::new(Bed::Front, 1, false))
            .len(),
        1
    );
    assert_eq!(
        executer
            .machine()
            .active_loops_on(Needle::new(Bed::Back, 2, false))
            .len(),
        1
    );
    assert_eq!(
        executer
            .machine()
            .active_loops_on(Needle::new(Bed::Front, 3, false))
            .len(),
        1
    );
}

#[test]
fn s5_split_pocket_forms_both_bed_loops() {
    let mut program = Program::new();
    program.append(in_hook(1));
    for slot in 1..=4 {
        program.append(tuck_instr(Bed::Front, slot, Direction::Rightward, 1));
    }
    program.append(release_hook(1));
    for slot in 1..=4 {
        program.append(Instruction::Split {
            meta: InstructionMeta::new(),
            needle: Needle::new(Bed::Front, slot, false),
            direction: Direction::Rightward,
            needle_2: Needle::new(Bed::Back, slot, false),
            carriers: CarrierSet::single(1),
        });
    }

    let mut executer = Executer::new(Header::new());
    executer.run(&program).expect("program should execute");

    let front_loops: usize = (1..=4)
        .map(|slot| {
            executer
                .machine()
                .active_loops_on(Needle::new(Bed::Front, slot, false))
                .len()
        })
        .sum();
    let back_loops: usize = (1..=4)
        .map(|slot| {
            executer
                .machine()
                .active_loops_on(Needle::new(Bed::Back, slot, false))
                .len()
        })
        .sum();
    assert_eq!(front_loops, 4);
    assert_eq!(back_loops, 4);
    assert_eq!(executer.machine().knit_graph().course_count(), 2);
}

#[test]
fn s6_all_needle_pass_is_not_shortened() {
    let mut program = Program::new();
    program.append(in_hook(1));
    // A quarter-fraction rack selects all-needle knitting (decompose_rack(9/4) = (2, true)).
    program.append(Instruction::Rack {
        meta: InstructionMeta::new(),
        value: num::rational::Ratio::new(9, 4),
    });
    program.append(tuck_instr(Bed::Front, 5, Direction::Rightward, 1));
    // Back slot 3 sits in the same effective column as front slot 5 under rack 2, so
    // the all-needle exception lets it join even though bed order would otherwise fail.
    program.append(tuck_instr(Bed::Back, 3, Direction::Rightward, 1));
    program.append(tuck_instr(Bed::Front, 7, Direction::Rightward, 1));

    let mut executer = Executer::new(Header::new());
    executer.run(&program).expect("program should execute");

    let all_needle_pass = executer
        .passes()
        .iter()
        .find(|p| p.all_needle())
        .expect("an all-needle pass should have been assembled");
    assert!(all_needle_pass.instructions().len() > 2);
}

#[test]
fn s9_breakpoint_records_one_snapshot_at_its_own_line() {
    let (_resume_tx, resume_rx) = mpsc::channel();
    let (event_tx, _event_rx) = mpsc::channel();
    let debugger = ChannelDebugger::new(StepMode::Continue, resume_rx, event_tx);

    let mut program = Program::new();
    program.append(Instruction::Breakpoint {
        meta: InstructionMeta::new(),
        text: None,
    });
    program.append(in_hook(1));
    program.append(tuck_instr(Bed::Front, 1, Direction::Rightward, 1));

    let breakpoint_line = program.get(0).unwrap().meta().original_line_number().unwrap();

    let mut executer = Executer::new(Header::new()).with_debugger(Box::new(debugger));
    executer.enable_snapshot(breakpoint_line);
    executer.run(&program).expect("program should execute");

    assert_eq!(executer.snapshots().len(), 1);
    assert!(executer.snapshots().contains_key(&breakpoint_line));
}

#[test]
fn organize_preserves_instruction_order() {
    let mut program = Program::new();
    program.append(Instruction::Comment {
        meta: InstructionMeta::new(),
        text: "cast on".to_string(),
    });
    program.append(knit_instr(Bed::Front, 1, Direction::Rightward, 1));
    program.append(knit_instr(Bed::Front, 2, Direction::Rightward, 1));

    let organized = program.organize(true, true, false, false);
    let body: Vec<String> = organized.body().map(|i| i.to_string()).collect();
    assert_eq!(body.len(), 2);
    assert!(body[0].contains("f1"));
    assert!(body[1].contains("f2"));
}
