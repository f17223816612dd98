//! Parser for knitout, the line-oriented instruction language the [knitout] crate
//! executes.
//!
//! Parsing is implemented using [pest], following the same grammar-driven approach the
//! sibling-domain `vasm` assembler uses for its own line-oriented language: a `.pest`
//! grammar file drives a derived [`KnitoutParser`], and this module walks the resulting
//! parse tree into [`knitout::instruction::Instruction`] values.
//!
//! [pest]: https://docs.rs/pest/
//! [knitout]: ../knitout/index.html

use std::path::Path;

use num::rational::Ratio;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;
use thiserror::Error;

use knitout::carrier::{CarrierId, CarrierSet};
use knitout::instruction::{Instruction, InstructionMeta};
use knitout::needle::{Bed, Direction, Needle};
use knitout::program::Program;

#[derive(PestParser)]
#[grammar = "knitout.pest"]
struct KnitoutParser;

/// A failure to turn a line of knitout source into an instruction. Fatal to the whole
/// parse; callers do not retry.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("syntax error on line {line}: {text:?}")]
    Syntax {
        line: usize,
        text: String,
        #[source]
        cause: Box<pest::error::Error<Rule>>,
    },
    #[error("line {line} matched the grammar but produced no instruction: {text:?}")]
    IncompleteLine { line: usize, text: String },
}

/// Parses a whole knitout source text into a [`Program`], one instruction per
/// non-blank line. A blank line (matches whitespace-only) contributes nothing.
pub fn parse(input: &str) -> Result<Program, ParseError> {
    let mut program = Program::new();
    for (index, raw) in input.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        let instruction = parse_line(index, raw)?;
        program.append(instruction);
    }
    Ok(program)
}

/// Reads `path` and parses it as knitout source.
pub fn parse_path<P: AsRef<Path>>(path: P) -> std::io::Result<Result<Program, ParseError>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse(&text))
}

/// Parses a single non-blank knitout line, tagged with its zero-based source line
/// index for error reporting.
pub fn parse_line(line_index: usize, raw: &str) -> Result<Instruction, ParseError> {
    let mut pairs = KnitoutParser::parse(Rule::line, raw).map_err(|cause| ParseError::Syntax {
        line: line_index,
        text: raw.to_string(),
        cause: Box::new(cause),
    })?;
    let line_pair = pairs.next().expect("line rule always produces one pair");
    let inner = line_pair
        .into_inner()
        .find(|p| p.as_rule() != Rule::EOI)
        .ok_or_else(|| ParseError::IncompleteLine {
            line: line_index,
            text: raw.to_string(),
        })?;
    build_instruction(line_index, raw, inner)
}

fn build_instruction(
    line_index: usize,
    raw: &str,
    pair: Pair<Rule>,
) -> Result<Instruction, ParseError> {
    let meta = InstructionMeta::new();
    match pair.as_rule() {
        Rule::magic => {
            let int_pair = pair.into_inner().next().unwrap();
            let version = parse_u32(int_pair, line_index, raw)?;
            Ok(Instruction::Version { meta, version })
        }
        Rule::header => build_header(meta, pair),
        Rule::code_line => build_code_line(meta, line_index, raw, pair),
        Rule::no_op_comment => build_no_op(meta, line_index, pair),
        Rule::breakpoint_comment => build_breakpoint(meta, pair),
        Rule::plain_comment => {
            let text = pair
                .into_inner()
                .next()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default();
            Ok(Instruction::Comment { meta, text })
        }
        _ => Err(ParseError::IncompleteLine {
            line: line_index,
            text: raw.to_string(),
        }),
    }
}

fn build_header(meta: InstructionMeta, pair: Pair<Rule>) -> Result<Instruction, ParseError> {
    let mut inner = pair.into_inner();
    let key = inner.next().unwrap().as_str().to_string();
    let value = inner.next().map(|p| p.as_str().to_string()).unwrap_or_default();
    Ok(match key.to_lowercase().as_str() {
        "machine" => Instruction::Machine { meta, machine: value },
        "gauge" => match value.parse::<u32>() {
            Ok(gauge) => Instruction::Gauge { meta, gauge },
            Err(_) => Instruction::HeaderExtra { meta, key, value },
        },
        "position" => Instruction::Position { meta, position: value },
        "carriers" => match parse_carrier_count(&value) {
            Some(count) => Instruction::Carriers { meta, count },
            None => Instruction::HeaderExtra { meta, key, value },
        },
        _ => Instruction::HeaderExtra { meta, key, value },
    })
}

/// `;;Carriers` may give either a plain carrier count or a set of carrier ids (e.g.
/// `1 2 3 4`); in the latter case the header's stored count is the highest id.
fn parse_carrier_count(value: &str) -> Option<u32> {
    let mut max = None;
    for token in value.split_whitespace() {
        let id: u32 = token.parse().ok()?;
        max = Some(max.map_or(id, |m: u32| m.max(id)));
    }
    max
}

fn build_no_op(
    meta: InstructionMeta,
    line_index: usize,
    pair: Pair<Rule>,
) -> Result<Instruction, ParseError> {
    let text = pair
        .into_inner()
        .next()
        .map(|p| p.as_str().trim().to_string())
        .unwrap_or_default();
    let wrapped = parse_standalone_code(line_index, &text)?;
    Ok(Instruction::NoOp {
        meta,
        wrapped: Box::new(wrapped),
        note: None,
    })
}

/// Parses `text` (the part of a `;No-Op: ...` comment after the prefix) as a
/// standalone code line, for reconstructing the wrapped instruction.
fn parse_standalone_code(line_index: usize, text: &str) -> Result<Instruction, ParseError> {
    let mut pairs =
        KnitoutParser::parse(Rule::standalone_code, text).map_err(|cause| ParseError::Syntax {
            line: line_index,
            text: text.to_string(),
            cause: Box::new(cause),
        })?;
    let standalone = pairs.next().expect("standalone_code always produces one pair");
    let code_line = standalone
        .into_inner()
        .find(|p| p.as_rule() == Rule::code_line)
        .ok_or_else(|| ParseError::IncompleteLine {
            line: line_index,
            text: text.to_string(),
        })?;
    build_code_line(InstructionMeta::new(), line_index, text, code_line)
}

fn build_breakpoint(meta: InstructionMeta, pair: Pair<Rule>) -> Result<Instruction, ParseError> {
    let text = pair.into_inner().next().map(|p| p.as_str().trim().to_string());
    Ok(Instruction::Breakpoint { meta, text })
}

fn build_code_line(
    mut meta: InstructionMeta,
    line_index: usize,
    raw: &str,
    pair: Pair<Rule>,
) -> Result<Instruction, ParseError> {
    let mut inner = pair.into_inner();
    let code = inner.next().expect("code_line always contains a code pair");
    if let Some(comment_pair) = inner.next() {
        meta.set_comment(Some(comment_pair.as_str().to_string()));
    }
    let op = code.into_inner().next().expect("code always contains one op");
    build_op(meta, line_index, raw, op)
}

fn build_op(
    meta: InstructionMeta,
    line_index: usize,
    raw: &str,
    op: Pair<Rule>,
) -> Result<Instruction, ParseError> {
    match op.as_rule() {
        Rule::in_op => {
            let carrier = parse_carrier_id(only_inner(op), line_index, raw)?;
            Ok(Instruction::In { meta, carrier })
        }
        Rule::inhook_op => {
            let carrier = parse_carrier_id(only_inner(op), line_index, raw)?;
            Ok(Instruction::Inhook { meta, carrier })
        }
        Rule::releasehook_op => {
            let carrier = parse_carrier_id(only_inner(op), line_index, raw)?;
            Ok(Instruction::Releasehook { meta, carrier })
        }
        Rule::outhook_op => {
            let carrier = parse_carrier_id(only_inner(op), line_index, raw)?;
            Ok(Instruction::Outhook { meta, carrier })
        }
        Rule::out_op => {
            let carrier = parse_carrier_id(only_inner(op), line_index, raw)?;
            Ok(Instruction::Out { meta, carrier })
        }
        Rule::rack_op => {
            let float_pair = only_inner(op);
            let value = parse_rack_value(&float_pair, line_index, raw)?;
            Ok(Instruction::Rack { meta, value })
        }
        Rule::knit_op => {
            let (direction, needle, carriers) = directed_needle(op, line_index, raw)?;
            Ok(Instruction::Knit { meta, needle, direction, carriers })
        }
        Rule::tuck_op => {
            let (direction, needle, carriers) = directed_needle(op, line_index, raw)?;
            Ok(Instruction::Tuck { meta, needle, direction, carriers })
        }
        Rule::miss_op => {
            let (direction, needle, carriers) = directed_needle(op, line_index, raw)?;
            Ok(Instruction::Miss { meta, needle, direction, carriers })
        }
        Rule::split_op => {
            let mut inner = op.into_inner();
            let direction = parse_direction(inner.next().unwrap());
            let needle = parse_needle(inner.next().unwrap());
            let needle_2 = parse_needle(inner.next().unwrap());
            let carriers = parse_carrier_set(inner.next().unwrap(), line_index, raw)?;
            Ok(Instruction::Split { meta, needle, direction, needle_2, carriers })
        }
        Rule::xfer_op => {
            let mut inner = op.into_inner();
            let needle = parse_needle(inner.next().unwrap());
            let needle_2 = parse_needle(inner.next().unwrap());
            Ok(Instruction::Xfer { meta, needle, needle_2 })
        }
        Rule::drop_op => {
            let needle = parse_needle(only_inner(op));
            Ok(Instruction::Drop { meta, needle })
        }
        Rule::pause_op => Ok(Instruction::Pause { meta }),
        _ => Err(ParseError::IncompleteLine {
            line: line_index,
            text: raw.to_string(),
        }),
    }
}

fn only_inner(pair: Pair<Rule>) -> Pair<Rule> {
    pair.into_inner().next().expect("op carries exactly one operand group")
}

fn directed_needle(
    op: Pair<Rule>,
    line_index: usize,
    raw: &str,
) -> Result<(Direction, Needle, CarrierSet), ParseError> {
    let mut inner = op.into_inner();
    let direction = parse_direction(inner.next().unwrap());
    let needle = parse_needle(inner.next().unwrap());
    let carriers = parse_carrier_set(inner.next().unwrap(), line_index, raw)?;
    Ok((direction, needle, carriers))
}

fn parse_direction(pair: Pair<Rule>) -> Direction {
    match pair.as_str() {
        "+" => Direction::Rightward,
        "-" => Direction::Leftward,
        other => unreachable!("grammar only admits +/- for direction, got {:?}", other),
    }
}

fn parse_needle(pair: Pair<Rule>) -> Needle {
    let text = pair.as_str();
    let bytes = text.as_bytes();
    let bed = match bytes[0] {
        b'f' | b'F' => Bed::Front,
        b'b' | b'B' => Bed::Back,
        other => unreachable!("grammar only admits f/b for bed, got {:?}", other as char),
    };
    let mut index = 1;
    let is_slider = index < bytes.len() && (bytes[index] == b's' || bytes[index] == b'S');
    if is_slider {
        index += 1;
    }
    let slot: i64 = text[index..]
        .parse()
        .expect("grammar guarantees a trailing integer after bed/slider markers");
    Needle::new(bed, slot, is_slider)
}

fn parse_carrier_set(
    pair: Pair<Rule>,
    line_index: usize,
    raw: &str,
) -> Result<CarrierSet, ParseError> {
    let mut ids = Vec::new();
    for id_pair in pair.into_inner() {
        ids.push(parse_carrier_id(id_pair, line_index, raw)?);
    }
    Ok(CarrierSet::new(ids))
}

fn parse_carrier_id(
    pair: Pair<Rule>,
    line_index: usize,
    raw: &str,
) -> Result<CarrierId, ParseError> {
    parse_u32(pair, line_index, raw)
}

fn parse_u32(pair: Pair<Rule>, line_index: usize, raw: &str) -> Result<u32, ParseError> {
    pair.as_str()
        .parse::<u32>()
        .map_err(|_| ParseError::IncompleteLine {
            line: line_index,
            text: raw.to_string(),
        })
}

/// Decomposes a `FLOAT` token into an exact `Ratio<i64>`, since `rack -4.75` must not
/// suffer float rounding drift before it reaches `knitout::needle::decompose_rack`.
fn parse_rack_value(
    pair: &Pair<Rule>,
    line_index: usize,
    raw: &str,
) -> Result<Ratio<i64>, ParseError> {
    let text = pair.as_str();
    let negative = text.starts_with('-');
    let unsigned = text.trim_start_matches('-');
    let mut parts = unsigned.splitn(2, '.');
    let whole_str = parts.next().unwrap_or("0");
    let frac_str = parts.next();

    let whole: i64 = whole_str.parse().map_err(|_| ParseError::IncompleteLine {
        line: line_index,
        text: raw.to_string(),
    })?;

    let mut value = Ratio::from_integer(whole);
    if let Some(frac_str) = frac_str {
        if !frac_str.is_empty() {
            let numerator: i64 = frac_str.parse().map_err(|_| ParseError::IncompleteLine {
                line: line_index,
                text: raw.to_string(),
            })?;
            let denominator = 10i64.pow(frac_str.len() as u32);
            value += Ratio::new(numerator, denominator);
        }
    }
    if negative {
        value = -value;
    }
    Ok(value)
}

#[cfg(test)]
mod test {
    use super::*;
    use knitout::needle::decompose_rack;

    #[test]
    fn parses_carrier_lifecycle_lines() {
        assert!(matches!(
            parse_line(0, "inhook 1").unwrap(),
            Instruction::Inhook { carrier: 1, .. }
        ));
        assert!(matches!(
            parse_line(0, "releasehook 1").unwrap(),
            Instruction::Releasehook { carrier: 1, .. }
        ));
        assert!(matches!(
            parse_line(0, "outhook 3").unwrap(),
            Instruction::Outhook { carrier: 3, .. }
        ));
    }

    #[test]
    fn parses_knit_with_direction_needle_and_carriers() {
        let instr = parse_line(0, "knit - f3 1 2").unwrap();
        match instr {
            Instruction::Knit {
                needle,
                direction,
                carriers,
                ..
            } => {
                assert_eq!(direction, Direction::Leftward);
                assert_eq!(needle, Needle::new(Bed::Front, 3, false));
                assert_eq!(carriers.ids(), &[1, 2]);
            }
            other => panic!("expected Knit, got {:?}", other),
        }
    }

    #[test]
    fn parses_slider_needle() {
        let instr = parse_line(0, "xfer fs2 b2").unwrap();
        match instr {
            Instruction::Xfer { needle, needle_2, .. } => {
                assert_eq!(needle, Needle::new(Bed::Front, 2, true));
                assert_eq!(needle_2, Needle::new(Bed::Back, 2, false));
            }
            other => panic!("expected Xfer, got {:?}", other),
        }
    }

    #[test]
    fn rack_value_matches_decompose_rack_contract() {
        let instr = parse_line(0, "rack -0.75").unwrap();
        match instr {
            Instruction::Rack { value, .. } => {
                assert_eq!(decompose_rack(value), (-1, true));
            }
            other => panic!("expected Rack, got {:?}", other),
        }
    }

    #[test]
    fn decodes_no_op_comment() {
        let instr = parse_line(0, ";No-Op: knit + f1 1").unwrap();
        match instr {
            Instruction::NoOp { wrapped, .. } => {
                assert!(matches!(*wrapped, Instruction::Knit { .. }));
            }
            other => panic!("expected NoOp, got {:?}", other),
        }
    }

    #[test]
    fn decodes_breakpoint_with_and_without_text() {
        assert!(matches!(
            parse_line(0, ";BreakPoint").unwrap(),
            Instruction::Breakpoint { text: None, .. }
        ));
        let labeled = parse_line(0, ";BreakPoint: before cast-on").unwrap();
        match labeled {
            Instruction::Breakpoint { text: Some(t), .. } => assert_eq!(t, "before cast-on"),
            other => panic!("expected labeled Breakpoint, got {:?}", other),
        }
    }

    #[test]
    fn decodes_header_lines_and_magic() {
        assert!(matches!(
            parse_line(0, ";!knitout-2").unwrap(),
            Instruction::Version { version: 2, .. }
        ));
        assert!(matches!(
            parse_line(0, ";;Machine: SWG091N2").unwrap(),
            Instruction::Machine { .. }
        ));
        assert!(matches!(
            parse_line(0, ";;Gauge: 5").unwrap(),
            Instruction::Gauge { gauge: 5, .. }
        ));
        assert!(matches!(
            parse_line(0, ";;Yarn-1: wool").unwrap(),
            Instruction::HeaderExtra { .. }
        ));
    }

    #[test]
    fn blank_lines_are_skipped_and_numbers_count_instructions() {
        let program = parse("\ninhook 1\n\nknit + f1 1\n").unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program.get(0).unwrap().meta().original_line_number(), Some(0));
        assert_eq!(program.get(1).unwrap().meta().original_line_number(), Some(1));
    }

    #[test]
    fn syntax_error_reports_line_and_text() {
        let err = parse_line(4, "florb").unwrap_err();
        match err {
            ParseError::Syntax { line, text, .. } => {
                assert_eq!(line, 4);
                assert_eq!(text, "florb");
            }
            other => panic!("expected Syntax error, got {:?}", other),
        }
    }
}
