use std::fmt;

use num::rational::Ratio;

/// One of the two needle beds of a V-bed machine.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Bed {
    Front,
    Back,
}

impl fmt::Display for Bed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Bed::Front => write!(f, "f"),
            Bed::Back => write!(f, "b"),
        }
    }
}

/// The direction a carriage pass travels across the bed.
///
/// # Examples
/// ```
/// use knitout::needle::Direction;
///
/// assert_eq!(Direction::Rightward.to_string(), "+");
/// assert_eq!(Direction::Leftward.to_string(), "-");
/// ```
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Direction {
    Leftward,
    Rightward,
}

impl Direction {
    /// True if `from` to `to` moves strictly in this direction's sense.
    pub fn is_ordered(&self, from: i64, to: i64) -> bool {
        match self {
            Direction::Rightward => to > from,
            Direction::Leftward => to < from,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Rightward => write!(f, "+"),
            Direction::Leftward => write!(f, "-"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = knitout_util::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Direction::Rightward),
            "-" => Ok(Direction::Leftward),
            _ => Err(knitout_util::ParseEnumError {
                value: s.to_string(),
                enum_name: "Direction",
            }),
        }
    }
}

/// A single addressable needle: a bed, a slot, and whether it is the slider variant.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct Needle {
    pub bed: Bed,
    pub slot: i64,
    pub is_slider: bool,
}

impl Needle {
    pub fn new(bed: Bed, slot: i64, is_slider: bool) -> Needle {
        Needle {
            bed,
            slot,
            is_slider,
        }
    }

    /// The column this needle occupies under the given racking: front needles keep
    /// their slot, back needles shift by the rack value.
    ///
    /// # Examples
    /// ```
    /// use knitout::needle::{Bed, Needle};
    ///
    /// let front = Needle::new(Bed::Front, 3, false);
    /// let back = Needle::new(Bed::Back, 3, false);
    /// assert_eq!(front.effective_column(0), 3);
    /// assert_eq!(back.effective_column(2), 5);
    /// ```
    pub fn effective_column(&self, rack: i64) -> i64 {
        match self.bed {
            Bed::Front => self.slot,
            Bed::Back => self.slot + rack,
        }
    }
}

impl fmt::Display for Needle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_slider {
            write!(f, "{}s{}", self.bed, self.slot)
        } else {
            write!(f, "{}{}", self.bed, self.slot)
        }
    }
}

/// Decomposes a parsed rack value into its stored integer rack and all-needle flag.
///
/// `all_needle` is true iff the fractional part of `value` is exactly one quarter,
/// one half, or three quarters. The integer rack is `floor(value + 1/2)` for
/// non-negative inputs and `floor(value)` for negative inputs with a non-zero
/// fractional part (see the rack-rounding design note).
///
/// # Examples
/// ```
/// use knitout::needle::decompose_rack;
/// use num::rational::Ratio;
///
/// assert_eq!(decompose_rack(Ratio::new(1, 4)), (0, true));
/// assert_eq!(decompose_rack(Ratio::new(-3, 4)), (-1, true));
/// assert_eq!(decompose_rack(Ratio::new(-19, 4)), (-5, true));
/// assert_eq!(decompose_rack(Ratio::from_integer(1)), (1, false));
/// ```
pub fn decompose_rack(value: Ratio<i64>) -> (i64, bool) {
    let floor = value.floor();
    let frac = value - floor;
    let quarter = Ratio::new(1, 4);
    let half = Ratio::new(1, 2);
    let three_quarters = Ratio::new(3, 4);
    let all_needle = frac == quarter || frac == half || frac == three_quarters;

    let rack = if value >= Ratio::from_integer(0) {
        (value + Ratio::new(1, 2)).floor()
    } else {
        value.floor()
    };
    (rack.to_integer(), all_needle)
}
