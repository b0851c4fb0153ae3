//! Dice rolling system
//!
//! Two flavours of dice notation live here:
//! - [`DiceRoll`]: a strict `NdS±M` parser used for weapon and stat-block damage dice
//! - [`DiceEngine::roll_expression`]: lenient `NdS+B` sums where malformed
//!   terms contribute nothing instead of failing
//!
//! Every [`DiceEngine`] owns its random source. Engines are never shared
//! between sessions; callers serialize access through the owning session.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::LazyLock;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

static HIT_DICE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)d(\d+)(?:\+(\d+))?").unwrap());

/// Hit points used when a stat block's hit dice cannot be parsed
pub const DEFAULT_HIT_POINTS: i32 = 10;

/// A parsed dice roll specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceRoll {
    /// Number of dice to roll
    pub count: u32,
    /// Number of sides per die
    pub sides: u32,
    /// Modifier to add/subtract
    pub modifier: i32,
}

impl DiceRoll {
    /// Create a new dice roll
    pub fn new(count: u32, sides: u32, modifier: i32) -> Self {
        Self {
            count,
            sides,
            modifier,
        }
    }

    /// Roll only the dice part (no modifier) with the given engine
    pub fn roll_dice(&self, dice: &mut DiceEngine) -> i32 {
        dice.roll(self.count as i32, self.sides as i32)
    }

    /// Roll dice plus modifier with the given engine
    pub fn roll(&self, dice: &mut DiceEngine) -> i32 {
        self.roll_dice(dice) + self.modifier
    }
}

impl FromStr for DiceRoll {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_dice(s)
    }
}

impl std::fmt::Display for DiceRoll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.modifier > 0 {
            write!(f, "{}d{}+{}", self.count, self.sides, self.modifier)
        } else if self.modifier < 0 {
            write!(f, "{}d{}{}", self.count, self.sides, self.modifier)
        } else {
            write!(f, "{}d{}", self.count, self.sides)
        }
    }
}

/// Parse a dice notation string like "2d6+3"
pub fn parse_dice(notation: &str) -> Result<DiceRoll, String> {
    let notation = notation.trim().to_lowercase();

    let d_pos = notation.find('d').ok_or("Missing 'd' in dice notation")?;

    let count_str = &notation[..d_pos];
    let count: u32 = if count_str.is_empty() {
        1 // "d6" means "1d6"
    } else {
        count_str
            .parse()
            .map_err(|_| format!("Invalid dice count: {}", count_str))?
    };

    if count == 0 {
        return Err("Dice count must be at least 1".to_string());
    }

    let rest = &notation[d_pos + 1..];

    let (sides_str, modifier) = if let Some(plus_pos) = rest.find('+') {
        let sides = &rest[..plus_pos];
        let mod_str = &rest[plus_pos + 1..];
        let modifier: i32 = mod_str
            .parse()
            .map_err(|_| format!("Invalid modifier: {}", mod_str))?;
        (sides, modifier)
    } else if let Some(minus_pos) = rest.rfind('-') {
        if minus_pos == 0 {
            (rest, 0)
        } else {
            let sides = &rest[..minus_pos];
            let mod_str = &rest[minus_pos..]; // includes the minus sign
            let modifier: i32 = mod_str
                .parse()
                .map_err(|_| format!("Invalid modifier: {}", mod_str))?;
            (sides, modifier)
        }
    } else {
        (rest, 0)
    };

    let sides: u32 = sides_str
        .parse()
        .map_err(|_| format!("Invalid die sides: {}", sides_str))?;

    if sides == 0 {
        return Err("Die sides must be at least 1".to_string());
    }

    Ok(DiceRoll {
        count,
        sides,
        modifier,
    })
}

/// One term of a lenient dice expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    /// `NdS`
    Dice { count: i32, sides: i32 },
    /// Literal integer
    Flat(i32),
}

/// Split a `+`-separated expression into terms, dropping malformed ones.
///
/// A term containing `d` is a dice term: a missing or unparseable count
/// defaults to 1, an unparseable sides value (or more than one `d`) drops
/// the term. Anything else must parse as an integer or it is dropped.
pub fn parse_expression(formula: &str) -> Vec<Term> {
    let formula = formula.trim();
    if formula.is_empty() {
        return Vec::new();
    }

    let mut terms = Vec::new();
    for part in formula.split('+') {
        let part = part.trim();

        if part.contains('d') {
            let pieces: Vec<&str> = part.split('d').collect();
            if pieces.len() != 2 {
                continue;
            }
            let count = pieces[0].parse().unwrap_or(1);
            let Ok(sides) = pieces[1].parse() else {
                continue;
            };
            terms.push(Term::Dice { count, sides });
        } else if let Ok(bonus) = part.parse() {
            terms.push(Term::Flat(bonus));
        }
    }
    terms
}

enum DieSource {
    Random(StdRng),
    /// Pre-determined faces, consumed one per die; exhausted sources roll 1s
    Scripted(VecDeque<i32>),
}

/// Random number source for one combat session
pub struct DiceEngine {
    source: DieSource,
}

impl std::fmt::Debug for DiceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.source {
            DieSource::Random(_) => "random",
            DieSource::Scripted(_) => "scripted",
        };
        f.debug_struct("DiceEngine").field("source", &kind).finish()
    }
}

impl Default for DiceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiceEngine {
    /// Create an engine seeded from the operating system
    pub fn new() -> Self {
        Self {
            source: DieSource::Random(StdRng::from_os_rng()),
        }
    }

    /// Create a reproducible engine from a fixed seed
    pub fn seeded(seed: u64) -> Self {
        Self {
            source: DieSource::Random(StdRng::seed_from_u64(seed)),
        }
    }

    /// Create an engine that returns the given die faces in order.
    ///
    /// Faces are clamped into `[1, sides]` of the die being rolled.
    pub fn scripted(faces: impl IntoIterator<Item = i32>) -> Self {
        Self {
            source: DieSource::Scripted(faces.into_iter().collect()),
        }
    }

    fn draw(&mut self, sides: i32) -> i32 {
        match &mut self.source {
            DieSource::Random(rng) => rng.random_range(1..=sides),
            DieSource::Scripted(faces) => faces.pop_front().unwrap_or(1).clamp(1, sides),
        }
    }

    /// Sum `count` independent draws from `[1, sides]`; 0 for non-positive input
    pub fn roll(&mut self, count: i32, sides: i32) -> i32 {
        if count <= 0 || sides <= 0 {
            return 0;
        }
        (0..count).map(|_| self.draw(sides)).sum()
    }

    /// Roll a single d20
    pub fn roll_d20(&mut self) -> i32 {
        self.roll(1, 20)
    }

    /// Roll two d20 and keep the higher
    pub fn roll_with_advantage(&mut self) -> i32 {
        let first = self.roll_d20();
        let second = self.roll_d20();
        first.max(second)
    }

    /// Roll two d20 and keep the lower
    pub fn roll_with_disadvantage(&mut self) -> i32 {
        let first = self.roll_d20();
        let second = self.roll_d20();
        first.min(second)
    }

    /// Evaluate a lenient `NdS+B` expression; malformed terms count as 0
    pub fn roll_expression(&mut self, formula: &str) -> i32 {
        parse_expression(formula)
            .into_iter()
            .map(|term| match term {
                Term::Dice { count, sides } => self.roll(count, sides),
                Term::Flat(bonus) => bonus,
            })
            .sum()
    }

    /// Roll hit points from a stat-block hit dice string such as "3d8+4"
    pub fn roll_hit_points(&mut self, hit_dice: &str) -> i32 {
        let Some(caps) = HIT_DICE_REGEX.captures(hit_dice) else {
            return DEFAULT_HIT_POINTS;
        };

        let count = caps[1].parse().unwrap_or(0);
        let sides = caps[2].parse().unwrap_or(0);
        let bonus = caps
            .get(3)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);

        self.roll(count, sides) + bonus
    }
}

/// Check if a d20 roll is a natural 20 (critical hit)
pub fn is_critical(roll: i32) -> bool {
    roll == 20
}

/// Check if a d20 roll is a natural 1 (critical miss)
pub fn is_fumble(roll: i32) -> bool {
    roll == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let roll = parse_dice("2d6").unwrap();
        assert_eq!(roll.count, 2);
        assert_eq!(roll.sides, 6);
        assert_eq!(roll.modifier, 0);
    }

    #[test]
    fn test_parse_with_modifiers() {
        assert_eq!(parse_dice("1d20+5").unwrap(), DiceRoll::new(1, 20, 5));
        assert_eq!(parse_dice("3d8-2").unwrap(), DiceRoll::new(3, 8, -2));
        assert_eq!(parse_dice("  2D10+3  ").unwrap(), DiceRoll::new(2, 10, 3));
        assert_eq!(parse_dice("d6").unwrap(), DiceRoll::new(1, 6, 0));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_dice("abc").is_err());
        assert!(parse_dice("2d").is_err());
        assert!(parse_dice("0d6").is_err());
        assert!(parse_dice("2d0").is_err());
    }

    #[test]
    fn test_roll_uses_engine_faces() {
        let roll = DiceRoll::new(2, 6, 3);
        let mut dice = DiceEngine::scripted([4, 5, 6, 1]);
        assert_eq!(roll.roll(&mut dice), 12);
        // Crit dice skip the modifier
        assert_eq!(roll.roll_dice(&mut dice), 7);

        assert_eq!(roll.to_string(), "2d6+3");
        assert_eq!(DiceRoll::new(3, 8, -2).to_string(), "3d8-2");
    }

    #[test]
    fn test_roll_bounds() {
        let mut dice = DiceEngine::seeded(7);
        for _ in 0..200 {
            let result = dice.roll(2, 6);
            assert!((2..=12).contains(&result), "roll {} out of range", result);
        }
    }

    #[test]
    fn test_roll_non_positive_is_zero() {
        let mut dice = DiceEngine::seeded(1);
        assert_eq!(dice.roll(0, 6), 0);
        assert_eq!(dice.roll(3, 0), 0);
        assert_eq!(dice.roll(-1, 20), 0);
    }

    #[test]
    fn test_seeded_engines_agree() {
        let mut a = DiceEngine::seeded(42);
        let mut b = DiceEngine::seeded(42);
        let left: Vec<i32> = (0..20).map(|_| a.roll_d20()).collect();
        let right: Vec<i32> = (0..20).map(|_| b.roll_d20()).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn test_scripted_faces() {
        let mut dice = DiceEngine::scripted([20, 3, 99]);
        assert_eq!(dice.roll_d20(), 20);
        assert_eq!(dice.roll(1, 8), 3);
        // Clamped to the die size
        assert_eq!(dice.roll(1, 6), 6);
        // Exhausted
        assert_eq!(dice.roll(1, 6), 1);
    }

    #[test]
    fn test_advantage_disadvantage() {
        let mut dice = DiceEngine::scripted([4, 17, 4, 17]);
        assert_eq!(dice.roll_with_advantage(), 17);
        assert_eq!(dice.roll_with_disadvantage(), 4);
    }

    #[test]
    fn test_parse_expression_lenient() {
        assert_eq!(
            parse_expression("2d6+3"),
            vec![Term::Dice { count: 2, sides: 6 }, Term::Flat(3)]
        );
        assert_eq!(
            parse_expression(" d8 + 1 "),
            vec![Term::Dice { count: 1, sides: 8 }, Term::Flat(1)]
        );
        // Malformed terms are dropped rather than rejected
        assert_eq!(parse_expression("2dx+abc+4"), vec![Term::Flat(4)]);
        assert_eq!(parse_expression("1d6d6"), Vec::<Term>::new());
        assert!(parse_expression("   ").is_empty());
    }

    #[test]
    fn test_roll_expression() {
        let mut dice = DiceEngine::scripted([5, 2]);
        assert_eq!(dice.roll_expression("2d6+3"), 10);

        let mut dice = DiceEngine::scripted([]);
        assert_eq!(dice.roll_expression("garbage"), 0);
        assert_eq!(dice.roll_expression("7"), 7);
    }

    #[test]
    fn test_roll_hit_points() {
        let mut dice = DiceEngine::scripted([3, 5, 6]);
        assert_eq!(dice.roll_hit_points("3d8+4"), 18);

        let mut dice = DiceEngine::scripted([6, 6]);
        assert_eq!(dice.roll_hit_points("2d6"), 12);

        let mut dice = DiceEngine::seeded(3);
        assert_eq!(dice.roll_hit_points("n/a"), DEFAULT_HIT_POINTS);
    }

    #[test]
    fn test_critical_fumble() {
        assert!(is_critical(20));
        assert!(!is_critical(19));
        assert!(is_fumble(1));
        assert!(!is_fumble(2));
    }
}
