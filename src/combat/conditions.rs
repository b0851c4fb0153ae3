//! Condition tags
//!
//! Conditions are named status tags on a combatant:
//! - Short-lived action effects (dodge, disengage, dash, helped, shield)
//!   that expire at the round boundary
//! - Lasting states (unconscious, antitoxin)
//! - Valued tags such as `hidden:<stealth>` carrying data in the tag itself
//!
//! On the wire every condition is its plain tag string.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// AC granted by the shield spell while the condition is held
pub const SHIELD_AC_BONUS: i32 = 5;

/// A status tag on a combatant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Condition {
    /// Took the Dodge action this round
    Dodge,
    /// Took the Disengage action this round
    Disengage,
    /// Took the Dash action this round
    Dash,
    /// Received the Help action this round
    Helped,
    /// +5 AC until the round ends
    Shield,
    /// A character at 0 hp
    Unconscious,
    /// Drank antitoxin
    Antitoxin,
    /// Hidden with the given stealth total
    Hidden(i32),
    /// Any tag this engine has no rules for
    Other(String),
}

impl Condition {
    /// Whether this condition is cleared when a round ends
    pub fn expires_at_round_end(&self) -> bool {
        matches!(
            self,
            Condition::Shield
                | Condition::Dodge
                | Condition::Disengage
                | Condition::Dash
                | Condition::Helped
        )
    }

    /// Tag name without any encoded value
    pub fn name(&self) -> &str {
        match self {
            Condition::Dodge => "dodge",
            Condition::Disengage => "disengage",
            Condition::Dash => "dash",
            Condition::Helped => "helped",
            Condition::Shield => "shield",
            Condition::Unconscious => "unconscious",
            Condition::Antitoxin => "antitoxin",
            Condition::Hidden(_) => "hidden",
            Condition::Other(tag) => tag,
        }
    }
}

impl FromStr for Condition {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        let condition = match tag.to_lowercase().as_str() {
            "dodge" => Condition::Dodge,
            "disengage" => Condition::Disengage,
            "dash" => Condition::Dash,
            "helped" => Condition::Helped,
            "shield" => Condition::Shield,
            "unconscious" => Condition::Unconscious,
            "antitoxin" => Condition::Antitoxin,
            lower => match lower
                .strip_prefix("hidden:")
                .and_then(|v| v.parse().ok())
            {
                Some(score) => Condition::Hidden(score),
                None => Condition::Other(tag.to_string()),
            },
        };
        Ok(condition)
    }
}

impl From<String> for Condition {
    fn from(tag: String) -> Self {
        match tag.parse() {
            Ok(condition) => condition,
            Err(never) => match never {},
        }
    }
}

impl From<Condition> for String {
    fn from(condition: Condition) -> Self {
        condition.to_string()
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Hidden(score) => write!(f, "hidden:{}", score),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Ordered condition list for one combatant.
///
/// Adding a condition that is already held is a no-op; a new `hidden`
/// roll replaces the previous one in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition, returning false if it was already held
    pub fn add(&mut self, condition: Condition) -> bool {
        if let Condition::Hidden(_) = condition {
            if let Some(existing) = self
                .0
                .iter_mut()
                .find(|c| matches!(c, Condition::Hidden(_)))
            {
                *existing = condition;
                return true;
            }
        } else if self.has(&condition) {
            return false;
        }

        self.0.push(condition);
        true
    }

    /// Remove a condition, returning whether it was present
    pub fn remove(&mut self, condition: &Condition) -> bool {
        let before = self.0.len();
        self.0.retain(|c| c != condition);
        self.0.len() != before
    }

    pub fn has(&self, condition: &Condition) -> bool {
        self.0.contains(condition)
    }

    /// Stealth total of the current hide, if any
    pub fn hidden_score(&self) -> Option<i32> {
        self.0.iter().find_map(|c| match c {
            Condition::Hidden(score) => Some(*score),
            _ => None,
        })
    }

    /// Drop every round-limited condition and return what was removed
    pub fn expire_end_of_round(&mut self) -> Vec<Condition> {
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.0)
            .into_iter()
            .partition(Condition::expires_at_round_end);
        self.0 = kept;
        expired
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Condition> for Conditions {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        let mut conditions = Conditions::new();
        for condition in iter {
            conditions.add(condition);
        }
        conditions
    }
}
