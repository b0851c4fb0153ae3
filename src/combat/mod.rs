//! Combat system module
//!
//! Implements turn-based D&D 5e encounters with:
//! - Dice rolling (e.g., "2d6+3") with seeded or scripted engines for tests
//! - A battlefield grid with terrain, obstacles and path validation
//! - Action resolution (attacks, spells, movement, utility actions, items)
//! - A per-session state machine for initiative, turns and rounds
//! - A manager that serializes access per session and persists every change

mod conditions;
mod damage;
mod dice;
mod engine;
mod grid;
mod manager;
mod resolver;
mod state;

pub use conditions::{Condition, Conditions, SHIELD_AC_BONUS};
pub use damage::{ability_modifier, proficiency_bonus, Ability, DamageType, Weapon};
pub use dice::{is_critical, is_fumble, parse_dice, DiceEngine, DiceRoll};
pub use engine::CombatEngine;
pub use grid::{Battlefield, Cell, Obstacle, PathError, Position, Terrain, FEET_PER_CELL};
pub use manager::CombatManager;
pub use state::{
    ActionResult, ActionType, CharacterSheet, CombatAction, CombatSession, CombatStatus,
    Combatant, CombatantKind, DamageInfo, InitiativeEntry, MonsterAction, MonsterSpeed,
    MonsterStatBlock, SpellDefinition, StatSource,
};

use crate::persistence::PersistenceError;
use crate::srd::ProviderError;

/// Errors surfaced by combat operations
#[derive(Debug, thiserror::Error)]
pub enum CombatError {
    /// The request is not allowed in the current state
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("reference data error: {0}")]
    Provider(#[from] ProviderError),
}
