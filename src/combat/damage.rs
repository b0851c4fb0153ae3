//! Damage types, weapons and ability math
//!
//! Provides:
//! - The SRD damage types (slashing, fire, force, etc.)
//! - Ability scores and the `(score - 10) / 2` modifier
//! - The proficiency-by-level table
//! - The character weapon catalog (damage die, ability, reach)

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::dice::DiceRoll;
use super::grid::FEET_PER_CELL;

/// Reach of any melee weapon, in feet
pub const MELEE_RANGE: i32 = FEET_PER_CELL;

/// Normal range of the bows, in feet
pub const BOW_RANGE: i32 = 80;

/// Types of damage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageType {
    Acid,
    Bludgeoning,
    Cold,
    Fire,
    Force,
    Lightning,
    Necrotic,
    Piercing,
    Poison,
    Psychic,
    Radiant,
    Slashing,
    Thunder,
}

impl DamageType {
    /// Get all damage types
    pub fn all() -> &'static [DamageType] {
        &[
            DamageType::Acid,
            DamageType::Bludgeoning,
            DamageType::Cold,
            DamageType::Fire,
            DamageType::Force,
            DamageType::Lightning,
            DamageType::Necrotic,
            DamageType::Piercing,
            DamageType::Poison,
            DamageType::Psychic,
            DamageType::Radiant,
            DamageType::Slashing,
            DamageType::Thunder,
        ]
    }
}

impl FromStr for DamageType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "acid" => Ok(DamageType::Acid),
            "bludgeoning" => Ok(DamageType::Bludgeoning),
            "cold" => Ok(DamageType::Cold),
            "fire" => Ok(DamageType::Fire),
            "force" => Ok(DamageType::Force),
            "lightning" => Ok(DamageType::Lightning),
            "necrotic" => Ok(DamageType::Necrotic),
            "piercing" => Ok(DamageType::Piercing),
            "poison" => Ok(DamageType::Poison),
            "psychic" => Ok(DamageType::Psychic),
            "radiant" => Ok(DamageType::Radiant),
            "slashing" => Ok(DamageType::Slashing),
            "thunder" => Ok(DamageType::Thunder),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for DamageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DamageType::Acid => "acid",
            DamageType::Bludgeoning => "bludgeoning",
            DamageType::Cold => "cold",
            DamageType::Fire => "fire",
            DamageType::Force => "force",
            DamageType::Lightning => "lightning",
            DamageType::Necrotic => "necrotic",
            DamageType::Piercing => "piercing",
            DamageType::Poison => "poison",
            DamageType::Psychic => "psychic",
            DamageType::Radiant => "radiant",
            DamageType::Slashing => "slashing",
            DamageType::Thunder => "thunder",
        };
        write!(f, "{}", s)
    }
}

/// The six ability scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

/// Modifier for an ability score.
///
/// Integer division truncates toward zero, so a score of 9 gives 0.
pub fn ability_modifier(score: i32) -> i32 {
    (score - 10) / 2
}

/// Proficiency bonus by character level
pub fn proficiency_bonus(level: i32) -> i32 {
    match level {
        l if l >= 17 => 6,
        l if l >= 13 => 5,
        l if l >= 9 => 4,
        l if l >= 5 => 3,
        _ => 2,
    }
}

/// A character weapon from the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weapon {
    /// Damage dice, without the ability modifier
    pub damage: DiceRoll,
    pub damage_type: DamageType,
    /// Ability used for both attack and damage
    pub ability: Ability,
    /// Reach or normal range in feet
    pub range: i32,
}

impl Weapon {
    /// Look up a weapon by name; unknown names are improvised bludgeons
    pub fn lookup(name: &str) -> Weapon {
        match name.trim().to_lowercase().as_str() {
            "longsword" => Weapon {
                damage: DiceRoll::new(1, 8, 0),
                damage_type: DamageType::Slashing,
                ability: Ability::Strength,
                range: MELEE_RANGE,
            },
            "longbow" => Weapon {
                damage: DiceRoll::new(1, 8, 0),
                damage_type: DamageType::Piercing,
                ability: Ability::Dexterity,
                range: BOW_RANGE,
            },
            "shortbow" => Weapon {
                damage: DiceRoll::new(1, 6, 0),
                damage_type: DamageType::Piercing,
                ability: Ability::Dexterity,
                range: BOW_RANGE,
            },
            "dagger" => Weapon {
                damage: DiceRoll::new(1, 4, 0),
                damage_type: DamageType::Piercing,
                ability: Ability::Strength,
                range: MELEE_RANGE,
            },
            _ => Weapon {
                damage: DiceRoll::new(1, 6, 0),
                damage_type: DamageType::Bludgeoning,
                ability: Ability::Strength,
                range: MELEE_RANGE,
            },
        }
    }

    pub fn is_ranged(&self) -> bool {
        self.range > MELEE_RANGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_damage_type_parsing() {
        assert_eq!("fire".parse::<DamageType>(), Ok(DamageType::Fire));
        assert_eq!("FORCE".parse::<DamageType>(), Ok(DamageType::Force));
        assert!("holy".parse::<DamageType>().is_err());

        for dtype in DamageType::all() {
            assert_eq!(dtype.to_string().parse::<DamageType>(), Ok(*dtype));
        }
    }

    #[test]
    fn test_damage_type_serde() {
        let json = serde_json::to_string(&DamageType::Slashing).unwrap();
        assert_eq!(json, r#""slashing""#);
    }

    #[test]
    fn test_ability_modifier() {
        assert_eq!(ability_modifier(10), 0);
        assert_eq!(ability_modifier(16), 3);
        assert_eq!(ability_modifier(9), 0);
        assert_eq!(ability_modifier(7), -1);
        assert_eq!(ability_modifier(20), 5);
    }

    #[test]
    fn test_proficiency_table() {
        assert_eq!(proficiency_bonus(1), 2);
        assert_eq!(proficiency_bonus(4), 2);
        assert_eq!(proficiency_bonus(5), 3);
        assert_eq!(proficiency_bonus(9), 4);
        assert_eq!(proficiency_bonus(13), 5);
        assert_eq!(proficiency_bonus(17), 6);
        assert_eq!(proficiency_bonus(20), 6);
    }

    #[test]
    fn test_weapon_catalog() {
        let longsword = Weapon::lookup("longsword");
        assert_eq!(longsword.damage, DiceRoll::new(1, 8, 0));
        assert_eq!(longsword.damage_type, DamageType::Slashing);
        assert_eq!(longsword.ability, Ability::Strength);
        assert!(!longsword.is_ranged());

        let longbow = Weapon::lookup("Longbow");
        assert_eq!(longbow.ability, Ability::Dexterity);
        assert_eq!(longbow.range, 80);
        assert!(longbow.is_ranged());

        assert_eq!(Weapon::lookup("shortbow").range, 80);
        assert_eq!(Weapon::lookup("dagger").damage, DiceRoll::new(1, 4, 0));

        let club = Weapon::lookup("chair leg");
        assert_eq!(club.damage, DiceRoll::new(1, 6, 0));
        assert_eq!(club.damage_type, DamageType::Bludgeoning);
        assert_eq!(club.range, MELEE_RANGE);
    }
}
