//! In-memory reference catalog

use std::collections::HashMap;

use async_trait::async_trait;

use super::{MonsterDataProvider, ProviderError};
use crate::combat::{
    DamageInfo, MonsterAction, MonsterSpeed, MonsterStatBlock, SpellDefinition,
};

/// Provider backed by a fixed set of entries
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    monsters: HashMap<String, MonsterStatBlock>,
    spells: HashMap<String, SpellDefinition>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Goblin, wolf and the three resolvable spells
    pub fn with_basics() -> Self {
        Self::new()
            .with_monster(goblin())
            .with_monster(wolf())
            .with_spell(spell("cure-wounds", "Cure Wounds", 1, "Evocation", "Touch"))
            .with_spell(spell("magic-missile", "Magic Missile", 1, "Evocation", "120 feet"))
            .with_spell(spell("shield", "Shield", 1, "Abjuration", "Self"))
    }

    pub fn with_monster(mut self, block: MonsterStatBlock) -> Self {
        self.monsters.insert(block.index.clone(), block);
        self
    }

    pub fn with_spell(mut self, spell: SpellDefinition) -> Self {
        self.spells.insert(spell.index.clone(), spell);
        self
    }
}

#[async_trait]
impl MonsterDataProvider for StaticProvider {
    async fn get_monster_stat_block(
        &self,
        index: &str,
    ) -> Result<MonsterStatBlock, ProviderError> {
        self.monsters
            .get(index)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("monsters '{}'", index)))
    }

    async fn get_spell_definition(&self, index: &str) -> Result<SpellDefinition, ProviderError> {
        self.spells
            .get(index)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("spells '{}'", index)))
    }
}

fn melee(name: &str, attack_bonus: i32, count: i32, sides: i32, bonus: i32, kind: &str) -> MonsterAction {
    MonsterAction {
        name: name.to_string(),
        description: String::new(),
        attack_bonus,
        range: 5,
        damage: Some(DamageInfo {
            dice_count: count,
            dice_value: sides,
            bonus,
            damage_type: kind.to_string(),
        }),
    }
}

fn goblin() -> MonsterStatBlock {
    let mut shortbow = melee("Shortbow", 4, 1, 6, 2, "piercing");
    shortbow.range = 80;

    MonsterStatBlock {
        index: "goblin".to_string(),
        name: "Goblin".to_string(),
        size: "Small".to_string(),
        monster_type: "humanoid".to_string(),
        alignment: "neutral evil".to_string(),
        armor_class: 15,
        hit_points: 7,
        hit_dice: "2d6".to_string(),
        speed: MonsterSpeed {
            walk: 30,
            ..Default::default()
        },
        strength: 8,
        dexterity: 14,
        constitution: 10,
        intelligence: 10,
        wisdom: 8,
        charisma: 8,
        strength_mod: -1,
        dexterity_mod: 2,
        con_mod: 0,
        int_mod: 0,
        wisdom_mod: -1,
        charisma_mod: -1,
        actions: vec![melee("Scimitar", 4, 1, 6, 2, "slashing"), shortbow],
        challenge_rating: 0.25,
        xp: 50,
    }
}

fn wolf() -> MonsterStatBlock {
    MonsterStatBlock {
        index: "wolf".to_string(),
        name: "Wolf".to_string(),
        size: "Medium".to_string(),
        monster_type: "beast".to_string(),
        alignment: "unaligned".to_string(),
        armor_class: 13,
        hit_points: 11,
        hit_dice: "2d8+2".to_string(),
        speed: MonsterSpeed {
            walk: 40,
            ..Default::default()
        },
        strength: 12,
        dexterity: 15,
        constitution: 12,
        intelligence: 3,
        wisdom: 12,
        charisma: 6,
        strength_mod: 1,
        dexterity_mod: 2,
        con_mod: 1,
        int_mod: -3,
        wisdom_mod: 1,
        charisma_mod: -2,
        actions: vec![melee("Bite", 4, 2, 4, 2, "piercing")],
        challenge_rating: 0.25,
        xp: 50,
    }
}

fn spell(index: &str, name: &str, level: i32, school: &str, range: &str) -> SpellDefinition {
    SpellDefinition {
        index: index.to_string(),
        name: name.to_string(),
        level,
        school: school.to_string(),
        casting_time: "1 action".to_string(),
        range: range.to_string(),
        components: vec!["V".to_string(), "S".to_string()],
        duration: "Instantaneous".to_string(),
        ..Default::default()
    }
}
