//! Action resolution
//!
//! One function per action type. Each validates before touching the
//! session, so an `Err` always leaves the session as it was. Callers that
//! need all-or-nothing semantics across several mutations resolve against
//! a draft copy and commit only on success.

use tracing::debug;

use super::conditions::Condition;
use super::damage::{proficiency_bonus, Ability, DamageType, Weapon, MELEE_RANGE};
use super::dice::{is_critical, is_fumble, DiceEngine, DiceRoll};
use super::grid::{Position, FEET_PER_CELL};
use super::state::{ActionResult, ActionType, CombatAction, CombatSession, Combatant, StatSource};
use super::CombatError;

/// Casting modifier assumed for monsters that cast healing spells
const MONSTER_CASTING_MODIFIER: i32 = 3;

/// Resolve one action against the session
pub fn resolve(
    session: &mut CombatSession,
    action: &CombatAction,
    dice: &mut DiceEngine,
) -> Result<ActionResult, CombatError> {
    let actor = session
        .combatant(&action.actor_id)
        .cloned()
        .ok_or_else(|| CombatError::Validation(format!("actor {} not found in combat", action.actor_id)))?;

    debug!(
        combat = %session.id,
        actor = %actor.id,
        action = %action.action_type,
        "Resolving action"
    );

    match &action.action_type {
        ActionType::Attack => attack(session, action, &actor, dice),
        ActionType::CastSpell => cast_spell(session, action, &actor, dice),
        ActionType::Move => movement(session, action, &actor),
        ActionType::Dodge => self_condition(
            session,
            &actor,
            Condition::Dodge,
            "takes the Dodge action, giving attackers disadvantage until the round ends",
        ),
        ActionType::Disengage => self_condition(
            session,
            &actor,
            Condition::Disengage,
            "takes the Disengage action, avoiding opportunity attacks until the round ends",
        ),
        ActionType::Dash => self_condition(
            session,
            &actor,
            Condition::Dash,
            "takes the Dash action, doubling their movement until the round ends",
        ),
        ActionType::Help => help(session, action, &actor),
        ActionType::Hide => hide(session, &actor, dice),
        ActionType::UseItem => use_item(session, action, &actor, dice),
        ActionType::Unknown(name) => Err(CombatError::Validation(format!(
            "unknown action type: {}",
            name
        ))),
    }
}

/// How a single attack rolls
struct AttackProfile {
    bonus: i32,
    damage: DiceRoll,
    damage_type: Option<DamageType>,
    range: i32,
}

fn attack_profile(actor: &Combatant, weapon_name: &str) -> Result<AttackProfile, CombatError> {
    match &actor.stats {
        StatSource::Character(sheet) => {
            let weapon = Weapon::lookup(weapon_name);
            let ability_mod = sheet.modifier(weapon.ability);
            Ok(AttackProfile {
                bonus: ability_mod + proficiency_bonus(sheet.level),
                damage: DiceRoll {
                    modifier: ability_mod,
                    ..weapon.damage
                },
                damage_type: Some(weapon.damage_type),
                range: weapon.range,
            })
        }
        StatSource::Monster(block) => {
            let action = block.action(weapon_name).ok_or_else(|| {
                CombatError::Validation(format!(
                    "{} has no action named '{}'",
                    actor.name, weapon_name
                ))
            })?;
            let damage = action.damage.clone().unwrap_or_default();
            Ok(AttackProfile {
                bonus: action.attack_bonus,
                damage: DiceRoll::new(
                    damage.dice_count.max(0) as u32,
                    damage.dice_value.max(0) as u32,
                    damage.bonus,
                ),
                damage_type: damage.damage_type.parse().ok(),
                range: if action.range > 0 {
                    action.range
                } else {
                    MELEE_RANGE
                },
            })
        }
    }
}

fn require_target<'a>(
    session: &'a CombatSession,
    action: &CombatAction,
    what: &str,
) -> Result<&'a Combatant, CombatError> {
    let target_id = action
        .primary_target()
        .ok_or_else(|| CombatError::Validation(format!("{} requires a target", what)))?;
    let target = session
        .combatant(target_id)
        .ok_or_else(|| CombatError::Validation(format!("target {} not found in combat", target_id)))?;
    if target.position.is_off_grid() {
        return Err(CombatError::Validation(format!(
            "{} is no longer on the battlefield",
            target.name
        )));
    }
    Ok(target)
}

fn combatant_mut<'a>(
    session: &'a mut CombatSession,
    id: &str,
) -> Result<&'a mut Combatant, CombatError> {
    session
        .combatant_mut(id)
        .ok_or_else(|| CombatError::Validation(format!("combatant {} not found in combat", id)))
}

/// Subtract damage and apply defeat handling at 0 hp.
///
/// Returns the effect tags produced and whether the target went down.
fn deal_damage(target: &mut Combatant, amount: i32) -> (Vec<String>, bool) {
    target.take_damage(amount);
    if target.hp > 0 {
        return (Vec::new(), false);
    }

    let mut effects = Vec::new();
    if target.is_character() {
        if target.conditions.add(Condition::Unconscious) {
            effects.push(format!("+{}", Condition::Unconscious));
        }
    } else {
        target.position = Position::OFF_GRID;
    }
    (effects, true)
}

/// Restore hp, waking the target if it was at exactly 0
fn restore_hp(target: &mut Combatant, amount: i32) -> Vec<String> {
    let was_down = target.hp == 0;
    target.heal(amount);

    let mut effects = Vec::new();
    if was_down && target.hp > 0 && target.conditions.remove(&Condition::Unconscious) {
        effects.push(format!("-{}", Condition::Unconscious));
    }
    effects
}

fn defeat_phrase(target: &Combatant) -> String {
    if target.is_character() {
        format!("{} falls unconscious!", target.name)
    } else {
        format!("{} is defeated!", target.name)
    }
}

fn attack(
    session: &mut CombatSession,
    action: &CombatAction,
    actor: &Combatant,
    dice: &mut DiceEngine,
) -> Result<ActionResult, CombatError> {
    let weapon_name = action
        .weapon_name
        .as_deref()
        .filter(|w| !w.is_empty());
    let target = require_target(session, action, "attack")?.clone();
    let weapon_name =
        weapon_name.ok_or_else(|| CombatError::Validation("attack requires a weapon".to_string()))?;

    let profile = attack_profile(actor, weapon_name)?;
    let distance = session.battlefield.distance(actor.position, target.position) * FEET_PER_CELL;
    if distance > profile.range {
        return Err(CombatError::Validation(format!(
            "target is out of range (distance: {} ft, range: {} ft)",
            distance, profile.range
        )));
    }

    let roll = dice.roll_d20();
    let total = roll + profile.bonus;

    if is_fumble(roll) {
        return Ok(ActionResult {
            roll: Some(roll),
            ..ActionResult::failed(format!(
                "{} critically misses their attack with {} against {}!",
                actor.name, weapon_name, target.name
            ))
        });
    }

    let critical = is_critical(roll);
    if !critical && total < target.ac {
        return Ok(ActionResult {
            roll: Some(roll),
            ..ActionResult::failed(format!(
                "{} attacks {} with {} but misses! (Rolled {} + {} = {} vs AC {})",
                actor.name, target.name, weapon_name, roll, profile.bonus, total, target.ac
            ))
        });
    }

    let mut damage = profile.damage.roll(dice);
    if critical {
        damage += profile.damage.roll_dice(dice);
    }
    let damage = damage.max(0);

    let target = combatant_mut(session, &target.id)?;
    let (effects, downed) = deal_damage(target, damage);

    let verb = if critical { "critically hits" } else { "hits" };
    let damage_label = profile
        .damage_type
        .map(|t| format!(" {}", t))
        .unwrap_or_default();
    let tail = if downed {
        defeat_phrase(target)
    } else {
        format!("(HP: {}/{})", target.hp, target.max_hp)
    };

    Ok(ActionResult {
        damage: Some(damage),
        damage_type: profile.damage_type,
        effects,
        roll: Some(roll),
        critical,
        ..ActionResult::succeeded(format!(
            "{} {} {} with {} for {}{} damage! {}",
            actor.name, verb, target.name, weapon_name, damage, damage_label, tail
        ))
    })
}

fn cast_spell(
    session: &mut CombatSession,
    action: &CombatAction,
    actor: &Combatant,
    dice: &mut DiceEngine,
) -> Result<ActionResult, CombatError> {
    let spell_id = action
        .spell_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CombatError::Validation("spell casting requires a spell".to_string()))?;

    if let StatSource::Character(sheet) = &actor.stats {
        if !sheet.knows_spell(spell_id) {
            return Err(CombatError::Validation(format!(
                "{} doesn't know the spell '{}'",
                actor.name, spell_id
            )));
        }
    }

    match spell_id {
        "cure-wounds" => {
            let target = require_target(session, action, "cure wounds")?.id.clone();
            let casting_mod = match &actor.stats {
                StatSource::Character(sheet) => sheet.modifier(Ability::Wisdom),
                StatSource::Monster(_) => MONSTER_CASTING_MODIFIER,
            };
            let healing = DiceRoll::new(1, 8, casting_mod).roll(dice).max(0);

            let target = combatant_mut(session, &target)?;
            let effects = restore_hp(target, healing);

            Ok(ActionResult {
                healing: Some(healing),
                effects,
                ..ActionResult::succeeded(format!(
                    "{} casts Cure Wounds on {}, healing {} damage! (HP: {}/{})",
                    actor.name, target.name, healing, target.hp, target.max_hp
                ))
            })
        }
        "magic-missile" => {
            let target = require_target(session, action, "magic missile")?.id.clone();
            let damage: i32 = (0..3).map(|_| DiceRoll::new(1, 4, 1).roll(dice)).sum();

            let target = combatant_mut(session, &target)?;
            let (effects, downed) = deal_damage(target, damage);
            let tail = if downed {
                defeat_phrase(target)
            } else {
                format!("(HP: {}/{})", target.hp, target.max_hp)
            };

            Ok(ActionResult {
                damage: Some(damage),
                damage_type: Some(DamageType::Force),
                effects,
                ..ActionResult::succeeded(format!(
                    "{} casts Magic Missile at {}, dealing {} force damage! {}",
                    actor.name, target.name, damage, tail
                ))
            })
        }
        "shield" => {
            let caster = combatant_mut(session, &actor.id)?;
            if !caster.raise_shield() {
                return Ok(ActionResult::succeeded(format!(
                    "{} casts Shield, but their shield is already up",
                    actor.name
                )));
            }

            Ok(ActionResult {
                effects: vec![format!("+{}", Condition::Shield)],
                ..ActionResult::succeeded(format!(
                    "{} casts Shield, granting +5 AC until the round ends!",
                    actor.name
                ))
            })
        }
        other => Err(CombatError::Validation(format!(
            "spell '{}' is not implemented",
            other
        ))),
    }
}

fn movement(
    session: &mut CombatSession,
    action: &CombatAction,
    actor: &Combatant,
) -> Result<ActionResult, CombatError> {
    let Some(destination) = action.movement_path.last().copied() else {
        return Ok(ActionResult::failed(format!(
            "{} attempts to move but stays in place",
            actor.name
        )));
    };

    let occupied = session.occupied_positions(&actor.id);
    session
        .battlefield
        .validate_path(actor.position, &action.movement_path, actor.speed(), &occupied)
        .map_err(|e| CombatError::Validation(e.to_string()))?;

    let mover = combatant_mut(session, &actor.id)?;
    mover.position = destination;

    Ok(ActionResult::succeeded(format!(
        "{} moves from {} to {}",
        actor.name, actor.position, destination
    )))
}

fn self_condition(
    session: &mut CombatSession,
    actor: &Combatant,
    condition: Condition,
    blurb: &str,
) -> Result<ActionResult, CombatError> {
    let tag = format!("+{}", condition);
    let added = combatant_mut(session, &actor.id)?.conditions.add(condition);

    Ok(ActionResult {
        effects: if added { vec![tag] } else { Vec::new() },
        ..ActionResult::succeeded(format!("{} {}", actor.name, blurb))
    })
}

fn help(
    session: &mut CombatSession,
    action: &CombatAction,
    actor: &Combatant,
) -> Result<ActionResult, CombatError> {
    let target = require_target(session, action, "help action")?.id.clone();
    let target = combatant_mut(session, &target)?;
    let added = target.conditions.add(Condition::Helped);

    Ok(ActionResult {
        effects: if added {
            vec![format!("+{}", Condition::Helped)]
        } else {
            Vec::new()
        },
        ..ActionResult::succeeded(format!(
            "{} helps {}, giving them advantage on their next ability check or attack roll",
            actor.name, target.name
        ))
    })
}

fn hide(
    session: &mut CombatSession,
    actor: &Combatant,
    dice: &mut DiceEngine,
) -> Result<ActionResult, CombatError> {
    let roll = dice.roll_d20();
    let stealth = roll + actor.dexterity_modifier();
    let condition = Condition::Hidden(stealth);
    let tag = format!("+{}", condition);

    combatant_mut(session, &actor.id)?.conditions.add(condition);

    Ok(ActionResult {
        effects: vec![tag],
        roll: Some(roll),
        ..ActionResult::succeeded(format!(
            "{} attempts to hide, rolling a {} for Stealth",
            actor.name, stealth
        ))
    })
}

fn use_item(
    session: &mut CombatSession,
    action: &CombatAction,
    actor: &Combatant,
    dice: &mut DiceEngine,
) -> Result<ActionResult, CombatError> {
    let item = action
        .item_name()
        .ok_or_else(|| CombatError::Validation("item name not provided".to_string()))?;

    match item {
        "healing-potion" => {
            let healing = DiceRoll::new(2, 4, 2).roll(dice);
            let drinker = combatant_mut(session, &actor.id)?;
            let effects = restore_hp(drinker, healing);

            Ok(ActionResult {
                healing: Some(healing),
                effects,
                ..ActionResult::succeeded(format!(
                    "{} drinks a Healing Potion, recovering {} hit points! (HP: {}/{})",
                    actor.name, healing, drinker.hp, drinker.max_hp
                ))
            })
        }
        "antitoxin" => {
            let added = combatant_mut(session, &actor.id)?
                .conditions
                .add(Condition::Antitoxin);

            Ok(ActionResult {
                effects: if added {
                    vec![format!("+{}", Condition::Antitoxin)]
                } else {
                    Vec::new()
                },
                ..ActionResult::succeeded(format!(
                    "{} uses Antitoxin, gaining advantage on saving throws against poison",
                    actor.name
                ))
            })
        }
        other => Err(CombatError::Validation(format!(
            "item '{}' not implemented",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::conditions::Conditions;
    use crate::combat::grid::{Battlefield, Obstacle};
    use crate::combat::state::{
        CharacterSheet, CombatStatus, DamageInfo, MonsterAction, MonsterSpeed, MonsterStatBlock,
    };
    use chrono::Utc;

    fn sheet(id: &str) -> CharacterSheet {
        CharacterSheet {
            id: id.to_string(),
            user_id: "alice".to_string(),
            name: "Brienne".to_string(),
            race: "human".to_string(),
            class: "fighter".to_string(),
            level: 1,
            strength: 16,
            dexterity: 14,
            constitution: 14,
            intelligence: 10,
            wisdom: 14,
            charisma: 8,
            hit_points: 12,
            max_hit_points: 12,
            armor_class: 16,
            equipment: vec!["longsword".to_string()],
            spells: vec!["cure-wounds".to_string(), "shield".to_string()],
        }
    }

    fn goblin_block() -> MonsterStatBlock {
        MonsterStatBlock {
            index: "goblin".to_string(),
            name: "Goblin".to_string(),
            armor_class: 15,
            hit_points: 7,
            speed: MonsterSpeed {
                walk: 30,
                ..Default::default()
            },
            dexterity: 14,
            dexterity_mod: 2,
            actions: vec![
                MonsterAction {
                    name: "Scimitar".to_string(),
                    attack_bonus: 4,
                    damage: Some(DamageInfo {
                        dice_count: 1,
                        dice_value: 6,
                        bonus: 2,
                        damage_type: "slashing".to_string(),
                    }),
                    ..Default::default()
                },
                MonsterAction {
                    name: "Shortbow".to_string(),
                    attack_bonus: 4,
                    range: 80,
                    damage: Some(DamageInfo {
                        dice_count: 1,
                        dice_value: 6,
                        bonus: 2,
                        damage_type: "piercing".to_string(),
                    }),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    fn character(sheet: CharacterSheet, pos: Position) -> Combatant {
        Combatant {
            id: sheet.id.clone(),
            name: sheet.name.clone(),
            user_id: sheet.user_id.clone(),
            initiative: 0,
            hp: sheet.hit_points,
            max_hp: sheet.max_hit_points,
            ac: sheet.armor_class,
            position: pos,
            conditions: Conditions::new(),
            stats: StatSource::Character(sheet),
        }
    }

    fn goblin(id: &str, pos: Position) -> Combatant {
        let block = goblin_block();
        Combatant {
            id: id.to_string(),
            name: block.name.clone(),
            user_id: "dm".to_string(),
            initiative: 0,
            hp: 7,
            max_hp: 7,
            ac: block.armor_class,
            position: pos,
            conditions: Conditions::new(),
            stats: StatSource::Monster(block),
        }
    }

    fn session(participants: Vec<Combatant>) -> CombatSession {
        CombatSession {
            id: "combat-1".to_string(),
            dm_user_id: "dm".to_string(),
            initiative: participants.iter().map(|c| c.id.clone()).collect(),
            initiative_scores: Vec::new(),
            participants,
            current_turn_index: 0,
            round_number: 1,
            status: CombatStatus::Active,
            environment: "plains".to_string(),
            battlefield: Battlefield::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn duel() -> CombatSession {
        session(vec![
            character(sheet("hero"), Position::new(2, 2)),
            goblin("monster_goblin_0", Position::new(3, 2)),
        ])
    }

    #[test]
    fn test_critical_hit_doubles_dice() {
        let mut s = duel();
        // d20, then two d8
        let mut dice = DiceEngine::scripted([20, 5, 7]);
        let action = CombatAction::new(ActionType::Attack, "hero")
            .with_target("monster_goblin_0")
            .with_weapon("longsword");

        let result = resolve(&mut s, &action, &mut dice).unwrap();
        assert!(result.success);
        assert!(result.critical);
        assert_eq!(result.roll, Some(20));
        // 5 + 7 + STR 3
        assert_eq!(result.damage, Some(15));
        assert_eq!(result.damage_type, Some(DamageType::Slashing));

        let target = s.combatant("monster_goblin_0").unwrap();
        assert_eq!(target.hp, 0);
        assert!(target.position.is_off_grid());
    }

    #[test]
    fn test_natural_one_always_misses() {
        let mut s = duel();
        s.combatant_mut("monster_goblin_0").unwrap().ac = 1;
        let before = s.clone();
        let mut dice = DiceEngine::scripted([1]);
        let action = CombatAction::new(ActionType::Attack, "hero")
            .with_target("monster_goblin_0")
            .with_weapon("longsword");

        let result = resolve(&mut s, &action, &mut dice).unwrap();
        assert!(!result.success);
        assert_eq!(result.roll, Some(1));
        assert_eq!(result.damage, None);
        assert_eq!(s, before);
    }

    #[test]
    fn test_hit_against_ac() {
        let mut s = duel();
        // 12 + STR 3 + prof 2 = 17 vs AC 15; d8 = 2
        let mut dice = DiceEngine::scripted([12, 2]);
        let action = CombatAction::new(ActionType::Attack, "hero")
            .with_target("monster_goblin_0")
            .with_weapon("longsword");

        let result = resolve(&mut s, &action, &mut dice).unwrap();
        assert!(result.success);
        assert!(!result.critical);
        assert_eq!(result.damage, Some(5));
        assert_eq!(s.combatant("monster_goblin_0").unwrap().hp, 2);
    }

    #[test]
    fn test_miss_below_ac() {
        let mut s = duel();
        // 9 + 5 = 14 vs AC 15
        let mut dice = DiceEngine::scripted([9]);
        let action = CombatAction::new(ActionType::Attack, "hero")
            .with_target("monster_goblin_0")
            .with_weapon("longsword");

        let result = resolve(&mut s, &action, &mut dice).unwrap();
        assert!(!result.success);
        assert_eq!(s.combatant("monster_goblin_0").unwrap().hp, 7);
    }

    #[test]
    fn test_attack_out_of_range() {
        let mut s = duel();
        s.combatant_mut("monster_goblin_0").unwrap().position = Position::new(6, 2);
        let mut dice = DiceEngine::scripted([20]);
        let action = CombatAction::new(ActionType::Attack, "hero")
            .with_target("monster_goblin_0")
            .with_weapon("dagger");

        let err = resolve(&mut s, &action, &mut dice).unwrap_err();
        assert!(matches!(err, CombatError::Validation(msg) if msg.contains("out of range")));

        let bow = CombatAction::new(ActionType::Attack, "hero")
            .with_target("monster_goblin_0")
            .with_weapon("longbow");
        assert!(resolve(&mut s, &bow, &mut dice).is_ok());
    }

    #[test]
    fn test_attack_requires_target_and_weapon() {
        let mut s = duel();
        let mut dice = DiceEngine::seeded(1);

        let no_target = CombatAction::new(ActionType::Attack, "hero").with_weapon("longsword");
        assert!(matches!(
            resolve(&mut s, &no_target, &mut dice),
            Err(CombatError::Validation(_))
        ));

        let no_weapon = CombatAction::new(ActionType::Attack, "hero").with_target("monster_goblin_0");
        assert!(matches!(
            resolve(&mut s, &no_weapon, &mut dice),
            Err(CombatError::Validation(_))
        ));
    }

    #[test]
    fn test_monster_attack_uses_stat_block() {
        let mut s = duel();
        // 11 + 4 = 15 vs AC 16 misses, then 12 + 4 hits for 3 + 2
        let mut dice = DiceEngine::scripted([11, 12, 3]);
        let action = CombatAction::new(ActionType::Attack, "monster_goblin_0")
            .with_target("hero")
            .with_weapon("Scimitar");

        let miss = resolve(&mut s, &action, &mut dice).unwrap();
        assert!(!miss.success);

        let hit = resolve(&mut s, &action, &mut dice).unwrap();
        assert_eq!(hit.damage, Some(5));
        assert_eq!(s.combatant("hero").unwrap().hp, 7);

        let unknown = CombatAction::new(ActionType::Attack, "monster_goblin_0")
            .with_target("hero")
            .with_weapon("Bite");
        assert!(matches!(
            resolve(&mut s, &unknown, &mut dice),
            Err(CombatError::Validation(msg)) if msg.contains("Bite")
        ));
    }

    #[test]
    fn test_character_knocked_unconscious_and_healed() {
        let mut s = duel();
        s.combatant_mut("hero").unwrap().hp = 3;
        // crit: 6 + 6 + 2
        let mut dice = DiceEngine::scripted([20, 6, 6]);
        let action = CombatAction::new(ActionType::Attack, "monster_goblin_0")
            .with_target("hero")
            .with_weapon("Scimitar");

        let result = resolve(&mut s, &action, &mut dice).unwrap();
        assert_eq!(result.effects, vec!["+unconscious".to_string()]);
        let hero = s.combatant("hero").unwrap();
        assert_eq!(hero.hp, 0);
        assert!(hero.has_condition(&Condition::Unconscious));
        assert_eq!(hero.position, Position::new(2, 2));

        // Goblin casting cure wounds: d8 4 + 3
        let mut dice = DiceEngine::scripted([4]);
        let heal = CombatAction::new(ActionType::CastSpell, "monster_goblin_0")
            .with_target("hero")
            .with_spell("cure-wounds");
        let result = resolve(&mut s, &heal, &mut dice).unwrap();
        assert_eq!(result.healing, Some(7));
        assert_eq!(result.effects, vec!["-unconscious".to_string()]);

        let hero = s.combatant("hero").unwrap();
        assert_eq!(hero.hp, 7);
        assert!(!hero.has_condition(&Condition::Unconscious));
    }

    #[test]
    fn test_cure_wounds_clamps_at_max() {
        let mut s = duel();
        s.combatant_mut("hero").unwrap().hp = 10;
        let mut dice = DiceEngine::scripted([8]);
        let heal = CombatAction::new(ActionType::CastSpell, "hero")
            .with_target("hero")
            .with_spell("cure-wounds");

        resolve(&mut s, &heal, &mut dice).unwrap();
        assert_eq!(s.combatant("hero").unwrap().hp, 12);
    }

    #[test]
    fn test_magic_missile() {
        let mut s = duel();
        if let StatSource::Character(sheet) = &mut s.combatant_mut("hero").unwrap().stats {
            sheet.spells.push("magic-missile".to_string());
        }
        let mut dice = DiceEngine::scripted([1, 1, 2]);
        let action = CombatAction::new(ActionType::CastSpell, "hero")
            .with_target("monster_goblin_0")
            .with_spell("magic-missile");

        let result = resolve(&mut s, &action, &mut dice).unwrap();
        assert_eq!(result.damage, Some(7));
        assert_eq!(result.damage_type, Some(DamageType::Force));
        assert_eq!(result.roll, None);
        assert!(s.combatant("monster_goblin_0").unwrap().position.is_off_grid());
    }

    #[test]
    fn test_spell_validation() {
        let mut s = duel();
        let mut dice = DiceEngine::seeded(3);

        let unknown_to_caster = CombatAction::new(ActionType::CastSpell, "hero")
            .with_target("monster_goblin_0")
            .with_spell("magic-missile");
        assert!(matches!(
            resolve(&mut s, &unknown_to_caster, &mut dice),
            Err(CombatError::Validation(msg)) if msg.contains("doesn't know")
        ));

        let unimplemented = CombatAction::new(ActionType::CastSpell, "monster_goblin_0")
            .with_spell("fireball");
        assert!(matches!(
            resolve(&mut s, &unimplemented, &mut dice),
            Err(CombatError::Validation(msg)) if msg.contains("fireball")
        ));

        let no_spell = CombatAction::new(ActionType::CastSpell, "hero");
        assert!(resolve(&mut s, &no_spell, &mut dice).is_err());
    }

    #[test]
    fn test_shield_raises_ac_once() {
        let mut s = duel();
        let mut dice = DiceEngine::seeded(3);
        let action = CombatAction::new(ActionType::CastSpell, "hero").with_spell("shield");

        let first = resolve(&mut s, &action, &mut dice).unwrap();
        assert_eq!(first.effects, vec!["+shield".to_string()]);
        resolve(&mut s, &action, &mut dice).unwrap();

        let hero = s.combatant("hero").unwrap();
        assert_eq!(hero.ac, 21);
        assert!(hero.has_condition(&Condition::Shield));
    }

    #[test]
    fn test_move_along_path() {
        let mut s = duel();
        let mut dice = DiceEngine::seeded(3);
        let action = CombatAction::new(ActionType::Move, "hero")
            .with_path([Position::new(2, 3), Position::new(3, 4)]);

        let result = resolve(&mut s, &action, &mut dice).unwrap();
        assert!(result.success);
        assert_eq!(s.combatant("hero").unwrap().position, Position::new(3, 4));
    }

    #[test]
    fn test_move_through_obstacle_rejected() {
        let mut s = duel();
        s.battlefield.set_obstacle(Position::new(2, 3), Obstacle::Wall);
        let mut dice = DiceEngine::seeded(3);
        let action = CombatAction::new(ActionType::Move, "hero")
            .with_path([Position::new(2, 3), Position::new(2, 4)]);

        assert!(matches!(
            resolve(&mut s, &action, &mut dice),
            Err(CombatError::Validation(_))
        ));
        assert_eq!(s.combatant("hero").unwrap().position, Position::new(2, 2));
    }

    #[test]
    fn test_move_into_occupied_cell_rejected() {
        let mut s = duel();
        let mut dice = DiceEngine::seeded(3);
        let action = CombatAction::new(ActionType::Move, "hero").with_path([Position::new(3, 2)]);

        assert!(resolve(&mut s, &action, &mut dice).is_err());
        assert_eq!(s.combatant("hero").unwrap().position, Position::new(2, 2));
    }

    #[test]
    fn test_empty_move_is_noop() {
        let mut s = duel();
        let before = s.clone();
        let mut dice = DiceEngine::seeded(3);
        let action = CombatAction::new(ActionType::Move, "hero");

        let result = resolve(&mut s, &action, &mut dice).unwrap();
        assert!(!result.success);
        assert_eq!(s, before);
    }

    #[test]
    fn test_utility_conditions() {
        let mut s = duel();
        let mut dice = DiceEngine::scripted([15]);

        for action_type in [ActionType::Dodge, ActionType::Disengage, ActionType::Dash] {
            let action = CombatAction::new(action_type, "hero");
            assert!(resolve(&mut s, &action, &mut dice).unwrap().success);
        }

        let help = CombatAction::new(ActionType::Help, "monster_goblin_0").with_target("hero");
        resolve(&mut s, &help, &mut dice).unwrap();

        // 15 + DEX 2
        let hide = CombatAction::new(ActionType::Hide, "hero");
        let result = resolve(&mut s, &hide, &mut dice).unwrap();
        assert_eq!(result.effects, vec!["+hidden:17".to_string()]);

        let tags: Vec<String> = s
            .combatant("hero")
            .unwrap()
            .conditions
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(tags, vec!["dodge", "disengage", "dash", "helped", "hidden:17"]);
    }

    #[test]
    fn test_repeat_dodge_is_idempotent() {
        let mut s = duel();
        let mut dice = DiceEngine::seeded(3);
        let action = CombatAction::new(ActionType::Dodge, "hero");

        resolve(&mut s, &action, &mut dice).unwrap();
        let again = resolve(&mut s, &action, &mut dice).unwrap();
        assert!(again.effects.is_empty());
        assert_eq!(s.combatant("hero").unwrap().conditions.len(), 1);
    }

    #[test]
    fn test_items() {
        let mut s = duel();
        s.combatant_mut("hero").unwrap().hp = 2;
        let mut dice = DiceEngine::scripted([3, 1]);

        let potion = CombatAction::new(ActionType::UseItem, "hero")
            .with_extra(serde_json::json!("healing-potion"));
        let result = resolve(&mut s, &potion, &mut dice).unwrap();
        assert_eq!(result.healing, Some(6));
        assert_eq!(s.combatant("hero").unwrap().hp, 8);

        let antitoxin = CombatAction::new(ActionType::UseItem, "hero")
            .with_extra(serde_json::json!({"item": "antitoxin"}));
        resolve(&mut s, &antitoxin, &mut dice).unwrap();
        assert!(s
            .combatant("hero")
            .unwrap()
            .has_condition(&Condition::Antitoxin));

        let unknown = CombatAction::new(ActionType::UseItem, "hero")
            .with_extra(serde_json::json!("bag-of-holding"));
        assert!(matches!(
            resolve(&mut s, &unknown, &mut dice),
            Err(CombatError::Validation(msg)) if msg.contains("bag-of-holding")
        ));

        let missing = CombatAction::new(ActionType::UseItem, "hero");
        assert!(resolve(&mut s, &missing, &mut dice).is_err());
    }

    #[test]
    fn test_unknown_action_type() {
        let mut s = duel();
        let before = s.clone();
        let mut dice = DiceEngine::seeded(3);
        let action = CombatAction::new(ActionType::Unknown("taunt".to_string()), "hero");

        assert!(matches!(
            resolve(&mut s, &action, &mut dice),
            Err(CombatError::Validation(msg)) if msg.contains("taunt")
        ));
        assert_eq!(s, before);
    }

    #[test]
    fn test_defeated_monster_cannot_be_targeted() {
        let mut s = duel();
        let goblin = s.combatant_mut("monster_goblin_0").unwrap();
        goblin.hp = 0;
        goblin.position = Position::OFF_GRID;
        let mut dice = DiceEngine::scripted([20]);
        let action = CombatAction::new(ActionType::Attack, "hero")
            .with_target("monster_goblin_0")
            .with_weapon("longsword");

        assert!(matches!(
            resolve(&mut s, &action, &mut dice),
            Err(CombatError::Validation(msg)) if msg.contains("no longer on the battlefield")
        ));
    }
}
