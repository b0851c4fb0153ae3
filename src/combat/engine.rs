//! Per-session combat state machine
//!
//! A `CombatEngine` owns one `CombatSession` and the dice for it:
//! - `create` builds participants, rolls initiative and places everyone
//! - `execute_action` validates turn ownership then resolves on a draft
//! - `end_turn` advances the turn and runs round-end expiry on wrap
//!
//! Nothing here is async or shared; callers serialize access.

use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info};

use super::conditions::{Condition, Conditions};
use super::dice::{DiceEngine, DEFAULT_HIT_POINTS};
use super::grid::{Battlefield, Position};
use super::resolver;
use super::state::{
    ActionResult, ActionType, CharacterSheet, CombatAction, CombatSession, CombatStatus,
    Combatant, InitiativeEntry, MonsterStatBlock, StatSource,
};
use super::CombatError;

/// Combat state machine for a single session
#[derive(Debug)]
pub struct CombatEngine {
    session: CombatSession,
    dice: DiceEngine,
}

impl CombatEngine {
    /// Start a new encounter.
    ///
    /// Characters keep their sheet id; monsters are numbered
    /// `monster_<index>_<n>` in the order given.
    pub fn create(
        id: impl Into<String>,
        dm_user_id: impl Into<String>,
        characters: Vec<CharacterSheet>,
        monsters: Vec<MonsterStatBlock>,
        environment: impl Into<String>,
        mut dice: DiceEngine,
    ) -> Result<Self, CombatError> {
        let id = id.into();
        let dm_user_id = dm_user_id.into();
        let environment = environment.into();

        if characters.is_empty() {
            return Err(CombatError::Validation(
                "combat requires at least one character".to_string(),
            ));
        }
        if monsters.is_empty() {
            return Err(CombatError::Validation(
                "combat requires at least one monster".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut participants = Vec::with_capacity(characters.len() + monsters.len());

        for sheet in characters {
            if !seen.insert(sheet.id.clone()) {
                return Err(CombatError::Validation(format!(
                    "character {} listed twice",
                    sheet.id
                )));
            }

            let max_hp = sheet.max_hit_points.max(0);
            let hp = sheet.hit_points.clamp(0, max_hp);
            let mut conditions = Conditions::new();
            if hp == 0 {
                conditions.add(Condition::Unconscious);
            }

            participants.push(Combatant {
                id: sheet.id.clone(),
                name: sheet.name.clone(),
                user_id: sheet.user_id.clone(),
                initiative: 0,
                hp,
                max_hp,
                ac: sheet.armor_class,
                position: Position::OFF_GRID,
                conditions,
                stats: StatSource::Character(sheet),
            });
        }

        for (i, block) in monsters.into_iter().enumerate() {
            let hp = if block.hit_dice.trim().is_empty() {
                block.hit_points
            } else {
                dice.roll_hit_points(&block.hit_dice)
            };
            let hp = if hp > 0 { hp } else { DEFAULT_HIT_POINTS };

            participants.push(Combatant {
                id: format!("monster_{}_{}", block.index, i),
                name: block.name.clone(),
                user_id: dm_user_id.clone(),
                initiative: 0,
                hp,
                max_hp: hp,
                ac: block.armor_class,
                position: Position::OFF_GRID,
                conditions: Conditions::new(),
                stats: StatSource::Monster(block),
            });
        }

        let initiative_scores = roll_initiative(&mut participants, &mut dice);
        let initiative = initiative_scores
            .iter()
            .map(|e| e.combatant_id.clone())
            .collect();

        let battlefield = Battlefield::for_environment(&environment);
        place_participants(&mut participants, &battlefield)?;

        let now = Utc::now();
        let session = CombatSession {
            id,
            dm_user_id,
            initiative,
            initiative_scores,
            participants,
            current_turn_index: 0,
            round_number: 1,
            status: CombatStatus::Active,
            environment,
            battlefield,
            created_at: now,
            updated_at: now,
        };

        info!(
            combat = %session.id,
            participants = session.participants.len(),
            environment = %session.environment,
            "Combat created"
        );

        Ok(Self { session, dice })
    }

    /// Resume a session loaded from storage
    pub fn restore(session: CombatSession, dice: DiceEngine) -> Self {
        Self { session, dice }
    }

    pub fn session(&self) -> &CombatSession {
        &self.session
    }

    pub fn into_session(self) -> CombatSession {
        self.session
    }

    /// Validate and resolve one action for the combatant whose turn it is
    pub fn execute_action(&mut self, action: &CombatAction) -> Result<ActionResult, CombatError> {
        let session = &self.session;

        if session.status.is_terminal() {
            return Err(CombatError::Validation(format!(
                "combat is not active ({})",
                session.status
            )));
        }

        let actor = session.combatant(&action.actor_id).ok_or_else(|| {
            CombatError::Validation(format!("actor {} not found in combat", action.actor_id))
        })?;

        if actor.is_down() {
            return Err(CombatError::Validation(format!(
                "{} is unconscious or dead",
                actor.name
            )));
        }

        if !session.is_actors_turn(&actor.id) {
            return Err(CombatError::Validation(format!(
                "it is not {}'s turn",
                actor.name
            )));
        }

        for target_id in &action.target_ids {
            if session.combatant(target_id).is_none() {
                return Err(CombatError::Validation(format!(
                    "target {} not found in combat",
                    target_id
                )));
            }
        }

        if action.action_type == ActionType::Move && action.movement_path.is_empty() {
            return Err(CombatError::Validation(
                "movement requires a path".to_string(),
            ));
        }

        let mut draft = self.session.clone();
        let result = resolver::resolve(&mut draft, action, &mut self.dice)?;
        evaluate_outcome(&mut draft);
        draft.touch();

        debug!(
            combat = %draft.id,
            actor = %action.actor_id,
            success = result.success,
            status = %draft.status,
            "Action resolved"
        );

        self.session = draft;
        Ok(result)
    }

    /// Finish the current turn. Returns true when a new round began.
    pub fn end_turn(&mut self, actor_id: &str) -> Result<bool, CombatError> {
        let session = &mut self.session;

        if session.status.is_terminal() {
            return Err(CombatError::Validation(format!(
                "combat is not active ({})",
                session.status
            )));
        }

        if !session.is_actors_turn(actor_id) {
            return Err(CombatError::Validation(format!(
                "it is not {}'s turn",
                actor_id
            )));
        }

        session.current_turn_index += 1;
        let new_round = session.current_turn_index >= session.initiative.len();
        if new_round {
            session.current_turn_index = 0;
            session.round_number += 1;
            for combatant in &mut session.participants {
                combatant.expire_round_conditions();
            }
            debug!(combat = %session.id, round = session.round_number, "New round");
        }
        session.touch();

        Ok(new_round)
    }
}

/// Roll 1d20 + DEX for everyone and order by descending score.
///
/// The sort is stable so ties keep creation order.
fn roll_initiative(participants: &mut [Combatant], dice: &mut DiceEngine) -> Vec<InitiativeEntry> {
    let mut entries: Vec<InitiativeEntry> = participants
        .iter_mut()
        .map(|c| {
            c.initiative = dice.roll_d20() + c.dexterity_modifier();
            InitiativeEntry {
                combatant_id: c.id.clone(),
                score: c.initiative,
            }
        })
        .collect();

    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries
}

/// Characters start in column 2 and monsters in column `width - 3`, one per
/// row from row 2. A full column wraps to its top rows, then spills into the
/// next column outward, then inward. Obstacles and taken cells are skipped.
fn place_participants(
    participants: &mut [Combatant],
    battlefield: &Battlefield,
) -> Result<(), CombatError> {
    let width = battlefield.width();
    let height = battlefield.height();
    let mut taken = HashSet::new();

    for combatant in participants.iter_mut() {
        let (start, outward) = if combatant.is_character() {
            (2, -1)
        } else {
            (width - 3, 1)
        };
        let start = start.clamp(0, width - 1);

        let outer = (0..).map(|i| start + outward * i).take_while(|x| (0..width).contains(x));
        let inner = (1..).map(|i| start - outward * i).take_while(|x| (0..width).contains(x));
        let spot = outer
            .chain(inner)
            .flat_map(|x| (0..height).map(move |i| Position::new(x, (2 + i) % height)))
            .find(|pos| !battlefield.is_blocked(*pos) && !taken.contains(pos))
            .ok_or_else(|| {
                CombatError::Validation(format!("no room on the battlefield for {}", combatant.name))
            })?;

        taken.insert(spot);
        combatant.position = spot;
    }

    Ok(())
}

/// Settle victory or defeat on the post-action state.
///
/// Victory is checked first, so a mutual wipe counts as a win.
fn evaluate_outcome(session: &mut CombatSession) {
    let monsters_down = session
        .participants
        .iter()
        .filter(|c| c.is_monster())
        .all(Combatant::is_down);
    let characters_down = session
        .participants
        .iter()
        .filter(|c| c.is_character())
        .all(Combatant::is_down);

    if monsters_down {
        session.status = CombatStatus::Victory;
    } else if characters_down {
        session.status = CombatStatus::Defeat;
    }

    if session.status.is_terminal() {
        info!(combat = %session.id, status = %session.status, "Combat finished");
    }
}
