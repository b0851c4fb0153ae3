//! Combat session data model
//!
//! Everything that is persisted or sent to observers lives here:
//! - `CombatSession`: one encounter, its initiative order and participants
//! - `Combatant`: a character or monster with hp, AC, position, conditions
//! - `StatSource`: the immutable sheet or stat block behind a combatant
//! - `CombatAction` / `ActionResult`: the request and outcome of one action

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::conditions::{Condition, Conditions, SHIELD_AC_BONUS};
use super::damage::{ability_modifier, Ability, DamageType};
use super::grid::{Battlefield, Position};

/// Walking speed of every player character, in feet
pub const CHARACTER_SPEED: i32 = 30;

/// Lifecycle of a combat session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CombatStatus {
    #[default]
    Active,
    Victory,
    Defeat,
}

impl CombatStatus {
    /// Victory and defeat accept no further actions
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CombatStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CombatStatus::Active => "active",
            CombatStatus::Victory => "victory",
            CombatStatus::Defeat => "defeat",
        }
    }
}

impl std::str::FromStr for CombatStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CombatStatus::Active),
            "victory" => Ok(CombatStatus::Victory),
            "defeat" => Ok(CombatStatus::Defeat),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for CombatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which side a combatant fights for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombatantKind {
    Character,
    Monster,
}

/// A player character sheet, owned by the character service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSheet {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub race: String,
    #[serde(default)]
    pub class: String,
    #[serde(default = "default_level")]
    pub level: i32,
    #[serde(default = "default_score")]
    pub strength: i32,
    #[serde(default = "default_score")]
    pub dexterity: i32,
    #[serde(default = "default_score")]
    pub constitution: i32,
    #[serde(default = "default_score")]
    pub intelligence: i32,
    #[serde(default = "default_score")]
    pub wisdom: i32,
    #[serde(default = "default_score")]
    pub charisma: i32,
    pub hit_points: i32,
    pub max_hit_points: i32,
    pub armor_class: i32,
    #[serde(default)]
    pub equipment: Vec<String>,
    /// Spell indexes this character can cast
    #[serde(default)]
    pub spells: Vec<String>,
}

fn default_level() -> i32 {
    1
}

fn default_score() -> i32 {
    10
}

impl CharacterSheet {
    pub fn score(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        ability_modifier(self.score(ability))
    }

    pub fn knows_spell(&self, spell_id: &str) -> bool {
        self.spells.iter().any(|s| s == spell_id)
    }
}

/// Movement speeds in feet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MonsterSpeed {
    #[serde(default)]
    pub walk: i32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub swim: i32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub fly: i32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub climb: i32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub burrow: i32,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

/// Damage of an attack or spell as dice plus a flat bonus
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DamageInfo {
    pub dice_count: i32,
    pub dice_value: i32,
    #[serde(default)]
    pub bonus: i32,
    #[serde(rename = "type", default)]
    pub damage_type: String,
}

/// One named action from a monster stat block
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MonsterAction {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attack_bonus: i32,
    /// Reach or range in feet; 0 means ordinary melee reach
    #[serde(default)]
    pub range: i32,
    #[serde(default)]
    pub damage: Option<DamageInfo>,
}

/// Immutable monster reference data
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonsterStatBlock {
    pub index: String,
    pub name: String,
    pub size: String,
    #[serde(rename = "type")]
    pub monster_type: String,
    pub alignment: String,
    pub armor_class: i32,
    /// Fixed hit points, used when `hit_dice` is empty
    pub hit_points: i32,
    pub hit_dice: String,
    pub speed: MonsterSpeed,
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
    pub strength_mod: i32,
    pub dexterity_mod: i32,
    #[serde(rename = "constitution_mod")]
    pub con_mod: i32,
    #[serde(rename = "intelligence_mod")]
    pub int_mod: i32,
    pub wisdom_mod: i32,
    pub charisma_mod: i32,
    pub actions: Vec<MonsterAction>,
    pub challenge_rating: f64,
    pub xp: i32,
}

impl MonsterStatBlock {
    pub fn action(&self, name: &str) -> Option<&MonsterAction> {
        self.actions.iter().find(|a| a.name == name)
    }
}

/// Immutable spell reference data
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpellDefinition {
    pub index: String,
    pub name: String,
    pub level: i32,
    pub school: String,
    pub casting_time: String,
    pub range: String,
    pub components: Vec<String>,
    pub duration: String,
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub higher_level: String,
    pub classes: Vec<String>,
}

/// Where a combatant's numbers come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum StatSource {
    Character(CharacterSheet),
    Monster(MonsterStatBlock),
}

/// One participant in a combat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: String,
    pub name: String,
    /// Controlling user; the DM for monsters
    pub user_id: String,
    pub initiative: i32,
    pub hp: i32,
    pub max_hp: i32,
    pub ac: i32,
    pub position: Position,
    #[serde(default)]
    pub conditions: Conditions,
    pub stats: StatSource,
}

impl Combatant {
    pub fn kind(&self) -> CombatantKind {
        match self.stats {
            StatSource::Character(_) => CombatantKind::Character,
            StatSource::Monster(_) => CombatantKind::Monster,
        }
    }

    pub fn is_character(&self) -> bool {
        self.kind() == CombatantKind::Character
    }

    pub fn is_monster(&self) -> bool {
        self.kind() == CombatantKind::Monster
    }

    pub fn is_down(&self) -> bool {
        self.hp <= 0
    }

    /// Dexterity modifier used for initiative and stealth
    pub fn dexterity_modifier(&self) -> i32 {
        match &self.stats {
            StatSource::Character(sheet) => sheet.modifier(Ability::Dexterity),
            StatSource::Monster(block) => block.dexterity_mod,
        }
    }

    /// Walking speed in feet
    pub fn speed(&self) -> i32 {
        match &self.stats {
            StatSource::Character(_) => CHARACTER_SPEED,
            StatSource::Monster(block) => block.speed.walk,
        }
    }

    /// Apply damage, clamped at 0. Returns hp actually lost.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        let before = self.hp;
        self.hp = (self.hp - amount.max(0)).clamp(0, self.max_hp);
        before - self.hp
    }

    /// Heal, clamped at max_hp. Returns hp actually restored.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let before = self.hp;
        self.hp = (self.hp + amount.max(0)).clamp(0, self.max_hp);
        self.hp - before
    }

    pub fn has_condition(&self, condition: &Condition) -> bool {
        self.conditions.has(condition)
    }

    /// Grant the shield spell's condition and AC, once
    pub fn raise_shield(&mut self) -> bool {
        let added = self.conditions.add(Condition::Shield);
        if added {
            self.ac += SHIELD_AC_BONUS;
        }
        added
    }

    /// Drop round-limited conditions, reverting shield AC if it lapsed
    pub fn expire_round_conditions(&mut self) -> Vec<Condition> {
        let expired = self.conditions.expire_end_of_round();
        if expired.contains(&Condition::Shield) {
            self.ac -= SHIELD_AC_BONUS;
        }
        expired
    }
}

/// A rolled initiative score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeEntry {
    pub combatant_id: String,
    pub score: i32,
}

/// One live encounter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatSession {
    pub id: String,
    pub dm_user_id: String,
    /// Combatant ids in turn order, fixed for the session
    pub initiative: Vec<String>,
    #[serde(default)]
    pub initiative_scores: Vec<InitiativeEntry>,
    /// Participants in creation order
    pub participants: Vec<Combatant>,
    pub current_turn_index: usize,
    pub round_number: u32,
    pub status: CombatStatus,
    pub environment: String,
    pub battlefield: Battlefield,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CombatSession {
    pub fn combatant(&self, id: &str) -> Option<&Combatant> {
        self.participants.iter().find(|c| c.id == id)
    }

    pub fn combatant_mut(&mut self, id: &str) -> Option<&mut Combatant> {
        self.participants.iter_mut().find(|c| c.id == id)
    }

    /// Id of the combatant whose turn it is
    pub fn current_actor_id(&self) -> Option<&str> {
        self.initiative
            .get(self.current_turn_index)
            .map(String::as_str)
    }

    pub fn is_actors_turn(&self, actor_id: &str) -> bool {
        self.current_actor_id() == Some(actor_id)
    }

    /// Grid cells held by anyone other than `except`
    pub fn occupied_positions(&self, except: &str) -> HashSet<Position> {
        self.participants
            .iter()
            .filter(|c| c.id != except && !c.position.is_off_grid())
            .map(|c| c.position)
            .collect()
    }

    /// The DM, or anyone with a combatant in the fight
    pub fn is_user_in_combat(&self, user_id: &str) -> bool {
        self.dm_user_id == user_id || self.participants.iter().any(|c| c.user_id == user_id)
    }

    /// The DM controls every monster; users control their own characters
    pub fn user_controls_actor(&self, user_id: &str, actor_id: &str) -> bool {
        match self.combatant(actor_id) {
            Some(c) if c.is_monster() && self.dm_user_id == user_id => true,
            Some(c) => c.user_id == user_id,
            None => false,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// The kinds of action a combatant can take on its turn
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    Attack,
    CastSpell,
    Move,
    Dodge,
    Help,
    Hide,
    Disengage,
    Dash,
    UseItem,
    /// Anything unrecognised, rejected at resolution
    Unknown(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::Attack => "attack",
            ActionType::CastSpell => "cast_spell",
            ActionType::Move => "move",
            ActionType::Dodge => "dodge",
            ActionType::Help => "help",
            ActionType::Hide => "hide",
            ActionType::Disengage => "disengage",
            ActionType::Dash => "dash",
            ActionType::UseItem => "use_item",
            ActionType::Unknown(name) => name,
        }
    }
}

impl From<String> for ActionType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "attack" => ActionType::Attack,
            "cast_spell" => ActionType::CastSpell,
            "move" => ActionType::Move,
            "dodge" => ActionType::Dodge,
            "help" => ActionType::Help,
            "hide" => ActionType::Hide,
            "disengage" => ActionType::Disengage,
            "dash" => ActionType::Dash,
            "use_item" => ActionType::UseItem,
            _ => ActionType::Unknown(name),
        }
    }
}

impl From<ActionType> for String {
    fn from(action_type: ActionType) -> Self {
        action_type.as_str().to_string()
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An inbound action request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatAction {
    #[serde(alias = "type")]
    pub action_type: ActionType,
    pub actor_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spell_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub movement_path: Vec<Position>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra_data: serde_json::Value,
}

impl CombatAction {
    pub fn new(action_type: ActionType, actor_id: impl Into<String>) -> Self {
        Self {
            action_type,
            actor_id: actor_id.into(),
            target_ids: Vec::new(),
            spell_id: None,
            weapon_name: None,
            movement_path: Vec::new(),
            extra_data: serde_json::Value::Null,
        }
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_ids.push(target_id.into());
        self
    }

    pub fn with_weapon(mut self, weapon: impl Into<String>) -> Self {
        self.weapon_name = Some(weapon.into());
        self
    }

    pub fn with_spell(mut self, spell_id: impl Into<String>) -> Self {
        self.spell_id = Some(spell_id.into());
        self
    }

    pub fn with_path(mut self, path: impl IntoIterator<Item = Position>) -> Self {
        self.movement_path = path.into_iter().collect();
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra_data = extra;
        self
    }

    pub fn primary_target(&self) -> Option<&str> {
        self.target_ids.first().map(String::as_str)
    }

    /// Item named by `extra_data`, either a bare string or `{"item": ...}`
    pub fn item_name(&self) -> Option<&str> {
        let name = match &self.extra_data {
            serde_json::Value::String(s) => Some(s.as_str()),
            serde_json::Value::Object(map) => map.get("item").and_then(|v| v.as_str()),
            _ => None,
        };
        name.filter(|s| !s.is_empty())
    }
}

/// Outcome of one resolved action
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healing: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<DamageType>,
    /// Condition changes such as `+dodge` or `-unconscious`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<String>,
    /// Natural d20, when one was rolled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<i32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub critical: bool,
}

impl ActionResult {
    pub fn succeeded(description: impl Into<String>) -> Self {
        Self {
            success: true,
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            success: false,
            description: description.into(),
            ..Default::default()
        }
    }
}
