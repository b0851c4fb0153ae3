//! Monster and spell reference data
//!
//! Provides:
//! - `MonsterDataProvider`, the async seam the combat manager reads through
//! - `SrdClient`, an HTTP client for the public D&D 5e SRD API with a TTL cache
//! - `StaticProvider`, an in-memory catalog for offline use and tests

mod catalog;

pub use catalog::StaticProvider;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::combat::{
    ability_modifier, parse_dice, DamageInfo, MonsterAction, MonsterSpeed, MonsterStatBlock,
    SpellDefinition,
};

/// Public SRD API root
pub const DEFAULT_SRD_BASE_URL: &str = "https://www.dnd5eapi.co/api";

/// How long fetched entries stay cached
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reference data lookup errors
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("malformed reference data: {0}")]
    Parse(String),
}

/// Source of immutable monster and spell definitions
#[async_trait]
pub trait MonsterDataProvider: Send + Sync {
    /// Look up a monster by SRD index, e.g. `goblin`
    async fn get_monster_stat_block(&self, index: &str)
        -> Result<MonsterStatBlock, ProviderError>;

    /// Look up a spell by SRD index, e.g. `magic-missile`
    async fn get_spell_definition(&self, index: &str) -> Result<SpellDefinition, ProviderError>;
}

/// Entries that expire a fixed time after insertion
struct TtlCache<T> {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, T)>>,
}

impl<T: Clone> TtlCache<T> {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> Option<T> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some((stored, value)) if stored.elapsed() < self.ttl => return Some(value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().remove(key);
        None
    }

    fn insert(&self, key: &str, value: T) {
        self.entries
            .write()
            .insert(key.to_string(), (Instant::now(), value));
    }
}

/// Client for the D&D 5e SRD REST API
pub struct SrdClient {
    client: Client,
    base_url: String,
    monsters: TtlCache<MonsterStatBlock>,
    spells: TtlCache<SpellDefinition>,
}

impl SrdClient {
    /// Create a client against `base_url` (trailing slash optional)
    pub fn new(base_url: impl Into<String>, cache_ttl: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            monsters: TtlCache::new(cache_ttl),
            spells: TtlCache::new(cache_ttl),
        })
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch<T: DeserializeOwned>(&self, kind: &str, index: &str) -> Result<T, ProviderError> {
        let url = format!("{}/{}/{}", self.base_url, kind, index);
        debug!(url = %url, "Fetching SRD entry");

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(format!("{} '{}'", kind, index)));
        }

        let response = response.error_for_status()?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            warn!(url = %url, error = %e, "SRD response did not parse");
            ProviderError::Parse(format!("{} '{}': {}", kind, index, e))
        })
    }
}

#[async_trait]
impl MonsterDataProvider for SrdClient {
    async fn get_monster_stat_block(
        &self,
        index: &str,
    ) -> Result<MonsterStatBlock, ProviderError> {
        if let Some(block) = self.monsters.get(index) {
            return Ok(block);
        }

        let raw: SrdMonster = self.fetch("monsters", index).await?;
        let block = raw.into_stat_block();
        self.monsters.insert(index, block.clone());
        Ok(block)
    }

    async fn get_spell_definition(&self, index: &str) -> Result<SpellDefinition, ProviderError> {
        if let Some(spell) = self.spells.get(index) {
            return Ok(spell);
        }

        let raw: SrdSpell = self.fetch("spells", index).await?;
        let spell = raw.into_definition();
        self.spells.insert(index, spell.clone());
        Ok(spell)
    }
}

/// Leading integer of a speed like `"30 ft."`; anything else is 0
pub fn parse_speed(speed: &str) -> i32 {
    let digits: String = speed
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

static RANGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"range (\d+)(?:/\d+)? ft").unwrap());
static REACH_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"reach (\d+) ft").unwrap());

/// Normal range or reach in feet from an action's prose; 0 when absent
pub fn parse_action_range(description: &str) -> i32 {
    RANGE_REGEX
        .captures(description)
        .or_else(|| REACH_REGEX.captures(description))
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SrdArmorClass {
    Flat(i32),
    Listed(Vec<SrdArmorEntry>),
}

#[derive(Deserialize)]
struct SrdArmorEntry {
    #[serde(default)]
    value: i32,
}

impl Default for SrdArmorClass {
    fn default() -> Self {
        SrdArmorClass::Flat(10)
    }
}

impl SrdArmorClass {
    fn value(&self) -> i32 {
        match self {
            SrdArmorClass::Flat(ac) => *ac,
            SrdArmorClass::Listed(entries) => entries.first().map_or(10, |e| e.value),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SrdSpeed {
    walk: String,
    swim: String,
    fly: String,
    climb: String,
    burrow: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SrdNamed {
    name: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SrdDamage {
    damage_dice: String,
    damage_type: SrdNamed,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SrdAction {
    name: String,
    desc: String,
    attack_bonus: i32,
    damage: Vec<SrdDamage>,
}

/// Monster as served by the SRD API
#[derive(Deserialize, Default)]
#[serde(default)]
struct SrdMonster {
    index: String,
    name: String,
    size: String,
    #[serde(rename = "type")]
    monster_type: String,
    alignment: String,
    armor_class: SrdArmorClass,
    hit_points: i32,
    hit_dice: String,
    speed: SrdSpeed,
    strength: i32,
    dexterity: i32,
    constitution: i32,
    intelligence: i32,
    wisdom: i32,
    charisma: i32,
    actions: Vec<SrdAction>,
    challenge_rating: f64,
    xp: i32,
}

impl SrdMonster {
    fn into_stat_block(self) -> MonsterStatBlock {
        let actions = self
            .actions
            .into_iter()
            .map(|action| {
                // Only the first damage entry counts; choice entries carry no dice
                let damage = action.damage.first().and_then(|d| {
                    let dice = parse_dice(&d.damage_dice).ok()?;
                    Some(DamageInfo {
                        dice_count: dice.count as i32,
                        dice_value: dice.sides as i32,
                        bonus: dice.modifier,
                        damage_type: d.damage_type.name.to_lowercase(),
                    })
                });
                MonsterAction {
                    range: parse_action_range(&action.desc),
                    name: action.name,
                    description: action.desc,
                    attack_bonus: action.attack_bonus,
                    damage,
                }
            })
            .collect();

        MonsterStatBlock {
            armor_class: self.armor_class.value(),
            speed: MonsterSpeed {
                walk: parse_speed(&self.speed.walk),
                swim: parse_speed(&self.speed.swim),
                fly: parse_speed(&self.speed.fly),
                climb: parse_speed(&self.speed.climb),
                burrow: parse_speed(&self.speed.burrow),
            },
            strength_mod: ability_modifier(self.strength),
            dexterity_mod: ability_modifier(self.dexterity),
            con_mod: ability_modifier(self.constitution),
            int_mod: ability_modifier(self.intelligence),
            wisdom_mod: ability_modifier(self.wisdom),
            charisma_mod: ability_modifier(self.charisma),
            index: self.index,
            name: self.name,
            size: self.size,
            monster_type: self.monster_type,
            alignment: self.alignment,
            hit_points: self.hit_points,
            hit_dice: self.hit_dice,
            strength: self.strength,
            dexterity: self.dexterity,
            constitution: self.constitution,
            intelligence: self.intelligence,
            wisdom: self.wisdom,
            charisma: self.charisma,
            actions,
            challenge_rating: self.challenge_rating,
            xp: self.xp,
        }
    }
}

/// Spell as served by the SRD API
#[derive(Deserialize, Default)]
#[serde(default)]
struct SrdSpell {
    index: String,
    name: String,
    level: i32,
    school: SrdNamed,
    casting_time: String,
    range: String,
    components: Vec<String>,
    duration: String,
    desc: Vec<String>,
    higher_level: Vec<String>,
    classes: Vec<SrdNamed>,
}

impl SrdSpell {
    fn into_definition(self) -> SpellDefinition {
        SpellDefinition {
            index: self.index,
            name: self.name,
            level: self.level,
            school: self.school.name,
            casting_time: self.casting_time,
            range: self.range,
            components: self.components,
            duration: self.duration,
            description: self.desc.join(" "),
            higher_level: self.higher_level.join(" "),
            classes: self.classes.into_iter().map(|c| c.name).collect(),
        }
    }
}
