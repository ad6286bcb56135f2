//! Outgoing condition metrics aggregated from a parsed combat report.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Canonical condition names keyed by their lowercase report spelling.
const CONDITION_NAMES: &[(&str, &str)] = &[
    ("bleeding", "Bleeding"),
    ("burning", "Burning"),
    ("confusion", "Confusion"),
    ("poison", "Poison"),
    ("torment", "Torment"),
    ("vulnerability", "Vulnerability"),
    ("weakness", "Weakness"),
    ("blind", "Blind"),
    ("crippled", "Cripple"),
    ("chilled", "Chill"),
    ("immobilized", "Immobilize"),
    ("slow", "Slow"),
    ("fear", "Fear"),
    ("taunt", "Taunt"),
];

/// Input to [`compute_metrics`]: the relevant slices of a parsed report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsInput {
    pub players: Vec<Player>,
    pub targets: Vec<Target>,
    pub skill_map: HashMap<String, SkillMeta>,
    pub buff_map: HashMap<String, BuffMeta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Player {
    pub account: Option<String>,
    pub name: Option<String>,
    pub not_in_squad: bool,
    pub total_damage_dist: Vec<Option<Vec<DamageDistEntry>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DamageDistEntry {
    pub id: u64,
    pub hits: f64,
    pub connected_hits: f64,
    pub total_damage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Target {
    pub buffs: Vec<TargetBuff>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetBuff {
    pub id: Option<i64>,
    /// `[time, stacks]` pairs per source player name.
    pub states_per_source: HashMap<String, Vec<(f64, f64)>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillMeta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuffMeta {
    pub name: Option<String>,
    pub classification: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillEntry {
    pub name: String,
    pub hits: f64,
    pub damage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionTotals {
    pub applications: f64,
    pub damage: f64,
    pub skills: BTreeMap<String, SkillEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applications_from_buffs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionSummary {
    pub name: String,
    pub applications: f64,
    pub damage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applications_from_buffs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsMeta {
    pub buff_state_applications_total: u64,
    pub target_buff_entries_seen: u64,
    pub buff_state_sources_seen: u64,
}

/// Aggregated outgoing condition metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResult {
    /// Player key -> condition name -> totals.
    pub player_conditions: BTreeMap<String, BTreeMap<String, ConditionTotals>>,
    pub summary: BTreeMap<String, ConditionSummary>,
    pub meta: MetricsMeta,
}

fn condition_name(name: Option<&str>) -> Option<&'static str> {
    let cleaned = name?.trim().to_lowercase();
    CONDITION_NAMES
        .iter()
        .find(|(key, _)| *key == cleaned)
        .map(|(_, canonical)| *canonical)
}

/// Account name when known, otherwise the character name.
fn player_key(player: &Player) -> Option<String> {
    match player.account.as_deref() {
        Some(account) if !account.is_empty() && account != "Unknown" => Some(account.to_string()),
        _ => player
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(str::to_string),
    }
}

/// Count 0 -> positive stack transitions, ignoring the initial sample at t=0.
fn count_applied(states: &[(f64, f64)]) -> u64 {
    let mut applied = 0;
    let mut prev = 0.0;
    for &(time, value) in states {
        if !time.is_finite() || !value.is_finite() {
            continue;
        }
        if time == 0.0 {
            prev = value;
            continue;
        }
        if prev == 0.0 && value > 0.0 {
            applied += 1;
        }
        prev = value;
    }
    applied
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Aggregate outgoing condition applications and damage per squad player.
pub fn compute_metrics(input: &MetricsInput) -> MetricsResult {
    let mut result = MetricsResult::default();

    for player in input.players.iter().filter(|p| !p.not_in_squad) {
        let Some(key) = player_key(player) else {
            continue;
        };
        let conditions = result.player_conditions.entry(key).or_default();

        for entry in player.total_damage_dist.iter().flatten().flatten() {
            if entry.id == 0 {
                continue;
            }
            let skill_name = input
                .skill_map
                .get(&format!("s{}", entry.id))
                .or_else(|| input.skill_map.get(&entry.id.to_string()))
                .and_then(|meta| meta.name.clone())
                .unwrap_or_else(|| format!("Skill {}", entry.id));
            let buff_name = input
                .buff_map
                .get(&format!("b{}", entry.id))
                .and_then(|meta| meta.name.as_deref());

            let Some(condition) =
                condition_name(buff_name).or_else(|| condition_name(Some(skill_name.as_str())))
            else {
                continue;
            };

            let skill_label = match buff_name {
                Some(buff) if skill_name.starts_with("Skill ") => buff.to_string(),
                _ => skill_name,
            };
            let hits = finite_or_zero(if entry.connected_hits > 0.0 {
                entry.connected_hits
            } else {
                entry.hits
            });
            let damage = finite_or_zero(entry.total_damage);

            let summary = result
                .summary
                .entry(condition.to_string())
                .or_insert_with(|| ConditionSummary {
                    name: condition.to_string(),
                    ..Default::default()
                });
            summary.applications += hits;
            summary.damage += damage;

            let totals = conditions.entry(condition.to_string()).or_default();
            totals.applications += hits;
            totals.damage += damage;
            let skill = totals
                .skills
                .entry(skill_label.clone())
                .or_insert_with(|| SkillEntry {
                    name: skill_label,
                    ..Default::default()
                });
            skill.hits += hits;
            skill.damage += damage;
        }
    }

    let name_to_key: HashMap<&str, String> = input
        .players
        .iter()
        .filter(|p| !p.not_in_squad)
        .filter_map(|p| Some((p.name.as_deref()?, player_key(p)?)))
        .collect();

    for buff in input.targets.iter().flat_map(|t| t.buffs.iter()) {
        let Some(buff_id) = buff.id else {
            continue;
        };
        let Some(meta) = input.buff_map.get(&format!("b{}", buff_id)) else {
            continue;
        };
        if meta.classification.as_deref() != Some("Condition") {
            continue;
        }
        let Some(condition) = meta.name.clone().filter(|n| !n.is_empty()) else {
            continue;
        };
        result.meta.target_buff_entries_seen += 1;

        for (source, states) in &buff.states_per_source {
            let Some(key) = name_to_key.get(source.as_str()) else {
                continue;
            };
            result.meta.buff_state_sources_seen += 1;
            let applied = count_applied(states);
            if applied == 0 {
                continue;
            }
            result.meta.buff_state_applications_total += applied;

            let totals = result
                .player_conditions
                .entry(key.clone())
                .or_default()
                .entry(condition.clone())
                .or_default();
            *totals.applications_from_buffs.get_or_insert(0) += applied;

            let summary = result
                .summary
                .entry(condition.clone())
                .or_insert_with(|| ConditionSummary {
                    name: condition.clone(),
                    ..Default::default()
                });
            *summary.applications_from_buffs.get_or_insert(0) += applied;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_input() -> MetricsInput {
        serde_json::from_value(json!({
            "players": [
                {
                    "account": "Alpha.1234",
                    "name": "Alpha",
                    "totalDamageDist": [[
                        {"id": 736, "hits": 10, "connectedHits": 8, "totalDamage": 4000},
                        {"id": 5, "hits": 3, "totalDamage": 900},
                        {"id": 0, "hits": 99, "totalDamage": 99}
                    ], null]
                },
                {
                    "account": "Unknown",
                    "name": "Beta",
                    "totalDamageDist": [[
                        {"id": 1131, "hits": 4, "totalDamage": 1200}
                    ]]
                },
                {
                    "account": "Gamma.5678",
                    "name": "Gamma",
                    "notInSquad": true,
                    "totalDamageDist": [[{"id": 736, "hits": 50, "totalDamage": 50000}]]
                }
            ],
            "targets": [{
                "buffs": [{
                    "id": 736,
                    "statesPerSource": {
                        "Alpha": [[0, 1], [100, 0], [200, 2], [300, 0], [400, 1]],
                        "Stranger": [[10, 1]]
                    }
                }]
            }],
            "skillMap": {"s5": {"name": "Sword Strike"}, "1131": {"name": "Burning"}},
            "buffMap": {"b736": {"name": "Bleeding", "classification": "Condition"}}
        }))
        .unwrap()
    }

    #[test]
    fn test_aggregates_damage_dist_per_player() {
        let result = compute_metrics(&sample_input());

        let alpha = &result.player_conditions["Alpha.1234"]["Bleeding"];
        assert_eq!(alpha.applications, 8.0);
        assert_eq!(alpha.damage, 4000.0);
        // Unnamed skill is labelled with its buff name.
        assert_eq!(alpha.skills["Bleeding"].hits, 8.0);

        // Falls back to character name when account is unknown.
        let beta = &result.player_conditions["Beta"]["Burning"];
        assert_eq!(beta.applications, 4.0);

        assert!(!result.player_conditions.contains_key("Gamma.5678"));
        assert!(!result.summary.contains_key("Sword Strike"));
    }

    #[test]
    fn test_counts_applications_from_target_buff_states() {
        let result = compute_metrics(&sample_input());

        let alpha = &result.player_conditions["Alpha.1234"]["Bleeding"];
        assert_eq!(alpha.applications_from_buffs, Some(2));
        assert_eq!(result.summary["Bleeding"].applications_from_buffs, Some(2));
        assert_eq!(result.meta.target_buff_entries_seen, 1);
        assert_eq!(result.meta.buff_state_sources_seen, 1);
        assert_eq!(result.meta.buff_state_applications_total, 2);
    }

    #[test]
    fn test_empty_input() {
        let result = compute_metrics(&MetricsInput::default());
        assert!(result.player_conditions.is_empty());
        assert!(result.summary.is_empty());
        assert_eq!(result.meta, MetricsMeta::default());
    }

    #[test]
    fn test_count_applied_ignores_initial_sample() {
        assert_eq!(count_applied(&[(0.0, 3.0), (10.0, 4.0)]), 0);
        assert_eq!(count_applied(&[(5.0, 1.0), (6.0, 0.0), (7.0, 1.0)]), 2);
    }
}
