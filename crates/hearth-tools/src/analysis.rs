//! Rule-based analysis over the entity registry and automation configs.
//!
//! Pure functions, no I/O: the suggestion tools fetch registries and configs
//! through the client facade and hand plain JSON values in here. Outputs are
//! deterministic (sorted collections) so they can be asserted in tests.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};

fn entity_domain(entity_id: &str) -> &str {
    entity_id.split('.').next().unwrap_or("")
}

fn entity_id_of(entity: &Value) -> &str {
    entity.get("entity_id").and_then(Value::as_str).unwrap_or("")
}

fn area_id_of(entity: &Value) -> Option<&str> {
    entity
        .get("area_id")
        .and_then(Value::as_str)
        .filter(|area| !area.is_empty())
}

fn entity_has_device_class(entity: &Value, device_class: &str) -> bool {
    if entity.get("device_class").and_then(Value::as_str) == Some(device_class) {
        return true;
    }
    if entity.get("original_device_class").and_then(Value::as_str) == Some(device_class) {
        return true;
    }
    entity
        .get("attributes")
        .and_then(|attrs| attrs.get("device_class"))
        .and_then(Value::as_str)
        == Some(device_class)
}

fn friendly_label<'a>(entity: &'a Value) -> &'a str {
    entity
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .or_else(|| {
            entity
                .get("attributes")
                .and_then(|attrs| attrs.get("friendly_name"))
                .and_then(Value::as_str)
        })
        .unwrap_or_else(|| entity_id_of(entity))
}

fn area_name<'a>(areas: &'a [Value], area_id: Option<&str>) -> &'a str {
    let Some(area_id) = area_id else {
        return "Unknown area";
    };
    areas
        .iter()
        .find(|area| area.get("area_id").and_then(Value::as_str) == Some(area_id))
        .and_then(|area| area.get("name").and_then(Value::as_str))
        .unwrap_or("Unknown area")
}

/// Recursively collects every entity id referenced under an `entity_id` or
/// `entity` key, including comma-separated strings and lists.
pub fn collect_entity_ids(value: &Value, into: &mut BTreeSet<String>) {
    match value {
        Value::Object(entries) => {
            for (key, nested) in entries {
                if key == "entity_id" || key == "entity" {
                    match nested {
                        Value::String(raw) => {
                            for part in raw.split(',') {
                                let part = part.trim();
                                if part.contains('.') {
                                    into.insert(part.to_string());
                                }
                            }
                        }
                        Value::Array(items) => {
                            for item in items {
                                if let Some(raw) = item.as_str() {
                                    if raw.contains('.') {
                                        into.insert(raw.trim().to_string());
                                    }
                                }
                            }
                        }
                        _ => {}
                    }
                } else {
                    collect_entity_ids(nested, into);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_entity_ids(item, into);
            }
        }
        _ => {}
    }
}

fn covered_ids(automations: &[Value]) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    for automation in automations {
        collect_entity_ids(automation, &mut ids);
    }
    ids
}

/// Coverage report: which entities any automation references, overall and
/// per area (unassigned entities land under `_unassigned`).
pub fn analyze_coverage(entities: &[Value], automations: &[Value], areas: &[Value]) -> Value {
    let covered = covered_ids(automations);

    let all_ids: Vec<&str> = entities
        .iter()
        .map(entity_id_of)
        .filter(|id| !id.is_empty())
        .collect();
    let mut covered_list: Vec<&str> = all_ids
        .iter()
        .copied()
        .filter(|id| covered.contains(*id))
        .collect();
    let mut uncovered_list: Vec<&str> = all_ids
        .iter()
        .copied()
        .filter(|id| !covered.contains(*id))
        .collect();
    covered_list.sort_unstable();
    uncovered_list.sort_unstable();

    let total = all_ids.len();
    let percentage = if total == 0 {
        0.0
    } else {
        (covered_list.len() as f64 * 1000.0 / total as f64).round() / 10.0
    };

    let mut by_area = Map::new();
    for area in areas {
        let Some(area_id) = area.get("area_id").and_then(Value::as_str) else {
            continue;
        };
        let area_ids: Vec<&str> = entities
            .iter()
            .filter(|entity| area_id_of(entity) == Some(area_id))
            .map(entity_id_of)
            .filter(|id| !id.is_empty())
            .collect();
        let area_covered = area_ids.iter().filter(|id| covered.contains(**id)).count();
        let area_uncovered: Vec<&str> = area_ids
            .iter()
            .copied()
            .filter(|id| !covered.contains(*id))
            .collect();
        by_area.insert(
            area_id.to_string(),
            json!({
                "total": area_ids.len(),
                "covered": area_covered,
                "uncovered": area_uncovered,
            }),
        );
    }

    let known_areas: BTreeSet<&str> = areas
        .iter()
        .filter_map(|area| area.get("area_id").and_then(Value::as_str))
        .collect();
    let unassigned: Vec<&str> = entities
        .iter()
        .filter(|entity| match area_id_of(entity) {
            Some(area) => !known_areas.contains(area),
            None => true,
        })
        .map(entity_id_of)
        .filter(|id| !id.is_empty())
        .collect();
    if !unassigned.is_empty() {
        let unassigned_covered = unassigned.iter().filter(|id| covered.contains(**id)).count();
        let unassigned_uncovered: Vec<&str> = unassigned
            .iter()
            .copied()
            .filter(|id| !covered.contains(*id))
            .collect();
        by_area.insert(
            "_unassigned".to_string(),
            json!({
                "total": unassigned.len(),
                "covered": unassigned_covered,
                "uncovered": unassigned_uncovered,
            }),
        );
    }

    json!({
        "total_entities": total,
        "covered_entities": covered_list,
        "uncovered_entities": uncovered_list,
        "coverage_percentage": percentage,
        "by_area": by_area,
    })
}

fn suggestion_config(
    alias: &str,
    description: &str,
    triggers: Value,
    actions: Value,
    conditions: Option<Value>,
    mode: &str,
) -> Value {
    let mut config = Map::new();
    config.insert("alias".to_string(), json!(alias));
    config.insert("description".to_string(), json!(description));
    config.insert("mode".to_string(), json!(mode));
    config.insert("triggers".to_string(), triggers);
    config.insert("actions".to_string(), actions);
    if let Some(conditions) = conditions {
        config.insert("conditions".to_string(), conditions);
    }
    Value::Object(config)
}

fn suggestion(
    title: &str,
    description: &str,
    entity_ids: Vec<String>,
    area_id: Option<&str>,
    priority: &str,
    category: &str,
    config: Value,
) -> Value {
    json!({
        "title": title,
        "description": description,
        "entity_ids": entity_ids,
        "area_id": area_id,
        "priority": priority,
        "category": category,
        "suggested_config": config,
    })
}

/// Suggests automations that are missing for the registered entities.
///
/// Rules mirror the kinds of gaps a reviewer looks for by hand: motion
/// lighting, door/window alerts, battery and lock monitoring, schedules and
/// media scenes. Results are ordered high > medium > low priority.
pub fn generate_suggestions(
    entities: &[Value],
    automations: &[Value],
    areas: &[Value],
    target_area_id: Option<&str>,
    target_entity_id: Option<&str>,
) -> Vec<Value> {
    let covered = covered_ids(automations);
    let is_covered = |id: &str| covered.contains(id);

    let working: Vec<&Value> = entities
        .iter()
        .filter(|entity| match target_entity_id {
            Some(target) => entity_id_of(entity) == target,
            None => true,
        })
        .collect();

    // Area grouping; entities with no area live under the empty key.
    let mut area_entities: BTreeMap<String, Vec<&Value>> = BTreeMap::new();
    for entity in &working {
        let key = area_id_of(entity).unwrap_or("").to_string();
        area_entities.entry(key).or_default().push(entity);
    }
    if let Some(target) = target_area_id {
        area_entities.retain(|key, _| key == target);
    }

    let in_target_area = |entity: &Value| match target_area_id {
        Some(target) => area_id_of(entity) == Some(target),
        None => true,
    };

    let mut suggestions = Vec::new();

    // Motion sensor + light in the same area -> motion-activated lighting.
    for (area_key, area_ents) in &area_entities {
        let area_id = (!area_key.is_empty()).then_some(area_key.as_str());
        let motion_ids: Vec<String> = area_ents
            .iter()
            .filter(|e| entity_domain(entity_id_of(e)) == "binary_sensor")
            .filter(|e| entity_has_device_class(e, "motion"))
            .map(|e| entity_id_of(e).to_string())
            .collect();
        let light_ids: Vec<String> = area_ents
            .iter()
            .filter(|e| entity_domain(entity_id_of(e)) == "light")
            .map(|e| entity_id_of(e).to_string())
            .collect();
        if motion_ids.is_empty() || light_ids.is_empty() {
            continue;
        }
        let involved: Vec<String> = motion_ids.iter().chain(light_ids.iter()).cloned().collect();
        if involved.iter().all(|id| is_covered(id)) {
            continue;
        }
        let name = area_name(areas, area_id);
        let title = format!("Motion-activated lighting in {name}");
        let config = suggestion_config(
            &title,
            &format!("Automatically control lights in {name} based on motion."),
            json!([{"trigger": "state", "entity_id": &motion_ids, "to": "on"}]),
            json!([
                {"action": "light.turn_on", "target": {"entity_id": &light_ids}},
                {"wait_for_trigger": [
                    {"trigger": "state", "entity_id": &motion_ids, "to": "off", "for": {"minutes": 5}}
                ]},
                {"action": "light.turn_off", "target": {"entity_id": &light_ids}},
            ]),
            None,
            "restart",
        );
        suggestions.push(suggestion(
            &title,
            &format!(
                "Turn on lights when motion is detected in {name}, and turn them off after a period of no motion."
            ),
            involved,
            area_id,
            "high",
            "motion_lighting",
            config,
        ));
    }

    // Door sensor -> door-left-open alert.
    for (area_key, area_ents) in &area_entities {
        let area_id = (!area_key.is_empty()).then_some(area_key.as_str());
        for entity in area_ents {
            if entity_domain(entity_id_of(entity)) != "binary_sensor"
                || !entity_has_device_class(entity, "door")
            {
                continue;
            }
            let entity_id = entity_id_of(entity);
            if is_covered(entity_id) {
                continue;
            }
            let name = area_name(areas, area_id);
            let friendly = friendly_label(entity);
            let title = format!("Door left open alert: {friendly}");
            let config = suggestion_config(
                &title,
                &format!("Alert when {friendly} is left open too long."),
                json!([{"trigger": "state", "entity_id": entity_id, "to": "on", "for": {"minutes": 5}}]),
                json!([{
                    "action": "notify.persistent_notification",
                    "data": {
                        "title": "Door Left Open",
                        "message": format!("{friendly} has been open for 5 minutes."),
                    },
                }]),
                None,
                "single",
            );
            suggestions.push(suggestion(
                &title,
                &format!(
                    "Send a notification if {friendly} in {name} has been open for more than 5 minutes."
                ),
                vec![entity_id.to_string()],
                area_id,
                "medium",
                "door_alert",
                config,
            ));
        }
    }

    // Window sensor + climate in the same area -> pause climate while open.
    for (area_key, area_ents) in &area_entities {
        let area_id = (!area_key.is_empty()).then_some(area_key.as_str());
        let window_ids: Vec<String> = area_ents
            .iter()
            .filter(|e| entity_domain(entity_id_of(e)) == "binary_sensor")
            .filter(|e| entity_has_device_class(e, "window"))
            .map(|e| entity_id_of(e).to_string())
            .collect();
        let climate_ids: Vec<String> = area_ents
            .iter()
            .filter(|e| entity_domain(entity_id_of(e)) == "climate")
            .map(|e| entity_id_of(e).to_string())
            .collect();
        if window_ids.is_empty() || climate_ids.is_empty() {
            continue;
        }
        let involved: Vec<String> = window_ids.iter().chain(climate_ids.iter()).cloned().collect();
        if involved.iter().all(|id| is_covered(id)) {
            continue;
        }
        let name = area_name(areas, area_id);
        let title = format!("Turn off climate when window open in {name}");
        let config = suggestion_config(
            &title,
            &format!("Save energy by pausing climate when windows are open in {name}."),
            json!([{"trigger": "state", "entity_id": &window_ids, "to": "on"}]),
            json!([
                {"action": "climate.turn_off", "target": {"entity_id": &climate_ids}},
                {"wait_for_trigger": [
                    {"trigger": "state", "entity_id": &window_ids, "to": "off"}
                ]},
                {"action": "climate.turn_on", "target": {"entity_id": &climate_ids}},
            ]),
            None,
            "restart",
        );
        suggestions.push(suggestion(
            &title,
            &format!(
                "Turn off climate control in {name} when a window is opened to save energy, and restore it when the window is closed."
            ),
            involved,
            area_id,
            "high",
            "window_climate",
            config,
        ));
    }

    // Battery sensors -> low battery alerts.
    for entity in &working {
        if entity_domain(entity_id_of(entity)) != "sensor"
            || !entity_has_device_class(entity, "battery")
            || !in_target_area(entity)
        {
            continue;
        }
        let entity_id = entity_id_of(entity);
        if is_covered(entity_id) {
            continue;
        }
        let friendly = friendly_label(entity);
        let title = format!("Low battery alert: {friendly}");
        let config = suggestion_config(
            &title,
            &format!("Alert when {friendly} battery is low."),
            json!([{"trigger": "numeric_state", "entity_id": entity_id, "below": 20}]),
            json!([{
                "action": "notify.persistent_notification",
                "data": {
                    "title": "Low Battery Warning",
                    "message": format!("{friendly} battery is below 20%."),
                },
            }]),
            None,
            "single",
        );
        suggestions.push(suggestion(
            &title,
            &format!("Notify when {friendly} battery drops below 20%."),
            vec![entity_id.to_string()],
            area_id_of(entity),
            "medium",
            "battery_alert",
            config,
        ));
    }

    // Locks -> auto-lock plus unlock notification.
    for entity in &working {
        if entity_domain(entity_id_of(entity)) != "lock" || !in_target_area(entity) {
            continue;
        }
        let entity_id = entity_id_of(entity);
        if is_covered(entity_id) {
            continue;
        }
        let friendly = friendly_label(entity);
        let auto_title = format!("Auto-lock: {friendly}");
        let auto_config = suggestion_config(
            &auto_title,
            &format!("Auto-lock {friendly} after 10 minutes."),
            json!([{"trigger": "state", "entity_id": entity_id, "to": "unlocked", "for": {"minutes": 10}}]),
            json!([
                {"action": "lock.lock", "target": {"entity_id": entity_id}},
                {
                    "action": "notify.persistent_notification",
                    "data": {
                        "title": "Auto-Locked",
                        "message": format!("{friendly} was automatically locked after 10 minutes."),
                    },
                },
            ]),
            None,
            "single",
        );
        suggestions.push(suggestion(
            &auto_title,
            &format!("Automatically lock {friendly} after it has been unlocked for 10 minutes."),
            vec![entity_id.to_string()],
            area_id_of(entity),
            "high",
            "lock_auto",
            auto_config,
        ));

        let notify_title = format!("Unlock notification: {friendly}");
        let notify_config = suggestion_config(
            &notify_title,
            &format!("Notify when {friendly} is unlocked."),
            json!([{"trigger": "state", "entity_id": entity_id, "to": "unlocked"}]),
            json!([{
                "action": "notify.persistent_notification",
                "data": {
                    "title": "Lock Unlocked",
                    "message": format!("{friendly} has been unlocked."),
                },
            }]),
            None,
            "single",
        );
        suggestions.push(suggestion(
            &notify_title,
            &format!("Send a notification whenever {friendly} is unlocked."),
            vec![entity_id.to_string()],
            area_id_of(entity),
            "medium",
            "lock_notification",
            notify_config,
        ));
    }

    // Climate entities -> presence-based control.
    for entity in &working {
        if entity_domain(entity_id_of(entity)) != "climate" || !in_target_area(entity) {
            continue;
        }
        let entity_id = entity_id_of(entity);
        if is_covered(entity_id) {
            continue;
        }
        let friendly = friendly_label(entity);
        let title = format!("Presence-based climate: {friendly}");
        let config = suggestion_config(
            &title,
            &format!("Control {friendly} based on presence."),
            json!([{"trigger": "state", "entity_id": "zone.home", "attribute": "persons"}]),
            json!([{
                "action": "climate.set_hvac_mode",
                "target": {"entity_id": entity_id},
                "data": {"hvac_mode": "off"},
            }]),
            Some(json!([{"condition": "numeric_state", "entity_id": "zone.home", "below": 1}])),
            "single",
        );
        suggestions.push(suggestion(
            &title,
            &format!(
                "Control {friendly} based on home occupancy. Turn off when everyone leaves, restore when someone arrives."
            ),
            vec![entity_id.to_string()],
            area_id_of(entity),
            "medium",
            "climate_presence",
            config,
        ));
    }

    // Lights with no automation -> sunset schedule.
    for entity in &working {
        if entity_domain(entity_id_of(entity)) != "light" || !in_target_area(entity) {
            continue;
        }
        let entity_id = entity_id_of(entity);
        if is_covered(entity_id) {
            continue;
        }
        let friendly = friendly_label(entity);
        let title = format!("Scheduled lighting: {friendly}");
        let config = suggestion_config(
            &title,
            &format!("Schedule {friendly} to turn on at sunset and off at 23:00."),
            json!([{"trigger": "sun", "event": "sunset"}]),
            json!([
                {"action": "light.turn_on", "target": {"entity_id": entity_id}},
                {"delay": {"hours": 4}},
                {"action": "light.turn_off", "target": {"entity_id": entity_id}},
            ]),
            None,
            "single",
        );
        suggestions.push(suggestion(
            &title,
            &format!(
                "Turn {friendly} on at sunset and off at a set time, providing automatic daily lighting."
            ),
            vec![entity_id.to_string()],
            area_id_of(entity),
            "low",
            "light_schedule",
            config,
        ));
    }

    // Media players -> dim lights in the same area while playing.
    for entity in &working {
        if entity_domain(entity_id_of(entity)) != "media_player" || !in_target_area(entity) {
            continue;
        }
        let entity_id = entity_id_of(entity);
        if is_covered(entity_id) {
            continue;
        }
        let friendly = friendly_label(entity);
        let player_area = area_id_of(entity);
        let same_area_lights: Vec<String> = entities
            .iter()
            .filter(|e| entity_domain(entity_id_of(e)) == "light")
            .filter(|e| player_area.is_some() && area_id_of(e) == player_area)
            .map(|e| entity_id_of(e).to_string())
            .collect();

        if same_area_lights.is_empty() {
            let title = format!("Media playback notification: {friendly}");
            let config = suggestion_config(
                &title,
                &format!("Log when {friendly} playback state changes."),
                json!([{"trigger": "state", "entity_id": entity_id, "to": "playing"}]),
                json!([{
                    "action": "notify.persistent_notification",
                    "data": {
                        "title": "Media Playing",
                        "message": format!("{friendly} started playing."),
                    },
                }]),
                None,
                "single",
            );
            suggestions.push(suggestion(
                &title,
                &format!("Notify when {friendly} starts or stops playback."),
                vec![entity_id.to_string()],
                player_area,
                "low",
                "media_notification",
                config,
            ));
            continue;
        }

        let name = area_name(areas, player_area);
        let mut involved = vec![entity_id.to_string()];
        involved.extend(same_area_lights.iter().cloned());
        let title = format!("Media lighting scene: {name}");
        let config = suggestion_config(
            &title,
            &format!("Adjust lighting in {name} based on media playback."),
            json!([{"trigger": "state", "entity_id": entity_id, "to": "playing"}]),
            json!([
                {"action": "light.turn_on", "target": {"entity_id": &same_area_lights}, "data": {"brightness_pct": 20}},
                {"wait_for_trigger": [
                    {"trigger": "state", "entity_id": entity_id, "from": "playing"}
                ]},
                {"action": "light.turn_on", "target": {"entity_id": &same_area_lights}, "data": {"brightness_pct": 100}},
            ]),
            None,
            "restart",
        );
        suggestions.push(suggestion(
            &title,
            &format!(
                "Dim lights in {name} when {friendly} starts playing, and restore them when playback stops."
            ),
            involved,
            player_area,
            "low",
            "media_lighting",
            config,
        ));
    }

    let priority_rank = |value: &Value| match value.get("priority").and_then(Value::as_str) {
        Some("high") => 0,
        Some("medium") => 1,
        Some("low") => 2,
        _ => 9,
    };
    suggestions.sort_by_key(priority_rank);
    suggestions
}

struct AutomationFacts {
    id: String,
    alias: String,
    trigger_entity_ids: BTreeSet<String>,
    action_targets: Vec<(String, String)>,
    time_triggers: Vec<String>,
}

fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => Vec::new(),
    }
}

fn string_or_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(raw)) => vec![raw.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn automation_facts(automation: &Value) -> AutomationFacts {
    let id = automation
        .get("id")
        .and_then(Value::as_str)
        .or_else(|| automation.get("alias").and_then(Value::as_str))
        .unwrap_or("unknown")
        .to_string();
    let alias = automation
        .get("alias")
        .and_then(Value::as_str)
        .unwrap_or(&id)
        .to_string();

    let triggers = as_list(
        automation
            .get("triggers")
            .or_else(|| automation.get("trigger")),
    );
    let actions = as_list(
        automation
            .get("actions")
            .or_else(|| automation.get("action")),
    );

    let mut trigger_entity_ids = BTreeSet::new();
    let mut time_triggers = Vec::new();
    for trigger in &triggers {
        trigger_entity_ids.extend(string_or_list(trigger.get("entity_id")));
        let platform = trigger
            .get("trigger")
            .or_else(|| trigger.get("platform"))
            .and_then(Value::as_str);
        if platform == Some("time") {
            if let Some(at) = trigger.get("at").and_then(Value::as_str) {
                time_triggers.push(at.to_string());
            }
        }
    }

    let mut action_targets = Vec::new();
    for action in &actions {
        let service = action
            .get("action")
            .or_else(|| action.get("service"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let target = action
            .get("target")
            .and_then(|target| target.get("entity_id"));
        let fallback = action
            .get("data")
            .or_else(|| action.get("service_data"))
            .and_then(|data| data.get("entity_id"));
        let direct = action.get("entity_id");
        let target_ids = [target, fallback, direct]
            .into_iter()
            .map(string_or_list)
            .find(|ids| !ids.is_empty())
            .unwrap_or_default();
        for entity_id in target_ids {
            action_targets.push((entity_id, service.clone()));
        }
    }

    AutomationFacts {
        id,
        alias,
        trigger_entity_ids,
        action_targets,
        time_triggers,
    }
}

fn service_verb(service: &str) -> &str {
    service.rsplit('.').next().unwrap_or(service)
}

fn opposing_verbs(a: &str, b: &str) -> bool {
    matches!(
        (a, b),
        ("turn_on", "turn_off")
            | ("turn_off", "turn_on")
            | ("lock", "unlock")
            | ("unlock", "lock")
            | ("open", "close")
            | ("close", "open")
    )
}

fn time_to_minutes(time: &str) -> Option<i64> {
    let mut parts = time.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    Some(hours * 60 + minutes)
}

/// Flags automation pairs that may interfere: shared trigger entities,
/// opposing actions on the same target, and near-simultaneous time triggers
/// hitting the same entities.
pub fn detect_conflicts(automations: &[Value]) -> Vec<Value> {
    let facts: Vec<AutomationFacts> = automations.iter().map(automation_facts).collect();
    let mut conflicts = Vec::new();

    for i in 0..facts.len() {
        for j in (i + 1)..facts.len() {
            let (a, b) = (&facts[i], &facts[j]);

            let common: Vec<&String> =
                a.trigger_entity_ids.intersection(&b.trigger_entity_ids).collect();
            if !common.is_empty() {
                let listed = common
                    .iter()
                    .map(|entity| entity.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                conflicts.push(json!({
                    "type": "same_trigger",
                    "description": format!(
                        "Automations '{}' and '{}' are both triggered by the same entity: {listed}. They may interfere with each other.",
                        a.alias, b.alias
                    ),
                    "automation_ids": [a.id.as_str(), b.id.as_str()],
                    "severity": "warning",
                }));
            }

            for (a_target, a_service) in &a.action_targets {
                for (b_target, b_service) in &b.action_targets {
                    if a_target == b_target
                        && opposing_verbs(service_verb(a_service), service_verb(b_service))
                    {
                        conflicts.push(json!({
                            "type": "opposing_actions",
                            "description": format!(
                                "Automations '{}' and '{}' perform opposing actions ({a_service} vs {b_service}) on entity {a_target}. This may cause flickering or race conditions.",
                                a.alias, b.alias
                            ),
                            "automation_ids": [a.id.as_str(), b.id.as_str()],
                            "severity": "error",
                        }));
                    }
                }
            }

            for time_a in &a.time_triggers {
                for time_b in &b.time_triggers {
                    let (Some(minutes_a), Some(minutes_b)) =
                        (time_to_minutes(time_a), time_to_minutes(time_b))
                    else {
                        continue;
                    };
                    if (minutes_a - minutes_b).abs() > 5 {
                        continue;
                    }
                    let a_targets: BTreeSet<&String> =
                        a.action_targets.iter().map(|(id, _)| id).collect();
                    let b_targets: BTreeSet<&String> =
                        b.action_targets.iter().map(|(id, _)| id).collect();
                    let shared: Vec<&str> = a_targets
                        .intersection(&b_targets)
                        .map(|id| id.as_str())
                        .collect();
                    if shared.is_empty() {
                        continue;
                    }
                    conflicts.push(json!({
                        "type": "overlapping_time",
                        "description": format!(
                            "Automations '{}' and '{}' fire within 5 minutes of each other ({time_a} vs {time_b}) and both target: {}.",
                            a.alias, b.alias, shared.join(", ")
                        ),
                        "automation_ids": [a.id.as_str(), b.id.as_str()],
                        "severity": "warning",
                    }));
                }
            }
        }
    }

    conflicts
}

/// Suggests a Lovelace layout: one view per area with domain-appropriate
/// cards, plus an "Other" view for unassigned entities.
pub fn suggest_dashboard_layout(
    entities: &[Value],
    areas: &[Value],
    target_area_id: Option<&str>,
) -> Value {
    let mut views = Vec::new();

    for area in areas {
        let Some(area_id) = area.get("area_id").and_then(Value::as_str) else {
            continue;
        };
        if let Some(target) = target_area_id {
            if area_id != target {
                continue;
            }
        }
        let name = area
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(area_id);

        let area_ents: Vec<&Value> = entities
            .iter()
            .filter(|entity| area_id_of(entity) == Some(area_id))
            .collect();
        if area_ents.is_empty() {
            continue;
        }

        let cards = cards_for(&group_by_domain(&area_ents), name);
        views.push(json!({
            "title": name,
            "path": area_id.replace(' ', "_"),
            "cards": cards,
        }));
    }

    if target_area_id.is_none() {
        let known_areas: BTreeSet<&str> = areas
            .iter()
            .filter_map(|area| area.get("area_id").and_then(Value::as_str))
            .collect();
        let unassigned: Vec<&Value> = entities
            .iter()
            .filter(|entity| match area_id_of(entity) {
                Some(area) => !known_areas.contains(area),
                None => true,
            })
            .collect();
        if !unassigned.is_empty() {
            let mut cards = Vec::new();
            for (domain, ids) in group_by_domain(&unassigned) {
                cards.push(json!({
                    "type": "entities",
                    "title": title_case(&domain),
                    "entities": ids,
                }));
            }
            if !cards.is_empty() {
                views.push(json!({"title": "Other", "path": "other", "cards": cards}));
            }
        }
    }

    json!({"title": "Home", "views": views})
}

fn group_by_domain(entities: &[&Value]) -> BTreeMap<String, Vec<String>> {
    let mut by_domain: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entity in entities {
        let entity_id = entity_id_of(entity);
        let domain = entity_domain(entity_id);
        if !domain.is_empty() {
            by_domain
                .entry(domain.to_string())
                .or_default()
                .push(entity_id.to_string());
        }
    }
    by_domain
}

fn cards_for(by_domain: &BTreeMap<String, Vec<String>>, area_label: &str) -> Vec<Value> {
    let mut cards = Vec::new();
    for (domain, ids) in by_domain {
        match domain.as_str() {
            "light" => {
                for id in ids {
                    cards.push(json!({"type": "light", "entity": id}));
                }
            }
            "climate" => {
                for id in ids {
                    cards.push(json!({"type": "thermostat", "entity": id}));
                }
            }
            "sensor" => {
                cards.push(json!({
                    "type": "glance",
                    "title": format!("{area_label} Sensors"),
                    "entities": ids,
                }));
            }
            "camera" => {
                for id in ids {
                    cards.push(json!({"type": "picture-entity", "entity": id, "camera_image": id}));
                }
            }
            "media_player" => {
                for id in ids {
                    cards.push(json!({"type": "media-control", "entity": id}));
                }
            }
            "weather" => {
                for id in ids {
                    cards.push(json!({"type": "weather-forecast", "entity": id}));
                }
            }
            "binary_sensor" | "person" => {
                for id in ids {
                    cards.push(json!({"type": "entity", "entity": id}));
                }
            }
            _ => {
                cards.push(json!({
                    "type": "entities",
                    "title": format!("{area_label} {}", title_case(domain)),
                    "entities": ids,
                }));
            }
        }
    }
    cards
}

fn title_case(domain: &str) -> String {
    domain
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::{
        analyze_coverage, collect_entity_ids, detect_conflicts, generate_suggestions,
        suggest_dashboard_layout,
    };
    use serde_json::{json, Value};
    use std::collections::BTreeSet;

    fn entity(entity_id: &str, area_id: Option<&str>, device_class: Option<&str>) -> Value {
        let mut value = json!({"entity_id": entity_id});
        if let Some(area_id) = area_id {
            value["area_id"] = json!(area_id);
        }
        if let Some(device_class) = device_class {
            value["device_class"] = json!(device_class);
        }
        value
    }

    fn living_room() -> Vec<Value> {
        vec![json!({"area_id": "living_room", "name": "Living Room"})]
    }

    #[test]
    fn collect_entity_ids_handles_strings_lists_and_commas() {
        let config = json!({
            "triggers": [{"trigger": "state", "entity_id": "binary_sensor.motion, binary_sensor.door"}],
            "actions": [{"action": "light.turn_on", "target": {"entity_id": ["light.a", "light.b"]}}],
        });
        let mut ids = BTreeSet::new();
        collect_entity_ids(&config, &mut ids);
        let expected: BTreeSet<String> = [
            "binary_sensor.motion",
            "binary_sensor.door",
            "light.a",
            "light.b",
        ]
        .iter()
        .map(|id| id.to_string())
        .collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn coverage_separates_covered_and_uncovered_by_area() {
        let entities = vec![
            entity("light.sofa", Some("living_room"), None),
            entity("light.hall", None, None),
        ];
        let automations = vec![json!({
            "alias": "Evening",
            "actions": [{"action": "light.turn_on", "target": {"entity_id": "light.sofa"}}],
        })];
        let report = analyze_coverage(&entities, &automations, &living_room());
        assert_eq!(report["total_entities"], json!(2));
        assert_eq!(report["covered_entities"], json!(["light.sofa"]));
        assert_eq!(report["uncovered_entities"], json!(["light.hall"]));
        assert_eq!(report["coverage_percentage"], json!(50.0));
        assert_eq!(report["by_area"]["living_room"]["covered"], json!(1));
        assert_eq!(
            report["by_area"]["_unassigned"]["uncovered"],
            json!(["light.hall"])
        );
    }

    #[test]
    fn motion_and_light_in_same_area_suggests_motion_lighting() {
        let entities = vec![
            entity("binary_sensor.lr_motion", Some("living_room"), Some("motion")),
            entity("light.lr_lamp", Some("living_room"), None),
        ];
        let suggestions = generate_suggestions(&entities, &[], &living_room(), None, None);
        let motion = suggestions
            .iter()
            .find(|s| s["category"] == json!("motion_lighting"))
            .expect("motion lighting suggestion");
        assert_eq!(
            motion["title"],
            json!("Motion-activated lighting in Living Room")
        );
        assert_eq!(motion["priority"], json!("high"));
        let config = &motion["suggested_config"];
        assert_eq!(config["mode"], json!("restart"));
        assert_eq!(
            config["triggers"][0]["entity_id"],
            json!(["binary_sensor.lr_motion"])
        );
    }

    #[test]
    fn covered_entities_produce_no_suggestions() {
        let entities = vec![entity("lock.front_door", None, None)];
        let automations = vec![json!({
            "alias": "Night lock",
            "actions": [{"action": "lock.lock", "target": {"entity_id": "lock.front_door"}}],
        })];
        let suggestions = generate_suggestions(&entities, &automations, &[], None, None);
        assert!(suggestions
            .iter()
            .all(|s| !s["category"].as_str().unwrap_or("").starts_with("lock_")));
    }

    #[test]
    fn suggestions_are_sorted_by_priority() {
        let entities = vec![
            entity("light.porch", None, None),
            entity("lock.front_door", None, None),
        ];
        let suggestions = generate_suggestions(&entities, &[], &[], None, None);
        let priorities: Vec<&str> = suggestions
            .iter()
            .filter_map(|s| s["priority"].as_str())
            .collect();
        let mut sorted = priorities.clone();
        sorted.sort_by_key(|p| match *p {
            "high" => 0,
            "medium" => 1,
            _ => 2,
        });
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn target_entity_narrows_suggestions() {
        let entities = vec![
            entity("light.porch", None, None),
            entity("lock.front_door", None, None),
        ];
        let suggestions =
            generate_suggestions(&entities, &[], &[], None, Some("light.porch"));
        assert!(suggestions
            .iter()
            .all(|s| s["entity_ids"] == json!(["light.porch"])));
    }

    #[test]
    fn shared_trigger_and_opposing_actions_are_flagged() {
        let automations = vec![
            json!({
                "id": "one",
                "alias": "Motion on",
                "triggers": [{"trigger": "state", "entity_id": "binary_sensor.motion"}],
                "actions": [{"action": "light.turn_on", "target": {"entity_id": "light.lamp"}}],
            }),
            json!({
                "id": "two",
                "alias": "Motion off",
                "triggers": [{"trigger": "state", "entity_id": "binary_sensor.motion"}],
                "actions": [{"action": "light.turn_off", "target": {"entity_id": "light.lamp"}}],
            }),
        ];
        let conflicts = detect_conflicts(&automations);
        let kinds: BTreeSet<&str> = conflicts
            .iter()
            .filter_map(|c| c["type"].as_str())
            .collect();
        assert!(kinds.contains("same_trigger"));
        assert!(kinds.contains("opposing_actions"));
        let opposing = conflicts
            .iter()
            .find(|c| c["type"] == json!("opposing_actions"))
            .expect("opposing conflict");
        assert_eq!(opposing["severity"], json!("error"));
        assert_eq!(opposing["automation_ids"], json!(["one", "two"]));
    }

    #[test]
    fn close_time_triggers_on_shared_targets_are_flagged() {
        let automations = vec![
            json!({
                "id": "a",
                "alias": "Morning A",
                "triggers": [{"trigger": "time", "at": "07:00:00"}],
                "actions": [{"action": "switch.turn_on", "entity_id": "switch.coffee"}],
            }),
            json!({
                "id": "b",
                "alias": "Morning B",
                "triggers": [{"trigger": "time", "at": "07:03:00"}],
                "actions": [{"action": "switch.turn_off", "entity_id": "switch.coffee"}],
            }),
        ];
        let conflicts = detect_conflicts(&automations);
        assert!(conflicts
            .iter()
            .any(|c| c["type"] == json!("overlapping_time")));
    }

    #[test]
    fn dashboard_layout_groups_by_area_with_domain_cards() {
        let entities = vec![
            entity("light.sofa", Some("living_room"), None),
            entity("sensor.lr_temp", Some("living_room"), None),
            entity("switch.unsorted", None, None),
        ];
        let layout = suggest_dashboard_layout(&entities, &living_room(), None);
        let views = layout["views"].as_array().expect("views");
        assert_eq!(views.len(), 2);
        assert_eq!(views[0]["title"], json!("Living Room"));
        let cards = views[0]["cards"].as_array().expect("cards");
        assert!(cards.iter().any(|c| c["type"] == json!("light")));
        assert!(cards.iter().any(|c| c["type"] == json!("glance")));
        assert_eq!(views[1]["title"], json!("Other"));
        assert_eq!(views[1]["cards"][0]["entities"], json!(["switch.unsorted"]));
    }

    #[test]
    fn target_area_restricts_layout() {
        let entities = vec![
            entity("light.sofa", Some("living_room"), None),
            entity("switch.unsorted", None, None),
        ];
        let layout = suggest_dashboard_layout(&entities, &living_room(), Some("living_room"));
        let views = layout["views"].as_array().expect("views");
        assert_eq!(views.len(), 1);
        assert_eq!(views[0]["title"], json!("Living Room"));
    }
}
