//! YAML rendering and config diffing for change previews.

use serde_json::{json, Value};

/// Renders a JSON value as YAML.
pub fn to_yaml(value: &Value) -> String {
    serde_yaml::to_string(value)
        .unwrap_or_else(|_| value.to_string())
        .trim_end()
        .to_string()
}

/// Parses YAML text into a JSON value. Mapping keys must be strings.
pub fn parse_yaml(text: &str) -> Result<Value, String> {
    serde_yaml::from_str::<Value>(text).map_err(|error| error.to_string())
}

/// Pure syntax check used by the validate_yaml tool: reports validity, the
/// parse error when invalid, and the parsed value when valid.
pub fn yaml_syntax_report(text: &str) -> Value {
    match parse_yaml(text) {
        Ok(parsed) => json!({"valid": true, "error": null, "parsed": parsed}),
        Err(error) => json!({"valid": false, "error": error, "parsed": null}),
    }
}

/// Human-readable diff between the current and proposed config, rendered
/// over their YAML forms.
pub fn diff_configs(old: &Value, new: &Value) -> String {
    let old_yaml = to_yaml(old);
    let new_yaml = to_yaml(new);
    if old_yaml == new_yaml {
        return "No changes detected.".to_string();
    }

    let old_lines: Vec<&str> = old_yaml.lines().collect();
    let new_lines: Vec<&str> = new_yaml.lines().collect();
    let keep = common_lines(&old_lines, &new_lines);

    let mut output = vec!["--- current".to_string(), "+++ proposed".to_string()];
    let (mut i, mut j) = (0, 0);
    for &(old_index, new_index) in &keep {
        while i < old_index {
            output.push(format!("-{}", old_lines[i]));
            i += 1;
        }
        while j < new_index {
            output.push(format!("+{}", new_lines[j]));
            j += 1;
        }
        output.push(format!(" {}", old_lines[old_index]));
        i = old_index + 1;
        j = new_index + 1;
    }
    while i < old_lines.len() {
        output.push(format!("-{}", old_lines[i]));
        i += 1;
    }
    while j < new_lines.len() {
        output.push(format!("+{}", new_lines[j]));
        j += 1;
    }
    output.join("\n")
}

/// Longest common subsequence over lines, as (old_index, new_index) pairs.
fn common_lines(old: &[&str], new: &[&str]) -> Vec<(usize, usize)> {
    let mut table = vec![vec![0usize; new.len() + 1]; old.len() + 1];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            table[i][j] = if old[i] == new[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }
    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::{diff_configs, to_yaml, yaml_syntax_report};
    use serde_json::json;

    #[test]
    fn yaml_rendering_is_block_style_without_trailing_newline() {
        let rendered = to_yaml(&json!({"alias": "Night", "mode": "single", "triggers": []}));
        assert!(rendered.contains("alias: Night"));
        assert!(rendered.contains("mode: single"));
        assert!(!rendered.ends_with('\n'));
    }

    #[test]
    fn syntax_report_round_trips_valid_yaml() {
        let report = yaml_syntax_report("alias: Test\nsequence:\n  - delay: 5\n");
        assert_eq!(report["valid"], json!(true));
        assert_eq!(report["parsed"]["alias"], json!("Test"));
        assert!(report["error"].is_null());
    }

    #[test]
    fn syntax_report_flags_broken_yaml() {
        let report = yaml_syntax_report("alias: [unclosed\n");
        assert_eq!(report["valid"], json!(false));
        assert!(report["error"].as_str().is_some());
        assert!(report["parsed"].is_null());
    }

    #[test]
    fn identical_configs_diff_to_no_changes() {
        let config = json!({"alias": "A", "mode": "single"});
        assert_eq!(diff_configs(&config, &config), "No changes detected.");
    }

    #[test]
    fn diff_marks_removed_and_added_lines() {
        let old = json!({"alias": "A", "mode": "single"});
        let new = json!({"alias": "A", "mode": "queued"});
        let diff = diff_configs(&old, &new);
        assert!(diff.contains("--- current"));
        assert!(diff.contains("+++ proposed"));
        assert!(diff.contains("-mode: single"));
        assert!(diff.contains("+mode: queued"));
        assert!(diff.contains(" alias: A"));
    }
}
