//! Integration test suite for the `dq` CLI
use assert_cmd::Command;

const INVENTORY: &str = "tests/data/inventory.json";

/// Helper function to run the `dq` binary with the given arguments and
/// return a [`assert_cmd::assert::Assert`].
fn run_main(args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = Command::cargo_bin("dq").expect("Failed to find main binary");
    cmd.args(args);
    cmd.assert()
}

/// Successful run's STDOUT as a string.
fn stdout_of(args: &[&str]) -> String {
    let assert = run_main(args).success().code(0);
    String::from_utf8(assert.get_output().stdout.clone())
        .expect("Invalid UTF-8 output")
}

/// Failed run's STDERR as a string.
fn stderr_of_failure(args: &[&str]) -> String {
    let assert = run_main(args).failure().code(1);
    String::from_utf8(assert.get_output().stderr.clone())
        .expect("Invalid UTF-8 output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::io::Write;

    /// Item names of compact, one-document-per-line output.
    fn items(output: &str) -> Vec<String> {
        output
            .lines()
            .map(|line| {
                let doc: Value =
                    serde_json::from_str(line).expect("Failed to parse output JSON");
                doc["item"].as_str().expect("missing item").to_string()
            })
            .collect()
    }

    #[test]
    fn find_prints_matches_in_order() {
        let output = stdout_of(&["--compact", r#"{"qty": {"$gt": 50}}"#, INVENTORY]);
        assert_eq!(items(&output), vec!["paper", "planner"]);
    }

    #[test]
    fn auto_flatten_query() {
        let output = stdout_of(&["--compact", r#"{"instock.qty": 15}"#, INVENTORY]);
        assert_eq!(items(&output), vec!["journal", "postcard"]);
    }

    #[test]
    fn pretty_output_parses_as_json() {
        let output = stdout_of(&[r#"{"item": "journal"}"#, INVENTORY]);
        let doc: Value = serde_json::from_str(output.trim())
            .expect("Failed to parse output JSON");
        assert_eq!(doc["qty"], json!(25));
        assert!(output.lines().count() > 1);
    }

    #[test]
    fn no_matches_prints_nothing() {
        let output = stdout_of(&[r#"{"item": "pencil"}"#, INVENTORY]);
        assert!(
            output.trim().is_empty(),
            "Expected no output for no matches, got: {output:?}"
        );
    }

    #[test]
    fn count_matches() {
        let output = stdout_of(&["--count", r#"{"tags": "red"}"#, INVENTORY]);
        assert_eq!(output.trim(), "4");
    }

    #[test]
    fn first_match_only() {
        let output = stdout_of(&["--first", "--compact", r#"{"instock.wh": "C"}"#, INVENTORY]);
        assert_eq!(items(&output), vec!["journal"]);
    }

    #[test]
    fn evaluate_prints_booleans() {
        let output =
            stdout_of(&["--evaluate", "--compact", r#"{"qty": {"$lt": 30}}"#, INVENTORY]);
        let results: Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(results, json!([true, false, false, false, false]));
    }

    #[test]
    fn logical_query() {
        let output = stdout_of(&[
            "--compact",
            r#"{"$or": [{"qty": {"$lt": 30}}, {"tags": {"$size": 1}}]}"#,
            INVENTORY,
        ]);
        assert_eq!(items(&output), vec!["journal", "postcard"]);
    }

    #[test]
    fn unknown_operator_fails() {
        let stderr = stderr_of_failure(&[r#"{"qty": {"$unknownOp": 1}}"#, INVENTORY]);
        assert!(stderr.contains("$unknownOp"), "stderr: {stderr}");
    }

    #[test]
    fn non_object_query_fails() {
        let stderr = stderr_of_failure(&["[1, 2]", INVENTORY]);
        assert!(stderr.contains("expected an object"), "stderr: {stderr}");
    }

    #[test]
    fn invalid_json_query_fails() {
        let stderr = stderr_of_failure(&[r#"{"qty": "#, INVENTORY]);
        assert!(stderr.contains("Failed to parse query"), "stderr: {stderr}");
    }

    #[test]
    fn nonexistent_file() {
        run_main(&["{}", "tests/data/does-not-exist.json"]).failure();
    }

    #[test]
    fn reads_stdin() {
        let mut cmd = Command::cargo_bin("dq").expect("Failed to find main binary");
        let assert = cmd
            .args(["--count", r#"{"a": {"$exists": true}}"#])
            .write_stdin(r#"[{"a": 1}, {"b": 2}, {"a": null}]"#)
            .assert()
            .success();
        let output = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
        assert_eq!(output.trim(), "2");
    }

    #[test]
    fn yaml_input_with_root() {
        let output = stdout_of(&[
            "--count",
            "--root",
            "store.items",
            r#"{"qty": {"$gte": 50}}"#,
            "tests/data/store.yaml",
        ]);
        assert_eq!(output.trim(), "2");
    }

    #[test]
    fn non_array_input_fails() {
        let stderr = stderr_of_failure(&["{}", "tests/data/store.yaml"]);
        assert!(stderr.contains("--root"), "stderr: {stderr}");
    }

    #[test]
    fn missing_root_fails() {
        let stderr = stderr_of_failure(&["--root", "nope", "{}", INVENTORY]);
        assert!(stderr.contains("nope"), "stderr: {stderr}");
    }

    #[test]
    fn cbor_input_by_extension() {
        let mut file = tempfile::Builder::new()
            .suffix(".cbor")
            .tempfile()
            .expect("Failed to create temp file");
        let mut bytes = Vec::new();
        ciborium::into_writer(&json!([{"n": 1}, {"n": 2}, {"n": 3}]), &mut bytes).unwrap();
        file.write_all(&bytes).unwrap();

        let path = file.path().to_str().unwrap();
        let output = stdout_of(&["--count", r#"{"n": {"$mod": [2, 1]}}"#, path]);
        assert_eq!(output.trim(), "2");
    }

    #[test]
    fn msgpack_input_with_explicit_format() {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        let bytes = rmp_serde::to_vec_named(&json!([{"tag": "x"}, {"tag": "y"}])).unwrap();
        file.write_all(&bytes).unwrap();

        let path = file.path().to_str().unwrap();
        let output = stdout_of(&["--format", "msgpack", "--count", r#"{"tag": "y"}"#, path]);
        assert_eq!(output.trim(), "1");
    }

    #[test]
    fn cached_operator_gives_same_results() {
        let query = r#"{"item": {"$regex": "^p"}}"#;
        let plain = stdout_of(&["--compact", query, INVENTORY]);
        let cached = stdout_of(&["--compact", "--cache", "$regex", "--cache-capacity", "2", query, INVENTORY]);
        assert_eq!(plain, cached);
        assert_eq!(items(&cached), vec!["paper", "planner", "postcard"]);
    }

    #[test]
    fn caching_unknown_operator_fails() {
        let stderr = stderr_of_failure(&["--cache", "$nope", "{}", INVENTORY]);
        assert!(stderr.contains("$nope"), "stderr: {stderr}");
    }

    #[test]
    fn generate_shell_completions() {
        let output = stdout_of(&["generate", "shell", "bash"]);
        assert!(output.contains("dq"));
    }

    #[test]
    fn generate_man_pages() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let out = dir.path().to_str().unwrap();
        stdout_of(&["generate", "man", "--output-dir", out]);
        assert!(dir.path().join("dq.1").exists());
        assert!(dir.path().join("dq-generate.1").exists());
    }
}
