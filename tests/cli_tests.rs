use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const TRIANGLE: &str = r#"# a single internal cycle fed by one exchange
EX: -> A [0, 10]
R1: A -> B
R2: B -> C
R3: C -> A
OUT: C -> [0, 10]
"#;

const TWO_LOOPS: &str = r#"EX: -> A [0, 10]
R1: A -> B
R2: B -> A
R3: A -> C
R4: C -> D
R5: D -> C
OUT: D -> [0, 10]
"#;

// Helper function to create a temporary model file
fn create_model_file(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("model.rxn");
    fs::write(&file_path, content).expect("Failed to write model file");
    (temp_dir, file_path)
}

// Helper function to run the loopless binary
fn run_loopless(args: &[&str], input: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_loopless"))
        .arg(args[0])
        .arg(input)
        .args(&args[1..])
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run loopless")
}

fn run_augment(input: &Path, output: &Path, extra: &[&str]) -> Output {
    let output = output.to_str().expect("Temp path should be UTF-8");
    let mut args = vec!["augment", "--output", output];
    args.extend_from_slice(extra);
    run_loopless(&args, input)
}

#[cfg(test)]
mod augment_cli_tests {
    use super::*;

    /// Default run computes the null space in-process and writes a complete LP file
    #[test]
    fn test_augment_writes_lp_file() {
        let (temp_dir, input) = create_model_file(TRIANGLE);
        let lp_path = temp_dir.path().join("model.lp");

        let output = run_augment(&input, &lp_path, &[]);
        assert!(
            output.status.success(),
            "Command should succeed. stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        let lp = fs::read_to_string(&lp_path).expect("Failed to read LP file");
        assert!(lp.starts_with("\\ "), "LP file should open with a comment");
        assert!(lp.contains("Subject To"));
        assert!(lp.contains("Binaries"));
        for id in ["R1", "R2", "R3"] {
            assert!(lp.contains(&format!(" a_{id}\n")), "indicator for {id} missing");
            assert!(lp.contains(&format!("g_{id}")), "energy for {id} missing");
        }
        assert!(!lp.contains("a_EX"), "exchange reactions get no indicator");
        assert!(lp.trim_end().ends_with("End"));

        let summary = String::from_utf8_lossy(&output.stdout);
        assert!(summary.contains("Loop-law reactions"));
    }

    /// A precomputed basis selects level 3 and is served unchanged
    #[test]
    fn test_augment_with_basis_file() {
        let (temp_dir, input) = create_model_file(TRIANGLE);
        let basis = temp_dir.path().join("model.basis");
        fs::write(&basis, "R1 0 1\nR2 0 1\nR3 0 1\n").expect("Failed to write basis file");
        let lp_path = temp_dir.path().join("model.lp");

        let output = run_augment(
            &input,
            &lp_path,
            &["--basis", basis.to_str().unwrap()],
        );
        assert!(
            output.status.success(),
            "Command should succeed. stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        assert!(lp_path.exists(), "LP file should be generated");
    }

    /// A basis outside the null space of the stoichiometry is rejected
    #[test]
    fn test_augment_rejects_non_orthogonal_basis() {
        let (temp_dir, input) = create_model_file(TRIANGLE);
        let basis = temp_dir.path().join("model.basis");
        fs::write(&basis, "R1 0 1\nR2 0 1\n").expect("Failed to write basis file");
        let lp_path = temp_dir.path().join("model.lp");

        let output = run_augment(
            &input,
            &lp_path,
            &["--basis", basis.to_str().unwrap()],
        );
        assert!(!output.status.success(), "Non-orthogonal basis should fail");
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(
            stderr.contains("null space"),
            "Error should name the null space. stderr: {stderr}"
        );
    }

    /// Focusing on one reaction only constrains its component
    #[test]
    fn test_augment_focus_restricts_components() {
        let (temp_dir, input) = create_model_file(TWO_LOOPS);
        let lp_path = temp_dir.path().join("model.lp");

        let output = run_augment(&input, &lp_path, &["--focus", "R1"]);
        assert!(
            output.status.success(),
            "Command should succeed. stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        let lp = fs::read_to_string(&lp_path).expect("Failed to read LP file");
        assert!(lp.contains(" a_R1\n"));
        assert!(lp.contains(" a_R2\n"));
        assert!(!lp.contains("a_R4"), "reactions outside the focus component are unconstrained");
        assert!(!lp.contains("a_R5"));
    }

    #[test]
    fn test_augment_unknown_focus_fails() {
        let (temp_dir, input) = create_model_file(TRIANGLE);
        let lp_path = temp_dir.path().join("model.lp");

        let output = run_augment(&input, &lp_path, &["--focus", "R9"]);
        assert!(!output.status.success(), "Unknown focus reaction should fail");
        assert!(String::from_utf8_lossy(&output.stderr).contains("R9"));
        assert!(!lp_path.exists(), "No LP file should be written on error");
    }

    /// Levels above 1 need a basis from an external tool
    #[test]
    fn test_augment_level_without_basis_fails() {
        let (temp_dir, input) = create_model_file(TRIANGLE);
        let lp_path = temp_dir.path().join("model.lp");

        let output = run_augment(&input, &lp_path, &["--level", "2"]);
        assert!(!output.status.success(), "Level 2 without a basis should fail");
        assert!(String::from_utf8_lossy(&output.stderr).contains("FastSnp"));
    }

    #[test]
    fn test_augment_level_out_of_range_fails() {
        let (temp_dir, input) = create_model_file(TRIANGLE);
        let lp_path = temp_dir.path().join("model.lp");

        let output = run_augment(&input, &lp_path, &["--level", "5"]);
        assert!(!output.status.success(), "Level 5 should be rejected by argument parsing");
    }

    /// Level 4 without an enumerator still writes a component-wide problem
    #[test]
    fn test_augment_linked_focus_falls_back() {
        let (temp_dir, input) = create_model_file(TWO_LOOPS);
        let basis = temp_dir.path().join("model.basis");
        fs::write(&basis, "R1 0 1\nR2 0 1\nR4 1 1\nR5 1 1\n").expect("Failed to write basis file");
        let lp_path = temp_dir.path().join("model.lp");

        let output = run_augment(
            &input,
            &lp_path,
            &[
                "--basis",
                basis.to_str().unwrap(),
                "--level",
                "4",
                "--focus",
                "R4",
            ],
        );
        assert!(
            output.status.success(),
            "Command should succeed. stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        let lp = fs::read_to_string(&lp_path).expect("Failed to read LP file");
        assert!(lp.contains(" a_R4\n"));
        assert!(lp.contains(" a_R5\n"));
        assert!(!lp.contains("a_R1"));
    }

    #[test]
    fn test_augment_missing_input_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input = temp_dir.path().join("missing.rxn");
        let lp_path = temp_dir.path().join("model.lp");

        let output = run_augment(&input, &lp_path, &[]);
        assert!(!output.status.success());
    }
}

#[cfg(test)]
mod components_cli_tests {
    use super::*;

    #[test]
    fn test_components_lists_cycle() {
        let (_temp_dir, input) = create_model_file(TRIANGLE);

        let output = run_loopless(&["components"], &input);
        assert!(
            output.status.success(),
            "Command should succeed. stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("R1 R2 R3"));
        assert!(stdout.contains("3 of 5 reactions take part in internal cycles"));
    }

    #[test]
    fn test_components_separates_loops() {
        let (_temp_dir, input) = create_model_file(TWO_LOOPS);

        let output = run_loopless(&["components"], &input);
        assert!(output.status.success());

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("R1 R2"));
        assert!(stdout.contains("R4 R5"));
        assert!(stdout.contains("4 of 7 reactions take part in internal cycles"));
    }

    #[test]
    fn test_components_rejects_malformed_model() {
        let (_temp_dir, input) = create_model_file("R1: A -> B [5, 1]\n");

        let output = run_loopless(&["components"], &input);
        assert!(!output.status.success(), "lb > ub should be a parse error");
        assert!(String::from_utf8_lossy(&output.stderr).contains("line 1"));
    }
}
