use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn run_cli(dir: &Path, script: &str, extra: &[&str]) -> Output {
    let path = dir.join("main.mkvs");
    fs::write(&path, script).expect("write script");
    Command::new(env!("CARGO_BIN_EXE_delbrot"))
        .arg(&path)
        .arg("--plugin-dir")
        .arg(dir)
        .arg("--no-color")
        .args(extra)
        .env_remove("RUST_LOG")
        .output()
        .expect("run delbrot")
}

#[test]
fn successful_script_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_cli(dir.path(), "x = 3 + 4;\nprint(x * 2);\n", &[]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "14\n");
}

#[test]
fn missing_import_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_cli(dir.path(), "import nosuch;\n", &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("delbrot:1 error: could not load script or plugin \"nosuch\""),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn errors_inside_functions_name_the_function() {
    let dir = tempfile::tempdir().unwrap();
    let script = "function f(num a) {\n    return a ++ a;\n}\nf(1);\n";
    let output = run_cli(dir.path(), script, &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("delbrot:2 error: f: the concatenation operator is not defined on numbers"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn warnings_do_not_stop_the_script() {
    let dir = tempfile::tempdir().unwrap();
    let script = "function f() { return 1; }\nfunction f() { return 2; }\nprint(f());\n";
    let output = run_cli(dir.path(), script, &[]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "2\n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("delbrot:2 warning: overwrote previous definition of f"));
}

#[test]
fn ast_flag_only_parses() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_cli(dir.path(), "import nosuch;\n", &["--ast"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Import"));
}

#[test]
fn settings_file_is_read_from_the_plugin_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("delbrot.toml"), "colour = true\n").unwrap();
    let output = run_cli(dir.path(), "x = 1;\n", &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid settings file"), "unexpected stderr: {stderr}");
}
