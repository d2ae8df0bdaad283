use std::io::Write;
use std::process::{Command, Output};

fn hdlvm() -> Command {
    Command::new(env!("CARGO_BIN_EXE_hdlvm"))
}

fn write_program(source: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".hbc").tempfile().expect("tempfile");
    file.write_all(source.as_bytes()).expect("write program");
    file
}

fn run(args: &[&str]) -> Output {
    hdlvm().args(args).env_remove("NO_COLOR").output().expect("failed to run hdlvm")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

const ARITH: &str = "\
module top

; ((a + b) * 2) - 1
fn main(a: u32, b: u32) -> u32 {
    load 0
    load 1
    add
    literal u32:2
    mul
    literal u32:1
    sub
}

fn pick(c: bool) -> u8 {
    load 0
    jump_rel_if +3
    literal u8:10
    jump_rel +3
    jump_dest
    literal u8:20
    jump_dest
}

fn arith8(a: u8, b: u8) -> u8 {
    load 0
    load 1
    add
    literal u8:2
    mul
    literal u8:1
    sub
}
";

const TESTS: &str = "\
module top

fn double(x: u8) -> u8 {
    load 0
    literal u8:2
    mul
}

test double_works {
    literal u8:21
    literal fn:top::double
    call
    literal u8:42
    literal builtin:assert_eq
    call
}

test double_wraps {
    literal u8:200
    literal fn:top::double
    call
    literal u8:144
    literal builtin:assert_eq
    call
}

test double_is_wrong {
    literal u8:3
    literal fn:top::double
    call
    literal u8:7
    literal builtin:assert_eq
    call
}
";

// --- run ---

#[test]
fn run_arithmetic_with_bare_args() {
    let file = write_program(ARITH);
    let path = file.path().to_str().unwrap();
    let out = run(&["run", path, "3", "4"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out).trim(), "u32:13");
}

#[test]
fn run_accepts_typed_args() {
    let file = write_program(ARITH);
    let path = file.path().to_str().unwrap();
    let out = run(&["run", path, "u32:10", "u32:0x5"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out).trim(), "u32:29");
}

#[test]
fn run_arithmetic_at_eight_bits() {
    let file = write_program(ARITH);
    let path = file.path().to_str().unwrap();
    let out = run(&["run", path, "--entry", "arith8", "3", "4"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out).trim(), "u8:13");
}

#[test]
fn run_named_entry_takes_branch() {
    let file = write_program(ARITH);
    let path = file.path().to_str().unwrap();
    let taken = run(&["run", path, "--entry", "pick", "1"]);
    assert!(taken.status.success(), "stderr: {}", stderr(&taken));
    assert_eq!(stdout(&taken).trim(), "u8:20");
    let fallthrough = run(&["run", path, "--entry", "pick", "0"]);
    assert_eq!(stdout(&fallthrough).trim(), "u8:10");
}

#[test]
fn run_wrong_arg_count_fails() {
    let file = write_program(ARITH);
    let path = file.path().to_str().unwrap();
    let out = run(&["run", path, "3"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("takes 2 argument(s), 1 given"), "stderr: {}", stderr(&out));
}

#[test]
fn run_out_of_range_arg_fails() {
    let file = write_program(ARITH);
    let path = file.path().to_str().unwrap();
    let out = run(&["run", path, "--entry", "pick", "2"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("HVM-P008"), "stderr: {}", stderr(&out));
}

#[test]
fn run_unknown_entry_fails() {
    let file = write_program(ARITH);
    let path = file.path().to_str().unwrap();
    let out = run(&["run", path, "--entry", "nope"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("no function `nope`"));
}

#[test]
fn run_missing_file_fails() {
    let out = run(&["run", "/definitely/not/here.hbc"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("cannot read"));
}

// --- test ---

#[test]
fn test_reports_each_case() {
    let file = write_program(TESTS);
    let path = file.path().to_str().unwrap();
    let out = run(&["test", path, "--no-color"]);
    assert!(!out.status.success());
    let text = stdout(&out);
    assert!(text.contains("test top::double_works ... ok"), "stdout: {text}");
    assert!(text.contains("test top::double_wraps ... ok"), "stdout: {text}");
    assert!(text.contains("test top::double_is_wrong ... FAILED"), "stdout: {text}");
    assert!(text.contains("test result: FAILED. 2 passed; 1 failed"), "stdout: {text}");

    let err = stderr(&out);
    assert!(err.contains("error[HVM-R004]"), "stderr: {err}");
    assert!(err.contains("lhs: u8:6"), "stderr: {err}");
    assert!(err.contains("rhs: u8:7"), "stderr: {err}");
    assert!(err.contains("were not equal"), "stderr: {err}");
}

#[test]
fn test_filter_selects_passing_cases() {
    let file = write_program(TESTS);
    let path = file.path().to_str().unwrap();
    let out = run(&["test", path, "--filter", "double_w"]);
    assert!(out.status.success(), "stdout: {}", stdout(&out));
    assert!(stdout(&out).contains("test result: ok. 2 passed; 0 failed"));
}

#[test]
fn test_filter_matching_nothing_warns() {
    let file = write_program(TESTS);
    let path = file.path().to_str().unwrap();
    let out = run(&["test", path, "--filter", "nothing_here", "--no-color"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("test result: ok. 0 passed; 0 failed"));
    assert!(stderr(&out).contains("warning: no tests match filter `nothing_here`"), "stderr: {}", stderr(&out));
}

#[test]
fn test_failure_as_json() {
    let file = write_program(TESTS);
    let path = file.path().to_str().unwrap();
    let out = run(&["test", path, "--filter", "wrong", "--json"]);
    assert!(!out.status.success());
    let line = stderr(&out).lines().next().unwrap_or_default().to_string();
    let json: serde_json::Value = serde_json::from_str(&line).expect("diagnostic JSON");
    assert_eq!(json["code"], "HVM-R004");
    assert_eq!(json["severity"], "error");
}

// --- check ---

#[test]
fn check_accepts_valid_file() {
    let file = write_program(TESTS);
    let path = file.path().to_str().unwrap();
    let out = run(&["check", path]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("ok (1 function(s), 3 test(s))"));
}

#[test]
fn check_reports_parse_error_with_location() {
    let file = write_program("module top\nfn f() -> u8 {\n    literal u8:300\n}\n");
    let path = file.path().to_str().unwrap();
    let out = run(&["check", path, "--no-color"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("error[HVM-P008]"), "stderr: {err}");
    assert!(err.contains(&format!("{path}:3:")), "stderr: {err}");
}

#[test]
fn check_rejects_oversized_types_without_crashing() {
    for body in ["literal u18446744073709551615:0", "literal u8:1\n    cast u8[18446744073709551615][4]"] {
        let file = write_program(&format!("module top\nfn f() {{\n    {body}\n}}\n"));
        let path = file.path().to_str().unwrap();
        let out = run(&["check", path, "--no-color"]);
        assert_eq!(out.status.code(), Some(1), "stderr: {}", stderr(&out));
        let err = stderr(&out);
        assert!(err.contains("error[HVM-P008]"), "stderr: {err}");
        assert!(!err.contains("panicked"), "stderr: {err}");
    }
}

#[test]
fn check_reports_every_verify_error() {
    let source = "\
module top

fn bad() -> u8 {
    jump_rel +2
    literal u8:1
    literal u8:2
}

fn empty() -> u8 {
}
";
    let file = write_program(source);
    let path = file.path().to_str().unwrap();
    let out = run(&["check", path, "--no-color"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("HVM-V002"), "stderr: {err}");
    assert!(err.contains("HVM-V005"), "stderr: {err}");
}

#[test]
fn check_lex_error_as_json() {
    let file = write_program("module top\nfn f() { add # oops\n}\n");
    let path = file.path().to_str().unwrap();
    let out = run(&["check", path, "--json"]);
    assert!(!out.status.success());
    let json: serde_json::Value = serde_json::from_str(stderr(&out).trim()).expect("diagnostic JSON");
    assert_eq!(json["code"], "HVM-L001");
    assert_eq!(json["labels"][0]["line"], 2);
}

// --- dis ---

#[test]
fn dis_output_reassembles() {
    let file = write_program(TESTS);
    let path = file.path().to_str().unwrap();
    let out = run(&["dis", path]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let listing = stdout(&out);
    assert!(listing.starts_with("module top\n"));

    let again = write_program(&listing);
    let out2 = run(&["dis", again.path().to_str().unwrap()]);
    assert!(out2.status.success());
    assert_eq!(stdout(&out2), listing);
}

#[test]
fn dis_json_listing() {
    let file = write_program(ARITH);
    let path = file.path().to_str().unwrap();
    let out = run(&["dis", path, "--json"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let json: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("listing JSON");
    assert_eq!(json["module"], "top");
    assert_eq!(json["functions"][0]["name"], "main");
    assert_eq!(json["functions"][0]["bytecodes"][0]["op"], "load");
    assert_eq!(json["functions"][1]["params"][0][1], "u1");
}

// --- explain ---

#[test]
fn explain_known_code() {
    let out = run(&["explain", "hvm-v002"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("jump_dest"));
}

#[test]
fn explain_unknown_code() {
    let out = run(&["explain", "HVM-Z999"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("unknown diagnostic code"));
}
