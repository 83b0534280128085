use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use tempfile::tempdir;

const SEARCH_PATH: &str = "/usr/bin:/bin";

fn jobsh(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("jobsh").unwrap();
    cmd.current_dir(dir)
        .env("PATH", SEARCH_PATH)
        .env_remove("JOBSH_LOG")
        .env_remove("JOBSH_PROMPT");
    cmd
}

fn run(dir: &Path, script: &str) -> Output {
    jobsh(dir).write_stdin(script).output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn cwd_line(dir: &Path) -> String {
    let canonical: PathBuf = dir.canonicalize().unwrap();
    format!("{}\n", canonical.display())
}

#[test]
fn pwd_prints_the_directory_without_a_prompt() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "pwd\n");
    assert!(output.status.success());
    assert_eq!(stdout(&output), cwd_line(dir.path()));
    assert_eq!(stderr(&output), "");
}

#[test]
fn output_redirection_creates_the_file_and_restores_stdout() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "echo hi > out.txt\npwd\n");
    assert!(output.status.success());
    assert_eq!(fs::read_to_string(dir.path().join("out.txt")).unwrap(), "hi\n");
    assert_eq!(stdout(&output), cwd_line(dir.path()));
}

#[test]
fn output_redirection_truncates_an_existing_file() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("out.txt"), "a much longer previous content\n").unwrap();
    run(dir.path(), "echo new>out.txt\n");
    assert_eq!(fs::read_to_string(dir.path().join("out.txt")).unwrap(), "new\n");
}

#[test]
fn background_job_does_not_block_the_prompt() {
    let dir = tempdir().unwrap();
    let start = Instant::now();
    let mut child = std::process::Command::new(env!("CARGO_BIN_EXE_jobsh"))
        .current_dir(dir.path())
        .env("PATH", SEARCH_PATH)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"sleep 5 > /dev/null &\necho after\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(start.elapsed() < Duration::from_secs(4), "took {:?}", start.elapsed());
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "after\n");
}

#[test]
fn cd_into_missing_directory_reports_and_stays_put() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "cd /nonexistent\npwd\n");
    assert!(output.status.success());
    assert!(stderr(&output).contains("cd: /nonexistent: "), "{}", stderr(&output));
    assert_eq!(stdout(&output), cwd_line(dir.path()));
}

#[test]
fn cd_changes_directory_for_later_commands() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    let output = run(dir.path(), "cd sub\npwd\n/bin/pwd\n");
    let expected = cwd_line(&dir.path().join("sub"));
    assert_eq!(stdout(&output), format!("{expected}{expected}"));
}

#[test]
fn output_then_input_redirection_round_trips() {
    let dir = tempdir().unwrap();
    let direct = run(dir.path(), "echo 'hello   world' again\n");
    let output = run(dir.path(), "echo 'hello   world' again > saved\ncat < saved\n");
    assert_eq!(stdout(&direct), "hello   world again\n");
    assert_eq!(output.stdout, direct.stdout);
}

#[test]
fn builtin_output_can_be_redirected() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "pwd > where.txt\n? >help.txt\npwd\n");
    assert_eq!(
        fs::read_to_string(dir.path().join("where.txt")).unwrap(),
        cwd_line(dir.path())
    );
    let help = fs::read_to_string(dir.path().join("help.txt")).unwrap();
    assert_eq!(help.lines().count(), 4);
    assert_eq!(stdout(&output), cwd_line(dir.path()));
}

#[test]
fn help_lists_builtins_in_order() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "?\n");
    let names: Vec<String> = stdout(&output)
        .lines()
        .map(|line| line.split(" - ").next().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["?", "exit", "pwd", "cd"]);
}

#[test]
fn malformed_redirection_is_rejected_without_running() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "echo a > b c\ncat < in > out\necho next\n");
    assert!(output.status.success());
    assert_eq!(stderr(&output).matches("malformed redirection").count(), 2);
    assert!(!dir.path().join("b").exists());
    assert!(!dir.path().join("out").exists());
    assert_eq!(stdout(&output), "next\n");
}

#[test]
fn missing_input_file_aborts_only_that_command() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "cat < missing.txt\necho still here\n");
    assert!(output.status.success());
    assert!(stderr(&output).contains("missing.txt"), "{}", stderr(&output));
    assert_eq!(stdout(&output), "still here\n");
}

#[test]
fn unknown_command_is_reported_by_the_child() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "jobsh-no-such-command arg\necho alive\n");
    assert!(output.status.success());
    assert!(stderr(&output).contains("jobsh-no-such-command: unknown command"));
    assert_eq!(stdout(&output), "alive\n");
}

#[test]
fn commands_are_found_through_the_search_path() {
    let dir = tempdir().unwrap();
    let bin = dir.path().join("bin");
    fs::create_dir(&bin).unwrap();
    let script = bin.join("greet");
    fs::write(&script, "#!/bin/sh\necho \"greetings $1\"\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let output = jobsh(dir.path())
        .env("PATH", format!("{}:{SEARCH_PATH}", bin.display()))
        .write_stdin("greet you\n")
        .output()
        .unwrap();
    assert_eq!(stdout(&output), "greetings you\n");
}

#[test]
fn same_named_directory_does_not_hide_a_program() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("echo")).unwrap();
    let output = run(dir.path(), "echo hi\n");
    assert_eq!(stdout(&output), "hi\n");
    assert_eq!(stderr(&output), "");
}

#[test]
fn unrunnable_file_is_reported_as_such() {
    let dir = tempdir().unwrap();
    let plain = dir.path().join("notes");
    fs::write(&plain, "just text\n").unwrap();
    fs::set_permissions(&plain, fs::Permissions::from_mode(0o644)).unwrap();
    let output = run(dir.path(), "notes\necho alive\n");
    assert!(stderr(&output).contains("notes: cannot execute"), "{}", stderr(&output));
    assert_eq!(stdout(&output), "alive\n");
}

#[test]
fn exit_stops_the_shell_with_status_zero() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "exit 3\necho unreachable\n");
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "");
}

#[test]
fn end_of_input_ends_the_shell() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "");
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "");
}

#[test]
fn oversized_line_is_rejected() {
    let dir = tempdir().unwrap();
    let script = format!("echo {}\necho ok\n", "x".repeat(5000));
    let output = run(dir.path(), &script);
    assert!(stderr(&output).contains("exceeds 4096 bytes"));
    assert_eq!(stdout(&output), "ok\n");
}

#[test]
fn children_read_the_rest_of_the_input() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "cat\nhello from the script\n");
    assert_eq!(stdout(&output), "hello from the script\n");
}

#[test]
fn operators_inside_quotes_are_plain_words() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "echo '>' \"&\" x\n");
    assert_eq!(stdout(&output), "> & x\n");
}

#[test]
fn stray_ampersand_is_rejected() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "echo a & b\n");
    assert!(stderr(&output).contains("unexpected `&`"));
    assert_eq!(stdout(&output), "");
}
