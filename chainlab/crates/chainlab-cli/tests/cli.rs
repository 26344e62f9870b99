use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::json;

fn chainlab(workdir: &Path) -> Command {
    let config = workdir.join("config.toml");
    std::fs::write(
        &config,
        format!(
            "base_url = \"http://127.0.0.1:9\"\ndata_dir = {:?}\n",
            workdir.join("data").display().to_string()
        ),
    )
    .expect("write config");

    let mut command = Command::new(env!("CARGO_BIN_EXE_chainlab"));
    command
        .env("CHAINLAB_CONFIG", &config)
        .env("CHAINLAB_USE_IN_MEMORY_KEYCHAIN", "1")
        .env("CHAINLAB_LOG", "off")
        .env_remove("CHAINLAB_BASE_URL")
        .env("NO_COLOR", "1");
    command
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn parse_prints_the_tag_body() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = chainlab(dir.path())
        .args(["parse", "--tag", "answer", "--text", "so <answer>42</answer> it is"])
        .output()?;

    assert!(output.status.success());
    assert_eq!(stdout(&output), "42\n");
    Ok(())
}

#[test]
fn parse_reads_stdin_and_reports_misses() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut child = chainlab(dir.path())
        .args(["parse", "--tag", "answer"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    child
        .stdin
        .take()
        .expect("stdin piped")
        .write_all(b"nothing tagged here")?;
    let output = child.wait_with_output()?;

    assert!(output.status.success());
    assert_eq!(stdout(&output), "");
    assert!(String::from_utf8_lossy(&output.stderr).contains("No data extracted."));
    Ok(())
}

#[test]
fn run_executes_a_local_application_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app = json!({
        "app_name": "Greeter",
        "chain": [
            {
                "id": 1,
                "type": "text-input",
                "title": "Greeting",
                "input": "{Greeting Content}",
                "is_app_input": 1,
                "is_app_output": 0,
                "parameters": {}
            },
            {
                "id": 2,
                "type": "output",
                "title": "Output 1",
                "input": "{Greeting}!",
                "is_app_input": 0,
                "is_app_output": 1,
                "parameters": {}
            }
        ]
    });
    let app_path = dir.path().join("greeter.json");
    std::fs::write(&app_path, serde_json::to_string(&app)?)?;

    let output = chainlab(dir.path())
        .arg("run")
        .arg("--file")
        .arg(&app_path)
        .args(["--var", "Greeting=Hi"])
        .output()?;

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let printed = stdout(&output);
    assert!(printed.contains("Output 1"));
    assert!(printed.contains("Hi!"));

    let history = chainlab(dir.path()).arg("history").output()?;
    assert!(history.status.success());
    let printed = stdout(&history);
    assert!(printed.contains("interactive"));
    assert!(printed.contains("completed"));
    assert!(printed.contains("Greeter"));
    Ok(())
}

#[test]
fn unknown_input_title_fails() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app_path = dir.path().join("empty.json");
    std::fs::write(&app_path, r#"{"app_name":"Empty","chain":[]}"#)?;

    let output = chainlab(dir.path())
        .arg("run")
        .arg("--file")
        .arg(&app_path)
        .args(["--var", "Missing=x"])
        .output()?;

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No text input titled 'Missing'"));
    Ok(())
}

fn batch_application(dir: &Path, downstream: serde_json::Value) -> anyhow::Result<std::path::PathBuf> {
    let app = json!({
        "app_name": "Greeter batch",
        "chain": [
            {
                "id": 1,
                "type": "batch-input",
                "title": "Batch 1",
                "input": "",
                "is_app_input": 1,
                "is_app_output": 0,
                "parameters": {}
            },
            downstream
        ]
    });
    let app_path = dir.join("batch.json");
    std::fs::write(&app_path, serde_json::to_string(&app)?)?;
    std::fs::write(dir.join("people.csv"), "name\nada\nbob\ncy\n")?;
    Ok(app_path)
}

#[test]
fn batch_writes_one_csv_row_per_table_row() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app_path = batch_application(
        dir.path(),
        json!({
            "id": 2,
            "type": "output",
            "title": "Output 1",
            "input": "Hello {name}",
            "is_app_input": 0,
            "is_app_output": 1,
            "parameters": {}
        }),
    )?;
    let out = dir.path().join("results.csv");

    let output = chainlab(dir.path())
        .arg("batch")
        .arg("--file")
        .arg(&app_path)
        .arg("--table")
        .arg(dir.path().join("people.csv"))
        .arg("--out")
        .arg(&out)
        .output()?;

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("3 done, 0 failed, 3 total"));
    assert_eq!(
        std::fs::read_to_string(&out)?,
        "row,status,Output 1,error\n1,completed,Hello ada,\n2,completed,Hello bob,\n3,completed,Hello cy,\n"
    );
    Ok(())
}

#[test]
fn batch_json_results_carry_the_progress_counts() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app_path = batch_application(
        dir.path(),
        json!({
            "id": 2,
            "type": "output",
            "title": "Output 1",
            "input": "Hello {name}",
            "is_app_input": 0,
            "is_app_output": 1,
            "parameters": {}
        }),
    )?;
    let out = dir.path().join("results.json");

    let output = chainlab(dir.path())
        .arg("batch")
        .arg("--file")
        .arg(&app_path)
        .arg("--table")
        .arg(dir.path().join("people.csv"))
        .arg("--out")
        .arg(&out)
        .output()?;

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out)?)?;
    assert_eq!(written["total"], 3);
    assert_eq!(written["done"], 3);
    assert_eq!(written["failed"], 0);
    Ok(())
}

#[test]
fn max_failures_stops_the_batch_after_the_limit() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    // Without a stored login every model call fails.
    let app_path = batch_application(
        dir.path(),
        json!({
            "id": 2,
            "type": "openai",
            "title": "Model 1",
            "input": "{name}",
            "is_app_input": 0,
            "is_app_output": 1,
            "parameters": {}
        }),
    )?;
    let out = dir.path().join("results.csv");

    let output = chainlab(dir.path())
        .arg("batch")
        .arg("--file")
        .arg(&app_path)
        .arg("--table")
        .arg(dir.path().join("people.csv"))
        .arg("--out")
        .arg(&out)
        .args(["--max-failures", "1"])
        .output()?;

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("0 done, 1 failed, 3 total"));

    let written = std::fs::read_to_string(&out)?;
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "row,status,Model 1,error");
    assert!(lines[1].starts_with("1,failed,,"), "{written}");
    Ok(())
}

#[test]
fn failing_rows_do_not_stop_the_batch_without_a_limit() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app_path = batch_application(
        dir.path(),
        json!({
            "id": 2,
            "type": "openai",
            "title": "Model 1",
            "input": "{name}",
            "is_app_input": 0,
            "is_app_output": 1,
            "parameters": {}
        }),
    )?;

    let output = chainlab(dir.path())
        .arg("batch")
        .arg("--file")
        .arg(&app_path)
        .arg("--table")
        .arg(dir.path().join("people.csv"))
        .output()?;

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("0 done, 3 failed, 3 total"));
    Ok(())
}

#[test]
fn zero_max_failures_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app_path = batch_application(
        dir.path(),
        json!({
            "id": 2,
            "type": "output",
            "title": "Output 1",
            "input": "Hello {name}",
            "is_app_input": 0,
            "is_app_output": 1,
            "parameters": {}
        }),
    )?;

    let output = chainlab(dir.path())
        .arg("batch")
        .arg("--file")
        .arg(&app_path)
        .arg("--table")
        .arg(dir.path().join("people.csv"))
        .args(["--max-failures", "0"])
        .output()?;

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--max-failures"));
    Ok(())
}
