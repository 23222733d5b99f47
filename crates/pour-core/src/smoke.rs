//! Functional check of an installed package.
//!
//! The recipe's fixture is a request-block file:
//!
//! ```text
//! GET https://example.com/anything HTTP/1.1
//! Accept: text/html
//!
//! POST https://example.com/graphql
//! Content-Type: application/json
//!
//! query { ping }
//!
//! {"code": "EU"}
//! ```
//!
//! Blocks are separated by a blank line. A blank line followed by anything
//! other than a request line stays in the current block's body.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use pour_schema::Version;
use tracing::{debug, info};
use wait_timeout::ChildExt;

use crate::error::InstallError;
use crate::recipe::SmokeSpec;

const METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "TRACE", "CONNECT",
];

/// One request of a fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBlock {
    pub method: String,
    pub url: String,
    /// `HTTP/1.1` and friends; may be omitted in the fixture.
    pub http_version: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

fn request_line(line: &str) -> Option<RequestBlock> {
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    if !METHODS.contains(&method) {
        return None;
    }
    let url = parts.next()?;
    let http_version = match parts.next() {
        Some(v) if v.starts_with("HTTP/") => Some(v.to_string()),
        Some(_) => return None,
        None => None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(RequestBlock {
        method: method.to_string(),
        url: url.to_string(),
        http_version,
        headers: Vec::new(),
        body: None,
    })
}

enum State {
    Start,
    Headers,
    Body { pending_blank: usize },
}

fn finish(block: Option<RequestBlock>, body: &mut Vec<&str>, out: &mut Vec<RequestBlock>) {
    if let Some(mut block) = block {
        if !body.is_empty() {
            block.body = Some(body.join("\n"));
        }
        out.push(block);
    }
    body.clear();
}

/// Split a fixture into request blocks.
pub fn parse_fixture(text: &str) -> Result<Vec<RequestBlock>, InstallError> {
    let mut blocks = Vec::new();
    let mut current: Option<RequestBlock> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut state = State::Start;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim_end();
        let lineno = idx + 1;
        match state {
            State::Start => {
                if line.is_empty() {
                    continue;
                }
                current = Some(request_line(line).ok_or_else(|| {
                    InstallError::Validation(format!(
                        "fixture line {lineno}: expected 'METHOD URL [HTTP-VERSION]', got '{line}'"
                    ))
                })?);
                state = State::Headers;
            }
            State::Headers => {
                if line.is_empty() {
                    state = State::Body { pending_blank: 0 };
                    continue;
                }
                let (name, value) = line.split_once(':').ok_or_else(|| {
                    InstallError::Validation(format!(
                        "fixture line {lineno}: expected 'Name: value' header, got '{line}'"
                    ))
                })?;
                if let Some(block) = current.as_mut() {
                    block
                        .headers
                        .push((name.trim().to_string(), value.trim().to_string()));
                }
            }
            State::Body { pending_blank } => {
                if line.is_empty() {
                    state = State::Body {
                        pending_blank: pending_blank + 1,
                    };
                    continue;
                }
                // After a blank line a request line opens the next block.
                let separated = pending_blank > 0 || body.is_empty();
                if separated {
                    if let Some(next) = request_line(line) {
                        finish(current.take(), &mut body, &mut blocks);
                        current = Some(next);
                        state = State::Headers;
                        continue;
                    }
                }
                if !body.is_empty() {
                    body.extend(std::iter::repeat_n("", pending_blank));
                }
                body.push(line);
                state = State::Body { pending_blank: 0 };
            }
        }
    }
    finish(current, &mut body, &mut blocks);

    if blocks.is_empty() {
        return Err(InstallError::Validation(
            "fixture contains no request blocks".to_string(),
        ));
    }
    Ok(blocks)
}

/// Output of one invocation of the installed tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeReport {
    pub args: Vec<String>,
    pub stdout: String,
    pub exit_code: Option<i32>,
}

/// Runs a recipe's smoke test against an installed executable.
#[derive(Debug, Clone)]
pub struct SmokeTest<'a> {
    spec: &'a SmokeSpec,
    executable: PathBuf,
    timeout: Duration,
}

impl<'a> SmokeTest<'a> {
    pub fn new(spec: &'a SmokeSpec, executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            spec,
            executable: executable.into(),
            timeout,
        }
    }

    /// Write the fixture to a fresh directory, run the command, then check `--version`.
    pub fn run(&self, version: &Version) -> Result<Vec<SmokeReport>, InstallError> {
        let blocks = parse_fixture(&self.spec.fixture)?;
        debug!(requests = blocks.len(), "parsed fixture");

        let workdir = tempfile::Builder::new().prefix("pour-smoke-").tempdir()?;
        std::fs::write(workdir.path().join(&self.spec.fixture_name), &self.spec.fixture)?;

        let mut reports = Vec::new();
        let report = self.invoke(&self.spec.command, workdir.path())?;
        for expected in &self.spec.expect {
            if !report.stdout.contains(expected.as_str()) {
                return Err(InstallError::SmokeTest(format!(
                    "output of '{}' is missing '{expected}'",
                    report.args.join(" ")
                )));
            }
        }
        info!(requests = blocks.len(), "smoke test requests succeeded");
        reports.push(report);

        if self.spec.check_version {
            let report = self.invoke(&["--version".to_string()], workdir.path())?;
            if !report.stdout.contains(version.as_str()) {
                return Err(InstallError::SmokeTest(format!(
                    "--version printed '{}', expected {version}",
                    report.stdout.trim()
                )));
            }
            reports.push(report);
        }

        Ok(reports)
    }

    fn invoke(&self, args: &[String], cwd: &Path) -> Result<SmokeReport, InstallError> {
        let cmdline = format!("{} {}", self.executable.display(), args.join(" "));
        debug!(command = %cmdline, "running smoke test command");

        let mut child = Command::new(&self.executable)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| InstallError::SmokeTest(format!("failed to run {cmdline}: {e}")))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(self.timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(InstallError::SmokeTest(format!(
                    "'{cmdline}' timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };
        let stdout = join(stdout);
        let stderr = join(stderr);

        if !status.success() {
            return Err(InstallError::SmokeTest(format!(
                "'{cmdline}' exited with {status}\n{}{}",
                stdout.trim_end(),
                if stderr.is_empty() {
                    String::new()
                } else {
                    format!("\n{}", stderr.trim_end())
                }
            )));
        }

        Ok(SmokeReport {
            args: args.to_vec(),
            stdout,
            exit_code: status.code(),
        })
    }
}

type Drain = Option<std::thread::JoinHandle<String>>;

/// Read a pipe to the end on its own thread so a chatty child cannot block.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Drain {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Drain) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Recipe;

    fn httpyac_spec() -> SmokeSpec {
        Recipe::builtin("httpyac").unwrap().test.unwrap()
    }

    #[test]
    fn test_httpyac_fixture_has_two_blocks() {
        let blocks = parse_fixture(&httpyac_spec().fixture).unwrap();
        assert_eq!(blocks.len(), 2);

        assert_eq!(blocks[0].method, "GET");
        assert_eq!(blocks[0].url, "https://httpbin.org/anything");
        assert_eq!(blocks[0].http_version.as_deref(), Some("HTTP/1.1"));
        assert_eq!(blocks[0].headers.len(), 2);
        assert_eq!(
            blocks[0].headers[1],
            ("Authorization".to_string(), "Bearer token".to_string())
        );
        assert!(blocks[0].body.is_none());

        assert_eq!(blocks[1].method, "POST");
        assert!(blocks[1].http_version.is_none());
        let body = blocks[1].body.as_deref().unwrap();
        assert!(body.starts_with("query Continents"));
        assert!(body.contains("}\n\n{"));
        assert!(body.ends_with('}'));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_fixture("").is_err());
        assert!(parse_fixture("not a request\n").is_err());
        assert!(parse_fixture("GET https://x HTTP/1.1\nno colon here\n").is_err());
    }

    #[test]
    fn test_body_text_starting_with_method() {
        let blocks = parse_fixture("POST https://x\n\nGET is just text here\n").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].body.as_deref(), Some("GET is just text here"));
    }

    #[cfg(unix)]
    mod run {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_tool(dir: &Path, script: &str) -> PathBuf {
            let path = dir.join("httpyac");
            std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        const GOOD: &str = r#"
if [ "$1" = "--version" ]; then echo "6.3.4"; exit 0; fi
test -f "$2" || { echo "no fixture" >&2; exit 3; }
grep -q countries "$2" || exit 4
echo "HTTP/1.1 200  - OK"
echo '    "name": "Europe"'
echo "2 requests processed (2 succeeded, 0 failed)"
"#;

        #[test]
        fn test_smoke_test_passes() {
            let tmp = tempfile::tempdir().unwrap();
            let exe = fake_tool(tmp.path(), GOOD);
            let spec = httpyac_spec();

            let reports = SmokeTest::new(&spec, exe, Duration::from_secs(30))
                .run(&Version::new("6.3.4"))
                .unwrap();
            assert_eq!(reports.len(), 2);
            assert_eq!(reports[0].exit_code, Some(0));
            assert!(reports[0]
                .stdout
                .contains("2 requests processed (2 succeeded, 0 failed)"));
        }

        #[test]
        fn test_missing_expectation_fails() {
            let tmp = tempfile::tempdir().unwrap();
            let exe = fake_tool(tmp.path(), "echo '1 requests processed'");
            let spec = httpyac_spec();

            let err = SmokeTest::new(&spec, exe, Duration::from_secs(30))
                .run(&Version::new("6.3.4"))
                .unwrap_err();
            assert!(matches!(err, InstallError::SmokeTest(msg) if msg.contains("HTTP/1.1 200")));
        }

        #[test]
        fn test_version_mismatch_fails() {
            let tmp = tempfile::tempdir().unwrap();
            let exe = fake_tool(tmp.path(), GOOD);
            let spec = httpyac_spec();

            let err = SmokeTest::new(&spec, exe, Duration::from_secs(30))
                .run(&Version::new("7.0.0"))
                .unwrap_err();
            assert!(err.to_string().contains("expected 7.0.0"));
        }

        #[test]
        fn test_nonzero_exit_fails() {
            let tmp = tempfile::tempdir().unwrap();
            let exe = fake_tool(tmp.path(), "echo boom >&2; exit 2");
            let spec = httpyac_spec();

            let err = SmokeTest::new(&spec, exe, Duration::from_secs(30))
                .run(&Version::new("6.3.4"))
                .unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("exited with"));
            assert!(msg.contains("boom"));
        }

        #[test]
        fn test_timeout_kills_child() {
            let tmp = tempfile::tempdir().unwrap();
            let exe = fake_tool(tmp.path(), "exec sleep 30");
            let spec = httpyac_spec();

            let err = SmokeTest::new(&spec, exe, Duration::from_millis(200))
                .run(&Version::new("6.3.4"))
                .unwrap_err();
            assert!(err.to_string().contains("timed out"));
        }
    }
}
