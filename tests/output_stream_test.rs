// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command execution and line streaming over a mock chain.

mod common;

use std::sync::{Arc, Mutex};

use common::{Event, MockProvider, Script};
use sshchain::error::Error;
use sshchain::{Client, ExitStatus, HopConfig, OutputHandlers};

fn client(provider: &MockProvider) -> Client<MockProvider> {
    Client::with_provider(
        HopConfig::new("10.0.0.5")
            .with_user("alice")
            .with_password("p"),
        vec![HopConfig::new("10.0.0.1")],
        provider.clone(),
    )
    .unwrap()
}

fn script(stdout: &str, stderr: &str, exit: u32) -> Script {
    Script {
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
        exit: ExitStatus::Code(exit),
    }
}

type Lines = Arc<Mutex<Vec<String>>>;

fn sink() -> (Lines, impl Fn(&str) + Send + Sync + 'static) {
    let lines: Lines = Arc::default();
    let target = Arc::clone(&lines);
    (lines, move |line: &str| {
        target.lock().unwrap().push(line.to_string())
    })
}

#[tokio::test]
async fn test_combined_handler_receives_both_streams() {
    let provider = MockProvider::new().with_script(script("a\nb\r\n", "warn\n", 0));
    let (lines, handler) = sink();

    client(&provider)
        .stream_command("make", OutputHandlers::combined(handler))
        .await
        .unwrap();

    let mut lines = lines.lock().unwrap().clone();
    lines.sort();
    assert_eq!(lines, ["a", "b", "warn"]);
    assert!(provider.commands().contains(&"make".to_string()));
}

#[tokio::test]
async fn test_separate_handlers_keep_streams_apart() {
    let provider = MockProvider::new().with_script(script("out1\nout2", "err1\n", 0));
    let (out, on_stdout) = sink();
    let (err, on_stderr) = sink();

    client(&provider)
        .stream_command("build", OutputHandlers::separate(on_stdout, on_stderr))
        .await
        .unwrap();

    assert_eq!(*out.lock().unwrap(), ["out1", "out2"]);
    assert_eq!(*err.lock().unwrap(), ["err1"]);
}

#[tokio::test]
async fn test_missing_handler_fails_before_connecting() {
    let provider = MockProvider::new();

    let err = client(&provider)
        .stream_command("ls", OutputHandlers::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(provider.events().is_empty());
}

#[tokio::test]
async fn test_both_handler_shapes_rejected() {
    let provider = MockProvider::new();
    let handlers = OutputHandlers::combined(|_| {}).with_separate(|_| {}, |_| {});

    let err = client(&provider)
        .stream_command("ls", handlers)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(provider.dials(), 0);
}

#[tokio::test]
async fn test_failing_exit_reported_after_lines() {
    let provider = MockProvider::new().with_script(script("partial\n", "boom\n", 3));
    let (lines, handler) = sink();

    let err = client(&provider)
        .stream_command("false", OutputHandlers::combined(handler))
        .await
        .unwrap_err();

    assert_eq!(err.exit_status(), Some(&ExitStatus::Code(3)));
    assert_eq!(lines.lock().unwrap().len(), 2);

    // The chain is torn down even when the command fails.
    let events = provider.events();
    assert!(matches!(events.last(), Some(Event::Close { .. })));
}

#[tokio::test]
async fn test_execute_command_collects_output() {
    let provider = MockProvider::new().with_script(script("Linux\n", "", 0));

    let output = client(&provider).execute_command("uname").await.unwrap();

    assert_eq!(output, "Linux\n");
    assert_eq!(provider.commands(), ["uname"]);
}

#[tokio::test]
async fn test_execute_command_failure_carries_output() {
    let provider = MockProvider::new().with_script(script("", "no such file\n", 1));

    let err = client(&provider)
        .execute_command("cat /nope")
        .await
        .unwrap_err();

    match err {
        Error::CommandFailed {
            command,
            status,
            output,
        } => {
            assert_eq!(command, "cat /nope");
            assert_eq!(status, ExitStatus::Code(1));
            assert_eq!(output.as_deref(), Some("no such file\n"));
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }
}
