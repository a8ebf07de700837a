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

use tracing_subscriber::EnvFilter;

/// Filter directives for a `-v` count.
pub fn filter_directives(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "sshchain=warn",
        1 => "sshchain=info",
        // -vv: Include russh debug logs for SSH troubleshooting
        2 => "sshchain=debug,russh=debug",
        _ => "sshchain=trace,russh=trace",
    }
}

/// Create an environment filter based on verbosity level
pub fn create_env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(filter_directives(verbosity))
    }
}

/// Log to stderr so command output on stdout stays clean.
pub fn init_logging(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(create_env_filter(verbosity))
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
