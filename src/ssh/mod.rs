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

//! SSH transport layer.

pub mod provider;
pub mod russh_provider;
pub mod session;

pub use provider::{
    Endpoint, ExitStatus, HostPort, RawChannel, Session, SessionReader, SessionWriter, Transport,
    TransportProvider, SSH_PORT,
};
pub use russh_provider::{HostVerification, RusshProvider, RusshTransport};
pub use session::{ExecChannel, RusshSession, OUTPUT_QUEUE_CAPACITY};
