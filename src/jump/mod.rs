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

//! Multi-hop connection chains.
//!
//! A chain is dialed hop by hop: the first jump host directly, every later
//! hop over a `direct-tcpip` channel opened through the hop before it, and
//! the target last. Each hop authenticates with its own user and credential
//! when both are given, otherwise with the defaults derived from the target.

pub mod auth;
pub mod chain;
pub mod hop;
pub mod transport;

pub use auth::{resolve_auth, AuthConfig, AuthMethod};
pub use chain::{ChainBuilder, ChainPlan, PlannedHop};
pub use hop::{parse_jump_hosts, ChainSpec, HopConfig};
pub use transport::LogicalTransport;
