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

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sshchain",
    version,
    about = "Run commands, proxy ports and upload files through SSH jump host chains",
    long_about = "sshchain connects to a target host through zero or more jump hosts.\nEach jump host authenticates with its own user and credential when both are\nconfigured, otherwise with the target's credentials.\nSettings come from the configuration file and can be overridden on the command line.",
    after_help = "EXAMPLES:\n  Run a command:            sshchain -t alice@10.0.0.5 -J bob@10.0.0.1 -P exec uptime\n  Stream output:            sshchain -t alice@db -i ~/.ssh/id_ed25519 stream -- tail -f /var/log/syslog\n  Forward a remote port:    sshchain forward 5432 127.0.0.1 5432\n  Forward a Unix socket:    sshchain forward-unix 2375 /var/run/docker.sock\n  Write stdin to a file:    echo hello | sshchain put /tmp/hello.txt\n  Upload a file with scp:   sshchain upload ./build.tar.gz /tmp/build.tar.gz"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 't',
        long,
        help = "Target host in [user@]hostname format\nOverrides the target from the configuration file"
    )]
    pub target: Option<String>,

    #[arg(
        short = 'J',
        long = "jump",
        help = "Comma-separated jump hosts in [user@]hostname format, in traversal order\nJump hosts given here use the target's credentials"
    )]
    pub jump_hosts: Option<String>,

    #[arg(
        long,
        help = "Configuration file path [default: ~/.config/sshchain/config.yaml]"
    )]
    pub config: Option<PathBuf>,

    #[arg(short = 'i', long, help = "Private key file for the target")]
    pub identity: Option<PathBuf>,

    #[arg(
        short = 'P',
        long,
        help = "Prompt for the target's password"
    )]
    pub password: bool,

    #[arg(
        long,
        help = "Verify host keys against ~/.ssh/known_hosts (disabled by default)"
    )]
    pub verify_host_identity: bool,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Timeout for connecting to each hop"
    )]
    pub connect_timeout: Option<u64>,

    #[arg(
        short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Execute a command and print its combined output")]
    Exec {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    #[command(about = "Execute a command and stream its output line by line")]
    Stream {
        #[arg(long, help = "Print stderr lines to local stderr instead of stdout")]
        separate: bool,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    #[command(about = "Forward localhost:<LOCAL_PORT> to a TCP endpoint reachable from the target")]
    Forward {
        local_port: u16,
        remote_host: String,
        remote_port: u16,
    },

    #[command(
        name = "forward-unix",
        about = "Forward localhost:<LOCAL_PORT> to a Unix socket on the target"
    )]
    ForwardUnix {
        local_port: u16,
        socket_path: String,
    },

    #[command(about = "Write text or stdin to a file on the target")]
    Put {
        remote_path: String,

        #[arg(long, help = "Text to write instead of reading stdin")]
        data: Option<String>,
    },

    #[command(about = "Upload a local file to the target with scp")]
    Upload {
        local_path: PathBuf,
        remote_path: String,
    },
}

impl Commands {
    /// Remote command line for `exec` and `stream`.
    pub fn command_line(&self) -> Option<String> {
        match self {
            Commands::Exec { command } | Commands::Stream { command, .. } => {
                Some(command.join(" "))
            }
            _ => None,
        }
    }
}
