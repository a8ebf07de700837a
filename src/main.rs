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

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;

use sshchain::{
    cli::{Cli, Commands},
    jump::{parse_jump_hosts, ChainSpec, HopConfig},
    utils::init_logging,
    Client, Config, Error, HostVerification, OutputHandlers,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path).await?;

    let spec = resolve_chain(&cli, &config)?;
    tracing::info!("Using chain {}", spec.describe());

    let mut provider = config.provider();
    if cli.verify_host_identity {
        provider = provider.with_host_verification(HostVerification::KnownHosts);
    }
    if let Some(secs) = cli.connect_timeout {
        provider = provider.with_connect_timeout(Some(Duration::from_secs(secs)));
    }

    let client = Client::with_provider(spec.target, spec.jump_hosts, provider)
        .context("Invalid connection settings")?;

    let command_line = cli.command.command_line();
    let outcome = match cli.command {
        Commands::Exec { .. } => {
            let command = command_line.unwrap_or_default();
            match client.execute_command(&command).await {
                Ok(output) => {
                    print!("{output}");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        Commands::Stream { separate, .. } => {
            let command = command_line.unwrap_or_default();
            let handlers = if separate {
                OutputHandlers::separate(|line| println!("{line}"), |line| eprintln!("{line}"))
            } else {
                OutputHandlers::combined(|line| println!("{line}"))
            };
            client.stream_command(&command, handlers).await
        }
        Commands::Forward {
            local_port,
            remote_host,
            remote_port,
        } => {
            eprintln!("Forwarding localhost:{local_port} -> {remote_host}:{remote_port}");
            client
                .proxy_remote_port_to_local(local_port, &remote_host, remote_port)
                .await
        }
        Commands::ForwardUnix {
            local_port,
            socket_path,
        } => {
            eprintln!("Forwarding localhost:{local_port} -> {socket_path}");
            client
                .proxy_remote_unix_socket_to_local(local_port, &socket_path)
                .await
        }
        Commands::Put { remote_path, data } => match data {
            Some(data) => client.send_string_to_file(&data, &remote_path).await,
            None => {
                client
                    .stream_to_remote_file(tokio::io::stdin(), &remote_path)
                    .await
            }
        },
        Commands::Upload {
            local_path,
            remote_path,
        } => client.scp_upload_file(&local_path, &remote_path).await,
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(Error::CommandFailed { status, output, .. }) => {
            if let Some(output) = output {
                print!("{output}");
            }
            eprintln!("Remote command finished with {status}");
            // Mirror the remote exit code when there is one.
            let code = status
                .code()
                .and_then(|code| i32::try_from(code).ok())
                .filter(|code| *code != 0)
                .unwrap_or(1);
            std::process::exit(code);
        }
        Err(e) => Err(e.into()),
    }
}

/// Merge command-line settings over the configuration file.
///
/// `-t` replaces the configured target and `-J` replaces the configured
/// jump hosts. `-i` and `-P` attach credentials to the target either way.
fn resolve_chain(cli: &Cli, config: &Config) -> Result<ChainSpec> {
    let from_config = config.chain_spec()?;

    let mut target = match (&cli.target, &from_config) {
        (Some(target), _) => target
            .parse::<HopConfig>()
            .with_context(|| format!("Invalid target '{target}'"))?,
        (None, Some(spec)) => spec.target.clone(),
        (None, None) => anyhow::bail!(
            "No target host given. Use -t [user@]host or set 'target' in the configuration file"
        ),
    };

    let jump_hosts = match &cli.jump_hosts {
        Some(list) => parse_jump_hosts(list).context("Invalid jump host list")?,
        None => from_config.map(|spec| spec.jump_hosts).unwrap_or_default(),
    };

    if let Some(identity) = &cli.identity {
        target = target.with_private_key(identity.clone());
    }
    if cli.password {
        let password = rpassword::prompt_password(format!("Password for {target}: "))
            .context("Failed to read password")?;
        target = target.with_password(password);
    }

    Ok(ChainSpec::new(target, jump_hosts))
}
