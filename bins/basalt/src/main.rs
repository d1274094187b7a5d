//! Opens one side of a shared-memory channel and moves bytes through it.
//!
//! ```bash
//! basalt <config.toml> init
//! basalt <config.toml> pipe
//! basalt <config.toml> send <text>
//! basalt <config.toml> recv
//! ```
//!
//! Logs go to stderr so stdout carries channel data only.

use anyhow::{Context, bail};
use basalt_chan::{Backoff, Channel, ChannelOptions, RingWriter, SharedMapping, Side};
use basalt_config::{Backing, BasaltConfig, SideConfig};
use std::io::{self, Read, Write};
use std::thread;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: basalt <config.toml> <init|pipe|send <text>|recv>";

enum Command {
    Init,
    Pipe,
    Send(String),
    Recv,
}

fn parse_args() -> anyhow::Result<(String, Command)> {
    let mut args = std::env::args().skip(1);
    let (Some(config), Some(command)) = (args.next(), args.next()) else {
        bail!(USAGE);
    };
    let command = match command.as_str() {
        "init" => Command::Init,
        "pipe" => Command::Pipe,
        "send" => Command::Send(args.next().context(USAGE)?),
        "recv" => Command::Recv,
        other => bail!("unknown command '{other}'\n{USAGE}"),
    };
    Ok((config, command))
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn channel_options(config: &BasaltConfig) -> ChannelOptions {
    let side = match config.side {
        SideConfig::Guest => Side::Guest,
        SideConfig::Host => Side::Host,
    };
    let mut options = ChannelOptions::default()
        .side(side)
        .write_timeout(config.channel.write_timeout())
        .poll_interval(config.channel.poll_interval());
    if let Some(margin) = config.channel.safety_margin {
        options = options.safety_margin(margin);
    }
    options
}

fn open_channel(config: &BasaltConfig) -> anyhow::Result<Channel> {
    let options = channel_options(config);
    let region = &config.region;
    let channel = match region.backing {
        Backing::File => Channel::open_file(&region.path, &options)
            .with_context(|| format!("failed to open region file '{}'", region.path))?,
        #[cfg(unix)]
        Backing::Device => {
            Channel::open_physical(&region.path, region.phys_addr, region.size, &options)
                .with_context(|| {
                    format!("failed to map {:#x} through '{}'", region.phys_addr, region.path)
                })?
        }
        #[cfg(not(unix))]
        Backing::Device => bail!("device-backed regions need a unix host"),
    };
    Ok(channel)
}

fn init_region(config: &BasaltConfig) -> anyhow::Result<()> {
    let region = &config.region;
    if region.backing != Backing::File {
        bail!("init only applies to backing = \"file\"");
    }
    let mapping = SharedMapping::create_rw(&region.path, region.size)
        .with_context(|| format!("failed to create '{}'", region.path))?;
    mapping.flush().context("failed to flush new region")?;
    info!(path = %region.path, size = region.size, "region initialised");
    Ok(())
}

/// Writes `payload` as one message, waiting out backpressure for as long as
/// the consumer takes.
fn write_retrying(
    writer: &mut RingWriter,
    backoff: &mut Backoff,
    payload: &[u8],
) -> anyhow::Result<()> {
    loop {
        match writer.write(payload) {
            Ok(_) => {
                backoff.reset();
                return Ok(());
            }
            Err(e) if e.is_backpressure() => {
                warn!(len = payload.len(), "consumer is not draining, retrying");
                backoff.snooze();
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn pump_stdin(mut writer: RingWriter, mut backoff: Backoff) -> anyhow::Result<()> {
    let mut stdin = io::stdin().lock();
    let mut buf = vec![0u8; writer.max_payload()];
    loop {
        let n = stdin.read(&mut buf).context("failed to read stdin")?;
        if n == 0 {
            info!("stdin closed");
            return Ok(());
        }
        write_retrying(&mut writer, &mut backoff, &buf[..n])?;
    }
}

fn pipe(channel: Channel, config: &BasaltConfig) -> anyhow::Result<()> {
    let (mut reader, writer) = channel.split();
    let backoff = Backoff::new(config.channel.poll_interval());

    thread::Builder::new()
        .name("basalt-stdin".into())
        .spawn(move || {
            if let Err(e) = pump_stdin(writer, backoff) {
                warn!("stdin pump stopped: {e:#}");
            }
        })
        .context("failed to spawn stdin pump")?;

    let mut stdout = io::stdout().lock();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf);
        stdout.write_all(&buf[..n]).context("failed to write stdout")?;
        stdout.flush().context("failed to flush stdout")?;
    }
}

fn main() -> anyhow::Result<()> {
    let (config_path, command) = parse_args()?;
    let config = BasaltConfig::load(&config_path)
        .with_context(|| format!("failed to load config '{config_path}'"))?;
    init_tracing(&config.log_level);

    match command {
        Command::Init => init_region(&config),
        Command::Pipe => {
            let channel = open_channel(&config)?;
            pipe(channel, &config)
        }
        Command::Send(text) => {
            let channel = open_channel(&config)?;
            let mut backoff = Backoff::new(config.channel.poll_interval());
            let (_reader, mut writer) = channel.split();
            write_retrying(&mut writer, &mut backoff, text.as_bytes())?;
            info!(len = text.len(), "sent");
            Ok(())
        }
        Command::Recv => {
            let mut channel = open_channel(&config)?;
            let mut buf = vec![0u8; channel.max_payload().max(1)];
            let n = channel.read(&mut buf);
            let mut stdout = io::stdout().lock();
            stdout.write_all(&buf[..n]).context("failed to write stdout")?;
            stdout.write_all(b"\n")?;
            channel.close()?;
            Ok(())
        }
    }
}
