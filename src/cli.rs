use std::time::Duration;

use anyhow::Result;

use crate::config::{ENV_API_KEY, ENV_API_URL, TIMER_PRESETS};
use crate::mutation::parse_minutes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Health,
    Devices {
        search: Option<String>,
    },
    Scan,
    Blocked,
    Timers,
    Status {
        mac: String,
    },
    Device {
        mac: String,
    },
    Watch {
        mac: String,
        duration: Option<Duration>,
    },
    Block {
        mac: String,
    },
    Unblock {
        mac: String,
    },
    Timer {
        mac: String,
        minutes: u32,
    },
    CancelTimer {
        mac: String,
    },
    Rename {
        mac: String,
        name: String,
    },
    Dashboard {
        watch: bool,
        duration: Option<Duration>,
    },
    Help,
    Version,
}

/// Parsed command line: the command plus connection overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub command: CliCommand,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

impl CliArgs {
    fn bare(command: CliCommand) -> Self {
        Self {
            command,
            api_url: None,
            api_key: None,
        }
    }
}

pub fn version_text() -> String {
    format!("net-curfew {}", env!("CARGO_PKG_VERSION"))
}

pub fn usage_text() -> String {
    let presets = TIMER_PRESETS
        .iter()
        .map(|(label, minutes)| format!("{} ({})", minutes, label))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "{version}
Home network access control client

Usage:
  net-curfew [dashboard] [--watch] [--for <SECS>]
  net-curfew health
  net-curfew devices [--search <TEXT>]
  net-curfew scan
  net-curfew blocked
  net-curfew timers
  net-curfew status <MAC>
  net-curfew device <MAC>
  net-curfew watch <MAC> [--for <SECS>]
  net-curfew block <MAC>
  net-curfew unblock <MAC>
  net-curfew timer <MAC> <MINUTES>
  net-curfew cancel-timer <MAC>
  net-curfew rename <MAC> <NAME>

Everything after `--` is taken as a positional argument.
  net-curfew --help
  net-curfew --version

Options:
      --url <URL>       Server base URL (env: {env_url})
      --key <KEY>       API key (env: {env_key})
  -s, --search <TEXT>   Devices: filter by name, MAC or IP
  -w, --watch           Dashboard: keep polling and redraw on changes
      --for <SECS>      Stop watching after this many seconds (default: until Ctrl-C)
  -h, --help            Show this help text
  -V, --version         Show version

Timer presets: {presets}",
        version = version_text(),
        env_url = ENV_API_URL,
        env_key = ENV_API_KEY,
        presets = presets
    )
}

/// Commands whose trailing words are free text, so a leading `-` is data rather than a flag.
fn takes_free_words(command: Option<&String>) -> bool {
    matches!(command.map(String::as_str), Some("timer" | "rename"))
}

fn usage_error(message: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("{}\n\n{}", message, usage_text())
}

fn parse_secs_arg(flag: &str, raw: &str) -> Result<Duration> {
    raw.parse::<u64>()
        .ok()
        .filter(|v| *v > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| {
            usage_error(format!(
                "Invalid value for {}: '{}'. Expected a positive integer.",
                flag, raw
            ))
        })
}

fn required_value<I, S>(flag: &str, iter: &mut I) -> Result<String>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    let value = iter
        .next()
        .ok_or_else(|| usage_error(format!("Missing value for {}.", flag)))?;
    Ok(value.as_ref().to_string())
}

fn inline_value<'a>(flag: &str, arg: &'a str) -> Result<&'a str> {
    let value = arg.split_once('=').map(|(_, v)| v).unwrap_or_default();
    if value.is_empty() {
        return Err(usage_error(format!("Missing value for {}.", flag)));
    }
    Ok(value)
}

pub fn parse_cli_args<I, S>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut iter = args.into_iter();
    let _program_name = iter.next();

    let mut positionals: Vec<String> = Vec::new();
    let mut api_url: Option<String> = None;
    let mut api_key: Option<String> = None;
    let mut search: Option<String> = None;
    let mut watch = false;
    let mut duration: Option<Duration> = None;

    while let Some(arg) = iter.next() {
        let arg = arg.as_ref();
        match arg {
            "-h" | "--help" => return Ok(CliArgs::bare(CliCommand::Help)),
            "-V" | "--version" => return Ok(CliArgs::bare(CliCommand::Version)),
            "--url" => api_url = Some(required_value("--url", &mut iter)?),
            "--key" => api_key = Some(required_value("--key", &mut iter)?),
            "-s" | "--search" => search = Some(required_value("--search", &mut iter)?),
            "-w" | "--watch" => watch = true,
            "--" => {
                positionals.extend(iter.by_ref().map(|a| a.as_ref().to_string()));
                break;
            }
            "--for" => {
                let raw = required_value("--for", &mut iter)?;
                duration = Some(parse_secs_arg("--for", &raw)?);
            }
            _ if arg.starts_with("--url=") => api_url = Some(inline_value("--url", arg)?.into()),
            _ if arg.starts_with("--key=") => api_key = Some(inline_value("--key", arg)?.into()),
            _ if arg.starts_with("--search=") => {
                search = Some(inline_value("--search", arg)?.into())
            }
            _ if arg.starts_with("--for=") => {
                duration = Some(parse_secs_arg("--for", inline_value("--for", arg)?)?)
            }
            _ if arg.starts_with('-')
                && arg.len() > 1
                && !takes_free_words(positionals.first()) =>
            {
                return Err(usage_error(format!("Unknown argument: {arg}")));
            }
            _ => positionals.push(arg.to_string()),
        }
    }

    let mut positionals = positionals.into_iter();
    let name = positionals.next().unwrap_or_else(|| "dashboard".to_string());
    let rest: Vec<String> = positionals.collect();

    if search.is_some() && name != "devices" {
        return Err(usage_error("--search is only valid with devices."));
    }
    if watch && name != "dashboard" {
        return Err(usage_error("--watch is only valid with dashboard."));
    }
    if duration.is_some() && name != "watch" && !(name == "dashboard" && watch) {
        return Err(usage_error(
            "--for is only valid with watch or dashboard --watch.",
        ));
    }

    let command = match name.as_str() {
        "dashboard" => {
            expect_args(&name, &rest, 0)?;
            CliCommand::Dashboard { watch, duration }
        }
        "health" => {
            expect_args(&name, &rest, 0)?;
            CliCommand::Health
        }
        "devices" => {
            expect_args(&name, &rest, 0)?;
            CliCommand::Devices { search }
        }
        "scan" => {
            expect_args(&name, &rest, 0)?;
            CliCommand::Scan
        }
        "blocked" => {
            expect_args(&name, &rest, 0)?;
            CliCommand::Blocked
        }
        "timers" => {
            expect_args(&name, &rest, 0)?;
            CliCommand::Timers
        }
        "status" => CliCommand::Status {
            mac: single_mac(&name, &rest)?,
        },
        "device" => CliCommand::Device {
            mac: single_mac(&name, &rest)?,
        },
        "watch" => CliCommand::Watch {
            mac: single_mac(&name, &rest)?,
            duration,
        },
        "block" => CliCommand::Block {
            mac: single_mac(&name, &rest)?,
        },
        "unblock" => CliCommand::Unblock {
            mac: single_mac(&name, &rest)?,
        },
        "cancel-timer" => CliCommand::CancelTimer {
            mac: single_mac(&name, &rest)?,
        },
        "timer" => {
            expect_args(&name, &rest, 2)?;
            let minutes = parse_minutes(&rest[1]).map_err(usage_error)?;
            CliCommand::Timer {
                mac: rest[0].clone(),
                minutes,
            }
        }
        "rename" => {
            if rest.len() < 2 {
                return Err(usage_error("rename expects <MAC> <NAME>."));
            }
            CliCommand::Rename {
                mac: rest[0].clone(),
                name: rest[1..].join(" "),
            }
        }
        other => return Err(usage_error(format!("Unknown command: {other}"))),
    };

    Ok(CliArgs {
        command,
        api_url,
        api_key,
    })
}

fn expect_args(command: &str, rest: &[String], count: usize) -> Result<()> {
    if rest.len() != count {
        return Err(usage_error(format!(
            "{} expects {} argument(s), got {}.",
            command,
            count,
            rest.len()
        )));
    }
    Ok(())
}

fn single_mac(command: &str, rest: &[String]) -> Result<String> {
    expect_args(command, rest, 1)?;
    Ok(rest[0].clone())
}
