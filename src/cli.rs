use anyhow::{Result, anyhow};
use log::info;
use pico_args::Arguments;
use std::{env, path::PathBuf};

use pointerctl::config::Profile;
use pointerctl::{input, replay};

use crate::pipeline;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // options first so their values aren't taken as free args
    let config: Option<PathBuf> = pargs.opt_value_from_str("--config")?;
    let no_snap = pargs.contains("--no-snap");

    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("replay") => {
            let script: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: pointerctl replay <script.jsonl> [--no-snap]"))?;
            let profile = load_profile(config)?;
            let lines = replay::load_script(&script)?;
            let events = replay::run(&profile, &lines, !no_snap);
            pipeline::print_events(&events);
            info!(
                "replayed {} input lines into {} gesture events",
                lines.len(),
                events.len()
            );
            Ok(())
        }

        Some("watch") => {
            let device: Option<String> = pargs.opt_free_from_str()?;
            let profile = load_profile(config)?;
            pipeline::run_watch(&profile, device)
        }

        Some("devices") => {
            let devices = input::discover_pointers();
            if devices.is_empty() {
                println!("no pointer devices found");
                if !input::in_input_group() {
                    println!("hint: add your user to the 'input' group to read /dev/input");
                }
            }
            for d in devices {
                println!("{}\t{}", d.path, d.name);
            }
            Ok(())
        }

        Some("config") => {
            let profile = load_profile(config)?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn load_profile(path: Option<PathBuf>) -> Result<Profile> {
    let profile = match path {
        Some(p) => Profile::load(&p)?,
        None => Profile::load_or_install_default()?,
    };
    info!("using profile '{}'", profile.name());
    Ok(profile)
}

fn print_help() {
    println!(
        r#"pointerctl — pointer gesture classifier

USAGE:
  pointerctl help [command]             Show general or command-specific help
  pointerctl replay <script.jsonl>      Replay scripted pointer input, print gesture events
  pointerctl watch [device]             Classify a live mouse until Ctrl-C
  pointerctl devices                    List pointer devices
  pointerctl config                     Print the effective profile

OPTIONS:
  --config <path>                       Profile to use instead of the default
  --no-snap                             Replay without grid snapping

TIPS:
  - Default profile: ~/.config/pointerctl/config.toml
  - Set RUST_LOG=debug to see state transitions
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "replay" => println!(
            "usage: pointerctl replay <script.jsonl> [--config <path>] [--no-snap]\n\
             Each line: {{\"t_ms\":0,\"event\":\"down\",\"button\":\"primary\",\"x\":10,\"y\":10}}\n\
             Events: down, drag, up (with optional \"clicks\"), move, enter, exit,\n\
             focus_lost, enable, disable, tick."
        ),
        "watch" => println!(
            "usage: pointerctl watch [device] [--config <path>]\n\
             Reads the first pointer device (or <device>) and prints gesture events as JSON lines."
        ),
        "devices" => println!("usage: pointerctl devices\nLists evdev devices with buttons and relative motion."),
        "config" => println!(
            "usage: pointerctl config [--config <path>]\nPrints the profile after defaults are applied."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}
