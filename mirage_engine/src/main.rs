use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use mirage_persist::ClassRegistry;

mod cli;
mod objects;
mod savegame;
mod shell;

use cli::{Command, InspectArgs, LoadArgs, SaveArgs, ScreenDemoArgs};
use objects::{build_demo_world, create_session_state, register_object_model, world_report};
use savegame::{inspect_slot, load_world, save_world};
use shell::run_screen_session;

fn main() -> Result<()> {
    env_logger::init();

    match cli::parse()? {
        Command::Save(args) => run_save(args),
        Command::Load(args) => run_load(args),
        Command::Inspect(args) => run_inspect(args),
        Command::ScreenDemo(args) => run_screen_demo(args),
    }
}

fn run_save(args: SaveArgs) -> Result<()> {
    let mut registry = ClassRegistry::new();
    register_object_model(&mut registry)?;
    let (state, _) = create_session_state(&mut registry)?;
    let world = build_demo_world(&mut registry, &state)?;
    log::debug!("seeded demo world: {world:?}");

    let summary = save_world(&registry, &args.slot, &args.description)?;
    println!(
        "saved \"{}\" to {} (format {}.{})",
        summary.description,
        args.slot.display(),
        summary.format_major,
        summary.format_minor
    );

    if let Some(path) = args.state_json.as_deref() {
        let report = world_report(&registry)?;
        write_json(path, &report)?;
        println!("world state written to {}", path.display());
    }
    Ok(())
}

fn run_load(args: LoadArgs) -> Result<()> {
    let mut registry = ClassRegistry::new();
    register_object_model(&mut registry)?;
    // The session singleton must be live before the load so the saved one
    // can transplant onto it.
    create_session_state(&mut registry)?;

    let summary = load_world(&mut registry, &args.slot)?;
    let report = world_report(&registry)?;
    println!(
        "loaded \"{}\" from {}: {} room(s), {} actor(s), {} prop(s)",
        summary.description,
        args.slot.display(),
        report.rooms.len(),
        report.actors.len(),
        report.props.len()
    );

    if let Some(path) = args.state_json.as_deref() {
        write_json(path, &report)?;
        println!("world state written to {}", path.display());
    }
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let summary = inspect_slot(&args.slot)?;
    println!(
        "{}: \"{}\" (format {}.{}, build {}, timestamp {})",
        args.slot.display(),
        summary.description,
        summary.format_major,
        summary.format_minor,
        summary.build_tag,
        summary.timestamp
    );

    if let Some(path) = args.summary_json.as_deref() {
        write_json(path, &summary)?;
        println!("summary written to {}", path.display());
    }
    Ok(())
}

fn run_screen_demo(args: ScreenDemoArgs) -> Result<()> {
    let trace = run_screen_session()?;
    for step in &trace.steps {
        println!("{:<24} -> {}", step.action, step.outcome);
    }

    if let Some(path) = args.trace_json.as_deref() {
        write_json(path, &trace)?;
        println!("trace written to {}", path.display());
    }
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let payload =
        serde_json::to_string_pretty(value).context("serializing report to JSON")?;
    fs::write(path, payload).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
