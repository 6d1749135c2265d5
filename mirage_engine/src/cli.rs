use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    about = "Host harness for the persistence registry and view manager",
    version
)]
pub struct Args {
    /// Build the demo object graph and save it to this slot file
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Description recorded in the save header (with --save)
    #[arg(long, default_value = "demo save")]
    pub description: String,

    /// Load a slot file and rebuild the object graph from it
    #[arg(long)]
    pub load: Option<PathBuf>,

    /// Read a slot file's header without loading its body
    #[arg(long)]
    pub inspect: Option<PathBuf>,

    /// Run the scripted window-stack session
    #[arg(long)]
    pub screen_demo: bool,

    /// Path to write the world state report as JSON (with --save or --load)
    #[arg(long)]
    pub state_json: Option<PathBuf>,

    /// Path to write the slot header summary as JSON (with --inspect)
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// Path to write the screen session trace as JSON (with --screen-demo)
    #[arg(long)]
    pub trace_json: Option<PathBuf>,
}

#[derive(Debug)]
pub enum Command {
    Save(SaveArgs),
    Load(LoadArgs),
    Inspect(InspectArgs),
    ScreenDemo(ScreenDemoArgs),
}

#[derive(Debug)]
pub struct SaveArgs {
    pub slot: PathBuf,
    pub description: String,
    pub state_json: Option<PathBuf>,
}

#[derive(Debug)]
pub struct LoadArgs {
    pub slot: PathBuf,
    pub state_json: Option<PathBuf>,
}

#[derive(Debug)]
pub struct InspectArgs {
    pub slot: PathBuf,
    pub summary_json: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ScreenDemoArgs {
    pub trace_json: Option<PathBuf>,
}

pub fn parse() -> Result<Command> {
    let args = Args::parse();
    args.into_command()
}

impl Args {
    fn into_command(self) -> Result<Command> {
        let modes = usize::from(self.save.is_some())
            + usize::from(self.load.is_some())
            + usize::from(self.inspect.is_some())
            + usize::from(self.screen_demo);
        if modes != 1 {
            bail!("pass exactly one of --save, --load, --inspect, --screen-demo");
        }

        if let Some(slot) = self.save {
            return Ok(Command::Save(SaveArgs {
                slot,
                description: self.description,
                state_json: self.state_json,
            }));
        }
        if let Some(slot) = self.load {
            return Ok(Command::Load(LoadArgs {
                slot,
                state_json: self.state_json,
            }));
        }
        if let Some(slot) = self.inspect {
            if self.state_json.is_some() {
                bail!("--state-json requires --save or --load");
            }
            return Ok(Command::Inspect(InspectArgs {
                slot,
                summary_json: self.summary_json,
            }));
        }
        if self.trace_json.is_some() && !self.screen_demo {
            bail!("--trace-json requires --screen-demo");
        }
        Ok(Command::ScreenDemo(ScreenDemoArgs {
            trace_json: self.trace_json,
        }))
    }
}
