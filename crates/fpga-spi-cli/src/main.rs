//! `fpga-spi`: drive the SPI sub-controller manager from the command line.
//!
//! ```text
//! USAGE:
//!   fpga-spi run <script>     Replay a lifecycle script
//!   fpga-spi demo             Attach, map, stage, create, detach one card
//!   fpga-spi attributes       List the per-device attribute interface
//! ```
//!
//! Every session runs against the in-memory software backends. Policy comes
//! from `FPGA_SPI_REVOKE_ON_UNMAP` / `FPGA_SPI_REQUIRE_MAPPED`, overridden
//! by the flags below.

mod script;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fpga_spi_driver::{Attribute, ManagerOptions, ATTRIBUTE_GROUP, ATTRIBUTE_MODE};
use tracing_subscriber::EnvFilter;

use script::Session;

const DEMO_SCRIPT: &str = "\
# one card, one controller in slot 1
attach 0000:01:00.0
map 0000:01:00.0 0x2000 0x1000
write 0000:01:00.0 slot_size 0x100
write 0000:01:00.0 window_base_offset 0
write 0000:01:00.0 chip_select_count 1
write 0000:01:00.0 chip_select 0
write 0000:01:00.0 bus_driver_name spidev-ctrl
write 0000:01:00.0 device_driver_name spidev
write 0000:01:00.0 create_controller 1
list 0000:01:00.0
detach 0000:01:00.0
";

#[derive(Parser)]
#[command(name = "fpga-spi", about = "FPGA SPI sub-controller manager", version)]
struct Cli {
    /// Destroy controllers when their BAR is unmapped.
    #[arg(long, global = true)]
    revoke_on_unmap: bool,
    /// Refuse to create controllers before the BAR is mapped.
    #[arg(long, global = true)]
    require_mapped: bool,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Replay a lifecycle script.
    Run {
        /// Script file, one command per line.
        script: PathBuf,
    },
    /// Run the built-in single-card scenario.
    Demo,
    /// List the attribute interface published per device.
    Attributes,
}

impl Cli {
    fn options(&self) -> ManagerOptions {
        let mut options = ManagerOptions::from_env();
        if self.revoke_on_unmap {
            options = options.with_revoke_on_unmap(true);
        }
        if self.require_mapped {
            options = options.with_require_mapped_window(true);
        }
        options
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let options = cli.options();

    match cli.command {
        Cmd::Run { script } => cmd_run(&script, options)?,
        Cmd::Demo => cmd_demo(options)?,
        Cmd::Attributes => cmd_attributes(),
    }

    Ok(())
}

fn cmd_run(path: &Path, options: ManagerOptions) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    replay(&text, options)
}

fn cmd_demo(options: ManagerOptions) -> Result<()> {
    replay(DEMO_SCRIPT, options)
}

fn replay(text: &str, options: ManagerOptions) -> Result<()> {
    let steps = script::parse(text)?;
    let session = Session::new(options)?;
    let summary = session.run(&steps);

    println!();
    println!(
        "{} command(s), {} failed, {} platform device(s) live",
        summary.executed,
        summary.failed,
        session.bus.live_devices()
    );
    if summary.failed > 0 {
        bail!("{} command(s) failed", summary.failed);
    }
    Ok(())
}

fn cmd_attributes() {
    println!("Attribute group \"{ATTRIBUTE_GROUP}\" (mode {ATTRIBUTE_MODE:o})");
    for attr in Attribute::ALL {
        let kind = if attr.is_action() { "action" } else { "value" };
        println!("  {:<20} {kind}", attr.name());
    }
}
