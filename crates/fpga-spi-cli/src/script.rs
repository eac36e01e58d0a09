//! Lifecycle scripts
//!
//! One command per line; `#` starts a comment.
//!
//! ```text
//! attach 0000:01:00.0
//! map    0000:01:00.0 0x2000 0x1000
//! write  0000:01:00.0 slot_size 0x100
//! write  0000:01:00.0 create_controller 1
//! list   0000:01:00.0
//! ```

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use fpga_spi_driver::prelude::*;

/// One parsed script command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Attach { device: String },
    Detach { device: String },
    Map { device: String, base: u64, len: u64 },
    Unmap { device: String },
    Write { device: String, attribute: String, value: String },
    Show { device: String, attribute: Option<String> },
    List { device: String },
}

/// A command and the line it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub line: usize,
    pub command: Command,
}

/// Parse a whole script
///
/// # Errors
///
/// Fails on the first malformed line, naming its line number.
pub fn parse(text: &str) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for (n, raw) in text.lines().enumerate() {
        let line = n + 1;
        if let Some(command) = parse_line(raw).with_context(|| format!("line {line}"))? {
            steps.push(Step { line, command });
        }
    }
    Ok(steps)
}

/// Parse one line; comments and blank lines yield `None`
///
/// # Errors
///
/// Fails for unknown verbs, missing operands and bad numbers.
pub fn parse_line(raw: &str) -> Result<Option<Command>> {
    let line = raw.split('#').next().unwrap_or_default().trim();
    if line.is_empty() {
        return Ok(None);
    }

    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let device = words
        .next()
        .ok_or_else(|| anyhow!("`{verb}` needs a device"))?
        .to_string();

    let command = match verb {
        "attach" => Command::Attach { device },
        "detach" => Command::Detach { device },
        "unmap" => Command::Unmap { device },
        "list" => Command::List { device },
        "map" => {
            let base = parse_u64(words.next().ok_or_else(|| anyhow!("`map` needs a base"))?)?;
            let len = parse_u64(words.next().ok_or_else(|| anyhow!("`map` needs a length"))?)?;
            Command::Map { device, base, len }
        }
        "write" => {
            let attribute = words
                .next()
                .ok_or_else(|| anyhow!("`write` needs an attribute"))?
                .to_string();
            let value = words.by_ref().collect::<Vec<_>>().join(" ");
            if value.is_empty() {
                bail!("`write {attribute}` needs a value");
            }
            Command::Write {
                device,
                attribute,
                value,
            }
        }
        "show" => Command::Show {
            device,
            attribute: words.next().map(str::to_string),
        },
        other => bail!("unknown command `{other}`"),
    };

    if let Some(extra) = words.next() {
        bail!("unexpected `{extra}` after `{verb}`");
    }
    Ok(Some(command))
}

fn parse_u64(text: &str) -> Result<u64> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("`{text}` is not a number"))
}

/// A manager wired to the software backends with the protocol loaded
pub struct Session {
    pub bus: Arc<SoftwareBus>,
    pub host: Arc<SoftwareHost>,
    pub manager: Arc<SpiControllerManager>,
    _module: SpiProtocolModule,
}

/// Outcome of running a script
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub executed: usize,
    pub failed: usize,
}

impl Session {
    /// Fresh session
    ///
    /// # Errors
    ///
    /// Fails if the protocol cannot be registered.
    pub fn new(options: ManagerOptions) -> Result<Self> {
        let bus = Arc::new(SoftwareBus::new());
        let host = Arc::new(SoftwareHost::new());
        let manager = SpiControllerManager::with_options(bus.clone(), host.clone(), options);
        let module = SpiProtocolModule::load(host.clone(), manager.clone())?;
        Ok(Self {
            bus,
            host,
            manager,
            _module: module,
        })
    }

    /// Run one command, returning what it prints
    ///
    /// # Errors
    ///
    /// Returns the driver error of a failed command.
    pub fn execute(&self, command: &Command) -> Result<String, SpiError> {
        match command {
            Command::Attach { device } => {
                self.host.attach(&device.as_str().into())?;
                Ok(format!("attached {device}"))
            }
            Command::Detach { device } => {
                self.host.detach(&device.as_str().into());
                Ok(format!("detached {device}"))
            }
            Command::Map { device, base, len } => {
                self.host.map_bar(&device.as_str().into(), *base, *len);
                Ok(format!("mapped {device} at {base:#x} (+{len:#x})"))
            }
            Command::Unmap { device } => {
                self.host.unmap_bar(&device.as_str().into());
                Ok(format!("unmapped {device}"))
            }
            Command::Write {
                device,
                attribute,
                value,
            } => {
                let written = self
                    .host
                    .write(&device.as_str().into(), attribute, &format!("{value}\n"))?;
                Ok(format!("{device}/{attribute} <- {value} ({written} bytes)"))
            }
            Command::Show { device, attribute } => {
                self.show(&device.as_str().into(), attribute.as_deref())
            }
            Command::List { device } => self.list(&device.as_str().into()),
        }
    }

    fn show(
        &self,
        device: &PhysicalDeviceId,
        attribute: Option<&str>,
    ) -> Result<String, SpiError> {
        if let Some(name) = attribute {
            let value = self.host.read(device, name)?;
            return Ok(format!("{device}/{name} = {}", value.trim_end()));
        }
        let mut lines = Vec::new();
        for attr in Attribute::ALL.iter().filter(|a| !a.is_action()) {
            let value = self.host.read(device, attr.name())?;
            lines.push(format!("{device}/{attr} = {}", value.trim_end()));
        }
        Ok(lines.join("\n"))
    }

    fn list(&self, device: &PhysicalDeviceId) -> Result<String, SpiError> {
        let window = self.manager.window(device)?;
        let controllers = self.manager.controllers(device)?;
        let mut lines = vec![if window.mapped {
            format!(
                "{device}: BAR {:#x} (+{:#x}), {} controller(s)",
                window.base,
                window.len,
                controllers.len()
            )
        } else {
            format!("{device}: BAR unmapped, {} controller(s)", controllers.len())
        }];
        for handle in &controllers {
            lines.push(format!(
                "  [{}] {} {} cs={}/{} -> {}",
                handle.slot,
                handle.name(),
                handle.range,
                handle.peripheral.chip_select,
                handle.num_chipselect,
                handle.peripheral.modalias
            ));
        }
        Ok(lines.join("\n"))
    }

    /// Run every step, printing results; failures are reported and skipped
    pub fn run(&self, steps: &[Step]) -> Summary {
        let mut summary = Summary::default();
        for step in steps {
            summary.executed += 1;
            match self.execute(&step.command) {
                Ok(output) => println!("{output}"),
                Err(e) => {
                    summary.failed += 1;
                    println!("line {}: error: {e} (errno {})", step.line, e.to_errno());
                }
            }
        }
        summary
    }
}
