//! latticecl hardware and cache inspector

use clap::{Parser, Subcommand};
use latticecl::cache::CacheStore;
use latticecl::catalog::OclCatalog;
use latticecl::device::OpenCLDevice;
use latticecl::params::ParamFile;
use latticecl::{ManagerConfig, Vendor};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "latticecl-info")]
#[command(about = "Inspect OpenCL hardware and the latticecl program cache")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every platform and device
    Devices,

    /// Show the device a manager would select, with its capabilities
    Select {
        /// Platform vendor filter (amd, apple, nvidia, intel, any)
        #[arg(long, default_value = "any")]
        platform_vendor: Vendor,

        /// Device vendor filter
        #[arg(long, default_value = "any")]
        device_vendor: Vendor,

        /// Read selection settings from a KEY=VALUE parameter file instead
        #[arg(long, value_name = "FILE", conflicts_with_all = ["platform_vendor", "device_vendor"])]
        params: Option<PathBuf>,
    },

    /// List the slots of a program cache directory
    Cache {
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> latticecl::Result<()> {
    match cli.command.unwrap_or(Commands::Devices) {
        Commands::Devices => {
            let catalog = OclCatalog::enumerate()?;
            print!("{catalog}");
        }
        Commands::Select {
            platform_vendor,
            device_vendor,
            params,
        } => {
            let config = match params {
                Some(path) => ManagerConfig::from_params(&ParamFile::load(path)?)?,
                None => ManagerConfig::default().with_vendors(platform_vendor, device_vendor),
            };
            let catalog = OclCatalog::enumerate()?;
            let selection = match (config.platform_index, config.device_index) {
                (Some(p), Some(d)) => catalog.select(p, d)?,
                _ => catalog.auto_select(config.platform_vendor, config.device_vendor)?,
            };
            let device = OpenCLDevice::open(&catalog, selection, false)?;
            println!("Platform index:  {}", selection.platform);
            println!("Device index:    {}", selection.device);
            println!("{}", device.identity());
        }
        Commands::Cache { dir } => {
            let store = CacheStore::open(dir.clone())?;
            if store.is_empty() {
                println!("No cached programs in {}", dir.display());
            }
            for (slot, descriptor) in store.slots() {
                let size = store.read_binary(slot).map(|b| b.len()).unwrap_or(0);
                println!(
                    "slot {slot}: program {} md5 {} ({size} bytes) {}",
                    descriptor.number, descriptor.hash, descriptor.date
                );
                println!("    device   {}", descriptor.device);
                println!("    platform {}", descriptor.platform);
                if let Some(options) = &descriptor.options {
                    println!("    options  {options}");
                }
            }
        }
    }
    Ok(())
}
