//! Command-line entry point.
//!
//! ```text
//! guestprep inventory           <image> [--format qcow2] [--family suse] [--output xml]
//! guestprep customize           <image> --request req.json
//! guestprep customize-inventory <image> --request req.json [--output json]
//! guestprep media               <iso-dir> <answer-file> [--arch i386] [--install-url URL]
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use guestprep::family::for_kind;
use guestprep::{
    CustomizationRequest, DiskFormat, DiskImage, FamilyKind, InventoryDocument, InventoryFormat,
    MediaCustomizer, MediaOptions, Orchestrator, PrepContext, PrepOptions,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "guestprep", about = "Prepare guest disk images on an ephemeral boot")]
struct Cli {
    /// Options file (JSON). Defaults apply to anything not set.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the packages installed in an image.
    Inventory {
        #[command(flatten)]
        target: ImageArgs,
        #[arg(long, value_enum, default_value_t = Output::Xml)]
        output: Output,
    },
    /// Install packages and files into an image.
    Customize {
        #[command(flatten)]
        target: ImageArgs,
        /// Customization request (JSON).
        #[arg(long)]
        request: PathBuf,
    },
    /// Customize, then list packages, in a single boot.
    CustomizeInventory {
        #[command(flatten)]
        target: ImageArgs,
        #[arg(long)]
        request: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Output::Xml)]
        output: Output,
    },
    /// Make extracted install media boot into an unattended install.
    Media {
        iso_dir: PathBuf,
        answer_file: PathBuf,
        #[arg(long, default_value = "suse")]
        family: FamilyKind,
        #[arg(long, default_value = "i386")]
        arch: String,
        #[arg(long)]
        install_url: Option<String>,
    },
}

#[derive(Args)]
struct ImageArgs {
    /// Disk image file.
    image: PathBuf,
    #[arg(long, value_enum, default_value_t = Format::Qcow2)]
    format: Format,
    #[arg(long, default_value = "suse")]
    family: FamilyKind,
    /// Free text carried into the inventory.
    #[arg(long)]
    description: Option<String>,
}

impl ImageArgs {
    fn disk(&self) -> DiskImage {
        let disk = DiskImage::new(&self.image, self.format.into());
        match &self.description {
            Some(description) => disk.with_description(description.clone()),
            None => disk,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Raw,
    Qcow2,
}

impl From<Format> for DiskFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Raw => DiskFormat::Raw,
            Format::Qcow2 => DiskFormat::Qcow2,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Output {
    Xml,
    Json,
}

impl From<Output> for InventoryFormat {
    fn from(output: Output) -> Self {
        match output {
            Output::Xml => InventoryFormat::Xml,
            Output::Json => InventoryFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let options = match &cli.config {
        Some(path) => PrepOptions::load(path)?,
        None => PrepOptions::default(),
    };

    match cli.command {
        Command::Inventory { target, output } => {
            let orchestrator = orchestrator(options, target.family).await?;
            let doc = orchestrator.generate_inventory(&target.disk()).await?;
            print_inventory(&doc, output)
        }
        Command::Customize { target, request } => {
            let request = load_request(&request)?;
            let orchestrator = orchestrator(options, target.family).await?;
            orchestrator.customize(&target.disk(), &request).await?;
            Ok(())
        }
        Command::CustomizeInventory {
            target,
            request,
            output,
        } => {
            let request = match request {
                Some(path) => load_request(&path)?,
                None => CustomizationRequest::default(),
            };
            let orchestrator = orchestrator(options, target.family).await?;
            let doc = orchestrator
                .customize_and_generate_inventory(&target.disk(), &request)
                .await?;
            print_inventory(&doc, output)
        }
        Command::Media {
            iso_dir,
            answer_file,
            family,
            arch,
            install_url,
        } => {
            MediaCustomizer::new(for_kind(family)).customize(
                &iso_dir,
                &answer_file,
                &MediaOptions { arch, install_url },
            )?;
            Ok(())
        }
    }
}

async fn orchestrator(options: PrepOptions, family: FamilyKind) -> Result<Orchestrator> {
    let ctx = PrepContext::from_options(options)
        .await
        .context("failed to initialize guestprep")?;
    Ok(Orchestrator::new(ctx, for_kind(family)))
}

fn load_request(path: &Path) -> Result<CustomizationRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read request {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid request {}", path.display()))
}

fn print_inventory(doc: &InventoryDocument, output: Output) -> Result<()> {
    println!("{}", doc.render(output.into())?);
    Ok(())
}
