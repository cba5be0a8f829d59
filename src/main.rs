use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};

use rusty_fat12::config::ToolConfig;
use rusty_fat12::fs::entry::FileEntry;
use rusty_fat12::fs::fat12::format::{format_volume, volume_id_for, FloppyFormat};
use rusty_fat12::image::DiskImage;
use rusty_fat12::logger;
use rusty_fat12::operation::{run_operation, Operation, Outcome, PutRequest, RunOptions};
use rusty_fat12::report;

#[derive(Parser, Debug)]
#[command(version = env!("APP_VERSION"), about = "Work with files on FAT12 disk images")]
struct Args {
    /// Configuration file to use instead of the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show basic information about the image
    Info { image: PathBuf },
    /// List the root directory
    List { image: PathBuf },
    /// Copy a file out of the image
    Get {
        image: PathBuf,
        name: String,
        /// Destination path (defaults to NAME in the output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Copy a host file into the root directory
    Put {
        image: PathBuf,
        file: PathBuf,
        /// Skip reading the file back after writing it
        #[arg(long)]
        no_verify: bool,
    },
    /// Create a blank floppy image
    Format {
        image: PathBuf,
        /// Size in KiB: 1440 or 720
        #[arg(long, default_value_t = 1440)]
        size: u32,
        #[arg(long)]
        label: Option<String>,
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = ToolConfig::load(args.config.as_deref())?;
    let level = logger::level_for_verbosity(config.level_filter(), args.verbose);
    logger::init(level).map_err(|e| anyhow!("cannot install logger: {e}"))?;
    let json = args.json || config.json_output;

    match args.command {
        Command::Info { image } => {
            let mut disk = DiskImage::open(&image)?;
            if let Outcome::Info(info) =
                run_operation(disk.bytes_mut(), Operation::Info, &RunOptions::default())?
            {
                print_result(json, &info, || report::render_info(&info))?;
            }
        }
        Command::List { image } => {
            let mut disk = DiskImage::open(&image)?;
            if let Outcome::List(entries) =
                run_operation(disk.bytes_mut(), Operation::List, &RunOptions::default())?
            {
                print_result(json, &entries, || report::render_list(&entries))?;
            }
        }
        Command::Get {
            image,
            name,
            output,
        } => {
            let mut disk = DiskImage::open(&image)?;
            let outcome = run_operation(
                disk.bytes_mut(),
                Operation::Get { name },
                &RunOptions::default(),
            )?;
            if let Outcome::Get { entry, data } = outcome {
                let dest = match output {
                    Some(path) => path,
                    None => default_output(&config, &entry)?,
                };
                fs::write(&dest, &data)
                    .with_context(|| format!("cannot write {}", dest.display()))?;
                print_result(json, &entry, || "File retrieved.\n".to_string())?;
            }
        }
        Command::Put {
            image,
            file,
            no_verify,
        } => {
            let mut disk = DiskImage::open(&image)?;
            let request = PutRequest::from_path(&file)?;
            let options = RunOptions {
                verify_after_put: config.verify_after_put && !no_verify,
            };
            match run_operation(disk.bytes_mut(), Operation::Put(request), &options) {
                Ok(Outcome::Put { entry, .. }) => {
                    disk.flush()?;
                    print_result(json, &entry, || "File written.\n".to_string())?;
                }
                Ok(_) => {}
                Err(e) if e.volume_modified() => {
                    disk.flush()?;
                    return Err(e).context("the image was changed; file not fully written");
                }
                Err(e) => return Err(e).context("no changes were made to the image"),
            }
        }
        Command::Format {
            image,
            size,
            label,
            force,
        } => {
            let format = FloppyFormat::from_kilobytes(size)
                .with_context(|| format!("unsupported floppy size {size} KiB"))?;
            let data = format_volume(
                &format,
                label.as_deref(),
                volume_id_for(Local::now().naive_local()),
            );
            let disk = DiskImage::create(&image, data, force)?;
            if !json {
                println!("Formatted {} as a {} floppy.", disk.path().display(), format.name);
            }
        }
    }
    Ok(())
}

fn default_output(config: &ToolConfig, entry: &FileEntry) -> Result<PathBuf> {
    let name = entry.host_file_name().with_context(|| {
        format!("{:?} is not a safe host file name; pass --output", entry.name)
    })?;
    Ok(match &config.output_dir {
        Some(dir) => dir.join(name),
        None => Path::new(name).to_path_buf(),
    })
}

fn print_result<T: serde::Serialize + ?Sized>(
    json: bool,
    value: &T,
    text: impl FnOnce() -> String,
) -> Result<()> {
    if json {
        println!("{}", report::to_json(value)?);
    } else {
        print!("{}", text());
    }
    Ok(())
}
