use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::{fs, path::PathBuf};
use warmboot::fusedb::BUILTIN_TABLE;
use warmboot::prelude::*;

#[derive(Parser)]
#[command(about = "Extracts the Mariko warmboot firmware from a BOOT0 dump")]
struct Args {
    /// More output, repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(ClapArgs)]
struct Source {
    /// BOOT0 partition dump
    #[arg(short, long)]
    boot0: PathBuf,
    /// prod.keys style file holding mariko_bek
    #[arg(short, long, required_unless_present = "bek")]
    keys: Option<PathBuf>,
    /// Mariko BEK as hex, instead of a key file
    #[arg(long, conflicts_with = "keys")]
    bek: Option<String>,
    /// FUSE_RESERVED_ODM6
    #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
    odm6: u32,
    /// FUSE_RESERVED_ODM7
    #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
    odm7: u32,
    /// DRAM id, 4 and above is Mariko
    #[arg(long, default_value_t = 8)]
    dram_id: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and store `warmboot_mariko/wb_XX.bin` below an SD card root
    Extract {
        #[command(flatten)]
        source: Source,
        #[arg(short, long)]
        sd_root: PathBuf,
        /// Fuse database override, defaults to config/wb_db.txt on the SD card
        #[arg(long)]
        db: Option<PathBuf>,
        /// Report only, don't write anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Decrypt and walk Package1, printing everything learned on the way
    Inspect {
        #[command(flatten)]
        source: Source,
    },
    /// Expected fuse count of a firmware version
    Fuses {
        /// Firmware version, e.g. 0xD21 for 13.2.1. Prints the whole table if left out
        #[arg(value_parser = parse_hex_u32)]
        firmware: Option<u32>,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn parse_hex_u32(s: &str) -> std::result::Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("{s}: {e}"))
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    SimpleLogger::new()
        .with_level(level)
        .init()
        .context("Failed to set up logging")
}

fn load_cipher(source: &Source) -> Result<SoftwareCipher> {
    let keys = match (&source.keys, &source.bek) {
        (_, Some(bek)) => KeyBag::from_string(&format!("mariko_bek = {bek}"))?,
        (Some(path), None) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            KeyBag::from_string(&text)?
        },
        (None, None) => bail!("No key source given"),
    };
    Ok(SoftwareCipher::from_keybag(&keys)?)
}

fn run_extraction(source: &Source, diag: &mut Diagnostics) -> Result<warmboot::Result<Extraction>> {
    let storage = ImageStorage::from_boot0_file(&source.boot0)
        .with_context(|| format!("Failed to read {}", source.boot0.display()))?;
    let cipher = load_cipher(source)?;
    let fuses = StaticFuses::new(source.odm6, source.odm7, source.dram_id);
    Ok(Extractor::new(storage, cipher, fuses).extract(diag))
}

fn print_diagnostics(diag: &Diagnostics) {
    println!("Diagnostics:");
    if let Some(family) = diag.family {
        println!("  Hardware:        {family} ({})", family.soc_name());
    }
    println!("  Burnt fuses:     {}", diag.burnt_fuses);
    println!(
        "  Package1:        version {:#04x}, built {}",
        diag.package1_version,
        diag.package1_date.to_string_lossy()
    );
    println!("  Target firmware: {}", diag.target_firmware);
    println!("  PK11 candidates: {:#x?}", diag.pk11_candidates);
    match diag.pk11_offset {
        Some(offset) => println!("  PK11 offset:     {offset:#x}"),
        None => println!("  PK11 offset:     not found"),
    }
    println!("  PK11 header:     {:08x?}", diag.pk11_header);
    println!(
        "  Signatures:      {:08x?} ({} read)",
        &diag.signatures[..diag.signature_reads],
        diag.signature_reads
    );
    if let Some(cursor) = diag.cursor_offset {
        println!("  Cursor:          PK11 + {cursor:#x}");
    }
    if let Some(variant) = diag.layout_variant {
        println!("  Layout:          {variant:?}");
    }
    if let Some(size) = diag.warmboot_size {
        println!("  Warmboot size:   {size:#x}");
        println!("  First bytes:     {}", hex::encode(diag.warmboot_preview));
    }
}

fn print_report(extraction: &Extraction, db: &FuseDatabase) {
    let warmboot = &extraction.warmboot;
    println!("Warmboot:          {:#x} bytes", warmboot.size());
    println!(
        "Firmware:          {} ({})",
        extraction.target_firmware,
        extraction.diagnostics.package1_date.to_string_lossy()
    );
    match extraction.fuse_comparison(db) {
        FuseComparison::Match => println!("Fuses:             {} burnt, as expected", extraction.burnt_fuses),
        FuseComparison::BurntAhead { burnt, expected } => println!(
            "Fuses:             {burnt} burnt, firmware expects {expected} (downgraded unit)"
        ),
        FuseComparison::BurntBehind { burnt, expected } => println!(
            "Fuses:             {burnt} burnt, firmware expects {expected}"
        ),
    }
    match warmboot.metadata() {
        Some(meta) => println!("WBT0 metadata:     target {}", FirmwareVersion::new(meta.target_firmware)),
        None => println!("WBT0 metadata:     none"),
    }
    println!("SHA-256:           {}", extraction.digest());
    println!("Loader path:       {}", extraction.path());
}

fn fail(err: WarmbootError) -> anyhow::Error {
    anyhow::Error::new(err).context("Extraction failed")
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    match args.cmd {
        Commands::Extract { source, sd_root, db: db_path, dry_run } => {
            let mut db = FuseDatabase::new();
            match db_path {
                Some(path) => db.load_from_path(path),
                None => db.load_from_sd(&sd_root),
            };

            let mut diag = Diagnostics::default();
            let extraction = match run_extraction(&source, &mut diag)? {
                Ok(extraction) => extraction,
                Err(err) => {
                    print_diagnostics(&diag);
                    eprintln!("Error {}: {}", err.code(), err.description());
                    return Err(fail(err));
                },
            };

            print_report(&extraction, &db);
            if dry_run {
                println!("Dry run, nothing written");
            } else {
                let path = save_to_sd(&sd_root, &extraction)?;
                println!("Saved to {}", path.display());
            }
        },
        Commands::Inspect { source } => {
            let mut diag = Diagnostics::default();
            let result = run_extraction(&source, &mut diag)?;
            print_diagnostics(&diag);
            if let Err(err) = result {
                eprintln!("Error {}: {}", err.code(), err.description());
                return Err(fail(err));
            }
        },
        Commands::Fuses { firmware, db: db_path } => {
            let mut db = FuseDatabase::new();
            if let Some(path) = db_path {
                if !db.load_from_path(&path) {
                    bail!("No usable entries in {}", path.display());
                }
            }

            match firmware {
                Some(raw) => {
                    let version = FirmwareVersion::new(raw);
                    println!("{version}: {} fuses", db.expected_fuse_count(version));
                },
                None => {
                    let table = if db.is_loaded() { db.overrides() } else { &BUILTIN_TABLE[..] };
                    for entry in table {
                        println!(
                            "{:>8} {:2}",
                            FirmwareVersion::new(entry.firmware_version).to_string(),
                            entry.fuse_count
                        );
                    }
                },
            }
        },
    }
    Ok(())
}
