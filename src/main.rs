use clap::{Parser, Subcommand};
use nvpk::entry::{HashEntry, PathEntry};
use nvpk::{
    DecodeOptions, FileEntry, HashPurpose, HashType, PackageFeatures, PackageReader, PackageWriter,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

#[derive(Parser)]
#[command(name = "nvpk", about = "Inspect and build NVPK package containers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store one or more files, uncompressed, in a new package
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long)]
        comment: Option<String>,
        /// Application ID written to the header
        #[arg(long, default_value = "0")]
        app_id: u64,
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// Extract stored files
    Extract {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// List file entries
    List {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show header, comment and signatures
    Info {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Check the package CRC, per-file CRCs and BLAKE3 content hashes
    Verify {
        input: PathBuf,
        /// Accept an optional-data section that ends early
        #[arg(long)]
        lenient: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    match Cli::parse().command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, comment, app_id, input } => {
            let mut writer = PackageWriter::new(BufWriter::new(File::create(&output)?))?;
            writer.header.app_id = app_id;
            for (i, path) in input.iter().enumerate() {
                let data = std::fs::read(path)?;
                let entry = build_entry(i as u64 + 1, path, &data)?;
                writer.add_file(entry, &data)?;
                println!("  stored  {}", path.display());
            }
            if let Some(text) = comment {
                writer.set_comment(&text)?;
            }
            writer.finalize()?;
            println!("Created: {}", output.display());
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output_dir } => {
            let mut reader = open(&input, DecodeOptions::default())?;
            let ids: Vec<u64> = reader.file_ids().collect();
            for id in ids {
                let (entry, data) = reader.read_file(id)?;
                if entry.compression_type.raw() != 0 || entry.encryption_type.raw() != 0 {
                    tracing::warn!(
                        file_id = id,
                        compression = %entry.compression_type,
                        encryption = %entry.encryption_type,
                        "skipping transformed file"
                    );
                    continue;
                }
                let fallback = format!("file_{id:08x}");
                let name = entry.primary_path().unwrap_or(&fallback);
                let Some(dest) = safe_join(&output_dir, name) else {
                    tracing::warn!(file_id = id, path = name, "skipping unsafe path");
                    continue;
                };
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&dest, &data)?;
                println!("  extracted  {}", dest.display());
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let mut reader = open(&input, DecodeOptions::default())?;
            let ids: Vec<u64> = reader.file_ids().collect();
            let entries = ids
                .into_iter()
                .map(|id| reader.entry(id))
                .collect::<Result<Vec<FileEntry>, _>>()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("Package: {}", input.display());
                println!("{:>8} {:>12} {:>12} {:>6} {:>8}  Path", "ID", "Size", "Stored", "Paths", "Codec");
                for e in &entries {
                    println!(
                        "{:>8} {:>12} {:>12} {:>6} {:>8}  {}",
                        e.file_id,
                        e.original_size,
                        e.stored_size,
                        e.paths.len(),
                        e.compression_type,
                        e.primary_path().unwrap_or("-"),
                    );
                }
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let mut reader = open(&input, DecodeOptions::default())?;
            let comment = match reader.comment()? {
                Some(c) => Some(c.comment()?.to_string()),
                None => None,
            };
            let signatures = reader.signature_infos()?;

            if json {
                #[derive(Serialize)]
                struct Info<'a> {
                    header:     &'a nvpk::PackageHeader,
                    comment:    Option<String>,
                    signatures: Vec<nvpk::SignatureInfo>,
                }
                let info = Info { header: &reader.header, comment, signatures };
                println!("{}", serde_json::to_string_pretty(&info)?);
                return Ok(());
            }

            let h = &reader.header;
            println!("── NVPK Package ─────────────────────────────────────────");
            println!("  Path             {}", input.display());
            println!("  Format version   {}", h.format_version);
            println!("  Data version     {}", h.package_data_version);
            println!("  Metadata version {}", h.metadata_version);
            println!("  Features         {:?}", h.features());
            println!("  Compression      {}", h.compression_type());
            println!("  Package CRC      0x{:08X}", h.package_crc);
            println!("  Created          {}", fmt_time(h.created_at()));
            println!("  Modified         {}", fmt_time(h.modified_at()));
            println!("  App ID           {}", h.app_id);
            println!("  Part             {} of {}", h.archive_part(), h.archive_total());
            println!("  Index            {} B at {}", h.index_size, h.index_start);
            println!("  Files            {}", reader.index.len());
            if let Some(text) = comment {
                println!("  Comment          {text}");
            }
            println!("  Signatures ({}):", signatures.len());
            for s in &signatures {
                println!("    #{} {} {} B at {}  {}", s.index, s.algorithm, s.size, s.offset, s.comment);
            }
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { input, lenient } => {
            let opts = if lenient { DecodeOptions::lenient() } else { DecodeOptions::default() };
            let mut reader = open(&input, opts)?;
            reader.verify_package_crc()?;

            let ids: Vec<u64> = reader.file_ids().collect();
            let mut failures = 0usize;
            for id in ids {
                let (entry, data) = reader.read_file(id)?;
                entry.validate()?;
                let plain = entry.compression_type.raw() == 0 && entry.encryption_type.raw() == 0;
                if let Some(h) = entry.hash_for(HashPurpose::ContentVerification) {
                    if plain && h.hash_type == HashType::Blake3 && h.data != blake3::hash(&data).as_bytes() {
                        println!("  FAIL  {} ({})", id, entry.primary_path().unwrap_or("-"));
                        failures += 1;
                        continue;
                    }
                }
                println!("  ok    {} ({})", id, entry.primary_path().unwrap_or("-"));
            }
            if failures > 0 {
                return Err(format!("{failures} file(s) failed content verification").into());
            }
            if reader.header.has_feature(PackageFeatures::HAS_SIGNATURES) {
                println!("Signature blocks present; cryptographic checks are not performed.");
            }
            println!("Verified: {}", input.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn open(path: &Path, opts: DecodeOptions) -> Result<PackageReader<BufReader<File>>, Box<dyn std::error::Error>> {
    Ok(PackageReader::open_with(BufReader::new(File::open(path)?), opts)?)
}

fn build_entry(file_id: u64, path: &Path, data: &[u8]) -> Result<FileEntry, Box<dyn std::error::Error>> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| format!("not a file: {}", path.display()))?;

    let meta = std::fs::metadata(path)?;
    let secs = |t: std::io::Result<std::time::SystemTime>| {
        t.ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs())
    };
    let mtime = secs(meta.modified());

    let mut entry = FileEntry::new(file_id);
    entry.add_path(PathEntry::new(name).with_owner(0o100644, 0, 0).with_times(mtime, mtime, secs(meta.accessed())));
    entry.add_hash(HashEntry::new(
        HashType::Blake3,
        HashPurpose::ContentVerification,
        blake3::hash(data).as_bytes().to_vec(),
    ));
    entry.set_checksums(data, data);
    Ok(entry)
}

/// Joins `name` under `root`, refusing absolute paths and parent components.
fn safe_join(root: &Path, name: &str) -> Option<PathBuf> {
    let rel = Path::new(name);
    if rel.components().all(|c| matches!(c, Component::Normal(_))) {
        Some(root.join(rel))
    } else {
        None
    }
}

fn fmt_time(t: Option<chrono::DateTime<chrono::Utc>>) -> String {
    t.map_or_else(|| "-".to_string(), |t| t.to_rfc3339())
}
