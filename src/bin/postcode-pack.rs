//! postcode-pack CLI
//!
//! Generate, sign, verify and search partitioned postcode datasets

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use postcode_pack::{
    generate_keypair, CompressionMethod, DirectoryStore, Generator, GeneratorConfig, Loader,
    LoaderConfig, Manifest, PartitionStore, PublicKey, SourceRow, TrustConfig,
};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "postcode-pack")]
#[command(about = "Signed, partitioned postcode datasets")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an Ed25519 key pair (hex files)
    Keygen {
        /// Directory for signing.key and signing.pub
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Partition, encode and publish source rows (JSON Lines)
    Generate {
        /// Input file, one {"code", "easting", "northing", "region_code"} object per line
        input: PathBuf,

        /// Output directory
        output_dir: PathBuf,

        /// Compression method (lz4, zstd)
        #[arg(short, long, default_value = "zstd")]
        compression: CompressionMethod,

        /// Compression level (zstd only)
        #[arg(short, long)]
        level: Option<i32>,

        /// Sign the manifest with this private key file
        #[arg(long)]
        sign_key: Option<PathBuf>,
    },

    /// Sign a published manifest
    Sign {
        /// Dataset directory
        data_dir: PathBuf,

        /// Private key file (32 raw bytes or 64 hex chars)
        #[arg(short, long)]
        key: PathBuf,
    },

    /// Authenticate the manifest and verify every partition
    Verify {
        /// Dataset directory
        data_dir: PathBuf,

        #[command(flatten)]
        trust: TrustArgs,
    },

    /// Search postcodes by prefix
    Search {
        /// Partial postcode, e.g. "AB1"
        partial_postcode: String,

        /// Dataset directory
        #[arg(short, long)]
        data_dir: PathBuf,

        #[command(flatten)]
        trust: TrustArgs,
    },
}

#[derive(clap::Args, Debug)]
struct TrustArgs {
    /// Public key file used to verify the manifest signature
    #[arg(long, conflicts_with_all = ["config", "insecure"])]
    public_key: Option<PathBuf>,

    /// Loader configuration file (TOML)
    #[arg(long, conflicts_with = "insecure")]
    config: Option<PathBuf>,

    /// Skip manifest signature verification (non-production only)
    #[arg(long)]
    insecure: bool,
}

impl TrustArgs {
    fn loader_config(&self) -> Result<LoaderConfig> {
        if let Some(path) = &self.public_key {
            let blob = fs::read(path).with_context(|| format!("reading {:?}", path))?;
            let public_key = PublicKey::from_bytes(&blob)?;
            return Ok(LoaderConfig::new(TrustConfig::verified(public_key)));
        }
        if let Some(path) = &self.config {
            return LoaderConfig::from_file(path).with_context(|| format!("loading {:?}", path));
        }
        if self.insecure {
            return Ok(LoaderConfig::new(TrustConfig::insecure()));
        }
        bail!("one of --public-key, --config or --insecure is required")
    }
}

fn read_rows(path: &Path) -> Result<Vec<SourceRow>> {
    let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
    let mut rows = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row: SourceRow = serde_json::from_str(&line)
            .with_context(|| format!("{:?} line {}", path, idx + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

fn keygen(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)?;
    let keys = generate_keypair();

    let secret_path = out_dir.join("signing.key");
    let public_path = out_dir.join("signing.pub");
    fs::write(&secret_path, hex::encode(keys.secret()))?;
    fs::write(&public_path, keys.public().to_hex())?;

    info!("Wrote key pair {} to {:?}", keys.public().key_id(), out_dir);
    println!("key_id: {}", keys.public().key_id());
    Ok(())
}

fn generate(
    input: &Path,
    output_dir: &Path,
    config: GeneratorConfig,
    sign_key: Option<&Path>,
) -> Result<()> {
    let rows = read_rows(input)?;
    info!("Read {} rows from {:?}", rows.len(), input);

    let dataset = Generator::from_config(&config).generate(rows)?;
    let store = DirectoryStore::new(output_dir);
    store.publish(&dataset)?;

    for (key, bytes) in dataset.partitions() {
        println!(
            "{}: {:>8} rows {:>10} bytes",
            key,
            dataset.record_count(key),
            bytes.len()
        );
    }
    println!(
        "Written {} postcodes in {} partitions to {:?}",
        dataset.total_records(),
        dataset.manifest().len(),
        output_dir
    );

    if let Some(path) = sign_key {
        let key = fs::read(path).with_context(|| format!("reading {:?}", path))?;
        let signature = dataset.sign(&key)?;
        store.write_signature(&signature.to_bytes()?)?;
        println!("Signed with key {}", signature.key_id);
    }
    Ok(())
}

fn sign(data_dir: &Path, key_path: &Path) -> Result<()> {
    let store = DirectoryStore::new(data_dir);
    let manifest_bytes = store.fetch_manifest().context("reading manifest")?;

    // Refuse to sign something that is not a manifest
    let manifest = Manifest::from_bytes(&manifest_bytes)?;

    let key = fs::read(key_path).with_context(|| format!("reading {:?}", key_path))?;
    let signature = postcode_pack::sign(&manifest_bytes, &key)?;
    store.write_signature(&signature.to_bytes()?)?;

    println!(
        "Signed manifest ({} partitions) with key {}",
        manifest.len(),
        signature.key_id
    );
    Ok(())
}

fn verify(data_dir: &Path, trust: &TrustArgs) -> Result<()> {
    let config = trust.loader_config()?;
    let loader = Loader::from_config(DirectoryStore::new(data_dir), &config)?;

    let keys = loader.available_partitions();
    loader.ensure_loaded_all(keys.iter().copied())?;

    println!(
        "Verified {} partitions, {} postcodes",
        keys.len(),
        loader.table().len()
    );
    Ok(())
}

fn search(partial: &str, data_dir: &Path, trust: &TrustArgs) -> Result<()> {
    let config = trust.loader_config()?;
    let loader = Loader::from_config(DirectoryStore::new(data_dir), &config)?;

    let results = loader.search(partial)?;
    if results.is_empty() {
        println!("No postcodes found for {}", postcode_pack::abbreviate(partial));
        return Ok(());
    }

    println!("{:<10} {:>8} {:>8}  {}", "Postcode", "Easting", "Northing", "Region");
    for record in &results {
        let easting = record.easting().map(|e| format!("{:06}", e)).unwrap_or_default();
        let northing = record.northing().map(|n| format!("{:06}", n)).unwrap_or_default();
        println!(
            "{:<10} {:>8} {:>8}  {}",
            record.code(),
            easting,
            northing,
            record.region_code()
        );
    }
    println!("Found {} postcodes", results.len());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Keygen { out_dir } => keygen(&out_dir),
        Command::Generate {
            input,
            output_dir,
            compression,
            level,
            sign_key,
        } => {
            let mut config = GeneratorConfig {
                compression,
                ..GeneratorConfig::default()
            };
            if let Some(level) = level {
                config.level = level;
            }
            generate(&input, &output_dir, config, sign_key.as_deref())
        }
        Command::Sign { data_dir, key } => sign(&data_dir, &key),
        Command::Verify { data_dir, trust } => verify(&data_dir, &trust),
        Command::Search {
            partial_postcode,
            data_dir,
            trust,
        } => search(&partial_postcode, &data_dir, &trust),
    }
}
