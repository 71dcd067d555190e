use crate::tvm::{
    Address, BocFlags, Cell, DEFAULT_DUMP_LIMIT, StdAddress, begin_cell, boc_to_base64,
    boc_to_hex, deserialize_boc,
};
use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};

/// tonutils-cell CLI
#[derive(Parser, Debug)]
#[command(name = "tonutils-cell")]
#[command(about = "Inspect and convert TON bags of cells", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Where the BoC comes from
#[derive(Args, Debug)]
pub struct Input {
    /// BoC as hex or base64 text
    pub boc: Option<String>,
    /// Read raw BoC bytes from a file
    #[arg(short = 'f', long, conflicts_with = "boc")]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the cell tree of every root
    Inspect {
        #[command(flatten)]
        input: Input,
        /// Dump size limit in bytes
        #[arg(short = 'l', long, default_value_t = DEFAULT_DUMP_LIMIT)]
        limit: usize,
        /// Show payloads as binary digits instead of hex
        #[arg(long)]
        bits: bool,
    },
    /// Print representation hash and depth of every root
    Hash {
        #[command(flatten)]
        input: Input,
    },
    /// Re-serialize with the given flags
    Convert {
        #[command(flatten)]
        input: Input,
        /// Append a CRC32C checksum
        #[arg(long)]
        crc: bool,
        /// Emit the offset index table
        #[arg(long)]
        index: bool,
        /// Mark shared cells in the index
        #[arg(long, requires = "index")]
        cache: bool,
        /// Print base64 instead of hex
        #[arg(long)]
        base64: bool,
    },
    /// Print the first root as interchange JSON
    ToJson {
        #[command(flatten)]
        input: Input,
    },
    /// Read interchange JSON and print it as a BoC
    FromJson {
        /// JSON document
        json: Option<String>,
        /// Read JSON from a file
        #[arg(short = 'f', long, conflicts_with = "json")]
        file: Option<PathBuf>,
    },
    /// Show every form of a standard address
    Address {
        /// Raw (`wc:hex`) or user-friendly address
        address: String,
        /// Mark user-friendly forms as testnet only
        #[arg(short = 't', long)]
        testnet: bool,
    },
}

impl Input {
    fn read(&self) -> Result<Vec<Arc<Cell>>> {
        let start = Instant::now();
        let bytes = match (&self.boc, &self.file) {
            (_, Some(path)) => std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            (Some(text), None) => decode_text(text.trim())?,
            (None, None) => return Err(anyhow!("either a BoC or --file is required")),
        };

        let roots = deserialize_boc(&bytes)?;
        log::debug!(
            "parsed {} bytes into {} roots in {:.3}s",
            bytes.len(),
            roots.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(roots)
    }
}

fn decode_text(text: &str) -> Result<Vec<u8>> {
    if text.len() % 2 == 0 && text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Ok(hex::decode(text)?);
    }

    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .context("input is neither hex nor base64")
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Execute the command
    pub fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Inspect { input, limit, bits } => {
                self.execute_inspect(input, *limit, *bits)
            }
            Commands::Hash { input } => self.execute_hash(input),
            Commands::Convert {
                input,
                crc,
                index,
                cache,
                base64,
            } => {
                let flags = BocFlags {
                    index: *index,
                    crc32c: *crc,
                    cache_bits: *cache,
                };
                self.execute_convert(input, flags, *base64)
            }
            Commands::ToJson { input } => self.execute_to_json(input),
            Commands::FromJson { json, file } => self.execute_from_json(json.as_deref(), file.as_ref()),
            Commands::Address { address, testnet } => self.execute_address(address, *testnet),
        }
    }

    fn execute_inspect(&self, input: &Input, limit: usize, bits: bool) -> Result<()> {
        for (i, root) in input.read()?.iter().enumerate() {
            let dump = if bits {
                root.dump_bits(limit)
            } else {
                root.dump(limit)
            };
            log::info!("root #{} ({:?}, level {}):", i, root.kind(), root.level());
            println!("{dump}");
            if dump.len() >= limit {
                log::warn!("dump of root #{} truncated at {} bytes", i, limit);
            }
        }
        Ok(())
    }

    fn execute_hash(&self, input: &Input) -> Result<()> {
        for (i, root) in input.read()?.iter().enumerate() {
            log::info!("root #{} depth {}", i, root.depth());
            println!("{}", hex::encode(root.hash()));
        }
        Ok(())
    }

    fn execute_convert(&self, input: &Input, flags: BocFlags, base64: bool) -> Result<()> {
        let roots = input.read()?;
        let output = if base64 {
            boc_to_base64(&roots, flags)?
        } else {
            boc_to_hex(&roots, flags)?
        };
        log::info!("re-encoded {} roots with {:?}", roots.len(), flags);
        println!("{output}");
        Ok(())
    }

    fn execute_to_json(&self, input: &Input) -> Result<()> {
        let roots = input.read()?;
        if roots.len() > 1 {
            log::warn!("only the first of {} roots is converted", roots.len());
        }
        println!("{}", roots[0].to_json()?);
        Ok(())
    }

    fn execute_from_json(&self, json: Option<&str>, file: Option<&PathBuf>) -> Result<()> {
        let json = match (json, file) {
            (_, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            (Some(json), None) => json.to_string(),
            (None, None) => return Err(anyhow!("either a JSON document or --file is required")),
        };

        let cell = Cell::from_json(&json)?;
        log::info!("hash {}", hex::encode(cell.hash()));
        println!("{}", cell.to_boc_hex()?);
        Ok(())
    }

    fn execute_address(&self, address: &str, testnet: bool) -> Result<()> {
        let address: StdAddress = address.parse()?;

        println!("raw:             {}", address.to_raw());
        println!(
            "bounceable:      {}",
            address.to_string_with(true, true, true, testnet)
        );
        println!(
            "non-bounceable:  {}",
            address.to_string_with(true, true, false, testnet)
        );

        let cell = begin_cell().store_address(&Address::Std(address))?.end_cell()?;
        println!("boc:             {}", cell.to_boc_hex()?);
        Ok(())
    }
}
