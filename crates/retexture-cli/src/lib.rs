//! # Retexture CLI
//!
//! Command-line tool for texture pack authors.
//!
//! ## Commands
//! - `init` - Generate a default `textures.ini` for a title
//! - `inspect` - Load a pack and summarize its configuration
//! - `resolve` - Show which file a hash name resolves to
//! - `hash` - Fingerprint raw texture memory dumps

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use retexture_platform::open_pack;
use retexture_replacer::hash::{compute_hash, HashRequest};
use retexture_replacer::key::{hash_name, parse_hash_key};
use retexture_replacer::{
    generate_ini, load_pack_config, AliasLookup, LoadedPack, PackConfig, ReplacerSettings,
    TextureFiltering, TextureFormat,
};
use serde::Serialize;

/// Texture pack tool
#[derive(Parser)]
#[command(name = "retexture")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding one pack per title
    #[arg(short, long, default_value = "textures")]
    pub textures: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Generate a default textures.ini
    Init {
        /// Title identifier
        game_id: String,
    },

    /// Summarize a pack's configuration
    Inspect {
        /// Title identifier
        game_id: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Resolve a hash name through the pack's aliases
    Resolve {
        /// Title identifier
        game_id: String,

        /// `<location><hash>[_<level>]`
        hashname: String,
    },

    /// Fingerprint raw texture memory dumps
    Hash {
        /// Title identifier
        game_id: String,

        /// Dump files, each starting at the texture address
        #[arg(required = true)]
        dumps: Vec<PathBuf>,

        /// Texture width
        #[arg(short = 'W', long)]
        width: u32,

        /// Texture height
        #[arg(short = 'H', long)]
        height: u32,

        /// Row stride in texels; defaults to the width
        #[arg(long)]
        buf_width: Option<u32>,

        /// Texture format (565, 5551, 4444, 8888, clut4, clut8, ...)
        #[arg(short, long, default_value = "8888")]
        format: String,

        /// Texture address in hex, for [hashranges]
        #[arg(short, long, default_value = "0")]
        addr: String,

        /// Highest V coordinate seen while drawing
        #[arg(long, default_value = "0")]
        max_seen_v: u16,
    },
}

/// Where a hash name leads
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub key: String,
    pub level: usize,
    /// `ignored`, `alias` or `default`
    pub source: &'static str,
    pub file: Option<String>,
    pub filtering: Option<TextureFiltering>,
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match cli.command {
        Commands::Init { game_id } => {
            let path = generate_ini(&cli.textures, &game_id)?;
            println!("{}", path.display());
        }

        Commands::Inspect { game_id, json } => {
            let loaded = load_pack(&cli.textures, &game_id)?;
            let summary = loaded.config.summary();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Pack: {}", cli.textures.join(&game_id).display());
                println!("  ini loaded: {}", loaded.ini_loaded);
                println!("  hash: {}", summary.hash);
                println!("  ignoreAddress: {}", summary.ignore_address);
                println!("  reduceHash: {} ({})", summary.reduce_hash, summary.reduce_hash_global);
                println!("  ignoreMipmap: {}", summary.ignore_mipmap);
                println!("  video: {}", summary.allow_video);
                println!("  aliases: {} ({} ignored)", summary.aliases, summary.ignored);
                println!("  hashranges: {}", summary.hash_ranges);
                println!("  filtering: {}", summary.filtering);
                println!("  reducehashranges: {}", summary.reduce_hash_ranges);
                if loaded.filename_warning {
                    log::warn!("textures.ini filenames may not be cross-platform (banned characters)");
                }
            }
        }

        Commands::Resolve { game_id, hashname } => {
            let loaded = load_pack(&cli.textures, &game_id)?;
            let resolution = resolve(&loaded.config, &hashname)?;
            match &resolution.file {
                Some(file) => println!("{} level {}: {} ({})", resolution.key, resolution.level, file, resolution.source),
                None => println!("{} level {}: {}", resolution.key, resolution.level, resolution.source),
            }
            if let Some(filtering) = resolution.filtering {
                println!("  filtering: {}", filtering);
            }
        }

        Commands::Hash {
            game_id,
            dumps,
            width,
            height,
            buf_width,
            format,
            addr,
            max_seen_v,
        } => {
            let loaded = load_pack(&cli.textures, &game_id)?;
            let req = HashRequest {
                addr: parse_addr(&addr)?,
                buf_w: buf_width.unwrap_or(width),
                w: width,
                h: height,
                format: format.parse::<TextureFormat>().map_err(|e| anyhow!(e))?,
                max_seen_v,
            };

            let mut failed = 0;
            for (path, result) in hash_dumps(&loaded.config, &req, &dumps) {
                match result {
                    Ok(hash) => println!("{:08x}  {}", hash, path.display()),
                    Err(err) => {
                        log::error!("{}: {:#}", path.display(), err);
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} dumps could not be hashed", failed, dumps.len());
            }
        }
    }

    Ok(())
}

/// Load the configuration of a title's pack
pub fn load_pack(textures_root: &Path, game_id: &str) -> Result<LoadedPack> {
    let settings = ReplacerSettings {
        replace_textures: true,
        textures_root: textures_root.to_path_buf(),
        game_id: game_id.to_string(),
        ..ReplacerSettings::default()
    };
    let pack_dir = settings.pack_dir();
    if !pack_dir.is_dir() {
        bail!("No texture pack at {}", pack_dir.display());
    }

    let source = open_pack(&pack_dir);
    load_pack_config(&source, &settings, 1).with_context(|| format!("Loading {}", pack_dir.display()))
}

/// Resolve a hash name the way the replacer would for lookups
pub fn resolve(config: &PackConfig, hashname: &str) -> Result<Resolution> {
    let parsed = parse_hash_key(hashname).ok_or_else(|| anyhow!("Not a hash name: {}", hashname))?;
    let location = config.effective_location(parsed.key.location_key);
    let hash = parsed.key.content_hash;
    let overrides = &config.overrides;

    let (source, file) = match overrides.lookup_hash_file(location, hash, config.ignore_address) {
        AliasLookup::Ignored => ("ignored", None),
        AliasLookup::Files(files) => ("alias", files.split('|').nth(parsed.level).map(str::to_string)),
        AliasLookup::Missing => ("default", Some(format!("{}.png", hash_name(location, hash, parsed.level)))),
    };

    Ok(Resolution {
        key: parsed.key.to_string(),
        level: parsed.level,
        source,
        file,
        filtering: overrides.find_filtering(location, hash, config.ignore_address),
    })
}

/// Hash every dump in parallel, keeping input order
pub fn hash_dumps(config: &PackConfig, req: &HashRequest, dumps: &[PathBuf]) -> Vec<(PathBuf, Result<u32>)> {
    dumps
        .par_iter()
        .map(|path| {
            let hash = std::fs::read(path)
                .with_context(|| format!("Reading {}", path.display()))
                .map(|memory| compute_hash(config, &memory, req));
            (path.clone(), hash)
        })
        .collect()
}

fn parse_addr(text: &str) -> Result<u32> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).with_context(|| format!("Invalid address: {}", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use retexture_replacer::hash::ReplacedTextureHash;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::parse_from(["retexture", "init", "ULUS10000"]);
        assert_eq!(cli.textures, PathBuf::from("textures"));
        assert!(matches!(cli.command, Commands::Init { game_id } if game_id == "ULUS10000"));
    }

    #[test]
    fn test_hash_command() {
        let cli = Cli::parse_from([
            "retexture", "-t", "packs", "hash", "ULUS10000", "a.bin", "b.bin", "-W", "480", "-H", "272",
            "--buf-width", "512", "--addr", "08b31020",
        ]);
        assert_eq!(cli.textures, PathBuf::from("packs"));
        if let Commands::Hash {
            dumps,
            width,
            height,
            buf_width,
            format,
            addr,
            ..
        } = cli.command
        {
            assert_eq!(dumps.len(), 2);
            assert_eq!((width, height, buf_width), (480, 272, Some(512)));
            assert_eq!(format, "8888");
            assert_eq!(parse_addr(&addr).unwrap(), 0x08b3_1020);
        } else {
            panic!("Expected Hash command");
        }
    }

    #[test]
    fn test_init_then_inspect() {
        let root = tempfile::tempdir().unwrap();
        assert!(load_pack(root.path(), "ULUS10000").is_err());

        generate_ini(root.path(), "ULUS10000").unwrap();
        let loaded = load_pack(root.path(), "ULUS10000").unwrap();
        assert!(loaded.ini_loaded);
        let json = serde_json::to_value(loaded.config.summary()).unwrap();
        assert_eq!(json["hash"], "quick");
        assert_eq!(json["ignore_mipmap"], true);
    }

    #[test]
    fn test_resolve() {
        let mut config = PackConfig::default();
        config
            .overrides
            .aliases
            .insert(retexture_replacer::ReplacementKey::new(0, 0xc), "foo.png|bar.png".into());

        let level1 = resolve(&config, "00000000000000000000000c_1").unwrap();
        assert_eq!(level1.source, "alias");
        assert_eq!(level1.file.as_deref(), Some("bar.png"));

        let other = resolve(&config, "08b31020000000000000000d").unwrap();
        assert_eq!(other.source, "default");
        assert_eq!(other.file.as_deref(), Some("08b31020000000000000000d.png"));

        assert!(resolve(&config, "xyz").is_err());
    }

    #[test]
    fn test_hash_dumps_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, vec![1u8; 64]).unwrap();
        std::fs::write(&b, vec![2u8; 64]).unwrap();
        let missing = dir.path().join("missing.bin");

        let config = PackConfig {
            hash: ReplacedTextureHash::Xxh32,
            ..PackConfig::default()
        };
        let req = HashRequest {
            addr: 0,
            buf_w: 4,
            w: 4,
            h: 4,
            format: TextureFormat::Rgba8888,
            max_seen_v: 0,
        };

        let results = hash_dumps(&config, &req, &[a.clone(), b.clone(), missing]);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, a);
        assert_eq!(results[1].0, b);
        let ha = results[0].1.as_ref().unwrap();
        let hb = results[1].1.as_ref().unwrap();
        assert_ne!(ha, hb);
        assert!(results[2].1.is_err());
    }
}
