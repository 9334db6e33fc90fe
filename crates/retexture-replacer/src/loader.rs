//! Pack Configuration Loading
//!
//! Reads `textures.ini` (and an optional per-title override file) from a
//! pack source into a [`PackConfig`] snapshot:
//! - `[options]`: hash algorithm and toggles
//! - `[games]`: per-title override file
//! - `[hashes]`: filename aliases, one entry per mip level
//! - `[hashranges]`, `[filtering]`, `[reducehashranges]`
//!
//! Malformed rows are logged and skipped; the rest of the file still applies.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ini::{Ini, ParseOption};
use retexture_platform::{PackSource, VfsBackend, INI_FILENAME};

use crate::config::{HashRangeKey, PackConfig, ReplacerSettings};
use crate::hash::ReplacedTextureHash;
use crate::key::{parse_hash_key, ReplacementKey, TextureFiltering};
use crate::{ReplacerError, ReplacerResult};

/// Highest `version` this loader understands
pub const INI_VERSION: u32 = 1;

const BOM: &str = "\u{feff}";

/// Outcome of loading a pack's configuration
#[derive(Debug, Clone)]
pub struct LoadedPack {
    pub config: PackConfig,
    /// `[hashes]` holds filenames that may not work on every platform
    pub filename_warning: bool,
    /// Whether `textures.ini` was present
    pub ini_loaded: bool,
}

/// Load the configuration snapshot of a pack.
///
/// A pack without `textures.ini` is fine as a directory but rejected as an
/// archive. A `[games]` override that fails to load rejects the pack.
pub fn load_pack_config(
    source: &PackSource,
    settings: &ReplacerSettings,
    generation: u64,
) -> ReplacerResult<LoadedPack> {
    let mut config = PackConfig {
        generation,
        ..PackConfig::default()
    };
    let check_filenames =
        settings.save_new_textures && !settings.ignore_texture_filenames && !source.is_archive;

    let ini = match read_ini(source.vfs.as_ref(), INI_FILENAME) {
        Ok(ini) => ini,
        Err(err) => {
            if source.is_archive {
                log::error!("{}", err);
                return Err(ReplacerError::MissingIni(source.vfs.describe()));
            }
            log::warn!("Texture pack lacking ini file: {} ({})", source.vfs.describe(), err);
            return Ok(LoadedPack {
                config,
                filename_warning: false,
                ini_loaded: false,
            });
        }
    };

    let mut filename_warning = apply_ini(&mut config, &ini, false, check_filenames);

    let override_file = entries(&ini, "games")
        .find(|(title, _)| title.eq_ignore_ascii_case(&settings.game_id))
        .map(|(_, file)| file.to_string());
    if let Some(file) = override_file.filter(|f| !f.is_empty() && f != INI_FILENAME) {
        let extra = read_ini(source.vfs.as_ref(), &file).map_err(|err| ReplacerError::OverrideIni {
            file: file.clone(),
            reason: err.to_string(),
        })?;
        log::info!("Loading extra texture ini: {}", file);
        filename_warning |= apply_ini(&mut config, &extra, true, check_filenames);
    }

    Ok(LoadedPack {
        config,
        filename_warning,
        ini_loaded: true,
    })
}

/// Path of the generated configuration for a title
pub fn ini_path(textures_root: &Path, game_id: &str) -> PathBuf {
    textures_root.join(game_id).join(INI_FILENAME)
}

/// Whether a title already has a `textures.ini`
pub fn ini_exists(textures_root: &Path, game_id: &str) -> bool {
    !game_id.is_empty() && ini_path(textures_root, game_id).is_file()
}

/// Write a documented default `textures.ini` for a title unless one exists.
pub fn generate_ini(textures_root: &Path, game_id: &str) -> ReplacerResult<PathBuf> {
    if game_id.is_empty() {
        return Err(ReplacerError::MissingGameId);
    }

    let dir = textures_root.join(game_id);
    std::fs::create_dir_all(&dir)?;

    let path = dir.join(INI_FILENAME);
    if path.exists() {
        return Ok(path);
    }

    std::fs::write(&path, default_ini(game_id))?;
    log::info!("Generated {}", path.display());
    Ok(path)
}

fn default_ini(game_id: &str) -> String {
    format!(
        r#"{BOM}# This describes your textures and set up options for texture replacement.
# Keys under [hashes] are <16 hex location><8 hex hash>[_<level>].

[options]
version = {INI_VERSION}
hash = quick
ignoreMipmap = true  # Avoid dumping mipmaps, generate them with a tool instead.
reduceHash = false
video = false

[games]
# Used to make it easier to install, and override settings for other regions.
# Files still have to be copied to each textures folder.
{game_id} = {INI_FILENAME}

[hashes]
# Use / for folders not \, avoid special characters, and stick to lowercase.

[hashranges]
# Example: 08b31020,512,512 = 480,272

[filtering]
# Available modes are linear/nearest/auto.
# Example: 08d3961000000909ba70b2af = linear

[reducehashranges]
# Example: 512,512 = 0.5
"#
    )
}

fn read_ini(vfs: &dyn VfsBackend, name: &str) -> ReplacerResult<Ini> {
    let bytes = vfs.read_file(name)?;
    let text = String::from_utf8_lossy(&bytes);
    let text = strip_comments(text.strip_prefix(BOM).unwrap_or(&text));

    let options = ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    };
    Ini::load_from_str_opt(&text, options).map_err(|err| ReplacerError::IniSyntax {
        file: name.to_string(),
        reason: err.to_string(),
    })
}

/// Drop comment lines, `#` comments that follow whitespace, and lines that
/// are neither a section header nor a `key = value` pair.
///
/// The parser runs without quote or escape handling, so a stray line would
/// otherwise be read as the start of the next line's key.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        let end = line
            .char_indices()
            .zip(line.chars().skip(1))
            .find(|((_, c), next)| c.is_whitespace() && *next == '#')
            .map(|((i, _), _)| i)
            .unwrap_or(line.len());
        let content = line[..end].trim_end();
        let body = content.trim_start();
        if !body.is_empty() && !body.starts_with('[') && !body.contains(['=', ':']) {
            log::error!("Unsupported syntax in texture ini, skipping line: {}", body);
            out.push('\n');
            continue;
        }
        out.push_str(content);
        out.push('\n');
    }
    out
}

/// All entries of every section with the given name, case-insensitively
fn entries<'a>(ini: &'a Ini, section: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    ini.iter()
        .filter(move |(name, _)| name.is_some_and(|n| n.eq_ignore_ascii_case(section)))
        .flat_map(|(_, props)| props.iter())
}

fn option<'a>(ini: &'a Ini, key: &str) -> Option<&'a str> {
    entries(ini, "options")
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn read_bool(ini: &Ini, keys: &[&str], target: &mut bool) {
    for key in keys {
        if let Some(value) = option(ini, key) {
            match parse_bool(value) {
                Some(parsed) => *target = parsed,
                None => log::error!("Ignoring invalid [options] {} = {}", key, value),
            }
            return;
        }
    }
}

/// Apply one ini file on top of `config`. Returns the filename warning flag.
fn apply_ini(config: &mut PackConfig, ini: &Ini, is_override: bool, check_filenames: bool) -> bool {
    let hash = option(ini, "hash").unwrap_or("").trim();
    match hash.parse::<ReplacedTextureHash>() {
        Ok(algo) => config.hash = algo,
        Err(_) if hash.is_empty() => {}
        Err(name) => {
            let fallback = if is_override { config.hash } else { ReplacedTextureHash::Quick };
            log::error!("{}, using {}", ReplacerError::UnsupportedHash(name), fallback);
            config.hash = fallback;
        }
    }

    read_bool(ini, &["video", "allowVideo"], &mut config.allow_video);
    read_bool(ini, &["ignoreAddress"], &mut config.ignore_address);
    read_bool(ini, &["reduceHash"], &mut config.reduce_hash);
    read_bool(ini, &["ignoreMipmap"], &mut config.ignore_mipmap);

    if config.reduce_hash && config.hash == ReplacedTextureHash::Quick {
        config.reduce_hash = false;
        log::error!("Texture Replacement: reduceHash option requires safer hash, use xxh32 or xxh64 instead.");
    }
    if config.ignore_address && config.hash == ReplacedTextureHash::Quick {
        config.ignore_address = false;
        log::error!("Texture Replacement: ignoreAddress option requires safer hash, use xxh32 or xxh64 instead.");
    }

    if let Some(version) = option(ini, "version") {
        match version.trim().parse::<u32>() {
            Ok(v) if v > INI_VERSION => {
                log::error!("Unsupported texture replacement version {}, trying anyway", v)
            }
            Ok(_) => {}
            Err(_) => log::error!("Ignoring invalid [options] version = {}", version),
        }
    }

    let filename_warning = apply_hashes(config, ini, check_filenames);

    for (key, value) in entries(ini, "hashranges") {
        match parse_hash_range(key, value) {
            Ok((range, size)) => {
                config.overrides.hash_ranges.insert(range, size);
            }
            Err(err) => log::error!("{}", err),
        }
    }

    for (key, value) in entries(ini, "filtering") {
        match parse_filtering(key, value) {
            Ok((item, mode)) => {
                config.overrides.filtering.insert(item, mode);
            }
            Err(err) => log::error!("{}", err),
        }
    }

    for (key, value) in entries(ini, "reducehashranges") {
        match parse_reduce_hash_range(key, value) {
            Ok((size, factor)) => {
                config.overrides.reduce_hash_ranges.insert(size, factor);
            }
            Err(err) => log::error!("{}", err),
        }
    }

    filename_warning
}

fn has_banned_chars(filename: &str) -> bool {
    filename
        .chars()
        .any(|c| matches!(c, '\\' | ':' | '<' | '>' | '|' | '?' | '*') || (cfg!(windows) && c.is_ascii_uppercase()))
}

fn apply_hashes(config: &mut PackConfig, ini: &Ini, check_filenames: bool) -> bool {
    let mut filename_warning = false;
    let mut by_key: BTreeMap<ReplacementKey, BTreeMap<usize, &str>> = BTreeMap::new();

    for (key, value) in entries(ini, "hashes") {
        let Some(parsed) = parse_hash_key(key) else {
            log::error!("Unsupported syntax under [hashes]: {}", key);
            continue;
        };
        by_key.entry(parsed.key).or_default().insert(parsed.level, value);
        if check_filenames && has_banned_chars(value) {
            filename_warning = true;
        }
    }

    for (key, levels) in by_key {
        let mut files = Vec::with_capacity(levels.len());
        for (level, file) in levels {
            if level != files.len() {
                log::warn!("Non-sequential mip index {}, breaking. filenames={}", level, file);
                break;
            }
            files.push(file.trim());
        }
        // An alias made only of empty names marks the texture as ignored.
        let alias = files.join("|");
        config
            .overrides
            .aliases
            .insert(key, alias.trim_end_matches('|').to_string());
    }

    filename_warning
}

fn invalid(section: &'static str, key: &str, value: &str, reason: &str) -> ReplacerError {
    ReplacerError::InvalidEntry {
        section,
        entry: format!("{} = {}", key, value),
        reason: reason.to_string(),
    }
}

fn parse_hex_u32(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16).ok()
}

fn parse_dec_u32(text: &str) -> Option<u32> {
    text.trim().parse().ok()
}

/// `addr,w,h = newW,newH`
fn parse_hash_range(key: &str, value: &str) -> ReplacerResult<(HashRangeKey, (u32, u32))> {
    let key_parts: Vec<&str> = key.split(',').collect();
    let value_parts: Vec<&str> = value.split(',').collect();
    if key_parts.len() != 3 || value_parts.len() != 2 {
        return Err(invalid("hashranges", key, value, "expecting addr,w,h = w,h"));
    }

    let (Some(addr), Some(from_w), Some(from_h)) = (
        parse_hex_u32(key_parts[0]),
        parse_dec_u32(key_parts[1]),
        parse_dec_u32(key_parts[2]),
    ) else {
        return Err(invalid("hashranges", key, value, "key format is 08b31020,512,512"));
    };

    let (Some(to_w), Some(to_h)) = (parse_dec_u32(value_parts[0]), parse_dec_u32(value_parts[1])) else {
        return Err(invalid("hashranges", key, value, "value format is 480,272"));
    };

    if to_w > from_w || to_h > from_h {
        return Err(invalid("hashranges", key, value, "range bigger than source"));
    }

    Ok((
        HashRangeKey {
            addr,
            w: from_w,
            h: from_h,
        },
        (to_w, to_h),
    ))
}

/// `hashname = nearest|linear|auto`
fn parse_filtering(key: &str, value: &str) -> ReplacerResult<(ReplacementKey, TextureFiltering)> {
    let parsed = parse_hash_key(key).ok_or_else(|| invalid("filtering", key, value, "unsupported key syntax"))?;
    let mode = value
        .parse::<TextureFiltering>()
        .map_err(|reason| invalid("filtering", key, value, &reason))?;
    Ok((parsed.key, mode))
}

/// `w,h = factor`
fn parse_reduce_hash_range(key: &str, value: &str) -> ReplacerResult<((u32, u32), f32)> {
    let key_parts: Vec<&str> = key.split(',').collect();
    if key_parts.len() != 2 || value.contains(',') {
        return Err(invalid("reducehashranges", key, value, "expecting w,h = factor"));
    }

    let (Some(w), Some(h)) = (parse_dec_u32(key_parts[0]), parse_dec_u32(key_parts[1])) else {
        return Err(invalid("reducehashranges", key, value, "key format is 512,512"));
    };

    let factor: f32 = value
        .trim()
        .parse()
        .map_err(|_| invalid("reducehashranges", key, value, "value format is 0.5"))?;
    if factor == 0.0 || !factor.is_finite() {
        return Err(invalid("reducehashranges", key, value, "factor can't be 0"));
    }

    Ok(((w, h), factor))
}
