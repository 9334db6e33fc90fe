//! Replacement keys, hash names and small value types parsed from packs.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Upper bound on mip levels looked up for a synthesized replacement
pub const MAX_REPLACEMENT_MIP_LEVELS: usize = 12;

/// Mask keeping the low 32 bits (palette identity) of a location key
pub const LOW_MASK: u64 = 0xFFFF_FFFF;
/// Mask keeping the high 32 bits (texture address) of a location key
pub const HIGH_MASK: u64 = !LOW_MASK;

/// Primary cache key: where a texture lives plus what it contains
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ReplacementKey {
    /// Stable per-texture identifier; high 32 bits carry the address
    pub location_key: u64,
    /// Fingerprint of the texture data
    pub content_hash: u32,
}

impl ReplacementKey {
    /// Create a key
    pub const fn new(location_key: u64, content_hash: u32) -> Self {
        Self {
            location_key,
            content_hash,
        }
    }

    /// Texture address encoded in the location key
    pub fn address(&self) -> u32 {
        (self.location_key >> 32) as u32
    }

    /// Canonical name for a level of this texture
    pub fn hash_name(&self, level: usize) -> String {
        hash_name(self.location_key, self.content_hash, level)
    }
}

impl fmt::Display for ReplacementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:08x}", self.location_key, self.content_hash)
    }
}

/// Canonical file stem for a texture level.
///
/// `%016x%08x`, with `_<level>` appended only above level 0.
pub fn hash_name(location_key: u64, content_hash: u32, level: usize) -> String {
    if level > 0 {
        format!("{:016x}{:08x}_{}", location_key, content_hash, level)
    } else {
        format!("{:016x}{:08x}", location_key, content_hash)
    }
}

/// A `[hashes]`/`[filtering]` key parsed from pack configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHashKey {
    pub key: ReplacementKey,
    pub level: usize,
}

/// Parse `<up to 16 hex location><up to 8 hex hash>[_<level>]`.
///
/// Missing trailing parts default to zero, which is how wildcard entries
/// are written. At least one hex digit is required.
pub fn parse_hash_key(text: &str) -> Option<ParsedHashKey> {
    let text = text.trim();

    let (location_key, rest) = take_hex(text, 16)?;
    let (content_hash, rest) = match take_hex(rest, 8) {
        Some((hash, rest)) => (hash as u32, rest),
        None => (0, rest),
    };

    let level = rest
        .strip_prefix('_')
        .and_then(|digits| {
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            digits[..end].parse::<usize>().ok()
        })
        .unwrap_or(0);

    Some(ParsedHashKey {
        key: ReplacementKey::new(location_key, content_hash),
        level,
    })
}

fn take_hex(text: &str, max_digits: usize) -> Option<(u64, &str)> {
    let len = text
        .bytes()
        .take(max_digits)
        .take_while(|b| b.is_ascii_hexdigit())
        .count();
    if len == 0 {
        return None;
    }
    let value = u64::from_str_radix(&text[..len], 16).ok()?;
    Some((value, &text[len..]))
}

/// Filtering mode forced by a pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureFiltering {
    Auto,
    Nearest,
    Linear,
}

impl FromStr for TextureFiltering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("nearest") {
            Ok(Self::Nearest)
        } else if s.eq_ignore_ascii_case("linear") {
            Ok(Self::Linear)
        } else if s.eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            Err(format!("unsupported filtering mode '{}'", s))
        }
    }
}

impl fmt::Display for TextureFiltering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Nearest => "nearest",
            Self::Linear => "linear",
        })
    }
}

/// Texture formats of the emulated graphics unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgb565,
    Rgba5551,
    Rgba4444,
    Rgba8888,
    Clut4,
    Clut8,
    Clut16,
    Clut32,
    Dxt1,
    Dxt3,
    Dxt5,
}

impl TextureFormat {
    /// Storage bits per texel
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            Self::Rgb565 | Self::Rgba5551 | Self::Rgba4444 | Self::Clut16 => 16,
            Self::Rgba8888 | Self::Clut32 => 32,
            Self::Clut4 | Self::Dxt1 => 4,
            Self::Clut8 | Self::Dxt3 | Self::Dxt5 => 8,
        }
    }
}

impl FromStr for TextureFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = match s.trim().to_ascii_lowercase().as_str() {
            "565" | "5650" => Self::Rgb565,
            "5551" => Self::Rgba5551,
            "4444" => Self::Rgba4444,
            "8888" => Self::Rgba8888,
            "clut4" => Self::Clut4,
            "clut8" => Self::Clut8,
            "clut16" => Self::Clut16,
            "clut32" => Self::Clut32,
            "dxt1" => Self::Dxt1,
            "dxt3" => Self::Dxt3,
            "dxt5" => Self::Dxt5,
            other => return Err(format!("unknown texture format '{}'", other)),
        };
        Ok(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_name() {
        assert_eq!(hash_name(0x08b3_1020_0000_0000, 0xdead_beef, 0), "08b3102000000000deadbeef");
        assert_eq!(hash_name(1, 2, 3), "000000000000000100000002_3");
    }

    #[test]
    fn test_parse_full_key() {
        let parsed = parse_hash_key("08b3102000000909ba70b2af_2").unwrap();
        assert_eq!(parsed.key.location_key, 0x08b3_1020_0000_0909);
        assert_eq!(parsed.key.content_hash, 0xba70_b2af);
        assert_eq!(parsed.level, 2);
        assert_eq!(parsed.key.address(), 0x08b3_1020);
    }

    #[test]
    fn test_parse_wildcard_keys() {
        let parsed = parse_hash_key("00000000000000000000000c_0").unwrap();
        assert_eq!(parsed.key, ReplacementKey::new(0, 0xc));
        assert_eq!(parsed.level, 0);

        // Only the location part given: hash defaults to zero.
        let parsed = parse_hash_key("0000000000000909").unwrap();
        assert_eq!(parsed.key, ReplacementKey::new(0x909, 0));

        assert!(parse_hash_key("").is_none());
        assert!(parse_hash_key("zz").is_none());
    }

    #[test]
    fn test_key_display_round_trips_through_parse() {
        let key = ReplacementKey::new(0x1234_5678_9abc_def0, 0x0bad_f00d);
        assert_eq!(parse_hash_key(&key.to_string()).unwrap().key, key);
    }

    #[test]
    fn test_filtering_parse() {
        assert_eq!("NEAREST".parse::<TextureFiltering>(), Ok(TextureFiltering::Nearest));
        assert_eq!("linear".parse::<TextureFiltering>(), Ok(TextureFiltering::Linear));
        assert_eq!(" Auto ".parse::<TextureFiltering>(), Ok(TextureFiltering::Auto));
        assert!("bilinear".parse::<TextureFiltering>().is_err());
    }

    #[test]
    fn test_format_bits() {
        assert_eq!(TextureFormat::Rgba8888.bits_per_pixel(), 32);
        assert_eq!(TextureFormat::Clut4.bits_per_pixel(), 4);
        assert_eq!("dxt5".parse::<TextureFormat>().unwrap().bits_per_pixel(), 8);
        assert!("rgb9".parse::<TextureFormat>().is_err());
    }
}
