//! Image identity, filetypes, and the storage key codec.
//!
//! Keys have the shape `<prefix>/<name>/<id>.<ext>`. The filetype/extension
//! mapping is a bijection, so a key always decodes back to the exact
//! `(ImageId, Filetype)` pair it was built from.

use std::{fmt, str::FromStr};

use image::ImageFormat;
use sha2::{Digest, Sha256};

use crate::base::error::{BotError, BotResult};

/// Number of bytes in an [`ImageId`].
pub const ID_LEN: usize = 16;

/// Content-derived identifier for a stored image.
///
/// Renders as 32 lowercase hex characters; only that exact form parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId([u8; ID_LEN]);

impl ImageId {
    /// Computes the identifier for a blob. Identical bytes always produce the same id.
    #[must_use]
    pub fn for_content(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(&digest[..ID_LEN]);
        Self(id)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ImageId {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = s.len() == ID_LEN * 2 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !canonical {
            return Err(BotError::validation(format!("`{s}` is not a valid image id")));
        }

        let mut id = [0u8; ID_LEN];
        hex::decode_to_slice(s, &mut id).map_err(|e| BotError::validation(format!("`{s}` is not a valid image id: {e}")))?;

        Ok(Self(id))
    }
}

/// The image formats the store accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Filetype {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl Filetype {
    pub const ALL: [Filetype; 4] = [Filetype::Png, Filetype::Jpeg, Filetype::Gif, Filetype::Webp];

    /// The canonical name of this filetype.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Filetype::Png => "png",
            Filetype::Jpeg => "jpeg",
            Filetype::Gif => "gif",
            Filetype::Webp => "webp",
        }
    }

    /// The one extension used in storage keys.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Filetype::Png => "png",
            Filetype::Jpeg => "jpg",
            Filetype::Gif => "gif",
            Filetype::Webp => "webp",
        }
    }

    #[must_use]
    pub fn mime(self) -> &'static str {
        match self {
            Filetype::Png => "image/png",
            Filetype::Jpeg => "image/jpeg",
            Filetype::Gif => "image/gif",
            Filetype::Webp => "image/webp",
        }
    }

    /// Inverse of [`Filetype::extension`]. Only canonical extensions decode.
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|filetype| filetype.extension() == extension)
    }

    /// Detects the filetype from the leading bytes of a blob.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes).ok()? {
            ImageFormat::Png => Some(Filetype::Png),
            ImageFormat::Jpeg => Some(Filetype::Jpeg),
            ImageFormat::Gif => Some(Filetype::Gif),
            ImageFormat::WebP => Some(Filetype::Webp),
            _ => None,
        }
    }
}

impl fmt::Display for Filetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Filetype {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|filetype| filetype.name() == s)
            .ok_or_else(|| BotError::validation(format!("unsupported filetype `{s}`")))
    }
}

/// Returns true if `name` can be used as a pin name (and so as a single key segment).
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Builds the storage key for an image.
#[must_use]
pub fn storage_key(prefix: &str, name: &str, filetype: Filetype, id: ImageId) -> String {
    format!("{prefix}/{name}/{id}.{}", filetype.extension())
}

/// The key prefix under which every image pinned as `name` lives.
#[must_use]
pub fn name_prefix(prefix: &str, name: &str) -> String {
    format!("{prefix}/{name}/")
}

/// Recovers the id and filetype from a storage key.
pub fn decode_key(key: &str) -> BotResult<(ImageId, Filetype)> {
    let file = key.rsplit('/').next().unwrap_or(key);
    let (stem, extension) = file.rsplit_once('.').ok_or_else(|| BotError::validation(format!("key `{key}` has no extension")))?;

    let filetype = Filetype::from_extension(extension).ok_or_else(|| BotError::validation(format!("key `{key}` has an unsupported extension `{extension}`")))?;
    let id = stem.parse()?;

    Ok((id, filetype))
}

/// Public URL for a key in a bucket.
#[must_use]
pub fn public_url(bucket: &str, domain: &str, key: &str) -> String {
    format!("https://{bucket}.{domain}/{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "7287194dfdb24cb741413ebb7f9b121d";

    fn id() -> ImageId {
        ID.parse().unwrap()
    }

    #[test]
    fn builds_keys() {
        let cases = [
            (Filetype::Jpeg, "lasagna/mork/7287194dfdb24cb741413ebb7f9b121d.jpg"),
            (Filetype::Gif, "lasagna/mork/7287194dfdb24cb741413ebb7f9b121d.gif"),
            (Filetype::Png, "lasagna/mork/7287194dfdb24cb741413ebb7f9b121d.png"),
        ];

        for (filetype, expected) in cases {
            assert_eq!(storage_key("lasagna", "mork", filetype, id()), expected);
        }
    }

    #[test]
    fn builds_public_urls() {
        let key = storage_key("lasagna", "mork", Filetype::Jpeg, id());
        assert_eq!(
            public_url("garf", "s3.amazonaws.com", &key),
            "https://garf.s3.amazonaws.com/lasagna/mork/7287194dfdb24cb741413ebb7f9b121d.jpg"
        );
    }

    #[test]
    fn decodes_keys() {
        let cases = [
            ("lasagna/mork/7287194dfdb24cb741413ebb7f9b121d.png", Filetype::Png),
            ("lasagna/mork/7287194dfdb24cb741413ebb7f9b121d.jpg", Filetype::Jpeg),
            ("lasagna/mork/7287194dfdb24cb741413ebb7f9b121d.gif", Filetype::Gif),
        ];

        for (key, filetype) in cases {
            assert_eq!(decode_key(key).unwrap(), (id(), filetype), "{key}");
        }
    }

    #[test]
    fn every_filetype_survives_the_key_codec() {
        for filetype in Filetype::ALL {
            let key = storage_key("lasagna", "mork", filetype, id());
            assert_eq!(decode_key(&key).unwrap(), (id(), filetype));
        }
    }

    #[test]
    fn extensions_are_a_bijection() {
        for filetype in Filetype::ALL {
            assert_eq!(Filetype::from_extension(filetype.extension()), Some(filetype));
            assert_eq!(filetype.name().parse::<Filetype>().unwrap(), filetype);
        }

        // `jpeg` is a name, not an extension.
        assert_eq!(Filetype::from_extension("jpeg"), None);
    }

    #[test]
    fn rejects_unsupported_extensions() {
        for key in ["lasagna/mork/7287194dfdb24cb741413ebb7f9b121d.bmp", "lasagna/mork/7287194dfdb24cb741413ebb7f9b121d.JPG", "lasagna/mork/7287194dfdb24cb741413ebb7f9b121d"] {
            assert!(matches!(decode_key(key), Err(BotError::Validation(_))), "{key}");
            assert!(decode_key(key).is_err(), "decoding {key} should fail every time");
        }
    }

    #[test]
    fn ids_round_trip_only_in_canonical_form() {
        assert_eq!(id().to_string(), ID);
        assert!(ID.to_uppercase().parse::<ImageId>().is_err());
        assert!("7287194dfdb24cb741413ebb7f9b121".parse::<ImageId>().is_err());
        assert!("7287194dfdb24cb741413ebb7f9b121dz".parse::<ImageId>().is_err());
        assert!("g287194dfdb24cb741413ebb7f9b121d".parse::<ImageId>().is_err());
    }

    #[test]
    fn ids_follow_content() {
        let a = ImageId::for_content(b"garfield");
        assert_eq!(a, ImageId::for_content(b"garfield"));
        assert_ne!(a, ImageId::for_content(b"odie"));
        assert_eq!(a.to_string().parse::<ImageId>().unwrap(), a);
    }

    #[test]
    fn sniffs_supported_formats() {
        assert_eq!(Filetype::sniff(b"\x89PNG\r\n\x1a\n\0\0\0\0"), Some(Filetype::Png));
        assert_eq!(Filetype::sniff(b"\xff\xd8\xff\xe0\0\0"), Some(Filetype::Jpeg));
        assert_eq!(Filetype::sniff(b"GIF89a\0\0"), Some(Filetype::Gif));
        assert_eq!(Filetype::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(Filetype::Webp));
        assert_eq!(Filetype::sniff(b"<!doctype html>"), None);
    }

    #[test]
    fn validates_names() {
        assert!(is_valid_name("mork"));
        assert!(is_valid_name("big_garf-2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("../etc"));
        assert!(!is_valid_name("a/b"));
    }
}
