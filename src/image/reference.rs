use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageVersion, Repository, Tag},
};
use regex::Regex;
use std::{fmt, ops::Range, str::FromStr};

/// Parsed image reference, `name[:tag][@digest]`
///
/// Only the name is mandatory. A reference without a tag means the tag
/// `latest`. There is no registry component; every reference is resolved
/// against the one registry the client was configured with.
///
/// When a [ContentDigest] is present the manifest is fetched by digest, which
/// pins the exact image. Otherwise the tag is resolved by the registry.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct ImageReference {
    serialized: String,
    repository_pos: Range<usize>,
    tag_pos: Option<Range<usize>>,
    digest_pos: Option<Range<usize>>,
}

impl ImageReference {
    /// Returns the string this reference was parsed from
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse a [prim@str] as an [ImageReference]
    ///
    /// ```
    /// # use minidock::ImageReference;
    /// let r = ImageReference::parse("ubuntu:22.04").unwrap();
    /// assert_eq!(r.name(), "ubuntu");
    /// assert_eq!(r.tag().as_str(), "22.04");
    /// assert_eq!(ImageReference::parse("redis").unwrap().tag().as_str(), "latest");
    /// assert!(ImageReference::parse(":22.04").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!(
                "^{}(:{})?(@{})?$",
                Repository::regex_str(),
                Tag::regex_str(),
                ContentDigest::regex_str()
            ))
            .unwrap();
        }
        let captures = RE
            .captures(s)
            .ok_or_else(|| ImageError::InvalidReferenceFormat(s.to_owned()))?;
        let repository_pos = captures
            .name("repo")
            .ok_or_else(|| ImageError::InvalidReferenceFormat(s.to_owned()))?
            .range();
        Ok(ImageReference {
            serialized: s.to_owned(),
            repository_pos,
            tag_pos: captures.name("tag").map(|m| m.range()),
            digest_pos: captures.name("dig").map(|m| m.range()),
        })
    }

    /// The image name, without tag or digest
    pub fn name(&self) -> &str {
        &self.serialized[self.repository_pos.clone()]
    }

    /// The explicit tag, if the reference had one
    pub fn tag_str(&self) -> Option<&str> {
        self.tag_pos
            .as_ref()
            .map(|pos| &self.serialized[pos.clone()])
    }

    /// The explicit digest, if the reference had one
    pub fn content_digest_str(&self) -> Option<&str> {
        self.digest_pos
            .as_ref()
            .map(|pos| &self.serialized[pos.clone()])
    }

    pub fn repository(&self) -> Repository {
        Repository::parse(self.name()).expect("already parsed")
    }

    /// The tag, defaulting to `latest`
    pub fn tag(&self) -> Tag {
        match self.tag_str() {
            Some(s) => Tag::parse(s).expect("already parsed"),
            None => Tag::latest(),
        }
    }

    pub fn content_digest(&self) -> Option<ContentDigest> {
        self.content_digest_str()
            .map(|s| ContentDigest::parse(s).expect("already parsed"))
    }

    /// The most specific version available, used to fetch the manifest
    pub fn version(&self) -> ImageVersion {
        match self.content_digest() {
            Some(digest) => ImageVersion::ContentDigest(digest),
            None => ImageVersion::Tag(self.tag()),
        }
    }

    /// Serialize with the default tag filled in, `name:tag[@digest]`
    pub fn canonical(&self) -> String {
        let mut result = format!("{}:{}", self.name(), self.tag());
        if let Some(digest) = self.content_digest_str() {
            result.push('@');
            result.push_str(digest);
        }
        result
    }
}

impl FromStr for ImageReference {
    type Err = ImageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageReference::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialized)
    }
}

impl fmt::Debug for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
